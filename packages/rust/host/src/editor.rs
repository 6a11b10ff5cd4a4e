//! Editor control through the host's `vscode.*` operations.

use serde_json::Value;

use researchkit_shared::Result;

use crate::response::field_or_raw;
use crate::transport::HostTransport;

#[derive(Clone)]
pub struct Editor<T> {
    transport: T,
}

fn s(value: &str) -> Value {
    Value::String(value.to_string())
}

impl<T: HostTransport> Editor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn open_folder(&self, path: &str) -> Result<()> {
        self.transport
            .invoke("vscode.open_folder", vec![s(path)])
            .await?;
        Ok(())
    }

    pub async fn open_file(&self, path: &str) -> Result<()> {
        self.transport.invoke("vscode.open_file", vec![s(path)]).await?;
        Ok(())
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<()> {
        self.transport
            .invoke("vscode.write_file", vec![s(path), s(content)])
            .await?;
        Ok(())
    }

    pub async fn close_workspace(&self) -> Result<()> {
        self.transport
            .invoke("vscode.close_workspace", vec![])
            .await?;
        Ok(())
    }

    pub async fn active_file_content(&self) -> Result<String> {
        let raw = self
            .transport
            .invoke("vscode.get_active_file_content", vec![])
            .await?;
        Ok(field_or_raw(&raw, "content"))
    }

    /// Root folder of the open workspace.
    pub async fn workspace_path(&self) -> Result<String> {
        let raw = self
            .transport
            .invoke("vscode.get_workspace_path", vec![])
            .await?;
        Ok(field_or_raw(&raw, "path"))
    }
}
