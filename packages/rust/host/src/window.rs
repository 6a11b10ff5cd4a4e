//! Desktop window enumeration through the host's `window.*` operations.

use serde_json::Value;

use researchkit_shared::Result;

use crate::response::{decode, field_or_raw};
use crate::transport::HostTransport;

#[derive(Clone)]
pub struct Windows<T> {
    transport: T,
}

impl<T: HostTransport> Windows<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn active_title(&self) -> Result<String> {
        let raw = self
            .transport
            .invoke("window.get_active_title", vec![])
            .await?;
        Ok(field_or_raw(&raw, "title"))
    }

    /// Titles of every window except the focused one.
    pub async fn inactive_titles(&self) -> Result<Vec<String>> {
        let op = "window.get_inactive_titles";
        let raw = self.transport.invoke(op, vec![]).await?;
        decode(op, &raw)
    }

    /// Close windows whose title matches `pattern`.
    pub async fn close(&self, pattern: &str) -> Result<()> {
        self.transport
            .invoke("window.close", vec![Value::String(pattern.to_string())])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    #[tokio::test]
    async fn titles_decoded() {
        let host = ScriptedTransport::new();
        host.respond("window.get_active_title", "Terminal")
            .respond("window.get_inactive_titles", r#"["Mail","Editor"]"#);
        let windows = Windows::new(host);

        assert_eq!(windows.active_title().await.unwrap(), "Terminal");
        assert_eq!(windows.inactive_titles().await.unwrap(), vec!["Mail", "Editor"]);
    }
}
