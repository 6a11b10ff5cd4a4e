//! Host bridge transport.
//!
//! Spawns the automation host bridge and forwards named operations to it
//! over a JSON-lines stdin/stdout protocol. One request is in flight at a
//! time; the handle is shared behind a `tokio::sync::Mutex`.

use std::future::Future;
use std::process::Stdio;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use researchkit_shared::{HostConfig, ResearchError, Result};

/// Forwards a named operation to the host and returns its raw result text.
///
/// Host failures come back as [`ResearchError::Host`] with the host's
/// message unchanged.
pub trait HostTransport: Send + Sync {
    fn invoke(&self, op: &str, args: Vec<Value>) -> impl Future<Output = Result<String>> + Send;
}

impl<T: HostTransport> HostTransport for &T {
    fn invoke(&self, op: &str, args: Vec<Value>) -> impl Future<Output = Result<String>> + Send {
        (**self).invoke(op, args)
    }
}

// ---------------------------------------------------------------------------
// Protocol types
// ---------------------------------------------------------------------------

/// Request message sent to the bridge.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "type")]
enum RequestMessage<'a> {
    #[serde(rename = "invoke")]
    Invoke {
        id: String,
        op: &'a str,
        args: &'a [Value],
    },
    #[serde(rename = "shutdown")]
    Shutdown,
}

/// Response message received from the bridge.
#[derive(Debug, serde::Deserialize)]
#[serde(tag = "type")]
enum ResponseMessage {
    #[serde(rename = "ready")]
    Ready,
    #[serde(rename = "result")]
    Result {
        id: String,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename = "error")]
    Error { id: String, error: String },
}

/// Result values are passed through as text; non-string JSON is re-encoded.
fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Bridge handle
// ---------------------------------------------------------------------------

struct BridgeHandle {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    request_counter: u64,
}

impl BridgeHandle {
    async fn read_message(&mut self) -> Result<ResponseMessage> {
        loop {
            let mut line = String::new();
            let read = self
                .reader
                .read_line(&mut line)
                .await
                .map_err(|e| ResearchError::host("bridge", format!("read error: {e}")))?;

            if read == 0 {
                return Err(ResearchError::host(
                    "bridge",
                    "bridge closed stdout unexpectedly",
                ));
            }
            if line.trim().is_empty() {
                continue;
            }

            return serde_json::from_str(line.trim()).map_err(|e| {
                let head: String = line.chars().take(200).collect();
                ResearchError::host("bridge", format!("invalid bridge message: {e} (got: {head})"))
            });
        }
    }

    async fn wait_for_ready(&mut self) -> Result<()> {
        match self.read_message().await? {
            ResponseMessage::Ready => {
                info!("host bridge is ready");
                Ok(())
            }
            other => Err(ResearchError::host(
                "bridge",
                format!("expected ready message, got: {other:?}"),
            )),
        }
    }

    async fn send(&mut self, op: &str, args: &[Value]) -> Result<String> {
        self.request_counter += 1;
        let id = format!("req-{}", self.request_counter);

        let request = RequestMessage::Invoke {
            id: id.clone(),
            op,
            args,
        };
        let mut json = serde_json::to_string(&request)
            .map_err(|e| ResearchError::host(op, format!("failed to serialize request: {e}")))?;
        json.push('\n');

        self.stdin
            .write_all(json.as_bytes())
            .await
            .map_err(|e| ResearchError::host(op, format!("failed to write to bridge: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ResearchError::host(op, format!("failed to flush bridge stdin: {e}")))?;

        debug!(%id, op, "sent host request");

        loop {
            match self.read_message().await? {
                ResponseMessage::Result { id: resp_id, value } if resp_id == id => {
                    return Ok(value_to_text(value));
                }
                ResponseMessage::Error {
                    id: resp_id,
                    error,
                } if resp_id == id => {
                    return Err(ResearchError::host(op, error));
                }
                ResponseMessage::Ready => {
                    return Err(ResearchError::host(op, "unexpected ready message"));
                }
                stale => warn!(?stale, expected = %id, "discarding stale bridge response"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Public transport
// ---------------------------------------------------------------------------

/// Transport over a spawned host bridge subprocess.
#[derive(Clone)]
pub struct BridgeTransport {
    inner: Arc<Mutex<BridgeHandle>>,
}

impl BridgeTransport {
    /// Spawn the bridge and wait for its ready signal.
    pub async fn spawn(config: &HostConfig) -> Result<Self> {
        info!(cmd = %config.command, args = ?config.args, "spawning host bridge");

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ResearchError::config(format!(
                    "failed to spawn host bridge: {e}. Is `{}` installed?",
                    config.command
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ResearchError::host("bridge", "failed to capture bridge stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ResearchError::host("bridge", "failed to capture bridge stdout"))?;

        let mut handle = BridgeHandle {
            child,
            stdin,
            reader: BufReader::new(stdout),
            request_counter: 0,
        };
        handle.wait_for_ready().await?;

        Ok(Self {
            inner: Arc::new(Mutex::new(handle)),
        })
    }

    /// Send shutdown and wait for the bridge to exit.
    pub async fn shutdown(&self) -> Result<()> {
        let mut handle = self.inner.lock().await;

        if let Ok(mut json) = serde_json::to_string(&RequestMessage::Shutdown) {
            json.push('\n');
            let _ = handle.stdin.write_all(json.as_bytes()).await;
            let _ = handle.stdin.flush().await;
        }

        match handle.child.wait().await {
            Ok(status) => info!(?status, "host bridge exited"),
            Err(e) => warn!("host bridge wait error: {e}"),
        }
        Ok(())
    }
}

impl HostTransport for BridgeTransport {
    async fn invoke(&self, op: &str, args: Vec<Value>) -> Result<String> {
        let mut handle = self.inner.lock().await;
        handle.send(op, &args).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
