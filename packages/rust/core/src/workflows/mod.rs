//! The research and automation workflows.
//!
//! Each workflow module exposes `run`, which never fails: setup errors and
//! per-step failures end up in the returned [`WorkflowOutcome`]. Workflows
//! touch the outside world only through the capabilities passed in
//! ([`researchkit_host::Browser`], host bindings, [`ChatModel`]).
//!
//! [`WorkflowOutcome`]: crate::pipeline::WorkflowOutcome

pub mod calendar;
pub mod commit_pr;
pub mod expenses;
pub mod papers;
pub mod repos;
pub mod subscriptions;
pub mod videos;
pub mod web_research;
pub mod workspace;

use researchkit_llm::{ChatModel, sanitize_llm_output};
use researchkit_shared::{ResearchError, Result};

/// Ask for free text. A blank answer is an error so callers substitute
/// their placeholder.
pub(crate) async fn generate<M: ChatModel>(llm: &M, system: &str, user: &str) -> Result<String> {
    let text = sanitize_llm_output(&llm.chat(system, user).await?);
    if text.is_empty() {
        return Err(ResearchError::Llm("empty completion".into()));
    }
    Ok(text)
}

/// UTC date for report headers.
pub(crate) fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::PathBuf;

    use researchkit_host::{HostBrowser, ScriptedTransport};

    pub fn temp_dir(prefix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rk-{prefix}-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn host() -> (ScriptedTransport, HostBrowser<ScriptedTransport>) {
        let host = ScriptedTransport::new();
        host.respond("floorp.createTab", r#"{"instanceId":"tab-1"}"#);
        (host.clone(), HostBrowser::new(host))
    }
}
