//! In-memory host transport with canned replies.
//!
//! Used by tests and dry runs to drive workflows without a real host.
//! Replies are matched by op name and, optionally, by a substring of any
//! string argument. Unmatched ops answer with an empty string.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use researchkit_shared::{ResearchError, Result};

use crate::transport::HostTransport;

#[derive(Debug, Clone)]
struct Rule {
    op: String,
    needle: Option<String>,
    reply: std::result::Result<String, String>,
    once: bool,
}

impl Rule {
    fn matches(&self, op: &str, args: &[Value]) -> bool {
        if self.op != op {
            return false;
        }
        match &self.needle {
            None => true,
            Some(needle) => args
                .iter()
                .any(|a| a.as_str().is_some_and(|s| s.contains(needle.as_str()))),
        }
    }
}

/// A recorded host call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: String,
    pub args: Vec<Value>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    calls: Vec<Call>,
}

/// Scripted [`HostTransport`]. Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<State>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, rule: Rule) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.rules.push(rule);
        }
        self
    }

    /// Always answer `op` with `reply`.
    pub fn respond(&self, op: &str, reply: impl Into<String>) -> &Self {
        self.push(Rule {
            op: op.into(),
            needle: None,
            reply: Ok(reply.into()),
            once: false,
        })
    }

    /// Answer `op` with `reply` when a string argument contains `needle`.
    pub fn respond_when(&self, op: &str, needle: &str, reply: impl Into<String>) -> &Self {
        self.push(Rule {
            op: op.into(),
            needle: Some(needle.into()),
            reply: Ok(reply.into()),
            once: false,
        })
    }

    /// Answer the next matching `op` call with `reply`, then forget the rule.
    pub fn respond_once(&self, op: &str, reply: impl Into<String>) -> &Self {
        self.push(Rule {
            op: op.into(),
            needle: None,
            reply: Ok(reply.into()),
            once: true,
        })
    }

    /// Fail `op` with a host error carrying `message`.
    pub fn fail(&self, op: &str, message: impl Into<String>) -> &Self {
        self.push(Rule {
            op: op.into(),
            needle: None,
            reply: Err(message.into()),
            once: false,
        })
    }

    /// Fail `op` when a string argument contains `needle`.
    pub fn fail_when(&self, op: &str, needle: &str, message: impl Into<String>) -> &Self {
        self.push(Rule {
            op: op.into(),
            needle: Some(needle.into()),
            reply: Err(message.into()),
            once: false,
        })
    }

    /// All calls seen so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.state
            .lock()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Calls made to `op`, in order.
    pub fn calls_to(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }
}

impl HostTransport for ScriptedTransport {
    async fn invoke(&self, op: &str, args: Vec<Value>) -> Result<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ResearchError::host(op, "scripted transport poisoned"))?;

        state.calls.push(Call {
            op: op.to_string(),
            args: args.clone(),
        });

        // Needle rules take precedence over catch-all rules for the same op.
        let position = state
            .rules
            .iter()
            .position(|r| r.needle.is_some() && r.matches(op, &args))
            .or_else(|| state.rules.iter().position(|r| r.matches(op, &args)));

        let Some(index) = position else {
            return Ok(String::new());
        };

        let rule = if state.rules[index].once {
            state.rules.remove(index)
        } else {
            state.rules[index].clone()
        };

        rule.reply.map_err(|message| ResearchError::host(op, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_by_op_and_needle() {
        let host = ScriptedTransport::new();
        host.respond("floorp.tabElementText", r#"{"text":"generic"}"#)
            .respond_when("floorp.tabElementText", "#title", r#"{"text":"Title"}"#);

        let generic = host
            .invoke("floorp.tabElementText", vec!["t".into(), "main".into()])
            .await
            .unwrap();
        let title = host
            .invoke("floorp.tabElementText", vec!["t".into(), "#title".into()])
            .await
            .unwrap();

        assert_eq!(generic, r#"{"text":"generic"}"#);
        assert_eq!(title, r#"{"text":"Title"}"#);
        assert_eq!(host.calls_to("floorp.tabElementText").len(), 2);
    }

    #[tokio::test]
    async fn once_rules_are_consumed() {
        let host = ScriptedTransport::new();
        host.respond_once("git.push", "first").respond("git.push", "later");

        assert_eq!(host.invoke("git.push", vec![]).await.unwrap(), "first");
        assert_eq!(host.invoke("git.push", vec![]).await.unwrap(), "later");
    }

    #[tokio::test]
    async fn failures_and_unscripted_ops() {
        let host = ScriptedTransport::new();
        host.fail("floorp.createTab", "tab limit reached");

        let err = host.invoke("floorp.createTab", vec![]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "host operation floorp.createTab failed: tab limit reached"
        );
        assert_eq!(host.invoke("window.close", vec![]).await.unwrap(), "");
    }
}
