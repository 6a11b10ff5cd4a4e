//! Canned chat model for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use researchkit_shared::{ResearchError, Result};

use crate::client::ChatModel;

#[derive(Clone)]
struct Rule {
    needle: String,
    reply: std::result::Result<String, String>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    queue: VecDeque<std::result::Result<String, String>>,
    prompts: Vec<(String, String)>,
}

/// [`ChatModel`] answering from a script.
///
/// Replies are chosen by the first rule whose needle occurs in the system
/// or user prompt, then from the FIFO queue, then fall back to an error.
#[derive(Clone, Default)]
pub struct ScriptedChat {
    state: Arc<Mutex<State>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer prompts containing `needle` with `reply`.
    pub fn on(&self, needle: &str, reply: impl Into<String>) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.rules.push(Rule {
                needle: needle.into(),
                reply: Ok(reply.into()),
            });
        }
        self
    }

    /// Fail prompts containing `needle`.
    pub fn fail_on(&self, needle: &str, message: impl Into<String>) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.rules.push(Rule {
                needle: needle.into(),
                reply: Err(message.into()),
            });
        }
        self
    }

    /// Queue a reply for the next unmatched prompt.
    pub fn then(&self, reply: impl Into<String>) -> &Self {
        if let Ok(mut s) = self.state.lock() {
            s.queue.push_back(Ok(reply.into()));
        }
        self
    }

    /// `(system, user)` pairs seen so far.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.state
            .lock()
            .map(|s| s.prompts.clone())
            .unwrap_or_default()
    }
}

impl ChatModel for ScriptedChat {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ResearchError::Llm("scripted chat poisoned".into()))?;
        state.prompts.push((system.to_string(), user.to_string()));

        let matched = state
            .rules
            .iter()
            .find(|r| system.contains(&r.needle) || user.contains(&r.needle))
            .map(|r| r.reply.clone());

        let reply = match matched {
            Some(reply) => reply,
            None => state
                .queue
                .pop_front()
                .unwrap_or_else(|| Err("no scripted reply".into())),
        };
        reply.map_err(ResearchError::Llm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rules_then_queue_then_error() {
        let chat = ScriptedChat::new();
        chat.on("commit message", "feat: add parser").then("queued");

        assert_eq!(
            chat.chat("Write a commit message", "diff").await.unwrap(),
            "feat: add parser"
        );
        assert_eq!(chat.chat("other", "x").await.unwrap(), "queued");
        assert!(chat.chat("other", "y").await.is_err());
        assert_eq!(chat.prompts().len(), 3);
    }
}
