//! LLM chat completion for ResearchKit.
//!
//! [`ChatModel`] is the opaque text-in/text-out seam the workflows call;
//! [`OpenRouterChat`] implements it over an OpenAI-compatible HTTP API.
//! The [`json`] helpers recover structured answers from model output.

pub mod client;
pub mod json;
pub mod scripted;

pub use client::{ChatModel, OpenRouterChat, extract_assistant_content};
pub use json::{
    extract_json_array, extract_json_object, loose_string, parse_json_array, parse_json_object,
    sanitize_llm_output,
};
pub use scripted::ScriptedChat;
