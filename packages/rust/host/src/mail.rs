//! Mail client data through the host's `thunderbird.*` operations.

use serde::Deserialize;
use serde_json::Value;

use researchkit_shared::Result;

use crate::response::{decode, field_or_raw};
use crate::transport::HostTransport;

/// Days of calendar events fetched unless overridden.
pub const DEFAULT_CALENDAR_DAYS: u32 = 14;

/// Folder read by [`Mail::emails`] unless overridden.
pub const DEFAULT_MAIL_FOLDER: &str = "inbox";

/// Messages fetched per folder unless overridden.
pub const DEFAULT_MAIL_LIMIT: u32 = 20;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: String,
    pub email: String,
    pub profile: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CalendarEvent {
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub date: String,
}

#[derive(Clone)]
pub struct Mail<T> {
    transport: T,
}

impl<T: HostTransport> Mail<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub async fn identity(&self) -> Result<Identity> {
        let op = "thunderbird.getIdentity";
        let raw = self.transport.invoke(op, vec![]).await?;
        decode(op, &raw)
    }

    pub async fn calendar_events(&self, days: Option<u32>) -> Result<Vec<CalendarEvent>> {
        let op = "thunderbird.getCalendarEvents";
        let days = days.unwrap_or(DEFAULT_CALENDAR_DAYS);
        let raw = self.transport.invoke(op, vec![Value::from(days)]).await?;
        decode(op, &raw)
    }

    /// Path of the active profile directory.
    pub async fn profile(&self) -> Result<String> {
        let raw = self
            .transport
            .invoke("thunderbird.getProfile", vec![])
            .await?;
        Ok(field_or_raw(&raw, "profile"))
    }

    /// Message summaries; the shape is defined by the host.
    pub async fn emails(&self, folder: Option<&str>, limit: Option<u32>) -> Result<Vec<Value>> {
        let op = "thunderbird.getEmails";
        let args = vec![
            Value::String(folder.unwrap_or(DEFAULT_MAIL_FOLDER).to_string()),
            Value::from(limit.unwrap_or(DEFAULT_MAIL_LIMIT)),
        ];
        let raw = self.transport.invoke(op, args).await?;
        decode(op, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    #[tokio::test]
    async fn calendar_defaults_to_two_weeks() {
        let host = ScriptedTransport::new();
        host.respond(
            "thunderbird.getCalendarEvents",
            r#"[{"title":"Standup","start_time":"09:00","end_time":"09:15","date":"2026-10-20"}]"#,
        );
        let mail = Mail::new(host.clone());

        let events = mail.calendar_events(None).await.unwrap();
        assert_eq!(events[0].title, "Standup");
        assert_eq!(
            host.calls_to("thunderbird.getCalendarEvents")[0].args,
            vec![Value::from(14)]
        );
    }

    #[tokio::test]
    async fn emails_default_folder_and_limit() {
        let host = ScriptedTransport::new();
        host.respond("thunderbird.getEmails", "[]");
        let mail = Mail::new(host.clone());

        assert!(mail.emails(None, None).await.unwrap().is_empty());
        let call = &host.calls_to("thunderbird.getEmails")[0];
        assert_eq!(call.args, vec![Value::from("inbox"), Value::from(20)]);
    }

    #[tokio::test]
    async fn identity_decoded() {
        let host = ScriptedTransport::new();
        host.respond(
            "thunderbird.getIdentity",
            r#"{"name":"Dev","email":"dev@example.com","profile":"default"}"#,
        );
        let mail = Mail::new(host);
        assert_eq!(mail.identity().await.unwrap().email, "dev@example.com");
    }
}
