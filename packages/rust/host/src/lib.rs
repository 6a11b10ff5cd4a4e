//! Capability bindings for the automation host.
//!
//! Every binding forwards 1:1 to a named host operation through a
//! [`HostTransport`] and decodes the JSON-encoded reply into a typed value.
//! No retries, no validation beyond decoding; host errors pass through.

pub mod browser;
pub mod editor;
pub mod git;
pub mod mail;
pub mod ocr;
mod response;
pub mod scripted;
pub mod spreadsheet;
pub mod static_browser;
pub mod transport;
pub mod window;

pub use browser::{Browser, HostBrowser, TabInfo};
pub use editor::Editor;
pub use git::{Git, GitDiff, GitOutput};
pub use mail::{CalendarEvent, Identity, Mail};
pub use ocr::{Ocr, OcrDocument, OcrText};
pub use scripted::{Call, ScriptedTransport};
pub use spreadsheet::Spreadsheet;
pub use static_browser::StaticBrowser;
pub use transport::{BridgeTransport, HostTransport};
pub use window::Windows;
