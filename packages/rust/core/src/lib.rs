//! Research workflows and their domain logic for ResearchKit.
//!
//! Page collection ([`collect`]), text reduction and parsing ([`reduce`],
//! [`parse`], [`classify`]), Markdown report assembly ([`markdown`],
//! [`report`]) and run output ([`output`]) are composed into the
//! end-to-end [`workflows`].

pub mod classify;
pub mod collect;
pub mod markdown;
pub mod output;
pub mod parse;
pub mod pipeline;
pub mod reduce;
pub mod report;
pub mod workflows;

pub use pipeline::{ProgressReporter, SilentProgress, StepFailure, StepLog, StepStage, WorkflowOutcome};
