//! Markdown report templates.
//!
//! Rendering is pure: workflows compute the data, these modules only lay it
//! out. Writing the result to disk is [`crate::output`]'s job.

pub mod subscriptions;
pub mod survey;

pub use survey::{Section, Subsection, SurveyReport};
