//! Shared types, error model, and configuration for ResearchKit.
//!
//! This crate is the foundation depended on by all other ResearchKit crates.
//! It provides:
//! - [`ResearchError`], the unified error type
//! - Domain records ([`SubscriptionEntry`], [`SearchResult`], [`Paper`], ...)
//! - Configuration ([`AppConfig`] and one section per workflow)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BrowserBackend, BrowserConfig, CalendarConfig, CommitPrConfig, ExpenseCategory,
    ExpensesConfig, FindingSection, HostConfig, ListDetailSelectors, LlmConfig, OutputConfig,
    PaperSource, PapersConfig, Placement, RepoTarget, ReposConfig, ServiceProfile,
    SubscriptionSource, SubscriptionsConfig, VideoPlatform, VideosConfig, WebResearchConfig,
    WorkspaceConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    resolve_api_key, validate_api_key,
};
pub use error::{ResearchError, Result};
pub use types::{
    AnalyzedResult, BillingPeriod, Category, Expense, Paper, PricingCatalog, PricingPlan,
    Recommendation, RepoStats, RunId, SearchResult, SubscriptionEntry, SubscriptionStatus,
    VideoEntry,
};
