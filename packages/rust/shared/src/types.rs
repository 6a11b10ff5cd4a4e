//! Core domain records shared by the research workflows.
//!
//! Records live for a single run. Extraction failures leave fields at
//! their empty/zero defaults rather than aborting the run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one workflow run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Web search
// ---------------------------------------------------------------------------

/// One search hit, later enriched with the visited page's content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// 1-based position among the collected results.
    pub rank: u32,
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub domain: String,
    /// `<title>` of the visited page.
    #[serde(default)]
    pub page_title: String,
    /// Cleaned, truncated page text.
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_at: Option<DateTime<Utc>>,
}

/// Keyword-derived source category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Official,
    News,
    Review,
    Community,
    #[default]
    Other,
}

impl Category {
    /// All categories in report order.
    pub const ALL: [Category; 5] = [
        Category::Official,
        Category::News,
        Category::Review,
        Category::Community,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::News => "news",
            Self::Review => "review",
            Self::Community => "community",
            Self::Other => "other",
        }
    }

    /// Heading used in the source analysis section.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Official => "Official & Developer Sources",
            Self::News => "News & Media",
            Self::Review => "Reviews & Comparisons",
            Self::Community => "Community & Forums",
            Self::Other => "Other Sources",
        }
    }
}

/// A search result with its LLM summary and category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzedResult {
    pub result: SearchResult,
    pub summary: String,
    pub category: Category,
}

// ---------------------------------------------------------------------------
// Subscriptions
// ---------------------------------------------------------------------------

/// Canonical billing period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingPeriod {
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "yearly")]
    Yearly,
    #[default]
    #[serde(rename = "")]
    Unknown,
}

impl BillingPeriod {
    /// `"monthly"`, `"yearly"`, or `""` when unknown.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Unknown => "",
        }
    }
}

impl std::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Inactive,
    #[default]
    Unknown,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Unknown => "unknown",
        }
    }
}

/// A normalized subscription line item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub service: String,
    pub plan: String,
    pub price: f64,
    /// ISO currency code, empty when unknown.
    pub currency: String,
    pub billing_period: BillingPeriod,
    /// Free-form date text as shown on the source page.
    pub next_billing_date: String,
    /// Id of the source page the entry was extracted from.
    pub source: String,
    pub status: SubscriptionStatus,
    pub notes: String,
    /// The price text before parsing.
    pub raw_price: String,
}

/// A plan published on a service's pricing page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingPlan {
    pub name: String,
    /// Price text as published.
    pub price: String,
    pub currency: String,
    pub billing_period: String,
    pub tokens: String,
    /// Model access notes for the plan.
    pub model_notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingCatalog {
    pub service: String,
    pub pricing_url: String,
    pub plans: Vec<PricingPlan>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub service: String,
    pub action: String,
    pub reason: String,
    pub alternatives: String,
}

// ---------------------------------------------------------------------------
// Papers, videos, repositories
// ---------------------------------------------------------------------------

/// A paper found on an academic search site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    /// Display name of the search site.
    pub source: String,
    pub title: String,
    pub authors: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub citations: String,
}

/// A ranked video search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoEntry {
    pub platform: String,
    pub rank: u32,
    pub title: String,
    pub raw_views: String,
    pub views: u64,
    pub url: String,
    /// Saved thumbnail image, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
}

/// Popularity counters scraped from a repository page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoStats {
    pub name: String,
    pub url: String,
    pub stars: u64,
    pub forks: u64,
}

/// A receipt or invoice read by OCR and assigned to a bookkeeping account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expense {
    pub filename: String,
    /// `invoice`, `receipt`, `order_detail` or `unknown`.
    pub doc_type: String,
    pub vendor_name: String,
    pub issue_date: String,
    pub total_amount: f64,
    pub tax_amount: f64,
    pub subtotal_amount: f64,
    pub currency: String,
    pub invoice_number: String,
    pub order_number: String,
    pub payment_method: String,
    #[serde(default)]
    pub line_items: Vec<serde_json::Value>,
    pub ocr_quality: f64,
    pub category_key: String,
    pub category_name: String,
    pub category_reason: String,
    /// Business share of the amount, 0-100.
    pub business_ratio: u8,
}

impl Expense {
    /// The part of the total that counts as a business expense.
    pub fn deductible_amount(&self) -> f64 {
        (self.total_amount * f64::from(self.business_ratio) / 100.0).round()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_unique() {
        let a = RunId::new();
        let b = RunId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn billing_period_serializes_to_canonical_text() {
        assert_eq!(
            serde_json::to_string(&BillingPeriod::Monthly).unwrap(),
            r#""monthly""#
        );
        assert_eq!(serde_json::to_string(&BillingPeriod::Unknown).unwrap(), r#""""#);
        assert_eq!(BillingPeriod::Yearly.to_string(), "yearly");
    }

    #[test]
    fn category_order_ends_with_other() {
        assert_eq!(Category::ALL[0], Category::Official);
        assert_eq!(Category::ALL[4], Category::Other);
        assert_eq!(Category::default(), Category::Other);
    }

    #[test]
    fn paper_abstract_field_renamed() {
        let paper = Paper {
            title: "Attention".into(),
            abstract_text: "We propose".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&paper).unwrap();
        assert_eq!(json["abstract"], "We propose");
        assert!(json.get("citations").is_none());
    }

    #[test]
    fn deductible_amount_rounds_business_share() {
        let expense = Expense {
            total_amount: 1_001.0,
            business_ratio: 50,
            ..Default::default()
        };
        assert_eq!(expense.deductible_amount(), 501.0);
    }
}
