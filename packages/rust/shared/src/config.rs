//! Application configuration for ResearchKit.
//!
//! User config lives at `~/.researchkit/researchkit.toml`.
//! CLI flags override config file values, which override defaults.
//! Every workflow reads its own section; nothing is global.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ResearchError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "researchkit.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".researchkit";

// ---------------------------------------------------------------------------
// Config structs (matching researchkit.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM chat completion settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Host bridge subprocess.
    #[serde(default)]
    pub host: HostConfig,

    /// Browser backend selection.
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Report output location.
    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub subscriptions: SubscriptionsConfig,

    #[serde(default)]
    pub web_research: WebResearchConfig,

    #[serde(default)]
    pub papers: PapersConfig,

    #[serde(default)]
    pub videos: VideosConfig,

    #[serde(default)]
    pub repos: ReposConfig,

    #[serde(default)]
    pub commit_pr: CommitPrConfig,

    #[serde(default)]
    pub expenses: ExpensesConfig,

    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_temperature() -> f32 {
    0.2
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[host]` section: how to launch the automation host bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_host_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_working_dir")]
    pub working_dir: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            command: default_host_command(),
            args: Vec::new(),
            working_dir: default_working_dir(),
        }
    }
}

fn default_host_command() -> String {
    "researchkit-host".into()
}
fn default_working_dir() -> String {
    ".".into()
}

/// Which browser implementation drives page collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserBackend {
    /// Real browser tabs through the host bridge.
    #[default]
    Host,
    /// Plain HTTP fetch + static DOM queries.
    Static,
}

/// `[browser]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default)]
    pub backend: BrowserBackend,

    /// User agent for the static backend.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_browser_timeout")]
    pub timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            backend: BrowserBackend::default(),
            user_agent: default_user_agent(),
            timeout_secs: default_browser_timeout(),
        }
    }
}

fn default_user_agent() -> String {
    concat!("ResearchKit/", env!("CARGO_PKG_VERSION")).into()
}
fn default_browser_timeout() -> u64 {
    30
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory reports and spreadsheets are written to.
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> String {
    "reports".into()
}

// ---------------------------------------------------------------------------
// Subscription research
// ---------------------------------------------------------------------------

/// A billing page to collect subscriptions from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSource {
    pub id: String,
    pub label: String,
    pub url: String,
    /// Element that marks the page as ready.
    pub wait_selector: String,
    /// Lines containing these are kept when reducing page text.
    pub keywords: Vec<String>,
    /// Tried in order; the first with text wins over the generic fallback.
    pub preferred_selectors: Vec<String>,
    /// Clicked (best-effort) before reading, e.g. promo dialogs or toggles.
    pub dismiss_selectors: Vec<String>,
    /// Master/detail pages where each item must be opened individually.
    pub list_detail: Option<ListDetailSelectors>,
}

/// Selectors for a clickable list whose items reveal a detail panel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListDetailSelectors {
    /// Item selector; `{n}` is replaced with the 1-based index.
    pub item: String,
    pub detail: String,
    pub max_items: u32,
}

/// How a known service is recognized and where its pricing lives.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProfile {
    /// Stable key, e.g. `cursor`.
    pub key: String,
    /// Any of these in the service name maps it to this profile.
    pub aliases: Vec<String>,
    pub pricing_url: String,
    /// Keywords for reducing the pricing page text.
    pub keywords: Vec<String>,
    /// Send the raw (truncated) page instead of the keyword-reduced one.
    pub raw_text: bool,
}

/// `[subscriptions]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionsConfig {
    pub output_file: String,
    pub sources: Vec<SubscriptionSource>,
    pub services: Vec<ServiceProfile>,
    pub ai_filter_keywords: Vec<String>,
    pub ai_exclude_keywords: Vec<String>,
    pub inactive_keywords: Vec<String>,
    pub noise_keywords: Vec<String>,
    pub zero_price_keep_keywords: Vec<String>,
    pub include_inactive: bool,
    pub max_page_chars: usize,
    pub wait_timeout_ms: u64,
    pub settle_ms: u64,
    pub click_settle_ms: u64,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for SubscriptionsConfig {
    fn default() -> Self {
        let list = "main.RouteContent > div.ListAndDetailView > div.ListAndDetailView-list";
        Self {
            output_file: "subscription_deep_research.md".into(),
            sources: vec![
                SubscriptionSource {
                    id: "link".into(),
                    label: "Link.com".into(),
                    url: "https://app.link.com/subscriptions".into(),
                    wait_selector: "body".into(),
                    keywords: strings(&[
                        "subscription", "subscriptions", "plan", "billing", "payment",
                        "invoice", "charged", "renew", "next", "amount", "price", "usd",
                        "jpy", "copilot", "cursor", "openai", "claude", "anthropic",
                        "z.ai", "zai",
                    ]),
                    preferred_selectors: Vec::new(),
                    dismiss_selectors: strings(&[
                        "button:has-text(\"すべての非アクティブを表示\")",
                    ]),
                    list_detail: Some(ListDetailSelectors {
                        item: format!("{list} > div > ul > li[role='listitem']:nth-child({{n}})"),
                        detail: "main.RouteContent > div.ListAndDetailView > div.ListAndDetailView-detail"
                            .into(),
                        max_items: 20,
                    }),
                },
                SubscriptionSource {
                    id: "zai".into(),
                    label: "Z.ai".into(),
                    url: "https://z.ai/manage-apikey/subscription".into(),
                    wait_selector: "div[role='tabpanel']".into(),
                    keywords: strings(&["billing", "usage", "plan", "price", "usd", "jpy", "token"]),
                    preferred_selectors: strings(&["div[role='tabpanel']"]),
                    dismiss_selectors: strings(&["button:has-text(\"Close\")"]),
                    list_detail: None,
                },
                SubscriptionSource {
                    id: "github_copilot".into(),
                    label: "GitHub Copilot".into(),
                    url: "https://github.com/settings/billing".into(),
                    wait_selector: "body".into(),
                    keywords: strings(&["copilot", "billing", "plan", "price", "monthly", "annual"]),
                    preferred_selectors: strings(&[
                        "[data-testid='copilot-plan-card']",
                        "[data-hpc]",
                    ]),
                    dismiss_selectors: Vec::new(),
                    list_detail: None,
                },
                SubscriptionSource {
                    id: "google_subscriptions".into(),
                    label: "Google Subscriptions".into(),
                    url: "https://myaccount.google.com/subscriptions".into(),
                    wait_selector: "body".into(),
                    keywords: strings(&["subscription", "plan", "renew", "next", "price", "monthly", "annual"]),
                    preferred_selectors: strings(&["div[role='main']"]),
                    dismiss_selectors: Vec::new(),
                    list_detail: None,
                },
            ],
            services: vec![
                ServiceProfile {
                    key: "cursor".into(),
                    aliases: strings(&["cursor"]),
                    pricing_url: "https://www.cursor.com/pricing".into(),
                    keywords: strings(&["cursor", "pro", "hobby", "pricing", "monthly", "annual"]),
                    raw_text: true,
                },
                ServiceProfile {
                    key: "copilot".into(),
                    aliases: strings(&["copilot", "github"]),
                    pricing_url: "https://github.com/features/copilot#pricing".into(),
                    keywords: strings(&["copilot", "github", "individual", "business", "pricing"]),
                    raw_text: true,
                },
                ServiceProfile {
                    key: "openai".into(),
                    aliases: strings(&["openai", "chatgpt"]),
                    pricing_url: "https://openai.com/pricing".into(),
                    keywords: strings(&["openai", "chatgpt", "gpt", "pricing", "api"]),
                    raw_text: false,
                },
                ServiceProfile {
                    key: "claude".into(),
                    aliases: strings(&["claude", "anthropic"]),
                    pricing_url: "https://www.anthropic.com/pricing".into(),
                    keywords: strings(&["claude", "anthropic", "pricing", "api"]),
                    raw_text: false,
                },
                ServiceProfile {
                    key: "zai".into(),
                    aliases: strings(&["z.ai", "zai"]),
                    pricing_url: "https://z.ai/pricing".into(),
                    keywords: strings(&["z.ai", "zai", "pricing", "token"]),
                    raw_text: false,
                },
            ],
            ai_filter_keywords: strings(&[
                "ai", "llm", "gpt", "copilot", "cursor", "claude", "anthropic", "openai",
                "z.ai", "zai", "model", "token", "chatgpt", "x premium",
            ]),
            ai_exclude_keywords: strings(&["buildjet", "payment", "merchant"]),
            inactive_keywords: strings(&[
                "inactive", "canceled", "cancelled", "cancel", "キャンセル", "解約",
                "非アクティブ", "停止", "終了", "downgrade pending",
            ]),
            noise_keywords: strings(&[
                "履歴", "取引", "明細", "transaction", "transactions", "history", "receipt",
            ]),
            zero_price_keep_keywords: strings(&["free", "trial", "promo", "credit", "無料"]),
            include_inactive: true,
            max_page_chars: 14_000,
            wait_timeout_ms: 15_000,
            settle_ms: 1_500,
            click_settle_ms: 800,
        }
    }
}

// ---------------------------------------------------------------------------
// Web research
// ---------------------------------------------------------------------------

/// One "Key Findings" subsection generated by the LLM.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FindingSection {
    pub id: String,
    pub title: String,
    /// Prompt; `{topic}` is replaced with the research query.
    pub prompt: String,
}

/// `[web_research]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebResearchConfig {
    pub query: String,
    pub output_file: String,
    /// Search URL; `{query}` is replaced with the URL-encoded query.
    pub search_url: String,
    pub results_ready_selector: String,
    pub more_results_selector: String,
    pub more_results_clicks: u32,
    pub scroll_selector: String,
    /// Result container; `{n}` is replaced with the 1-based index.
    pub item_selector: String,
    pub title_selector: String,
    pub max_results: usize,
    /// How far past `max_results` to scan for usable items.
    pub scan_slack: usize,
    pub skip_domains: Vec<String>,
    pub snippet_chars: usize,
    pub content_selectors: Vec<String>,
    pub content_chars: usize,
    /// Stop trying content selectors once this much text was found.
    pub content_stop_chars: usize,
    /// Pages with less text than this count as limited extractions.
    pub min_content_chars: usize,
    pub summary_input_chars: usize,
    pub findings: Vec<FindingSection>,
    pub search_timeout_ms: u64,
    pub search_settle_ms: u64,
    pub page_idle_timeout_ms: u64,
    pub page_settle_ms: u64,
    pub between_pages_ms: u64,
}

impl Default for WebResearchConfig {
    fn default() -> Self {
        let finding = |id: &str, title: &str, prompt: &str| FindingSection {
            id: id.into(),
            title: title.into(),
            prompt: prompt.into(),
        };
        Self {
            query: "Floorp".into(),
            output_file: "web_research_report.md".into(),
            search_url: "https://duckduckgo.com/?q={query}".into(),
            results_ready_selector: "article[data-testid='result']".into(),
            more_results_selector: "#more-results".into(),
            more_results_clicks: 3,
            scroll_selector: "article[data-testid='result']:last-of-type".into(),
            item_selector: "ol.react-results--main > li:nth-child({n}) article[data-testid='result']"
                .into(),
            title_selector: "a[data-testid='result-title-a']".into(),
            max_results: 30,
            scan_slack: 20,
            skip_domains: strings(&["youtube.com", "twitter.com", "facebook.com", "instagram.com"]),
            snippet_chars: 300,
            content_selectors: strings(&[
                "main", "article", ".content", "#content", ".post-content", ".entry-content", "body",
            ]),
            content_chars: 2_000,
            content_stop_chars: 500,
            min_content_chars: 100,
            summary_input_chars: 1_500,
            findings: vec![
                finding(
                    "3.1",
                    "Definition and Vision",
                    "Describe what {topic} is, the background of its creation, its core philosophy and long-term vision.",
                ),
                finding(
                    "3.2",
                    "Technical Architecture",
                    "Analyze the technology stack and architecture behind {topic} and the engineering trade-offs the sources mention.",
                ),
                finding(
                    "3.3",
                    "Distinctive Features",
                    "Detail the features that set {topic} apart and how users benefit from them.",
                ),
                finding(
                    "3.4",
                    "Community and Ecosystem",
                    "Describe the community, governance and ecosystem around {topic}, including how feedback reaches the product.",
                ),
                finding(
                    "3.5",
                    "Competitive Landscape",
                    "Compare {topic} with its main alternatives and explain its positioning.",
                ),
                finding(
                    "3.6",
                    "Challenges and Risks",
                    "Discuss the open challenges and risk factors {topic} faces.",
                ),
                finding(
                    "3.7",
                    "Outlook",
                    "Summarize the announced roadmap and the likely future direction of {topic}.",
                ),
            ],
            search_timeout_ms: 15_000,
            search_settle_ms: 3_000,
            page_idle_timeout_ms: 10_000,
            page_settle_ms: 5_000,
            between_pages_ms: 500,
        }
    }
}

// ---------------------------------------------------------------------------
// Paper survey
// ---------------------------------------------------------------------------

/// An academic search site and how to read its result list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperSource {
    pub name: String,
    /// `{query}` is replaced with the URL-encoded topic.
    pub search_url: String,
    pub ready_selector: String,
    pub ready_timeout_ms: u64,
    pub settle_ms: u64,
    /// `{n}` is replaced with the 1-based index.
    pub item_selector: String,
    pub title_selector: String,
    pub authors_selector: Option<String>,
    pub abstract_selector: Option<String>,
    /// Anchor whose `href` is the paper link; the search URL is used when absent.
    pub link_selector: Option<String>,
    pub citations_selector: Option<String>,
    pub max_items: u32,
}

/// `[papers]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PapersConfig {
    pub topic: String,
    pub output_file: String,
    pub sources: Vec<PaperSource>,
    pub abstract_chars: usize,
    pub max_summaries: usize,
    /// Extra keywords listed under the abstract.
    pub keywords: Vec<String>,
}

impl Default for PapersConfig {
    fn default() -> Self {
        Self {
            topic: "web browser security".into(),
            output_file: "paper_survey.md".into(),
            sources: vec![
                PaperSource {
                    name: "arXiv".into(),
                    search_url: "https://arxiv.org/search/?query={query}&searchtype=all".into(),
                    ready_selector: "li.arxiv-result".into(),
                    ready_timeout_ms: 10_000,
                    settle_ms: 2_000,
                    item_selector: "li.arxiv-result:nth-of-type({n})".into(),
                    title_selector: ".title".into(),
                    authors_selector: Some(".authors".into()),
                    abstract_selector: Some(".abstract-full".into()),
                    link_selector: Some("p.list-title a".into()),
                    citations_selector: None,
                    max_items: 5,
                },
                PaperSource {
                    name: "Google Scholar".into(),
                    search_url: "https://scholar.google.com/scholar?q={query}".into(),
                    ready_selector: ".gs_ri".into(),
                    ready_timeout_ms: 10_000,
                    settle_ms: 2_000,
                    item_selector: ".gs_r.gs_or.gs_scl:nth-of-type({n})".into(),
                    title_selector: "h3.gs_rt a".into(),
                    authors_selector: Some(".gs_a".into()),
                    abstract_selector: Some(".gs_rs".into()),
                    link_selector: Some("h3.gs_rt a".into()),
                    citations_selector: Some(".gs_fl a:nth-of-type(3)".into()),
                    max_items: 5,
                },
                PaperSource {
                    name: "Semantic Scholar".into(),
                    search_url: "https://www.semanticscholar.org/search?q={query}".into(),
                    ready_selector: ".cl-paper-title".into(),
                    ready_timeout_ms: 15_000,
                    settle_ms: 3_000,
                    item_selector: "[data-test-id='search-result']:nth-of-type({n})".into(),
                    title_selector: "h2.cl-paper-title".into(),
                    authors_selector: None,
                    abstract_selector: None,
                    link_selector: None,
                    citations_selector: None,
                    max_items: 5,
                },
            ],
            abstract_chars: 300,
            max_summaries: 10,
            keywords: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Video comparison
// ---------------------------------------------------------------------------

/// A video site's search page and result layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoPlatform {
    pub name: String,
    /// `{query}` is replaced with the URL-encoded topic.
    pub search_url: String,
    pub ready_selector: String,
    pub ready_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    /// Scrolled into view to trigger lazy loading.
    pub scroll_selector: Option<String>,
    pub scroll_rounds: u32,
    pub scroll_settle_ms: u64,
    /// Section container; `{s}` is replaced with the 1-based index.
    pub section_selector: Option<String>,
    pub max_sections: u32,
    /// Item within a section (or the page); `{n}` is the 1-based index.
    pub item_selector: String,
    /// Highest item index probed per section.
    pub max_scan: u32,
    pub title_selector: String,
    pub views_selector: String,
    pub thumbnail_selector: Option<String>,
    /// Link written for every row of this platform.
    pub link_url: String,
    pub max_items: usize,
}

/// Placement of a chart or picture on a sheet, in points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// `[videos]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideosConfig {
    pub topic: String,
    pub output_file: String,
    pub sheet: String,
    pub platforms: Vec<VideoPlatform>,
    pub capture_thumbnails: bool,
    /// Thumbnails are written here, relative to the output directory.
    pub thumbnail_dir: String,
    /// First picture position; later rows move down by `row_step`.
    pub thumbnail: Placement,
    pub row_step: f64,
}

impl Default for VideosConfig {
    fn default() -> Self {
        Self {
            topic: "Floorp".into(),
            output_file: "video_comparison.xlsx".into(),
            sheet: "Sheet1".into(),
            platforms: vec![
                VideoPlatform {
                    name: "YouTube".into(),
                    search_url: "https://www.youtube.com/results?search_query={query}".into(),
                    ready_selector: "ytd-video-renderer #video-title".into(),
                    ready_timeout_ms: 10_000,
                    idle_timeout_ms: 2_000,
                    scroll_selector: Some("ytd-continuation-item-renderer".into()),
                    scroll_rounds: 12,
                    scroll_settle_ms: 3_000,
                    section_selector: Some("ytd-item-section-renderer:nth-of-type({s})".into()),
                    max_sections: 20,
                    item_selector: "ytd-video-renderer:nth-of-type({n})".into(),
                    max_scan: 50,
                    title_selector: "#video-title".into(),
                    views_selector: "#metadata-line span:nth-of-type(1)".into(),
                    thumbnail_selector: Some("ytd-thumbnail".into()),
                    link_url: "https://www.youtube.com".into(),
                    max_items: 100,
                },
                VideoPlatform {
                    name: "Niconico".into(),
                    search_url: "https://www.nicovideo.jp/search/{query}?sort=f&order=d".into(),
                    ready_selector: ".Pressable".into(),
                    ready_timeout_ms: 10_000,
                    idle_timeout_ms: 3_000,
                    scroll_selector: None,
                    scroll_rounds: 0,
                    scroll_settle_ms: 0,
                    section_selector: None,
                    max_sections: 1,
                    item_selector: ".Pressable:nth-of-type({n})".into(),
                    max_scan: 40,
                    title_selector: "a.fw_bold.lc_2".into(),
                    views_selector: "p:nth-of-type(1)".into(),
                    thumbnail_selector: Some("img".into()),
                    link_url: "https://www.nicovideo.jp".into(),
                    max_items: 40,
                },
            ],
            capture_thumbnails: true,
            thumbnail_dir: "thumbnails".into(),
            thumbnail: Placement {
                left: 100.0,
                top: 20.0,
                width: 40.0,
                height: 25.0,
            },
            row_step: 15.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoTarget {
    pub name: String,
    pub url: String,
}

/// `[repos]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReposConfig {
    pub output_file: String,
    pub sheet: String,
    pub repos: Vec<RepoTarget>,
    pub chart_title: String,
    pub chart_type: String,
    pub chart: Placement,
    pub wait_timeout_ms: u64,
}

impl Default for ReposConfig {
    fn default() -> Self {
        let repo = |name: &str, url: &str| RepoTarget {
            name: name.into(),
            url: url.into(),
        };
        Self {
            output_file: "repo_comparison.xlsx".into(),
            sheet: "Sheet1".into(),
            repos: vec![
                repo("Floorp", "https://github.com/Floorp-Projects/Floorp"),
                repo("Zen Browser", "https://github.com/zen-browser/desktop"),
                repo("Waterfox", "https://github.com/BrowserWorks/waterfox"),
                repo("Pulse Browser", "https://github.com/pulse-browser/browser"),
                repo("Firefox (Mirror)", "https://github.com/mozilla-firefox/firefox"),
                repo("Midori", "https://github.com/goastian/midori-desktop"),
                repo("FireDragon", "https://gitlab.com/garuda-linux/firedragon/firedragon12"),
            ],
            chart_title: "Browser Popularity".into(),
            chart_type: "column".into(),
            chart: Placement {
                left: 300.0,
                top: 50.0,
                width: 800.0,
                height: 450.0,
            },
            wait_timeout_ms: 10_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Commit & PR
// ---------------------------------------------------------------------------

/// `[commit_pr]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitPrConfig {
    /// Repository checkout; the editor's workspace is used when unset.
    pub repo_path: Option<String>,
    /// `owner/name` on GitHub.
    pub repository: String,
    pub base_branch: String,
    pub default_commit_message: String,
    pub title_selector: String,
    pub body_selector: String,
    /// Tried in order until one click succeeds.
    pub submit_selectors: Vec<String>,
    pub form_wait_ms: u64,
    pub form_retry_wait_ms: u64,
    /// Diff characters sent to the LLM.
    pub diff_prompt_chars: usize,
    /// Diff characters included in the fallback PR body.
    pub fallback_diff_chars: usize,
    /// Click the create button after filling the form.
    pub submit: bool,
}

impl Default for CommitPrConfig {
    fn default() -> Self {
        Self {
            repo_path: None,
            repository: "Floorp-Projects/Floorp".into(),
            base_branch: "main".into(),
            default_commit_message: "chore: automated commit".into(),
            title_selector: "#pull_request_title".into(),
            body_selector: "#pull_request_body".into(),
            submit_selectors: strings(&[".hx_create-pr-button", "button.btn-primary"]),
            form_wait_ms: 20_000,
            form_retry_wait_ms: 10_000,
            diff_prompt_chars: 12_000,
            fallback_diff_chars: 1_000,
            submit: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Expense classification
// ---------------------------------------------------------------------------

/// A bookkeeping account offered to the classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpenseCategory {
    pub key: String,
    pub name: String,
    pub description: String,
}

/// `[expenses]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpensesConfig {
    /// Directory scanned (non-recursively) for PDF receipts and invoices.
    pub input_dir: String,
    pub output_file: String,
    pub ocr_model: String,
    pub ocr_base_url: String,
    /// Keep only documents issued in this year; `0` keeps everything.
    pub target_year: i32,
    /// OCR text characters sent to the LLM per document.
    pub ocr_prompt_chars: usize,
    /// Key used when the LLM fails or answers with an unknown key.
    pub fallback_category: String,
    pub categories: Vec<ExpenseCategory>,
}

impl Default for ExpensesConfig {
    fn default() -> Self {
        let category = |key: &str, name: &str, description: &str| ExpenseCategory {
            key: key.into(),
            name: name.into(),
            description: description.into(),
        };
        Self {
            input_dir: "./invoices".into(),
            output_file: "expenses.json".into(),
            ocr_model: "glm-ocr:latest".into(),
            ocr_base_url: "http://127.0.0.1:11434".into(),
            target_year: 0,
            ocr_prompt_chars: 1_500,
            fallback_category: "miscellaneous".into(),
            categories: vec![
                category("rent", "Rent", "Office or shop rent"),
                category("utilities", "Utilities", "Electricity, gas, water"),
                category("communication", "Communication", "Phone, internet, server costs"),
                category("travel", "Travel", "Trains, taxis, flights, lodging"),
                category("entertainment", "Entertainment", "Client meals and gifts"),
                category("supplies", "Supplies", "Stationery, sundries, small equipment"),
                category("equipment", "Equipment", "Depreciable computers and devices"),
                category("software", "Software", "Subscriptions, software, cloud services"),
                category("outsourcing", "Outsourcing", "Contractor and freelancer payments"),
                category("advertising", "Advertising", "Web ads, print, PR"),
                category("insurance", "Insurance", "Business insurance"),
                category("books", "Books", "Books, technical books, newspapers, magazines"),
                category("membership", "Membership fees", "Associations and trade groups"),
                category("repair", "Repairs", "Repairs to equipment or premises"),
                category("tax_payment", "Taxes and dues", "Business, stamp and property taxes"),
                category("shipping", "Shipping", "Delivery and packing"),
                category("training", "Training", "Seminars, courses, certifications"),
                category("miscellaneous", "Miscellaneous", "Anything not covered above"),
                category("non_deductible", "Not deductible", "Private use, not an expense"),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace to editor
// ---------------------------------------------------------------------------

/// `[workspace]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Checkout root for repositories without an owner mapping.
    pub repo_base_dir: String,
    /// Lower-case GitHub owner to the directory holding its checkouts.
    pub owner_dirs: BTreeMap<String, String>,
    /// `localhost` port to the project served on it.
    pub port_dirs: BTreeMap<String, String>,
    /// Ask the LLM which inactive windows are unrelated and close them.
    pub close_windows: bool,
    /// Windows whose title contains one of these (case-insensitive) stay open.
    pub protected_windows: Vec<String>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo_base_dir: "./src".into(),
            owner_dirs: BTreeMap::new(),
            port_dirs: BTreeMap::new(),
            close_windows: false,
            protected_windows: strings(&[
                "floorp", "firefox", "chrome", "safari", "edge", "code", "vscode",
                "visual studio", "cursor", "terminal", "iterm", "warp", "alacritty",
                "windowmanager", "dock", "finder", "systemuiserver", "spotlight", "controlcenter",
            ]),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar to form
// ---------------------------------------------------------------------------

/// `[calendar]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub form_url: String,
    /// Days ahead (from tomorrow) considered for free dates.
    pub days: u32,
    pub skip_weekends: bool,
    /// Left empty to use the mail client's identity.
    pub name: String,
    pub email: String,
    pub name_selector: String,
    pub email_selector: String,
    pub date_selector: String,
    /// `{slot}` is replaced with the preferred time slot.
    pub time_slot_selector: String,
    pub preferred_time_slots: Vec<String>,
    pub remarks_selector: String,
    pub remarks: String,
    pub idle_timeout_ms: u64,
    pub settle_ms: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            form_url: String::new(),
            days: 14,
            skip_weekends: true,
            name: String::new(),
            email: String::new(),
            name_selector: "input[aria-labelledby='i1']".into(),
            email_selector: "input[aria-labelledby='i5']".into(),
            date_selector: "input[type='date']".into(),
            time_slot_selector: "div[aria-label='{slot}']".into(),
            preferred_time_slots: strings(&["10:00-12:00", "13:00-15:00", "15:00-17:00", "17:00-19:00"]),
            remarks_selector: "textarea".into(),
            remarks: "Filled in automatically from my calendar".into(),
            idle_timeout_ms: 10_000,
            settle_ms: 2_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.researchkit/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ResearchError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.researchkit/researchkit.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ResearchError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ResearchError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ResearchError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ResearchError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ResearchError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the LLM API key from the env var named in the config.
pub fn resolve_api_key(config: &LlmConfig) -> Result<String> {
    let var_name = &config.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ResearchError::config(format!(
            "LLM API key not found. Set the {var_name} environment variable.\n\
             Get a key at https://openrouter.ai/keys"
        ))),
    }
}

/// Check that the LLM API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    resolve_api_key(&config.llm).map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("max_page_chars"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.subscriptions.max_page_chars, 14_000);
        assert_eq!(parsed.subscriptions.sources.len(), 4);
        assert_eq!(parsed.web_research.max_results, 30);
        assert_eq!(parsed.llm.api_key_env, "OPENROUTER_API_KEY");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml_str = r#"
[browser]
backend = "static"

[web_research]
query = "tokio"
max_results = 5

[output]
dir = "/tmp/reports"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.browser.backend, BrowserBackend::Static);
        assert_eq!(config.web_research.query, "tokio");
        assert_eq!(config.web_research.max_results, 5);
        assert_eq!(config.web_research.content_chars, 2_000);
        assert_eq!(config.output.dir, "/tmp/reports");
        assert_eq!(config.repos.repos.len(), 7);
        assert_eq!(config.calendar.days, 14);
    }

    #[test]
    fn desktop_sections_parse_maps() {
        let toml_str = r#"
[expenses]
input_dir = "/data/receipts"
target_year = 2025

[workspace]
repo_base_dir = "/home/dev/src"
close_windows = true

[workspace.owner_dirs]
floorp-projects = "/home/dev/src/floorp"

[workspace.port_dirs]
"5173" = "/home/dev/src/site"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.expenses.target_year, 2025);
        assert_eq!(config.expenses.categories.len(), 19);
        assert_eq!(config.workspace.owner_dirs["floorp-projects"], "/home/dev/src/floorp");
        assert_eq!(config.workspace.port_dirs["5173"], "/home/dev/src/site");
        assert!(config.workspace.protected_windows.iter().any(|w| w == "terminal"));
    }

    #[test]
    fn subscription_defaults_match_known_services() {
        let config = SubscriptionsConfig::default();
        let keys: Vec<&str> = config.services.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["cursor", "copilot", "openai", "claude", "zai"]);
        assert!(config.include_inactive);
        let link = &config.sources[0];
        let list = link.list_detail.as_ref().expect("link uses list/detail");
        assert!(list.item.contains("{n}"));
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "RK_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
