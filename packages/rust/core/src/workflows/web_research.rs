//! Web deep research: search, visit every result, summarize and categorize
//! each page, then write a survey-style report.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, instrument};

use researchkit_host::Browser;
use researchkit_llm::ChatModel;
use researchkit_shared::{AnalyzedResult, Category, Result, SearchResult, WebResearchConfig};

use crate::classify::classify;
use crate::collect::{
    PageLoad, close_tab, fill_query, longest_text, nth, open_page, read_attribute, read_text,
};
use crate::markdown::Table;
use crate::output::{RunRecorder, resolve_output};
use crate::parse::{clean_text, extract_domain};
use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome, pause};
use crate::reduce::truncate_chars;
use crate::report::{Section, SurveyReport};
use crate::workflows::{generate, today};

pub const WORKFLOW: &str = "web_research";

const ANALYSIS_FAILED: &str = "(analysis failed)";

const WRITER_SYSTEM: &str = "You are an expert researcher. Use a formal academic tone.";

const FINDINGS_SYSTEM: &str = "You are an expert research analyst. \
Use a formal academic tone with detailed explanations. \
Structure your response with clear paragraphs and comprehensive analysis. \
Always cite source numbers like [1], [3], [5] when referring to specific information.";

fn summary_system(query: &str) -> String {
    format!(
        "You are a research analyst. Analyze the following web page content about {query} and \
         provide: 1) key information about {query}, 2) the context or perspective of this source. \
         Answer in 2-3 sentences."
    )
}

/// The free-text report sections written from all page summaries.
#[derive(Debug, Clone, Copy)]
enum Part {
    Abstract,
    Overview,
    Discussion,
    Conclusions,
}

impl Part {
    fn name(self) -> &'static str {
        match self {
            Self::Abstract => "abstract",
            Self::Overview => "overview",
            Self::Discussion => "discussion",
            Self::Conclusions => "conclusions",
        }
    }

    fn prompt(self, topic: &str, summaries: &str, count: usize) -> String {
        match self {
            Self::Abstract => format!(
                "Based on the analysis of the following {count} web sources, write a comprehensive \
                 abstract (200-250 words) about \"{topic}\". Cover the background, scope, main \
                 findings and significance.\n\nSource summaries:\n{summaries}"
            ),
            Self::Overview => format!(
                "Write an Overview section (300-400 words) explaining what \"{topic}\" is, its \
                 characteristics, history and current state, based on the collected \
                 sources.\n\nSource summaries:\n{summaries}"
            ),
            Self::Discussion => format!(
                "Summarize the findings about \"{topic}\" in a Discussion section (250-300 words) \
                 covering trends, strengths, challenges and outlook.\n\nSource \
                 summaries:\n{summaries}"
            ),
            Self::Conclusions => format!(
                "Write the conclusions (150-200 words) of this study on \"{topic}\", with the key \
                 points and future potential."
            ),
        }
    }
}

/// Run the web research workflow for `config.query`.
#[instrument(skip_all, fields(query = %config.query, max_results = config.max_results))]
pub async fn run<B: Browser, M: ChatModel>(
    browser: &B,
    llm: &M,
    config: &WebResearchConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let result = execute(browser, llm, config, output_dir, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<B: Browser, M: ChatModel>(
    browser: &B,
    llm: &M,
    config: &WebResearchConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let recorder = RunRecorder::start(WORKFLOW, resolve_output(output_dir, &config.output_file));
    let mut log = StepLog::new();
    let query = config.query.as_str();

    // --- Phase 1: Search ---
    progress.phase("Searching");
    let mut results = match search(browser, config).await {
        Ok(results) => results,
        Err(e) => {
            log.record(StepStage::Extraction, "search", &e);
            Vec::new()
        }
    };
    info!(count = results.len(), "search results collected");

    if results.is_empty() {
        let outcome = WorkflowOutcome::failure(WORKFLOW, "No search results collected").with_failures(log);
        return Ok(recorder.finish(outcome, None));
    }

    // --- Phase 2: Visit pages ---
    progress.phase("Extracting page content");
    let total = results.len();
    let mut extracted = 0;
    for (i, result) in results.iter_mut().enumerate() {
        progress.step(i + 1, total, &result.domain);
        if visit(browser, config, result, &mut log).await {
            extracted += 1;
        }
        pause(config.between_pages_ms).await;
    }
    let limited = total - extracted;
    info!(extracted, limited, "content extraction finished");

    // --- Phase 3: Summaries ---
    progress.phase("Analyzing pages");
    let system = summary_system(query);
    let mut analyzed = Vec::with_capacity(total);
    for (i, result) in results.iter().enumerate() {
        progress.step(i + 1, total, &result.title);
        let user = format!(
            "Page Title: {}\n\nContent:\n{}",
            result.page_title,
            truncate_chars(&result.content, config.summary_input_chars)
        );
        let summary = log.or(
            StepStage::Llm,
            format!("summary {}", result.url),
            generate(llm, &system, &user).await,
            ANALYSIS_FAILED.to_string(),
        );
        let category = classify(&format!("{} {}", result.domain, result.content));
        analyzed.push(AnalyzedResult {
            result: result.clone(),
            summary,
            category,
        });
    }

    // --- Phase 4: Synthesis ---
    progress.phase("Writing analysis");
    let summaries = analyzed
        .iter()
        .enumerate()
        .map(|(i, a)| format!("[{}] {}: {}", i + 1, a.result.title, a.summary))
        .collect::<Vec<_>>()
        .join("\n\n");

    let count = analyzed.len();
    let abstract_text = write_part(llm, &mut log, Part::Abstract, query, &summaries, count).await;
    let overview = write_part(llm, &mut log, Part::Overview, query, &summaries, count).await;

    let mut findings = Vec::with_capacity(config.findings.len());
    for (i, finding) in config.findings.iter().enumerate() {
        progress.step(i + 1, config.findings.len(), &finding.title);
        let prompt = format!(
            "{}\n\nSources:\n{}",
            finding.prompt.replace("{topic}", query),
            summaries
        );
        let text = log.or(
            StepStage::Llm,
            format!("finding {}", finding.id),
            generate(llm, FINDINGS_SYSTEM, &prompt).await,
            format!("({} detailed analysis failed)", finding.id),
        );
        findings.push((finding.title.clone(), text));
    }
    let discussion = write_part(llm, &mut log, Part::Discussion, query, &summaries, count).await;
    let conclusions = write_part(llm, &mut log, Part::Conclusions, query, &summaries, count).await;

    // --- Phase 5: Report ---
    progress.phase("Writing report");
    let stats = Stats {
        collected: total,
        extracted,
        limited,
        analyzed: analyzed.len(),
    };
    let report = build_report(query, &results, &analyzed, &stats, Narrative {
        abstract_text,
        overview,
        findings,
        discussion,
        conclusions,
    });
    let artifact = recorder.write_text(&report.render())?;

    let outcome = WorkflowOutcome::success(
        WORKFLOW,
        format!("Report written: {}", recorder.artifact_path().display()),
    )
    .with_count("results", total)
    .with_count("extracted", extracted)
    .with_count("limited", limited)
    .with_count("analyzed", analyzed.len())
    .with_failures(log);
    Ok(recorder.finish(outcome, Some(artifact)))
}

async fn write_part<M: ChatModel>(
    llm: &M,
    log: &mut StepLog,
    part: Part,
    topic: &str,
    summaries: &str,
    count: usize,
) -> String {
    let prompt = part.prompt(topic, summaries, count);
    log.or(
        StepStage::Llm,
        part.name(),
        generate(llm, WRITER_SYSTEM, &prompt).await,
        format!("({} generation failed)", part.name()),
    )
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Load the result page, expand it, and read up to `max_results` results.
async fn search<B: Browser>(browser: &B, config: &WebResearchConfig) -> Result<Vec<SearchResult>> {
    let url = fill_query(&config.search_url, &config.query);
    let load = PageLoad {
        wait_selector: Some(config.results_ready_selector.as_str()),
        wait_timeout_ms: config.search_timeout_ms,
        idle_timeout_ms: None,
        settle_ms: config.search_settle_ms,
    };
    let tab = open_page(browser, &url, &load).await?;

    for attempt in 1..=config.more_results_clicks {
        match browser.click(&tab, &config.more_results_selector).await {
            Ok(()) => {
                debug!(attempt, "loaded more results");
                pause(config.search_settle_ms).await;
            }
            Err(_) => {
                if browser.scroll_to(&tab, &config.scroll_selector).await.is_ok() {
                    pause(config.search_settle_ms).await;
                }
            }
        }
    }

    let mut results = Vec::new();
    for n in 1..=config.max_results + config.scan_slack {
        if results.len() >= config.max_results {
            break;
        }
        let item = nth(&config.item_selector, "n", n);
        let title_selector = format!("{item} {}", config.title_selector);

        let title = read_text(browser, &tab, &title_selector).await;
        if title.trim().is_empty() {
            continue;
        }
        let url = read_attribute(browser, &tab, &title_selector, "href").await;
        if url.is_empty() {
            continue;
        }
        if config.skip_domains.iter().any(|d| url.contains(d.as_str())) {
            debug!(%url, "skipping domain");
            continue;
        }

        let snippet = clean_text(&read_text(browser, &tab, &item).await);
        results.push(SearchResult {
            rank: results.len() as u32 + 1,
            title: clean_text(&title),
            domain: extract_domain(&url),
            url,
            snippet: truncate_chars(&snippet, config.snippet_chars),
            ..Default::default()
        });
    }

    close_tab(browser, &tab).await;
    Ok(results)
}

/// Fill in page title and content. `true` when enough text was extracted.
/// A page that cannot be opened falls back to its snippet.
async fn visit<B: Browser>(
    browser: &B,
    config: &WebResearchConfig,
    result: &mut SearchResult,
    log: &mut StepLog,
) -> bool {
    let load = PageLoad {
        wait_selector: None,
        wait_timeout_ms: 0,
        idle_timeout_ms: Some(config.page_idle_timeout_ms),
        settle_ms: config.page_settle_ms,
    };
    let tab = match open_page(browser, &result.url, &load).await {
        Ok(tab) => tab,
        Err(e) => {
            log.record(StepStage::Extraction, &result.url, &e);
            result.content = result.snippet.clone();
            return false;
        }
    };

    let title = clean_text(&read_text(browser, &tab, "title").await);
    result.page_title = if title.is_empty() { result.title.clone() } else { title };

    let content = longest_text(
        browser,
        &tab,
        &config.content_selectors,
        Some(config.content_stop_chars),
    )
    .await;
    result.content = truncate_chars(&clean_text(&content), config.content_chars);
    result.extracted_at = Some(Utc::now());
    close_tab(browser, &tab).await;

    let chars = result.content.chars().count();
    debug!(url = %result.url, chars, "page extracted");
    chars > config.min_content_chars
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

struct Stats {
    collected: usize,
    extracted: usize,
    limited: usize,
    analyzed: usize,
}

struct Narrative {
    abstract_text: String,
    overview: String,
    /// `(title, text)` per configured finding.
    findings: Vec<(String, String)>,
    discussion: String,
    conclusions: String,
}

fn build_report(
    query: &str,
    results: &[SearchResult],
    analyzed: &[AnalyzedResult],
    stats: &Stats,
    text: Narrative,
) -> SurveyReport {
    let collection = format!(
        "Data was collected in four steps:\n\n\
         1. **Search**: query the search engine for \"{query}\"\n\
         2. **URL collection**: keep the top {} result URLs\n\
         3. **Page visits**: open every URL in the browser\n\
         4. **Content extraction**: read the main text of each page",
        stats.collected
    );
    let pipeline = "```\nsearch → collect URLs → visit pages → extract content → AI analysis → \
                    summaries → report\n```"
        .to_string();

    let mut table = Table::new(["Metric", "Value"]).align_right(1);
    table
        .row(["Search results collected", stats.collected.to_string().as_str()])
        .row(["Content extracted", stats.extracted.to_string().as_str()])
        .row(["Limited or failed extractions", stats.limited.to_string().as_str()])
        .row(["Analyzed", stats.analyzed.to_string().as_str()]);

    let methodology = Section::new("Methodology", "")
        .with("Data Collection", collection)
        .with("Analysis Pipeline", pipeline)
        .with("Statistics", table.render());

    let mut key_findings = Section::new(
        "Key Findings",
        format!(
            "The {} collected sources were analyzed from the following perspectives.",
            analyzed.len()
        ),
    );
    for (title, body) in text.findings {
        key_findings = key_findings.with(title, body);
    }

    let mut sources = Section::new("Source Analysis", "");
    for category in Category::ALL {
        let items: Vec<&AnalyzedResult> = analyzed.iter().filter(|a| a.category == category).collect();
        if items.is_empty() {
            continue;
        }
        let body = items
            .iter()
            .map(|a| {
                format!(
                    "#### [{}] {}\n\n- **URL**: [{}]({})\n- **Analysis**: {}",
                    a.result.rank, a.result.title, a.result.domain, a.result.url, a.summary
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        sources = sources.with(format!("{} ({})", category.label(), items.len()), body);
    }

    SurveyReport {
        title: format!("{query}: Comprehensive Web Analysis Report"),
        generated: today(),
        summary: vec![
            format!(
                "This report collects and analyzes {} web sources about \"{query}\".",
                analyzed.len()
            ),
            "Every search result was visited individually, its content extracted, then \
             summarized and categorized with a language model."
                .to_string(),
        ],
        abstract_text: text.abstract_text,
        keywords: Vec::new(),
        sections: vec![
            Section::new("Overview", text.overview),
            methodology,
            key_findings,
            sources,
            Section::new("Discussion", text.discussion),
            Section::new("Conclusions", text.conclusions),
        ],
        references: results
            .iter()
            .map(|r| format!("\"{}.\" *{}*. {}", r.title, r.domain, r.url))
            .collect(),
        footer: vec![
            "This report was automatically generated by ResearchKit.".to_string(),
            "Analysis powered by AI-driven content extraction and synthesis.".to_string(),
            format!("Generated: {}", Utc::now().to_rfc3339()),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::workflows::testing::{host, temp_dir};
    use researchkit_shared::FindingSection;
    use researchkit_host::{HostBrowser, ScriptedTransport};
    use researchkit_llm::ScriptedChat;

    const LONG_PAGE: &str = "Floorp is a Firefox-based browser developed by Ablaze in Japan. \
        It ships vertical tabs, workspaces, a sidebar for web panels and deep UI customization.";

    fn test_config() -> WebResearchConfig {
        WebResearchConfig {
            query: "Floorp".into(),
            output_file: "web.md".into(),
            search_url: "https://search.example/?q={query}".into(),
            more_results_clicks: 1,
            item_selector: "li:nth-child({n}) article".into(),
            title_selector: "a.result-link".into(),
            max_results: 5,
            scan_slack: 0,
            content_selectors: vec!["main".into(), "body".into()],
            findings: vec![FindingSection {
                id: "3.1".into(),
                title: "Distinctive Features".into(),
                prompt: "Detail the features of {topic}.".into(),
            }],
            search_timeout_ms: 10,
            search_settle_ms: 0,
            page_idle_timeout_ms: 10,
            page_settle_ms: 0,
            between_pages_ms: 0,
            ..Default::default()
        }
    }

    fn script_search(transport: &researchkit_host::ScriptedTransport) {
        transport
            .fail("floorp.tabClick", "no more results button")
            .respond_when("floorp.tabElementText", "nth-child(1) article a.result-link", r#"{"text":"Floorp  Official"}"#)
            .respond_when("floorp.tabElementText", "nth-child(2) article a.result-link", r#"{"text":"Floorp video"}"#)
            .respond_when("floorp.tabElementText", "nth-child(3) article a.result-link", r#"{"text":"r/floorp"}"#)
            .respond_when("floorp.tabAttribute", "nth-child(1)", r#"{"value":"https://floorp.app/"}"#)
            .respond_when("floorp.tabAttribute", "nth-child(2)", r#"{"value":"https://www.youtube.com/watch?v=1"}"#)
            .respond_when("floorp.tabAttribute", "nth-child(3)", r#"{"value":"https://www.reddit.com/r/floorp"}"#)
            .respond_when("floorp.tabElementText", "nth-child(1) article", r#"{"text":"Floorp\n  browser"}"#)
            .respond_when("floorp.tabElementText", "nth-child(3) article", r#"{"text":"A forum thread"}"#);
    }

    #[tokio::test]
    async fn search_skips_domains_and_blank_items() {
        let (transport, browser) = host();
        script_search(&transport);

        let results = search(&browser, &test_config()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[0].title, "Floorp Official");
        assert_eq!(results[0].domain, "floorp.app");
        assert_eq!(results[0].snippet, "Floorp browser");
        assert_eq!(results[1].rank, 2);
        assert_eq!(results[1].domain, "www.reddit.com");
        assert_eq!(transport.calls_to("floorp.tabScrollTo").len(), 1);
        assert_eq!(transport.calls_to("floorp.destroyTabInstance").len(), 1);
    }

    #[tokio::test]
    async fn end_to_end_report() {
        let (transport, browser) = host();
        script_search(&transport);
        transport
            .fail_when("floorp.createTab", "reddit.com", "tab crashed")
            .respond_when("floorp.tabElementText", "main", &format!(r#"{{"text":"{LONG_PAGE}"}}"#));

        let llm = ScriptedChat::new();
        llm.on("Page Title:", "A Firefox fork with many customization options.")
            .on("comprehensive abstract", "The abstract.")
            .on("Overview section", "The overview.")
            .fail_on("Discussion section", "HTTP 500")
            .on("conclusions", "The conclusions.")
            .on("Detail the features of Floorp.", "Sidebar and workspaces [1].");

        let dir = temp_dir("web-research");
        let outcome = run(&browser, &llm, &test_config(), &dir, &SilentProgress).await;

        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.counts["results"], 2);
        assert_eq!(outcome.counts["extracted"], 1);
        assert_eq!(outcome.counts["limited"], 1);
        assert_eq!(outcome.failures.len(), 2);

        let md = std::fs::read_to_string(dir.join("web.md")).unwrap();
        assert!(md.starts_with("# Floorp: Comprehensive Web Analysis Report"));
        assert!(md.contains("| Search results collected | 2 |"));
        assert!(md.contains("| Content extracted | 1 |"));
        assert!(md.contains("### 3.1 Distinctive Features\n\nSidebar and workspaces [1]."));
        assert!(md.contains("### 4.1 Official & Developer Sources (1)"));
        assert!(md.contains("### 4.2 Community & Forums (1)"));
        assert!(md.contains("(discussion generation failed)"));
        assert!(md.contains("[1] \"Floorp Official.\" *floorp.app*. https://floorp.app/"));
        assert!(md.contains("- **URL**: [www.reddit.com](https://www.reddit.com/r/floorp)"));

        // the failed visit was summarized from its snippet
        let prompts = llm.prompts();
        assert!(prompts.iter().any(|(_, user)| user.contains("Content:\nA forum thread")));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn search_tab_failure_is_a_failed_run() {
        let transport = ScriptedTransport::new();
        transport.fail("floorp.createTab", "host unavailable");
        let browser = HostBrowser::new(transport);
        let llm = ScriptedChat::new();

        let dir = temp_dir("web-research-empty");
        let outcome = run(&browser, &llm, &test_config(), &dir, &SilentProgress).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.failures.len(), 1);
        assert!(llm.prompts().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
