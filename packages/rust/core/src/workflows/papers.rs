//! Paper survey: scrape academic search sites for a topic, summarize the
//! papers and write a literature-survey report.

use std::path::Path;

use tracing::{debug, info, instrument};

use researchkit_host::Browser;
use researchkit_llm::ChatModel;
use researchkit_shared::{Paper, PaperSource, PapersConfig, Result};

use crate::collect::{close_tab, fill_query, nth, read_attribute, read_text};
use crate::markdown::Table;
use crate::output::{RunRecorder, resolve_output};
use crate::parse::clean_text;
use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome, pause};
use crate::reduce::truncate_chars;
use crate::report::{Section, SurveyReport};
use crate::workflows::{generate, today};

pub const WORKFLOW: &str = "papers";

const SUMMARY_FAILED: &str = "(summary failed)";

const SUMMARY_SYSTEM: &str = "You are a research paper summarizer. Summarize in 1-2 sentences.";

const ABSTRACT_SYSTEM: &str = "You are an academic researcher. Write a concise research abstract \
(150-200 words) that summarizes the current state of research on the given topic. Include: \
background, scope of this survey, key findings, and implications.";

const INTRODUCTION_SYSTEM: &str = "You are an academic researcher. Write an Introduction section \
(200-300 words) for a survey paper. Include: 1) Background and importance of the topic, \
2) Current challenges, 3) Purpose of this survey, 4) Structure overview. Use formal academic tone.";

const FINDINGS_SYSTEM: &str = "You are an academic researcher. Analyze the following paper \
summaries and write a detailed Findings section (400-500 words). Organize into 3-4 thematic \
categories. For each category: provide a heading, explain the key research direction, and cite \
relevant papers by number (e.g., [1], [3,5]). Use formal academic tone.";

const DISCUSSION_SYSTEM: &str = "You are an academic researcher. Write a Discussion section \
(200-300 words) that: 1) Synthesizes the key trends, 2) Identifies research gaps, 3) Suggests \
future research directions, 4) Discusses practical implications. Use formal academic tone.";

const CONCLUSIONS_SYSTEM: &str = "You are an academic researcher. Write a brief Conclusions \
section (100-150 words) that summarizes: 1) Main contributions of this survey, 2) Key takeaways, \
3) Final remarks on the importance of the topic. Use formal academic tone.";

/// Run the paper survey for `config.topic`.
#[instrument(skip_all, fields(topic = %config.topic, sources = config.sources.len()))]
pub async fn run<B: Browser, M: ChatModel>(
    browser: &B,
    llm: &M,
    config: &PapersConfig,
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
    config: &PapersConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let recorder = RunRecorder::start(WORKFLOW, resolve_output(output_dir, &config.output_file));
    let mut log = StepLog::new();
    let topic = config.topic.as_str();

    // --- Phase 1: Scrape sources ---
    progress.phase("Searching paper databases");
    let mut papers = Vec::new();
    for (i, source) in config.sources.iter().enumerate() {
        progress.step(i + 1, config.sources.len(), &source.name);
        match scrape_source(browser, source, topic, config.abstract_chars).await {
            Ok(found) => {
                info!(source = %source.name, count = found.len(), "papers collected");
                papers.extend(found);
            }
            Err(e) => log.record(StepStage::Extraction, &source.name, &e),
        }
    }

    if papers.is_empty() {
        let outcome = WorkflowOutcome::failure(WORKFLOW, "No papers collected").with_failures(log);
        return Ok(recorder.finish(outcome, None));
    }

    // --- Phase 2: Summaries ---
    progress.phase("Summarizing papers");
    let limit = papers.len().min(config.max_summaries);
    let mut summaries = vec![String::new(); papers.len()];
    for (i, paper) in papers.iter().take(limit).enumerate() {
        progress.step(i + 1, limit, &paper.title);
        let user = format!("Title: {}\nAbstract: {}", paper.title, paper.abstract_text);
        summaries[i] = log.or(
            StepStage::Llm,
            format!("summary {}", paper.title),
            generate(llm, SUMMARY_SYSTEM, &user).await,
            SUMMARY_FAILED.to_string(),
        );
    }

    // --- Phase 3: Survey sections ---
    progress.phase("Writing survey sections");
    let count = papers.len();
    let titles = papers
        .iter()
        .map(|p| format!("- {}", p.title))
        .collect::<Vec<_>>()
        .join("\n");
    let numbered = papers
        .iter()
        .zip(&summaries)
        .enumerate()
        .map(|(i, (p, s))| format!("{}. {}: {}", i + 1, p.title, s))
        .collect::<Vec<_>>()
        .join("\n");
    let names = config
        .sources
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let abstract_text = write_section(
        llm,
        &mut log,
        "abstract",
        ABSTRACT_SYSTEM,
        &format!("Topic: {topic}\n\nPapers analyzed:\n{titles}"),
    )
    .await;
    let introduction = write_section(
        llm,
        &mut log,
        "introduction",
        INTRODUCTION_SYSTEM,
        &format!("Topic: {topic}\n\nThis survey covers {count} papers from {names}."),
    )
    .await;
    let findings = write_section(
        llm,
        &mut log,
        "findings",
        FINDINGS_SYSTEM,
        &format!("Topic: {topic}\n\nPaper summaries:\n{numbered}"),
    )
    .await;
    let discussion = write_section(
        llm,
        &mut log,
        "discussion",
        DISCUSSION_SYSTEM,
        &format!("Topic: {topic}\n\nKey themes found in {count} papers about {topic}"),
    )
    .await;
    let conclusions = write_section(
        llm,
        &mut log,
        "conclusions",
        CONCLUSIONS_SYSTEM,
        &format!("Topic: {topic}\n\nThis survey analyzed {count} papers on {topic}"),
    )
    .await;

    // --- Phase 4: Report ---
    progress.phase("Writing report");
    let report = SurveyReport {
        title: format!("{}: A Survey of Current Research", capitalize(topic)),
        generated: today(),
        summary: Vec::new(),
        abstract_text,
        keywords: std::iter::once(topic.to_string())
            .chain(config.keywords.iter().cloned())
            .collect(),
        sections: vec![
            Section::new("Introduction", introduction),
            methodology(config, topic, &papers),
            Section::new("Key Findings", findings).with("Analyzed Papers", paper_details(&papers, &summaries)),
            Section::new("Discussion", discussion),
            Section::new("Conclusions", conclusions),
        ],
        references: papers.iter().map(reference).collect(),
        footer: vec![
            "This report was automatically generated by ResearchKit using AI-powered literature analysis."
                .to_string(),
        ],
    };
    let artifact = recorder.write_text(&report.render())?;

    let outcome = WorkflowOutcome::success(
        WORKFLOW,
        format!("Report written: {}", recorder.artifact_path().display()),
    )
    .with_count("papers", count)
    .with_count("summarized", limit)
    .with_failures(log);
    Ok(recorder.finish(outcome, Some(artifact)))
}

async fn write_section<M: ChatModel>(
    llm: &M,
    log: &mut StepLog,
    name: &str,
    system: &str,
    user: &str,
) -> String {
    log.or(
        StepStage::Llm,
        name,
        generate(llm, system, user).await,
        format!("({name} generation failed)"),
    )
}

// ---------------------------------------------------------------------------
// Scraping
// ---------------------------------------------------------------------------

/// Read up to `max_items` papers from one search site. The site is skipped
/// when its result list never appears.
async fn scrape_source<B: Browser>(
    browser: &B,
    source: &PaperSource,
    topic: &str,
    abstract_chars: usize,
) -> Result<Vec<Paper>> {
    let url = fill_query(&source.search_url, topic);
    let tab = browser.create_tab(&url).await?;

    if let Err(e) = browser
        .wait_for_element(&tab, &source.ready_selector, source.ready_timeout_ms)
        .await
    {
        close_tab(browser, &tab).await;
        return Err(e);
    }
    pause(source.settle_ms).await;

    let mut papers = Vec::new();
    for n in 1..=source.max_items {
        let item = nth(&source.item_selector, "n", n);
        let field = |selector: &str| format!("{item} {selector}");

        let title = clean_text(&read_text(browser, &tab, &field(&source.title_selector)).await);
        if title.is_empty() {
            debug!(source = %source.name, n, "no title, skipping");
            continue;
        }

        let authors = match &source.authors_selector {
            Some(sel) => clean_text(&read_text(browser, &tab, &field(sel)).await),
            None => String::new(),
        };
        let abstract_text = match &source.abstract_selector {
            Some(sel) => truncate_chars(
                &clean_text(&read_text(browser, &tab, &field(sel)).await),
                abstract_chars,
            ),
            None => String::new(),
        };
        let link = match &source.link_selector {
            Some(sel) => read_attribute(browser, &tab, &field(sel), "href").await,
            None => String::new(),
        };
        let citations = match &source.citations_selector {
            Some(sel) => citation_count(&read_text(browser, &tab, &field(sel)).await),
            None => String::new(),
        };

        papers.push(Paper {
            source: source.name.clone(),
            title,
            authors,
            abstract_text,
            link: if link.is_empty() { url.clone() } else { link },
            citations,
        });
    }

    close_tab(browser, &tab).await;
    Ok(papers)
}

/// Digits of a "Cited by 42" / "被引用数: 42" label; `"0"` for anything else.
fn citation_count(text: &str) -> String {
    if text.contains("Cited by") || text.contains("被引用数") {
        let digits: String = text.chars().filter(char::is_ascii_digit).collect();
        if !digits.is_empty() {
            return digits;
        }
    }
    "0".to_string()
}

// ---------------------------------------------------------------------------
// Report pieces
// ---------------------------------------------------------------------------

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn methodology(config: &PapersConfig, topic: &str, papers: &[Paper]) -> Section {
    let query = format!("\"{topic}\"");
    let mut table = Table::new(["Database", "Query", "Results"]).align_right(2);
    for source in &config.sources {
        let found = papers.iter().filter(|p| p.source == source.name).count();
        table.row([source.name.as_str(), query.as_str(), found.to_string().as_str()]);
    }
    table.row(["**Total**", "", format!("**{}**", papers.len()).as_str()]);

    let strategy = format!(
        "The literature search used the following academic databases:\n\n{}",
        table.render()
    );
    let per_source = config
        .sources
        .iter()
        .map(|s| s.max_items)
        .max()
        .unwrap_or_default();
    let criteria = format!(
        "The top {per_source} results of each database were selected and their title, authors \
         and abstract were collected. Each paper was summarized with a language model and the \
         main themes were extracted from the summaries."
    );

    Section::new("Methodology", "")
        .with("Search Strategy", strategy)
        .with("Selection Criteria", criteria)
}

fn paper_details(papers: &[Paper], summaries: &[String]) -> String {
    papers
        .iter()
        .zip(summaries)
        .enumerate()
        .map(|(i, (p, summary))| {
            let mut lines = vec![
                format!("#### [{}] {}", i + 1, p.title),
                String::new(),
                format!("- **Authors**: {}", p.authors),
                format!("- **Source**: {}", p.source),
            ];
            if !p.citations.is_empty() {
                lines.push(format!("- **Citations**: {}", p.citations));
            }
            lines.push(format!("- **Summary**: {summary}"));
            let short: String = p.link.chars().take(50).collect();
            lines.push(format!("- **Link**: [{short}...]({})", p.link));
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn reference(paper: &Paper) -> String {
    let authors = paper.authors.trim_start_matches("Authors: ");
    if authors.is_empty() {
        format!("\"{}.\" *{}*. Available: {}", paper.title, paper.source, paper.link)
    } else {
        format!(
            "{authors}. \"{}.\" *{}*. Available: {}",
            paper.title, paper.source, paper.link
        )
    }
}
