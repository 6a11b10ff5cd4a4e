//! Repository comparison: star and fork counters for a list of repositories,
//! written to a spreadsheet with a column chart.

use std::path::Path;

use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use researchkit_host::{Browser, HostTransport, Spreadsheet};
use researchkit_shared::{RepoStats, RepoTarget, ReposConfig, ResearchError, Result};

use crate::collect::{close_tab, read_text};
use crate::output::{ArtifactMeta, RunRecorder, resolve_output};
use crate::parse::parse_count;
use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome};

pub const WORKFLOW: &str = "repos";

/// Counter selectors for a hosting site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSelectors {
    pub stars: &'static str,
    pub forks: &'static str,
}

const GITHUB: CounterSelectors = CounterSelectors {
    stars: "#repo-stars-counter-star",
    forks: "#repo-network-counter",
};

const GITLAB: CounterSelectors = CounterSelectors {
    stars: "a.star-count span, [data-testid='star-count'] span",
    forks: "a.forks, [data-testid='fork-count'], a[href$='/forks']",
};

/// Selectors for the site hosting `url`; anything not on GitLab is read as
/// GitHub.
pub fn counter_selectors(url: &str) -> CounterSelectors {
    if url.contains("gitlab.com") { GITLAB } else { GITHUB }
}

#[instrument(skip_all, fields(repos = config.repos.len()))]
pub async fn run<B: Browser, T: HostTransport>(
    browser: &B,
    sheet: &Spreadsheet<T>,
    config: &ReposConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let result = execute(browser, sheet, config, output_dir, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<B: Browser, T: HostTransport>(
    browser: &B,
    sheet: &Spreadsheet<T>,
    config: &ReposConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    if config.repos.is_empty() {
        return Err(ResearchError::config("no repositories configured in [repos]"));
    }
    let workbook = resolve_output(output_dir, &config.output_file);
    let recorder = RunRecorder::start(WORKFLOW, &workbook);
    let mut log = StepLog::new();

    // --- Phase 1: Counters ---
    progress.phase("Reading repository counters");
    let mut stats = Vec::with_capacity(config.repos.len());
    for (i, repo) in config.repos.iter().enumerate() {
        progress.step(i + 1, config.repos.len(), &repo.name);
        let counted = log
            .recover(
                StepStage::Extraction,
                &repo.name,
                read_counters(browser, repo, config.wait_timeout_ms).await,
            )
            .unwrap_or_else(|| RepoStats {
                name: repo.name.clone(),
                url: repo.url.clone(),
                ..Default::default()
            });
        info!(repo = %counted.name, stars = counted.stars, forks = counted.forks, "counters read");
        stats.push(counted);
    }

    // --- Phase 2: Spreadsheet ---
    progress.phase("Writing spreadsheet");
    let file = workbook.to_string_lossy();
    sheet
        .write_range(&file, &config.sheet, "A1", &rows(&stats))
        .await?;

    let range = format!("A1:C{}", stats.len() + 1);
    let charted = match sheet
        .create_chart(&file, &config.sheet, &range, &config.chart_type, &config.chart_title, &config.chart)
        .await
    {
        Ok(()) => 1,
        Err(e) => {
            log.record(StepStage::Host, format!("chart {range}"), &e);
            0
        }
    };

    let outcome = WorkflowOutcome::success(WORKFLOW, format!("Spreadsheet written: {file}"))
        .with_count("repos", stats.len())
        .with_count("charts", charted)
        .with_failures(log);
    Ok(recorder.finish(outcome, ArtifactMeta::from_file(&workbook)))
}

async fn read_counters<B: Browser>(browser: &B, repo: &RepoTarget, wait_ms: u64) -> Result<RepoStats> {
    let selectors = counter_selectors(&repo.url);
    let tab = browser.create_tab(&repo.url).await?;

    if let Err(e) = browser.wait_for_element(&tab, selectors.stars, wait_ms).await {
        debug!(repo = %repo.name, error = %e, "star counter did not appear");
    }
    let stars = read_text(browser, &tab, selectors.stars).await;
    let forks = read_text(browser, &tab, selectors.forks).await;
    close_tab(browser, &tab).await;

    debug!(repo = %repo.name, raw_stars = %stars.trim(), raw_forks = %forks.trim(), "raw counters");
    Ok(RepoStats {
        name: repo.name.clone(),
        url: repo.url.clone(),
        stars: parse_count(&stars),
        forks: parse_count(&forks),
    })
}

fn rows(stats: &[RepoStats]) -> Vec<Vec<Value>> {
    std::iter::once(vec![json!("Browser"), json!("Stars"), json!("Forks")])
        .chain(stats.iter().map(|s| vec![json!(s.name), json!(s.stars), json!(s.forks)]))
        .collect()
}
