//! Workspace to editor: open the local checkouts behind the repositories and
//! dev servers shown in browser tabs, then optionally close unrelated windows.

use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, instrument};
use url::Url;

use researchkit_host::{Browser, Editor, HostTransport, TabInfo, Windows};
use researchkit_llm::{ChatModel, parse_json_array};
use researchkit_shared::{Result, WorkspaceConfig};

use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome};
use crate::workflows::generate;

pub const WORKFLOW: &str = "workspace";

const WINDOWS_SYSTEM: &str = "You help a developer focus on their current projects. Given the \
projects being opened and the titles of the other open windows, reply with a JSON array of the \
exact window titles that are unrelated to the work and can be closed. Reply with [] when every \
window is relevant.";

/// Desktop capabilities the workflow drives besides the browser.
pub struct Desktop<'a, T> {
    pub editor: &'a Editor<T>,
    pub windows: &'a Windows<T>,
}

#[instrument(skip_all, fields(close_windows = config.close_windows))]
pub async fn run<B: Browser, T: HostTransport, M: ChatModel>(
    browser: &B,
    desktop: Desktop<'_, T>,
    llm: Option<&M>,
    config: &WorkspaceConfig,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let result = execute(browser, desktop, llm, config, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<B: Browser, T: HostTransport, M: ChatModel>(
    browser: &B,
    desktop: Desktop<'_, T>,
    llm: Option<&M>,
    config: &WorkspaceConfig,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let Desktop { editor, windows } = desktop;
    let mut log = StepLog::new();

    // --- Phase 1: Tabs ---
    progress.phase("Reading browser tabs");
    let tabs = browser.list_tabs().await?;
    let projects = project_paths(&tabs, config);
    info!(tabs = tabs.len(), projects = projects.len(), "projects found");
    if projects.is_empty() {
        return Ok(WorkflowOutcome::failure(
            WORKFLOW,
            "No project paths could be extracted from tabs",
        )
        .with_count("tabs", tabs.len()));
    }

    // --- Phase 2: Open projects ---
    progress.phase("Opening projects in the editor");
    let mut opened = 0;
    for (i, path) in projects.iter().enumerate() {
        progress.step(i + 1, projects.len(), path);
        match editor.open_folder(path).await {
            Ok(()) => opened += 1,
            Err(e) => log.record(StepStage::Host, path, &e),
        }
    }

    // --- Phase 3: Unrelated windows ---
    let closed = match llm {
        Some(llm) if config.close_windows => {
            progress.phase("Closing unrelated windows");
            close_unrelated(windows, llm, config, &projects, &mut log).await
        }
        _ => 0,
    };

    let message = format!("Opened {opened} of {} projects", projects.len());
    Ok(WorkflowOutcome::success(WORKFLOW, message)
        .with_count("tabs", tabs.len())
        .with_count("opened", opened)
        .with_count("closed_windows", closed)
        .with_failures(log))
}

/// Local directories for the tabs, first occurrence wins.
pub fn project_paths(tabs: &[TabInfo], config: &WorkspaceConfig) -> Vec<String> {
    let mut paths: Vec<String> = Vec::new();
    for tab in tabs {
        match project_path(&tab.url, config) {
            Some(path) if !paths.contains(&path) => paths.push(path),
            Some(_) => {}
            None => debug!(url = %tab.url, "no project for tab"),
        }
    }
    paths
}

/// Map a tab URL to the checkout it belongs to.
///
/// GitHub owners resolve through `owner_dirs` (falling back to
/// `repo_base_dir`), GitLab repositories live under `repo_base_dir`,
/// `localhost` ports resolve through `port_dirs` and `file://` URLs keep the
/// first three directories of the path.
pub fn project_path(url: &str, config: &WorkspaceConfig) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if parsed.scheme() == "file" {
        return parsed.to_file_path().ok().map(|p| project_root(&p));
    }

    let host = parsed.host_str()?.trim_start_matches("www.");
    match host {
        "github.com" | "gitlab.com" => {
            let mut segments = parsed.path_segments()?.filter(|s| !s.is_empty());
            let owner = segments.next()?.to_lowercase();
            let repo = segments.next()?.trim_end_matches(".git");
            if repo.is_empty() {
                return None;
            }
            let base = match host {
                "github.com" => config.owner_dirs.get(&owner).unwrap_or(&config.repo_base_dir),
                _ => &config.repo_base_dir,
            };
            Some(join(base, repo))
        }
        "localhost" | "127.0.0.1" => {
            let port = parsed.port()?.to_string();
            config.port_dirs.get(&port).cloned()
        }
        _ => None,
    }
}

fn join(base: &str, name: &str) -> String {
    Path::new(base).join(name).to_string_lossy().into_owned()
}

fn project_root(path: &Path) -> String {
    let mut root = PathBuf::new();
    let mut depth = 0;
    for component in path.components() {
        if let Component::Normal(_) = component {
            if depth == 3 {
                break;
            }
            depth += 1;
        }
        root.push(component);
    }
    root.to_string_lossy().into_owned()
}

fn is_protected(title: &str, protected: &[String]) -> bool {
    let title = title.to_lowercase();
    protected.iter().any(|p| title.contains(&p.to_lowercase()))
}

/// Let the model pick unrelated windows and close them. Returns how many
/// were closed.
async fn close_unrelated<T: HostTransport, M: ChatModel>(
    windows: &Windows<T>,
    llm: &M,
    config: &WorkspaceConfig,
    projects: &[String],
    log: &mut StepLog,
) -> usize {
    let Some(titles) = log.recover(StepStage::Host, "window list", windows.inactive_titles().await)
    else {
        return 0;
    };
    if titles.is_empty() {
        return 0;
    }

    let prompt = format!(
        "Projects:\n{}\n\nOpen windows:\n{}",
        projects.join("\n"),
        titles.join("\n")
    );
    let picked = generate(llm, WINDOWS_SYSTEM, &prompt)
        .await
        .and_then(|text| parse_json_array::<String>(&text));
    let Some(picked) = log.recover(StepStage::Llm, "window selection", picked) else {
        return 0;
    };

    let mut closed = 0;
    for title in picked {
        if !titles.contains(&title) {
            debug!(%title, "not an open window");
            continue;
        }
        if is_protected(&title, &config.protected_windows) {
            debug!(%title, "protected window kept");
            continue;
        }
        match windows.close(&title).await {
            Ok(()) => closed += 1,
            Err(e) => log.record(StepStage::Host, title.as_str(), &e),
        }
    }
    info!(closed, "windows closed");
    closed
}
