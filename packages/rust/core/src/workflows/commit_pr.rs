//! Commit & PR: commit the editor's workspace with a generated message, push
//! it and fill GitHub's pull request form in the browser.

use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use researchkit_host::{Browser, Editor, Git, HostTransport};
use researchkit_llm::{ChatModel, loose_string, parse_json_object};
use researchkit_shared::{CommitPrConfig, ResearchError, Result};

use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome};
use crate::reduce::truncate_chars;
use crate::workflows::generate;

pub const WORKFLOW: &str = "commit_pr";

const COMMIT_SYSTEM: &str = "You write git commit messages in the Conventional Commits format \
(type(scope): summary). Given a diff, reply with a single concise commit message and nothing else.";

const PR_SYSTEM: &str = "You write GitHub pull request descriptions. Given a diff, reply with a \
JSON object only: {\"title\": \"short imperative title\", \"body\": \"Markdown with a summary \
and a bullet list of the changes\"}.";

#[derive(Debug, Default, Deserialize)]
struct PrDraft {
    #[serde(default, deserialize_with = "loose_string")]
    title: String,
    #[serde(default, deserialize_with = "loose_string")]
    body: String,
}

/// Host capabilities the workflow drives besides the browser.
pub struct Workspace<'a, T> {
    pub git: &'a Git<T>,
    pub editor: &'a Editor<T>,
}

#[instrument(skip_all, fields(repository = %config.repository))]
pub async fn run<B: Browser, T: HostTransport, M: ChatModel>(
    browser: &B,
    workspace: Workspace<'_, T>,
    llm: &M,
    config: &CommitPrConfig,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let result = execute(browser, workspace, llm, config, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<B: Browser, T: HostTransport, M: ChatModel>(
    browser: &B,
    workspace: Workspace<'_, T>,
    llm: &M,
    config: &CommitPrConfig,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let Workspace { git, editor } = workspace;
    let mut log = StepLog::new();

    // --- Phase 1: Repository state ---
    progress.phase("Reading repository");
    let repo = match &config.repo_path {
        Some(path) => path.clone(),
        None => editor.workspace_path().await?,
    };
    if repo.trim().is_empty() {
        return Err(ResearchError::config("could not determine the repository path"));
    }

    let branch = log
        .recover(StepStage::Host, "git branch", git.branch(&repo).await)
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| config.base_branch.clone());
    let diff = log
        .recover(StepStage::Host, "git diff", git.diff(&repo).await)
        .map(|d| d.combined)
        .unwrap_or_default();
    info!(%repo, %branch, diff_chars = diff.chars().count(), "repository state");

    // --- Phase 2: Commit & push ---
    progress.phase("Committing changes");
    let message = if diff.trim().is_empty() {
        config.default_commit_message.clone()
    } else {
        let prompt = truncate_chars(&diff, config.diff_prompt_chars);
        let generated = generate(llm, COMMIT_SYSTEM, &prompt)
            .await
            .map(|m| m.lines().next().unwrap_or_default().trim().to_string());
        log.or(StepStage::Llm, "commit message", generated, config.default_commit_message.clone())
    };

    let steps = [
        ("git add", git.add(&repo, None).await),
        ("git commit", git.commit(&repo, &message).await),
        ("git push", git.push(&repo).await),
    ];
    for (step, result) in steps {
        match result {
            Ok(out) if out.success => debug!(step, output = %out.output.trim(), "git ok"),
            Ok(out) => log.record(StepStage::Host, step, &ResearchError::host(step, out.output.trim())),
            Err(e) => log.record(StepStage::Host, step, &e),
        }
    }

    // --- Phase 3: Pull request form ---
    progress.phase("Opening pull request form");
    let url = compare_url(&config.repository, &config.base_branch, &branch);
    let tab = pr_tab(browser, &url, &config.base_branch, &branch).await?;

    if let Err(first) = browser
        .wait_for_element(&tab, &config.title_selector, config.form_wait_ms)
        .await
    {
        debug!(error = %first, "form not ready, waiting again");
        if let Err(e) = browser
            .wait_for_element(&tab, &config.title_selector, config.form_retry_wait_ms)
            .await
        {
            log.record(StepStage::Extraction, &config.title_selector, &e);
        }
    }

    let prompt = truncate_chars(&diff, config.diff_prompt_chars);
    let drafted = generate(llm, PR_SYSTEM, &prompt)
        .await
        .and_then(|text| parse_json_object::<PrDraft>(&text))
        .and_then(|d| {
            if d.title.trim().is_empty() {
                Err(ResearchError::Llm("PR draft without a title".into()))
            } else {
                Ok(d)
            }
        });
    let draft = log.or(StepStage::Llm, "pull request draft", drafted, PrDraft {
        title: message.clone(),
        body: format!(
            "Automated PR\n\n{}",
            truncate_chars(&diff, config.fallback_diff_chars)
        ),
    });

    let title_filled = fill(browser, &tab, &config.title_selector, &draft.title).await;
    let body_filled = fill(browser, &tab, &config.body_selector, &draft.body).await;
    if !(title_filled && body_filled) {
        warn!(title_filled, body_filled, "form fill failed, not creating the PR");
        let outcome = WorkflowOutcome::failure(
            WORKFLOW,
            format!("Form fill failed. Title filled: {title_filled}, Body filled: {body_filled}"),
        );
        return Ok(outcome.with_failures(log));
    }

    // --- Phase 4: Submit ---
    let submitted = if config.submit {
        progress.phase("Creating pull request");
        submit(browser, &tab, &config.submit_selectors, &mut log).await
    } else {
        false
    };

    info!(commit = %message, pr_title = %draft.title, submitted, "pull request prepared");
    let text = if submitted {
        "Full automation complete: commit, push, PR created"
    } else {
        "Commit pushed and PR form filled"
    };
    Ok(WorkflowOutcome::success(WORKFLOW, text)
        .with_count("submitted", usize::from(submitted))
        .with_failures(log))
}

/// `https://github.com/{repository}/compare/{base}...{branch}?expand=1`
pub fn compare_url(repository: &str, base: &str, branch: &str) -> String {
    format!("https://github.com/{repository}/compare/{base}...{branch}?expand=1")
}

/// Reuse an open compare tab for this branch, or open a new one.
async fn pr_tab<B: Browser>(browser: &B, url: &str, base: &str, branch: &str) -> Result<String> {
    let needle = format!("compare/{base}...{branch}");
    let tabs = browser.list_tabs().await.unwrap_or_else(|e| {
        debug!(error = %e, "could not list tabs");
        Vec::new()
    });

    if let Some(existing) = tabs.iter().find(|t| t.url.contains(&needle)) {
        info!(title = %existing.title, "reusing open compare tab");
        let tab = browser.attach_to_tab(&existing.browser_id).await?;
        if let Err(e) = browser.navigate_tab(&tab, url).await {
            debug!(%tab, error = %e, "navigation to expanded form failed");
        }
        return Ok(tab);
    }
    browser.create_tab(url).await
}

async fn fill<B: Browser>(browser: &B, tab: &str, selector: &str, value: &str) -> bool {
    match browser.fill_form(tab, selector, value).await {
        Ok(ok) => ok,
        Err(e) => {
            debug!(selector, error = %e, "fill failed");
            false
        }
    }
}

/// Click the first submit selector that works.
async fn submit<B: Browser>(browser: &B, tab: &str, selectors: &[String], log: &mut StepLog) -> bool {
    for selector in selectors {
        match browser.click(tab, selector).await {
            Ok(()) => return true,
            Err(e) => debug!(selector = %selector, error = %e, "submit click failed"),
        }
    }
    log.record(
        StepStage::Host,
        "submit",
        &ResearchError::host("floorp.tabClick", "no submit button could be clicked"),
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use researchkit_host::{HostBrowser, ScriptedTransport};
    use researchkit_llm::ScriptedChat;
    use serde_json::json;

    const DIFF: &str = r#"{"staged":"","unstaged":"","combined":"diff --git a/x b/x\n+hello"}"#;

    fn scripted() -> ScriptedTransport {
        let host = ScriptedTransport::new();
        host.respond("vscode.get_workspace_path", r#"{"path":"/work/floorp"}"#)
            .respond("git.getBranch", r#"{"branch":"feature/x"}"#)
            .respond("git.getDiff", DIFF)
            .respond("git.add", r#"{"success":true,"output":""}"#)
            .respond("git.commit", r#"{"success":true,"output":"1 file changed"}"#)
            .respond("floorp.createTab", r#"{"instanceId":"tab-1"}"#)
            .respond("floorp.tabFillForm", r#"{"ok":true}"#);
        host
    }

    fn test_config() -> CommitPrConfig {
        CommitPrConfig {
            form_wait_ms: 20_000,
            form_retry_wait_ms: 10_000,
            ..Default::default()
        }
    }

    #[test]
    fn compare_url_expands_form() {
        assert_eq!(
            compare_url("o/r", "main", "feat"),
            "https://github.com/o/r/compare/main...feat?expand=1"
        );
    }

    #[tokio::test]
    async fn reuses_tab_and_falls_back_to_second_submit() {
        let host = scripted();
        host.fail("git.push", "rejected")
            .respond(
                "floorp.listBrowserTabs",
                r#"[{"browserId":"b7","url":"https://github.com/o/r/compare/main...feature/x","title":"Compare"}]"#,
            )
            .respond("floorp.attachToTab", r#"{"instanceId":"tab-7"}"#)
            .fail_when("floorp.tabWaitForElement", "20000", "timeout")
            .fail_when("floorp.tabClick", ".hx_create-pr-button", "not found");
        let llm = ScriptedChat::new();
        llm.on("commit messages", "feat: greet users\n\nlonger body")
            .on("pull request", r#"```json
{"title":"Greet users","body":"Adds a greeting."}
```"#);

        let browser = HostBrowser::new(host.clone());
        let (git, editor) = (Git::new(host.clone()), Editor::new(host.clone()));
        let workspace = Workspace { git: &git, editor: &editor };
        let outcome = run(&browser, workspace, &llm, &test_config(), &SilentProgress).await;

        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.counts["submitted"], 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].subject, "git push");

        assert_eq!(host.calls_to("git.commit")[0].args[1], json!("feat: greet users"));
        assert!(host.calls_to("floorp.createTab").is_empty());
        assert_eq!(
            host.calls_to("floorp.navigateTab")[0].args[1],
            json!("https://github.com/Floorp-Projects/Floorp/compare/main...feature/x?expand=1")
        );
        assert_eq!(host.calls_to("floorp.tabWaitForElement").len(), 2);

        let fills = host.calls_to("floorp.tabFillForm");
        assert_eq!(fills[0].args[2], json!("Greet users"));
        assert_eq!(fills[1].args[2], json!("Adds a greeting."));

        let clicks = host.calls_to("floorp.tabClick");
        assert_eq!(clicks.len(), 2);
        assert_eq!(clicks[1].args[1], json!("button.btn-primary"));
    }

    #[tokio::test]
    async fn body_fill_failure_aborts_with_fallback_draft() {
        let host = scripted();
        host.respond("git.push", r#"{"success":true,"output":""}"#)
            .respond("floorp.listBrowserTabs", "[]")
            .respond_when("floorp.tabFillForm", "pull_request_body", r#"{"ok":false}"#);
        let llm = ScriptedChat::new();
        llm.on("commit messages", "feat: greet users");

        let browser = HostBrowser::new(host.clone());
        let (git, editor) = (Git::new(host.clone()), Editor::new(host.clone()));
        let workspace = Workspace { git: &git, editor: &editor };
        let outcome = run(&browser, workspace, &llm, &test_config(), &SilentProgress).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "Form fill failed. Title filled: true, Body filled: false");
        assert_eq!(
            host.calls_to("floorp.createTab")[0].args[0],
            json!("https://github.com/Floorp-Projects/Floorp/compare/main...feature/x?expand=1")
        );

        let fills = host.calls_to("floorp.tabFillForm");
        assert_eq!(fills[0].args[2], json!("feat: greet users"));
        assert!(fills[1].args[2].as_str().unwrap().starts_with("Automated PR\n\ndiff --git"));
        assert!(host.calls_to("floorp.tabClick").is_empty());
        assert_eq!(outcome.failures[0].stage, StepStage::Llm);
    }

    #[tokio::test]
    async fn configured_repo_skips_editor_and_empty_diff_uses_default_message() {
        let host = scripted();
        host.respond_when("git.getDiff", "/repos/app", r#"{"combined":""}"#)
            .respond("git.push", r#"{"success":true,"output":""}"#);
        let llm = ScriptedChat::new();
        llm.on("pull request", r#"{"title":"Chore","body":"Nothing to see."}"#);

        let config = CommitPrConfig {
            repo_path: Some("/repos/app".into()),
            submit: false,
            ..test_config()
        };
        let browser = HostBrowser::new(host.clone());
        let (git, editor) = (Git::new(host.clone()), Editor::new(host.clone()));
        let workspace = Workspace { git: &git, editor: &editor };
        let outcome = run(&browser, workspace, &llm, &config, &SilentProgress).await;

        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.message, "Commit pushed and PR form filled");
        assert!(host.calls_to("vscode.get_workspace_path").is_empty());
        assert_eq!(host.calls_to("git.getBranch")[0].args[0], json!("/repos/app"));
        assert_eq!(host.calls_to("git.commit")[0].args[1], json!("chore: automated commit"));
        assert!(host.calls_to("floorp.tabClick").is_empty());
    }
}
