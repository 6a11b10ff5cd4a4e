//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use researchkit_core::pipeline::{ProgressReporter, WorkflowOutcome};
use researchkit_core::workflows::{
    calendar, commit_pr, expenses, papers, repos, subscriptions, videos, web_research, workspace,
};
use researchkit_host::{
    BridgeTransport, Editor, Git, HostBrowser, Mail, Ocr, Spreadsheet, StaticBrowser, Windows,
};
use researchkit_llm::OpenRouterChat;
use researchkit_shared::{
    AppConfig, BrowserBackend, init_config, load_config, load_config_from, resolve_api_key,
    validate_api_key,
};
use tracing::info;

use crate::backend::AnyBrowser;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ResearchKit: browser-driven research and desktop automation.
#[derive(Parser)]
#[command(
    name = "researchkit",
    version,
    about = "Research workflows that drive a browser, an LLM and desktop apps to produce reports.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.researchkit/researchkit.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Browser backend, overriding `[browser] backend`.
    #[arg(long, global = true)]
    pub browser: Option<BrowserArg>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum BrowserArg {
    /// Real browser tabs through the host bridge.
    Host,
    /// Plain HTTP fetch, no JavaScript.
    Static,
}

impl From<BrowserArg> for BrowserBackend {
    fn from(arg: BrowserArg) -> Self {
        match arg {
            BrowserArg::Host => BrowserBackend::Host,
            BrowserArg::Static => BrowserBackend::Static,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Collect subscriptions from billing pages and research their pricing.
    Subscriptions {
        /// Report file (relative paths go under the output directory).
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Search the web for a query and write a research report.
    Web {
        query: String,

        #[arg(long)]
        max_results: Option<usize>,

        #[arg(short, long)]
        out: Option<String>,
    },

    /// Write a literature survey from academic search sites.
    Papers {
        topic: String,

        #[arg(short, long)]
        out: Option<String>,
    },

    /// Compare video search results across platforms in a spreadsheet.
    Videos {
        topic: String,

        #[arg(short, long)]
        out: Option<String>,
    },

    /// Compare repository stars and forks in a spreadsheet with a chart.
    Repos {
        #[arg(short, long)]
        out: Option<String>,
    },

    /// Commit the editor's workspace, push, and fill a GitHub PR form.
    #[command(name = "commit-pr")]
    CommitPr {
        /// Repository checkout (defaults to the editor's workspace).
        #[arg(long)]
        repo: Option<String>,

        /// Click the create button after filling the form.
        #[arg(long)]
        submit: Option<bool>,
    },

    /// OCR a folder of invoice PDFs and classify them into an expense ledger.
    Expenses {
        /// Folder of PDFs, overriding `[expenses] input_dir`.
        dir: Option<String>,

        /// Only keep documents issued in this year.
        #[arg(long)]
        year: Option<i32>,

        #[arg(short, long)]
        out: Option<String>,
    },

    /// Open the checkouts behind the browser's repository tabs in the editor.
    Workspace {
        /// Ask the LLM to close windows unrelated to the opened projects.
        #[arg(long)]
        close_windows: Option<bool>,
    },

    /// Pre-fill a scheduling form with free dates from the mail calendar.
    Calendar {
        /// Form to fill, overriding `[calendar] form_url`.
        form_url: Option<String>,

        /// Days ahead to search for free dates.
        #[arg(long)]
        days: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "researchkit=info",
        1 => "researchkit=debug",
        _ => "researchkit=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(&cli),
        };
    }

    let session = Session::load(&cli)?;
    match cli.command {
        Command::Subscriptions { out } => cmd_subscriptions(&session, out).await,
        Command::Web {
            query,
            max_results,
            out,
        } => cmd_web(&session, query, max_results, out).await,
        Command::Papers { topic, out } => cmd_papers(&session, topic, out).await,
        Command::Videos { topic, out } => cmd_videos(&session, topic, out).await,
        Command::Repos { out } => cmd_repos(&session, out).await,
        Command::CommitPr { repo, submit } => cmd_commit_pr(&session, repo, submit).await,
        Command::Expenses { dir, year, out } => cmd_expenses(&session, dir, year, out).await,
        Command::Workspace { close_windows } => cmd_workspace(&session, close_windows).await,
        Command::Calendar { form_url, days } => cmd_calendar(&session, form_url, days).await,
        Command::Config { .. } => Ok(()),
    }
}

fn resolved_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(browser) = cli.browser {
        config.browser.backend = browser.into();
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Session: resolved config plus the capabilities built from it
// ---------------------------------------------------------------------------

struct Session {
    config: AppConfig,
}

impl Session {
    fn load(cli: &Cli) -> Result<Self> {
        Ok(Self {
            config: resolved_config(cli)?,
        })
    }

    fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output.dir)
    }

    fn chat(&self) -> Result<OpenRouterChat> {
        validate_api_key(&self.config)?;
        let key = resolve_api_key(&self.config.llm)?;
        Ok(OpenRouterChat::new(&self.config.llm, key)?)
    }

    async fn bridge(&self) -> Result<BridgeTransport> {
        Ok(BridgeTransport::spawn(&self.config.host).await?)
    }

    /// Spawn the bridge only when the host browser is selected.
    async fn optional_bridge(&self) -> Result<Option<BridgeTransport>> {
        match self.config.browser.backend {
            BrowserBackend::Host => Ok(Some(self.bridge().await?)),
            BrowserBackend::Static => Ok(None),
        }
    }

    fn browser(&self, bridge: Option<&BridgeTransport>) -> Result<AnyBrowser> {
        match (self.config.browser.backend, bridge) {
            (BrowserBackend::Host, Some(transport)) => {
                Ok(AnyBrowser::Host(HostBrowser::new(transport.clone())))
            }
            (BrowserBackend::Host, None) => Err(eyre!("host browser selected but no bridge is running")),
            (BrowserBackend::Static, _) => {
                Ok(AnyBrowser::Static(StaticBrowser::new(&self.config.browser)?))
            }
        }
    }
}

async fn shutdown(bridge: Option<BridgeTransport>) -> Result<()> {
    if let Some(transport) = bridge {
        transport.shutdown().await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Workflow commands
// ---------------------------------------------------------------------------

async fn cmd_subscriptions(session: &Session, out: Option<String>) -> Result<()> {
    let llm = session.chat()?;
    let mut config = session.config.subscriptions.clone();
    if let Some(out) = out {
        config.output_file = out;
    }
    info!(sources = config.sources.len(), "starting subscription research");

    let bridge = session.optional_bridge().await?;
    let browser = session.browser(bridge.as_ref())?;
    let reporter = CliProgress::new();
    let outcome =
        subscriptions::run(&browser, &llm, &config, &session.output_dir(), &reporter).await;
    shutdown(bridge).await?;
    report(&outcome)
}

async fn cmd_web(
    session: &Session,
    query: String,
    max_results: Option<usize>,
    out: Option<String>,
) -> Result<()> {
    let llm = session.chat()?;
    let mut config = session.config.web_research.clone();
    config.query = query;
    if let Some(max) = max_results {
        config.max_results = max;
    }
    if let Some(out) = out {
        config.output_file = out;
    }
    info!(query = %config.query, max_results = config.max_results, "starting web research");

    let bridge = session.optional_bridge().await?;
    let browser = session.browser(bridge.as_ref())?;
    let reporter = CliProgress::new();
    let outcome = web_research::run(&browser, &llm, &config, &session.output_dir(), &reporter).await;
    shutdown(bridge).await?;
    report(&outcome)
}

async fn cmd_papers(session: &Session, topic: String, out: Option<String>) -> Result<()> {
    let llm = session.chat()?;
    let mut config = session.config.papers.clone();
    config.topic = topic;
    if let Some(out) = out {
        config.output_file = out;
    }
    info!(topic = %config.topic, "starting paper survey");

    let bridge = session.optional_bridge().await?;
    let browser = session.browser(bridge.as_ref())?;
    let reporter = CliProgress::new();
    let outcome = papers::run(&browser, &llm, &config, &session.output_dir(), &reporter).await;
    shutdown(bridge).await?;
    report(&outcome)
}

async fn cmd_videos(session: &Session, topic: String, out: Option<String>) -> Result<()> {
    let mut config = session.config.videos.clone();
    config.topic = topic;
    if let Some(out) = out {
        config.output_file = out;
    }
    info!(topic = %config.topic, "starting video comparison");

    let bridge = session.bridge().await?;
    let browser = session.browser(Some(&bridge))?;
    let sheet = Spreadsheet::new(bridge.clone());
    let reporter = CliProgress::new();
    let outcome = videos::run(&browser, &sheet, &config, &session.output_dir(), &reporter).await;
    shutdown(Some(bridge)).await?;
    report(&outcome)
}

async fn cmd_repos(session: &Session, out: Option<String>) -> Result<()> {
    let mut config = session.config.repos.clone();
    if let Some(out) = out {
        config.output_file = out;
    }
    info!(repos = config.repos.len(), "starting repository comparison");

    let bridge = session.bridge().await?;
    let browser = session.browser(Some(&bridge))?;
    let sheet = Spreadsheet::new(bridge.clone());
    let reporter = CliProgress::new();
    let outcome = repos::run(&browser, &sheet, &config, &session.output_dir(), &reporter).await;
    shutdown(Some(bridge)).await?;
    report(&outcome)
}

async fn cmd_commit_pr(session: &Session, repo: Option<String>, submit: Option<bool>) -> Result<()> {
    let llm = session.chat()?;
    let mut config = session.config.commit_pr.clone();
    if repo.is_some() {
        config.repo_path = repo;
    }
    if let Some(submit) = submit {
        config.submit = submit;
    }
    info!(repository = %config.repository, submit = config.submit, "starting commit & PR");

    let bridge = session.bridge().await?;
    let browser = session.browser(Some(&bridge))?;
    let git = Git::new(bridge.clone());
    let editor = Editor::new(bridge.clone());
    let workspace = commit_pr::Workspace {
        git: &git,
        editor: &editor,
    };
    let reporter = CliProgress::new();
    let outcome = commit_pr::run(&browser, workspace, &llm, &config, &reporter).await;
    shutdown(Some(bridge)).await?;
    report(&outcome)
}

async fn cmd_expenses(
    session: &Session,
    dir: Option<String>,
    year: Option<i32>,
    out: Option<String>,
) -> Result<()> {
    let llm = session.chat()?;
    let mut config = session.config.expenses.clone();
    if let Some(dir) = dir {
        config.input_dir = dir;
    }
    if let Some(year) = year {
        config.target_year = year;
    }
    if let Some(out) = out {
        config.output_file = out;
    }
    info!(dir = %config.input_dir, year = config.target_year, "starting expense classification");

    let bridge = session.bridge().await?;
    let ocr = Ocr::new(bridge.clone());
    let reporter = CliProgress::new();
    let outcome = expenses::run(&ocr, &llm, &config, &session.output_dir(), &reporter).await;
    shutdown(Some(bridge)).await?;
    report(&outcome)
}

async fn cmd_workspace(session: &Session, close_windows: Option<bool>) -> Result<()> {
    let mut config = session.config.workspace.clone();
    if let Some(close) = close_windows {
        config.close_windows = close;
    }
    // The LLM is only needed to pick windows to close.
    let llm = if config.close_windows {
        Some(session.chat()?)
    } else {
        None
    };
    info!(close_windows = config.close_windows, "starting workspace restore");

    let bridge = session.bridge().await?;
    let browser = session.browser(Some(&bridge))?;
    let editor = Editor::new(bridge.clone());
    let windows = Windows::new(bridge.clone());
    let desktop = workspace::Desktop {
        editor: &editor,
        windows: &windows,
    };
    let reporter = CliProgress::new();
    let outcome = workspace::run(&browser, desktop, llm.as_ref(), &config, &reporter).await;
    shutdown(Some(bridge)).await?;
    report(&outcome)
}

async fn cmd_calendar(session: &Session, form_url: Option<String>, days: Option<u32>) -> Result<()> {
    let mut config = session.config.calendar.clone();
    if let Some(url) = form_url {
        config.form_url = url;
    }
    if let Some(days) = days {
        config.days = days;
    }
    info!(form = %config.form_url, days = config.days, "starting calendar form fill");

    let bridge = session.bridge().await?;
    let browser = session.browser(Some(&bridge))?;
    let mail = Mail::new(bridge.clone());
    let reporter = CliProgress::new();
    let outcome = calendar::run(&browser, &mail, &config, &reporter).await;
    shutdown(Some(bridge)).await?;
    report(&outcome)
}

/// Print the outcome summary; a failed run becomes an error exit.
fn report(outcome: &WorkflowOutcome) -> Result<()> {
    println!();
    if outcome.ok {
        println!("  {}", outcome.message);
    } else {
        println!("  Failed: {}", outcome.message);
    }
    for (name, count) in &outcome.counts {
        println!("  {name:<16} {count}");
    }
    if let Some(path) = &outcome.output_path {
        println!("  Output:          {}", path.display());
    }
    if !outcome.failures.is_empty() {
        println!("  Step failures:   {}", outcome.failures.len());
        for failure in &outcome.failures {
            println!(
                "    [{:?}] {}: {}",
                failure.stage, failure.subject, failure.message
            );
        }
    }
    println!();

    if outcome.ok {
        Ok(())
    } else {
        Err(eyre!("{} run failed: {}", outcome.workflow, outcome.message))
    }
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
    phase: Mutex<String>,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self {
            spinner,
            phase: Mutex::new(String::new()),
        }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        if let Ok(mut phase) = self.phase.lock() {
            *phase = name.to_string();
        }
        self.spinner.set_message(name.to_string());
    }

    fn step(&self, current: usize, total: usize, detail: &str) {
        let phase = self.phase.lock().map(|p| p.clone()).unwrap_or_default();
        self.spinner
            .set_message(format!("{phase} [{current}/{total}] {detail}"));
    }

    fn done(&self, _outcome: &WorkflowOutcome) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config commands
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(cli: &Cli) -> Result<()> {
    let config = resolved_config(cli)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
