//! Calendar to form: find free weekdays in the mail client's calendar and
//! pre-fill a scheduling form with them. The tab stays open for review.

use std::collections::BTreeSet;

use chrono::{Datelike, Days, Local, NaiveDate, Weekday};
use tracing::{debug, info, instrument, warn};

use researchkit_host::{Browser, CalendarEvent, HostTransport, Mail};
use researchkit_shared::{CalendarConfig, ResearchError, Result};

use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome, pause};

pub const WORKFLOW: &str = "calendar";

#[instrument(skip_all, fields(days = config.days))]
pub async fn run<B: Browser, T: HostTransport>(
    browser: &B,
    mail: &Mail<T>,
    config: &CalendarConfig,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let today = Local::now().date_naive();
    let result = execute(browser, mail, config, today, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<B: Browser, T: HostTransport>(
    browser: &B,
    mail: &Mail<T>,
    config: &CalendarConfig,
    today: NaiveDate,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    if config.form_url.trim().is_empty() {
        return Err(ResearchError::config("no form_url configured in [calendar]"));
    }
    let mut log = StepLog::new();

    // --- Phase 1: Calendar ---
    progress.phase("Reading calendar");
    let events = log
        .recover(StepStage::Host, "calendar events", mail.calendar_events(Some(config.days)).await)
        .unwrap_or_default();
    let busy = busy_dates(&events);
    let free = available_dates(today, config.days, &busy, config.skip_weekends);
    info!(events = events.len(), busy = busy.len(), free = free.len(), "calendar read");

    let Some(first) = free.first() else {
        let outcome = WorkflowOutcome::failure(
            WORKFLOW,
            format!("No free dates in the next {} days", config.days),
        );
        return Ok(outcome.with_count("events", events.len()).with_failures(log));
    };
    let date = first.format("%Y-%m-%d").to_string();

    // --- Phase 2: Identity ---
    let (name, email) = identity(mail, config, &mut log).await;

    // --- Phase 3: Form ---
    progress.phase("Filling the form");
    let tab = browser.create_tab(&config.form_url).await?;
    if let Err(e) = browser.wait_for_network_idle(&tab, config.idle_timeout_ms).await {
        debug!(%tab, error = %e, "form page not idle, filling anyway");
    }
    pause(config.settle_ms).await;

    let fields = [
        (config.name_selector.as_str(), name.as_str()),
        (config.email_selector.as_str(), email.as_str()),
        (config.date_selector.as_str(), date.as_str()),
    ];
    let mut filled = 0;
    for (selector, value) in fields {
        if value.is_empty() {
            debug!(selector, "nothing to fill");
            continue;
        }
        if fill(browser, &tab, selector, value, &mut log).await {
            filled += 1;
        }
    }

    if let Some(slot) = config.preferred_time_slots.first() {
        let selector = config.time_slot_selector.replace("{slot}", slot);
        if let Err(e) = browser.click(&tab, &selector).await {
            log.record(StepStage::Host, selector, &e);
        }
    }
    if !config.remarks.is_empty()
        && fill(browser, &tab, &config.remarks_selector, &config.remarks, &mut log).await
    {
        filled += 1;
    }

    info!(%date, filled, "form prepared");
    Ok(WorkflowOutcome::success(
        WORKFLOW,
        format!("Form filled for {date}, left open for review"),
    )
    .with_count("events", events.len())
    .with_count("available_dates", free.len())
    .with_count("fields_filled", filled)
    .with_failures(log))
}

/// Days taken by at least one event, as `YYYY-MM-DD`.
pub fn busy_dates(events: &[CalendarEvent]) -> BTreeSet<String> {
    events
        .iter()
        .filter_map(|e| {
            let source = if e.date.is_empty() { &e.start_time } else { &e.date };
            source.get(..10).map(str::to_string)
        })
        .collect()
}

/// Free days from tomorrow through `days` days ahead.
pub fn available_dates(
    today: NaiveDate,
    days: u32,
    busy: &BTreeSet<String>,
    skip_weekends: bool,
) -> Vec<NaiveDate> {
    (1..=u64::from(days))
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter(|d| !(skip_weekends && matches!(d.weekday(), Weekday::Sat | Weekday::Sun)))
        .filter(|d| !busy.contains(&d.format("%Y-%m-%d").to_string()))
        .collect()
}

/// Configured name and email, with blanks taken from the mail identity.
async fn identity<T: HostTransport>(
    mail: &Mail<T>,
    config: &CalendarConfig,
    log: &mut StepLog,
) -> (String, String) {
    if !config.name.is_empty() && !config.email.is_empty() {
        return (config.name.clone(), config.email.clone());
    }
    let found = log
        .recover(StepStage::Host, "mail identity", mail.identity().await)
        .unwrap_or_default();
    let pick = |configured: &str, found: String| {
        if configured.is_empty() { found } else { configured.to_string() }
    };
    (pick(&config.name, found.name), pick(&config.email, found.email))
}

async fn fill<B: Browser>(
    browser: &B,
    tab: &str,
    selector: &str,
    value: &str,
    log: &mut StepLog,
) -> bool {
    match browser.fill_form(tab, selector, value).await {
        Ok(true) => true,
        Ok(false) => {
            warn!(selector, "field not found");
            log.record(
                StepStage::Host,
                selector,
                &ResearchError::host("floorp.tabFillForm", "field was not filled"),
            );
            false
        }
        Err(e) => {
            log.record(StepStage::Host, selector, &e);
            false
        }
    }
}
