//! Subscription research: read billing pages, extract line items with the
//! model, clean them up, price them against the vendors' pricing pages and
//! ask for savings recommendations.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, instrument};

use researchkit_host::Browser;
use researchkit_llm::{ChatModel, loose_string, parse_json_array, parse_json_object};
use researchkit_shared::{
    BillingPeriod, PricingCatalog, PricingPlan, Recommendation, ResearchError, Result,
    ServiceProfile, SubscriptionEntry, SubscriptionSource, SubscriptionStatus,
    SubscriptionsConfig,
};

use crate::collect::{PageLoad, close_tab, first_text, nth, open_page, page_text, read_text};
use crate::output::{RunRecorder, resolve_output};
use crate::parse::{detect_currency, normalize_notes, normalize_period, parse_date_like, parse_price};
use crate::pipeline::{ProgressReporter, StepLog, StepStage, WorkflowOutcome, pause};
use crate::reduce::{contains_any, reduce_text, truncate_chars};
use crate::report::subscriptions::render;

pub const WORKFLOW: &str = "subscriptions";

const EXTRACT_SYSTEM: &str = "You extract subscription entries from billing page text. \
IMPORTANT Distinguish between MERCHANT and SERVICE names: \
- Merchant names (BUILDJET OÜ, OpenAI OpCo) are payment processors, NOT the actual service. \
- Look for the actual service name in the detail panel heading (e.g., Cursor, ChatGPT Plus, Claude Pro, X Premium). \
- If a merchant name is mentioned, treat it as a note, not the service name. \
Return ONLY JSON array. Each item must include: \
service, plan, price, currency, billing_period, next_billing_date, source, notes. \
If unknown, use empty string. Preserve currency symbols like $, €, £, ¥, ￥ in price. \
For period: '年' = yearly, '月' = monthly, '日' should be ignored (likely a parse error). \
Do not add extra fields.";

const DETAIL_SYSTEM: &str = "Extract a SINGLE subscription entry from detail panel text. \
IMPORTANT: Distinguish between MERCHANT and SERVICE names. \
- Merchant names (BUILDJET OÜ, OpenAI OpCo) are payment processors, NOT the actual service. \
- Look for the actual service name in the detail panel heading (e.g., Cursor, ChatGPT Plus, Claude Pro, X Premium). \
- If a merchant name is mentioned, treat it as a note, not the service name. \
Return ONLY JSON object with: service, plan, price, currency, billing_period, next_billing_date, notes. \
If unknown, use empty string.";

const PRICING_SYSTEM: &str = "You extract pricing plans from a pricing page. \
Return ONLY JSON object with fields: service, pricing_url, plans, notes. \
Each plan item: name, price, currency, billing_period, tokens, model_notes. \
Use empty strings for unknown values. Preserve currency symbols like $, €, £, ¥, ￥ in price.";

const RECOMMEND_SYSTEM: &str = "You recommend savings and alternatives for programming AI subscriptions. \
Return ONLY JSON array. Each item fields: service, action, reason, alternatives.";

// ---------------------------------------------------------------------------
// Model output shapes
// ---------------------------------------------------------------------------

/// A line item as the model returns it; every field is free text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawEntry {
    #[serde(deserialize_with = "loose_string")]
    pub service: String,
    #[serde(deserialize_with = "loose_string")]
    pub plan: String,
    #[serde(deserialize_with = "loose_string")]
    pub price: String,
    #[serde(deserialize_with = "loose_string")]
    pub currency: String,
    #[serde(deserialize_with = "loose_string")]
    pub billing_period: String,
    #[serde(deserialize_with = "loose_string")]
    pub next_billing_date: String,
    #[serde(deserialize_with = "loose_string")]
    pub source: String,
    #[serde(deserialize_with = "loose_string")]
    pub notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPlan {
    #[serde(deserialize_with = "loose_string")]
    name: String,
    #[serde(deserialize_with = "loose_string")]
    price: String,
    #[serde(deserialize_with = "loose_string")]
    currency: String,
    #[serde(deserialize_with = "loose_string")]
    billing_period: String,
    #[serde(deserialize_with = "loose_string")]
    tokens: String,
    #[serde(deserialize_with = "loose_string")]
    model_notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCatalog {
    #[serde(deserialize_with = "loose_string")]
    service: String,
    #[serde(deserialize_with = "loose_string")]
    pricing_url: String,
    plans: Vec<RawPlan>,
    #[serde(deserialize_with = "loose_string")]
    notes: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRecommendation {
    #[serde(deserialize_with = "loose_string")]
    service: String,
    #[serde(deserialize_with = "loose_string")]
    action: String,
    #[serde(deserialize_with = "loose_string")]
    reason: String,
    #[serde(deserialize_with = "loose_string")]
    alternatives: String,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the subscription research workflow and write its Markdown report.
#[instrument(skip_all, fields(sources = config.sources.len()))]
pub async fn run<B: Browser, M: ChatModel>(
    browser: &B,
    llm: &M,
    config: &SubscriptionsConfig,
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
    config: &SubscriptionsConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let recorder = RunRecorder::start(WORKFLOW, resolve_output(output_dir, &config.output_file));
    let mut log = StepLog::new();

    // --- Phase 1: Collect billing pages ---
    progress.phase("Collecting subscriptions");
    let mut raw = Vec::new();
    let total = config.sources.len();
    for (i, source) in config.sources.iter().enumerate() {
        progress.step(i + 1, total, &source.label);
        info!(source = %source.id, url = %source.url, "collecting");
        match collect_source(browser, llm, config, source, &mut log).await {
            Ok(entries) => {
                info!(source = %source.id, count = entries.len(), "entries extracted");
                raw.extend(entries);
            }
            Err(e) => log.record(StepStage::Extraction, &source.id, &e),
        }
    }

    if raw.is_empty() {
        let outcome = WorkflowOutcome::failure(WORKFLOW, "No subscriptions extracted").with_failures(log);
        return Ok(recorder.finish(outcome, None));
    }

    // --- Phase 2: Normalize and filter ---
    progress.phase("Normalizing entries");
    let entries: Vec<SubscriptionEntry> = raw.iter().map(normalize).collect();
    let entries = filter_ai(entries, &config.ai_filter_keywords, &config.ai_exclude_keywords);
    let entries = mark_status(entries, &config.inactive_keywords);
    let entries = filter_noise(entries, &config.noise_keywords);
    let entries = filter_zero_price(entries, &config.zero_price_keep_keywords);
    let entries = if config.include_inactive {
        entries
    } else {
        active_only(entries)
    };
    let entries = dedupe(entries);
    debug!(count = entries.len(), "entries after filtering");

    // --- Phase 3: Pricing catalog ---
    progress.phase("Fetching pricing pages");
    let catalog = build_catalog(browser, llm, config, &entries, progress, &mut log).await;

    // --- Phase 4: Recommendations ---
    progress.phase("Generating recommendations");
    let recommendable = filter_recommendable(&entries);
    let recommendations = if recommendable.is_empty() {
        Vec::new()
    } else {
        let result = recommend(llm, &recommendable, &catalog).await;
        log.or(StepStage::Llm, "recommendations", result, Vec::new())
    };

    // --- Phase 5: Report ---
    progress.phase("Writing report");
    let markdown = render(&entries, &catalog, &recommendations);
    let artifact = recorder.write_text(&markdown)?;

    let outcome = WorkflowOutcome::success(
        WORKFLOW,
        format!("Report written: {}", recorder.artifact_path().display()),
    )
    .with_count("subscriptions", entries.len())
    .with_count("pricing", catalog.len())
    .with_count("recommendations", recommendations.len())
    .with_failures(log);
    Ok(recorder.finish(outcome, Some(artifact)))
}

// ---------------------------------------------------------------------------
// Collection
// ---------------------------------------------------------------------------

/// Open one billing page and extract its line items. Only opening the tab
/// is fatal for the source; model failures are recorded and yield nothing.
async fn collect_source<B: Browser, M: ChatModel>(
    browser: &B,
    llm: &M,
    config: &SubscriptionsConfig,
    source: &SubscriptionSource,
    log: &mut StepLog,
) -> Result<Vec<RawEntry>> {
    let load = PageLoad {
        wait_selector: Some(source.wait_selector.as_str()),
        wait_timeout_ms: config.wait_timeout_ms,
        idle_timeout_ms: Some(config.wait_timeout_ms),
        settle_ms: config.settle_ms,
    };
    let tab = open_page(browser, &source.url, &load).await?;

    for selector in &source.dismiss_selectors {
        if browser.click(&tab, selector).await.is_ok() {
            debug!(selector = %selector, "dismissed overlay");
            pause(config.click_settle_ms).await;
        }
    }

    let entries = match &source.list_detail {
        Some(list) => {
            let mut entries = Vec::new();
            for n in 1..=list.max_items {
                if let Err(e) = browser.click(&tab, &nth(&list.item, "n", n)).await {
                    debug!(source = %source.id, n, error = %e, "no more list items");
                    break;
                }
                pause(config.click_settle_ms).await;

                let detail = read_text(browser, &tab, &list.detail).await;
                if detail.trim().is_empty() {
                    continue;
                }
                let user = format!("Detail panel text:\n{detail}");
                let parsed = match llm.chat(DETAIL_SYSTEM, &user).await {
                    Ok(reply) => parse_json_object::<RawEntry>(&reply),
                    Err(e) => Err(e),
                };
                if let Some(entry) = log.recover(StepStage::Llm, format!("{} item {n}", source.id), parsed) {
                    entries.push(entry);
                }
            }
            entries
        }
        None => {
            let text = source_text(browser, &tab, source, config.max_page_chars).await;
            let result = extract_entries(llm, &source.id, &text).await;
            log.or(StepStage::Llm, &source.id, result, Vec::new())
        }
    };
    close_tab(browser, &tab).await;

    Ok(entries
        .into_iter()
        .map(|mut e| {
            if e.source.trim().is_empty() {
                e.source = source.id.clone();
            }
            e
        })
        .collect())
}

/// Preferred selectors first; otherwise the page text reduced to the lines
/// around the source keywords.
async fn source_text<B: Browser>(
    browser: &B,
    tab: &str,
    source: &SubscriptionSource,
    max_chars: usize,
) -> String {
    if let Some(text) = first_text(browser, tab, &source.preferred_selectors).await {
        return truncate_chars(&text, max_chars);
    }
    let text = page_text(browser, tab, max_chars * 2).await;
    reduce_text(&text, &source.keywords, max_chars)
}

async fn extract_entries<M: ChatModel>(llm: &M, source_id: &str, text: &str) -> Result<Vec<RawEntry>> {
    if text.trim().is_empty() {
        return Err(ResearchError::validation("no page text collected"));
    }
    let user = format!("Source: {source_id}\nText:\n{text}");
    let reply = llm.chat(EXTRACT_SYSTEM, &user).await?;
    parse_json_array(&reply)
}

// ---------------------------------------------------------------------------
// Normalization and filters
// ---------------------------------------------------------------------------

/// Turn a model line item into a typed entry with parsed price fields.
pub fn normalize(raw: &RawEntry) -> SubscriptionEntry {
    let raw_price = raw.price.trim();
    let parsed = parse_price(raw_price);

    let mut currency = if parsed.currency.is_empty() {
        raw.currency.trim().to_string()
    } else {
        parsed.currency.clone()
    };
    if currency.is_empty() {
        currency = detect_currency(raw_price).to_string();
    }

    // ~$200 Cursor charges without a stated period are annual plans.
    let mut period = parsed.period;
    if raw.service.to_lowercase().contains("cursor")
        && (180.0..=220.0).contains(&parsed.amount)
        && period == BillingPeriod::Unknown
    {
        period = BillingPeriod::Yearly;
    }
    let billing_period = if raw.billing_period.trim().is_empty() {
        period
    } else {
        normalize_period(&raw.billing_period)
    };

    SubscriptionEntry {
        service: raw.service.trim().to_string(),
        plan: raw.plan.trim().to_string(),
        price: parsed.amount,
        currency,
        billing_period,
        next_billing_date: raw.next_billing_date.trim().to_string(),
        source: raw.source.trim().to_string(),
        status: SubscriptionStatus::Unknown,
        notes: normalize_notes(&raw.notes),
        raw_price: raw_price.to_string(),
    }
}

/// Keep AI-related entries. An entry billed under a merchant name (matched
/// by `exclude`) survives only when its plan names an AI product, which then
/// becomes the service; the merchant moves into the notes.
pub fn filter_ai(
    entries: Vec<SubscriptionEntry>,
    keywords: &[String],
    exclude: &[String],
) -> Vec<SubscriptionEntry> {
    if keywords.is_empty() {
        return entries;
    }

    entries
        .into_iter()
        .filter_map(|e| {
            if !contains_any(&format!("{} {}", e.service, e.plan), keywords) {
                return None;
            }
            if !contains_any(&e.service, exclude) {
                return Some(e);
            }
            if !contains_any(&e.plan, keywords) {
                return None;
            }

            let merchant = if e.service.is_empty() {
                String::new()
            } else {
                format!("Merchant: {}", e.service)
            };
            let notes = [merchant.as_str(), e.notes.as_str()]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            let plan = if e.plan.to_lowercase() == e.service.to_lowercase() {
                String::new()
            } else {
                e.plan.clone()
            };
            let service = if e.plan.is_empty() { e.service.clone() } else { e.plan.clone() };

            Some(SubscriptionEntry {
                service,
                plan,
                notes,
                ..e
            })
        })
        .collect()
}

/// Active unless service, plan, notes or period mention an inactive keyword.
pub fn mark_status(entries: Vec<SubscriptionEntry>, inactive: &[String]) -> Vec<SubscriptionEntry> {
    entries
        .into_iter()
        .map(|mut e| {
            let haystack = format!("{} {} {} {}", e.service, e.plan, e.notes, e.billing_period);
            e.status = if contains_any(&haystack, inactive) {
                SubscriptionStatus::Inactive
            } else {
                SubscriptionStatus::Active
            };
            e
        })
        .collect()
}

/// Drop transaction-history rows that the model mistook for subscriptions.
pub fn filter_noise(entries: Vec<SubscriptionEntry>, noise: &[String]) -> Vec<SubscriptionEntry> {
    entries
        .into_iter()
        .filter(|e| !contains_any(&format!("{} {} {}", e.service, e.plan, e.notes), noise))
        .collect()
}

/// Drop zero-priced entries unless the raw price says free, trial and so on.
pub fn filter_zero_price(entries: Vec<SubscriptionEntry>, keep: &[String]) -> Vec<SubscriptionEntry> {
    entries
        .into_iter()
        .filter(|e| e.price > 0.0 || contains_any(&e.raw_price, keep))
        .collect()
}

pub fn active_only(entries: Vec<SubscriptionEntry>) -> Vec<SubscriptionEntry> {
    entries
        .into_iter()
        .filter(|e| e.status == SubscriptionStatus::Active)
        .collect()
}

/// Collapse entries with the same service, plan, price, currency and
/// period. The survivor holds the first position and the earliest parseable
/// next billing date.
pub fn dedupe(entries: Vec<SubscriptionEntry>) -> Vec<SubscriptionEntry> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut result: Vec<SubscriptionEntry> = Vec::new();

    for entry in entries {
        let key = format!(
            "{}|{}|{}|{}|{}",
            entry.service.to_lowercase(),
            entry.plan.to_lowercase(),
            entry.price,
            entry.currency.to_lowercase(),
            entry.billing_period,
        );
        match index.get(&key) {
            None => {
                index.insert(key, result.len());
                result.push(entry);
            }
            Some(&at) => {
                let existing = parse_date_like(&result[at].next_billing_date);
                let current = parse_date_like(&entry.next_billing_date);
                if let Some(current) = current {
                    if existing.is_none_or(|existing| current < existing) {
                        result[at] = entry;
                    }
                }
            }
        }
    }
    result
}

/// Entries worth sending to the recommender: a price or at least price text.
pub fn filter_recommendable(entries: &[SubscriptionEntry]) -> Vec<SubscriptionEntry> {
    entries
        .iter()
        .filter(|e| e.price > 0.0 || !e.raw_price.is_empty())
        .cloned()
        .collect()
}

/// First profile with an alias contained in `service` (case-insensitive).
pub fn service_profile<'a>(profiles: &'a [ServiceProfile], service: &str) -> Option<&'a ServiceProfile> {
    let lower = service.to_lowercase();
    profiles
        .iter()
        .find(|p| p.aliases.iter().any(|a| !a.is_empty() && lower.contains(&a.to_lowercase())))
}

// ---------------------------------------------------------------------------
// Pricing and recommendations
// ---------------------------------------------------------------------------

async fn build_catalog<B: Browser, M: ChatModel>(
    browser: &B,
    llm: &M,
    config: &SubscriptionsConfig,
    entries: &[SubscriptionEntry],
    progress: &dyn ProgressReporter,
    log: &mut StepLog,
) -> Vec<PricingCatalog> {
    // One catalog per known service, in first-seen order, named after the
    // last entry for that service.
    let mut services: Vec<(&ServiceProfile, &str)> = Vec::new();
    for entry in entries {
        let Some(profile) = service_profile(&config.services, &entry.service) else {
            continue;
        };
        match services.iter_mut().find(|(p, _)| p.key == profile.key) {
            Some(slot) => slot.1 = entry.service.as_str(),
            None => services.push((profile, entry.service.as_str())),
        }
    }

    let mut catalog = Vec::new();
    let total = services.len();
    for (i, (profile, name)) in services.into_iter().enumerate() {
        progress.step(i + 1, total, name);

        if profile.pricing_url.is_empty() {
            catalog.push(catalog_note(name, "", "pricing url not found"));
            continue;
        }

        let load = PageLoad {
            wait_selector: Some("body"),
            wait_timeout_ms: config.wait_timeout_ms,
            idle_timeout_ms: Some(config.wait_timeout_ms),
            settle_ms: config.settle_ms,
        };
        let tab = match open_page(browser, &profile.pricing_url, &load).await {
            Ok(tab) => tab,
            Err(e) => {
                log.record(StepStage::Extraction, &profile.pricing_url, &e);
                catalog.push(catalog_note(name, &profile.pricing_url, "pricing fetch failed"));
                continue;
            }
        };

        let text = page_text(browser, &tab, config.max_page_chars * 2).await;
        let text = if profile.raw_text {
            truncate_chars(&text, config.max_page_chars)
        } else {
            reduce_text(&text, &profile.keywords, config.max_page_chars)
        };
        close_tab(browser, &tab).await;

        let result = extract_pricing(llm, name, &profile.pricing_url, &text).await;
        match log.recover(StepStage::Llm, format!("pricing {name}"), result) {
            Some(item) => catalog.push(item),
            None => catalog.push(catalog_note(name, &profile.pricing_url, "llm parsing failed")),
        }
    }
    catalog
}

fn catalog_note(service: &str, url: &str, notes: &str) -> PricingCatalog {
    PricingCatalog {
        service: service.to_string(),
        pricing_url: url.to_string(),
        plans: Vec::new(),
        notes: notes.to_string(),
    }
}

async fn extract_pricing<M: ChatModel>(
    llm: &M,
    service: &str,
    url: &str,
    text: &str,
) -> Result<PricingCatalog> {
    let user = format!("Service: {service}\nPricing URL: {url}\nPage text:\n{text}");
    let reply = llm.chat(PRICING_SYSTEM, &user).await?;
    let raw: RawCatalog = parse_json_object(&reply)?;

    Ok(PricingCatalog {
        service: if raw.service.is_empty() { service.to_string() } else { raw.service },
        pricing_url: if raw.pricing_url.is_empty() { url.to_string() } else { raw.pricing_url },
        plans: raw
            .plans
            .into_iter()
            .map(|p| PricingPlan {
                name: p.name,
                price: p.price,
                currency: p.currency,
                billing_period: p.billing_period,
                tokens: p.tokens,
                model_notes: p.model_notes,
            })
            .collect(),
        notes: raw.notes,
    })
}

async fn recommend<M: ChatModel>(
    llm: &M,
    entries: &[SubscriptionEntry],
    catalog: &[PricingCatalog],
) -> Result<Vec<Recommendation>> {
    let encode = |e: serde_json::Error| ResearchError::validation(format!("JSON serialization failed: {e}"));
    let user = format!(
        "Subscriptions:\n{}\n\nPricing Catalog:\n{}",
        serde_json::to_string(entries).map_err(encode)?,
        serde_json::to_string(catalog).map_err(encode)?,
    );
    let reply = llm.chat(RECOMMEND_SYSTEM, &user).await?;
    let raw: Vec<RawRecommendation> = parse_json_array(&reply)?;

    Ok(raw
        .into_iter()
        .map(|r| Recommendation {
            service: r.service,
            action: r.action,
            reason: r.reason,
            alternatives: r.alternatives,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::manifest_path;
    use crate::pipeline::SilentProgress;
    use crate::workflows::testing::{host, temp_dir};
    use researchkit_llm::ScriptedChat;

    fn raw(service: &str, plan: &str, price: &str) -> RawEntry {
        RawEntry {
            service: service.into(),
            plan: plan.into(),
            price: price.into(),
            ..Default::default()
        }
    }

    fn kw(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_parses_price_fields() {
        let mut item = raw(" Claude ", "Pro", "$20.00/month");
        item.notes = "Includes  ClaudeCode×5".into();
        let e = normalize(&item);

        assert_eq!(e.service, "Claude");
        assert_eq!(e.price, 20.0);
        assert_eq!(e.currency, "USD");
        assert_eq!(e.billing_period, BillingPeriod::Monthly);
        assert_eq!(e.notes, "Includes Claude Code× 5");
        assert_eq!(e.raw_price, "$20.00/month");

        let yen = normalize(&raw("ChatGPT", "Plus", "3,000円"));
        assert_eq!(yen.price, 3000.0);
        assert_eq!(yen.currency, "JPY");
    }

    #[test]
    fn cursor_around_two_hundred_is_yearly() {
        assert_eq!(normalize(&raw("Cursor", "Pro", "$192")).billing_period, BillingPeriod::Yearly);
        assert_eq!(normalize(&raw("Cursor", "Pro", "$20")).billing_period, BillingPeriod::Unknown);
        assert_eq!(normalize(&raw("Other", "Pro", "$192")).billing_period, BillingPeriod::Unknown);

        let mut stated = raw("Cursor", "Pro", "$200");
        stated.billing_period = "月".into();
        assert_eq!(normalize(&stated).billing_period, BillingPeriod::Monthly);
    }

    #[test]
    fn merchant_rows_are_rewritten_to_the_product() {
        let entries = vec![
            normalize(&raw("BUILDJET OÜ merchant", "Cursor Pro", "$20")),
            normalize(&raw("Netflix", "Standard", "$15")),
            normalize(&raw("Payment processor", "Groceries", "$15")),
            normalize(&raw("GitHub Copilot", "Pro", "$10")),
        ];
        let kept = filter_ai(entries, &kw(&["cursor", "copilot"]), &kw(&["merchant", "payment"]));

        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].service, "Cursor Pro");
        assert_eq!(kept[0].plan, "Cursor Pro");
        assert_eq!(kept[0].notes, "Merchant: BUILDJET OÜ merchant");
        assert_eq!(kept[1].service, "GitHub Copilot");
    }

    #[test]
    fn status_noise_and_zero_price() {
        let mut canceled = normalize(&raw("Claude", "Pro", "$20"));
        canceled.notes = "Canceled on 2025-01-02".into();
        let entries = vec![
            canceled,
            normalize(&raw("ChatGPT", "Plus", "$20")),
            normalize(&raw("ChatGPT", "transaction history", "$20")),
            normalize(&raw("Copilot", "Free trial", "Free trial")),
            normalize(&raw("Copilot", "Business", "")),
        ];

        let marked = mark_status(entries, &kw(&["canceled"]));
        assert_eq!(marked[0].status, SubscriptionStatus::Inactive);
        assert_eq!(marked[1].status, SubscriptionStatus::Active);

        let clean = filter_noise(marked, &kw(&["history"]));
        assert_eq!(clean.len(), 4);

        let priced = filter_zero_price(clean, &kw(&["trial"]));
        assert_eq!(priced.len(), 3);
        assert_eq!(priced[2].raw_price, "Free trial");

        let active = active_only(priced);
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn dedupe_keeps_earliest_billing_date_in_first_position() {
        let mut a = normalize(&raw("Claude", "Pro", "$20"));
        a.next_billing_date = "2025-05-01".into();
        let b = normalize(&raw("Cursor", "Pro", "$20"));
        let mut c = normalize(&raw("claude", "pro", "$20"));
        c.next_billing_date = "2025年3月1日".into();
        let mut d = normalize(&raw("Claude", "Pro", "$20"));
        d.next_billing_date = "soon".into();

        let out = dedupe(vec![a, b, c, d]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].next_billing_date, "2025年3月1日");
        assert_eq!(out[1].service, "Cursor");
    }

    #[test]
    fn profiles_match_by_alias() {
        let config = SubscriptionsConfig::default();
        assert_eq!(service_profile(&config.services, "GitHub Copilot Pro").unwrap().key, "copilot");
        assert_eq!(service_profile(&config.services, "ChatGPT Plus").unwrap().key, "openai");
        assert!(service_profile(&config.services, "Netflix").is_none());
    }

    fn test_config() -> SubscriptionsConfig {
        SubscriptionsConfig {
            output_file: "subs.md".into(),
            sources: vec![SubscriptionSource {
                id: "billing".into(),
                label: "Billing".into(),
                url: "https://example.com/billing".into(),
                wait_selector: "body".into(),
                keywords: kw(&["plan"]),
                preferred_selectors: kw(&["#billing-panel"]),
                dismiss_selectors: Vec::new(),
                list_detail: None,
            }],
            services: vec![
                ServiceProfile {
                    key: "claude".into(),
                    aliases: kw(&["claude"]),
                    pricing_url: "https://example.com/claude-pricing".into(),
                    keywords: kw(&["pro"]),
                    raw_text: false,
                },
                ServiceProfile {
                    key: "openai".into(),
                    aliases: kw(&["chatgpt"]),
                    pricing_url: String::new(),
                    keywords: Vec::new(),
                    raw_text: false,
                },
            ],
            wait_timeout_ms: 10,
            settle_ms: 0,
            click_settle_ms: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn end_to_end_writes_report_and_manifest() {
        let (transport, browser) = host();
        transport
            .respond_when("floorp.tabElementText", "#billing-panel", r#"{"text":"Claude Pro $20/month"}"#)
            .respond_when("floorp.tabElementText", "body", r#"{"text":"Pro\n$20 / month\nMax\n$100 / month"}"#);

        let llm = ScriptedChat::new();
        llm.on(
            "You extract subscription entries",
            r#"```json
[{"service":"Claude","plan":"Pro","price":"$20/month","next_billing_date":"2025-06-01"},
 {"service":"ChatGPT","plan":"Plus","price":"$20","billing_period":"monthly"},
 {"service":"Netflix","plan":"Standard","price":"$15"}]
```"#,
        )
        .on(
            "You extract pricing plans",
            r#"{"plans":[{"name":"Pro","price":"$20","currency":"USD","billing_period":"monthly"}]}"#,
        )
        .on(
            "You recommend savings",
            r#"[{"service":"ChatGPT","action":"keep","reason":"daily use","alternatives":["Claude"]}]"#,
        );

        let dir = temp_dir("subscriptions");
        let outcome = run(&browser, &llm, &test_config(), &dir, &SilentProgress).await;

        assert!(outcome.ok, "{outcome:?}");
        assert_eq!(outcome.counts["subscriptions"], 2);
        assert_eq!(outcome.counts["pricing"], 2);
        assert_eq!(outcome.counts["recommendations"], 1);

        let report = std::fs::read_to_string(dir.join("subs.md")).unwrap();
        assert!(report.contains("| Claude | Pro | 20 | USD | monthly | 2025-06-01 | active | billing |"));
        assert!(!report.contains("Netflix"));
        assert!(report.contains("### Claude\n- Pricing URL: https://example.com/claude-pricing"));
        assert!(report.contains("### ChatGPT\n- Pricing URL: (not found)\n- Notes: pricing url not found"));
        assert!(report.contains("  - Alternatives: Claude"));
        assert!(manifest_path(&dir.join("subs.md")).exists());

        let extract = &llm.prompts()[0];
        assert!(extract.1.starts_with("Source: billing\nText:\nClaude Pro $20/month"));
        assert_eq!(transport.calls_to("floorp.destroyTabInstance").len(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn nothing_extracted_is_a_failed_run() {
        let (_transport, browser) = host();
        let llm = ScriptedChat::new();
        llm.on("You extract subscription entries", "[]");

        let dir = temp_dir("subscriptions-empty");
        let outcome = run(&browser, &llm, &test_config(), &dir, &SilentProgress).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "No subscriptions extracted");
        assert!(!dir.join("subs.md").exists());
        assert!(manifest_path(&dir.join("subs.md")).exists());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn list_detail_clicks_until_items_run_out() {
        let (transport, browser) = host();
        transport
            .fail_when("floorp.tabClick", "nth-child(3)", "no such element")
            .respond_when("floorp.tabElementText", ".detail", r#"{"text":"Cursor Pro $20 monthly"}"#);

        let llm = ScriptedChat::new();
        llm.on("SINGLE subscription", r#"{"service":"Cursor","plan":"Pro","price":"$20"}"#);

        let mut config = test_config();
        config.sources[0].list_detail = Some(researchkit_shared::ListDetailSelectors {
            item: "li:nth-child({n})".into(),
            detail: ".detail".into(),
            max_items: 10,
        });

        let mut log = StepLog::new();
        let entries = collect_source(&browser, &llm, &config, &config.sources[0], &mut log)
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source, "billing");
        assert_eq!(transport.calls_to("floorp.tabClick").len(), 3);
        assert!(log.is_empty());
    }
}
