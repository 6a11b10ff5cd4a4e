//! Expense classification: OCR every PDF receipt in a directory, let the LLM
//! pick a bookkeeping account for each and write the ledger as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};

use researchkit_host::{HostTransport, Ocr, OcrDocument};
use researchkit_llm::{ChatModel, loose_string, parse_json_object};
use researchkit_shared::{Expense, ExpenseCategory, ExpensesConfig, ResearchError, Result};

use crate::output::{RunRecorder, resolve_output};
use crate::parse::parse_price;
use crate::pipeline::{ProgressReporter, StepFailure, StepLog, StepStage, WorkflowOutcome};
use crate::reduce::truncate_chars;
use crate::workflows::generate;

pub const WORKFLOW: &str = "expenses";

const DEFAULT_CURRENCY: &str = "JPY";

/// Fields the OCR model extracted; anything may be missing or mistyped.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractedFields {
    #[serde(deserialize_with = "loose_string")]
    doc_type: String,
    #[serde(deserialize_with = "loose_string")]
    vendor_name: String,
    #[serde(deserialize_with = "loose_string")]
    issue_date: String,
    total_amount: Value,
    tax_amount: Value,
    subtotal_amount: Value,
    #[serde(deserialize_with = "loose_string")]
    currency: String,
    #[serde(deserialize_with = "loose_string")]
    invoice_number: String,
    #[serde(deserialize_with = "loose_string")]
    order_number: String,
    #[serde(deserialize_with = "loose_string")]
    payment_method: String,
    line_items: Value,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    #[serde(default, deserialize_with = "loose_string")]
    key: String,
    #[serde(default, deserialize_with = "loose_string")]
    reason: String,
    #[serde(default)]
    business_ratio: Value,
}

#[instrument(skip_all, fields(dir = %config.input_dir))]
pub async fn run<T: HostTransport, M: ChatModel>(
    ocr: &Ocr<T>,
    llm: &M,
    config: &ExpensesConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> WorkflowOutcome {
    let result = execute(ocr, llm, config, output_dir, progress).await;
    let outcome = WorkflowOutcome::from_result(WORKFLOW, result);
    progress.done(&outcome);
    outcome
}

async fn execute<T: HostTransport, M: ChatModel>(
    ocr: &Ocr<T>,
    llm: &M,
    config: &ExpensesConfig,
    output_dir: &Path,
    progress: &dyn ProgressReporter,
) -> Result<WorkflowOutcome> {
    let recorder = RunRecorder::start(WORKFLOW, resolve_output(output_dir, &config.output_file));
    let mut log = StepLog::new();

    // --- Phase 1: Find documents ---
    progress.phase("Listing documents");
    let files = pdf_files(Path::new(&config.input_dir))?;
    info!(count = files.len(), "documents found");
    if files.is_empty() {
        return Ok(recorder.finish(WorkflowOutcome::failure(WORKFLOW, "No PDF files found"), None));
    }

    // --- Phase 2: OCR ---
    progress.phase("Reading documents");
    let mut documents: Vec<(Expense, String)> = Vec::new();
    for (i, path) in files.iter().enumerate() {
        let name = file_name(path);
        progress.step(i + 1, files.len(), &name);

        let read = ocr
            .extract_document(
                &path.to_string_lossy(),
                Some(config.ocr_model.as_str()),
                Some(config.ocr_base_url.as_str()),
            )
            .await;
        let Some(doc) = log.recover(StepStage::Extraction, &name, read) else {
            continue;
        };

        let expense = expense_from(&name, &doc);
        if !in_target_year(&expense.issue_date, config.target_year) {
            debug!(file = %name, date = %expense.issue_date, "outside target year, skipped");
            continue;
        }
        documents.push((expense, doc.text));
    }
    info!(count = documents.len(), failures = log.len(), "documents read");

    if documents.is_empty() {
        let outcome = WorkflowOutcome::failure(WORKFLOW, "No expenses extracted").with_failures(log);
        return Ok(recorder.finish(outcome, None));
    }

    // --- Phase 3: Classify ---
    progress.phase("Classifying expenses");
    let system = classifier_prompt(config);
    let total = documents.len();
    let mut expenses = Vec::with_capacity(total);
    for (i, (mut expense, text)) in documents.into_iter().enumerate() {
        progress.step(i + 1, total, &expense.vendor_name);
        let prompt = expense_prompt(&expense, &text, config.ocr_prompt_chars);
        let verdict = generate(llm, &system, &prompt)
            .await
            .and_then(|reply| parse_json_object::<Verdict>(&reply));
        match log.recover(StepStage::Llm, &expense.filename, verdict) {
            Some(verdict) => apply_verdict(&mut expense, verdict, config),
            None => {
                let fallback = &config.fallback_category;
                assign(&mut expense, fallback, "automatic classification failed", 100, config);
            }
        }
        debug!(file = %expense.filename, account = %expense.category_key, "classified");
        expenses.push(expense);
    }

    // --- Phase 4: Write ledger ---
    progress.phase("Writing ledger");
    let (artifact, grand_total, business_total) = {
        let ledger = Ledger::new(&expenses, config, log.failures());
        let json = serde_json::to_string_pretty(&ledger)
            .map_err(|e| ResearchError::validation(format!("JSON serialization failed: {e}")))?;
        let artifact = recorder.write_text(&json)?;
        (artifact, ledger.summary.grand_total, ledger.summary.business_total)
    };

    info!(expenses = expenses.len(), grand_total, business_total, "ledger written");
    let outcome = WorkflowOutcome::success(
        WORKFLOW,
        format!(
            "Classified {} expenses, {} deductible of {} total",
            expenses.len(),
            business_total,
            grand_total
        ),
    )
    .with_count("files", files.len())
    .with_count("expenses", expenses.len())
    .with_failures(log);
    Ok(recorder.finish(outcome, Some(artifact)))
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// PDF files directly inside `dir`, sorted by name.
pub fn pdf_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| ResearchError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn expense_from(filename: &str, doc: &OcrDocument) -> Expense {
    let fields: ExtractedFields =
        serde_json::from_value(doc.structured.clone()).unwrap_or_else(|e| {
            debug!(file = filename, error = %e, "no structured fields");
            ExtractedFields::default()
        });
    let or_default = |value: String, default: &str| {
        if value.trim().is_empty() {
            default.to_string()
        } else {
            value
        }
    };
    let line_items = match fields.line_items {
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    Expense {
        filename: filename.to_string(),
        doc_type: or_default(fields.doc_type, "unknown"),
        vendor_name: fields.vendor_name,
        issue_date: fields.issue_date,
        total_amount: amount(&fields.total_amount),
        tax_amount: amount(&fields.tax_amount),
        subtotal_amount: amount(&fields.subtotal_amount),
        currency: or_default(fields.currency, DEFAULT_CURRENCY),
        invoice_number: fields.invoice_number,
        order_number: fields.order_number,
        payment_method: fields.payment_method,
        line_items,
        ocr_quality: doc.text_quality,
        ..Default::default()
    }
}

/// Numbers pass through; text such as `"¥1,200"` is parsed.
fn amount(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_price(s).amount,
        _ => 0.0,
    }
}

/// `true` when `year` is 0, the date is unknown, or it starts with `year`.
pub fn in_target_year(issue_date: &str, year: i32) -> bool {
    if year == 0 || issue_date.trim().is_empty() {
        return true;
    }
    issue_date
        .trim()
        .get(..4)
        .and_then(|y| y.parse::<i32>().ok())
        .is_some_and(|y| y == year)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn classifier_prompt(config: &ExpensesConfig) -> String {
    let accounts: String = config
        .categories
        .iter()
        .map(|c| format!("{}: {} ({})\n", c.key, c.name, c.description))
        .collect();
    format!(
        "You are an accountant for a sole proprietor filing a tax return. Pick the single best \
         bookkeeping account for the expense and estimate its business-use share in percent.\n\n\
         Accounts:\n{accounts}\n\
         Reply with a JSON object only: {{\"key\": \"account key\", \"reason\": \"short reason\", \
         \"business_ratio\": 100}}\n\
         Lower business_ratio when private use is likely. Use {} when unsure.",
        config.fallback_category
    )
}

fn expense_prompt(expense: &Expense, ocr_text: &str, max_chars: usize) -> String {
    let known = |value: &str| {
        if value.trim().is_empty() {
            "unknown".to_string()
        } else {
            value.to_string()
        }
    };
    let reference = if expense.invoice_number.is_empty() {
        &expense.order_number
    } else {
        &expense.invoice_number
    };

    let mut prompt = format!(
        "Classify this expense.\n\n\
         File: {}\nDocument type: {}\nVendor: {}\nDate: {}\nTotal: {} {}\nTax: {}\n\
         Invoice number: {}\nPayment method: {}\n",
        expense.filename,
        expense.doc_type,
        known(&expense.vendor_name),
        known(&expense.issue_date),
        expense.total_amount,
        expense.currency,
        expense.tax_amount,
        known(reference),
        known(&expense.payment_method),
    );
    if !expense.line_items.is_empty() {
        prompt.push_str("\nLine items:\n");
        for item in &expense.line_items {
            prompt.push_str(&format!("- {}\n", line_item(item)));
        }
    }
    prompt.push_str("\nOCR text:\n");
    prompt.push_str(&truncate_chars(ocr_text, max_chars));
    prompt
}

fn line_item(item: &Value) -> String {
    let label = item
        .get("description")
        .or_else(|| item.get("name"))
        .and_then(Value::as_str);
    match (item, label) {
        (Value::String(s), _) => s.clone(),
        (_, Some(label)) => match item.get("amount").filter(|a| !a.is_null()) {
            Some(amount) => format!("{label} {amount}"),
            None => label.to_string(),
        },
        _ => item.to_string(),
    }
}

fn apply_verdict(expense: &mut Expense, verdict: Verdict, config: &ExpensesConfig) {
    let ratio = verdict
        .business_ratio
        .as_f64()
        .map(|r| r.clamp(0.0, 100.0).round() as u8)
        .unwrap_or(100);
    if verdict.key.trim().is_empty() {
        assign(expense, &config.fallback_category, "reply without an account", 100, config);
        return;
    }
    assign(expense, verdict.key.trim(), &verdict.reason, ratio, config);
}

/// Unknown keys fall back to the configured account.
fn assign(expense: &mut Expense, key: &str, reason: &str, ratio: u8, config: &ExpensesConfig) {
    let category = find(&config.categories, key)
        .or_else(|| find(&config.categories, &config.fallback_category));
    let (key, name) = match category {
        Some(c) => (c.key.clone(), c.name.clone()),
        None => (config.fallback_category.clone(), config.fallback_category.clone()),
    };
    expense.category_key = key;
    expense.category_name = name;
    expense.category_reason = reason.to_string();
    expense.business_ratio = ratio;
}

fn find<'a>(categories: &'a [ExpenseCategory], key: &str) -> Option<&'a ExpenseCategory> {
    categories.iter().find(|c| c.key == key)
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Ledger<'a> {
    generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_year: Option<i32>,
    source_directory: &'a str,
    summary: Summary,
    expenses: Vec<LedgerLine<'a>>,
    errors: &'a [StepFailure],
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    total_count: usize,
    grand_total: f64,
    business_total: f64,
    tax_total: f64,
    /// Largest total first.
    by_category: Vec<CategoryTotal>,
}

#[derive(Debug, Default, Clone, Serialize)]
struct CategoryTotal {
    name: String,
    count: usize,
    total: f64,
    business_total: f64,
}

#[derive(Debug, Serialize)]
struct LedgerLine<'a> {
    no: usize,
    #[serde(flatten)]
    expense: &'a Expense,
    deductible_amount: f64,
}

impl<'a> Ledger<'a> {
    fn new(expenses: &'a [Expense], config: &'a ExpensesConfig, errors: &'a [StepFailure]) -> Self {
        Self {
            generated_at: Utc::now(),
            target_year: (config.target_year != 0).then_some(config.target_year),
            source_directory: &config.input_dir,
            summary: summarize(expenses),
            expenses: expenses
                .iter()
                .enumerate()
                .map(|(i, expense)| LedgerLine {
                    no: i + 1,
                    expense,
                    deductible_amount: expense.deductible_amount(),
                })
                .collect(),
            errors,
        }
    }
}

fn summarize(expenses: &[Expense]) -> Summary {
    let mut by_name: BTreeMap<&str, CategoryTotal> = BTreeMap::new();
    let mut summary = Summary {
        total_count: expenses.len(),
        ..Default::default()
    };

    for expense in expenses {
        let deductible = expense.deductible_amount();
        summary.grand_total += expense.total_amount;
        summary.business_total += deductible;
        summary.tax_total += expense.tax_amount;

        let entry = by_name
            .entry(expense.category_name.as_str())
            .or_insert_with(|| CategoryTotal {
                name: expense.category_name.clone(),
                ..Default::default()
            });
        entry.count += 1;
        entry.total += expense.total_amount;
        entry.business_total += deductible;
    }

    summary.by_category = by_name.into_values().collect();
    summary.by_category.sort_by(|a, b| b.total.total_cmp(&a.total));
    summary
}
