//! Lenient parsers for scraped values: prices, view counts, star counts,
//! dates and free text.
//!
//! Every parser returns a zero/empty value instead of failing; callers keep
//! the raw text alongside for display.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use researchkit_shared::BillingPeriod;

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([$€¥£￥])?\s*([0-9,]+(?:\.[0-9]+)?)").expect("price pattern is valid")
});
static YEARLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)年|year|annual|\byr\b").expect("yearly pattern is valid"));
static MONTHLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)月|month|\bmo\b").expect("monthly pattern is valid"));
static CAMEL_GAP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("camel pattern is valid"));
static VIEW_COUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([0-9]*\.?[0-9]+)\s*(億|万|[km]\b)?").expect("view count pattern is valid")
});
static LEADING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]*\.?[0-9]+").expect("number pattern is valid"));

// ---------------------------------------------------------------------------
// Prices
// ---------------------------------------------------------------------------

/// Amount, currency code and billing period read from a price string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPrice {
    pub amount: f64,
    /// ISO code, empty when no symbol or code was found.
    pub currency: String,
    pub period: BillingPeriod,
}

/// Parse text such as `"$19.99/month"` or `"￥9,180 / 年"`.
///
/// The first number (thousands separators allowed) is the amount. Unparseable
/// input yields amount `0.0` with empty currency and unknown period.
pub fn parse_price(text: &str) -> ParsedPrice {
    let cleaned = text.trim();
    let Some(caps) = PRICE.captures(cleaned) else {
        return ParsedPrice {
            amount: 0.0,
            currency: String::new(),
            period: BillingPeriod::Unknown,
        };
    };

    let symbol = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let amount = caps
        .get(2)
        .and_then(|m| m.as_str().replace(',', "").parse::<f64>().ok())
        .unwrap_or(0.0);

    let currency = match symbol {
        "$" => "USD",
        "€" => "EUR",
        "¥" | "￥" => "JPY",
        "£" => "GBP",
        _ if cleaned.contains("USD") => "USD",
        _ if cleaned.contains("EUR") => "EUR",
        _ if cleaned.contains("JPY") => "JPY",
        _ if cleaned.contains("GBP") => "GBP",
        _ => "",
    };

    let period = if YEARLY.is_match(cleaned) {
        BillingPeriod::Yearly
    } else if MONTHLY.is_match(cleaned) {
        BillingPeriod::Monthly
    } else {
        BillingPeriod::Unknown
    };

    ParsedPrice {
        amount,
        currency: currency.to_string(),
        period,
    }
}

/// Currency code from symbols or codes anywhere in `text`; yen wins.
pub fn detect_currency(text: &str) -> &'static str {
    let upper = text.to_uppercase();
    if text.contains(['￥', '¥', '円']) || upper.contains("JPY") {
        "JPY"
    } else if text.contains('$') {
        "USD"
    } else if text.contains('€') || upper.contains("EUR") {
        "EUR"
    } else if text.contains('£') || upper.contains("GBP") {
        "GBP"
    } else {
        ""
    }
}

/// Canonical billing period for free-form text (`"年"`, `"Annual"`, `"/mo"`).
///
/// Anything unrecognized, including a stray `"日"`, maps to unknown.
pub fn normalize_period(text: &str) -> BillingPeriod {
    let lower = text.to_lowercase();
    if lower.contains('年') || lower.contains("year") || lower.contains("annual") {
        BillingPeriod::Yearly
    } else if lower.contains('月') || lower.contains("month") || MONTHLY.is_match(&lower) {
        BillingPeriod::Monthly
    } else {
        BillingPeriod::Unknown
    }
}

/// Collapse whitespace, split glued camel-case words and space out `×`.
pub fn normalize_notes(text: &str) -> String {
    let collapsed = clean_text(text);
    if collapsed.is_empty() {
        return collapsed;
    }
    let split = CAMEL_GAP.replace_all(&collapsed, "$1 $2");

    let mut out = String::with_capacity(split.len());
    let mut chars = split.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '×' && chars.peek().is_some_and(|n| !n.is_whitespace()) {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Parse a view counter such as `"1.2万回視聴"`, `"3.4k views"` or
/// `"12,345 回再生"`. Unparseable text yields `0`.
pub fn parse_views(text: &str) -> u64 {
    let mut cleaned = text.to_lowercase();
    for noise in ["views", "view", "回視聴", "回再生", "視聴回数", ","] {
        cleaned = cleaned.replace(noise, "");
    }

    // a unit counts only right after the number ("12k • 2 months ago")
    let Some(caps) = VIEW_COUNT.captures(&cleaned) else {
        return 0;
    };
    let multiplier = match caps.get(2).map(|m| m.as_str()) {
        Some("億") => 100_000_000.0,
        Some("万") => 10_000.0,
        Some("m") => 1_000_000.0,
        Some("k") => 1_000.0,
        _ => 1.0,
    };
    caps[1]
        .parse::<f64>()
        .map(|n| (n * multiplier).round() as u64)
        .unwrap_or(0)
}

/// Parse a star/fork counter such as `"1.2k"`, `"3m"` or `"12,345+"`.
pub fn parse_count(text: &str) -> u64 {
    let cleaned: String = text
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, ',' | '+') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return 0;
    }

    let multiplier = if cleaned.ends_with('m') {
        1_000_000.0
    } else if cleaned.ends_with('k') {
        1_000.0
    } else {
        1.0
    };

    scaled(&cleaned, multiplier)
}

fn scaled(cleaned: &str, multiplier: f64) -> u64 {
    LEADING_NUMBER
        .find(cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|n| (n * multiplier).round() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Text & dates
// ---------------------------------------------------------------------------

/// Collapse runs of whitespace into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Host part of an `http(s)` URL, or the input unchanged.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
}

/// Parse dates such as `2025-03-01`, `2025/3/1` or `2025年3月1日`.
pub fn parse_date_like(text: &str) -> Option<NaiveDate> {
    let normalized = text
        .trim()
        .replace(['年', '月', '/'], "-")
        .replace('日', "");
    let normalized = normalized.trim_end_matches('-').trim();
    if normalized.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(normalized, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(normalized, "%B %d, %Y"))
        .or_else(|_| NaiveDate::parse_from_str(normalized, "%b %d, %Y"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollar_monthly_price() {
        let p = parse_price("$19.99/month");
        assert_eq!(p.amount, 19.99);
        assert_eq!(p.currency, "USD");
        assert_eq!(p.period, BillingPeriod::Monthly);
    }

    #[test]
    fn yen_with_thousands_separator() {
        let p = parse_price("¥1,200");
        assert_eq!(p.amount, 1200.0);
        assert_eq!(p.currency, "JPY");
        assert_eq!(p.period, BillingPeriod::Unknown);
        assert_eq!(p.period.as_str(), "");
    }

    #[test]
    fn fullwidth_yen_yearly() {
        let p = parse_price("￥9,180 / 年");
        assert_eq!(p.amount, 9180.0);
        assert_eq!(p.currency, "JPY");
        assert_eq!(p.period, BillingPeriod::Yearly);
    }

    #[test]
    fn currency_code_without_symbol() {
        let p = parse_price("10 EUR per year");
        assert_eq!(p.amount, 10.0);
        assert_eq!(p.currency, "EUR");
        assert_eq!(p.period, BillingPeriod::Yearly);
    }

    #[test]
    fn promo_is_not_monthly() {
        assert_eq!(parse_price("$0 promo").period, BillingPeriod::Unknown);
    }

    #[test]
    fn unparseable_price_is_zero() {
        let p = parse_price("Free");
        assert_eq!(p.amount, 0.0);
        assert_eq!(p.currency, "");
    }

    #[test]
    fn detects_currency_anywhere() {
        assert_eq!(detect_currency("1200円"), "JPY");
        assert_eq!(detect_currency("$5"), "USD");
        assert_eq!(detect_currency("gbp 4"), "GBP");
        assert_eq!(detect_currency("free"), "");
    }

    #[test]
    fn normalizes_periods() {
        assert_eq!(normalize_period("年"), BillingPeriod::Yearly);
        assert_eq!(normalize_period("Annual"), BillingPeriod::Yearly);
        assert_eq!(normalize_period("/mo"), BillingPeriod::Monthly);
        assert_eq!(normalize_period("毎月"), BillingPeriod::Monthly);
        assert_eq!(normalize_period("日"), BillingPeriod::Unknown);
        assert_eq!(normalize_period(""), BillingPeriod::Unknown);
    }

    #[test]
    fn notes_are_tidied() {
        assert_eq!(
            normalize_notes("  Includes   500fastRequests ×2seats "),
            "Includes 500fast Requests × 2seats"
        );
        assert_eq!(normalize_notes("   "), "");
    }

    #[test]
    fn japanese_and_suffixed_views() {
        assert_eq!(parse_views("1.2万回視聴"), 12_000);
        assert_eq!(parse_views("3.4k views"), 3_400);
        assert_eq!(parse_views("12,345 回再生"), 12_345);
        assert_eq!(parse_views("2億"), 200_000_000);
        assert_eq!(parse_views("1.5M views"), 1_500_000);
    }

    #[test]
    fn views_ignore_trailing_metadata() {
        assert_eq!(parse_views("12K views • 2 months ago"), 12_000);
        assert_eq!(parse_views("845 views 3 min"), 845);
        assert_eq!(parse_views("12 min ago"), 12);
        assert_eq!(parse_views("3.1万回視聴・1ヶ月前"), 31_000);
    }

    #[test]
    fn unparseable_views_are_zero() {
        assert_eq!(parse_views("no views yet"), 0);
        assert_eq!(parse_views(""), 0);
        assert_eq!(parse_views("ライブ配信中"), 0);
    }

    #[test]
    fn star_counts() {
        assert_eq!(parse_count("1.2k"), 1_200);
        assert_eq!(parse_count("3m"), 3_000_000);
        assert_eq!(parse_count("12,345+"), 12_345);
        assert_eq!(parse_count(" 87 "), 87);
        assert_eq!(parse_count("n/a"), 0);
    }

    #[test]
    fn text_helpers() {
        assert_eq!(clean_text(" a \n\t b  "), "a b");
        assert_eq!(extract_domain("https://docs.floorp.app/en/intro"), "docs.floorp.app");
        assert_eq!(extract_domain("not a url"), "not a url");
    }

    #[test]
    fn dates_in_several_shapes() {
        let d = NaiveDate::from_ymd_opt(2025, 3, 1);
        assert_eq!(parse_date_like("2025-03-01"), d);
        assert_eq!(parse_date_like("2025/3/1"), d);
        assert_eq!(parse_date_like("2025年3月1日"), d);
        assert_eq!(parse_date_like("March 1, 2025"), d);
        assert_eq!(parse_date_like(""), None);
        assert_eq!(parse_date_like("soon"), None);
    }
}
