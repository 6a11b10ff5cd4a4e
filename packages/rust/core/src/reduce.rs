//! Content reduction: compress page text before it is sent to an LLM.
//!
//! Lines mentioning a price or one of the caller's keywords are kept along
//! with their neighbours; everything else is dropped. When nothing matches,
//! the head of the page is used instead so the prompt is never empty.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// Lines kept on each side of a matching line.
pub const CONTEXT_LINES: usize = 1;

/// Lines used when no line matches.
pub const FALLBACK_LINES: usize = 200;

static PRICE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\$|€|¥|￥|£|\bUSD\b|\bJPY\b|\bEUR\b|\bGBP\b|/mo|/year|monthly|annual|per month|per year",
    )
    .expect("price line pattern is valid")
});

/// Reduce `text` to the lines relevant for pricing extraction, capped at
/// `max_chars` characters.
pub fn reduce_text(text: &str, keywords: &[String], max_chars: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return String::new();
    }

    let kept = filter_lines_with_context(&lines, keywords, CONTEXT_LINES);
    truncate_chars(&kept.join("\n"), max_chars)
}

/// Keep every line that looks like a price or contains a keyword, plus
/// `context` lines around it, in original order.
///
/// Falls back to the first [`FALLBACK_LINES`] lines when nothing matches.
pub fn filter_lines_with_context<'a>(
    lines: &[&'a str],
    keywords: &[String],
    context: usize,
) -> Vec<&'a str> {
    let lowered: Vec<String> = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase())
        .collect();

    let mut keep = BTreeSet::new();
    for (i, line) in lines.iter().enumerate() {
        if matches_price_line(line) || has_keyword(line, &lowered) {
            let end = (i + context).min(lines.len() - 1);
            keep.extend(i.saturating_sub(context)..=end);
        }
    }

    if keep.is_empty() {
        return lines.iter().take(FALLBACK_LINES).copied().collect();
    }
    keep.into_iter().map(|i| lines[i]).collect()
}

/// Whether a line mentions a currency, currency code or billing cadence.
pub fn matches_price_line(line: &str) -> bool {
    PRICE_LINE.is_match(line)
}

/// Case-insensitive substring match against already lowercased keywords.
fn has_keyword(line: &str, lowered: &[String]) -> bool {
    if lowered.is_empty() {
        return false;
    }
    let line = line.to_lowercase();
    lowered.iter().any(|k| line.contains(k.as_str()))
}

/// Whether `text` contains any of `keywords`, ignoring case.
pub fn contains_any(text: &str, keywords: &[String]) -> bool {
    let text = text.to_lowercase();
    keywords
        .iter()
        .filter(|k| !k.is_empty())
        .any(|k| text.contains(&k.to_lowercase()))
}

/// The first `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_match_falls_back_to_head() {
        let text: String = (0..300).map(|i| format!("line {i}\n")).collect();
        let out = reduce_text(&text, &[], usize::MAX);
        let expected: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        assert_eq!(out, expected.join("\n"));
    }

    #[test]
    fn short_input_without_match_is_returned_whole() {
        let out = reduce_text("alpha\nbeta\ngamma", &[], 1000);
        assert_eq!(out, "alpha\nbeta\ngamma");
    }

    #[test]
    fn price_lines_keep_neighbours() {
        let text = "header\nnav\nPro plan\n$20 / month\nBilled monthly\nfooter\nlegal";
        let out = reduce_text(text, &[], 1000);
        assert_eq!(out, "Pro plan\n$20 / month\nBilled monthly\nfooter");
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let text = "one\ntwo\nCOPILOT Business\nthree\nfour\nfive";
        let out = reduce_text(text, &kw(&["copilot"]), 1000);
        assert_eq!(out, "two\nCOPILOT Business\nthree");
    }

    #[test]
    fn overlapping_windows_merge_in_order() {
        let text = "a\n$1\nb\n$2\nc\nd";
        let out = reduce_text(text, &[], 1000);
        assert_eq!(out, "a\n$1\nb\n$2\nc");
    }

    #[test]
    fn output_respects_budget() {
        let text = "¥1,200 per month\n".repeat(500);
        for budget in [0, 1, 17, 999] {
            assert!(reduce_text(&text, &[], budget).chars().count() <= budget);
        }
    }

    #[test]
    fn truncation_is_char_safe() {
        let text = "月額料金は￥1,200です";
        let out = reduce_text(text, &[], 4);
        assert_eq!(out, "月額料金");
    }

    #[test]
    fn blank_input_is_empty() {
        assert_eq!(reduce_text("", &kw(&["x"]), 100), "");
        assert_eq!(reduce_text("\n\n  \n", &[], 100), "");
    }

    #[test]
    fn price_line_patterns() {
        assert!(matches_price_line("Billed ANNUAL"));
        assert!(matches_price_line("10 EUR"));
        assert!(matches_price_line("€9"));
        assert!(!matches_price_line("EURO zone"));
        assert!(!matches_price_line("Sign in"));
    }

    #[test]
    fn context_zero_keeps_only_matches() {
        let lines = ["a", "$5", "b"];
        assert_eq!(filter_lines_with_context(&lines, &[], 0), vec!["$5"]);
    }
}
