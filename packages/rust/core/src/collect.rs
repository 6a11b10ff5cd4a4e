//! Collection helpers over the [`Browser`] capability.
//!
//! Reads are lenient: a missing element or a failed wait yields empty text
//! and a debug log line, never an error. Opening a tab is the only fallible
//! step, and every tab opened here is closed by [`close_tab`].

use researchkit_host::Browser;
use researchkit_shared::Result;
use tracing::{debug, warn};

use crate::pipeline::pause;
use crate::reduce::truncate_chars;

/// Selectors tried when reading the main text of an arbitrary page.
pub const PAGE_TEXT_SELECTORS: [&str; 4] = ["main", "[role='main']", "article", "body"];

/// How long to wait after opening a page.
#[derive(Debug, Clone, Default)]
pub struct PageLoad<'a> {
    /// Element that marks the page as ready.
    pub wait_selector: Option<&'a str>,
    pub wait_timeout_ms: u64,
    /// Network idle bound; `None` skips the idle wait.
    pub idle_timeout_ms: Option<u64>,
    pub settle_ms: u64,
}

/// Open `url` in a new tab and wait for it per `load`.
///
/// Wait failures are logged and ignored; the caller reads whatever loaded.
pub async fn open_page<B: Browser>(browser: &B, url: &str, load: &PageLoad<'_>) -> Result<String> {
    let tab = browser.create_tab(url).await?;
    debug!(%tab, %url, "tab opened");

    if let Some(selector) = load.wait_selector.filter(|s| !s.is_empty()) {
        if let Err(e) = browser
            .wait_for_element(&tab, selector, load.wait_timeout_ms)
            .await
        {
            debug!(%tab, selector, error = %e, "ready element did not appear");
        }
    }
    if let Some(ms) = load.idle_timeout_ms {
        if let Err(e) = browser.wait_for_network_idle(&tab, ms).await {
            debug!(%tab, error = %e, "network did not go idle");
        }
    }
    pause(load.settle_ms).await;
    Ok(tab)
}

/// Destroy a tab, logging instead of failing.
pub async fn close_tab<B: Browser>(browser: &B, tab: &str) {
    if let Err(e) = browser.destroy_tab(tab).await {
        warn!(%tab, error = %e, "failed to destroy tab");
    }
}

/// Text of the first element matching `selector`, or `""`.
pub async fn read_text<B: Browser>(browser: &B, tab: &str, selector: &str) -> String {
    if selector.is_empty() {
        return String::new();
    }
    match browser.element_text(tab, selector).await {
        Ok(text) => text,
        Err(e) => {
            debug!(%tab, selector, error = %e, "no text");
            String::new()
        }
    }
}

/// Attribute of the first element matching `selector`, or `""`.
pub async fn read_attribute<B: Browser>(browser: &B, tab: &str, selector: &str, name: &str) -> String {
    match browser.attribute(tab, selector, name).await {
        Ok(value) => value,
        Err(e) => {
            debug!(%tab, selector, name, error = %e, "no attribute");
            String::new()
        }
    }
}

/// Text of the first selector that yields non-blank text.
pub async fn first_text<B: Browser>(browser: &B, tab: &str, selectors: &[String]) -> Option<String> {
    for selector in selectors {
        let text = read_text(browser, tab, selector).await;
        if !text.trim().is_empty() {
            return Some(text);
        }
    }
    None
}

/// Longest text among `selectors`; stops early once a candidate exceeds
/// `stop_at` characters.
pub async fn longest_text<B, S>(browser: &B, tab: &str, selectors: &[S], stop_at: Option<usize>) -> String
where
    B: Browser,
    S: AsRef<str>,
{
    let mut best = String::new();
    let mut best_len = 0;
    for selector in selectors {
        if stop_at.is_some_and(|limit| best_len > limit) {
            break;
        }
        let text = read_text(browser, tab, selector.as_ref()).await;
        let len = text.chars().count();
        if len > best_len {
            best = text;
            best_len = len;
        }
    }
    best
}

/// Main text of the page: the longest of [`PAGE_TEXT_SELECTORS`], capped at
/// `max_chars` characters.
pub async fn page_text<B: Browser>(browser: &B, tab: &str, max_chars: usize) -> String {
    let text = longest_text(browser, tab, &PAGE_TEXT_SELECTORS, None).await;
    truncate_chars(&text, max_chars)
}

/// Fill a `{query}` placeholder with the URL-encoded query.
pub fn fill_query(template: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes())
        .collect::<String>()
        .replace('+', "%20");
    template.replace("{query}", &encoded)
}

/// Replace `{key}` in a selector template with `index`.
pub fn nth(template: &str, key: &str, index: impl std::fmt::Display) -> String {
    template.replace(&format!("{{{key}}}"), &index.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use researchkit_host::{HostBrowser, ScriptedTransport};

    fn browser() -> (ScriptedTransport, HostBrowser<ScriptedTransport>) {
        let host = ScriptedTransport::new();
        (host.clone(), HostBrowser::new(host))
    }

    #[tokio::test]
    async fn page_text_picks_longest_and_caps() {
        let (host, browser) = browser();
        host.respond_when("floorp.tabElementText", "main", r#"{"text":"short"}"#)
            .respond_when("floorp.tabElementText", "body", r#"{"text":"the whole body text"}"#)
            .fail_when("floorp.tabElementText", "article", "not found");

        assert_eq!(page_text(&browser, "t1", 100).await, "the whole body text");
        assert_eq!(page_text(&browser, "t1", 8).await, "the whol");
    }

    #[tokio::test]
    async fn longest_text_stops_after_enough_content() {
        let (host, browser) = browser();
        host.respond_when("floorp.tabElementText", "main", r#"{"text":"0123456789"}"#)
            .respond_when("floorp.tabElementText", "body", r#"{"text":"01234567890123456789"}"#);

        let text = longest_text(&browser, "t", &["main", "body"], Some(5)).await;
        assert_eq!(text, "0123456789");
        assert_eq!(host.calls_to("floorp.tabElementText").len(), 1);
    }

    #[tokio::test]
    async fn open_page_tolerates_wait_failures() {
        let (host, browser) = browser();
        host.respond("floorp.createTab", r#"{"instanceId":"tab-9"}"#)
            .fail("floorp.tabWaitForElement", "timeout")
            .fail("floorp.tabWaitForNetworkIdle", "timeout");

        let load = PageLoad {
            wait_selector: Some("body"),
            wait_timeout_ms: 10,
            idle_timeout_ms: Some(10),
            settle_ms: 0,
        };
        let tab = open_page(&browser, "https://example.com", &load).await.unwrap();
        assert_eq!(tab, "tab-9");
        assert_eq!(host.calls_to("floorp.tabWaitForNetworkIdle").len(), 1);
    }

    #[tokio::test]
    async fn first_text_skips_blank_candidates() {
        let (host, browser) = browser();
        host.respond_when("floorp.tabElementText", "plan-card", r#"{"text":"  "}"#)
            .respond_when("floorp.tabElementText", "data-hpc", r#"{"text":"Copilot Pro $10"}"#);

        let selectors = vec!["[data-testid='plan-card']".to_string(), "[data-hpc]".to_string()];
        assert_eq!(
            first_text(&browser, "t", &selectors).await.as_deref(),
            Some("Copilot Pro $10")
        );
        assert_eq!(first_text(&browser, "t", &[]).await, None);
    }

    #[test]
    fn templates() {
        assert_eq!(
            fill_query("https://duckduckgo.com/?q={query}", "floorp browser"),
            "https://duckduckgo.com/?q=floorp%20browser"
        );
        assert_eq!(fill_query("/search/{query}", "a+b"), "/search/a%2Bb");
        assert_eq!(nth("li:nth-child({n}) a", "n", 3), "li:nth-child(3) a");
    }
}
