//! Browser backend over plain HTTP.
//!
//! Pages are fetched with `reqwest` and queried with `scraper` CSS
//! selectors. There is no script execution, so interactive operations
//! (click, fill, scroll, screenshot) report `Unsupported`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use researchkit_shared::{BrowserConfig, ResearchError, Result};

use crate::browser::{Browser, TabInfo};

/// Maximum number of redirects to follow per page.
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
struct Page {
    url: Url,
    html: String,
}

/// [`Browser`] that fetches pages over HTTP and reads the static DOM.
pub struct StaticBrowser {
    client: Client,
    pages: Mutex<HashMap<String, Page>>,
    next_id: AtomicU64,
}

impl StaticBrowser {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ResearchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            pages: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    async fn fetch(&self, url: &str) -> Result<Page> {
        let parsed =
            Url::parse(url).map_err(|e| ResearchError::validation(format!("{url}: {e}")))?;
        debug!(%parsed, "fetching page");

        let response = self
            .client
            .get(parsed.as_str())
            .send()
            .await
            .map_err(|e| ResearchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResearchError::Network(format!("{url}: HTTP {status}")));
        }

        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| ResearchError::Network(format!("{url}: body read failed: {e}")))?;

        Ok(Page {
            url: final_url,
            html,
        })
    }

    fn page(&self, tab: &str) -> Result<Page> {
        self.pages
            .lock()
            .map_err(|_| ResearchError::host("static", "page cache poisoned"))?
            .get(tab)
            .cloned()
            .ok_or_else(|| ResearchError::host("static", format!("unknown tab: {tab}")))
    }

    fn store(&self, tab: String, page: Page) -> Result<()> {
        self.pages
            .lock()
            .map_err(|_| ResearchError::host("static", "page cache poisoned"))?
            .insert(tab, page);
        Ok(())
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| ResearchError::parse(format!("invalid selector {selector:?}: {e}")))
}

/// Text nodes of an element, one trimmed node per line.
fn element_lines(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn query_text(html: &str, selector: &str) -> Result<String> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    doc.select(&sel)
        .next()
        .map(element_lines)
        .ok_or_else(|| ResearchError::parse(format!("no element matches {selector}")))
}

fn query_attribute(page: &Page, selector: &str, name: &str) -> Result<String> {
    let sel = parse_selector(selector)?;
    let doc = Html::parse_document(&page.html);
    let el = doc
        .select(&sel)
        .next()
        .ok_or_else(|| ResearchError::parse(format!("no element matches {selector}")))?;

    let value = el.value().attr(name).unwrap_or_default();
    if matches!(name, "href" | "src") && !value.is_empty() {
        if let Ok(resolved) = page.url.join(value) {
            return Ok(resolved.to_string());
        }
    }
    Ok(value.to_string())
}

fn has_match(html: &str, selector: &str) -> Result<bool> {
    let sel = parse_selector(selector)?;
    Ok(Html::parse_document(html).select(&sel).next().is_some())
}

impl Browser for StaticBrowser {
    async fn create_tab(&self, url: &str) -> Result<String> {
        let page = self.fetch(url).await?;
        let id = format!("static-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.store(id.clone(), page)?;
        Ok(id)
    }

    async fn navigate_tab(&self, tab: &str, url: &str) -> Result<()> {
        self.page(tab)?;
        let page = self.fetch(url).await?;
        self.store(tab.to_string(), page)
    }

    async fn wait_for_element(&self, tab: &str, selector: &str, timeout_ms: u64) -> Result<()> {
        // The DOM never changes after the fetch, so the wait resolves immediately.
        let page = self.page(tab)?;
        if has_match(&page.html, selector)? {
            Ok(())
        } else {
            Err(ResearchError::Timeout {
                what: selector.to_string(),
                ms: timeout_ms,
            })
        }
    }

    async fn wait_for_network_idle(&self, tab: &str, _timeout_ms: u64) -> Result<()> {
        self.page(tab).map(|_| ())
    }

    async fn element_text(&self, tab: &str, selector: &str) -> Result<String> {
        let page = self.page(tab)?;
        query_text(&page.html, selector)
    }

    async fn attribute(&self, tab: &str, selector: &str, name: &str) -> Result<String> {
        let page = self.page(tab)?;
        query_attribute(&page, selector, name)
    }

    async fn click(&self, _tab: &str, _selector: &str) -> Result<()> {
        Err(ResearchError::unsupported("click"))
    }

    async fn fill_form(&self, _tab: &str, _selector: &str, _value: &str) -> Result<bool> {
        Err(ResearchError::unsupported("fill_form"))
    }

    async fn submit_form(&self, _tab: &str, _selector: &str) -> Result<()> {
        Err(ResearchError::unsupported("submit_form"))
    }

    async fn scroll_to(&self, _tab: &str, _selector: &str) -> Result<()> {
        Err(ResearchError::unsupported("scroll_to"))
    }

    async fn element_screenshot(&self, _tab: &str, _selector: &str) -> Result<String> {
        Err(ResearchError::unsupported("element_screenshot"))
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        let pages = self
            .pages
            .lock()
            .map_err(|_| ResearchError::host("static", "page cache poisoned"))?;

        let mut tabs: Vec<TabInfo> = pages
            .iter()
            .map(|(id, page)| TabInfo {
                browser_id: id.clone(),
                url: page.url.to_string(),
                title: query_text(&page.html, "title").unwrap_or_default(),
            })
            .collect();
        tabs.sort_by(|a, b| a.browser_id.cmp(&b.browser_id));
        Ok(tabs)
    }

    async fn attach_to_tab(&self, browser_id: &str) -> Result<String> {
        self.page(browser_id)?;
        Ok(browser_id.to_string())
    }

    async fn destroy_tab(&self, tab: &str) -> Result<()> {
        self.pages
            .lock()
            .map_err(|_| ResearchError::host("static", "page cache poisoned"))?
            .remove(tab);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"<html><head><title>Pricing</title></head><body>
        <main>
          <h1>Plans</h1>
          <ul>
            <li class="plan">Hobby <span>Free</span></li>
            <li class="plan">Pro <span>$20/mo</span></li>
          </ul>
          <a id="docs" href="/docs/start">Docs</a>
        </main>
    </body></html>"#;

    async fn serve_page() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pricing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .mount(&server)
            .await;
        server
    }

    fn browser() -> StaticBrowser {
        StaticBrowser::new(&BrowserConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn reads_text_and_nth_of_type() {
        let server = serve_page().await;
        let browser = browser();
        let tab = browser
            .create_tab(&format!("{}/pricing", server.uri()))
            .await
            .unwrap();

        assert_eq!(browser.element_text(&tab, "title").await.unwrap(), "Pricing");
        let second = browser
            .element_text(&tab, "li.plan:nth-of-type(2)")
            .await
            .unwrap();
        assert_eq!(second, "Pro\n$20/mo");
    }

    #[tokio::test]
    async fn resolves_relative_href() {
        let server = serve_page().await;
        let browser = browser();
        let tab = browser
            .create_tab(&format!("{}/pricing", server.uri()))
            .await
            .unwrap();

        let href = browser.attribute(&tab, "#docs", "href").await.unwrap();
        assert_eq!(href, format!("{}/docs/start", server.uri()));
    }

    #[tokio::test]
    async fn missing_element_times_out() {
        let server = serve_page().await;
        let browser = browser();
        let tab = browser
            .create_tab(&format!("{}/pricing", server.uri()))
            .await
            .unwrap();

        browser.wait_for_element(&tab, "main", 1_000).await.unwrap();
        let err = browser
            .wait_for_element(&tab, "#pull_request_title", 1_000)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Timeout { ms: 1_000, .. }));
    }

    #[tokio::test]
    async fn interactive_ops_are_unsupported() {
        let server = serve_page().await;
        let browser = browser();
        let tab = browser
            .create_tab(&format!("{}/pricing", server.uri()))
            .await
            .unwrap();

        let err = browser.click(&tab, "#docs").await.unwrap_err();
        assert!(matches!(err, ResearchError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn http_errors_and_destroyed_tabs() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let browser = browser();

        let err = browser
            .create_tab(&format!("{}/gone", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchError::Network(_)));

        let page_server = serve_page().await;
        let tab = browser
            .create_tab(&format!("{}/pricing", page_server.uri()))
            .await
            .unwrap();
        assert_eq!(browser.list_tabs().await.unwrap().len(), 1);
        browser.destroy_tab(&tab).await.unwrap();
        assert!(browser.element_text(&tab, "h1").await.is_err());
    }
}
