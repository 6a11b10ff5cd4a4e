//! Runtime choice between the host-driven and the static browser.

use researchkit_host::{Browser, BridgeTransport, HostBrowser, StaticBrowser, TabInfo};
use researchkit_shared::Result;

/// The browser selected by `--browser` / `[browser] backend`.
pub(crate) enum AnyBrowser {
    Host(HostBrowser<BridgeTransport>),
    Static(StaticBrowser),
}

impl Browser for AnyBrowser {
    async fn create_tab(&self, url: &str) -> Result<String> {
        match self {
            Self::Host(b) => b.create_tab(url).await,
            Self::Static(b) => b.create_tab(url).await,
        }
    }

    async fn navigate_tab(&self, tab: &str, url: &str) -> Result<()> {
        match self {
            Self::Host(b) => b.navigate_tab(tab, url).await,
            Self::Static(b) => b.navigate_tab(tab, url).await,
        }
    }

    async fn wait_for_element(&self, tab: &str, selector: &str, timeout_ms: u64) -> Result<()> {
        match self {
            Self::Host(b) => b.wait_for_element(tab, selector, timeout_ms).await,
            Self::Static(b) => b.wait_for_element(tab, selector, timeout_ms).await,
        }
    }

    async fn wait_for_network_idle(&self, tab: &str, timeout_ms: u64) -> Result<()> {
        match self {
            Self::Host(b) => b.wait_for_network_idle(tab, timeout_ms).await,
            Self::Static(b) => b.wait_for_network_idle(tab, timeout_ms).await,
        }
    }

    async fn element_text(&self, tab: &str, selector: &str) -> Result<String> {
        match self {
            Self::Host(b) => b.element_text(tab, selector).await,
            Self::Static(b) => b.element_text(tab, selector).await,
        }
    }

    async fn attribute(&self, tab: &str, selector: &str, name: &str) -> Result<String> {
        match self {
            Self::Host(b) => b.attribute(tab, selector, name).await,
            Self::Static(b) => b.attribute(tab, selector, name).await,
        }
    }

    async fn click(&self, tab: &str, selector: &str) -> Result<()> {
        match self {
            Self::Host(b) => b.click(tab, selector).await,
            Self::Static(b) => b.click(tab, selector).await,
        }
    }

    async fn fill_form(&self, tab: &str, selector: &str, value: &str) -> Result<bool> {
        match self {
            Self::Host(b) => b.fill_form(tab, selector, value).await,
            Self::Static(b) => b.fill_form(tab, selector, value).await,
        }
    }

    async fn submit_form(&self, tab: &str, selector: &str) -> Result<()> {
        match self {
            Self::Host(b) => b.submit_form(tab, selector).await,
            Self::Static(b) => b.submit_form(tab, selector).await,
        }
    }

    async fn scroll_to(&self, tab: &str, selector: &str) -> Result<()> {
        match self {
            Self::Host(b) => b.scroll_to(tab, selector).await,
            Self::Static(b) => b.scroll_to(tab, selector).await,
        }
    }

    async fn element_screenshot(&self, tab: &str, selector: &str) -> Result<String> {
        match self {
            Self::Host(b) => b.element_screenshot(tab, selector).await,
            Self::Static(b) => b.element_screenshot(tab, selector).await,
        }
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        match self {
            Self::Host(b) => b.list_tabs().await,
            Self::Static(b) => b.list_tabs().await,
        }
    }

    async fn attach_to_tab(&self, browser_id: &str) -> Result<String> {
        match self {
            Self::Host(b) => b.attach_to_tab(browser_id).await,
            Self::Static(b) => b.attach_to_tab(browser_id).await,
        }
    }

    async fn destroy_tab(&self, tab: &str) -> Result<()> {
        match self {
            Self::Host(b) => b.destroy_tab(tab).await,
            Self::Static(b) => b.destroy_tab(tab).await,
        }
    }
}
