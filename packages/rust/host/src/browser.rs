//! Browser tab control.
//!
//! [`Browser`] is the seam the workflows drive. [`HostBrowser`] forwards to
//! the host's `floorp.*` tab operations; `StaticBrowser` answers the same
//! queries from fetched HTML.

use std::future::Future;

use serde_json::Value;
use tracing::debug;

use researchkit_shared::Result;

use crate::response::{decode, field_or_raw, flag, scalar_text};
use crate::transport::HostTransport;

/// A tab open in the user's browser, as listed by the host.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabInfo {
    /// Host-side browser tab id, usable with [`Browser::attach_to_tab`].
    pub browser_id: String,
    pub url: String,
    pub title: String,
}

/// Tab-level browser automation. Tab ids are opaque strings.
pub trait Browser: Send + Sync {
    /// Open `url` in a new background tab and return its id.
    fn create_tab(&self, url: &str) -> impl Future<Output = Result<String>> + Send;

    fn navigate_tab(&self, tab: &str, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Wait up to `timeout_ms` for `selector` to appear.
    fn wait_for_element(
        &self,
        tab: &str,
        selector: &str,
        timeout_ms: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    fn wait_for_network_idle(
        &self,
        tab: &str,
        timeout_ms: u64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Visible text of the first element matching `selector`.
    fn element_text(&self, tab: &str, selector: &str)
    -> impl Future<Output = Result<String>> + Send;

    fn attribute(
        &self,
        tab: &str,
        selector: &str,
        name: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    fn click(&self, tab: &str, selector: &str) -> impl Future<Output = Result<()>> + Send;

    /// Fill an input. Returns whether the host confirmed the fill.
    fn fill_form(
        &self,
        tab: &str,
        selector: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    fn submit_form(&self, tab: &str, selector: &str) -> impl Future<Output = Result<()>> + Send;

    fn scroll_to(&self, tab: &str, selector: &str) -> impl Future<Output = Result<()>> + Send;

    /// Base64-encoded PNG of the element.
    fn element_screenshot(
        &self,
        tab: &str,
        selector: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    fn list_tabs(&self) -> impl Future<Output = Result<Vec<TabInfo>>> + Send;

    /// Take control of an existing browser tab; returns a tab id.
    fn attach_to_tab(&self, browser_id: &str) -> impl Future<Output = Result<String>> + Send;

    fn destroy_tab(&self, tab: &str) -> impl Future<Output = Result<()>> + Send;
}

impl<B: Browser> Browser for &B {
    fn create_tab(&self, url: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).create_tab(url)
    }
    fn navigate_tab(&self, tab: &str, url: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).navigate_tab(tab, url)
    }
    fn wait_for_element(
        &self,
        tab: &str,
        selector: &str,
        timeout_ms: u64,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).wait_for_element(tab, selector, timeout_ms)
    }
    fn wait_for_network_idle(
        &self,
        tab: &str,
        timeout_ms: u64,
    ) -> impl Future<Output = Result<()>> + Send {
        (**self).wait_for_network_idle(tab, timeout_ms)
    }
    fn element_text(
        &self,
        tab: &str,
        selector: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).element_text(tab, selector)
    }
    fn attribute(
        &self,
        tab: &str,
        selector: &str,
        name: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).attribute(tab, selector, name)
    }
    fn click(&self, tab: &str, selector: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).click(tab, selector)
    }
    fn fill_form(
        &self,
        tab: &str,
        selector: &str,
        value: &str,
    ) -> impl Future<Output = Result<bool>> + Send {
        (**self).fill_form(tab, selector, value)
    }
    fn submit_form(&self, tab: &str, selector: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).submit_form(tab, selector)
    }
    fn scroll_to(&self, tab: &str, selector: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).scroll_to(tab, selector)
    }
    fn element_screenshot(
        &self,
        tab: &str,
        selector: &str,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).element_screenshot(tab, selector)
    }
    fn list_tabs(&self) -> impl Future<Output = Result<Vec<TabInfo>>> + Send {
        (**self).list_tabs()
    }
    fn attach_to_tab(&self, browser_id: &str) -> impl Future<Output = Result<String>> + Send {
        (**self).attach_to_tab(browser_id)
    }
    fn destroy_tab(&self, tab: &str) -> impl Future<Output = Result<()>> + Send {
        (**self).destroy_tab(tab)
    }
}

// ---------------------------------------------------------------------------
// Host-backed browser
// ---------------------------------------------------------------------------

/// [`Browser`] over the host's `floorp.*` operations.
#[derive(Clone)]
pub struct HostBrowser<T> {
    transport: T,
}

impl<T: HostTransport> HostBrowser<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn call(&self, op: &str, args: Vec<Value>) -> Result<String> {
        debug!(op, "browser op");
        self.transport.invoke(op, args).await
    }
}

fn s(value: &str) -> Value {
    Value::String(value.to_string())
}

/// Timeouts travel as strings, as the host expects.
fn ms(value: u64) -> Value {
    Value::String(value.to_string())
}

impl<T: HostTransport> Browser for HostBrowser<T> {
    async fn create_tab(&self, url: &str) -> Result<String> {
        let raw = self
            .call("floorp.createTab", vec![s(url), Value::Bool(false)])
            .await?;
        Ok(field_or_raw(&raw, "instanceId"))
    }

    async fn navigate_tab(&self, tab: &str, url: &str) -> Result<()> {
        self.call("floorp.navigateTab", vec![s(tab), s(url)]).await?;
        Ok(())
    }

    async fn wait_for_element(&self, tab: &str, selector: &str, timeout_ms: u64) -> Result<()> {
        self.call(
            "floorp.tabWaitForElement",
            vec![s(tab), s(selector), ms(timeout_ms)],
        )
        .await?;
        Ok(())
    }

    async fn wait_for_network_idle(&self, tab: &str, timeout_ms: u64) -> Result<()> {
        self.call("floorp.tabWaitForNetworkIdle", vec![s(tab), ms(timeout_ms)])
            .await?;
        Ok(())
    }

    async fn element_text(&self, tab: &str, selector: &str) -> Result<String> {
        let raw = self
            .call("floorp.tabElementText", vec![s(tab), s(selector)])
            .await?;
        Ok(field_or_raw(&raw, "text"))
    }

    async fn attribute(&self, tab: &str, selector: &str, name: &str) -> Result<String> {
        let raw = self
            .call("floorp.tabAttribute", vec![s(tab), s(selector), s(name)])
            .await?;
        Ok(field_or_raw(&raw, "value"))
    }

    async fn click(&self, tab: &str, selector: &str) -> Result<()> {
        self.call("floorp.tabClick", vec![s(tab), s(selector)]).await?;
        Ok(())
    }

    async fn fill_form(&self, tab: &str, selector: &str, value: &str) -> Result<bool> {
        let raw = self
            .call("floorp.tabFillForm", vec![s(tab), s(selector), s(value)])
            .await?;
        Ok(flag(&raw, "ok"))
    }

    async fn submit_form(&self, tab: &str, selector: &str) -> Result<()> {
        self.call("floorp.tabSubmitForm", vec![s(tab), s(selector)])
            .await?;
        Ok(())
    }

    async fn scroll_to(&self, tab: &str, selector: &str) -> Result<()> {
        self.call("floorp.tabScrollTo", vec![s(tab), s(selector)]).await?;
        Ok(())
    }

    async fn element_screenshot(&self, tab: &str, selector: &str) -> Result<String> {
        let raw = self
            .call("floorp.tabElementScreenshot", vec![s(tab), s(selector)])
            .await?;
        Ok(field_or_raw(&raw, "image"))
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>> {
        let op = "floorp.listBrowserTabs";
        let raw = self.call(op, vec![]).await?;
        let items: Vec<Value> = decode(op, &raw)?;

        Ok(items
            .iter()
            .map(|tab| TabInfo {
                browser_id: tab
                    .get("browserId")
                    .or_else(|| tab.get("id"))
                    .map(scalar_text)
                    .unwrap_or_default(),
                url: tab.get("url").map(scalar_text).unwrap_or_default(),
                title: tab.get("title").map(scalar_text).unwrap_or_default(),
            })
            .collect())
    }

    async fn attach_to_tab(&self, browser_id: &str) -> Result<String> {
        let raw = self.call("floorp.attachToTab", vec![s(browser_id)]).await?;
        Ok(field_or_raw(&raw, "instanceId"))
    }

    async fn destroy_tab(&self, tab: &str) -> Result<()> {
        self.call("floorp.destroyTabInstance", vec![s(tab)]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedTransport;

    #[tokio::test]
    async fn create_tab_reads_instance_id() {
        let host = ScriptedTransport::new();
        host.respond("floorp.createTab", r#"{"instanceId":"tab-9"}"#);
        let browser = HostBrowser::new(host.clone());

        let tab = browser.create_tab("https://example.com").await.unwrap();
        assert_eq!(tab, "tab-9");

        let call = &host.calls_to("floorp.createTab")[0];
        assert_eq!(call.args, vec![Value::from("https://example.com"), Value::Bool(false)]);
    }

    #[tokio::test]
    async fn bare_tab_id_reply_is_accepted() {
        let host = ScriptedTransport::new();
        host.respond("floorp.createTab", "tab-3");
        let browser = HostBrowser::new(host);
        assert_eq!(browser.create_tab("https://a.test").await.unwrap(), "tab-3");
    }

    #[tokio::test]
    async fn wait_passes_timeout_as_string() {
        let host = ScriptedTransport::new();
        let browser = HostBrowser::new(host.clone());
        browser
            .wait_for_element("tab-1", "#pull_request_title", 20_000)
            .await
            .unwrap();

        let call = &host.calls_to("floorp.tabWaitForElement")[0];
        assert_eq!(call.args[2], Value::from("20000"));
    }

    #[tokio::test]
    async fn text_attribute_and_fill_replies() {
        let host = ScriptedTransport::new();
        host.respond("floorp.tabElementText", r#"{"text":"Pro plan"}"#)
            .respond("floorp.tabAttribute", r#"{"value":"https://x.test/a"}"#)
            .respond("floorp.tabFillForm", r#"{"ok":true}"#);
        let browser = HostBrowser::new(host);

        assert_eq!(browser.element_text("t", "h1").await.unwrap(), "Pro plan");
        assert_eq!(
            browser.attribute("t", "a", "href").await.unwrap(),
            "https://x.test/a"
        );
        assert!(browser.fill_form("t", "#title", "Fix").await.unwrap());
    }

    #[tokio::test]
    async fn list_tabs_parses_browser_ids() {
        let host = ScriptedTransport::new();
        host.respond(
            "floorp.listBrowserTabs",
            r#"[{"browserId":12,"url":"https://github.com/o/r/compare/main...dev","title":"PR"}]"#,
        );
        let browser = HostBrowser::new(host);

        let tabs = browser.list_tabs().await.unwrap();
        assert_eq!(tabs.len(), 1);
        assert_eq!(tabs[0].browser_id, "12");
        assert!(tabs[0].url.contains("compare/main...dev"));
    }

    #[tokio::test]
    async fn host_errors_pass_through() {
        let host = ScriptedTransport::new();
        host.fail("floorp.tabClick", "element not found: #more-results");
        let browser = HostBrowser::new(host);

        let err = browser.click("t", "#more-results").await.unwrap_err();
        assert!(err.to_string().contains("element not found: #more-results"));
    }
}
