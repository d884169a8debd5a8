use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::element::Element;
use serde::de::DeserializeOwned;
use tracing::trace;

use super::automation::BrowserContext;
use super::error::{BrowserError, BrowserResult};

const TARGET_ATTRIBUTE: &str = "data-storefront-target";

/// How a control on the marketplace page is found.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// CSS selector.
    Css(String),
    /// Any element whose text contains the needle, case-insensitively.
    Text(String),
    /// A `<button>` whose visible label contains the needle.
    Button(String),
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Locator::Text(needle.into())
    }

    pub fn button(label: impl Into<String>) -> Self {
        Locator::Button(label.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css={selector}"),
            Locator::Text(needle) => write!(f, "text={needle}"),
            Locator::Button(label) => write!(f, "button={label}"),
        }
    }
}

/// The operations the workflow performs against the single shared marketplace page.
///
/// Methods take `&self` so checks can be issued from polling closures while the
/// session stays borrowed by the caller.
#[async_trait(?Send)]
pub trait MarketplaceSession {
    async fn goto(&self, url: &str) -> BrowserResult<()>;
    async fn current_url(&self) -> BrowserResult<String>;
    async fn count(&self, locator: &Locator) -> BrowserResult<usize>;
    async fn click(&self, locator: &Locator) -> BrowserResult<()>;
    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()>;
    async fn press(&self, locator: &Locator, key: &str) -> BrowserResult<()>;
    async fn select_option(&self, locator: &Locator, value: &str) -> BrowserResult<()>;
    async fn check(&self, locator: &Locator) -> BrowserResult<()>;
    async fn upload(&self, locator: &Locator, files: &[PathBuf]) -> BrowserResult<()>;

    async fn is_present(&self, locator: &Locator) -> BrowserResult<bool> {
        Ok(self.count(locator).await? > 0)
    }
}

/// [`MarketplaceSession`] driving a real Chromium page over CDP.
pub struct BrowserMarketplaceSession {
    context: BrowserContext,
    next_target: AtomicU64,
}

impl BrowserMarketplaceSession {
    pub fn new(context: BrowserContext) -> Self {
        Self {
            context,
            next_target: AtomicU64::new(0),
        }
    }

    pub fn context(&self) -> &BrowserContext {
        &self.context
    }

    async fn evaluate<T: DeserializeOwned>(&self, script: String) -> BrowserResult<T> {
        self.context
            .page()
            .evaluate(script.as_str())
            .await?
            .into_value()
            .map_err(|err| BrowserError::Script(format!("failed to decode script result: {err}")))
    }

    async fn call_on(&self, element: &Element, function: String) -> BrowserResult<serde_json::Value> {
        let returns = element.call_js_fn(function, false).await?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }

    /// First element matching the locator. Text locators are resolved in page script,
    /// tagged with a unique attribute and then fetched as a regular element handle.
    async fn resolve(&self, locator: &Locator) -> BrowserResult<Element> {
        let not_found = || BrowserError::ElementNotFound {
            locator: locator.to_string(),
        };
        let selector = match locator {
            Locator::Css(selector) => selector.clone(),
            Locator::Text(_) | Locator::Button(_) => {
                let token = self.next_target.fetch_add(1, Ordering::Relaxed).to_string();
                let script = format!(
                    "(() => {{ const el = ({finder})[0]; if (!el) return false; el.setAttribute('{TARGET_ATTRIBUTE}', {token}); return true; }})()",
                    finder = finder_script(locator)?,
                    token = json_literal(&token)?,
                );
                if !self.evaluate::<bool>(script).await? {
                    return Err(not_found());
                }
                format!("[{TARGET_ATTRIBUTE}=\"{token}\"]")
            }
        };
        trace!(%locator, selector = %selector, "resolving element");
        self.context
            .page()
            .find_element(selector)
            .await
            .map_err(|_| not_found())
    }
}

#[async_trait(?Send)]
impl MarketplaceSession for BrowserMarketplaceSession {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        self.context.goto(url).await
    }

    async fn current_url(&self) -> BrowserResult<String> {
        Ok(self.context.page().url().await?.unwrap_or_default())
    }

    async fn count(&self, locator: &Locator) -> BrowserResult<usize> {
        match locator {
            Locator::Css(selector) => Ok(self
                .context
                .page()
                .find_elements(selector.clone())
                .await
                .map(|elements| elements.len())
                .unwrap_or(0)),
            Locator::Text(_) | Locator::Button(_) => {
                let script = format!("({}).length", finder_script(locator)?);
                self.evaluate::<usize>(script).await
            }
        }
    }

    async fn click(&self, locator: &Locator) -> BrowserResult<()> {
        let element = self.resolve(locator).await?;
        element.scroll_into_view().await?;
        element.click().await?;
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let element = self.resolve(locator).await?;
        element.focus().await?;
        let function = format!(
            "function() {{ const value = {value}; const proto = this instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype; const setter = Object.getOwnPropertyDescriptor(proto, 'value').set; setter.call(this, value); this.dispatchEvent(new Event('input', {{ bubbles: true }})); this.dispatchEvent(new Event('change', {{ bubbles: true }})); return this.value === value; }}",
            value = json_literal(value)?
        );
        match self.call_on(&element, function).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::Script(format!("{locator} rejected value"))),
        }
    }

    async fn press(&self, locator: &Locator, key: &str) -> BrowserResult<()> {
        let element = self.resolve(locator).await?;
        element.focus().await?;
        element.press_key(key).await?;
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> BrowserResult<()> {
        let element = self.resolve(locator).await?;
        let function = format!(
            "function() {{ const value = {value}; if (!Array.from(this.options || []).some(o => o.value === value)) return false; this.value = value; this.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }}",
            value = json_literal(value)?
        );
        match self.call_on(&element, function).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::ElementNotFound {
                locator: format!("{locator} option {value}"),
            }),
        }
    }

    async fn check(&self, locator: &Locator) -> BrowserResult<()> {
        let element = self.resolve(locator).await?;
        let function =
            "function() { if (!this.checked) { this.click(); } return this.checked === true; }"
                .to_string();
        match self.call_on(&element, function).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(BrowserError::Script(format!("{locator} did not become checked"))),
        }
    }

    async fn upload(&self, locator: &Locator, files: &[PathBuf]) -> BrowserResult<()> {
        let element = self.resolve(locator).await?;
        let params = SetFileInputFilesParams::builder()
            .files(files.iter().map(|path| path.display().to_string()))
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(BrowserError::Configuration)?;
        self.context.page().execute(params).await?;
        Ok(())
    }
}

/// Elements hidden from the user never match a text or button locator.
const VISIBLE_ELEMENT_JS: &str = "const visible = (el) => !el.closest('script,style,noscript,template') && el.getClientRects().length > 0;";

/// Page expression evaluating to an array of the locator's matches.
fn finder_script(locator: &Locator) -> BrowserResult<String> {
    match locator {
        Locator::Css(selector) => Ok(format!(
            "Array.from(document.querySelectorAll({}))",
            json_literal(selector)?
        )),
        Locator::Text(needle) => Ok(format!(
            "(() => {{ {VISIBLE_ELEMENT_JS} const needle = {}.toLowerCase(); const found = []; const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT); while (walker.nextNode()) {{ const el = walker.currentNode.parentElement; if (el && walker.currentNode.nodeValue.toLowerCase().includes(needle) && !found.includes(el) && visible(el)) found.push(el); }} return found; }})()",
            json_literal(needle)?
        )),
        Locator::Button(label) => Ok(format!(
            "(() => {{ {VISIBLE_ELEMENT_JS} const label = {}.toLowerCase(); return Array.from(document.querySelectorAll('button')).filter(b => visible(b) && (b.innerText || b.textContent || '').toLowerCase().includes(label)); }})()",
            json_literal(label)?
        )),
    }
}

fn json_literal(value: &str) -> BrowserResult<String> {
    serde_json::to_string(value)
        .map_err(|err| BrowserError::Script(format!("failed to encode script literal: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locators_render_for_logs() {
        assert_eq!(Locator::css("input[name=\"title\"]").to_string(), "css=input[name=\"title\"]");
        assert_eq!(Locator::button("Publish").to_string(), "button=Publish");
        assert_eq!(Locator::text("Shop Manager").to_string(), "text=Shop Manager");
    }

    #[test]
    fn finder_scripts_escape_needles() {
        let script = finder_script(&Locator::text("it's \"quoted\"")).unwrap();
        assert!(script.contains(r#""it's \"quoted\"""#));
        let script = finder_script(&Locator::button("Save and continue")).unwrap();
        assert!(script.contains("querySelectorAll('button')"));
        assert!(script.contains("\"Save and continue\""));
    }

    #[test]
    fn text_finder_skips_hidden_and_script_content() {
        let script = finder_script(&Locator::text("Get started")).unwrap();
        assert!(script.contains("closest('script,style,noscript,template')"));
        assert!(script.contains("getClientRects().length > 0"));
        assert!(script.contains("visible(el)"));
        assert!(script.contains("!found.includes(el)"));
    }

    #[test]
    fn button_finder_matches_case_insensitively() {
        let script = finder_script(&Locator::button("Save and Continue")).unwrap();
        assert!(script.contains("\"Save and Continue\".toLowerCase()"));
        assert!(script.contains("textContent || '').toLowerCase().includes(label)"));
        assert!(script.contains("visible(b)"));
    }
}
