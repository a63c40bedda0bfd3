//! Shadow DOM access
//!
//! A shadow root is held as its own node handle next to the host
//! element. Lookups inside it must compile to CSS: XPath evaluation does
//! not cross the shadow boundary, so locators that need it (text
//! predicates, negation) are rejected up front.

use super::Element;
use crate::locator::{By, Locator, Selector};
use crate::{Error, Result};
use std::time::Duration;
use std::time::Instant;

/// An open or closed shadow root attached to a host element
#[derive(Debug, Clone)]
pub struct ShadowRoot {
    root: Element,
    host: Element,
}

impl ShadowRoot {
    pub(crate) fn new(root: Element, host: Element) -> Self {
        Self { root, host }
    }

    /// The element hosting this shadow root
    pub fn host(&self) -> &Element {
        &self.host
    }

    /// Stable backend id of the root node itself
    pub fn backend_id(&self) -> i64 {
        self.root.backend_id()
    }

    /// Markup inside the shadow root
    pub async fn html(&self) -> Result<String> {
        let value = self
            .root
            .run_js("return this.innerHTML;", &[], false, None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    fn css_selector(locator: &str) -> Result<Selector> {
        // querySelector on a shadow root is already scoped to it
        let selector = Locator::parse(locator)?.to_selector();
        match selector.by {
            By::Css => Ok(selector),
            By::XPath => Err(Error::locator(format!(
                "xpath cannot cross a shadow boundary, use a css-expressible locator: {}",
                locator
            ))),
        }
    }

    /// First element inside the shadow root matching a locator.
    pub async fn ele(&self, locator: &str, timeout: Option<Duration>) -> Result<Element> {
        let selector = Self::css_selector(locator)?;
        let timeout = timeout.unwrap_or_else(|| self.root.ctx().timeouts.base_duration());
        let deadline = Instant::now() + timeout;
        loop {
            let found = self.root.query(&selector, true).await?;
            if let Some(element) = found.into_iter().next() {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(Error::element_not_found(locator));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// All elements inside the shadow root matching a locator.
    pub async fn eles(&self, locator: &str) -> Result<Vec<Element>> {
        let selector = Self::css_selector(locator)?;
        self.root.query(&selector, false).await
    }

    /// Direct child elements of the shadow root
    pub async fn children(&self) -> Result<Vec<Element>> {
        self.root.query(&Selector::css(":scope > *"), false).await
    }
}
