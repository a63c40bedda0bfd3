//! Named waits on an element
//!
//! Thin predicates over [`ElementStates`](super::ElementStates) and the
//! geometry accessors, polled with the shared wait shape: `true` on
//! success, `false` or `WaitTimeout` on the deadline depending on the
//! resolved raise flag.

use super::Element;
use crate::waiter::{self, DEFAULT_INTERVAL};
use crate::{Error, Result};
use std::time::Duration;

/// Wait accessor for one element
pub struct ElementWaits<'a> {
    ele: &'a Element,
}

impl<'a> ElementWaits<'a> {
    pub(crate) fn new(ele: &'a Element) -> Self {
        Self { ele }
    }

    fn timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.ele.ctx().timeouts.base_duration())
    }

    fn raise(&self, raise: Option<bool>) -> bool {
        self.ele.ctx().settings.resolve_raise(raise)
    }

    async fn poll<F, Fut>(
        &self,
        predicate: F,
        timeout: Option<Duration>,
        raise: Option<bool>,
        what: &str,
    ) -> Result<bool>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        waiter::wait_for(
            predicate,
            self.timeout(timeout),
            DEFAULT_INTERVAL,
            self.raise(raise),
            what,
        )
        .await
    }

    /// Element takes part in layout and is not hidden.
    pub async fn displayed(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { ele.states().is_displayed().await.unwrap_or(false) },
            timeout,
            raise,
            "element displayed",
        )
        .await
    }

    /// Element is hidden or out of layout.
    pub async fn hidden(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { !ele.states().is_displayed().await.unwrap_or(true) },
            timeout,
            raise,
            "element hidden",
        )
        .await
    }

    /// Element has no `disabled` attribute.
    pub async fn enabled(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { ele.states().is_enabled().await.unwrap_or(false) },
            timeout,
            raise,
            "element enabled",
        )
        .await
    }

    /// Element carries the `disabled` attribute.
    pub async fn disabled(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { !ele.states().is_enabled().await.unwrap_or(true) },
            timeout,
            raise,
            "element disabled",
        )
        .await
    }

    /// Element is disabled, or its node is gone from the document.
    pub async fn disabled_or_deleted(
        &self,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move {
                match ele.states().is_alive().await {
                    Ok(false) | Err(_) => true,
                    Ok(true) => !ele.states().is_enabled().await.unwrap_or(true),
                }
            },
            timeout,
            raise,
            "element disabled or deleted",
        )
        .await
    }

    /// Element's node is gone from the document.
    pub async fn deleted(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { !ele.states().is_alive().await.unwrap_or(false) },
            timeout,
            raise,
            "element deleted",
        )
        .await
    }

    /// Element has box-model geometry.
    pub async fn has_rect(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { ele.states().has_rect().await.unwrap_or(false) },
            timeout,
            raise,
            "element rect",
        )
        .await
    }

    /// Element is displayed, enabled and has geometry.
    pub async fn clickable(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { ele.states().is_clickable().await.unwrap_or(false) },
            timeout,
            raise,
            "element clickable",
        )
        .await
    }

    /// Another element sits over this one's click point.
    pub async fn covered(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move {
                matches!(ele.states().is_covered().await, Ok(Some(_)))
            },
            timeout,
            raise,
            "element covered",
        )
        .await
    }

    /// Nothing sits over this element's click point.
    pub async fn not_covered(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let ele = self.ele;
        self.poll(
            || async move { matches!(ele.states().is_covered().await, Ok(None)) },
            timeout,
            raise,
            "element not covered",
        )
        .await
    }

    /// Two consecutive size+location samples match, `gap` apart.
    pub async fn stop_moving(
        &self,
        gap: Option<Duration>,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let gap = gap.unwrap_or(DEFAULT_INTERVAL);
        let ele = self.ele;
        let result = waiter::wait_until_stable(
            || async move {
                let location = ele.rect().location().await?;
                let size = ele.rect().size().await?;
                Ok((location, size))
            },
            gap,
            self.timeout(timeout),
        )
        .await;
        match result {
            Ok(_) => Ok(true),
            Err(e @ Error::WaitTimeout(_)) => {
                if self.raise(raise) {
                    Err(e)
                } else {
                    Ok(false)
                }
            }
            Err(e) => Err(e),
        }
    }
}
