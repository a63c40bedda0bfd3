//! Element state queries
//!
//! Cheap boolean probes used by waits and by the click state machine.
//! All of them answer through JS or the box model rather than caching
//! anything, so the answer is always current.

use super::Element;
use crate::{Error, Result};
use serde_json::json;

/// State accessor for one element
#[derive(Debug)]
pub struct ElementStates<'a> {
    element: &'a Element,
}

impl<'a> ElementStates<'a> {
    pub(crate) fn new(element: &'a Element) -> Self {
        Self { element }
    }

    /// Visible in the CSS sense: rendered, not `display:none`,
    /// `visibility:hidden` or fully transparent.
    pub async fn is_displayed(&self) -> Result<bool> {
        let value = self
            .element
            .run_js(
                "const s = window.getComputedStyle(this);\
                 if (s.display === 'none' || s.visibility === 'hidden' || s.opacity === '0') return false;\
                 const r = this.getBoundingClientRect();\
                 return r.width > 0 && r.height > 0;",
                &[],
                false,
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    /// Checked state of a checkbox or radio
    pub async fn is_checked(&self) -> Result<bool> {
        Ok(self.element.property("checked").await?.as_bool().unwrap_or(false))
    }

    /// Selected state of an option
    pub async fn is_selected(&self) -> Result<bool> {
        Ok(self.element.property("selected").await?.as_bool().unwrap_or(false))
    }

    /// Not disabled
    pub async fn is_enabled(&self) -> Result<bool> {
        Ok(!self.element.property("disabled").await?.as_bool().unwrap_or(false))
    }

    /// Has geometry at all
    pub async fn has_rect(&self) -> Result<bool> {
        match self.element.rect().box_model().await {
            Ok(_) => Ok(true),
            Err(Error::NoRect(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Displayed, enabled and with a rect: a simulated click can land.
    pub async fn is_clickable(&self) -> Result<bool> {
        Ok(self.has_rect().await? && self.is_displayed().await? && self.is_enabled().await?)
    }

    /// Another element sits on top of this one's click point.
    pub async fn is_covered(&self) -> Result<Option<i64>> {
        let (x, y) = self.element.rect().viewport_click_point().await?;
        let result = self
            .element
            .ctx()
            .call(
                "DOM.getNodeForLocation",
                json!({ "x": x as i64, "y": y as i64, "includeUserAgentShadowDOM": false }),
            )
            .await;
        let top_backend = match result {
            Ok(v) => v.get("backendNodeId").and_then(|b| b.as_i64()),
            // Off-screen points report no node; that is not "covered".
            Err(_) => None,
        };
        match top_backend {
            Some(id) if id != self.element.backend_id() => {
                if self.covers_self(id).await? {
                    Ok(None)
                } else {
                    Ok(Some(id))
                }
            }
            _ => Ok(None),
        }
    }

    /// The node at the click point may be a descendant of this element;
    /// that still counts as hitting ourselves.
    async fn covers_self(&self, _top_backend: i64) -> Result<bool> {
        let (x, y) = self.element.rect().viewport_click_point().await?;
        let contained = self
            .element
            .run_js(
                "return this.contains(document.elementFromPoint(arguments[0], arguments[1]));",
                &[json!(x), json!(y)],
                false,
                None,
            )
            .await?;
        Ok(contained.as_bool().unwrap_or(false))
    }

    /// The handle still points at a node in the current document.
    pub async fn is_alive(&self) -> Result<bool> {
        let result = self
            .element
            .ctx()
            .call(
                "DOM.describeNode",
                json!({ "backendNodeId": self.element.backend_id() }),
            )
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(e) if e.is_stale_handle() => Ok(false),
            Err(Error::Cdp(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The whole border box is inside the current viewport.
    pub async fn is_in_viewport(&self) -> Result<bool> {
        let value = self
            .element
            .run_js(
                "const r = this.getBoundingClientRect();\
                 return r.top >= 0 && r.left >= 0 &&\
                 r.bottom <= window.innerHeight && r.right <= window.innerWidth;",
                &[],
                false,
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockTransport;
    use crate::cdp::traits::Transport;
    use crate::config::Timeouts;
    use crate::element::PageCtx;
    use crate::settings::Settings;
    use std::sync::Arc;

    fn ctx(mock: &Arc<MockTransport>) -> PageCtx {
        PageCtx {
            transport: mock.clone() as Arc<dyn Transport>,
            timeouts: Timeouts::default(),
            settings: Settings::default(),
        }
    }

    fn resolve_ok() -> serde_json::Value {
        json!({ "object": { "type": "object", "objectId": "obj-1" } })
    }

    #[tokio::test]
    async fn test_is_enabled_reads_disabled_property() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.resolveNode", Ok(resolve_ok())).await;
        mock.expect(
            "Runtime.callFunctionOn",
            Ok(json!({ "result": { "type": "boolean", "value": true } })),
        )
        .await;
        let element = Element::from_backend_id(ctx(&mock), 5);

        assert!(!element.states().is_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_alive_false_when_node_lost() {
        let mock = MockTransport::new("t1");
        mock.expect(
            "DOM.describeNode",
            Err(crate::Error::Cdp(crate::error::CdpFailure {
                method: "DOM.describeNode".into(),
                params: json!({}),
                code: -32000,
                message: "No node with given id found".into(),
                data: None,
            })),
        )
        .await;
        let element = Element::from_backend_id(ctx(&mock), 5);

        assert!(!element.states().is_alive().await.unwrap());
    }

    #[tokio::test]
    async fn test_is_covered_by_other_node() {
        let mock = MockTransport::new("t1");
        mock.expect(
            "DOM.getBoxModel",
            Ok(json!({ "model": {
                "content": [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0],
                "border": [0.0, 0.0, 10.0, 0.0, 10.0, 10.0, 0.0, 10.0],
                "width": 10.0, "height": 10.0,
            }})),
        )
        .await;
        mock.expect("DOM.getNodeForLocation", Ok(json!({ "backendNodeId": 99 })))
            .await;
        mock.expect("DOM.resolveNode", Ok(resolve_ok())).await;
        // Neither containment probe claims the covering node is ours
        mock.expect(
            "Runtime.callFunctionOn",
            Ok(json!({ "result": { "type": "boolean", "value": false } })),
        )
        .await;
        let element = Element::from_backend_id(ctx(&mock), 5);

        assert_eq!(element.states().is_covered().await.unwrap(), Some(99));
    }
}
