//! Element geometry
//!
//! Three coordinate spaces are exposed: document (page origin, unaffected
//! by scrolling), viewport (what `Input.*` and `DOM.getNodeForLocation`
//! consume) and screen (for callers driving a real pointer). Box quads
//! come from `DOM.getBoxModel` and are viewport-relative; the document
//! offset is the scroll position from `Page.getLayoutMetrics`.

use super::Element;
use crate::cdp::types::BoxModel;
use crate::{Error, Result};
use serde_json::json;

/// Geometry accessor for one element
#[derive(Debug)]
pub struct ElementRect<'a> {
    element: &'a Element,
}

impl<'a> ElementRect<'a> {
    pub(crate) fn new(element: &'a Element) -> Self {
        Self { element }
    }

    /// Raw box model, viewport-relative quads.
    pub async fn box_model(&self) -> Result<BoxModel> {
        let result = self
            .element
            .ctx()
            .call(
                "DOM.getBoxModel",
                json!({ "backendNodeId": self.element.backend_id() }),
            )
            .await
            .map_err(|e| match e {
                Error::Cdp(f) if f.message.contains("box model") => {
                    Error::no_rect(f.message.clone())
                }
                other => other,
            })?;
        let model = result
            .get("model")
            .cloned()
            .ok_or_else(|| Error::no_rect("no model in box model result"))?;
        Ok(serde_json::from_value(model)?)
    }

    /// Rendered size as `(width, height)`
    pub async fn size(&self) -> Result<(f64, f64)> {
        let model = self.box_model().await?;
        Ok((model.width, model.height))
    }

    /// Scroll offset of the page as `(x, y)`
    async fn scroll_offset(&self) -> Result<(f64, f64)> {
        let result = self
            .element
            .ctx()
            .call("Page.getLayoutMetrics", json!({}))
            .await?;
        let x = result
            .pointer("/cssVisualViewport/pageX")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        let y = result
            .pointer("/cssVisualViewport/pageY")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        Ok((x, y))
    }

    /// Offset from viewport space to screen space.
    async fn screen_offset(&self) -> Result<(f64, f64)> {
        let value = self
            .element
            .run_js(
                "return [window.screenX, window.screenY + window.outerHeight - window.innerHeight];",
                &[],
                false,
                None,
            )
            .await?;
        let pair = value.as_array().cloned().unwrap_or_default();
        let x = pair.first().and_then(|v| v.as_f64()).unwrap_or(0.0);
        let y = pair.get(1).and_then(|v| v.as_f64()).unwrap_or(0.0);
        Ok((x, y))
    }

    fn quad_top_left(quad: &[f64]) -> (f64, f64) {
        let xs = quad.iter().step_by(2);
        let ys = quad.iter().skip(1).step_by(2);
        let x = xs.fold(f64::MAX, |a, &b| a.min(b));
        let y = ys.fold(f64::MAX, |a, &b| a.min(b));
        (x, y)
    }

    fn quad_midpoint(quad: &[f64]) -> (f64, f64) {
        let n = (quad.len() / 2).max(1) as f64;
        let x: f64 = quad.iter().step_by(2).sum::<f64>() / n;
        let y: f64 = quad.iter().skip(1).step_by(2).sum::<f64>() / n;
        (x, y)
    }

    /// Top-left corner, viewport-relative.
    pub async fn viewport_location(&self) -> Result<(f64, f64)> {
        let model = self.box_model().await?;
        Ok(Self::quad_top_left(&model.border))
    }

    /// Geometric center, viewport-relative.
    pub async fn viewport_midpoint(&self) -> Result<(f64, f64)> {
        let model = self.box_model().await?;
        Ok(Self::quad_midpoint(&model.border))
    }

    /// The point a click lands on, viewport-relative. The center of the
    /// content box, so padding-heavy elements still get hit inside their
    /// visible area.
    pub async fn viewport_click_point(&self) -> Result<(f64, f64)> {
        let model = self.box_model().await?;
        if model.content.is_empty() {
            return Ok(Self::quad_midpoint(&model.border));
        }
        Ok(Self::quad_midpoint(&model.content))
    }

    /// Border-box corners, viewport-relative, clockwise from top-left.
    pub async fn viewport_corners(&self) -> Result<[(f64, f64); 4]> {
        let model = self.box_model().await?;
        let q = &model.border;
        if q.len() < 8 {
            return Err(Error::no_rect("border quad is incomplete"));
        }
        Ok([(q[0], q[1]), (q[2], q[3]), (q[4], q[5]), (q[6], q[7])])
    }

    /// Top-left corner in document coordinates.
    pub async fn location(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_location().await?;
        let (sx, sy) = self.scroll_offset().await?;
        Ok((x + sx, y + sy))
    }

    /// Geometric center in document coordinates.
    pub async fn midpoint(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_midpoint().await?;
        let (sx, sy) = self.scroll_offset().await?;
        Ok((x + sx, y + sy))
    }

    /// Click point in document coordinates.
    pub async fn click_point(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_click_point().await?;
        let (sx, sy) = self.scroll_offset().await?;
        Ok((x + sx, y + sy))
    }

    /// Border-box corners in document coordinates.
    pub async fn corners(&self) -> Result<[(f64, f64); 4]> {
        let corners = self.viewport_corners().await?;
        let (sx, sy) = self.scroll_offset().await?;
        Ok(corners.map(|(x, y)| (x + sx, y + sy)))
    }

    /// Top-left corner in screen coordinates.
    pub async fn screen_location(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_location().await?;
        let (ox, oy) = self.screen_offset().await?;
        Ok((x + ox, y + oy))
    }

    /// Geometric center in screen coordinates.
    pub async fn screen_midpoint(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_midpoint().await?;
        let (ox, oy) = self.screen_offset().await?;
        Ok((x + ox, y + oy))
    }

    /// Click point in screen coordinates.
    pub async fn screen_click_point(&self) -> Result<(f64, f64)> {
        let (x, y) = self.viewport_click_point().await?;
        let (ox, oy) = self.screen_offset().await?;
        Ok((x + ox, y + oy))
    }
}
