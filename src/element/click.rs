//! Click actions
//!
//! A simulated click goes through a fixed sequence: wait for geometry,
//! wait for the element to stop moving, scroll it into the viewport,
//! verify the click point actually hits the element, then dispatch real
//! mouse events. When any step rules a simulated click out, the auto
//! mode falls back to a JS click; the strict mode applies the failure
//! policy instead.

use super::Element;
use crate::waiter;
use crate::{Error, Result};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// How a click is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickMode {
    /// Simulate when possible, JS when not
    #[default]
    Auto,
    /// Always `this.click()`
    Js,
    /// Only real mouse events; apply the failure policy otherwise
    Simulate,
}

/// Mouse button for a click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

const STABLE_GAP: Duration = Duration::from_millis(50);
const STABLE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Click accessor for one element
#[derive(Debug)]
pub struct Click<'a> {
    element: &'a Element,
}

impl<'a> Click<'a> {
    pub(crate) fn new(element: &'a Element) -> Self {
        Self { element }
    }

    /// Left click. Returns whether a click was delivered; a miss only
    /// raises when the click failure policy says so.
    pub async fn left(&self, mode: ClickMode) -> Result<bool> {
        self.perform(MouseButton::Left, 1, mode, None).await
    }

    /// Right click, always simulated.
    pub async fn right(&self) -> Result<bool> {
        self.perform(MouseButton::Right, 1, ClickMode::Simulate, None)
            .await
    }

    /// Middle click, always simulated.
    pub async fn middle(&self) -> Result<bool> {
        self.perform(MouseButton::Middle, 1, ClickMode::Simulate, None)
            .await
    }

    /// Double click
    pub async fn double(&self, mode: ClickMode) -> Result<bool> {
        self.perform(MouseButton::Left, 2, mode, None).await
    }

    /// `times` rapid clicks at the same point
    pub async fn multi(&self, times: u32) -> Result<bool> {
        self.perform(MouseButton::Left, times.max(1), ClickMode::Simulate, None)
            .await
    }

    /// Click at an offset from the element's top-left corner. Skips the
    /// hit verification: the caller chose the point deliberately.
    pub async fn at(&self, offset_x: f64, offset_y: f64, button: MouseButton) -> Result<bool> {
        let location = self.element.rect().viewport_location().await?;
        self.perform(
            button,
            1,
            ClickMode::Simulate,
            Some((location.0 + offset_x, location.1 + offset_y)),
        )
        .await
    }

    async fn perform(
        &self,
        button: MouseButton,
        count: u32,
        mode: ClickMode,
        point: Option<(f64, f64)>,
    ) -> Result<bool> {
        // Options in a select box never get real mouse events.
        if button == MouseButton::Left && self.element.tag().await? == "option" {
            return self.select_option().await;
        }

        if mode == ClickMode::Js {
            return self.js_click().await;
        }

        // Geometry must exist before anything can be aimed at it.
        let has_rect = waiter::wait_for(
            || async move { self.element.states().has_rect().await.unwrap_or(false) },
            self.element.ctx().timeouts.base_duration(),
            waiter::DEFAULT_INTERVAL,
            false,
            "element rect",
        )
        .await?;
        if !has_rect {
            return self.fallback(mode, "element has no rect").await;
        }

        // Let animations settle; a still-moving element is clicked where
        // it ends up, not where it was sampled.
        let _ = waiter::wait_until_stable(
            || async move {
                let (x, y) = self.element.rect().viewport_location().await?;
                let (w, h) = self.element.rect().size().await?;
                Ok((x as i64, y as i64, w as i64, h as i64))
            },
            STABLE_GAP,
            STABLE_TIMEOUT,
        )
        .await;

        if point.is_none() && !self.element.states().is_in_viewport().await? {
            self.element.scroll_into_view().await?;
            if !self.element.states().is_in_viewport().await? {
                return self.fallback(mode, "element will not scroll into view").await;
            }
        }

        let (x, y) = match point {
            Some(p) => p,
            None => {
                let p = self.element.rect().viewport_click_point().await?;
                if let Some(covering) = self.element.states().is_covered().await? {
                    debug!("Click point covered by backend id {}", covering);
                    return self
                        .fallback(mode, "click point is covered by another element")
                        .await;
                }
                p
            }
        };

        for i in 1..=count {
            self.element
                .ctx()
                .call(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": "mousePressed",
                        "x": x, "y": y,
                        "button": button.as_str(),
                        "clickCount": i,
                    }),
                )
                .await?;
            self.element
                .ctx()
                .call(
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": "mouseReleased",
                        "x": x, "y": y,
                        "button": button.as_str(),
                        "clickCount": i,
                    }),
                )
                .await?;
        }
        Ok(true)
    }

    async fn fallback(&self, mode: ClickMode, reason: &str) -> Result<bool> {
        match mode {
            ClickMode::Auto => self.js_click().await,
            _ => {
                if self.element.ctx().settings.raise_when_click_failed {
                    Err(Error::can_not_click(reason))
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn js_click(&self) -> Result<bool> {
        self.element.run_js("this.click();", &[], false, None).await?;
        Ok(true)
    }

    /// Selecting an option toggles it through its parent select and
    /// fires the input/change events a real pick would.
    async fn select_option(&self) -> Result<bool> {
        let value = self
            .element
            .run_js(
                "const sel = this.closest('select');\
                 if (!sel) { this.click(); return true; }\
                 if (sel.multiple) { this.selected = !this.selected; }\
                 else { sel.value = this.value; }\
                 sel.dispatchEvent(new Event('input', {bubbles: true}));\
                 sel.dispatchEvent(new Event('change', {bubbles: true}));\
                 return true;",
                &[],
                false,
                None,
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }
}
