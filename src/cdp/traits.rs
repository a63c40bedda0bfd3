//! CDP layer traits
//!
//! The transport seam the browser/tab/element layers are written against.
//! [`crate::cdp::driver::Driver`] is the WebSocket implementation; the
//! mock in [`crate::cdp::mock`] stands in for it in tests.

use crate::cdp::driver::{DisconnectHook, EventHandler};
use crate::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Bidirectional channel to one CDP target.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Target id this transport serves
    fn target_id(&self) -> &str;

    /// Whether the transport is still running
    fn is_running(&self) -> bool;

    /// Whether a JavaScript dialog is currently open on this target
    fn alert_open(&self) -> bool;

    /// Send a command and wait for the matching response. A zero timeout
    /// means fire-and-forget.
    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value>;

    /// Register an event handler; `immediate` selects the dedicated
    /// dialog-capable worker queue.
    async fn set_callback(&self, event: &str, handler: EventHandler, immediate: bool);

    /// Remove an event handler
    async fn clear_callback(&self, event: &str);

    /// Register the owner's disconnect hook
    async fn set_on_disconnect(&self, hook: DisconnectHook);

    /// Suppress or restore the disconnect hook around intentional stops
    fn set_reconnecting(&self, value: bool);

    /// Stop the transport. Idempotent.
    async fn stop(&self);
}

/// Convenience: build a boxed-future event handler from an async closure.
#[macro_export]
macro_rules! event_handler {
    ($body:expr) => {{
        let f = $body;
        std::sync::Arc::new(move |params: serde_json::Value| {
            let fut = f(params);
            Box::pin(fut) as futures::future::BoxFuture<'static, ()>
        }) as $crate::cdp::driver::EventHandler
    }};
}
