//! Mock transport for unit tests
//!
//! A scriptable in-process stand-in for the WebSocket driver. Responses
//! are keyed by method; unscripted methods answer with an empty object.
//! Tests can push events through the registered handler tables with
//! [`MockTransport::emit`].

use crate::cdp::driver::{DisconnectHook, EventHandler};
use crate::cdp::traits::Transport;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One recorded call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Method name
    pub method: String,
    /// Parameters
    pub params: Value,
}

/// Scripted answer paired with whether it has already been served
type Scripted = (Result<Value>, bool);

/// Scriptable mock transport
#[derive(Default)]
pub struct MockTransport {
    target_id: String,
    running: AtomicBool,
    alert: AtomicBool,
    reconnecting: AtomicBool,
    /// Scripted responses: method -> FIFO of results. An error answers
    /// exactly once; the newest success stays sticky so repeated calls
    /// keep answering until a later entry supersedes it.
    responses: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<RecordedCall>>,
    handlers: Mutex<HashMap<String, EventHandler>>,
    immediate_handlers: Mutex<HashMap<String, EventHandler>>,
    on_disconnect: Mutex<Option<DisconnectHook>>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("target_id", &self.target_id)
            .field("running", &self.is_running())
            .finish()
    }
}

impl MockTransport {
    /// New mock for a target id
    pub fn new<S: Into<String>>(target_id: S) -> Arc<Self> {
        let mock = Self {
            target_id: target_id.into(),
            running: AtomicBool::new(true),
            ..Default::default()
        };
        Arc::new(mock)
    }

    /// Script the next response for a method
    pub async fn expect(&self, method: &str, result: Result<Value>) {
        self.responses
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push_back((result, false));
    }

    /// All calls recorded so far
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Calls recorded for one method
    pub async fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Push an event through the registered handler, awaiting it, the way
    /// the real dispatcher would.
    pub async fn emit(&self, method: &str, params: Value) {
        if method == "Page.javascriptDialogOpening" {
            self.alert.store(true, Ordering::SeqCst);
        } else if method == "Page.javascriptDialogClosed" {
            self.alert.store(false, Ordering::SeqCst);
        }
        let handler = {
            let immediate = self.immediate_handlers.lock().await;
            match immediate.get(method) {
                Some(h) => Some(h.clone()),
                None => self.handlers.lock().await.get(method).cloned(),
            }
        };
        if let Some(handler) = handler {
            handler(params).await;
        }
    }

    /// Whether a handler is registered for an event
    pub async fn has_callback(&self, method: &str) -> bool {
        self.handlers.lock().await.contains_key(method)
            || self.immediate_handlers.lock().await.contains_key(method)
    }

    /// Whether an event is registered on the immediate queue
    pub async fn is_immediate(&self, method: &str) -> bool {
        self.immediate_handlers.lock().await.contains_key(method)
    }

    /// Raise or clear the alert flag directly
    pub fn set_alert(&self, value: bool) {
        self.alert.store(value, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn target_id(&self) -> &str {
        &self.target_id
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn alert_open(&self) -> bool {
        self.alert.load(Ordering::SeqCst)
    }

    async fn call(&self, method: &str, params: Value, _timeout: Duration) -> Result<Value> {
        if !self.is_running() {
            return Err(Error::disconnected("mock transport stopped"));
        }
        self.calls.lock().await.push(RecordedCall {
            method: method.to_string(),
            params,
        });

        let mut responses = self.responses.lock().await;
        if let Some(queue) = responses.get_mut(method) {
            // A served sticky entry yields to a newer script
            while queue.len() > 1 && queue.front().is_some_and(|(_, served)| *served) {
                queue.pop_front();
            }
            // Errors answer exactly once, preserving the scripted variant
            if queue.front().is_some_and(|(result, _)| result.is_err()) {
                if let Some((result, _)) = queue.pop_front() {
                    return result;
                }
            }
            if let Some((result, served)) = queue.front_mut() {
                *served = true;
                if let Ok(v) = result {
                    return Ok(v.clone());
                }
            }
        }
        Ok(Value::Object(serde_json::Map::new()))
    }

    async fn set_callback(&self, event: &str, handler: EventHandler, immediate: bool) {
        if !self.is_running() {
            return;
        }
        let table = if immediate {
            &self.immediate_handlers
        } else {
            &self.handlers
        };
        table.lock().await.insert(event.to_string(), handler);
    }

    async fn clear_callback(&self, event: &str) {
        self.handlers.lock().await.remove(event);
        self.immediate_handlers.lock().await.remove(event);
    }

    async fn set_on_disconnect(&self, hook: DisconnectHook) {
        *self.on_disconnect.lock().await = Some(hook);
    }

    fn set_reconnecting(&self, value: bool) {
        self.reconnecting.store(value, Ordering::SeqCst);
    }

    async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.handlers.lock().await.clear();
        self.immediate_handlers.lock().await.clear();
        if !self.reconnecting.load(Ordering::SeqCst) {
            if let Some(hook) = self.on_disconnect.lock().await.take() {
                hook();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_response() {
        let mock = MockTransport::new("t1");
        mock.expect("Page.navigate", Ok(json!({"frameId": "F1"}))).await;

        let result = mock
            .call("Page.navigate", json!({"url": "about:blank"}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(result["frameId"], "F1");

        // Sticky last response
        let again = mock
            .call("Page.navigate", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(again["frameId"], "F1");
    }

    #[tokio::test]
    async fn test_scripted_error_keeps_its_variant_and_answers_once() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.getBoxModel", Err(Error::no_rect("node has no box model"))).await;

        let err = mock
            .call("DOM.getBoxModel", json!({"backendNodeId": 50}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoRect(_)));

        // Consumed; the next call falls back to the default answer
        let again = mock
            .call("DOM.getBoxModel", json!({"backendNodeId": 50}), Duration::from_secs(1))
            .await
            .unwrap();
        assert!(again.as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_later_script_supersedes_served_response() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.describeNode", Ok(json!({"node": {"nodeId": 1}}))).await;

        let first = mock
            .call("DOM.describeNode", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(first["node"]["nodeId"], 1);

        // Scripting again after the first answer was served replaces it
        mock.expect("DOM.describeNode", Ok(json!({"node": {"nodeId": 2}}))).await;
        let second = mock
            .call("DOM.describeNode", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(second["node"]["nodeId"], 2);

        // And the replacement is sticky in turn
        let third = mock
            .call("DOM.describeNode", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(third["node"]["nodeId"], 2);
    }

    #[tokio::test]
    async fn test_queued_error_then_success_served_in_order() {
        let mock = MockTransport::new("t1");
        mock.expect(
            "DOM.describeNode",
            Err(Error::element_lost("No node found for given backend id")),
        )
        .await;
        mock.expect("DOM.describeNode", Ok(json!({"node": {"nodeId": 3}}))).await;

        let err = mock
            .call("DOM.describeNode", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_stale_handle());

        let ok = mock
            .call("DOM.describeNode", json!({}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(ok["node"]["nodeId"], 3);
    }

    #[tokio::test]
    async fn test_unscripted_method_answers_empty() {
        let mock = MockTransport::new("t1");
        let result = mock
            .call("Page.enable", Value::Null, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.as_object().unwrap().is_empty());
        assert_eq!(mock.calls_for("Page.enable").await.len(), 1);
    }

    #[tokio::test]
    async fn test_emit_reaches_handler() {
        let mock = MockTransport::new("t1");
        let hit = Arc::new(AtomicBool::new(false));
        let hit2 = Arc::clone(&hit);
        let handler: EventHandler = Arc::new(move |_params| {
            let hit = Arc::clone(&hit2);
            Box::pin(async move {
                hit.store(true, Ordering::SeqCst);
            })
        });
        mock.set_callback("Page.loadEventFired", handler, false).await;
        mock.emit("Page.loadEventFired", json!({})).await;
        assert!(hit.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stop_fires_hook_once() {
        let mock = MockTransport::new("t1");
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = Arc::clone(&fired);
        mock.set_on_disconnect(Box::new(move || {
            fired2.store(true, Ordering::SeqCst);
        }))
        .await;
        mock.stop().await;
        mock.stop().await;
        assert!(fired.load(Ordering::SeqCst));
        assert!(!mock.is_running());
    }
}
