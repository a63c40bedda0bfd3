//! sessionStorage / localStorage helpers
//!
//! Reads go through `Runtime.evaluate` in the page; wholesale clears use
//! the DOMStorage domain so they work without a JS execution context.

use crate::cdp::traits::Transport;
use crate::{Error, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Which of the two page storages to address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// window.sessionStorage
    Session,
    /// window.localStorage
    Local,
}

impl StorageKind {
    fn js_name(&self) -> &'static str {
        match self {
            StorageKind::Session => "sessionStorage",
            StorageKind::Local => "localStorage",
        }
    }

    fn is_local(&self) -> bool {
        matches!(self, StorageKind::Local)
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

async fn evaluate(transport: &Arc<dyn Transport>, expression: String) -> Result<serde_json::Value> {
    let result = transport
        .call(
            "Runtime.evaluate",
            json!({
                "expression": expression,
                "returnByValue": true,
            }),
            STORAGE_TIMEOUT,
        )
        .await?;
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .pointer("/exception/description")
            .and_then(|d| d.as_str())
            .unwrap_or("storage access failed");
        return Err(Error::storage(text.to_string()));
    }
    Ok(result
        .pointer("/result/value")
        .cloned()
        .unwrap_or(serde_json::Value::Null))
}

/// Read one item, or the whole store as a map when `key` is `None`.
pub async fn get_item(
    transport: &Arc<dyn Transport>,
    kind: StorageKind,
    key: Option<&str>,
) -> Result<serde_json::Value> {
    let expression = match key {
        Some(key) => format!("window.{}.getItem({})", kind.js_name(), js_string(key)),
        None => format!("Object.assign({{}}, window.{})", kind.js_name()),
    };
    evaluate(transport, expression).await
}

/// Write one item. A `None` value removes the key.
pub async fn set_item(
    transport: &Arc<dyn Transport>,
    kind: StorageKind,
    key: &str,
    value: Option<&str>,
) -> Result<()> {
    let expression = match value {
        Some(value) => format!(
            "window.{}.setItem({},{})",
            kind.js_name(),
            js_string(key),
            js_string(value)
        ),
        None => format!("window.{}.removeItem({})", kind.js_name(), js_string(key)),
    };
    evaluate(transport, expression).await?;
    Ok(())
}

/// Clear a whole store through the DOMStorage domain.
pub async fn clear(
    transport: &Arc<dyn Transport>,
    kind: StorageKind,
    security_origin: &str,
) -> Result<()> {
    transport
        .call("DOMStorage.enable", json!({}), STORAGE_TIMEOUT)
        .await?;
    let result = transport
        .call(
            "DOMStorage.clear",
            json!({
                "storageId": {
                    "securityOrigin": security_origin,
                    "isLocalStorage": kind.is_local(),
                }
            }),
            STORAGE_TIMEOUT,
        )
        .await;
    let _ = transport
        .call("DOMStorage.disable", json!({}), STORAGE_TIMEOUT)
        .await;
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockTransport;

    #[tokio::test]
    async fn test_get_item_builds_expression() {
        let mock = MockTransport::new("t1");
        mock.expect(
            "Runtime.evaluate",
            Ok(json!({"result": {"type": "string", "value": "v1"}})),
        )
        .await;

        let transport: Arc<dyn Transport> = mock.clone();
        let value = get_item(&transport, StorageKind::Session, Some("k1"))
            .await
            .unwrap();
        assert_eq!(value, json!("v1"));

        let calls = mock.calls_for("Runtime.evaluate").await;
        let expr = calls[0].params["expression"].as_str().unwrap();
        assert_eq!(expr, "window.sessionStorage.getItem(\"k1\")");
    }

    #[tokio::test]
    async fn test_set_item_none_removes() {
        let mock = MockTransport::new("t1");
        let transport: Arc<dyn Transport> = mock.clone();
        set_item(&transport, StorageKind::Local, "k1", None)
            .await
            .unwrap();

        let calls = mock.calls_for("Runtime.evaluate").await;
        let expr = calls[0].params["expression"].as_str().unwrap();
        assert_eq!(expr, "window.localStorage.removeItem(\"k1\")");
    }

    #[tokio::test]
    async fn test_storage_exception_maps_to_storage_error() {
        let mock = MockTransport::new("t1");
        mock.expect(
            "Runtime.evaluate",
            Ok(json!({
                "exceptionDetails": {"exception": {"description": "SecurityError: denied"}},
                "result": {"type": "undefined"},
            })),
        )
        .await;

        let transport: Arc<dyn Transport> = mock.clone();
        let err = get_item(&transport, StorageKind::Local, Some("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[tokio::test]
    async fn test_clear_uses_domstorage() {
        let mock = MockTransport::new("t1");
        let transport: Arc<dyn Transport> = mock.clone();
        clear(&transport, StorageKind::Local, "https://example.com")
            .await
            .unwrap();

        let calls = mock.calls_for("DOMStorage.clear").await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params["storageId"]["isLocalStorage"], json!(true));
    }
}
