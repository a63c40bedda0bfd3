//! Unified error types for Drover-Oxide

use serde_json::Value;
use thiserror::Error;

/// Unified Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Raw CDP failure context preserved on protocol-level errors.
#[derive(Debug, Clone)]
pub struct CdpFailure {
    /// Method that failed (e.g. "DOM.describeNode")
    pub method: String,
    /// Parameters the method was called with
    pub params: Value,
    /// Error code reported by the browser
    pub code: i64,
    /// Error message reported by the browser
    pub message: String,
    /// Additional error data, if any
    pub data: Option<Value>,
}

impl std::fmt::Display for CdpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {}, method {})", self.message, self.code, self.method)
    }
}

/// Unified error type for Drover-Oxide
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket errors
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic CDP protocol error with the raw failure attached
    #[error("CDP error: {0}")]
    Cdp(CdpFailure),

    /// The debugger address could not be reached or is not a CDP browser
    #[error("Browser connect error: {0}")]
    BrowserConnect(String),

    /// The page-level transport is gone (target destroyed or socket lost)
    #[error("Page disconnected: {0}")]
    PageDisconnected(String),

    /// A blocked call was interrupted by a JavaScript dialog
    #[error("An alert is present on the page: {0}")]
    AlertExists(String),

    /// Locator syntax error
    #[error("Invalid locator: {0}")]
    Locator(String),

    /// No element matched the locator within the timeout
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The element's node/object ids are stale
    #[error("Element lost: {0}")]
    ElementLost(String),

    /// The execution context with the given id no longer exists
    #[error("Context lost: {0}")]
    ContextLost(String),

    /// Click could not be performed
    #[error("Cannot click element: {0}")]
    CanNotClick(String),

    /// The element has no layout rectangle
    #[error("Element has no rect: {0}")]
    NoRect(String),

    /// JavaScript threw inside the page
    #[error("JavaScript error: {0}")]
    JavaScript(String),

    /// A wait primitive timed out and raising was requested
    #[error("Wait timed out: {0}")]
    WaitTimeout(String),

    /// Blocking CDP call timed out; method and params attached
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// A URL was malformed or not navigable
    #[error("Incorrect URL: {0}")]
    IncorrectUrl(String),

    /// DOMStorage / sessionStorage / localStorage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Cookie record could not be normalized
    #[error("Cookie format error: {0}")]
    CookieFormat(String),

    /// A resource (download body, src content) was unavailable
    #[error("No resource: {0}")]
    NoResource(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new WebSocket error
    pub fn websocket<S: Into<String>>(msg: S) -> Self {
        Error::WebSocket(msg.into())
    }

    /// Create a new browser connect error
    pub fn browser_connect<S: Into<String>>(msg: S) -> Self {
        Error::BrowserConnect(msg.into())
    }

    /// Create a new page disconnected error
    pub fn disconnected<S: Into<String>>(msg: S) -> Self {
        Error::PageDisconnected(msg.into())
    }

    /// Create a new alert-exists error
    pub fn alert_exists<S: Into<String>>(method: S) -> Self {
        Error::AlertExists(method.into())
    }

    /// Create a new locator error
    pub fn locator<S: Into<String>>(msg: S) -> Self {
        Error::Locator(msg.into())
    }

    /// Create a new element not found error
    pub fn element_not_found<S: Into<String>>(loc: S) -> Self {
        Error::ElementNotFound(loc.into())
    }

    /// Create a new element lost error
    pub fn element_lost<S: Into<String>>(msg: S) -> Self {
        Error::ElementLost(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a new wait timeout error
    pub fn wait_timeout<S: Into<String>>(msg: S) -> Self {
        Error::WaitTimeout(msg.into())
    }

    /// Create a new JavaScript error
    pub fn can_not_click<S: Into<String>>(msg: S) -> Self {
        Error::CanNotClick(msg.into())
    }

    pub fn no_rect<S: Into<String>>(msg: S) -> Self {
        Error::NoRect(msg.into())
    }

    pub fn javascript<S: Into<String>>(msg: S) -> Self {
        Error::JavaScript(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Error::Storage(msg.into())
    }

    /// Create a new cookie format error
    pub fn cookie_format<S: Into<String>>(msg: S) -> Self {
        Error::CookieFormat(msg.into())
    }

    /// Create a new no-resource error
    pub fn no_resource<S: Into<String>>(msg: S) -> Self {
        Error::NoResource(msg.into())
    }

    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Error::Configuration(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Error::Internal(msg.into())
    }

    /// Map a raw CDP error response to a typed error kind.
    ///
    /// The browser reports failures as free-form messages; the well-known
    /// ones are matched by substring, everything else stays a generic
    /// [`Error::Cdp`] with the raw failure attached.
    pub fn from_cdp(method: &str, params: Value, code: i64, message: &str, data: Option<Value>) -> Self {
        let failure = CdpFailure {
            method: method.to_string(),
            params,
            code,
            message: message.to_string(),
            data,
        };
        if message.contains("Cannot find context with specified id")
            || message.contains("Execution context was destroyed")
        {
            Error::ContextLost(failure.to_string())
        } else if message.contains("Could not find node with given id")
            || message.contains("No node with given id found")
            || message.contains("Could not find object with given id")
            || message.contains("Node with given id does not belong to the document")
            || message.contains("No node found for given backend id")
        {
            Error::ElementLost(failure.to_string())
        } else if message.contains("Cannot navigate to invalid URL") {
            Error::IncorrectUrl(failure.to_string())
        } else if message.contains("Session with given id not found")
            || message.contains("Target closed")
            || message.contains("Inspected target navigated or closed")
        {
            Error::PageDisconnected(failure.to_string())
        } else {
            Error::Cdp(failure)
        }
    }

    /// True when the failure indicates a stale node/object id, where one
    /// transparent refresh-and-retry is allowed.
    pub fn is_stale_handle(&self) -> bool {
        matches!(self, Error::ElementLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_lost_mapping() {
        let err = Error::from_cdp(
            "Runtime.callFunctionOn",
            json!({}),
            -32000,
            "Cannot find context with specified id",
            None,
        );
        assert!(matches!(err, Error::ContextLost(_)));
    }

    #[test]
    fn test_element_lost_mapping() {
        let err = Error::from_cdp(
            "DOM.describeNode",
            json!({"nodeId": 12}),
            -32000,
            "Could not find node with given id",
            None,
        );
        assert!(matches!(err, Error::ElementLost(_)));
        assert!(err.is_stale_handle());
    }

    #[test]
    fn test_invalid_url_mapping() {
        let err = Error::from_cdp(
            "Page.navigate",
            json!({"url": "nonsense"}),
            -32000,
            "Cannot navigate to invalid URL",
            None,
        );
        assert!(matches!(err, Error::IncorrectUrl(_)));
    }

    #[test]
    fn test_unknown_stays_generic() {
        let err = Error::from_cdp("DOM.focus", json!({}), -32601, "Some new failure", None);
        match err {
            Error::Cdp(failure) => {
                assert_eq!(failure.method, "DOM.focus");
                assert_eq!(failure.code, -32601);
            }
            other => panic!("expected generic CDP error, got {other:?}"),
        }
    }
}
