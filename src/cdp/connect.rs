//! Debugger endpoint probe
//!
//! HTTP side of the CDP endpoint: `/json/version` yields the browser-level
//! WebSocket URL (the browser id is derived from it), `/json` enumerates
//! live targets. A browser is considered reachable once at least one
//! `page`/`webview` target shows up within the connect timeout.

use crate::cdp::types::{BrowserVersion, TargetInfo};
use crate::{Error, Result};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Target entry as listed by `http://host:port/json`
#[derive(Debug, Clone, Deserialize)]
pub struct JsonTarget {
    /// Target id
    pub id: String,
    /// Target type ("page", "webview", "background_page", ...)
    pub r#type: String,
    /// Title
    #[serde(default)]
    pub title: String,
    /// URL
    #[serde(default)]
    pub url: String,
    /// Per-target WebSocket debugger URL
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

/// HTTP probe of one debugger address ("host:port").
#[derive(Debug, Clone)]
pub struct Endpoint {
    address: String,
    client: reqwest::Client,
}

impl Endpoint {
    /// Build a probe for a debugger address.
    pub fn new<S: Into<String>>(address: S) -> Result<Self> {
        let address = address.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { address, client })
    }

    /// Debugger address ("host:port")
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Fetch `/json/version`. The `webSocketDebuggerUrl` in the answer is
    /// the browser-level socket; its last path segment is the browser id.
    pub async fn version(&self) -> Result<BrowserVersion> {
        let url = format!("http://{}/json/version", self.address);
        debug!("Fetching browser version from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::browser_connect(format!("{} is unreachable: {}", self.address, e)))?;

        response
            .json::<BrowserVersion>()
            .await
            .map_err(|e| {
                Error::browser_connect(format!(
                    "{} answered but is not a CDP browser: {}",
                    self.address, e
                ))
            })
    }

    /// Fetch the live target list from `/json`.
    pub async fn targets(&self) -> Result<Vec<JsonTarget>> {
        let url = format!("http://{}/json", self.address);
        debug!("Fetching targets from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::browser_connect(format!("{} is unreachable: {}", self.address, e)))?;

        response
            .json::<Vec<JsonTarget>>()
            .await
            .map_err(|e| {
                Error::browser_connect(format!(
                    "{} answered but is not a CDP browser: {}",
                    self.address, e
                ))
            })
    }

    /// Wait until the endpoint exposes at least one page/webview target.
    /// Returns the browser-level WebSocket URL on success.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.targets().await {
                Ok(targets) => {
                    let has_page = targets
                        .iter()
                        .any(|t| t.r#type == "page" || t.r#type == "webview");
                    if has_page {
                        let version = self.version().await?;
                        if version.web_socket_debugger_url.is_empty() {
                            return Err(Error::browser_connect(format!(
                                "browser at {} is too old to be controlled",
                                self.address
                            )));
                        }
                        return Ok(version.web_socket_debugger_url);
                    }
                    debug!("No page target at {} yet", self.address);
                }
                Err(e) => {
                    warn!("Probe of {} failed: {}", self.address, e);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::browser_connect(format!(
                    "no page target appeared at {} within {:?}",
                    self.address, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    /// Per-target WebSocket URL for a page target id.
    pub fn page_ws_url(&self, target_id: &str) -> String {
        format!("ws://{}/devtools/page/{}", self.address, target_id)
    }
}

/// Browser id: the last path segment of the browser-level WebSocket URL.
pub fn browser_id_from_ws_url(ws_url: &str) -> String {
    ws_url.rsplit('/').next().unwrap_or(ws_url).to_string()
}

/// Target entries are page/webview and not browser internals.
pub fn is_user_page(info: &TargetInfo) -> bool {
    (info.r#type == "page" || info.r#type == "webview")
        && !info.url.starts_with("devtools://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_id_from_ws_url() {
        let id = browser_id_from_ws_url("ws://127.0.0.1:9222/devtools/browser/abc-123");
        assert_eq!(id, "abc-123");
    }

    #[test]
    fn test_page_ws_url() {
        let ep = Endpoint::new("127.0.0.1:9222").unwrap();
        assert_eq!(
            ep.page_ws_url("T1"),
            "ws://127.0.0.1:9222/devtools/page/T1"
        );
    }

    #[test]
    fn test_is_user_page() {
        let page = TargetInfo {
            target_id: "t".into(),
            r#type: "page".into(),
            title: String::new(),
            url: "https://example.com".into(),
            attached: false,
            opener_id: None,
            browser_context_id: None,
        };
        assert!(is_user_page(&page));

        let devtools = TargetInfo {
            url: "devtools://devtools/bundled/inspector.html".into(),
            ..page.clone()
        };
        assert!(!is_user_page(&devtools));

        let worker = TargetInfo {
            r#type: "service_worker".into(),
            ..page
        };
        assert!(!is_user_page(&worker));
    }
}
