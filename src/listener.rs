//! Network capture
//!
//! Per-tab (or per-frame) HTTP traffic recorder over the Network domain.
//! Off until `start()` subscribes it. Request/response halves are
//! assembled into a [`DataPacket`] and enqueued when the browser reports
//! the load finished or failed, so consumers see packets in completion
//! order rather than request-start order.

use crate::cdp::traits::Transport;
use crate::settings::Settings;
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

const BODY_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const EVENTS: &[&str] = &[
    "Network.requestWillBeSent",
    "Network.requestWillBeSentExtraInfo",
    "Network.responseReceived",
    "Network.responseReceivedExtraInfo",
    "Network.loadingFinished",
    "Network.loadingFailed",
];

/// Which URLs the listener records
#[derive(Debug, Clone, Default)]
pub enum Targets {
    /// Record every request
    #[default]
    All,
    /// URLs containing any of these substrings
    Substrings(Vec<String>),
    /// URLs matching any of these patterns
    Regexes(Vec<Regex>),
}

impl Targets {
    /// Build from raw pattern strings.
    pub fn patterns(patterns: Vec<String>, is_regex: bool) -> Result<Targets> {
        if patterns.is_empty() {
            return Ok(Targets::All);
        }
        if is_regex {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).map_err(|e| Error::configuration(e.to_string())))
                .collect::<Result<Vec<_>>>()?;
            Ok(Targets::Regexes(compiled))
        } else {
            Ok(Targets::Substrings(patterns))
        }
    }

    /// The matching pattern for a URL, if any.
    fn hit(&self, url: &str) -> Option<String> {
        match self {
            Targets::All => Some(String::new()),
            Targets::Substrings(subs) => {
                subs.iter().find(|s| url.contains(s.as_str())).cloned()
            }
            Targets::Regexes(regexes) => regexes
                .iter()
                .find(|r| r.is_match(url))
                .map(|r| r.as_str().to_string()),
        }
    }
}

/// Full matching configuration for one capture session
#[derive(Debug, Clone, Default)]
pub struct CaptureFilter {
    /// URL matcher
    pub targets: Targets,
    /// HTTP methods to keep, empty = all
    pub methods: HashSet<String>,
    /// Resource-type categories to keep, empty = all
    pub res_types: HashSet<String>,
}

impl CaptureFilter {
    fn method_ok(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.contains(&method.to_ascii_uppercase())
    }

    fn res_type_ok(&self, res_type: &str) -> bool {
        self.res_types.is_empty() || self.res_types.contains(res_type)
    }
}

/// Request half of a packet
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub url: String,
    pub method: String,
    pub headers: Value,
    pub post_data: Option<String>,
    /// Headers as observed on the wire, from requestWillBeSentExtraInfo
    pub extra_headers: Option<Value>,
}

/// Response body, decoded when the browser sent it base64-encoded
#[derive(Debug, Clone)]
pub enum Body {
    Text(String),
    Raw(Vec<u8>),
}

/// Response half of a packet
#[derive(Debug, Clone)]
pub struct ResponseInfo {
    pub status: i64,
    pub status_text: String,
    pub headers: Value,
    pub mime_type: String,
    pub body: Option<Body>,
    pub extra_headers: Option<Value>,
}

/// Why a request never completed
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub error_text: String,
    pub canceled: bool,
}

/// One captured request/response pair
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub request_id: String,
    pub tab_id: String,
    pub frame_id: Option<String>,
    /// The pattern that caught this packet, empty for match-all
    pub target: String,
    pub resource_type: String,
    pub request: RequestInfo,
    pub response: Option<ResponseInfo>,
    pub failure: Option<FailureInfo>,
}

impl DataPacket {
    /// True when the load ended in `loadingFailed`
    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

#[derive(Debug)]
struct Pending {
    packet: DataPacket,
    has_post_data: bool,
}

#[derive(Default)]
struct ListenerState {
    running: bool,
    paused: bool,
    filter: CaptureFilter,
    in_flight: HashMap<String, Pending>,
    req_extra: HashMap<String, Value>,
    res_extra: HashMap<String, Value>,
    /// Every request seen on the session, matched or not
    all_running: HashSet<String>,
    queue: VecDeque<DataPacket>,
    taps: Vec<mpsc::UnboundedSender<DataPacket>>,
}

/// Per-tab network capture
pub struct NetworkListener {
    transport: Arc<dyn Transport>,
    tab_id: String,
    /// Set for same-origin frame listeners; events from other frames on
    /// the shared session are dropped.
    frame_filter: Option<String>,
    state: Mutex<ListenerState>,
    settings: Settings,
}

impl std::fmt::Debug for NetworkListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkListener")
            .field("tab_id", &self.tab_id)
            .field("frame_filter", &self.frame_filter)
            .finish()
    }
}

impl NetworkListener {
    /// A listener for a whole tab, or for one frame when `frame_filter`
    /// names a frame id on the same session.
    pub fn new(
        transport: Arc<dyn Transport>,
        tab_id: impl Into<String>,
        frame_filter: Option<String>,
    ) -> Arc<NetworkListener> {
        Arc::new(NetworkListener {
            transport,
            tab_id: tab_id.into(),
            frame_filter,
            state: Mutex::new(ListenerState::default()),
            settings: Settings::current(),
        })
    }

    /// Begin capturing with the given filter. Restarting replaces the
    /// filter but keeps already-queued packets.
    pub async fn start(self: &Arc<Self>, filter: CaptureFilter) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.filter = filter;
            state.paused = false;
            if state.running {
                return Ok(());
            }
            state.running = true;
        }
        self.transport
            .call("Network.enable", json!({}), Duration::from_secs(10))
            .await?;

        for event in EVENTS {
            let this = Arc::downgrade(self);
            let name = event.to_string();
            self.transport
                .set_callback(
                    event,
                    crate::event_handler!(move |params: Value| {
                        let this = this.clone();
                        let name = name.clone();
                        async move {
                            if let Some(listener) = this.upgrade() {
                                listener.dispatch(&name, params).await;
                            }
                        }
                    }),
                    false,
                )
                .await;
        }
        debug!(tab = %self.tab_id, "Network listener started");
        Ok(())
    }

    /// Stop capturing and unsubscribe. Queued packets survive until
    /// `clear()`.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if !state.running {
                return Ok(());
            }
            state.running = false;
            state.in_flight.clear();
            state.req_extra.clear();
            state.res_extra.clear();
            state.all_running.clear();
            state.taps.clear();
        }
        for event in EVENTS {
            self.transport.clear_callback(event).await;
        }
        self.transport
            .call("Network.disable", json!({}), Duration::from_secs(10))
            .await?;
        Ok(())
    }

    /// Suspend capture without unsubscribing.
    pub async fn pause(&self, clear: bool) {
        let mut state = self.state.lock().await;
        state.paused = true;
        if clear {
            state.queue.clear();
            state.in_flight.clear();
        }
    }

    /// Resume a paused listener.
    pub async fn resume(&self) {
        self.state.lock().await.paused = false;
    }

    /// Drop queued packets and in-flight bookkeeping.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.queue.clear();
        state.in_flight.clear();
        state.req_extra.clear();
        state.res_extra.clear();
    }

    /// Packets waiting to be consumed
    pub async fn queued(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Take up to `count` packets, waiting until they arrive. With
    /// `fit_count`, fewer than `count` at the deadline is a failure;
    /// otherwise whatever arrived is returned.
    pub async fn wait(
        &self,
        count: usize,
        timeout: Duration,
        fit_count: bool,
        raise: Option<bool>,
    ) -> Result<Vec<DataPacket>> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.state.lock().await;
                if state.queue.len() >= count {
                    return Ok(state.queue.drain(..count).collect());
                }
                if Instant::now() >= deadline {
                    let got: Vec<_> = state.queue.drain(..).collect();
                    if !fit_count && !got.is_empty() {
                        return Ok(got);
                    }
                    return if self.settings.resolve_raise(raise) {
                        Err(Error::wait_timeout(format!(
                            "{} network packet(s) within {:?}, got {}",
                            count,
                            timeout,
                            got.len()
                        )))
                    } else {
                        Ok(got)
                    };
                }
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// A live stream of packets. Ends after `count` packets when given,
    /// or when `gap` elapses with nothing new. Already-queued packets
    /// are delivered first.
    pub async fn steps(
        self: &Arc<Self>,
        count: Option<usize>,
        gap: Duration,
    ) -> UnboundedReceiverStream<DataPacket> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (feed_tx, mut feed_rx) = mpsc::unbounded_channel::<DataPacket>();
        {
            let mut state = self.state.lock().await;
            for packet in state.queue.drain(..) {
                let _ = feed_tx.send(packet);
            }
            state.taps.push(feed_tx);
        }
        tokio::spawn(async move {
            let mut sent = 0usize;
            loop {
                if count.is_some_and(|c| sent >= c) {
                    break;
                }
                match tokio::time::timeout(gap, feed_rx.recv()).await {
                    Ok(Some(packet)) => {
                        if tx.send(packet).is_err() {
                            break;
                        }
                        sent += 1;
                    }
                    // Idle gap elapsed or the listener went away
                    Ok(None) | Err(_) => break,
                }
            }
        });
        UnboundedReceiverStream::new(rx)
    }

    /// Wait until outstanding requests drop to `limit` or fewer. With
    /// `targets_only`, only target-matched requests count.
    pub async fn wait_silent(
        &self,
        timeout: Duration,
        targets_only: bool,
        limit: usize,
    ) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            let outstanding = {
                let state = self.state.lock().await;
                if targets_only {
                    state.in_flight.len()
                } else {
                    state.all_running.len()
                }
            };
            if outstanding <= limit {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn dispatch(self: &Arc<Self>, event: &str, params: Value) {
        match event {
            "Network.requestWillBeSent" => self.on_request(params).await,
            "Network.requestWillBeSentExtraInfo" => {
                if let Some(id) = request_id(&params) {
                    self.state.lock().await.req_extra.insert(id, params);
                }
            }
            "Network.responseReceived" => self.on_response(params).await,
            "Network.responseReceivedExtraInfo" => {
                if let Some(id) = request_id(&params) {
                    self.state.lock().await.res_extra.insert(id, params);
                }
            }
            "Network.loadingFinished" => self.on_finished(params).await,
            "Network.loadingFailed" => self.on_failed(params).await,
            _ => {}
        }
    }

    fn frame_ok(&self, params: &Value) -> bool {
        match &self.frame_filter {
            Some(fid) => params.get("frameId").and_then(|v| v.as_str()) == Some(fid),
            None => true,
        }
    }

    async fn on_request(&self, params: Value) {
        let Some(id) = request_id(&params) else { return };
        let mut state = self.state.lock().await;
        if !state.running || state.paused {
            return;
        }
        state.all_running.insert(id.clone());
        if !self.frame_ok(&params) {
            return;
        }

        let request = &params["request"];
        let url = request["url"].as_str().unwrap_or_default().to_string();
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let res_type = params["type"].as_str().unwrap_or_default();
        if !state.filter.method_ok(&method) || !state.filter.res_type_ok(res_type) {
            return;
        }
        let Some(target) = state.filter.targets.hit(&url) else {
            return;
        };

        let packet = DataPacket {
            request_id: id.clone(),
            tab_id: self.tab_id.clone(),
            frame_id: params
                .get("frameId")
                .and_then(|v| v.as_str())
                .map(String::from),
            target,
            resource_type: res_type.to_string(),
            request: RequestInfo {
                url,
                method,
                headers: request.get("headers").cloned().unwrap_or(Value::Null),
                post_data: request
                    .get("postData")
                    .and_then(|v| v.as_str())
                    .map(String::from),
                extra_headers: None,
            },
            response: None,
            failure: None,
        };
        let has_post_data = request
            .get("hasPostData")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
            && packet.request.post_data.is_none();
        state.in_flight.insert(id, Pending { packet, has_post_data });
    }

    async fn on_response(&self, params: Value) {
        if !self.frame_ok(&params) {
            return;
        }
        let Some(id) = request_id(&params) else { return };
        let mut state = self.state.lock().await;
        let Some(pending) = state.in_flight.get_mut(&id) else {
            return;
        };
        let response = &params["response"];
        pending.packet.resource_type = params["type"]
            .as_str()
            .unwrap_or(&pending.packet.resource_type)
            .to_string();
        pending.packet.response = Some(ResponseInfo {
            status: response["status"].as_i64().unwrap_or(0),
            status_text: response["statusText"].as_str().unwrap_or_default().to_string(),
            headers: response.get("headers").cloned().unwrap_or(Value::Null),
            mime_type: response["mimeType"].as_str().unwrap_or_default().to_string(),
            body: None,
            extra_headers: None,
        });
    }

    async fn on_finished(self: &Arc<Self>, params: Value) {
        let Some(id) = request_id(&params) else { return };
        let pending = {
            let mut state = self.state.lock().await;
            state.all_running.remove(&id);
            state.in_flight.remove(&id)
        };
        let Some(mut pending) = pending else { return };

        if pending.has_post_data {
            if let Ok(result) = self
                .transport
                .call("Network.getRequestPostData", json!({ "requestId": id }), BODY_TIMEOUT)
                .await
            {
                pending.packet.request.post_data = result
                    .get("postData")
                    .and_then(|v| v.as_str())
                    .map(String::from);
            }
        }

        let body = match self
            .transport
            .call(
                "Network.getResponseBody",
                json!({ "requestId": id }),
                BODY_TIMEOUT,
            )
            .await
        {
            Ok(result) => {
                let text = result["body"].as_str().unwrap_or_default();
                if result["base64Encoded"].as_bool().unwrap_or(false) {
                    match BASE64.decode(text) {
                        Ok(bytes) => Some(Body::Raw(bytes)),
                        Err(e) => {
                            warn!(request_id = %id, "Bad base64 response body: {}", e);
                            None
                        }
                    }
                } else {
                    Some(Body::Text(text.to_string()))
                }
            }
            // The browser drops bodies it no longer holds
            Err(_) => None,
        };
        if let Some(response) = pending.packet.response.as_mut() {
            response.body = body;
        }

        self.enqueue(pending.packet).await;
    }

    async fn on_failed(self: &Arc<Self>, params: Value) {
        let Some(id) = request_id(&params) else { return };
        let pending = {
            let mut state = self.state.lock().await;
            state.all_running.remove(&id);
            state.in_flight.remove(&id)
        };
        let Some(mut pending) = pending else { return };
        pending.packet.failure = Some(FailureInfo {
            error_text: params["errorText"].as_str().unwrap_or_default().to_string(),
            canceled: params["canceled"].as_bool().unwrap_or(false),
        });
        self.enqueue(pending.packet).await;
    }

    async fn enqueue(&self, mut packet: DataPacket) {
        let mut state = self.state.lock().await;
        if let Some(extra) = state.req_extra.remove(&packet.request_id) {
            packet.request.extra_headers = extra.get("headers").cloned();
        }
        if let Some(extra) = state.res_extra.remove(&packet.request_id) {
            if let Some(response) = packet.response.as_mut() {
                response.extra_headers = extra.get("headers").cloned();
            }
        }
        state.taps.retain(|tap| !tap.is_closed());
        for tap in &state.taps {
            let _ = tap.send(packet.clone());
        }
        if state.taps.is_empty() {
            state.queue.push_back(packet);
        } else {
            // Streaming consumers own delivery; the queue stays empty
            // so packets are not seen twice.
        }
    }
}

fn request_id(params: &Value) -> Option<String> {
    params
        .get("requestId")
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockTransport;
    use tokio_stream::StreamExt;

    async fn started(
        mock: &Arc<MockTransport>,
        filter: CaptureFilter,
    ) -> Arc<NetworkListener> {
        let listener =
            NetworkListener::new(mock.clone() as Arc<dyn Transport>, "tab-1", None);
        listener.start(filter).await.unwrap();
        listener
    }

    fn request_event(id: &str, url: &str, method: &str) -> Value {
        json!({
            "requestId": id,
            "frameId": "F1",
            "type": "XHR",
            "request": { "url": url, "method": method, "headers": {} },
        })
    }

    fn response_event(id: &str, status: i64) -> Value {
        json!({
            "requestId": id,
            "frameId": "F1",
            "type": "XHR",
            "response": {
                "status": status, "statusText": "OK",
                "headers": { "content-type": "application/json" },
                "mimeType": "application/json",
            },
        })
    }

    #[tokio::test]
    async fn test_packet_assembled_on_finish() {
        let mock = MockTransport::new("tab-1");
        mock.expect(
            "Network.getResponseBody",
            Ok(json!({ "body": "{\"ok\":true}", "base64Encoded": false })),
        )
        .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://api/x", "GET"))
            .await;
        mock.emit("Network.responseReceived", response_event("r1", 200)).await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;

        let packets = listener
            .wait(1, Duration::from_secs(1), true, Some(true))
            .await
            .unwrap();
        assert_eq!(packets.len(), 1);
        let packet = &packets[0];
        assert_eq!(packet.request.url, "https://api/x");
        assert!(!packet.is_failed());
        let response = packet.response.as_ref().unwrap();
        assert_eq!(response.status, 200);
        assert!(matches!(&response.body, Some(Body::Text(t)) if t == "{\"ok\":true}"));
    }

    #[tokio::test]
    async fn test_post_body_fetched_lazily_on_finish() {
        let mock = MockTransport::new("tab-1");
        mock.expect(
            "Network.getRequestPostData",
            Ok(json!({ "postData": "a=1&b=2" })),
        )
        .await;
        mock.expect(
            "Network.getResponseBody",
            Ok(json!({ "body": "", "base64Encoded": false })),
        )
        .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit(
            "Network.requestWillBeSent",
            json!({
                "requestId": "r1",
                "frameId": "F1",
                "type": "XHR",
                "request": {
                    "url": "https://api/x", "method": "POST", "headers": {},
                    "hasPostData": true,
                },
            }),
        )
        .await;
        mock.emit("Network.responseReceived", response_event("r1", 200)).await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;

        let packets = listener
            .wait(1, Duration::from_secs(1), true, Some(true))
            .await
            .unwrap();
        assert_eq!(packets[0].request.post_data.as_deref(), Some("a=1&b=2"));
        // The body comes from a dedicated fetch keyed by request id
        let fetches = mock.calls_for("Network.getRequestPostData").await;
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].params["requestId"], "r1");
    }

    #[tokio::test]
    async fn test_finish_order_wins_over_start_order() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://a/1", "GET"))
            .await;
        mock.emit("Network.requestWillBeSent", request_event("r2", "https://a/2", "GET"))
            .await;
        mock.emit("Network.responseReceived", response_event("r1", 200)).await;
        mock.emit("Network.responseReceived", response_event("r2", 200)).await;
        // Second request completes first
        mock.emit("Network.loadingFinished", json!({ "requestId": "r2" })).await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;

        let packets = listener
            .wait(2, Duration::from_secs(1), true, Some(true))
            .await
            .unwrap();
        assert_eq!(packets[0].request.url, "https://a/2");
        assert_eq!(packets[1].request.url, "https://a/1");
    }

    #[tokio::test]
    async fn test_failed_request_carries_failure_info() {
        let mock = MockTransport::new("tab-1");
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://a/x", "GET"))
            .await;
        mock.emit(
            "Network.loadingFailed",
            json!({ "requestId": "r1", "errorText": "net::ERR_ABORTED", "canceled": true }),
        )
        .await;

        let packets = listener
            .wait(1, Duration::from_secs(1), true, Some(true))
            .await
            .unwrap();
        assert!(packets[0].is_failed());
        let failure = packets[0].failure.as_ref().unwrap();
        assert_eq!(failure.error_text, "net::ERR_ABORTED");
        assert!(failure.canceled);
    }

    #[tokio::test]
    async fn test_target_and_method_filtering() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let filter = CaptureFilter {
            targets: Targets::patterns(vec!["/api/".to_string()], false).unwrap(),
            methods: HashSet::from(["POST".to_string()]),
            res_types: HashSet::new(),
        };
        let listener = started(&mock, filter).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/api/a", "GET"))
            .await;
        mock.emit("Network.requestWillBeSent", request_event("r2", "https://x/other", "POST"))
            .await;
        mock.emit("Network.requestWillBeSent", request_event("r3", "https://x/api/b", "POST"))
            .await;
        for id in ["r1", "r2", "r3"] {
            mock.emit("Network.loadingFinished", json!({ "requestId": id })).await;
        }

        let packets = listener
            .wait(1, Duration::from_secs(1), false, Some(false))
            .await
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].request.url, "https://x/api/b");
        assert_eq!(packets[0].target, "/api/");
    }

    #[tokio::test]
    async fn test_base64_body_decoded_to_bytes() {
        let mock = MockTransport::new("tab-1");
        mock.expect(
            "Network.getResponseBody",
            Ok(json!({ "body": BASE64.encode(b"\x89PNG"), "base64Encoded": true })),
        )
        .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/i.png", "GET"))
            .await;
        mock.emit("Network.responseReceived", response_event("r1", 200)).await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;

        let packets = listener
            .wait(1, Duration::from_secs(1), true, Some(true))
            .await
            .unwrap();
        let body = packets[0].response.as_ref().unwrap().body.as_ref().unwrap();
        assert!(matches!(body, Body::Raw(b) if b == b"\x89PNG"));
    }

    #[tokio::test]
    async fn test_frame_filter_drops_foreign_frames() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let listener = NetworkListener::new(
            mock.clone() as Arc<dyn Transport>,
            "tab-1",
            Some("F1".to_string()),
        );
        listener.start(CaptureFilter::default()).await.unwrap();

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/in", "GET"))
            .await;
        let mut foreign = request_event("r2", "https://x/out", "GET");
        foreign["frameId"] = json!("F2");
        mock.emit("Network.requestWillBeSent", foreign).await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r2" })).await;

        let packets = listener
            .wait(1, Duration::from_secs(1), false, Some(false))
            .await
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].request.url, "https://x/in");
    }

    #[tokio::test]
    async fn test_extra_info_merged_into_packet() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/a", "GET"))
            .await;
        mock.emit(
            "Network.requestWillBeSentExtraInfo",
            json!({ "requestId": "r1", "headers": { "cookie": "sid=1" } }),
        )
        .await;
        mock.emit("Network.responseReceived", response_event("r1", 200)).await;
        mock.emit(
            "Network.responseReceivedExtraInfo",
            json!({ "requestId": "r1", "headers": { "set-cookie": "sid=2" } }),
        )
        .await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;

        let packets = listener
            .wait(1, Duration::from_secs(1), true, Some(true))
            .await
            .unwrap();
        let packet = &packets[0];
        assert_eq!(packet.request.extra_headers.as_ref().unwrap()["cookie"], json!("sid=1"));
        let response = packet.response.as_ref().unwrap();
        assert_eq!(response.extra_headers.as_ref().unwrap()["set-cookie"], json!("sid=2"));
    }

    #[tokio::test]
    async fn test_pause_discards_and_resume_captures() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        listener.pause(false).await;
        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/a", "GET"))
            .await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;
        assert_eq!(listener.queued().await, 0);

        listener.resume().await;
        mock.emit("Network.requestWillBeSent", request_event("r2", "https://x/b", "GET"))
            .await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r2" })).await;
        assert_eq!(listener.queued().await, 1);
    }

    #[tokio::test]
    async fn test_steps_streams_then_ends_on_idle_gap() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/a", "GET"))
            .await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;

        let mut stream = listener.steps(None, Duration::from_millis(200)).await;
        let first = stream.next().await.unwrap();
        assert_eq!(first.request.url, "https://x/a");

        mock.emit("Network.requestWillBeSent", request_event("r2", "https://x/b", "GET"))
            .await;
        mock.emit("Network.loadingFinished", json!({ "requestId": "r2" })).await;
        let second = stream.next().await.unwrap();
        assert_eq!(second.request.url, "https://x/b");

        // Nothing else arrives; the idle gap closes the stream
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_wait_silent() {
        let mock = MockTransport::new("tab-1");
        mock.expect("Network.getResponseBody", Ok(json!({ "body": "", "base64Encoded": false })))
            .await;
        let listener = started(&mock, CaptureFilter::default()).await;

        mock.emit("Network.requestWillBeSent", request_event("r1", "https://x/a", "GET"))
            .await;
        assert!(!listener.wait_silent(Duration::from_millis(150), false, 0).await.unwrap());

        mock.emit("Network.loadingFinished", json!({ "requestId": "r1" })).await;
        assert!(listener.wait_silent(Duration::from_millis(150), false, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_unsubscribes_and_disables() {
        let mock = MockTransport::new("tab-1");
        let listener = started(&mock, CaptureFilter::default()).await;
        assert!(mock.has_callback("Network.requestWillBeSent").await);

        listener.stop().await.unwrap();
        assert!(!mock.has_callback("Network.requestWillBeSent").await);
        assert_eq!(mock.calls_for("Network.disable").await.len(), 1);
    }
}
