//! Tab control
//!
//! One `Tab` per CDP page target. Navigation is tracked by a page
//! lifecycle state machine driven entirely by Page events; `get()` waits
//! for the state the tab's load mode asks for. Dialog events ride the
//! transport's immediate queue so they are answered even while normal
//! handlers are busy.

use crate::cdp::traits::Transport;
use crate::cdp::types::{GetDocumentResponse, Node};
use crate::config::{LoadMode, Timeouts};
use crate::cookies::{normalize_cookies, Cookie};
use crate::element::{node_text, Element, PageCtx};
use crate::frame::{Frame, TransportFactory};
use crate::locator::{self, Locator};
use crate::settings::{AutoAlertMode, Settings};
use crate::storage::{self, StorageKind};
use crate::{waiter, Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Where the page is in its current navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentState {
    /// frameStartedLoading seen, nothing else yet
    Connecting,
    /// Main frame navigated
    Loading,
    /// DOMContentLoaded fired
    Interactive,
    /// Load finished (or frame stopped loading)
    Complete,
}

/// Record of the page's current/most recent JavaScript dialog
#[derive(Debug, Clone, Default)]
pub struct Alert {
    /// A dialog is open right now
    pub activated: bool,
    /// Message text
    pub text: String,
    /// "alert", "confirm", "prompt" or "beforeunload"
    pub dialog_type: String,
    /// Default prompt text
    pub default_prompt: String,
    /// Text sent with the last answer
    pub last_response: Option<String>,
}

#[derive(Debug, Default)]
struct AlertState {
    record: Alert,
    /// One-shot directive for the next dialog: (accept, prompt text)
    next_one: Option<(bool, Option<String>)>,
    /// Tab-scoped auto mode, overrides the process default
    auto: Option<AutoAlertMode>,
}

#[derive(Debug)]
struct Lifecycle {
    state: std::sync::Mutex<DocumentState>,
    /// One DOM.getDocument per navigation
    doc_fetched: AtomicBool,
    main_frame_id: std::sync::Mutex<String>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(DocumentState::Complete),
            doc_fetched: AtomicBool::new(false),
            main_frame_id: std::sync::Mutex::new(String::new()),
        }
    }

    fn state(&self) -> DocumentState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: DocumentState) {
        *self.state.lock().unwrap() = state;
    }

    fn is_main_frame(&self, frame_id: &str) -> bool {
        let main = self.main_frame_id.lock().unwrap();
        main.is_empty() || *main == frame_id
    }
}

/// A single controlled page target
pub struct Tab {
    tab_id: String,
    transport: RwLock<Arc<dyn Transport>>,
    factory: TransportFactory,
    timeouts: Timeouts,
    load_mode: LoadMode,
    settings: Settings,
    lifecycle: Arc<Lifecycle>,
    alert: Arc<Mutex<AlertState>>,
    root_backend_id: Arc<AtomicI64>,
    init_script_ids: Mutex<Vec<String>>,
    pending_upload: Arc<Mutex<Option<Vec<String>>>>,
    frames: Mutex<HashMap<String, Arc<Frame>>>,
}

impl std::fmt::Debug for Tab {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tab").field("tab_id", &self.tab_id).finish()
    }
}

impl Tab {
    /// Wrap a connected page transport. Enables the Page/DOM domains,
    /// fetches the initial document and wires up the lifecycle handlers.
    pub async fn attach(
        transport: Arc<dyn Transport>,
        factory: TransportFactory,
        timeouts: Timeouts,
        load_mode: LoadMode,
        settings: Settings,
    ) -> Result<Arc<Tab>> {
        let tab = Arc::new(Tab {
            tab_id: transport.target_id().to_string(),
            transport: RwLock::new(transport),
            factory,
            timeouts,
            load_mode,
            settings,
            lifecycle: Arc::new(Lifecycle::new()),
            alert: Arc::new(Mutex::new(AlertState::default())),
            root_backend_id: Arc::new(AtomicI64::new(0)),
            init_script_ids: Mutex::new(Vec::new()),
            pending_upload: Arc::new(Mutex::new(None)),
            frames: Mutex::new(HashMap::new()),
        });
        tab.enable_domains().await?;
        tab.subscribe_lifecycle().await;
        tab.subscribe_alerts().await;
        tab.subscribe_file_chooser().await;
        tab.fetch_document().await?;
        info!(tab_id = %tab.tab_id, "Tab attached");
        Ok(tab)
    }

    /// Target id of the page
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    /// Current transport (swapped on reconnect)
    pub async fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&*self.transport.read().await)
    }

    /// Context for element operations on this tab
    pub async fn ctx(&self) -> PageCtx {
        PageCtx {
            transport: self.transport().await,
            timeouts: self.timeouts.clone(),
            settings: self.settings.clone(),
        }
    }

    /// Tab-scoped timeouts
    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let transport = self.transport().await;
        transport
            .call(method, params, self.timeouts.base_duration())
            .await
    }

    async fn enable_domains(&self) -> Result<()> {
        self.call("Page.enable", json!({})).await?;
        self.call("DOM.enable", json!({})).await?;
        self.call("Runtime.enable", json!({})).await?;
        Ok(())
    }

    // ---- lifecycle -------------------------------------------------------

    async fn subscribe_lifecycle(self: &Arc<Self>) {
        let transport = self.transport().await;
        let lifecycle = Arc::clone(&self.lifecycle);
        transport
            .set_callback(
                "Page.frameStartedLoading",
                crate::event_handler!(move |params: Value| {
                    let lifecycle = Arc::clone(&lifecycle);
                    async move {
                        let frame_id = params
                            .get("frameId")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default();
                        if lifecycle.is_main_frame(frame_id) {
                            debug!(frame_id, "Navigation starting");
                            lifecycle.set_state(DocumentState::Connecting);
                            lifecycle.doc_fetched.store(false, Ordering::SeqCst);
                        }
                    }
                }),
                false,
            )
            .await;

        let lifecycle = Arc::clone(&self.lifecycle);
        transport
            .set_callback(
                "Page.frameNavigated",
                crate::event_handler!(move |params: Value| {
                    let lifecycle = Arc::clone(&lifecycle);
                    async move {
                        let frame = params.get("frame").cloned().unwrap_or_default();
                        let is_main = frame.get("parentId").is_none();
                        if is_main {
                            if let Some(id) = frame.get("id").and_then(|v| v.as_str()) {
                                *lifecycle.main_frame_id.lock().unwrap() = id.to_string();
                            }
                            lifecycle.set_state(DocumentState::Loading);
                        }
                    }
                }),
                false,
            )
            .await;

        let this = Arc::downgrade(self);
        transport
            .set_callback(
                "Page.domContentEventFired",
                crate::event_handler!(move |_params: Value| {
                    let this = this.clone();
                    async move {
                        if let Some(tab) = this.upgrade() {
                            tab.lifecycle.set_state(DocumentState::Interactive);
                            let _ = tab.fetch_document().await;
                            if tab.load_mode == LoadMode::Eager {
                                let _ = tab.stop_loading().await;
                            }
                        }
                    }
                }),
                false,
            )
            .await;

        for event in ["Page.loadEventFired", "Page.frameStoppedLoading"] {
            let this = Arc::downgrade(self);
            transport
                .set_callback(
                    event,
                    crate::event_handler!(move |params: Value| {
                        let this = this.clone();
                        async move {
                            let tab = match this.upgrade() {
                                Some(tab) => tab,
                                None => return,
                            };
                            if let Some(frame_id) = params.get("frameId").and_then(|v| v.as_str()) {
                                if !tab.lifecycle.is_main_frame(frame_id) {
                                    return;
                                }
                            }
                            // Document is re-fetched before the state flips
                            // to Complete, so waiters see a usable DOM.
                            let _ = tab.fetch_document().await;
                            tab.lifecycle.set_state(DocumentState::Complete);
                        }
                    }),
                    false,
                )
                .await;
        }
    }

    /// One `DOM.getDocument` per navigation; later calls in the same
    /// navigation are no-ops.
    async fn fetch_document(&self) -> Result<()> {
        if self.lifecycle.doc_fetched.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.call("DOM.getDocument", json!({ "depth": 0 })).await?;
        let doc: GetDocumentResponse = serde_json::from_value(result)?;
        self.root_backend_id
            .store(doc.root.backend_node_id, Ordering::SeqCst);
        debug!(backend_id = doc.root.backend_node_id, "Document acquired");
        Ok(())
    }

    /// Current lifecycle state
    pub fn document_state(&self) -> DocumentState {
        self.lifecycle.state()
    }

    fn is_ready(&self, state: DocumentState) -> bool {
        match self.load_mode {
            LoadMode::Normal => state == DocumentState::Complete,
            LoadMode::Eager => {
                matches!(state, DocumentState::Interactive | DocumentState::Complete)
            }
            LoadMode::None => true,
        }
    }

    /// Wait until the lifecycle reaches the load mode's target state.
    pub async fn wait_loaded(&self, timeout: Option<Duration>) -> Result<bool> {
        let timeout = timeout.unwrap_or_else(|| self.timeouts.page_load_duration());
        waiter::wait_for(
            || async move { self.is_ready(self.document_state()) },
            timeout,
            Duration::from_millis(20),
            false,
            "page load",
        )
        .await
    }

    // ---- navigation ------------------------------------------------------

    /// Navigate to a URL. Retries `retry` times at `interval`, each
    /// attempt bounded by the page-load timeout.
    pub async fn get(
        &self,
        url: &str,
        retry: u32,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> Result<bool> {
        let timeout = timeout.unwrap_or_else(|| self.timeouts.page_load_duration());
        let mut last_err: Option<Error> = None;

        for attempt in 0..=retry {
            if attempt > 0 {
                warn!(url, attempt, "Retrying navigation");
                tokio::time::sleep(interval).await;
            }
            match self.navigate_once(url, timeout).await {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    last_err = Some(Error::timeout(format!("page load of {}", url)));
                }
                Err(e @ Error::IncorrectUrl(_)) => return Err(e),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::timeout(format!("page load of {}", url))))
    }

    async fn navigate_once(&self, url: &str, timeout: Duration) -> Result<bool> {
        self.lifecycle.set_state(DocumentState::Connecting);
        self.lifecycle.doc_fetched.store(false, Ordering::SeqCst);
        let transport = self.transport().await;
        let result = transport
            .call("Page.navigate", json!({ "url": url }), timeout)
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() && error_text != "net::ERR_ABORTED" {
                return Err(Error::browser_connect(format!(
                    "navigation to {} failed: {}",
                    url, error_text
                )));
            }
        }
        if self.load_mode == LoadMode::None {
            return Ok(true);
        }
        self.wait_loaded(Some(timeout)).await
    }

    /// Reload the page.
    pub async fn refresh(&self, ignore_cache: bool) -> Result<bool> {
        self.lifecycle.set_state(DocumentState::Connecting);
        self.lifecycle.doc_fetched.store(false, Ordering::SeqCst);
        self.call("Page.reload", json!({ "ignoreCache": ignore_cache }))
            .await?;
        self.wait_loaded(None).await
    }

    /// Go `n` entries forward in this tab's history.
    pub async fn forward(&self, n: i64) -> Result<()> {
        self.history_go(n.max(1)).await
    }

    /// Go `n` entries back.
    pub async fn back(&self, n: i64) -> Result<()> {
        self.history_go(-n.max(1)).await
    }

    async fn history_go(&self, delta: i64) -> Result<()> {
        let history = self.call("Page.getNavigationHistory", json!({})).await?;
        let current = history
            .get("currentIndex")
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        let entries = history
            .get("entries")
            .and_then(|v| v.as_array())
            .map(|a| a.len() as i64)
            .unwrap_or(0);
        let target = (current + delta).clamp(0, (entries - 1).max(0));
        let entry_id = history
            .pointer(&format!("/entries/{}/id", target))
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::internal("navigation history entry missing"))?;
        self.call("Page.navigateToHistoryEntry", json!({ "entryId": entry_id }))
            .await?;
        Ok(())
    }

    /// Stop loading the page.
    pub async fn stop_loading(&self) -> Result<()> {
        self.call("Page.stopLoading", json!({})).await?;
        Ok(())
    }

    /// Bring the tab to the front.
    pub async fn activate(&self) -> Result<()> {
        self.call("Page.bringToFront", json!({})).await?;
        Ok(())
    }

    /// Bounds of the window hosting this tab, as
    /// `{left, top, width, height, windowState}`.
    pub async fn window_bounds(&self) -> Result<Value> {
        let result = self.call("Browser.getWindowForTarget", json!({})).await?;
        Ok(result["bounds"].clone())
    }

    /// Move or resize the hosting window; `None` fields keep their value.
    pub async fn set_window_bounds(
        &self,
        left: Option<i64>,
        top: Option<i64>,
        width: Option<i64>,
        height: Option<i64>,
    ) -> Result<()> {
        let window = self.call("Browser.getWindowForTarget", json!({})).await?;
        let window_id = window["windowId"].clone();
        let mut bounds = json!({ "windowState": "normal" });
        for (key, value) in [("left", left), ("top", top), ("width", width), ("height", height)] {
            if let Some(v) = value {
                bounds[key] = json!(v);
            }
        }
        self.call(
            "Browser.setWindowBounds",
            json!({ "windowId": window_id, "bounds": bounds }),
        )
        .await?;
        Ok(())
    }

    /// Put the hosting window into `normal`, `minimized`, `maximized` or
    /// `fullscreen` state.
    pub async fn set_window_state(&self, state: &str) -> Result<()> {
        let window = self.call("Browser.getWindowForTarget", json!({})).await?;
        self.call(
            "Browser.setWindowBounds",
            json!({
                "windowId": window["windowId"],
                "bounds": { "windowState": state },
            }),
        )
        .await?;
        Ok(())
    }

    // ---- document accessors ----------------------------------------------

    /// The document element of the page.
    pub async fn root(&self) -> Result<Element> {
        self.fetch_document().await?;
        let backend_id = self.root_backend_id.load(Ordering::SeqCst);
        if backend_id == 0 {
            return Err(Error::internal("document not acquired yet"));
        }
        Ok(Element::from_backend_id(self.ctx().await, backend_id))
    }

    /// Full page HTML
    pub async fn html(&self) -> Result<String> {
        self.root().await?.html().await
    }

    /// Document title
    pub async fn title(&self) -> Result<String> {
        let value = self.run_js("document.title", &[], true, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Current URL
    pub async fn url(&self) -> Result<String> {
        let value = self.run_js("document.URL", &[], true, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Browser user agent as the page sees it
    pub async fn user_agent(&self) -> Result<String> {
        let value = self.run_js("navigator.userAgent", &[], true, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// document.readyState
    pub async fn ready_state(&self) -> Result<String> {
        let value = self.run_js("document.readyState", &[], true, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    // ---- element lookup --------------------------------------------------

    /// Find the first element matching a locator.
    pub async fn ele(&self, locator: &str, timeout: Option<Duration>) -> Result<Element> {
        self.nth_ele(locator, 1, timeout).await
    }

    /// Find the nth element (1-based; negative counts from the end).
    pub async fn nth_ele(
        &self,
        locator: &str,
        index: i64,
        timeout: Option<Duration>,
    ) -> Result<Element> {
        let timeout = timeout.unwrap_or_else(|| self.timeouts.base_duration());
        let selector = Locator::parse(locator)?.to_selector();
        let transport = self.transport().await;
        let hits =
            locator::search_in_page(&transport, &selector, Some(index), true, timeout).await?;
        match hits.node_ids.first() {
            Some(&node_id) => Element::from_node_id(self.ctx().await, node_id).await,
            None => Err(Error::element_not_found(locator)),
        }
    }

    /// Find all matching elements.
    pub async fn eles(&self, locator: &str, timeout: Option<Duration>) -> Result<Vec<Element>> {
        let timeout = timeout.unwrap_or_else(|| self.timeouts.base_duration());
        let selector = Locator::parse(locator)?.to_selector();
        let transport = self.transport().await;
        let hits = locator::search_in_page(&transport, &selector, None, true, timeout).await?;
        let ctx = self.ctx().await;
        let mut out = Vec::with_capacity(hits.node_ids.len());
        for node_id in hits.node_ids {
            out.push(Element::from_node_id(ctx.clone(), node_id).await?);
        }
        Ok(out)
    }

    /// Static snapshot of the first matching element's subtree. Reads on
    /// the snapshot cost nothing and cannot go stale.
    pub async fn s_ele(&self, locator: &str, timeout: Option<Duration>) -> Result<Node> {
        let element = self.ele(locator, timeout).await?;
        element.describe(-1).await
    }

    /// Visible text of a static snapshot
    pub fn snapshot_text(node: &Node) -> String {
        node_text(node)
    }

    /// Insert a new element built from HTML. `insert_to` picks the parent
    /// (document body when absent); with `before` the new node lands
    /// before that element instead of being appended.
    pub async fn add_ele(
        &self,
        html: &str,
        insert_to: Option<&Element>,
        before: Option<&Element>,
    ) -> Result<Element> {
        // Anchor on the reference element when inserting before it,
        // otherwise on the chosen (or default) parent.
        let (anchor, script) = match before {
            Some(b) => (
                b.clone(),
                "const tpl = document.createElement('template');\
                 tpl.innerHTML = arguments[0];\
                 const el = tpl.content.firstElementChild;\
                 this.parentNode.insertBefore(el, this);\
                 return el;",
            ),
            None => {
                let parent = match insert_to {
                    Some(e) => e.clone(),
                    None => self.root().await?,
                };
                (
                    parent,
                    "const tpl = document.createElement('template');\
                     tpl.innerHTML = arguments[0];\
                     const el = tpl.content.firstElementChild;\
                     const host = this.nodeType === 9 ? this.body : (this.tagName === 'HTML' ? document.body : this);\
                     host.appendChild(el);\
                     return el;",
                )
            }
        };
        let result = anchor
            .call_function_for_objects(&format!("function(){{{}}}", script), &[json!(html)])
            .await?;
        let object_id = result
            .get("objectId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::javascript("add_ele produced no element"))?;
        Element::from_object_id(self.ctx().await, object_id.to_string()).await
    }

    /// Remove an element from the document.
    pub async fn remove_ele(&self, element: &Element) -> Result<()> {
        element.run_js("this.remove();", &[], false, None).await?;
        Ok(())
    }

    // ---- JavaScript ------------------------------------------------------

    /// Evaluate JavaScript in the page. Without args this is a plain
    /// `Runtime.evaluate`; with args it runs as a function on the
    /// document element so `arguments[..]` is populated.
    pub async fn run_js(
        &self,
        script: &str,
        args: &[Value],
        as_expr: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !args.is_empty() {
            let root = self.root().await?;
            let body = if as_expr { format!("return ({});", script) } else { script.to_string() };
            return root.run_js(&body, args, false, timeout).await;
        }
        self.evaluate(script, as_expr, false, timeout).await
    }

    /// Like [`Tab::run_js`] but awaits a returned promise.
    pub async fn run_async_js(
        &self,
        script: &str,
        args: &[Value],
        as_expr: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        if !args.is_empty() {
            let root = self.root().await?;
            let body = if as_expr { format!("return ({});", script) } else { script.to_string() };
            return root.run_async_js(&body, args, false, timeout).await;
        }
        self.evaluate(script, as_expr, true, timeout).await
    }

    async fn evaluate(
        &self,
        script: &str,
        as_expr: bool,
        await_promise: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let expression = if as_expr {
            script.to_string()
        } else {
            format!("(function(){{{}}})()", script)
        };
        let timeout = timeout.unwrap_or_else(|| self.timeouts.script_duration());
        let transport = self.transport().await;
        let result = transport
            .call(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": await_promise,
                    "userGesture": true,
                }),
                timeout,
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .and_then(|d| d.as_str())
                .or_else(|| details.get("text").and_then(|t| t.as_str()))
                .unwrap_or("JavaScript exception");
            return Err(Error::javascript(text.to_string()));
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    // ---- screenshots -----------------------------------------------------

    /// Screenshot of the viewport or the whole page. PNG by default;
    /// JPEG gets quality 100. Full-page capture reaches beyond the
    /// viewport.
    pub async fn get_screenshot(&self, full_page: bool, jpeg: bool) -> Result<Vec<u8>> {
        let mut params = json!({
            "format": if jpeg { "jpeg" } else { "png" },
            "captureBeyondViewport": full_page,
        });
        if jpeg {
            params["quality"] = json!(100);
        }
        if full_page {
            let metrics = self.call("Page.getLayoutMetrics", json!({})).await?;
            if let Some(size) = metrics.get("cssContentSize") {
                params["clip"] = json!({
                    "x": 0, "y": 0,
                    "width": size.get("width").cloned().unwrap_or(json!(0)),
                    "height": size.get("height").cloned().unwrap_or(json!(0)),
                    "scale": 1,
                });
            }
        }
        let result = self.call("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::no_resource("no data in screenshot result"))?;
        BASE64
            .decode(data)
            .map_err(|e| Error::no_resource(format!("bad screenshot payload: {}", e)))
    }

    // ---- dialogs ---------------------------------------------------------

    async fn subscribe_alerts(self: &Arc<Self>) {
        let transport = self.transport().await;
        let alert = Arc::clone(&self.alert);
        let settings = self.settings.clone();
        let transport_for_handler = Arc::clone(&transport);
        transport
            .set_callback(
                "Page.javascriptDialogOpening",
                crate::event_handler!(move |params: Value| {
                    let alert = Arc::clone(&alert);
                    let settings = settings.clone();
                    let transport = Arc::clone(&transport_for_handler);
                    async move {
                        let mut state = alert.lock().await;
                        state.record = Alert {
                            activated: true,
                            text: params
                                .get("message")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            dialog_type: params
                                .get("type")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            default_prompt: params
                                .get("defaultPrompt")
                                .and_then(|v| v.as_str())
                                .unwrap_or_default()
                                .to_string(),
                            last_response: None,
                        };
                        info!(dialog = %state.record.dialog_type, "JavaScript dialog opened");

                        // tab auto mode, then process default, then one-shot
                        let directive = match state.auto.or(Some(settings.auto_handle_alert)) {
                            Some(AutoAlertMode::Accept) => Some((true, None)),
                            Some(AutoAlertMode::Dismiss) => Some((false, None)),
                            Some(AutoAlertMode::Close) => None,
                            Some(AutoAlertMode::Off) | None => state.next_one.take(),
                        };
                        if let Some((accept, text)) = directive {
                            let mut params = json!({ "accept": accept });
                            if let Some(text) = &text {
                                params["promptText"] = json!(text);
                            }
                            state.record.activated = false;
                            state.record.last_response = text;
                            drop(state);
                            let _ = transport
                                .call("Page.handleJavaScriptDialog", params, Duration::ZERO)
                                .await;
                        }
                    }
                }),
                true,
            )
            .await;

        let alert = Arc::clone(&self.alert);
        transport
            .set_callback(
                "Page.javascriptDialogClosed",
                crate::event_handler!(move |_params: Value| {
                    let alert = Arc::clone(&alert);
                    async move {
                        alert.lock().await.record.activated = false;
                    }
                }),
                true,
            )
            .await;
    }

    /// Snapshot of the dialog record
    pub async fn alert(&self) -> Alert {
        self.alert.lock().await.record.clone()
    }

    /// Set this tab's automatic dialog policy. `None` restores the
    /// process default.
    pub async fn set_auto_alert(&self, mode: Option<AutoAlertMode>) {
        self.alert.lock().await.auto = mode;
    }

    /// Answer a dialog. With `next_one` the answer is queued for the next
    /// dialog and `Ok(None)` returns at once. Otherwise waits up to
    /// `timeout` for an active dialog, answers it, and returns its text.
    pub async fn handle_alert(
        &self,
        accept: bool,
        send_text: Option<&str>,
        timeout: Option<Duration>,
        next_one: bool,
    ) -> Result<Option<String>> {
        if next_one {
            self.alert.lock().await.next_one = Some((accept, send_text.map(String::from)));
            return Ok(None);
        }
        let timeout = timeout.unwrap_or_else(|| self.timeouts.base_duration());
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut state = self.alert.lock().await;
                if state.record.activated {
                    let mut params = json!({ "accept": accept });
                    if let Some(text) = send_text {
                        params["promptText"] = json!(text);
                    }
                    let text = state.record.text.clone();
                    state.record.activated = false;
                    state.record.last_response = send_text.map(String::from);
                    drop(state);
                    let transport = self.transport().await;
                    transport
                        .call("Page.handleJavaScriptDialog", params, Duration::ZERO)
                        .await?;
                    return Ok(Some(text));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    // ---- init scripts ----------------------------------------------------

    /// Register JS to run in every new document. Returns the script id.
    pub async fn add_init_js(&self, source: &str) -> Result<String> {
        let result = self
            .call(
                "Page.addScriptToEvaluateOnNewDocument",
                json!({ "source": source }),
            )
            .await?;
        let id = result
            .get("identifier")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::internal("no identifier for init script"))?
            .to_string();
        self.init_script_ids.lock().await.push(id.clone());
        Ok(id)
    }

    /// Remove one init script, or every one this tab registered.
    pub async fn remove_init_js(&self, id: Option<&str>) -> Result<()> {
        let mut ids = self.init_script_ids.lock().await;
        let to_remove: Vec<String> = match id {
            Some(id) => {
                ids.retain(|i| i != id);
                vec![id.to_string()]
            }
            None => ids.drain(..).collect(),
        };
        drop(ids);
        for id in to_remove {
            self.call(
                "Page.removeScriptToEvaluateOnNewDocument",
                json!({ "identifier": id }),
            )
            .await?;
        }
        Ok(())
    }

    // ---- uploads ---------------------------------------------------------

    async fn subscribe_file_chooser(self: &Arc<Self>) {
        let transport = self.transport().await;
        let pending = Arc::clone(&self.pending_upload);
        let transport_for_handler = Arc::clone(&transport);
        transport
            .set_callback(
                "Page.fileChooserOpened",
                crate::event_handler!(move |params: Value| {
                    let pending = Arc::clone(&pending);
                    let transport = Arc::clone(&transport_for_handler);
                    async move {
                        let files = match pending.lock().await.take() {
                            Some(files) => files,
                            None => return,
                        };
                        let backend_id = params.get("backendNodeId").cloned().unwrap_or(json!(0));
                        info!(count = files.len(), "File chooser intercepted");
                        let _ = transport
                            .call(
                                "DOM.setFileInputFiles",
                                json!({ "files": files, "backendNodeId": backend_id }),
                                Duration::from_secs(10),
                            )
                            .await;
                        let _ = transport
                            .call(
                                "Page.setInterceptFileChooserDialog",
                                json!({ "enabled": false }),
                                Duration::ZERO,
                            )
                            .await;
                    }
                }),
                false,
            )
            .await;
    }

    /// Arm interception of the next file chooser with these paths.
    pub async fn upload_files(&self, paths: Vec<String>) -> Result<()> {
        *self.pending_upload.lock().await = Some(paths);
        self.call("Page.setInterceptFileChooserDialog", json!({ "enabled": true }))
            .await?;
        Ok(())
    }

    /// Paths are still pending until the chooser fires.
    pub async fn upload_pending(&self) -> bool {
        self.pending_upload.lock().await.is_some()
    }

    // ---- storage & cookies -----------------------------------------------

    /// Session storage: one key or the whole store.
    pub async fn session_storage(&self, key: Option<&str>) -> Result<Value> {
        let transport = self.transport().await;
        storage::get_item(&transport, StorageKind::Session, key).await
    }

    /// Local storage: one key or the whole store.
    pub async fn local_storage(&self, key: Option<&str>) -> Result<Value> {
        let transport = self.transport().await;
        storage::get_item(&transport, StorageKind::Local, key).await
    }

    /// Write (or with `None` remove) a storage item.
    pub async fn set_storage(
        &self,
        kind: StorageKind,
        key: &str,
        value: Option<&str>,
    ) -> Result<()> {
        let transport = self.transport().await;
        storage::set_item(&transport, kind, key, value).await
    }

    /// Cookies visible to this tab
    pub async fn cookies(&self) -> Result<Vec<Cookie>> {
        let result = self.call("Network.getCookies", json!({})).await?;
        let cookies = result.get("cookies").cloned().unwrap_or(json!([]));
        Ok(serde_json::from_value(cookies)?)
    }

    /// Set cookies on this tab. Accepts header strings, maps or arrays;
    /// missing domains are inferred from the tab URL; name-prefix rules
    /// are enforced.
    pub async fn set_cookies(&self, input: &Value) -> Result<()> {
        let url = self.url().await.unwrap_or_default();
        let mut cookies = normalize_cookies(input)?;
        for cookie in &mut cookies {
            cookie.infer_domain(&url);
            cookie.validate_prefix()?;
        }
        self.call("Network.setCookies", json!({ "cookies": cookies }))
            .await?;
        Ok(())
    }

    /// Drop selected page state.
    pub async fn clear_cache(
        &self,
        session_storage: bool,
        local_storage: bool,
        http_cache: bool,
        cookies: bool,
    ) -> Result<()> {
        if session_storage {
            self.run_js("sessionStorage.clear();", &[], false, None).await?;
        }
        if local_storage {
            self.run_js("localStorage.clear();", &[], false, None).await?;
        }
        if http_cache {
            self.call("Network.clearBrowserCache", json!({})).await?;
        }
        if cookies {
            self.call("Network.clearBrowserCookies", json!({})).await?;
        }
        Ok(())
    }

    // ---- frames ----------------------------------------------------------

    /// Frame hosted by the element a locator finds.
    pub async fn get_frame(&self, locator: &str) -> Result<Arc<Frame>> {
        let host = self.ele(locator, None).await?;
        let tag = host.tag().await?;
        if tag != "iframe" && tag != "frame" {
            return Err(Error::locator(format!(
                "{} matched a <{}>, not an iframe/frame",
                locator, tag
            )));
        }
        let key = host.backend_id().to_string();
        if let Some(frame) = self.frames.lock().await.get(&key) {
            return Ok(Arc::clone(frame));
        }
        let frame = Frame::attach(self.ctx().await, host, Arc::clone(&self.factory)).await?;
        self.frames.lock().await.insert(key, Arc::clone(&frame));
        Ok(frame)
    }

    /// All frames on the page, optionally filtered by a locator.
    pub async fn get_frames(&self, locator: Option<&str>) -> Result<Vec<Arc<Frame>>> {
        let hosts = self
            .eles(locator.unwrap_or("c:iframe, frame"), None)
            .await?;
        let mut frames = Vec::with_capacity(hosts.len());
        for host in hosts {
            let key = host.backend_id().to_string();
            let cached = self.frames.lock().await.get(&key).cloned();
            let frame = match cached {
                Some(frame) => frame,
                None => {
                    let frame =
                        Frame::attach(self.ctx().await, host, Arc::clone(&self.factory)).await?;
                    self.frames
                        .lock()
                        .await
                        .insert(key, Arc::clone(&frame));
                    frame
                }
            };
            frames.push(frame);
        }
        Ok(frames)
    }

    // ---- connection ------------------------------------------------------

    /// Detach from the target without closing it.
    pub async fn disconnect(&self) {
        let transport = self.transport().await;
        transport.set_reconnecting(true);
        transport.stop().await;
        info!(tab_id = %self.tab_id, "Tab disconnected");
    }

    /// Re-attach to the same target with a fresh transport and re-wire
    /// every subscription.
    pub async fn reconnect(self: &Arc<Self>) -> Result<()> {
        self.disconnect().await;
        let fresh = (self.factory)(self.tab_id.clone()).await?;
        *self.transport.write().await = fresh;
        self.enable_domains().await?;
        self.subscribe_lifecycle().await;
        self.subscribe_alerts().await;
        self.subscribe_file_chooser().await;
        self.lifecycle.doc_fetched.store(false, Ordering::SeqCst);
        self.fetch_document().await?;
        info!(tab_id = %self.tab_id, "Tab reconnected");
        Ok(())
    }

    /// Close the page target.
    pub async fn close(&self) -> Result<()> {
        let transport = self.transport().await;
        transport
            .call("Page.close", json!({}), Duration::ZERO)
            .await?;
        Ok(())
    }

    /// Named waits
    pub fn wait(&self) -> TabWaits<'_> {
        TabWaits { tab: self }
    }
}

/// Named waits scoped to one tab
pub struct TabWaits<'a> {
    tab: &'a Tab,
}

impl<'a> TabWaits<'a> {
    fn timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.tab.timeouts.base_duration())
    }

    fn raise(&self, raise: Option<bool>) -> bool {
        self.tab.settings.resolve_raise(raise)
    }

    /// Lifecycle reached the load mode's target state.
    pub async fn doc_loaded(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move { tab.is_ready(tab.document_state()) },
            self.timeout(timeout),
            Duration::from_millis(20),
            self.raise(raise),
            "document loaded",
        )
        .await
    }

    /// A navigation has started and not yet settled.
    pub async fn load_start(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move {
                matches!(
                    tab.document_state(),
                    DocumentState::Connecting | DocumentState::Loading
                )
            },
            self.timeout(timeout),
            Duration::from_millis(20),
            self.raise(raise),
            "load start",
        )
        .await
    }

    /// URL contains `text`, or stops containing it with `exclude`.
    pub async fn url_change(
        &self,
        text: &str,
        exclude: bool,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move {
                let url = tab.url().await.unwrap_or_default();
                url.contains(text) != exclude
            },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "url change",
        )
        .await
    }

    /// Title contains `text`, or stops containing it with `exclude`.
    pub async fn title_change(
        &self,
        text: &str,
        exclude: bool,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move {
                let title = tab.title().await.unwrap_or_default();
                title.contains(text) != exclude
            },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "title change",
        )
        .await
    }

    /// An element for the locator is present and displayed.
    pub async fn ele_displayed(
        &self,
        locator: &str,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move {
                match tab.ele(locator, Some(Duration::ZERO)).await {
                    Ok(ele) => ele.states().is_displayed().await.unwrap_or(false),
                    Err(_) => false,
                }
            },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "element displayed",
        )
        .await
    }

    /// No displayed element matches the locator.
    pub async fn ele_hidden(
        &self,
        locator: &str,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move {
                match tab.ele(locator, Some(Duration::ZERO)).await {
                    Ok(ele) => !ele.states().is_displayed().await.unwrap_or(true),
                    Err(_) => true,
                }
            },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "element hidden",
        )
        .await
    }

    /// No element matches the locator any more.
    pub async fn ele_deleted(
        &self,
        locator: &str,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move { tab.ele(locator, Some(Duration::ZERO)).await.is_err() },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "element deleted",
        )
        .await
    }

    /// Every locator (or any one of them) has at least one match.
    pub async fn eles_loaded(
        &self,
        locators: &[&str],
        any_one: bool,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move {
                let mut hits = 0usize;
                for locator in locators {
                    let found = tab
                        .eles(locator, Some(Duration::ZERO))
                        .await
                        .map(|eles| !eles.is_empty())
                        .unwrap_or(false);
                    if found {
                        if any_one {
                            return true;
                        }
                        hits += 1;
                    } else if !any_one {
                        return false;
                    }
                }
                hits == locators.len() && !locators.is_empty()
            },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "elements loaded",
        )
        .await
    }

    /// The open dialog has been answered.
    pub async fn alert_closed(&self, timeout: Option<Duration>, raise: Option<bool>) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move { !tab.alert().await.activated },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "alert closed",
        )
        .await
    }

    /// A pending upload list has been pushed into a file chooser.
    pub async fn upload_paths_inputted(
        &self,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<bool> {
        let tab = self.tab;
        waiter::wait_for(
            || async move { !tab.upload_pending().await },
            self.timeout(timeout),
            waiter::DEFAULT_INTERVAL,
            self.raise(raise),
            "upload paths inputted",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockTransport;

    fn factory_unused() -> TransportFactory {
        Arc::new(|_| Box::pin(async { Err(Error::internal("factory must not be called")) }))
    }

    async fn mock_tab(mock: &Arc<MockTransport>) -> Arc<Tab> {
        mock.expect(
            "DOM.getDocument",
            Ok(json!({ "root": {
                "nodeId": 1, "backendNodeId": 100, "nodeType": 9,
                "nodeName": "#document", "localName": "", "nodeValue": "",
            }})),
        )
        .await;
        Tab::attach(
            mock.clone() as Arc<dyn Transport>,
            factory_unused(),
            Timeouts::default(),
            LoadMode::Normal,
            Settings::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_attach_enables_domains_and_fetches_document() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;

        assert_eq!(mock.calls_for("Page.enable").await.len(), 1);
        assert_eq!(mock.calls_for("DOM.getDocument").await.len(), 1);
        assert_eq!(tab.root().await.unwrap().backend_id(), 100);
        // Document already fetched for this navigation, no second fetch
        assert_eq!(mock.calls_for("DOM.getDocument").await.len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_states_follow_events() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;

        mock.emit("Page.frameStartedLoading", json!({ "frameId": "MAIN" }))
            .await;
        assert_eq!(tab.document_state(), DocumentState::Connecting);

        mock.emit("Page.frameNavigated", json!({ "frame": { "id": "MAIN" } }))
            .await;
        assert_eq!(tab.document_state(), DocumentState::Loading);

        mock.emit("Page.domContentEventFired", json!({})).await;
        assert_eq!(tab.document_state(), DocumentState::Interactive);

        mock.emit("Page.loadEventFired", json!({})).await;
        assert_eq!(tab.document_state(), DocumentState::Complete);
    }

    #[tokio::test]
    async fn test_one_document_fetch_per_navigation() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;
        let _ = tab;

        mock.emit("Page.frameStartedLoading", json!({ "frameId": "MAIN" }))
            .await;
        mock.emit("Page.domContentEventFired", json!({})).await;
        mock.emit("Page.loadEventFired", json!({})).await;
        mock.emit("Page.frameStoppedLoading", json!({ "frameId": "MAIN" }))
            .await;

        // Initial attach fetch + exactly one for this navigation
        assert_eq!(mock.calls_for("DOM.getDocument").await.len(), 2);
    }

    #[tokio::test]
    async fn test_navigation_error_text_fails_get() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;
        mock.expect(
            "Page.navigate",
            Ok(json!({ "frameId": "MAIN", "errorText": "net::ERR_NAME_NOT_RESOLVED" })),
        )
        .await;

        let err = tab
            .get("https://no.such.host/", 0, Duration::ZERO, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BrowserConnect(_)));
    }

    #[tokio::test]
    async fn test_auto_alert_accepts_dialog() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;
        tab.set_auto_alert(Some(AutoAlertMode::Accept)).await;

        mock.emit(
            "Page.javascriptDialogOpening",
            json!({ "message": "sure?", "type": "confirm", "defaultPrompt": "" }),
        )
        .await;

        let handled = mock.calls_for("Page.handleJavaScriptDialog").await;
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].params["accept"], json!(true));
        assert!(!tab.alert().await.activated);
    }

    #[tokio::test]
    async fn test_manual_alert_stays_open_until_handled() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;

        mock.emit(
            "Page.javascriptDialogOpening",
            json!({ "message": "name?", "type": "prompt", "defaultPrompt": "bob" }),
        )
        .await;

        let record = tab.alert().await;
        assert!(record.activated);
        assert_eq!(record.text, "name?");
        assert_eq!(record.dialog_type, "prompt");

        let text = tab
            .handle_alert(true, Some("alice"), Some(Duration::from_millis(200)), false)
            .await
            .unwrap();
        assert_eq!(text.as_deref(), Some("name?"));
        let handled = mock.calls_for("Page.handleJavaScriptDialog").await;
        assert_eq!(handled[0].params["promptText"], json!("alice"));
    }

    #[tokio::test]
    async fn test_next_one_directive_consumed_once() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;

        tab.handle_alert(false, None, None, true).await.unwrap();
        mock.emit(
            "Page.javascriptDialogOpening",
            json!({ "message": "a", "type": "alert", "defaultPrompt": "" }),
        )
        .await;
        assert_eq!(mock.calls_for("Page.handleJavaScriptDialog").await.len(), 1);

        // Second dialog: directive is spent, stays open
        mock.emit(
            "Page.javascriptDialogOpening",
            json!({ "message": "b", "type": "alert", "defaultPrompt": "" }),
        )
        .await;
        assert_eq!(mock.calls_for("Page.handleJavaScriptDialog").await.len(), 1);
        assert!(tab.alert().await.activated);
    }

    #[tokio::test]
    async fn test_init_js_roundtrip() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;
        mock.expect(
            "Page.addScriptToEvaluateOnNewDocument",
            Ok(json!({ "identifier": "42" })),
        )
        .await;

        let id = tab.add_init_js("window.flag = 1;").await.unwrap();
        assert_eq!(id, "42");
        tab.remove_init_js(None).await.unwrap();
        let removed = mock
            .calls_for("Page.removeScriptToEvaluateOnNewDocument")
            .await;
        assert_eq!(removed[0].params["identifier"], json!("42"));
    }

    #[tokio::test]
    async fn test_file_chooser_pushes_pending_files() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;

        tab.upload_files(vec!["/tmp/a.bin".into()]).await.unwrap();
        assert!(tab.upload_pending().await);

        mock.emit("Page.fileChooserOpened", json!({ "backendNodeId": 12 }))
            .await;

        assert!(!tab.upload_pending().await);
        let set = mock.calls_for("DOM.setFileInputFiles").await;
        assert_eq!(set[0].params["files"], json!(["/tmp/a.bin"]));
        assert_eq!(set[0].params["backendNodeId"], json!(12));
    }

    #[tokio::test]
    async fn test_jpeg_screenshot_uses_quality_100() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;
        mock.expect(
            "Page.captureScreenshot",
            Ok(json!({ "data": BASE64.encode(b"img") })),
        )
        .await;

        let bytes = tab.get_screenshot(false, true).await.unwrap();
        assert_eq!(bytes, b"img");
        let calls = mock.calls_for("Page.captureScreenshot").await;
        assert_eq!(calls[0].params["format"], json!("jpeg"));
        assert_eq!(calls[0].params["quality"], json!(100));
        assert_eq!(calls[0].params["captureBeyondViewport"], json!(false));
    }

    #[tokio::test]
    async fn test_set_window_bounds_keeps_unset_fields() {
        let mock = MockTransport::new("tab-1");
        let tab = mock_tab(&mock).await;
        mock.expect(
            "Browser.getWindowForTarget",
            Ok(json!({
                "windowId": 7,
                "bounds": { "left": 0, "top": 0, "width": 800, "height": 600,
                            "windowState": "normal" },
            })),
        )
        .await;

        tab.set_window_bounds(None, None, Some(1280), Some(720))
            .await
            .unwrap();
        let calls = mock.calls_for("Browser.setWindowBounds").await;
        assert_eq!(calls[0].params["windowId"], json!(7));
        assert_eq!(calls[0].params["bounds"]["width"], json!(1280));
        assert_eq!(calls[0].params["bounds"]["height"], json!(720));
        assert!(calls[0].params["bounds"].get("left").is_none());

        tab.set_window_state("maximized").await.unwrap();
        let calls = mock.calls_for("Browser.setWindowBounds").await;
        assert_eq!(calls[1].params["bounds"]["windowState"], json!("maximized"));
    }
}
