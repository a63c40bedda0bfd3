//! CDP WebSocket driver
//!
//! One driver per CDP target (the browser itself, a page, or a
//! cross-origin frame). Provides request/response correlation over a
//! WebSocket, plus event fan-out to registered callbacks.
//!
//! Events travel two paths: the normal dispatcher, which runs handlers in
//! arrival order, and an immediate dispatcher on its own worker so that
//! dialog-opening notifications can short-circuit calls blocked behind
//! the renderer.

use crate::cdp::types::{CdpNotification, CdpRequest, CdpRpcResponse};
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Event callback. Handlers run on a dispatcher task, never on the socket
/// reader, so a slow handler cannot stall response correlation.
pub type EventHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked once when the driver loses its connection unintentionally.
pub type DisconnectHook = Box<dyn FnOnce() + Send>;

/// Outstanding request slot
struct PendingCall {
    sender: oneshot::Sender<CdpRpcResponse>,
    method: String,
}

/// Methods the renderer blocks on while a JavaScript dialog is open.
/// Calls from this family abort with `AlertExists` instead of deadlocking.
fn alert_sensitive(method: &str) -> bool {
    method.starts_with("Input.")
        || method.starts_with("Runtime.")
        || method == "Page.navigate"
        || method == "Page.reload"
        || method == "Page.stopLoading"
        || method == "DOM.performSearch"
        || method == "DOM.getDocument"
}

/// CDP WebSocket driver for one target
pub struct Driver {
    /// Target id this driver is attached to
    target_id: String,
    /// WebSocket URL
    url: String,
    /// Write half of the socket
    writer: Mutex<Option<WsSink>>,
    /// Next command ID, strictly increasing, never reused
    next_id: AtomicU64,
    /// Outstanding requests (ID -> response slot)
    pending: Arc<Mutex<HashMap<u64, PendingCall>>>,
    /// Normal event handlers (method -> callback)
    handlers: Arc<Mutex<HashMap<String, EventHandler>>>,
    /// Immediate event handlers, dispatched on their own worker
    immediate_handlers: Arc<Mutex<HashMap<String, EventHandler>>>,
    /// Feed of the normal dispatcher
    event_tx: mpsc::UnboundedSender<CdpNotification>,
    /// Feed of the immediate dispatcher
    immediate_tx: mpsc::UnboundedSender<CdpNotification>,
    /// Raised before a dialog-opening event is queued
    alert_flag: Arc<AtomicBool>,
    /// Wakes alert-sensitive blocked calls
    alert_notify: Arc<Notify>,
    /// Driver state
    running: Arc<AtomicBool>,
    /// Set before an intentional stop so on_disconnect is suppressed
    reconnecting: AtomicBool,
    /// Owner's disconnect hook, fired at most once
    on_disconnect: Mutex<Option<DisconnectHook>>,
    /// Reader and dispatcher tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("target_id", &self.target_id)
            .field("url", &self.url)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

impl Driver {
    /// Connect to a target's WebSocket debugger URL.
    pub async fn connect<S: Into<String>>(target_id: S, url: S) -> Result<Arc<Self>> {
        let target_id = target_id.into();
        let url = url.into();
        info!("Connecting driver for target {} at {}", target_id, url);

        let (ws_stream, _) = connect_async(&url)
            .await
            .map_err(|e| Error::browser_connect(format!("Failed to connect to {}: {}", url, e)))?;

        let (sink, stream) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (immediate_tx, immediate_rx) = mpsc::unbounded_channel();

        let driver = Arc::new(Self {
            target_id,
            url,
            writer: Mutex::new(Some(sink)),
            next_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            immediate_handlers: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            immediate_tx,
            alert_flag: Arc::new(AtomicBool::new(false)),
            alert_notify: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(true)),
            reconnecting: AtomicBool::new(false),
            on_disconnect: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        let reader = tokio::spawn(Self::read_loop(
            Arc::downgrade(&driver),
            driver.target_id.clone(),
            stream,
        ));
        let dispatcher = tokio::spawn(Self::dispatch_loop(
            Arc::clone(&driver.handlers),
            event_rx,
        ));
        let immediate = tokio::spawn(Self::dispatch_loop(
            Arc::clone(&driver.immediate_handlers),
            immediate_rx,
        ));

        let mut tasks = driver.tasks.lock().await;
        tasks.push(reader);
        tasks.push(dispatcher);
        tasks.push(immediate);
        drop(tasks);

        Ok(driver)
    }

    /// Target id this driver serves
    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    /// WebSocket URL this driver is connected to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the driver is still running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether a dialog is currently known to be open on this target
    pub fn alert_open(&self) -> bool {
        self.alert_flag.load(Ordering::SeqCst)
    }

    /// Register the owner's disconnect hook, fired at most once on an
    /// unintentional connection loss.
    pub async fn set_on_disconnect(&self, hook: DisconnectHook) {
        *self.on_disconnect.lock().await = Some(hook);
    }

    /// Mark the next stop as intentional so the disconnect hook stays quiet.
    pub fn set_reconnecting(&self, value: bool) {
        self.reconnecting.store(value, Ordering::SeqCst);
    }

    /// Register an event handler. Registrations after stop are ignored.
    pub async fn set_callback(&self, event: &str, handler: EventHandler, immediate: bool) {
        if !self.is_running() {
            debug!("Ignoring callback registration for {} on stopped driver", event);
            return;
        }
        let table = if immediate {
            &self.immediate_handlers
        } else {
            &self.handlers
        };
        table.lock().await.insert(event.to_string(), handler);
    }

    /// Remove an event handler from both tables.
    pub async fn clear_callback(&self, event: &str) {
        self.handlers.lock().await.remove(event);
        self.immediate_handlers.lock().await.remove(event);
    }

    /// Send a CDP command and wait for the matching response.
    ///
    /// A zero timeout means fire-and-forget: the message is sent, no slot
    /// is retained, and an empty success is returned immediately.
    pub async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        if !self.is_running() {
            return Err(Error::disconnected(format!(
                "driver for target {} is stopped",
                self.target_id
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params: if params.is_null() { None } else { Some(params.clone()) },
            session_id: None,
        };
        let json = serde_json::to_string(&request)?;

        if timeout.is_zero() {
            debug!("Sending CDP command {} {} (fire-and-forget)", id, method);
            self.send_text(json).await?;
            return Ok(Value::Object(serde_json::Map::new()));
        }

        let (sender, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                id,
                PendingCall {
                    sender,
                    method: method.to_string(),
                },
            );
        }

        debug!("Sending CDP command {} {}", id, method);
        if let Err(e) = self.send_text(json).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        let sensitive = alert_sensitive(method);
        let alert_flag = Arc::clone(&self.alert_flag);
        let alert_notify = Arc::clone(&self.alert_notify);
        let alert_watch = async move {
            if !sensitive {
                futures::future::pending::<()>().await;
            }
            loop {
                if alert_flag.load(Ordering::SeqCst) {
                    return;
                }
                alert_notify.notified().await;
            }
        };

        tokio::select! {
            resp = receiver => {
                match resp {
                    Ok(response) => {
                        if let Some(err) = response.error {
                            Err(Error::from_cdp(method, params, err.code, &err.message, err.data))
                        } else {
                            Ok(response.result)
                        }
                    }
                    // Slot reaped by transport shutdown
                    Err(_) => Err(Error::disconnected("connection disconnected")),
                }
            }
            _ = tokio::time::sleep(timeout) => {
                self.pending.lock().await.remove(&id);
                Err(Error::timeout(format!("{} timed out after {:?} (id {})", method, timeout, id)))
            }
            _ = alert_watch => {
                self.pending.lock().await.remove(&id);
                Err(Error::alert_exists(method))
            }
        }
    }

    /// Stop the driver: close the socket, end the worker tasks, reap
    /// outstanding slots and clear handler tables. Idempotent.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping driver for target {}", self.target_id);

        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.close().await;
        }

        self.reap().await;

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        self.handlers.lock().await.clear();
        self.immediate_handlers.lock().await.clear();

        if !self.reconnecting.load(Ordering::SeqCst) {
            if let Some(hook) = self.on_disconnect.lock().await.take() {
                hook();
            }
        }
    }

    /// Release every outstanding slot; the waiters observe a disconnect.
    async fn reap(&self) {
        let mut pending = self.pending.lock().await;
        for (id, call) in pending.drain() {
            debug!("Reaping outstanding call {} ({})", id, call.method);
            drop(call.sender);
        }
    }

    async fn send_text(&self, json: String) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| Error::disconnected("socket writer is gone"))?;
        sink.send(Message::Text(json))
            .await
            .map_err(|e| Error::websocket(format!("Failed to send message: {}", e)))
    }

    /// Socket reader: correlates responses to slots and routes events.
    ///
    /// Holds only a weak handle so a driver dropped without an explicit
    /// stop is freed; losing the last strong handle closes the socket
    /// and ends this task.
    async fn read_loop(
        driver: Weak<Driver>,
        target_id: String,
        mut stream: futures::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    ) {
        loop {
            let message = match stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    error!("WebSocket error on target {}: {}", target_id, e);
                    break;
                }
                None => {
                    warn!("WebSocket stream closed for target {}", target_id);
                    break;
                }
            };
            let Some(driver) = driver.upgrade() else { return };
            if !driver.is_running() {
                return;
            }

            match message {
                Message::Text(text) => driver.route_message(&text).await,
                Message::Close(_) => {
                    info!("Close frame received for target {}", target_id);
                    break;
                }
                Message::Ping(data) => {
                    let mut writer = driver.writer.lock().await;
                    if let Some(sink) = writer.as_mut() {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                }
                _ => {}
            }
        }

        // Fatal socket loss: mark stopped, wake all waiters, fire the hook.
        let Some(driver) = driver.upgrade() else { return };
        if driver.running.swap(false, Ordering::SeqCst) {
            driver.reap().await;
            driver.handlers.lock().await.clear();
            driver.immediate_handlers.lock().await.clear();
            if !driver.reconnecting.load(Ordering::SeqCst) {
                if let Some(hook) = driver.on_disconnect.lock().await.take() {
                    hook();
                }
            }
        }
    }

    async fn route_message(&self, text: &str) {
        // Responses carry an id, events carry a method.
        if let Ok(response) = serde_json::from_str::<CdpRpcResponse>(text) {
            let mut pending = self.pending.lock().await;
            if let Some(call) = pending.remove(&response.id) {
                debug!("Response for command {} ({})", response.id, call.method);
                let _ = call.sender.send(response);
            } else {
                debug!("Dropping response for unknown command id {}", response.id);
            }
            return;
        }

        if let Ok(event) = serde_json::from_str::<CdpNotification>(text) {
            // The flag flips before the event is queued so concurrent
            // blocked calls can observe it without waiting on dispatch.
            if event.method == "Page.javascriptDialogOpening" {
                self.alert_flag.store(true, Ordering::SeqCst);
                self.alert_notify.notify_waiters();
            } else if event.method == "Page.javascriptDialogClosed" {
                self.alert_flag.store(false, Ordering::SeqCst);
            }

            let immediate = self.immediate_handlers.lock().await.contains_key(&event.method);
            let tx = if immediate { &self.immediate_tx } else { &self.event_tx };
            if tx.send(event).is_err() {
                warn!("Event queue closed for target {}", self.target_id);
            }
            return;
        }

        warn!("Unknown message format: {}", text);
    }

    /// Dispatcher worker: runs handlers for queued events in arrival order.
    async fn dispatch_loop(
        handlers: Arc<Mutex<HashMap<String, EventHandler>>>,
        mut rx: mpsc::UnboundedReceiver<CdpNotification>,
    ) {
        while let Some(event) = rx.recv().await {
            let handler = handlers.lock().await.get(&event.method).cloned();
            if let Some(handler) = handler {
                handler(event.params).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::cdp::traits::Transport for Driver {
    fn target_id(&self) -> &str {
        Driver::target_id(self)
    }

    fn is_running(&self) -> bool {
        Driver::is_running(self)
    }

    fn alert_open(&self) -> bool {
        Driver::alert_open(self)
    }

    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        Driver::call(self, method, params, timeout).await
    }

    async fn set_callback(&self, event: &str, handler: EventHandler, immediate: bool) {
        Driver::set_callback(self, event, handler, immediate).await
    }

    async fn clear_callback(&self, event: &str) {
        Driver::clear_callback(self, event).await
    }

    async fn set_on_disconnect(&self, hook: DisconnectHook) {
        Driver::set_on_disconnect(self, hook).await
    }

    fn set_reconnecting(&self, value: bool) {
        Driver::set_reconnecting(self, value)
    }

    async fn stop(&self) {
        Driver::stop(self).await
    }
}
