//! Mock Chrome DevTools Protocol server
//!
//! A WebSocket server standing in for a real Chrome debugger endpoint.
//! Responses can be scripted per method, methods can be made to fail or
//! never answer, and CDP events can be pushed to connected drivers.

#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Clone)]
enum Scripted {
    /// Reply `{"result": ...}`
    Result(Value),
    /// Reply `{"error": {code, message}}`
    Error(i64, String),
    /// Never reply, the caller times out
    Swallow,
}

struct ServerState {
    scripted: HashMap<String, Scripted>,
    calls: Vec<(String, Value)>,
}

/// Mock Chrome server
pub struct MockChrome {
    addr: String,
    state: Arc<Mutex<ServerState>>,
    events: broadcast::Sender<Value>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockChrome {
    /// Start a server on an ephemeral port.
    pub async fn start() -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();

        let state = Arc::new(Mutex::new(ServerState {
            scripted: HashMap::new(),
            calls: Vec::new(),
        }));
        let (events, _) = broadcast::channel::<Value>(64);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let accept_state = Arc::clone(&state);
        let accept_events = events.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                tokio::spawn(Self::handle_connection(
                                    stream,
                                    Arc::clone(&accept_state),
                                    accept_events.subscribe(),
                                ));
                            }
                            Err(_) => break,
                        }
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Ok(Self {
            addr,
            state,
            events,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// WebSocket URL for a page target, as the real endpoint formats it.
    pub fn page_ws_url(&self, target_id: &str) -> String {
        format!("ws://{}/devtools/page/{}", self.addr, target_id)
    }

    /// Script a method to answer with a result payload.
    pub async fn script(&self, method: &str, result: Value) {
        self.state
            .lock()
            .await
            .scripted
            .insert(method.to_string(), Scripted::Result(result));
    }

    /// Script a method to answer with a CDP error.
    pub async fn fail(&self, method: &str, code: i64, message: &str) {
        self.state
            .lock()
            .await
            .scripted
            .insert(method.to_string(), Scripted::Error(code, message.to_string()));
    }

    /// Script a method to never answer.
    pub async fn swallow(&self, method: &str) {
        self.state
            .lock()
            .await
            .scripted
            .insert(method.to_string(), Scripted::Swallow);
    }

    /// Push a CDP event to every connected driver.
    pub fn emit(&self, method: &str, params: Value) {
        let _ = self.events.send(json!({ "method": method, "params": params }));
    }

    /// Params of every received call of a method, in arrival order.
    pub async fn calls_for(&self, method: &str) -> Vec<Value> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    async fn handle_connection(
        stream: TcpStream,
        state: Arc<Mutex<ServerState>>,
        mut events: broadcast::Receiver<Value>,
    ) {
        let Ok(ws_stream) = accept_async(stream).await else {
            return;
        };
        let (mut sender, mut receiver) = ws_stream.split();

        loop {
            tokio::select! {
                message = receiver.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(request) = serde_json::from_str::<Value>(&text) else {
                                continue;
                            };
                            if let Some(reply) = Self::respond(&state, &request).await {
                                let Ok(text) = serde_json::to_string(&reply) else {
                                    continue;
                                };
                                if sender.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        _ => {}
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            let Ok(text) = serde_json::to_string(&event) else {
                                continue;
                            };
                            if sender.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        // Server dropped; close the socket
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        let _ = sender.send(Message::Close(None)).await;
    }

    async fn respond(state: &Arc<Mutex<ServerState>>, request: &Value) -> Option<Value> {
        let method = request["method"].as_str().unwrap_or_default().to_string();
        let id = request["id"].clone();
        let params = request.get("params").cloned().unwrap_or(json!({}));

        let mut state = state.lock().await;
        state.calls.push((method.clone(), params));
        match state.scripted.get(&method) {
            Some(Scripted::Result(result)) => Some(json!({ "id": id, "result": result })),
            Some(Scripted::Error(code, message)) => Some(json!({
                "id": id,
                "error": { "code": code, "message": message },
            })),
            Some(Scripted::Swallow) => None,
            None => Some(json!({ "id": id, "result": {} })),
        }
    }
}

impl Drop for MockChrome {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
