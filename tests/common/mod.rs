//! Common test utilities
//!
//! Shared fixtures for the integration tests: a driver connected to the
//! mock Chrome server and a fully attached tab over a live WebSocket.

#![allow(dead_code)]

use crate::mock_chrome::MockChrome;
use drover_oxide::cdp::{Driver, Transport};
use drover_oxide::config::Timeouts;
use drover_oxide::frame::TransportFactory;
use drover_oxide::settings::Settings;
use drover_oxide::{LoadMode, Tab};
use futures::FutureExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Route driver logs through `RUST_LOG` when a test needs them.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A document root node as `DOM.getDocument` reports it
pub fn document_root(backend_id: i64) -> Value {
    json!({ "root": {
        "nodeId": 1, "backendNodeId": backend_id, "nodeType": 9,
        "nodeName": "#document", "localName": "", "nodeValue": "",
    }})
}

/// Connect a page driver to the mock server.
pub async fn connect_driver(server: &MockChrome, target_id: &str) -> Arc<Driver> {
    init_logs();
    Driver::connect(target_id.to_string(), server.page_ws_url(target_id))
        .await
        .expect("driver connects to mock server")
}

/// A factory opening further drivers against the same mock server.
pub fn driver_factory(server: &MockChrome) -> TransportFactory {
    let url_for = {
        let base = server.page_ws_url("");
        move |target_id: &str| format!("{}{}", base, target_id)
    };
    Arc::new(move |target_id: String| {
        let url = url_for(&target_id);
        async move {
            let driver = Driver::connect(target_id, url).await?;
            Ok(driver as Arc<dyn Transport>)
        }
        .boxed()
    })
}

/// Attach a tab over a live driver. The server is scripted with the
/// document snapshot the attach sequence fetches.
pub async fn attach_tab(server: &MockChrome, target_id: &str) -> Arc<Tab> {
    server.script("DOM.getDocument", document_root(100)).await;
    let driver = connect_driver(server, target_id).await;
    Tab::attach(
        driver as Arc<dyn Transport>,
        driver_factory(server),
        Timeouts::default(),
        LoadMode::Normal,
        Settings::default(),
    )
    .await
    .expect("tab attaches")
}

/// Event handlers land on dispatcher tasks; give them a beat to run.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
