//! End-to-end integration tests
//!
//! Full stacks over a live WebSocket to the mock Chrome server: tab
//! navigation through the page-lifecycle state machine, network capture
//! and download tracking.

mod common;
mod mock_chrome;

use common::{attach_tab, connect_driver, document_root, driver_factory, settle};
use drover_oxide::cdp::Transport;
use drover_oxide::config::Timeouts;
use drover_oxide::download::{DownloadManager, MissionStatus};
use drover_oxide::listener::{CaptureFilter, NetworkListener};
use drover_oxide::settings::{AutoAlertMode, Settings};
use drover_oxide::tab::DocumentState;
use drover_oxide::{LoadMode, Tab};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

fn emit_full_load(server: &mock_chrome::MockChrome, frame_id: &str) {
    server.emit("Page.frameStartedLoading", json!({ "frameId": frame_id }));
    server.emit("Page.frameNavigated", json!({ "frame": { "id": frame_id } }));
    server.emit("Page.domContentEventFired", json!({}));
    server.emit("Page.loadEventFired", json!({}));
}

#[tokio::test]
async fn test_navigation_walks_the_lifecycle() {
    let server = Arc::new(mock_chrome::MockChrome::start().await.unwrap());
    server.script("Page.navigate", json!({ "frameId": "MAIN" })).await;
    let tab = attach_tab(&server, "tab-1").await;
    assert_eq!(server.calls_for("DOM.getDocument").await.len(), 1);

    let emitter = Arc::clone(&server);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        emit_full_load(&emitter, "MAIN");
    });

    let loaded = tab
        .get("https://example.com/", 0, Duration::from_millis(50), None)
        .await
        .unwrap();
    assert!(loaded);
    assert_eq!(tab.document_state(), DocumentState::Complete);

    // One document re-acquisition per navigation on top of the one at attach
    settle().await;
    assert_eq!(server.calls_for("DOM.getDocument").await.len(), 2);
}

#[tokio::test]
async fn test_eager_mode_stops_loading_at_interactive() {
    let server = Arc::new(mock_chrome::MockChrome::start().await.unwrap());
    server.script("DOM.getDocument", document_root(100)).await;
    server.script("Page.navigate", json!({ "frameId": "MAIN" })).await;

    let driver = connect_driver(&server, "tab-1").await;
    let tab = Tab::attach(
        driver as Arc<dyn Transport>,
        driver_factory(&server),
        Timeouts::default(),
        LoadMode::Eager,
        Settings::default(),
    )
    .await
    .unwrap();

    let emitter = Arc::clone(&server);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        emitter.emit("Page.frameStartedLoading", json!({ "frameId": "MAIN" }));
        emitter.emit("Page.frameNavigated", json!({ "frame": { "id": "MAIN" } }));
        // The page never finishes; dom-content alone must satisfy eager
        emitter.emit("Page.domContentEventFired", json!({}));
    });

    let loaded = tab
        .get("https://example.com/", 0, Duration::from_millis(50), None)
        .await
        .unwrap();
    assert!(loaded);
    settle().await;
    assert_eq!(server.calls_for("Page.stopLoading").await.len(), 1);
}

#[tokio::test]
async fn test_run_js_round_trip() {
    let server = Arc::new(mock_chrome::MockChrome::start().await.unwrap());
    server
        .script("Runtime.evaluate", json!({ "result": { "type": "number", "value": 2 } }))
        .await;
    let tab = attach_tab(&server, "tab-1").await;

    let value = tab.run_js("1 + 1", &[], true, None).await.unwrap();
    assert_eq!(value, json!(2));

    let calls = server.calls_for("Runtime.evaluate").await;
    let last = calls.last().unwrap();
    assert_eq!(last["expression"], json!("1 + 1"));
    assert_eq!(last["returnByValue"], json!(true));
}

#[tokio::test]
async fn test_listener_orders_packets_by_completion() {
    let server = Arc::new(mock_chrome::MockChrome::start().await.unwrap());
    server
        .script("Network.getResponseBody", json!({ "body": "payload", "base64Encoded": false }))
        .await;
    let driver = connect_driver(&server, "tab-1").await;
    let listener = NetworkListener::new(driver as Arc<dyn Transport>, "tab-1", None);
    listener.start(CaptureFilter::default()).await.unwrap();
    settle().await;
    assert_eq!(server.calls_for("Network.enable").await.len(), 1);

    for (id, url) in [("r1", "https://a/first"), ("r2", "https://a/second")] {
        server.emit(
            "Network.requestWillBeSent",
            json!({
                "requestId": id, "type": "XHR",
                "request": { "url": url, "method": "GET", "headers": {} },
            }),
        );
        server.emit(
            "Network.responseReceived",
            json!({
                "requestId": id, "type": "XHR",
                "response": {
                    "status": 200, "statusText": "OK", "headers": {},
                    "mimeType": "text/plain",
                },
            }),
        );
    }
    // Completion order is the reverse of start order
    server.emit("Network.loadingFinished", json!({ "requestId": "r2" }));
    server.emit("Network.loadingFinished", json!({ "requestId": "r1" }));

    let packets = listener
        .wait(2, Duration::from_secs(2), true, Some(true))
        .await
        .unwrap();
    assert_eq!(packets[0].request.url, "https://a/second");
    assert_eq!(packets[1].request.url, "https://a/first");
    assert!(packets.iter().all(|p| p.response.is_some()));
}

#[tokio::test]
async fn test_download_completes_over_live_socket() {
    let server = Arc::new(mock_chrome::MockChrome::start().await.unwrap());
    let driver = connect_driver(&server, "browser").await;

    let tmp = std::env::temp_dir().join(format!("dl-e2e-{}", std::process::id()));
    let save = tmp.join("saved");
    std::fs::create_dir_all(&tmp).unwrap();
    std::fs::create_dir_all(&save).unwrap();

    let owners: HashMap<String, String> =
        HashMap::from([("F1".to_string(), "tab-1".to_string())]);
    let manager = DownloadManager::attach(
        driver as Arc<dyn Transport>,
        Arc::new(move |frame_id| owners.get(frame_id).cloned()),
        tmp.clone(),
        save.clone(),
    )
    .await
    .unwrap();
    settle().await;
    let behavior = server.calls_for("Browser.setDownloadBehavior").await;
    assert_eq!(behavior[0]["behavior"], json!("allowAndName"));

    manager.arm("tab-1", true).await;
    server.emit(
        "Browser.downloadWillBegin",
        json!({
            "guid": "g1", "url": "https://x/report.pdf",
            "suggestedFilename": "report.pdf", "frameId": "F1",
        }),
    );
    settle().await;
    std::fs::write(tmp.join("g1"), b"pdf-bytes").unwrap();
    server.emit(
        "Browser.downloadProgress",
        json!({ "guid": "g1", "state": "completed", "receivedBytes": 9, "totalBytes": 9 }),
    );
    settle().await;

    let mission = manager.take_mission("tab-1").await.unwrap();
    let status = manager
        .wait_mission(&mission, Duration::from_secs(2), false)
        .await
        .unwrap();
    assert_eq!(status, MissionStatus::Done);
    assert_eq!(
        std::fs::read(save.join("report.pdf")).unwrap(),
        b"pdf-bytes"
    );

    let _ = std::fs::remove_dir_all(&tmp);
}

#[tokio::test]
async fn test_tab_auto_alert_answers_dialog() {
    let server = Arc::new(mock_chrome::MockChrome::start().await.unwrap());
    let tab = attach_tab(&server, "tab-1").await;
    tab.set_auto_alert(Some(AutoAlertMode::Accept)).await;

    server.emit(
        "Page.javascriptDialogOpening",
        json!({ "message": "sure?", "type": "confirm", "defaultPrompt": "" }),
    );
    settle().await;

    let handled = server.calls_for("Page.handleJavaScriptDialog").await;
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0]["accept"], json!(true));
}
