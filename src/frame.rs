//! Frame handling
//!
//! A same-origin frame is just a document inside the parent's session:
//! operations run against the frame document's backend node. A
//! cross-origin frame is its own CDP target with its own transport.
//! Navigation can flip a frame between the two modes at any time, so
//! the frame watches the two events that signal a flip and re-binds
//! itself before the next operation.

use crate::cdp::traits::Transport;
use crate::cdp::types::DescribeNodeResponse;
use crate::element::{Element, PageCtx};
use crate::locator::{self, Locator};
use crate::{Error, Result};
use futures::future::BoxFuture;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Builds a page transport for a target id. The browser wires in the
/// real WebSocket connector; tests wire in mocks.
pub type TransportFactory =
    Arc<dyn Fn(String) -> BoxFuture<'static, Result<Arc<dyn Transport>>> + Send + Sync>;

#[derive(Debug, Clone)]
enum FrameMode {
    /// Frame document lives in the parent session
    SameOrigin { doc_backend_id: i64 },
    /// Frame is its own target
    CrossOrigin { transport: Arc<dyn Transport> },
}

/// One iframe/frame, valid across same/cross-origin transitions
pub struct Frame {
    frame_id: String,
    host: Element,
    parent: PageCtx,
    factory: TransportFactory,
    mode: Mutex<FrameMode>,
    needs_rebind: Arc<AtomicBool>,
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("frame_id", &self.frame_id)
            .field("host_backend_id", &self.host.backend_id())
            .finish()
    }
}

impl Frame {
    /// Bind to the frame hosted by `host` (an iframe/frame element in the
    /// parent document) and subscribe to the mode-flip events.
    pub async fn attach(
        parent: PageCtx,
        host: Element,
        factory: TransportFactory,
    ) -> Result<Arc<Frame>> {
        let (frame_id, mode) = Self::detect(&parent, &host, &factory).await?;
        let frame = Arc::new(Frame {
            frame_id,
            host,
            parent,
            factory,
            mode: Mutex::new(mode),
            needs_rebind: Arc::new(AtomicBool::new(false)),
        });
        frame.subscribe().await;
        Ok(frame)
    }

    /// CDP frame id of this frame
    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    /// The iframe element hosting this frame
    pub fn host(&self) -> &Element {
        &self.host
    }

    /// True when the frame currently shares the parent's session
    pub async fn is_same_origin(&self) -> bool {
        matches!(*self.mode.lock().await, FrameMode::SameOrigin { .. })
    }

    async fn detect(
        parent: &PageCtx,
        host: &Element,
        factory: &TransportFactory,
    ) -> Result<(String, FrameMode)> {
        let result = parent
            .call(
                "DOM.describeNode",
                json!({ "backendNodeId": host.backend_id(), "depth": 0, "pierce": true }),
            )
            .await?;
        let described: DescribeNodeResponse = serde_json::from_value(result)?;
        let node = described.node;
        let frame_id = node.frame_id.clone().unwrap_or_default();

        if let Some(doc) = node.content_document {
            debug!(frame_id = %frame_id, "Frame is same-origin");
            return Ok((
                frame_id,
                FrameMode::SameOrigin {
                    doc_backend_id: doc.backend_node_id,
                },
            ));
        }
        if frame_id.is_empty() {
            return Err(Error::internal("frame host has neither contentDocument nor frameId"));
        }
        debug!(frame_id = %frame_id, "Frame is cross-origin, attaching own transport");
        let transport = (factory)(frame_id.clone()).await?;
        Ok((frame_id, FrameMode::CrossOrigin { transport }))
    }

    /// The two mode-flip signals ride the immediate queue so a flip is
    /// noticed even while normal handlers are busy.
    async fn subscribe(&self) {
        let flag = Arc::clone(&self.needs_rebind);
        let frame_id = self.frame_id.clone();
        let handler = crate::event_handler!(move |params: serde_json::Value| {
            let flag = Arc::clone(&flag);
            let frame_id = frame_id.clone();
            async move {
                let detached_id = params
                    .get("frameId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if detached_id.is_empty() || detached_id == frame_id {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        });
        self.parent
            .transport
            .set_callback("Page.frameDetached", handler, true)
            .await;

        let mode = self.mode.lock().await;
        if let FrameMode::CrossOrigin { transport } = &*mode {
            transport
                .set_callback("Inspector.detached", Self::detach_handler(&self.needs_rebind), true)
                .await;
        }
    }

    fn detach_handler(flag: &Arc<AtomicBool>) -> crate::cdp::driver::EventHandler {
        let flag = Arc::clone(flag);
        crate::event_handler!(move |_params: serde_json::Value| {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, Ordering::SeqCst);
            }
        })
    }

    /// Re-describe the host and re-bind the mode. The host element's
    /// backend id stays valid in the parent document across the flip.
    pub async fn rebind(&self) -> Result<()> {
        let mut mode = self.mode.lock().await;
        if let FrameMode::CrossOrigin { transport } = &*mode {
            transport.set_reconnecting(true);
            transport.stop().await;
        }
        let (frame_id, new_mode) = Self::detect(&self.parent, &self.host, &self.factory).await?;
        if frame_id != self.frame_id {
            warn!(
                old = %self.frame_id, new = %frame_id,
                "Frame id changed across rebind"
            );
        }
        if let FrameMode::CrossOrigin { transport } = &new_mode {
            transport
                .set_callback("Inspector.detached", Self::detach_handler(&self.needs_rebind), true)
                .await;
        }
        *mode = new_mode;
        self.needs_rebind.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn current_mode(&self) -> Result<FrameMode> {
        if self.needs_rebind.swap(false, Ordering::SeqCst) {
            debug!(frame_id = %self.frame_id, "Frame mode flip pending, rebinding");
            self.rebind().await?;
        }
        Ok(self.mode.lock().await.clone())
    }

    /// Context the frame's operations run in: the parent session for a
    /// same-origin frame, the frame's own session otherwise.
    async fn ctx(&self) -> Result<PageCtx> {
        match self.current_mode().await? {
            FrameMode::SameOrigin { .. } => Ok(self.parent.clone()),
            FrameMode::CrossOrigin { transport } => Ok(PageCtx {
                transport,
                timeouts: self.parent.timeouts.clone(),
                settings: self.parent.settings.clone(),
            }),
        }
    }

    /// The frame's document element.
    pub async fn doc_element(&self) -> Result<Element> {
        match self.current_mode().await? {
            FrameMode::SameOrigin { doc_backend_id } => {
                Ok(Element::from_backend_id(self.parent.clone(), doc_backend_id))
            }
            FrameMode::CrossOrigin { transport } => {
                let ctx = PageCtx {
                    transport: Arc::clone(&transport),
                    timeouts: self.parent.timeouts.clone(),
                    settings: self.parent.settings.clone(),
                };
                let result = ctx.call("DOM.getDocument", json!({ "depth": 0 })).await?;
                let root: crate::cdp::types::GetDocumentResponse = serde_json::from_value(result)?;
                Ok(Element::from_backend_id(ctx, root.root.backend_node_id))
            }
        }
    }

    /// Find the first element in the frame document.
    pub async fn ele(&self, locator: &str, timeout: Option<Duration>) -> Result<Element> {
        match self.current_mode().await? {
            FrameMode::SameOrigin { .. } => {
                let doc = self.doc_element().await?;
                doc.ele(locator, timeout).await
            }
            FrameMode::CrossOrigin { transport } => {
                let timeout = timeout.unwrap_or_else(|| self.parent.timeouts.base_duration());
                let selector = Locator::parse(locator)?.to_selector();
                let hits =
                    locator::search_in_page(&transport, &selector, Some(1), true, timeout)
                        .await?;
                let ctx = self.ctx().await?;
                match hits.node_ids.first() {
                    Some(&node_id) => Element::from_node_id(ctx, node_id).await,
                    None => Err(Error::element_not_found(locator)),
                }
            }
        }
    }

    /// Find all elements in the frame document.
    pub async fn eles(&self, locator: &str, timeout: Option<Duration>) -> Result<Vec<Element>> {
        match self.current_mode().await? {
            FrameMode::SameOrigin { .. } => {
                let doc = self.doc_element().await?;
                doc.eles(locator, timeout).await
            }
            FrameMode::CrossOrigin { transport } => {
                let timeout = timeout.unwrap_or_else(|| self.parent.timeouts.base_duration());
                let selector = Locator::parse(locator)?.to_selector();
                let hits =
                    locator::search_in_page(&transport, &selector, None, true, timeout)
                        .await?;
                let ctx = self.ctx().await?;
                let mut out = Vec::with_capacity(hits.node_ids.len());
                for node_id in hits.node_ids {
                    out.push(Element::from_node_id(ctx.clone(), node_id).await?);
                }
                Ok(out)
            }
        }
    }

    /// Run JavaScript with `this` bound to the frame's document element.
    pub async fn run_js(
        &self,
        script: &str,
        args: &[serde_json::Value],
        as_expr: bool,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        self.doc_element().await?.run_js(script, args, as_expr, timeout).await
    }

    /// Current document URL of the frame
    pub async fn url(&self) -> Result<String> {
        let value = self
            .run_js("return this.ownerDocument ? this.ownerDocument.URL : this.baseURI;", &[], false, None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Outer HTML of the frame document
    pub async fn html(&self) -> Result<String> {
        self.doc_element().await?.html().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockTransport;
    use crate::config::Timeouts;
    use crate::settings::Settings;

    fn ctx(mock: &Arc<MockTransport>) -> PageCtx {
        PageCtx {
            transport: mock.clone() as Arc<dyn Transport>,
            timeouts: Timeouts::default(),
            settings: Settings::default(),
        }
    }

    fn unused_factory() -> TransportFactory {
        Arc::new(|_| Box::pin(async { Err(Error::internal("factory must not be called")) }))
    }

    fn mock_factory(mock: Arc<MockTransport>) -> TransportFactory {
        Arc::new(move |_| {
            let mock = mock.clone();
            Box::pin(async move { Ok(mock as Arc<dyn Transport>) })
        })
    }

    fn iframe_same_origin() -> serde_json::Value {
        json!({ "node": {
            "nodeId": 3, "backendNodeId": 30, "nodeType": 1,
            "nodeName": "IFRAME", "localName": "iframe", "nodeValue": "",
            "frameId": "F1",
            "contentDocument": {
                "nodeId": 0, "backendNodeId": 77, "nodeType": 9,
                "nodeName": "#document", "localName": "", "nodeValue": "",
            },
        }})
    }

    fn iframe_cross_origin() -> serde_json::Value {
        json!({ "node": {
            "nodeId": 3, "backendNodeId": 30, "nodeType": 1,
            "nodeName": "IFRAME", "localName": "iframe", "nodeValue": "",
            "frameId": "F1",
        }})
    }

    #[tokio::test]
    async fn test_same_origin_uses_parent_session() {
        let parent = MockTransport::new("page-1");
        parent.expect("DOM.describeNode", Ok(iframe_same_origin())).await;

        let host = Element::from_backend_id(ctx(&parent), 30);
        let frame = Frame::attach(ctx(&parent), host, unused_factory())
            .await
            .unwrap();

        assert!(frame.is_same_origin().await);
        assert_eq!(frame.frame_id(), "F1");
        let doc = frame.doc_element().await.unwrap();
        assert_eq!(doc.backend_id(), 77);
    }

    #[tokio::test]
    async fn test_cross_origin_attaches_own_transport() {
        let parent = MockTransport::new("page-1");
        let frame_transport = MockTransport::new("frame-1");
        parent.expect("DOM.describeNode", Ok(iframe_cross_origin())).await;

        let host = Element::from_backend_id(ctx(&parent), 30);
        let frame = Frame::attach(ctx(&parent), host, mock_factory(frame_transport.clone()))
            .await
            .unwrap();

        assert!(!frame.is_same_origin().await);
        // The flip signal was subscribed on the frame's own transport
        assert!(frame_transport.has_callback("Inspector.detached").await);
        assert!(frame_transport.is_immediate("Inspector.detached").await);
    }

    #[tokio::test]
    async fn test_frame_detached_triggers_rebind() {
        let parent = MockTransport::new("page-1");
        // First describe: cross-origin. Second describe (after the flip):
        // same-origin.
        parent.expect("DOM.describeNode", Ok(iframe_cross_origin())).await;
        let frame_transport = MockTransport::new("frame-1");

        let host = Element::from_backend_id(ctx(&parent), 30);
        let frame = Frame::attach(ctx(&parent), host, mock_factory(frame_transport.clone()))
            .await
            .unwrap();
        assert!(!frame.is_same_origin().await);

        parent.expect("DOM.describeNode", Ok(iframe_same_origin())).await;
        parent.emit("Page.frameDetached", json!({ "frameId": "F1" })).await;

        // The next operation notices the pending flip and rebinds
        let doc = frame.doc_element().await.unwrap();
        assert_eq!(doc.backend_id(), 77);
        assert!(frame.is_same_origin().await);
        // The old frame transport was stopped as part of the rebind
        assert!(!frame_transport.is_running());
    }
}
