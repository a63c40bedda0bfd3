//! Element and ShadowRoot model
//!
//! Elements are transient views into the live DOM: a triple of
//! `(node_id, object_id, backend_id)` against one page transport. Any of
//! the three identifiers suffices to reconstruct the others; equality is
//! by backend id, which stays stable across document re-fetches.

mod click;
mod input;
mod rect;
mod shadow;
mod states;
mod text;
mod waits;

pub use click::{Click, ClickMode, MouseButton};
pub use input::keys;
pub use rect::ElementRect;
pub use shadow::ShadowRoot;
pub use states::ElementStates;
pub use text::node_text;
pub use waits::ElementWaits;

use crate::cdp::traits::Transport;
use crate::cdp::types::{DescribeNodeResponse, Node};
use crate::config::Timeouts;
use crate::locator::{relative_selector, By, Locator, Selector};
use crate::settings::Settings;
use crate::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Shared page context handed to every element resolved on a page.
#[derive(Debug, Clone)]
pub struct PageCtx {
    /// Transport of the owning tab or cross-origin frame
    pub transport: Arc<dyn Transport>,
    /// Tab-scoped timeouts, resolved at call time
    pub timeouts: Timeouts,
    /// Behaviour flags
    pub settings: Settings,
}

impl PageCtx {
    /// CDP call with the base timeout
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.transport
            .call(method, params, self.timeouts.base_duration())
            .await
    }

    /// CDP call with the script timeout
    pub async fn call_script(&self, method: &str, params: Value) -> Result<Value> {
        self.transport
            .call(method, params, self.timeouts.script_duration())
            .await
    }
}

/// A DOM element handle
#[derive(Debug, Clone)]
pub struct Element {
    ctx: PageCtx,
    backend_id: i64,
    ids: Arc<Mutex<CachedIds>>,
}

#[derive(Debug, Default)]
struct CachedIds {
    node_id: Option<i64>,
    object_id: Option<String>,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.backend_id == other.backend_id
            && self.ctx.transport.target_id() == other.ctx.transport.target_id()
    }
}

impl Element {
    /// Build from a backend node id.
    pub fn from_backend_id(ctx: PageCtx, backend_id: i64) -> Self {
        Self {
            ctx,
            backend_id,
            ids: Arc::new(Mutex::new(CachedIds::default())),
        }
    }

    /// Build from a session-scoped node id, resolving the backend id.
    pub async fn from_node_id(ctx: PageCtx, node_id: i64) -> Result<Self> {
        let result = ctx
            .call("DOM.describeNode", json!({ "nodeId": node_id }))
            .await?;
        let described: DescribeNodeResponse = serde_json::from_value(result)?;
        let element = Self::from_backend_id(ctx, described.node.backend_node_id);
        element.ids.lock().await.node_id = Some(node_id);
        Ok(element)
    }

    /// Build from a JavaScript remote object id.
    pub async fn from_object_id(ctx: PageCtx, object_id: String) -> Result<Self> {
        let result = ctx
            .call("DOM.describeNode", json!({ "objectId": object_id }))
            .await?;
        let described: DescribeNodeResponse = serde_json::from_value(result)?;
        let element = Self::from_backend_id(ctx, described.node.backend_node_id);
        element.ids.lock().await.object_id = Some(object_id);
        Ok(element)
    }

    /// Stable backend node id; the identity of this handle.
    pub fn backend_id(&self) -> i64 {
        self.backend_id
    }

    /// Page context this element was resolved on
    pub fn ctx(&self) -> &PageCtx {
        &self.ctx
    }

    /// Remote object id, resolving it from the backend id when missing.
    pub async fn object_id(&self) -> Result<String> {
        {
            let ids = self.ids.lock().await;
            if let Some(id) = &ids.object_id {
                return Ok(id.clone());
            }
        }
        let result = self
            .ctx
            .call(
                "DOM.resolveNode",
                json!({ "backendNodeId": self.backend_id }),
            )
            .await?;
        let object_id = result
            .pointer("/object/objectId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::element_lost(format!("backend id {}", self.backend_id)))?
            .to_string();
        self.ids.lock().await.object_id = Some(object_id.clone());
        Ok(object_id)
    }

    /// Session-scoped node id, pushing the node when missing.
    pub async fn node_id(&self) -> Result<i64> {
        {
            let ids = self.ids.lock().await;
            if let Some(id) = ids.node_id {
                return Ok(id);
            }
        }
        let object_id = self.object_id().await?;
        let result = self
            .ctx
            .call("DOM.requestNode", json!({ "objectId": object_id }))
            .await?;
        let node_id = result
            .get("nodeId")
            .and_then(|v| v.as_i64())
            .filter(|&id| id != 0)
            .ok_or_else(|| Error::element_lost(format!("backend id {}", self.backend_id)))?;
        self.ids.lock().await.node_id = Some(node_id);
        Ok(node_id)
    }

    /// Drop cached ids so the next access re-resolves them.
    pub async fn invalidate_ids(&self) {
        let mut ids = self.ids.lock().await;
        ids.node_id = None;
        ids.object_id = None;
    }

    /// Run a closure once, and once more after an id refresh when the
    /// failure says the handle went stale.
    async fn with_refresh<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match op().await {
            Err(e) if e.is_stale_handle() => {
                debug!("Stale handle for backend id {}, refreshing", self.backend_id);
                self.invalidate_ids().await;
                op().await
            }
            other => other,
        }
    }

    /// Describe this node, optionally with the whole subtree.
    pub async fn describe(&self, depth: i64) -> Result<Node> {
        let result = self
            .with_refresh(|| async move {
                self.ctx
                    .call(
                        "DOM.describeNode",
                        json!({ "backendNodeId": self.backend_id, "depth": depth, "pierce": false }),
                    )
                    .await
            })
            .await?;
        let described: DescribeNodeResponse = serde_json::from_value(result)?;
        Ok(described.node)
    }

    /// Lowercase tag name
    pub async fn tag(&self) -> Result<String> {
        Ok(self.describe(0).await?.local_name.to_ascii_lowercase())
    }

    /// Outer HTML
    pub async fn html(&self) -> Result<String> {
        let result = self
            .with_refresh(|| async move {
                self.ctx
                    .call("DOM.getOuterHTML", json!({ "backendNodeId": self.backend_id }))
                    .await
            })
            .await?;
        Ok(result
            .get("outerHTML")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Inner HTML
    pub async fn inner_html(&self) -> Result<String> {
        let value = self.run_js("return this.innerHTML;", &[], false, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// All attributes as a map
    pub async fn attrs(&self) -> Result<HashMap<String, String>> {
        let node = self.describe(0).await?;
        let mut map = HashMap::new();
        if let Some(attrs) = node.attributes {
            for pair in attrs.chunks_exact(2) {
                map.insert(pair[0].clone(), pair[1].clone());
            }
        }
        Ok(map)
    }

    /// One attribute. `href` and `src` come back absolutized against the
    /// document base.
    pub async fn attr(&self, name: &str) -> Result<Option<String>> {
        let value = match self.attrs().await?.remove(name) {
            Some(v) => v,
            None => return Ok(None),
        };
        if name != "href" && name != "src" {
            return Ok(Some(value));
        }
        if url::Url::parse(&value).is_ok()
            || value.starts_with("data:")
            || value.starts_with("blob:")
            || value.starts_with("javascript:")
        {
            return Ok(Some(value));
        }
        let base = self
            .run_js("return this.ownerDocument.baseURI;", &[], false, None)
            .await?;
        let base = base.as_str().unwrap_or_default();
        match url::Url::parse(base).and_then(|b| b.join(&value)) {
            Ok(joined) => Ok(Some(joined.to_string())),
            Err(_) => Ok(Some(value)),
        }
    }

    /// A JavaScript property of the element
    pub async fn property(&self, name: &str) -> Result<Value> {
        self.run_js("return this[arguments[0]];", &[json!(name)], false, None)
            .await
    }

    /// The `value` property
    pub async fn value(&self) -> Result<Value> {
        self.property("value").await
    }

    /// Visible text, serialized with the crate's whitespace rules.
    pub async fn text(&self) -> Result<String> {
        let node = self.describe(-1).await?;
        Ok(node_text(&node))
    }

    /// The browser's own innerText
    pub async fn raw_text(&self) -> Result<String> {
        let value = self.run_js("return this.innerText;", &[], false, None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    /// Set an attribute
    pub async fn set_attr(&self, name: &str, value: &str) -> Result<()> {
        let node_id = self.node_id().await?;
        self.with_refresh(|| async move {
            self.ctx
                .call(
                    "DOM.setAttributeValue",
                    json!({ "nodeId": node_id, "name": name, "value": value }),
                )
                .await
        })
        .await?;
        Ok(())
    }

    /// Remove an attribute
    pub async fn remove_attr(&self, name: &str) -> Result<()> {
        self.run_js("this.removeAttribute(arguments[0]);", &[json!(name)], false, None)
            .await?;
        Ok(())
    }

    /// Set a JavaScript property
    pub async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.run_js(
            "this[arguments[0]] = arguments[1];",
            &[json!(name), value],
            false,
            None,
        )
        .await?;
        Ok(())
    }

    /// Set one inline style property
    pub async fn set_style(&self, name: &str, value: &str) -> Result<()> {
        self.run_js(
            "this.style.setProperty(arguments[0], arguments[1]);",
            &[json!(name), json!(value)],
            false,
            None,
        )
        .await?;
        Ok(())
    }

    /// Set the value property and fire input/change events
    pub async fn set_value(&self, value: &str) -> Result<()> {
        self.run_js(
            "this.value = arguments[0];\
             this.dispatchEvent(new Event('input', {bubbles: true}));\
             this.dispatchEvent(new Event('change', {bubbles: true}));",
            &[json!(value)],
            false,
            None,
        )
        .await?;
        Ok(())
    }

    /// Set innerHTML
    pub async fn set_inner_html(&self, html: &str) -> Result<()> {
        self.run_js("this.innerHTML = arguments[0];", &[json!(html)], false, None)
            .await?;
        Ok(())
    }

    /// Focus the element, falling back to a JS focus call.
    pub async fn focus(&self) -> Result<()> {
        let direct = self
            .ctx
            .call("DOM.focus", json!({ "backendNodeId": self.backend_id }))
            .await;
        if direct.is_ok() {
            return Ok(());
        }
        self.run_js("this.focus();", &[], false, None).await?;
        Ok(())
    }

    /// Run JavaScript with `this` bound to the element.
    ///
    /// With `as_expr` the script is treated as a single expression whose
    /// value is returned; otherwise it is a function body (use `return`).
    /// Arguments are available as `arguments[0..]`.
    pub async fn run_js(
        &self,
        script: &str,
        args: &[Value],
        as_expr: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.call_function(script, args, as_expr, false, timeout).await
    }

    /// Like [`Element::run_js`] but awaits a returned promise.
    pub async fn run_async_js(
        &self,
        script: &str,
        args: &[Value],
        as_expr: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        self.call_function(script, args, as_expr, true, timeout).await
    }

    async fn call_function(
        &self,
        script: &str,
        args: &[Value],
        as_expr: bool,
        await_promise: bool,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let declaration = if as_expr {
            format!("function(){{return ({});}}", script)
        } else {
            format!("function(){{{}}}", script)
        };
        let arguments: Vec<Value> = args.iter().map(|a| json!({ "value": a })).collect();
        let timeout = timeout.unwrap_or_else(|| self.ctx.timeouts.script_duration());

        let result = self
            .with_refresh(|| {
                let declaration = declaration.clone();
                let arguments = arguments.clone();
                async move {
                    let object_id = self.object_id().await?;
                    self.ctx
                        .transport
                        .call(
                            "Runtime.callFunctionOn",
                            json!({
                                "functionDeclaration": declaration,
                                "objectId": object_id,
                                "arguments": arguments,
                                "returnByValue": true,
                                "awaitPromise": await_promise,
                            }),
                            timeout,
                        )
                        .await
                }
            })
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

    /// Run a function with `this` bound to the element and get the result
    /// back by reference instead of by value.
    pub(crate) async fn call_function_for_objects(
        &self,
        declaration: &str,
        args: &[Value],
    ) -> Result<Value> {
        let arguments: Vec<Value> = args.iter().map(|a| json!({ "value": a })).collect();
        let result = self
            .with_refresh(|| {
                let arguments = arguments.clone();
                async move {
                    let object_id = self.object_id().await?;
                    self.ctx
                        .call_script(
                            "Runtime.callFunctionOn",
                            json!({
                                "functionDeclaration": declaration,
                                "objectId": object_id,
                                "arguments": arguments,
                                "returnByValue": false,
                            }),
                        )
                        .await
                }
            })
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .and_then(|d| d.as_str())
                .unwrap_or("JavaScript exception");
            return Err(Error::javascript(text.to_string()));
        }
        Ok(result.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Find the first descendant matching a locator.
    pub async fn ele(&self, locator: &str, timeout: Option<Duration>) -> Result<Element> {
        let timeout = timeout.unwrap_or_else(|| self.ctx.timeouts.base_duration());
        let deadline = Instant::now() + timeout;
        let selector = relative_selector(&Locator::parse(locator)?.to_selector());
        loop {
            let found = self.query(&selector, true).await?;
            if let Some(element) = found.into_iter().next() {
                return Ok(element);
            }
            if Instant::now() >= deadline {
                return Err(Error::element_not_found(locator));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Find all descendants matching a locator.
    pub async fn eles(&self, locator: &str, timeout: Option<Duration>) -> Result<Vec<Element>> {
        let timeout = timeout.unwrap_or_else(|| self.ctx.timeouts.base_duration());
        let deadline = Instant::now() + timeout;
        let selector = relative_selector(&Locator::parse(locator)?.to_selector());
        loop {
            let found = self.query(&selector, false).await?;
            if !found.is_empty() || Instant::now() >= deadline {
                return Ok(found);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Run a compiled selector under this element.
    pub(crate) async fn query(&self, selector: &Selector, single: bool) -> Result<Vec<Element>> {
        let declaration = match (selector.by, single) {
            (By::XPath, true) => {
                "function(p){return document.evaluate(p, this, null, 9, null).singleNodeValue;}"
            }
            (By::XPath, false) => {
                "function(p){const r = document.evaluate(p, this, null, 7, null);\
                 const out = [];\
                 for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i));\
                 return out;}"
            }
            (By::Css, true) => "function(p){return this.querySelector(p);}",
            (By::Css, false) => "function(p){return Array.from(this.querySelectorAll(p));}",
        };
        let result = self
            .call_function_for_objects(declaration, &[json!(selector.value)])
            .await?;

        if single {
            match result.get("objectId").and_then(|v| v.as_str()) {
                Some(object_id) => Ok(vec![
                    Element::from_object_id(self.ctx.clone(), object_id.to_string()).await?,
                ]),
                None => Ok(Vec::new()),
            }
        } else {
            let array_id = match result.get("objectId").and_then(|v| v.as_str()) {
                Some(id) => id.to_string(),
                None => return Ok(Vec::new()),
            };
            let props = self
                .ctx
                .call(
                    "Runtime.getProperties",
                    json!({ "objectId": array_id, "ownProperties": true }),
                )
                .await?;
            let mut elements = Vec::new();
            if let Some(entries) = props.get("result").and_then(|v| v.as_array()) {
                for entry in entries {
                    let is_index = entry
                        .get("name")
                        .and_then(|n| n.as_str())
                        .map(|n| n.chars().all(|c| c.is_ascii_digit()))
                        .unwrap_or(false);
                    if !is_index {
                        continue;
                    }
                    if let Some(object_id) = entry.pointer("/value/objectId").and_then(|v| v.as_str())
                    {
                        elements.push(
                            Element::from_object_id(self.ctx.clone(), object_id.to_string())
                                .await?,
                        );
                    }
                }
            }
            Ok(elements)
        }
    }

    /// A relative of this element along an XPath axis.
    async fn relative(&self, axis: &str, filter: Option<&str>, index: i64) -> Result<Element> {
        let inner = match filter {
            Some(locator) => match Locator::parse(locator)?.to_selector() {
                Selector { by: By::XPath, value } => {
                    // Strip the leading descendant axis off the compiled form
                    let cond = value.trim_start_matches("//");
                    format!("{}::{}", axis, cond)
                }
                Selector { by: By::Css, .. } => {
                    return Err(Error::locator(format!(
                        "relative lookup on axis {} needs an xpath-expressible locator: {}",
                        axis, locator
                    )))
                }
            },
            None => format!("{}::*", axis),
        };
        let xpath = format!("({})[{}]", inner, index.max(1));
        let found = self.query(&Selector::xpath(xpath), true).await?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| Error::element_not_found(format!("{}::{:?}", axis, filter)))
    }

    /// Parent element, `level` hops up.
    pub async fn parent(&self, level: i64) -> Result<Element> {
        let xpath = format!("({})", vec![".."; level.max(1) as usize].join("/"));
        let found = self.query(&Selector::xpath(xpath), true).await?;
        found
            .into_iter()
            .next()
            .ok_or_else(|| Error::element_not_found("parent"))
    }

    /// Nth child element (1-based), optionally filtered.
    pub async fn child(&self, filter: Option<&str>, index: i64) -> Result<Element> {
        self.relative("child", filter, index).await
    }

    /// All child elements, optionally filtered.
    pub async fn children(&self, filter: Option<&str>) -> Result<Vec<Element>> {
        match filter {
            None => self.query(&Selector::xpath("child::*"), false).await,
            Some(f) => {
                let one = self.relative("child", filter, 1).await;
                match one {
                    Ok(_) => {
                        let selector = match Locator::parse(f)?.to_selector() {
                            Selector { by: By::XPath, value } => Selector::xpath(format!(
                                "child::{}",
                                value.trim_start_matches("//")
                            )),
                            other => other,
                        };
                        self.query(&selector, false).await
                    }
                    Err(Error::ElementNotFound(_)) => Ok(Vec::new()),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Next sibling element
    pub async fn next(&self, filter: Option<&str>, index: i64) -> Result<Element> {
        self.relative("following-sibling", filter, index).await
    }

    /// Previous sibling element
    pub async fn prev(&self, filter: Option<&str>, index: i64) -> Result<Element> {
        self.relative("preceding-sibling", filter, index).await
    }

    /// Any node after this one in document order
    pub async fn after(&self, filter: Option<&str>, index: i64) -> Result<Element> {
        self.relative("following", filter, index).await
    }

    /// Any node before this one in document order
    pub async fn before(&self, filter: Option<&str>, index: i64) -> Result<Element> {
        self.relative("preceding", filter, index).await
    }

    /// All following siblings
    pub async fn nexts(&self, filter: Option<&str>) -> Result<Vec<Element>> {
        self.relatives("following-sibling", filter).await
    }

    /// All preceding siblings
    pub async fn prevs(&self, filter: Option<&str>) -> Result<Vec<Element>> {
        self.relatives("preceding-sibling", filter).await
    }

    /// All following nodes
    pub async fn afters(&self, filter: Option<&str>) -> Result<Vec<Element>> {
        self.relatives("following", filter).await
    }

    /// All preceding nodes
    pub async fn befores(&self, filter: Option<&str>) -> Result<Vec<Element>> {
        self.relatives("preceding", filter).await
    }

    async fn relatives(&self, axis: &str, filter: Option<&str>) -> Result<Vec<Element>> {
        let xpath = match filter {
            None => format!("{}::*", axis),
            Some(locator) => match Locator::parse(locator)?.to_selector() {
                Selector { by: By::XPath, value } => {
                    format!("{}::{}", axis, value.trim_start_matches("//"))
                }
                Selector { by: By::Css, .. } => {
                    return Err(Error::locator(format!(
                        "relative lookup on axis {} needs an xpath-expressible locator: {}",
                        axis, locator
                    )))
                }
            },
        };
        self.query(&Selector::xpath(xpath), false).await
    }

    /// The topmost element at this element's click point.
    pub async fn over(&self) -> Result<Element> {
        let point = self.rect().viewport_click_point().await?;
        self.element_at_point(point.0, point.1).await
    }

    /// The element at an offset from this element's top-left corner.
    pub async fn offset(&self, x: f64, y: f64) -> Result<Element> {
        let location = self.rect().viewport_location().await?;
        self.element_at_point(location.0 + x, location.1 + y).await
    }

    /// Nearest element in a compass direction, by pixel offset.
    pub async fn east(&self, pixels: f64) -> Result<Element> {
        let mid = self.rect().viewport_midpoint().await?;
        self.element_at_point(mid.0 + pixels, mid.1).await
    }

    /// See [`Element::east`]
    pub async fn west(&self, pixels: f64) -> Result<Element> {
        let mid = self.rect().viewport_midpoint().await?;
        self.element_at_point(mid.0 - pixels, mid.1).await
    }

    /// See [`Element::east`]
    pub async fn south(&self, pixels: f64) -> Result<Element> {
        let mid = self.rect().viewport_midpoint().await?;
        self.element_at_point(mid.0, mid.1 + pixels).await
    }

    /// See [`Element::east`]
    pub async fn north(&self, pixels: f64) -> Result<Element> {
        let mid = self.rect().viewport_midpoint().await?;
        self.element_at_point(mid.0, mid.1 - pixels).await
    }

    /// Element at a viewport point, via `DOM.getNodeForLocation`.
    pub(crate) async fn element_at_point(&self, x: f64, y: f64) -> Result<Element> {
        let result = self
            .ctx
            .call(
                "DOM.getNodeForLocation",
                json!({ "x": x as i64, "y": y as i64, "includeUserAgentShadowDOM": false }),
            )
            .await?;
        let backend_id = result
            .get("backendNodeId")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::element_not_found(format!("no node at ({}, {})", x, y)))?;
        Ok(Element::from_backend_id(self.ctx.clone(), backend_id))
    }

    /// Geometry accessors
    pub fn rect(&self) -> ElementRect<'_> {
        ElementRect::new(self)
    }

    /// State queries
    pub fn states(&self) -> ElementStates<'_> {
        ElementStates::new(self)
    }

    /// Click actions
    pub fn click(&self) -> Click<'_> {
        Click::new(self)
    }

    /// Named waits
    pub fn wait(&self) -> ElementWaits<'_> {
        ElementWaits::new(self)
    }

    /// The element's shadow root, if it hosts one.
    pub async fn shadow_root(&self) -> Result<ShadowRoot> {
        let result = self
            .ctx
            .call(
                "DOM.describeNode",
                json!({ "backendNodeId": self.backend_id, "depth": 0, "pierce": true }),
            )
            .await?;
        let described: DescribeNodeResponse = serde_json::from_value(result)?;
        let root = described
            .node
            .shadow_roots
            .and_then(|mut roots| if roots.is_empty() { None } else { Some(roots.remove(0)) })
            .ok_or_else(|| Error::element_not_found("element hosts no shadow root"))?;
        Ok(ShadowRoot::new(
            Element::from_backend_id(self.ctx.clone(), root.backend_node_id),
            self.clone(),
        ))
    }

    /// Scroll the element into view.
    pub async fn scroll_into_view(&self) -> Result<()> {
        let direct = self
            .ctx
            .call(
                "DOM.scrollIntoViewIfNeeded",
                json!({ "backendNodeId": self.backend_id }),
            )
            .await;
        if direct.is_ok() {
            return Ok(());
        }
        self.run_js(
            "this.scrollIntoView({block: 'center', inline: 'center'});",
            &[],
            false,
            None,
        )
        .await?;
        Ok(())
    }

    /// Hover the pointer over the element, optionally at an offset from
    /// its top-left corner.
    pub async fn hover(&self, offset: Option<(f64, f64)>) -> Result<()> {
        let (x, y) = match offset {
            Some((dx, dy)) => {
                let loc = self.rect().viewport_location().await?;
                (loc.0 + dx, loc.1 + dy)
            }
            None => self.rect().viewport_click_point().await?,
        };
        self.ctx
            .call(
                "Input.dispatchMouseEvent",
                json!({ "type": "mouseMoved", "x": x, "y": y }),
            )
            .await?;
        Ok(())
    }

    /// Drag the element by a pixel delta over `duration`.
    pub async fn drag(&self, dx: f64, dy: f64, duration: Duration) -> Result<()> {
        let (x, y) = self.rect().viewport_click_point().await?;
        self.drag_between((x, y), (x + dx, y + dy), duration).await
    }

    /// Drag the element onto another element's click point.
    pub async fn drag_to(&self, target: &Element, duration: Duration) -> Result<()> {
        let from = self.rect().viewport_click_point().await?;
        let to = target.rect().viewport_click_point().await?;
        self.drag_between(from, to, duration).await
    }

    async fn drag_between(&self, from: (f64, f64), to: (f64, f64), duration: Duration) -> Result<()> {
        self.ctx
            .call(
                "Input.dispatchMouseEvent",
                json!({ "type": "mousePressed", "x": from.0, "y": from.1, "button": "left", "clickCount": 1 }),
            )
            .await?;
        let steps = 20u32;
        let pause = duration / steps;
        for i in 1..=steps {
            let t = f64::from(i) / f64::from(steps);
            let x = from.0 + (to.0 - from.0) * t;
            let y = from.1 + (to.1 - from.1) * t;
            self.ctx
                .call(
                    "Input.dispatchMouseEvent",
                    json!({ "type": "mouseMoved", "x": x, "y": y, "button": "left" }),
                )
                .await?;
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        self.ctx
            .call(
                "Input.dispatchMouseEvent",
                json!({ "type": "mouseReleased", "x": to.0, "y": to.1, "button": "left", "clickCount": 1 }),
            )
            .await?;
        Ok(())
    }

    /// Raw content of the element's `src` resource. Understands `data:`
    /// and `blob:` URLs; everything else goes through the page's resource
    /// cache.
    pub async fn src(&self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let src = self
            .attr("src")
            .await?
            .ok_or_else(|| Error::no_resource("element has no src attribute"))?;

        if let Some(rest) = src.strip_prefix("data:") {
            let payload = rest.split_once(',').map(|(_, p)| p).unwrap_or(rest);
            return if rest.contains(";base64,") {
                BASE64
                    .decode(payload)
                    .map_err(|e| Error::no_resource(format!("bad data url: {}", e)))
            } else {
                Ok(urlencoding::decode(payload)
                    .map(|s| s.into_owned().into_bytes())
                    .unwrap_or_else(|_| payload.as_bytes().to_vec()))
            };
        }

        if src.starts_with("blob:") {
            let value = self
                .run_async_js(
                    "const res = await fetch(arguments[0]);\
                     const buf = await res.arrayBuffer();\
                     return btoa(String.fromCharCode(...new Uint8Array(buf)));",
                    &[json!(src)],
                    false,
                    timeout,
                )
                .await?;
            let encoded = value.as_str().unwrap_or_default();
            return BASE64
                .decode(encoded)
                .map_err(|e| Error::no_resource(format!("bad blob content: {}", e)));
        }

        let frame = self
            .ctx
            .call("Page.getFrameTree", json!({}))
            .await?
            .pointer("/frameTree/frame/id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let result = self
            .ctx
            .transport
            .call(
                "Page.getResourceContent",
                json!({ "frameId": frame, "url": src }),
                timeout.unwrap_or_else(|| self.ctx.timeouts.base_duration()),
            )
            .await?;
        let content = result
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::no_resource(format!("no content for {}", src)))?;
        if result
            .get("base64Encoded")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            BASE64
                .decode(content)
                .map_err(|e| Error::no_resource(format!("bad resource body: {}", e)))
        } else {
            Ok(content.as_bytes().to_vec())
        }
    }

    /// Save the element's `src` resource to a file. Returns the path
    /// written. With `rename` unset the name from the URL is kept.
    pub async fn save(
        &self,
        folder: &Path,
        rename: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<std::path::PathBuf> {
        let bytes = self.src(timeout).await?;
        let name = match rename {
            Some(name) => name.to_string(),
            None => {
                let src = self.attr("src").await?.unwrap_or_default();
                src.rsplit('/')
                    .next()
                    .map(|n| n.split('?').next().unwrap_or(n).to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| "resource".to_string())
            }
        };
        tokio::fs::create_dir_all(folder).await?;
        let path = folder.join(name);
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    /// Screenshot of just this element.
    pub async fn get_screenshot(&self) -> Result<Vec<u8>> {
        self.scroll_into_view().await?;
        let (x, y) = self.rect().location().await?;
        let (width, height) = self.rect().size().await?;
        let result = self
            .ctx
            .call(
                "Page.captureScreenshot",
                json!({
                    "format": "png",
                    "clip": { "x": x, "y": y, "width": width, "height": height, "scale": 1 },
                    "captureBeyondViewport": true,
                }),
            )
            .await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::no_resource("no data in screenshot result"))?;
        BASE64
            .decode(data)
            .map_err(|e| Error::no_resource(format!("bad screenshot payload: {}", e)))
    }
}

/// Sentinel handle returned when nothing matched and the raise flag is
/// off. Deep accesses fail with `ElementNotFound`; existence checks stay
/// cheap.
#[derive(Debug, Clone)]
pub struct NoneElement {
    locator: String,
}

impl NoneElement {
    /// Record which locator produced nothing
    pub fn new<S: Into<String>>(locator: S) -> Self {
        Self { locator: locator.into() }
    }

    /// Always false
    pub fn exists(&self) -> bool {
        false
    }

    /// The locator that found nothing
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Any deep access surfaces the original miss.
    pub fn raise(&self) -> Error {
        Error::element_not_found(self.locator.clone())
    }
}

/// Either a real element or the none sentinel.
#[derive(Debug, Clone)]
pub enum MaybeElement {
    /// A resolved element
    Found(Element),
    /// Nothing matched
    None(NoneElement),
}

impl MaybeElement {
    /// True when an element was found
    pub fn exists(&self) -> bool {
        matches!(self, MaybeElement::Found(_))
    }

    /// Unwrap into a result
    pub fn into_result(self) -> Result<Element> {
        match self {
            MaybeElement::Found(e) => Ok(e),
            MaybeElement::None(n) => Err(n.raise()),
        }
    }
}
