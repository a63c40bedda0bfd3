//! Page-level element search
//!
//! Runs a compiled selector through the DOM domain's search protocol:
//! `DOM.performSearch` → `DOM.getSearchResults` → `DOM.discardSearchResults`,
//! looping until the deadline when nothing matches yet.

use crate::cdp::traits::Transport;
use crate::locator::Selector;
use crate::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Matched node ids for one search pass.
#[derive(Debug, Clone, Default)]
pub struct SearchHit {
    /// Session-scoped node ids, in document order
    pub node_ids: Vec<i64>,
}

/// Per-call timeout for the individual search commands.
const STEP_TIMEOUT: Duration = Duration::from_secs(10);
/// Sleep between search passes.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Search the page for a selector, retrying until `timeout` elapses.
///
/// `index` is 1-based; negative counts from the end; `None` returns all
/// matches. Text and comment nodes are rejected when `ele_only` is set.
pub async fn search_in_page(
    transport: &Arc<dyn Transport>,
    selector: &Selector,
    index: Option<i64>,
    ele_only: bool,
    timeout: Duration,
) -> Result<SearchHit> {
    let deadline = Instant::now() + timeout;
    loop {
        let hit = search_once(transport, selector, ele_only).await?;
        if !hit.node_ids.is_empty() {
            return Ok(SearchHit {
                node_ids: slice_matches(hit.node_ids, index),
            });
        }
        if Instant::now() >= deadline {
            return Ok(SearchHit::default());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// One pass of the search protocol. Always discards the search id.
async fn search_once(
    transport: &Arc<dyn Transport>,
    selector: &Selector,
    ele_only: bool,
) -> Result<SearchHit> {
    let result = transport
        .call(
            "DOM.performSearch",
            json!({
                "query": selector.value,
                "includeUserAgentShadowDOM": true,
            }),
            STEP_TIMEOUT,
        )
        .await?;

    let search_id = result
        .get("searchId")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let count = result.get("resultCount").and_then(|v| v.as_i64()).unwrap_or(0);
    debug!("Search for {:?} matched {} nodes", selector.value, count);

    if count == 0 {
        discard(transport, &search_id).await;
        return Ok(SearchHit::default());
    }

    let results = transport
        .call(
            "DOM.getSearchResults",
            json!({
                "searchId": search_id,
                "fromIndex": 0,
                "toIndex": count,
            }),
            STEP_TIMEOUT,
        )
        .await;
    discard(transport, &search_id).await;

    let node_ids: Vec<i64> = results?
        .get("nodeIds")
        .and_then(|v| v.as_array())
        .map(|ids| ids.iter().filter_map(|v| v.as_i64()).filter(|&id| id != 0).collect())
        .unwrap_or_default();

    if !ele_only {
        return Ok(SearchHit { node_ids });
    }

    let mut elements = Vec::with_capacity(node_ids.len());
    for node_id in node_ids {
        let described = transport
            .call("DOM.describeNode", json!({ "nodeId": node_id }), STEP_TIMEOUT)
            .await;
        let node_type = described
            .ok()
            .and_then(|v| v.pointer("/node/nodeType").and_then(|t| t.as_i64()))
            .unwrap_or(0);
        if node_type == 1 {
            elements.push(node_id);
        }
    }
    Ok(SearchHit { node_ids: elements })
}

async fn discard(transport: &Arc<dyn Transport>, search_id: &str) {
    if search_id.is_empty() {
        return;
    }
    let _ = transport
        .call(
            "DOM.discardSearchResults",
            json!({ "searchId": search_id }),
            STEP_TIMEOUT,
        )
        .await;
}

/// Apply 1-based (or negative) index selection to the matched list.
fn slice_matches(node_ids: Vec<i64>, index: Option<i64>) -> Vec<i64> {
    match index {
        None => node_ids,
        Some(i) => {
            let len = node_ids.len() as i64;
            let pos = if i > 0 { i - 1 } else { len + i };
            if pos < 0 || pos >= len {
                Vec::new()
            } else {
                vec![node_ids[pos as usize]]
            }
        }
    }
}
