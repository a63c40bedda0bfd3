//! CDP (Chrome DevTools Protocol) type definitions
//!
//! Core data structures for CDP communication and the DOM-domain views
//! the element layer consumes.

use serde::{Deserialize, Serialize};

/// CDP JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    /// Request ID
    pub id: u64,
    /// Method name (e.g., "Page.navigate")
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Session ID for multi-session targets
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC notification (event)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpNotification {
    /// Event method (e.g., "Page.loadEventFired")
    pub method: String,
    /// Event parameters
    #[serde(default)]
    pub params: serde_json::Value,
    /// Session ID for multi-session targets
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// CDP JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct CdpRpcResponse {
    /// Response ID (matches request ID)
    pub id: u64,
    /// Response result
    #[serde(default)]
    pub result: serde_json::Value,
    /// Error if any
    #[serde(default)]
    pub error: Option<CdpErrorDetail>,
}

/// CDP error detail
#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorDetail {
    /// Error code
    pub code: i64,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Remote object (result of JavaScript evaluation)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RemoteObject {
    /// Object type
    #[serde(default)]
    pub r#type: String,
    /// Object subtype
    #[serde(default)]
    pub subtype: Option<String>,
    /// Object value
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Object description
    #[serde(default)]
    pub description: Option<String>,
    /// Remote object id, present for by-reference results
    #[serde(rename = "objectId", default)]
    pub object_id: Option<String>,
    /// Unserializable value
    #[serde(rename = "unserializableValue", default)]
    pub unserializable_value: Option<String>,
}

/// JavaScript evaluation response
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluateResponse {
    /// Evaluation result
    #[serde(default)]
    pub result: RemoteObject,
    /// Exception details if evaluation failed
    #[serde(rename = "exceptionDetails", default)]
    pub exception_details: Option<serde_json::Value>,
}

/// Document node as reported by the DOM domain.
///
/// `node_type` follows the DOM standard: 1 element, 3 text, 8 comment,
/// 9 document, 11 document fragment (shadow roots).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node ID (session-scoped, 0 when not pushed)
    #[serde(default)]
    pub node_id: i64,
    /// Backend ID (stable across document re-fetches)
    #[serde(default)]
    pub backend_node_id: i64,
    /// Node type
    #[serde(default)]
    pub node_type: i64,
    /// Node name (uppercase tag for elements)
    #[serde(default)]
    pub node_name: String,
    /// Local name (lowercase tag)
    #[serde(default)]
    pub local_name: String,
    /// Node value (text content for text nodes)
    #[serde(default)]
    pub node_value: String,
    /// Child node count
    #[serde(default)]
    pub child_node_count: i64,
    /// Children
    #[serde(default)]
    pub children: Option<Vec<Node>>,
    /// Flat attribute list: name, value, name, value, ...
    #[serde(default)]
    pub attributes: Option<Vec<String>>,
    /// Shadow roots hosted by this element
    #[serde(default)]
    pub shadow_roots: Option<Vec<Node>>,
    /// Content document of a same-origin frame element
    #[serde(default)]
    pub content_document: Option<Box<Node>>,
    /// Frame id owned by a frame element
    #[serde(default)]
    pub frame_id: Option<String>,
}

impl Node {
    /// Attribute value by name, from the flat name/value list.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        let attrs = self.attributes.as_ref()?;
        attrs
            .chunks_exact(2)
            .find(|pair| pair[0].eq_ignore_ascii_case(name))
            .map(|pair| pair[1].as_str())
    }

    /// True for element nodes
    pub fn is_element(&self) -> bool {
        self.node_type == 1
    }

    /// True for text nodes
    pub fn is_text(&self) -> bool {
        self.node_type == 3
    }

    /// True for comment nodes
    pub fn is_comment(&self) -> bool {
        self.node_type == 8
    }
}

/// Get document response
#[derive(Debug, Clone, Deserialize)]
pub struct GetDocumentResponse {
    /// Root node
    pub root: Node,
}

/// Describe node response
#[derive(Debug, Clone, Deserialize)]
pub struct DescribeNodeResponse {
    /// Described node
    pub node: Node,
}

/// Box model quads for an element: content, padding, border, margin.
/// Each quad is 8 numbers: x1,y1,x2,y2,x3,y3,x4,y4 clockwise from top-left.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxModel {
    /// Content box quad
    pub content: Vec<f64>,
    /// Padding box quad
    #[serde(default)]
    pub padding: Vec<f64>,
    /// Border box quad
    #[serde(default)]
    pub border: Vec<f64>,
    /// Margin box quad
    #[serde(default)]
    pub margin: Vec<f64>,
    /// Element width
    pub width: f64,
    /// Element height
    pub height: f64,
}

/// Target info as reported by Target.getTargets / targetCreated
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target ID
    pub target_id: String,
    /// Target type ("page", "iframe", "webview", ...)
    pub r#type: String,
    /// Target title
    #[serde(default)]
    pub title: String,
    /// Target URL
    #[serde(default)]
    pub url: String,
    /// Whether a session is attached
    #[serde(default)]
    pub attached: bool,
    /// Target that opened this one
    #[serde(default)]
    pub opener_id: Option<String>,
    /// Browser context the target lives in
    #[serde(default)]
    pub browser_context_id: Option<String>,
}

/// Browser version information from `/json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    /// Protocol version
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: String,
    /// Product name, e.g. "Chrome/120.0.6099.109"
    #[serde(rename = "Browser", default)]
    pub product: String,
    /// User agent
    #[serde(rename = "User-Agent", default)]
    pub user_agent: String,
    /// Browser-level WebSocket debugger URL
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cdp_request_serialization() {
        let request = CdpRequest {
            id: 1,
            method: "Page.navigate".to_string(),
            params: Some(serde_json::json!({ "url": "https://example.com" })),
            session_id: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"Page.navigate\""));
    }

    #[test]
    fn test_cdp_request_without_params() {
        let request = CdpRequest {
            id: 2,
            method: "Page.enable".to_string(),
            params: None,
            session_id: None,
        };

        let json = serde_json::to_string(&request).unwrap();
        // params should not be serialized when None
        assert!(!json.contains("\"params\""));
    }

    #[test]
    fn test_node_attribute_lookup() {
        let node = Node {
            node_type: 1,
            local_name: "div".to_string(),
            attributes: Some(vec![
                "id".to_string(),
                "main".to_string(),
                "class".to_string(),
                "a b".to_string(),
            ]),
            ..Default::default()
        };

        assert_eq!(node.attribute("id"), Some("main"));
        assert_eq!(node.attribute("class"), Some("a b"));
        assert_eq!(node.attribute("missing"), None);
        assert!(node.is_element());
    }

    #[test]
    fn test_node_deserialization() {
        let json = serde_json::json!({
            "nodeId": 4,
            "backendNodeId": 9,
            "nodeType": 3,
            "nodeName": "#text",
            "nodeValue": "hello",
        });
        let node: Node = serde_json::from_value(json).unwrap();
        assert!(node.is_text());
        assert_eq!(node.node_value, "hello");
        assert_eq!(node.backend_node_id, 9);
    }
}
