//! Keyboard input
//!
//! Text is typed character by character through `Input.dispatchKeyEvent`
//! so page-side key listeners fire the way they would for a person.
//! File inputs never get key events; they go through
//! `DOM.setFileInputFiles`.

use super::Element;
use crate::Result;
use serde_json::json;

/// Modifier bitmask and named keys for `Input.dispatchKeyEvent`
pub mod keys {
    /// Alt modifier bit
    pub const ALT: u32 = 1;
    /// Control modifier bit
    pub const CTRL: u32 = 2;
    /// Meta / Command modifier bit
    pub const META: u32 = 4;
    /// Shift modifier bit
    pub const SHIFT: u32 = 8;

    /// A named non-printing key
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Key {
        /// DOM `key` value
        pub key: &'static str,
        /// DOM `code` value
        pub code: &'static str,
        /// Windows virtual key code
        pub vk: u32,
        /// Text produced, when any
        pub text: Option<&'static str>,
    }

    pub const ENTER: Key = Key { key: "Enter", code: "Enter", vk: 13, text: Some("\r") };
    pub const TAB: Key = Key { key: "Tab", code: "Tab", vk: 9, text: None };
    pub const BACKSPACE: Key = Key { key: "Backspace", code: "Backspace", vk: 8, text: None };
    pub const DELETE: Key = Key { key: "Delete", code: "Delete", vk: 46, text: None };
    pub const ESCAPE: Key = Key { key: "Escape", code: "Escape", vk: 27, text: None };
    pub const ARROW_UP: Key = Key { key: "ArrowUp", code: "ArrowUp", vk: 38, text: None };
    pub const ARROW_DOWN: Key = Key { key: "ArrowDown", code: "ArrowDown", vk: 40, text: None };
    pub const ARROW_LEFT: Key = Key { key: "ArrowLeft", code: "ArrowLeft", vk: 37, text: None };
    pub const ARROW_RIGHT: Key = Key { key: "ArrowRight", code: "ArrowRight", vk: 39, text: None };
    pub const HOME: Key = Key { key: "Home", code: "Home", vk: 36, text: None };
    pub const END: Key = Key { key: "End", code: "End", vk: 35, text: None };
    pub const PAGE_UP: Key = Key { key: "PageUp", code: "PageUp", vk: 33, text: None };
    pub const PAGE_DOWN: Key = Key { key: "PageDown", code: "PageDown", vk: 34, text: None };
    pub const KEY_A: Key = Key { key: "a", code: "KeyA", vk: 65, text: Some("a") };

    /// Control characters embedded in typed text that map to keys
    pub fn for_char(c: char) -> Option<Key> {
        match c {
            '\n' | '\r' => Some(ENTER),
            '\t' => Some(TAB),
            '\u{8}' => Some(BACKSPACE),
            _ => None,
        }
    }
}

impl Element {
    /// Type text into the element. With `clear_first` the existing value
    /// is selected and deleted before typing. A file input gets the text
    /// as newline-separated paths instead.
    pub async fn input(&self, text: &str, clear_first: bool) -> Result<()> {
        if self.is_file_input().await? {
            let files: Vec<&str> = text.split('\n').filter(|p| !p.is_empty()).collect();
            return self.set_files(&files).await;
        }

        self.focus().await?;
        if clear_first {
            self.clear().await?;
        }
        for c in text.chars() {
            match keys::for_char(c) {
                Some(key) => self.press(key, 0).await?,
                None => self.type_char(c).await?,
            }
        }
        Ok(())
    }

    /// Clear the element's value via select-all plus delete, so the page
    /// sees the same events a person would produce.
    pub async fn clear(&self) -> Result<()> {
        self.focus().await?;
        self.press(keys::KEY_A, keys::CTRL).await?;
        self.press(keys::DELETE, 0).await?;
        Ok(())
    }

    /// Press and release one named key.
    pub async fn press(&self, key: keys::Key, modifiers: u32) -> Result<()> {
        let down_type = if key.text.is_some() { "keyDown" } else { "rawKeyDown" };
        let mut down = json!({
            "type": down_type,
            "modifiers": modifiers,
            "key": key.key,
            "code": key.code,
            "windowsVirtualKeyCode": key.vk,
            "nativeVirtualKeyCode": key.vk,
        });
        if let Some(text) = key.text {
            // Modified keys produce no text (Ctrl+A selects, it does not type "a")
            if modifiers & (keys::CTRL | keys::ALT | keys::META) == 0 {
                down["text"] = json!(text);
                down["unmodifiedText"] = json!(text);
            }
        }
        self.ctx().call("Input.dispatchKeyEvent", down).await?;
        self.ctx()
            .call(
                "Input.dispatchKeyEvent",
                json!({
                    "type": "keyUp",
                    "modifiers": modifiers,
                    "key": key.key,
                    "code": key.code,
                    "windowsVirtualKeyCode": key.vk,
                    "nativeVirtualKeyCode": key.vk,
                }),
            )
            .await?;
        Ok(())
    }

    async fn type_char(&self, c: char) -> Result<()> {
        let text = c.to_string();
        self.ctx()
            .call(
                "Input.dispatchKeyEvent",
                json!({
                    "type": "keyDown",
                    "text": text,
                    "unmodifiedText": text,
                    "key": text,
                }),
            )
            .await?;
        self.ctx()
            .call(
                "Input.dispatchKeyEvent",
                json!({ "type": "keyUp", "key": text }),
            )
            .await?;
        Ok(())
    }

    async fn is_file_input(&self) -> Result<bool> {
        if self.tag().await? != "input" {
            return Ok(false);
        }
        Ok(self
            .attrs()
            .await?
            .get("type")
            .map(|t| t.eq_ignore_ascii_case("file"))
            .unwrap_or(false))
    }

    /// Attach local files to a file input.
    pub async fn set_files(&self, paths: &[&str]) -> Result<()> {
        self.ctx()
            .call(
                "DOM.setFileInputFiles",
                json!({ "files": paths, "backendNodeId": self.backend_id() }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdp::mock::MockTransport;
    use crate::cdp::traits::Transport;
    use crate::config::Timeouts;
    use crate::element::PageCtx;
    use crate::settings::Settings;
    use std::sync::Arc;

    fn ctx(mock: &Arc<MockTransport>) -> PageCtx {
        PageCtx {
            transport: mock.clone() as Arc<dyn Transport>,
            timeouts: Timeouts::default(),
            settings: Settings::default(),
        }
    }

    fn text_input_node() -> serde_json::Value {
        json!({ "node": {
            "nodeId": 1, "backendNodeId": 4, "nodeType": 1,
            "nodeName": "INPUT", "localName": "input", "nodeValue": "",
            "attributes": ["type", "text", "name", "q"],
        }})
    }

    #[tokio::test]
    async fn test_typing_dispatches_per_char() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.describeNode", Ok(text_input_node())).await;
        let element = Element::from_backend_id(ctx(&mock), 4);

        element.input("hi", false).await.unwrap();

        let events = mock.calls_for("Input.dispatchKeyEvent").await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].params["text"], json!("h"));
        assert_eq!(events[2].params["text"], json!("i"));
    }

    #[tokio::test]
    async fn test_newline_becomes_enter() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.describeNode", Ok(text_input_node())).await;
        let element = Element::from_backend_id(ctx(&mock), 4);

        element.input("\n", false).await.unwrap();

        let events = mock.calls_for("Input.dispatchKeyEvent").await;
        assert_eq!(events[0].params["key"], json!("Enter"));
        assert_eq!(events[0].params["windowsVirtualKeyCode"], json!(13));
    }

    #[tokio::test]
    async fn test_clear_uses_select_all_and_delete() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.describeNode", Ok(text_input_node())).await;
        let element = Element::from_backend_id(ctx(&mock), 4);

        element.input("x", true).await.unwrap();

        let events = mock.calls_for("Input.dispatchKeyEvent").await;
        // Ctrl+A down/up, Delete down/up, then the character
        assert_eq!(events[0].params["key"], json!("a"));
        assert_eq!(events[0].params["modifiers"], json!(keys::CTRL));
        assert!(events[0].params.get("text").is_none());
        assert_eq!(events[2].params["key"], json!("Delete"));
        assert_eq!(events[4].params["text"], json!("x"));
    }

    #[tokio::test]
    async fn test_file_input_gets_paths_not_keys() {
        let mock = MockTransport::new("t1");
        mock.expect("DOM.describeNode", Ok(json!({ "node": {
            "nodeId": 1, "backendNodeId": 4, "nodeType": 1,
            "nodeName": "INPUT", "localName": "input", "nodeValue": "",
            "attributes": ["type", "file"],
        }})))
        .await;
        let element = Element::from_backend_id(ctx(&mock), 4);

        element.input("/tmp/a.txt\n/tmp/b.txt", false).await.unwrap();

        let calls = mock.calls_for("DOM.setFileInputFiles").await;
        assert_eq!(calls[0].params["files"], json!(["/tmp/a.txt", "/tmp/b.txt"]));
        assert!(mock.calls_for("Input.dispatchKeyEvent").await.is_empty());
    }
}
