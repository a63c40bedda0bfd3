//! Element text serialization
//!
//! Walks a DOM subtree snapshot and produces the user-visible text the
//! way a reader sees it. The whitespace and block-tag rules are part of
//! the observable contract, so they are implemented here instead of
//! delegating to the browser's innerText.

use crate::cdp::types::Node;
use phf::phf_set;

/// Subtrees that never contribute text
static SKIP_TAGS: phf::Set<&'static str> = phf_set! {
    "script", "style", "video", "audio", "iframe", "embed", "noscript",
    "canvas", "template",
};

/// Tags that force a line break after their content
static BLOCK_TAGS: phf::Set<&'static str> = phf_set! {
    "p", "div", "h1", "h2", "h3", "h4", "h5", "h6", "ol", "li",
    "blockquote", "header", "footer", "address", "article", "aside",
    "main", "nav", "section", "figcaption", "summary",
};

/// Serialize the visible text of a node subtree.
pub fn node_text(node: &Node) -> String {
    let mut out = String::new();
    walk(node, false, &mut out);
    out.trim_matches(|c: char| c == ' ' || c == '\n' || c == '\t').to_string()
}

fn walk(node: &Node, in_pre: bool, out: &mut String) {
    if node.is_text() {
        if in_pre {
            out.push_str(&unescape(&node.node_value));
        } else {
            push_collapsed(&unescape(&node.node_value), out);
        }
        return;
    }
    if !node.is_element() && node.node_type != 9 && node.node_type != 11 {
        return;
    }

    let tag = node.local_name.to_ascii_lowercase();
    if SKIP_TAGS.contains(tag.as_str()) {
        return;
    }
    if tag == "br" {
        out.push('\n');
        return;
    }

    let in_pre = in_pre || tag == "pre";
    let mut prev_cell = false;
    if let Some(children) = &node.children {
        for child in children {
            let is_cell = child.is_element()
                && matches!(child.local_name.to_ascii_lowercase().as_str(), "td" | "th");
            if is_cell && prev_cell {
                out.push('\t');
            }
            walk(child, in_pre, out);
            if child.is_element() {
                prev_cell = is_cell;
            }
        }
    }

    if BLOCK_TAGS.contains(tag.as_str()) && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// Append text with runs of whitespace collapsed to single spaces.
/// A space is not doubled across node boundaries.
fn push_collapsed(text: &str, out: &mut String) {
    let mut pending_space =
        out.ends_with(|c: char| c != ' ' && c != '\n' && c != '\t') && starts_with_space(text);
    for word in text.split_whitespace() {
        if pending_space {
            out.push(' ');
        }
        out.push_str(word);
        pending_space = true;
    }
    if !text.is_empty() && text.chars().all(char::is_whitespace) {
        // Whitespace-only node: keep a single separating space.
        if out.ends_with(|c: char| c != ' ' && c != '\n' && c != '\t') {
            out.push(' ');
        }
    } else if ends_with_space(text) && !out.is_empty() && !out.ends_with(' ') && !out.ends_with('\n')
    {
        out.push(' ');
    }
}

fn starts_with_space(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_whitespace)
}

fn ends_with_space(text: &str) -> bool {
    text.chars().last().is_some_and(char::is_whitespace)
}

/// Unescape the HTML entities that survive in text content and replace
/// NBSP with a plain space.
fn unescape(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .replace('\u{a0}', " ")
}
