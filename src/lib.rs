//! Drover-Oxide: Chromium automation runtime over the Chrome DevTools Protocol
//!
//! This library drives a running Chromium through its debugger port:
//! connect to a browser, open and control tabs, resolve elements through
//! a locator mini-language, capture network traffic and track downloads.

pub mod error;
pub mod config;
pub mod settings;

pub mod cdp;
pub mod browser;
pub mod tab;
pub mod frame;
pub mod element;
pub mod locator;
pub mod listener;
pub mod download;
pub mod waiter;
pub mod cookies;
pub mod storage;

// Re-exports
pub use browser::Browser;
pub use config::{Config, LoadMode, Timeouts};
pub use element::Element;
pub use error::{Error, Result};
pub use frame::Frame;
pub use settings::Settings;
pub use tab::Tab;

/// Drover-Oxide library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
