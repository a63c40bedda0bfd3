//! Runtime behaviour flags
//!
//! The flags that used to be process-global toggles are carried as an
//! explicit [`Settings`] value threaded through `Browser` construction.
//! A process default is available for ergonomic parity.

use std::sync::{OnceLock, RwLock};

/// How a raised JavaScript dialog is answered without an explicit
/// `handle_alert` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoAlertMode {
    /// Leave the dialog open for an explicit `handle_alert` call
    #[default]
    Off,
    /// Accept every dialog as it opens
    Accept,
    /// Dismiss every dialog as it opens
    Dismiss,
    /// Record the dialog but do nothing else
    Close,
}

/// Behaviour flags resolved at call time by waits, lookups and clicks.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Raise `ElementNotFound` instead of returning a `NoneElement` handle
    pub raise_when_ele_not_found: bool,
    /// Raise `CanNotClick` instead of falling back to a JS click
    pub raise_when_click_failed: bool,
    /// Raise `WaitTimeout` when a wait primitive times out
    pub raise_when_wait_failed: bool,
    /// Re-lookups of a tab or frame id return the same handle
    pub singleton_tab_obj: bool,
    /// Process-wide default answer for JavaScript dialogs
    pub auto_handle_alert: AutoAlertMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            raise_when_ele_not_found: false,
            raise_when_click_failed: false,
            raise_when_wait_failed: false,
            singleton_tab_obj: true,
            auto_handle_alert: AutoAlertMode::Off,
        }
    }
}

static GLOBAL: OnceLock<RwLock<Settings>> = OnceLock::new();

fn global() -> &'static RwLock<Settings> {
    GLOBAL.get_or_init(|| RwLock::new(Settings::default()))
}

impl Settings {
    /// Snapshot of the process-wide default settings.
    pub fn current() -> Settings {
        global().read().expect("settings lock poisoned").clone()
    }

    /// Replace the process-wide default settings.
    pub fn set_current(settings: Settings) {
        *global().write().expect("settings lock poisoned") = settings;
    }

    /// Resolve a per-call override against the wait flag.
    pub fn resolve_raise(&self, per_call: Option<bool>) -> bool {
        per_call.unwrap_or(self.raise_when_wait_failed)
    }
}
