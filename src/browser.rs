//! Browser controller
//!
//! One `Browser` per debugger address, kept in a process-global registry
//! keyed by the browser id so repeated connects hand back the same
//! instance. It owns the browser-level CDP session, keeps the live
//! target list current through `Target.setDiscoverTargets`, builds and
//! caches [`Tab`] handles on demand, and hosts the download manager.

use crate::cdp::connect::{browser_id_from_ws_url, is_user_page, Endpoint};
use crate::cdp::driver::Driver;
use crate::cdp::traits::Transport;
use crate::cdp::types::TargetInfo;
use crate::config::Config;
use crate::cookies::{normalize_cookies, Cookie};
use crate::download::{DownloadManager, OwnerResolver};
use crate::frame::TransportFactory;
use crate::settings::Settings;
use crate::tab::Tab;
use crate::{waiter, Error, Result};
use futures::FutureExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Chromium ships a hidden extension page for audio focus; it is never a
/// user tab.
const AUDIO_HELPER_EXT: &str = "neajdppkdcdipfabeoofebfddakdcjhd";

const CDP_TIMEOUT: Duration = Duration::from_secs(10);
const TAB_APPEAR_POLL: Duration = Duration::from_millis(50);

fn registry() -> &'static StdMutex<HashMap<String, Arc<Browser>>> {
    static REGISTRY: OnceLock<StdMutex<HashMap<String, Arc<Browser>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| StdMutex::new(HashMap::new()))
}

/// Controller for one running browser
pub struct Browser {
    browser_id: String,
    config: Config,
    transport: RwLock<Arc<dyn Transport>>,
    factory: TransportFactory,
    endpoint: Option<Endpoint>,
    /// Live user-page target ids in creation order; the last entry is
    /// the newest-tab watermark
    targets: Arc<StdMutex<Vec<String>>>,
    infos: StdMutex<HashMap<String, TargetInfo>>,
    openers: Arc<StdMutex<HashMap<String, String>>>,
    frames: Arc<StdMutex<HashMap<String, String>>>,
    tabs: Mutex<HashMap<String, Arc<Tab>>>,
    downloads: Arc<DownloadManager>,
}

impl std::fmt::Debug for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Browser")
            .field("browser_id", &self.browser_id)
            .field("address", &self.config.address)
            .finish()
    }
}

impl Browser {
    /// Connect to the browser at `config.address`, reusing a live
    /// instance for the same browser id.
    pub async fn connect(config: Config) -> Result<Arc<Browser>> {
        let endpoint = Endpoint::new(&config.address)?;
        let ws_url = endpoint
            .wait_ready(Duration::from_secs_f64(config.connect_timeout))
            .await?;
        let browser_id = browser_id_from_ws_url(&ws_url);

        if let Some(existing) = registry()
            .lock()
            .map_err(|_| Error::internal("browser registry lock poisoned"))?
            .get(&browser_id)
        {
            return Ok(Arc::clone(existing));
        }

        let driver = Driver::connect(browser_id.clone(), ws_url).await?;
        let factory_endpoint = endpoint.clone();
        let factory: TransportFactory = Arc::new(move |target_id: String| {
            let endpoint = factory_endpoint.clone();
            async move {
                let url = endpoint.page_ws_url(&target_id);
                let driver = Driver::connect(target_id, url).await?;
                Ok(driver as Arc<dyn Transport>)
            }
            .boxed()
        });

        let browser = Self::attach(
            config,
            browser_id.clone(),
            driver as Arc<dyn Transport>,
            factory,
            Some(endpoint),
        )
        .await?;

        registry()
            .lock()
            .map_err(|_| Error::internal("browser registry lock poisoned"))?
            .insert(browser_id, Arc::clone(&browser));
        Ok(browser)
    }

    /// Wire a controller onto an already-open browser session. `connect`
    /// is the usual entry point; this one exists for composing with a
    /// custom transport.
    pub async fn attach(
        config: Config,
        browser_id: String,
        transport: Arc<dyn Transport>,
        factory: TransportFactory,
        endpoint: Option<Endpoint>,
    ) -> Result<Arc<Browser>> {
        let targets = Arc::new(StdMutex::new(Vec::new()));
        let openers = Arc::new(StdMutex::new(HashMap::new()));
        let frames = Arc::new(StdMutex::new(HashMap::new()));

        let downloads = DownloadManager::attach(
            Arc::clone(&transport),
            owner_resolver(&targets, &frames, &openers),
            std::env::temp_dir().join(format!("drover-{}", browser_id)),
            config
                .download_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(".")),
        )
        .await?;

        let browser = Arc::new(Browser {
            browser_id,
            config,
            transport: RwLock::new(transport),
            factory,
            endpoint,
            targets,
            infos: StdMutex::new(HashMap::new()),
            openers,
            frames,
            tabs: Mutex::new(HashMap::new()),
            downloads,
        });
        browser.bootstrap().await?;
        info!(browser_id = %browser.browser_id, "Browser connected");
        Ok(browser)
    }

    /// Subscribe target bookkeeping and seed the live target list.
    async fn bootstrap(self: &Arc<Self>) -> Result<()> {
        let transport = self.transport().await;

        let this = Arc::downgrade(self);
        transport
            .set_callback(
                "Target.targetCreated",
                crate::event_handler!(move |params: Value| {
                    let this = this.clone();
                    async move {
                        if let Some(browser) = this.upgrade() {
                            browser.on_target_created(&params["targetInfo"]).await;
                        }
                    }
                }),
                false,
            )
            .await;

        let this = Arc::downgrade(self);
        transport
            .set_callback(
                "Target.targetInfoChanged",
                crate::event_handler!(move |params: Value| {
                    let this = this.clone();
                    async move {
                        if let Some(browser) = this.upgrade() {
                            browser.on_target_info_changed(&params["targetInfo"]);
                        }
                    }
                }),
                false,
            )
            .await;

        let this = Arc::downgrade(self);
        transport
            .set_callback(
                "Target.targetDestroyed",
                crate::event_handler!(move |params: Value| {
                    let this = this.clone();
                    async move {
                        if let Some(browser) = this.upgrade() {
                            if let Some(id) = params["targetId"].as_str() {
                                browser.on_target_destroyed(id).await;
                            }
                        }
                    }
                }),
                false,
            )
            .await;

        transport
            .call(
                "Target.setDiscoverTargets",
                json!({ "discover": true }),
                CDP_TIMEOUT,
            )
            .await?;

        let result = transport
            .call("Target.getTargets", json!({}), CDP_TIMEOUT)
            .await?;
        if let Some(infos) = result["targetInfos"].as_array() {
            for info in infos {
                self.on_target_created(info).await;
            }
        }
        Ok(())
    }

    async fn on_target_created(&self, info: &Value) {
        let Ok(info) = serde_json::from_value::<TargetInfo>(info.clone()) else {
            return;
        };
        if !is_user_page(&info) {
            return;
        }
        {
            let mut targets = lock(&self.targets);
            if targets.contains(&info.target_id) {
                return;
            }
            targets.push(info.target_id.clone());
        }
        debug!(target_id = %info.target_id, url = %info.url, "Target appeared");
        if let Some(opener) = &info.opener_id {
            lock(&self.openers).insert(info.target_id.clone(), opener.clone());
        }
        // The main frame id of a page equals its target id
        lock(&self.frames).insert(info.target_id.clone(), info.target_id.clone());
        lock(&self.infos).insert(info.target_id.clone(), info);
    }

    fn on_target_info_changed(&self, info: &Value) {
        let Ok(info) = serde_json::from_value::<TargetInfo>(info.clone()) else {
            return;
        };
        if lock(&self.targets).contains(&info.target_id) {
            lock(&self.infos).insert(info.target_id.clone(), info);
        }
    }

    async fn on_target_destroyed(&self, target_id: &str) {
        lock(&self.targets).retain(|id| id != target_id);
        lock(&self.infos).remove(target_id);
        // The opener relation survives so downloads begun by a closed
        // popup still resolve to the tab that opened it
        lock(&self.frames).retain(|_, tab| tab.as_str() != target_id);
        if let Some(tab) = self.tabs.lock().await.remove(target_id) {
            tab.disconnect().await;
        }
        self.downloads.forget_tab(target_id).await;
        debug!(target_id = %target_id, "Target destroyed");
    }

    /// Browser id derived from the debugger WebSocket URL
    pub fn browser_id(&self) -> &str {
        &self.browser_id
    }

    /// Download manager shared by every tab of this browser
    pub fn downloads(&self) -> &Arc<DownloadManager> {
        &self.downloads
    }

    /// Browser-level transport (swapped on reconnect)
    pub async fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&*self.transport.read().await)
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.transport().await.call(method, params, CDP_TIMEOUT).await
    }

    /// Live user-page target ids, oldest first
    pub fn tab_ids(&self) -> Vec<String> {
        lock(&self.targets).clone()
    }

    /// The handle for a target id, built and cached on first use.
    pub async fn get_tab_by_id(self: &Arc<Self>, target_id: &str) -> Result<Arc<Tab>> {
        let singleton = Settings::current().singleton_tab_obj;
        if singleton {
            if let Some(tab) = self.tabs.lock().await.get(target_id) {
                return Ok(Arc::clone(tab));
            }
        }
        let transport = (self.factory)(target_id.to_string()).await?;
        let tab = Tab::attach(
            transport,
            Arc::clone(&self.factory),
            self.config.timeouts,
            self.config.load_mode,
            Settings::current(),
        )
        .await?;
        // Subframes attached on the tab's session join the frame index
        // so download owners resolve past the main frame.
        let frames = Arc::clone(&self.frames);
        let tab_id = target_id.to_string();
        tab.transport()
            .await
            .set_callback(
                "Page.frameAttached",
                crate::event_handler!(move |params: Value| {
                    let frames = Arc::clone(&frames);
                    let tab_id = tab_id.clone();
                    async move {
                        if let Some(frame_id) = params["frameId"].as_str() {
                            lock(&frames).insert(frame_id.to_string(), tab_id);
                        }
                    }
                }),
                false,
            )
            .await;
        if singleton {
            self.tabs
                .lock()
                .await
                .insert(target_id.to_string(), Arc::clone(&tab));
        }
        Ok(tab)
    }

    fn filtered_ids(
        &self,
        title: Option<&str>,
        url: Option<&str>,
        tab_types: &[&str],
    ) -> Vec<String> {
        let infos = lock(&self.infos);
        lock(&self.targets)
            .iter()
            .filter(|id| {
                let Some(info) = infos.get(*id) else {
                    return false;
                };
                if !tab_types.contains(&info.r#type.as_str()) {
                    return false;
                }
                if info.url.contains(AUDIO_HELPER_EXT) {
                    return false;
                }
                if title.is_some_and(|t| !info.title.contains(t)) {
                    return false;
                }
                !url.is_some_and(|u| !info.url.contains(u))
            })
            .cloned()
            .collect()
    }

    /// Pick a tab by 1-based position (negative counts from the newest
    /// end) and/or title/url substring and tab-type filters.
    pub async fn get_tab(
        self: &Arc<Self>,
        index: Option<i64>,
        title: Option<&str>,
        url: Option<&str>,
        tab_types: &[&str],
    ) -> Result<Arc<Tab>> {
        let types = if tab_types.is_empty() {
            &["page"][..]
        } else {
            tab_types
        };
        let ids = self.filtered_ids(title, url, types);
        if ids.is_empty() {
            return Err(Error::browser_connect("no tab matches the filters"));
        }
        let picked = match index {
            None => &ids[0],
            Some(0) => {
                return Err(Error::configuration("tab index is 1-based, 0 is invalid"))
            }
            Some(n) if n > 0 => ids
                .get(n as usize - 1)
                .ok_or_else(|| Error::configuration(format!("no tab at index {}", n)))?,
            Some(n) => {
                let back = (-n) as usize;
                if back > ids.len() {
                    return Err(Error::configuration(format!("no tab at index {}", n)));
                }
                &ids[ids.len() - back]
            }
        };
        self.get_tab_by_id(picked).await
    }

    /// Every tab passing the filters, oldest first.
    pub async fn get_tabs(
        self: &Arc<Self>,
        title: Option<&str>,
        url: Option<&str>,
        tab_types: &[&str],
    ) -> Result<Vec<Arc<Tab>>> {
        let types = if tab_types.is_empty() {
            &["page"][..]
        } else {
            tab_types
        };
        let mut tabs = Vec::new();
        for id in self.filtered_ids(title, url, types) {
            tabs.push(self.get_tab_by_id(&id).await?);
        }
        Ok(tabs)
    }

    /// Open a tab, optionally in a new window, in the background, or in
    /// a fresh browser context. Falls back to `window.open` from an
    /// existing tab when `Target.createTarget` is refused (incognito
    /// profiles do that).
    pub async fn new_tab(
        self: &Arc<Self>,
        url: Option<&str>,
        new_window: bool,
        background: bool,
        new_context: bool,
    ) -> Result<Arc<Tab>> {
        let url = url.unwrap_or("about:blank");
        let watermark = lock(&self.targets).last().cloned();

        let mut params = json!({ "url": url });
        if new_window {
            params["newWindow"] = json!(true);
        }
        if background {
            params["background"] = json!(true);
        }
        if new_context {
            let result = self
                .call("Target.createBrowserContext", json!({}))
                .await?;
            params["browserContextId"] = result["browserContextId"].clone();
        }

        match self.call("Target.createTarget", params).await {
            Ok(result) => {
                let target_id = result["targetId"]
                    .as_str()
                    .ok_or_else(|| Error::browser_connect("createTarget returned no id"))?
                    .to_string();
                self.wait_for_target(&target_id).await?;
                self.get_tab_by_id(&target_id).await
            }
            Err(e) => {
                warn!("Target.createTarget refused ({}), using window.open", e);
                let opener_id = watermark
                    .clone()
                    .ok_or_else(|| Error::browser_connect("no tab to open from"))?;
                let opener = self.get_tab_by_id(&opener_id).await?;
                opener
                    .run_js(&format!("window.open('{}');", url), &[], true, None)
                    .await?;
                let target_id = self.wait_for_watermark(watermark.as_deref()).await?;
                self.get_tab_by_id(&target_id).await
            }
        }
    }

    async fn wait_for_target(&self, target_id: &str) -> Result<()> {
        let deadline = Instant::now() + self.config.timeouts.base_duration();
        loop {
            if lock(&self.targets).iter().any(|id| id == target_id) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::browser_connect(format!(
                    "new tab {} never announced itself",
                    target_id
                )));
            }
            tokio::time::sleep(TAB_APPEAR_POLL).await;
        }
    }

    async fn wait_for_watermark(&self, before: Option<&str>) -> Result<String> {
        let deadline = Instant::now() + self.config.timeouts.base_duration();
        loop {
            let newest = lock(&self.targets).last().cloned();
            if let Some(newest) = newest {
                if Some(newest.as_str()) != before {
                    return Ok(newest);
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::browser_connect("window.open produced no new tab"));
            }
            tokio::time::sleep(TAB_APPEAR_POLL).await;
        }
    }

    /// Wait for a tab newer than the current watermark and hand back its
    /// target id.
    pub async fn wait_new_tab(
        &self,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<Option<String>> {
        let before = lock(&self.targets).last().cloned();
        let before = before.as_deref();
        let timeout = timeout.unwrap_or_else(|| self.config.timeouts.base_duration());
        let newest = waiter::wait_for_value(
            || async move {
                lock(&self.targets)
                    .last()
                    .cloned()
                    .filter(|id| Some(id.as_str()) != before)
            },
            timeout,
            TAB_APPEAR_POLL,
        )
        .await;
        if newest.is_none() && Settings::current().resolve_raise(raise) {
            return Err(Error::wait_timeout("no new tab appeared"));
        }
        Ok(newest)
    }

    /// Arm a tab for its next download and wait for it to begin. With
    /// `cancel_it` the download is refused at the browser instead and
    /// `None` comes back once that has happened.
    pub async fn wait_download_begin(
        &self,
        tab_id: &str,
        cancel_it: bool,
        timeout: Option<Duration>,
        raise: Option<bool>,
    ) -> Result<Option<Arc<crate::download::DownloadMission>>> {
        self.downloads.arm(tab_id, !cancel_it).await;
        let timeout = timeout.unwrap_or_else(|| self.config.timeouts.base_duration());
        if cancel_it {
            // The flag is consumed the moment a download is refused
            waiter::wait_for(
                || async move { !self.downloads.armed(tab_id).await },
                timeout,
                TAB_APPEAR_POLL,
                Settings::current().resolve_raise(raise),
                "download begin",
            )
            .await?;
            return Ok(None);
        }
        let mission = waiter::wait_for_value(
            || async move { self.downloads.take_mission(tab_id).await },
            timeout,
            TAB_APPEAR_POLL,
        )
        .await;
        if mission.is_none() && Settings::current().resolve_raise(raise) {
            return Err(Error::wait_timeout("no download began"));
        }
        Ok(mission)
    }

    /// Wait until no download of a tab (or of the whole browser) is still
    /// running. On timeout the stragglers are optionally canceled.
    pub async fn wait_downloads_done(
        &self,
        tab_id: Option<&str>,
        timeout: Option<Duration>,
        cancel_if_timeout: bool,
    ) -> Result<bool> {
        let timeout = timeout.unwrap_or_else(|| self.config.timeouts.base_duration());
        let done = waiter::wait_for(
            || async move { self.downloads.running(tab_id).await == 0 },
            timeout,
            TAB_APPEAR_POLL,
            false,
            "downloads done",
        )
        .await?;
        if !done && cancel_if_timeout {
            self.downloads.cancel_running(tab_id).await?;
        }
        Ok(done)
    }

    /// Bring a tab to the front.
    pub async fn activate_tab(&self, target_id: &str) -> Result<()> {
        self.call("Target.activateTarget", json!({ "targetId": target_id }))
            .await?;
        Ok(())
    }

    /// Close tabs by id, or everything but them. Closing every live tab
    /// quits the browser instead.
    pub async fn close_tabs(self: &Arc<Self>, ids: &[String], others: bool) -> Result<()> {
        let all = self.tab_ids();
        let to_close: Vec<String> = if others {
            all.iter().filter(|id| !ids.contains(id)).cloned().collect()
        } else {
            ids.to_vec()
        };
        if all.iter().all(|id| to_close.contains(id)) {
            return self.quit(Duration::from_secs(5), false, false).await;
        }
        let transport = self.transport().await;
        for id in to_close {
            transport
                .call(
                    "Target.closeTarget",
                    json!({ "targetId": id }),
                    Duration::ZERO,
                )
                .await?;
        }
        Ok(())
    }

    /// Browser-wide cookies. With `all_info` false, each entry is the
    /// `{name, value, domain}` projection.
    pub async fn cookies(&self, all_info: bool) -> Result<Vec<Value>> {
        let result = self.call("Storage.getCookies", json!({})).await?;
        let raw = result["cookies"].as_array().cloned().unwrap_or_default();
        if all_info {
            return Ok(raw);
        }
        let mut brief = Vec::with_capacity(raw.len());
        for value in raw {
            let cookie: Cookie = serde_json::from_value(value)?;
            brief.push(cookie.brief());
        }
        Ok(brief)
    }

    /// Install cookies browser-wide. Accepts the formats of
    /// [`normalize_cookies`].
    pub async fn set_cookies(&self, input: &Value) -> Result<()> {
        let cookies = normalize_cookies(input)?;
        self.call(
            "Storage.setCookies",
            json!({ "cookies": serde_json::to_value(cookies)? }),
        )
        .await?;
        Ok(())
    }

    /// Drop every cookie in the browser.
    pub async fn clear_cookies(&self) -> Result<()> {
        self.call("Storage.clearCookies", json!({})).await?;
        Ok(())
    }

    /// Product string, e.g. "Chrome/126.0.6478.63"
    pub async fn version(&self) -> Result<String> {
        let result = self.call("Browser.getVersion", json!({})).await?;
        Ok(result["product"].as_str().unwrap_or_default().to_string())
    }

    /// Browser-level user agent
    pub async fn user_agent(&self) -> Result<String> {
        let result = self.call("Browser.getVersion", json!({})).await?;
        Ok(result["userAgent"].as_str().unwrap_or_default().to_string())
    }

    /// Shut the browser down. `force` kills lingering browser processes,
    /// `del_data` removes the auto-created user-data directory.
    pub async fn quit(self: &Arc<Self>, timeout: Duration, force: bool, del_data: bool) -> Result<()> {
        let transport = self.transport().await;

        let pids: Vec<i64> = if force {
            match transport
                .call("SystemInfo.getProcessInfo", json!({}), CDP_TIMEOUT)
                .await
            {
                Ok(result) => result["processInfo"]
                    .as_array()
                    .map(|list| list.iter().filter_map(|p| p["id"].as_i64()).collect())
                    .unwrap_or_default(),
                Err(_) => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let _ = transport
            .call("Browser.close", json!({}), Duration::ZERO)
            .await;

        for (_, tab) in self.tabs.lock().await.drain() {
            tab.disconnect().await;
        }
        transport.set_reconnecting(true);
        transport.stop().await;

        if force && !pids.is_empty() {
            tokio::time::sleep(timeout).await;
            for pid in pids {
                kill_process(pid);
            }
        }

        if del_data {
            if let Some(dir) = &self.config.user_data_dir {
                remove_dir_retrying(dir).await;
            }
        }

        if let Ok(mut reg) = registry().lock() {
            reg.remove(&self.browser_id);
        }
        info!(browser_id = %self.browser_id, "Browser quit");
        Ok(())
    }

    /// Tear down and rebuild the browser-level session over the same
    /// debugger address, re-seeding the target index.
    pub async fn reconnect(self: &Arc<Self>) -> Result<()> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| Error::configuration("no debugger endpoint to reconnect through"))?;

        {
            let transport = self.transport().await;
            transport.set_reconnecting(true);
            transport.stop().await;
        }
        for (_, tab) in self.tabs.lock().await.drain() {
            tab.disconnect().await;
        }
        lock(&self.targets).clear();
        lock(&self.infos).clear();
        lock(&self.openers).clear();
        lock(&self.frames).clear();

        let ws_url = endpoint
            .wait_ready(Duration::from_secs_f64(self.config.connect_timeout))
            .await?;
        let driver = Driver::connect(self.browser_id.clone(), ws_url).await?;
        *self.transport.write().await = driver as Arc<dyn Transport>;
        self.bootstrap().await?;
        info!(browser_id = %self.browser_id, "Browser reconnected");
        Ok(())
    }
}

/// Poisoned std mutexes only happen after a panic in a handler; carry on
/// with the inner data either way.
fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn owner_resolver(
    targets: &Arc<StdMutex<Vec<String>>>,
    frames: &Arc<StdMutex<HashMap<String, String>>>,
    openers: &Arc<StdMutex<HashMap<String, String>>>,
) -> OwnerResolver {
    let targets = Arc::clone(targets);
    let frames = Arc::clone(frames);
    let openers = Arc::clone(openers);
    Arc::new(move |frame_id| {
        if lock(&targets).iter().any(|id| id == frame_id) {
            return Some(frame_id.to_string());
        }
        if let Some(tab) = lock(&frames).get(frame_id) {
            return Some(tab.clone());
        }
        lock(&openers).get(frame_id).cloned()
    })
}

#[cfg(unix)]
fn kill_process(pid: i64) {
    let _ = std::process::Command::new("kill")
        .args(["-9", &pid.to_string()])
        .status();
}

#[cfg(windows)]
fn kill_process(pid: i64) {
    let _ = std::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .status();
}

/// The browser releases its profile lock a moment after exiting, so
/// deletion is retried for a few seconds.
async fn remove_dir_retrying(dir: &std::path::Path) {
    for _ in 0..14 {
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => return,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
        }
    }
    warn!(dir = %dir.display(), "Could not remove user-data directory");
}
