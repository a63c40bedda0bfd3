//! Download management
//!
//! Downloads are browser-wide events, not tab events, so one manager per
//! browser watches `Browser.downloadWillBegin`/`downloadProgress` and
//! routes each download to the tab that owns it. The browser is put in
//! `allowAndName` mode: Chromium writes to `<dir>/<guid>` and the
//! manager moves the finished file to its final name.

use crate::cdp::traits::Transport;
use crate::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What to do when the final file name already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileExistsPolicy {
    /// Append `_N` until the name is free
    #[default]
    Rename,
    /// Replace the existing file
    Overwrite,
    /// Cancel the download
    Skip,
}

/// Per-scope download settings; a tab inherits unset fields from the
/// browser scope.
#[derive(Debug, Clone, Default)]
pub struct DownloadSettings {
    /// Save directory
    pub path: Option<PathBuf>,
    /// Base name override for the next download
    pub rename: Option<String>,
    /// Extension override
    pub suffix: Option<String>,
    /// Conflict policy
    pub when_file_exists: FileExistsPolicy,
}

impl DownloadSettings {
    fn merged_over(&self, base: &DownloadSettings) -> DownloadSettings {
        DownloadSettings {
            path: self.path.clone().or_else(|| base.path.clone()),
            rename: self.rename.clone().or_else(|| base.rename.clone()),
            suffix: self.suffix.clone().or_else(|| base.suffix.clone()),
            when_file_exists: self.when_file_exists,
        }
    }
}

/// Where a mission is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionStatus {
    /// Bytes are flowing
    Running,
    /// File is at its final path
    Done,
    /// Browser or caller canceled it
    Canceled,
    /// Conflict policy skipped it
    Skipped,
}

impl MissionStatus {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, MissionStatus::Running)
    }
}

#[derive(Debug)]
struct MissionState {
    status: MissionStatus,
    received_bytes: u64,
    total_bytes: u64,
}

/// One tracked download
#[derive(Debug)]
pub struct DownloadMission {
    /// Browser-assigned guid
    pub guid: String,
    /// Source URL
    pub url: String,
    /// Owning scope ("browser" or a tab id)
    pub owner: String,
    /// Where the finished file will land
    pub final_path: PathBuf,
    /// Where Chromium writes while downloading
    pub tmp_path: PathBuf,
    state: Mutex<MissionState>,
}

impl DownloadMission {
    /// Current status
    pub async fn status(&self) -> MissionStatus {
        self.state.lock().await.status
    }

    /// Bytes so far and expected total
    pub async fn progress(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.received_bytes, state.total_bytes)
    }

    /// Flip to a terminal status. Returns false when already terminal.
    async fn finish(&self, status: MissionStatus) -> bool {
        let mut state = self.state.lock().await;
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        true
    }
}

/// Per-tab arming flag for `wait.download_begin`
#[derive(Debug, Clone)]
pub enum TabFlag {
    /// Take the next download
    Take,
    /// Cancel the next download on arrival
    Cancel,
    /// A mission has arrived and is waiting to be consumed
    Mission(Arc<DownloadMission>),
}

/// Maps a frame id to the tab that owns it (with opener fallback).
pub type OwnerResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Browser-wide download tracker
pub struct DownloadManager {
    transport: Arc<dyn Transport>,
    resolver: OwnerResolver,
    tmp_dir: PathBuf,
    scopes: Mutex<HashMap<String, DownloadSettings>>,
    flags: Mutex<HashMap<String, TabFlag>>,
    missions: Mutex<HashMap<String, Arc<DownloadMission>>>,
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("tmp_dir", &self.tmp_dir)
            .finish()
    }
}

const SCOPE_BROWSER: &str = "browser";

impl DownloadManager {
    /// Wire up on the browser-level transport. Puts the browser in
    /// guid-named download mode rooted at `tmp_dir`.
    pub async fn attach(
        transport: Arc<dyn Transport>,
        resolver: OwnerResolver,
        tmp_dir: PathBuf,
        default_save_path: PathBuf,
    ) -> Result<Arc<DownloadManager>> {
        let manager = Arc::new(DownloadManager {
            transport: Arc::clone(&transport),
            resolver,
            tmp_dir: tmp_dir.clone(),
            scopes: Mutex::new(HashMap::from([(
                SCOPE_BROWSER.to_string(),
                DownloadSettings {
                    path: Some(default_save_path),
                    ..DownloadSettings::default()
                },
            )])),
            flags: Mutex::new(HashMap::new()),
            missions: Mutex::new(HashMap::new()),
        });

        transport
            .call(
                "Browser.setDownloadBehavior",
                json!({
                    "behavior": "allowAndName",
                    "downloadPath": tmp_dir.to_string_lossy(),
                    "eventsEnabled": true,
                }),
                Duration::from_secs(10),
            )
            .await?;

        let this = Arc::downgrade(&manager);
        transport
            .set_callback(
                "Browser.downloadWillBegin",
                crate::event_handler!(move |params: Value| {
                    let this = this.clone();
                    async move {
                        if let Some(manager) = this.upgrade() {
                            if let Err(e) = manager.on_will_begin(params).await {
                                warn!("downloadWillBegin handling failed: {}", e);
                            }
                        }
                    }
                }),
                false,
            )
            .await;

        let this = Arc::downgrade(&manager);
        transport
            .set_callback(
                "Browser.downloadProgress",
                crate::event_handler!(move |params: Value| {
                    let this = this.clone();
                    async move {
                        if let Some(manager) = this.upgrade() {
                            manager.on_progress(params).await;
                        }
                    }
                }),
                false,
            )
            .await;

        Ok(manager)
    }

    /// Replace the settings of a scope ("browser" or a tab id).
    pub async fn set_scope(&self, scope: &str, settings: DownloadSettings) {
        self.scopes.lock().await.insert(scope.to_string(), settings);
    }

    /// Effective settings for a scope, tab fields over browser defaults.
    pub async fn settings_for(&self, scope: &str) -> DownloadSettings {
        let scopes = self.scopes.lock().await;
        let base = scopes.get(SCOPE_BROWSER).cloned().unwrap_or_default();
        match scopes.get(scope) {
            Some(own) if scope != SCOPE_BROWSER => own.merged_over(&base),
            _ => base,
        }
    }

    /// Arm capture of a tab's next download: take it or cancel it.
    pub async fn arm(&self, tab_id: &str, take: bool) {
        let flag = if take { TabFlag::Take } else { TabFlag::Cancel };
        self.flags.lock().await.insert(tab_id.to_string(), flag);
    }

    /// Whether a tab's arm flag is still waiting for a download.
    pub async fn armed(&self, tab_id: &str) -> bool {
        matches!(
            self.flags.lock().await.get(tab_id),
            Some(TabFlag::Take) | Some(TabFlag::Cancel)
        )
    }

    /// Consume a mission captured for a tab, if one has arrived.
    pub async fn take_mission(&self, tab_id: &str) -> Option<Arc<DownloadMission>> {
        let mut flags = self.flags.lock().await;
        match flags.get(tab_id) {
            Some(TabFlag::Mission(_)) => match flags.remove(tab_id) {
                Some(TabFlag::Mission(mission)) => Some(mission),
                _ => None,
            },
            _ => None,
        }
    }

    /// Missions still running for a tab (or every scope with `None`).
    pub async fn running(&self, tab_id: Option<&str>) -> usize {
        let missions = self.missions.lock().await;
        let mut count = 0;
        for mission in missions.values() {
            if tab_id.map_or(true, |id| mission.owner == id)
                && mission.status().await == MissionStatus::Running
            {
                count += 1;
            }
        }
        count
    }

    /// Cancel every still-running mission of a tab (or of every scope).
    pub async fn cancel_running(&self, tab_id: Option<&str>) -> Result<()> {
        let missions: Vec<_> = self.missions.lock().await.values().cloned().collect();
        for mission in missions {
            if tab_id.map_or(true, |id| mission.owner == id) {
                let _ = self.cancel_guid(&mission.guid).await;
                if mission.finish(MissionStatus::Canceled).await {
                    self.missions.lock().await.remove(&mission.guid);
                }
            }
        }
        Ok(())
    }

    /// Clear per-tab state when a tab goes away.
    pub async fn forget_tab(&self, tab_id: &str) {
        self.flags.lock().await.remove(tab_id);
        self.scopes.lock().await.remove(tab_id);
    }

    async fn on_will_begin(&self, params: Value) -> Result<()> {
        let guid = params
            .get("guid")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let url = params
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let suggested = params
            .get("suggestedFilename")
            .and_then(|v| v.as_str())
            .unwrap_or("download")
            .to_string();
        let frame_id = params
            .get("frameId")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let owner = (self.resolver)(frame_id).unwrap_or_else(|| SCOPE_BROWSER.to_string());
        let settings = self.settings_for(&owner).await;
        debug!(guid = %guid, owner = %owner, "Download starting: {}", suggested);

        // A one-shot cancel flag kills the download before any naming.
        {
            let mut flags = self.flags.lock().await;
            if matches!(flags.get(&owner), Some(TabFlag::Cancel)) {
                flags.remove(&owner);
                drop(flags);
                info!(guid = %guid, "Download canceled by armed flag");
                return self.cancel_guid(&guid).await;
            }
        }

        let dir = settings
            .path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir());
        let name = final_name(&suggested, settings.rename.as_deref(), settings.suffix.as_deref());
        let mut final_path = dir.join(&name);

        if final_path.exists() {
            match settings.when_file_exists {
                FileExistsPolicy::Rename => final_path = free_path(&final_path),
                FileExistsPolicy::Overwrite => {}
                FileExistsPolicy::Skip => {
                    info!(path = %final_path.display(), "Download skipped, file exists");
                    let mission = self.register(guid.clone(), url, owner, final_path).await;
                    mission.finish(MissionStatus::Skipped).await;
                    self.missions.lock().await.remove(&mission.guid);
                    return self.cancel_guid(&guid).await;
                }
            }
        }

        // rename/suffix apply to the one download they were set for
        {
            let mut scopes = self.scopes.lock().await;
            if let Some(own) = scopes.get_mut(&owner) {
                own.rename = None;
                own.suffix = None;
            }
        }

        let mission = self.register(guid, url, owner.clone(), final_path).await;

        let mut flags = self.flags.lock().await;
        if matches!(flags.get(&owner), Some(TabFlag::Take)) {
            flags.insert(owner, TabFlag::Mission(Arc::clone(&mission)));
        }
        Ok(())
    }

    async fn register(
        &self,
        guid: String,
        url: String,
        owner: String,
        final_path: PathBuf,
    ) -> Arc<DownloadMission> {
        let mission = Arc::new(DownloadMission {
            tmp_path: self.tmp_dir.join(&guid),
            guid: guid.clone(),
            url,
            owner,
            final_path,
            state: Mutex::new(MissionState {
                status: MissionStatus::Running,
                received_bytes: 0,
                total_bytes: 0,
            }),
        });
        self.missions
            .lock()
            .await
            .insert(guid, Arc::clone(&mission));
        mission
    }

    async fn on_progress(&self, params: Value) {
        let guid = params
            .get("guid")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        let mission = match self.missions.lock().await.get(guid) {
            Some(m) => Arc::clone(m),
            None => return,
        };

        {
            let mut state = mission.state.lock().await;
            state.received_bytes = params
                .get("receivedBytes")
                .and_then(|v| v.as_u64())
                .unwrap_or(state.received_bytes);
            state.total_bytes = params
                .get("totalBytes")
                .and_then(|v| v.as_u64())
                .unwrap_or(state.total_bytes);
        }

        match params.get("state").and_then(|v| v.as_str()) {
            Some("completed") => {
                let moved = place_file(&mission.tmp_path, &mission.final_path).await;
                let status = match moved {
                    Ok(()) => MissionStatus::Done,
                    Err(e) => {
                        warn!(guid = %mission.guid, "Failed to place download: {}", e);
                        MissionStatus::Canceled
                    }
                };
                if mission.finish(status).await {
                    info!(path = %mission.final_path.display(), "Download finished");
                    self.missions.lock().await.remove(&mission.guid);
                }
            }
            Some("canceled") => {
                if mission.finish(MissionStatus::Canceled).await {
                    self.missions.lock().await.remove(&mission.guid);
                }
            }
            _ => {}
        }
    }

    async fn cancel_guid(&self, guid: &str) -> Result<()> {
        self.transport
            .call(
                "Browser.cancelDownload",
                json!({ "guid": guid }),
                Duration::ZERO,
            )
            .await?;
        Ok(())
    }

    /// Wait for a mission to reach a terminal state. On timeout with
    /// `cancel_if_timeout`, the download is canceled.
    pub async fn wait_mission(
        &self,
        mission: &Arc<DownloadMission>,
        timeout: Duration,
        cancel_if_timeout: bool,
    ) -> Result<MissionStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = mission.status().await;
            if status.is_terminal() {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                if cancel_if_timeout {
                    self.cancel_guid(&mission.guid).await?;
                    mission.finish(MissionStatus::Canceled).await;
                    self.missions.lock().await.remove(&mission.guid);
                    return Ok(MissionStatus::Canceled);
                }
                return Err(Error::wait_timeout(format!(
                    "download of {} within {:?}",
                    mission.url, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Final file name from the browser suggestion plus rename/suffix
/// overrides. A rename without an extension keeps the original one.
fn final_name(suggested: &str, rename: Option<&str>, suffix: Option<&str>) -> String {
    let original_ext = Path::new(suggested)
        .extension()
        .map(|e| e.to_string_lossy().to_string());
    let mut name = match rename {
        Some(rename) => {
            if Path::new(rename).extension().is_some() {
                rename.to_string()
            } else {
                match &original_ext {
                    Some(ext) => format!("{}.{}", rename, ext),
                    None => rename.to_string(),
                }
            }
        }
        None => suggested.to_string(),
    };
    if let Some(suffix) = suffix {
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone());
        name = format!("{}.{}", stem, suffix);
    }
    name
}

/// First free `name_N.ext` style path next to an occupied one.
fn free_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    for n in 1.. {
        let candidate = match &ext {
            Some(ext) => dir.join(format!("{}_{}.{}", stem, n, ext)),
            None => dir.join(format!("{}_{}", stem, n)),
        };
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}

/// Move the finished tmp file into place. Windows keeps the file locked
/// briefly after `completed`, so the move is retried, with a copy as the
/// last resort.
async fn place_file(tmp: &Path, target: &Path) -> Result<()> {
    if let Some(dir) = target.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let mut last = None;
    for _ in 0..10 {
        match tokio::fs::rename(tmp, target).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                last = Some(e);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    match tokio::fs::copy(tmp, target).await {
        Ok(_) => {
            let _ = tokio::fs::remove_file(tmp).await;
            Ok(())
        }
        Err(_) => Err(last
            .map(Error::from)
            .unwrap_or_else(|| Error::internal("download move failed"))),
    }
}
