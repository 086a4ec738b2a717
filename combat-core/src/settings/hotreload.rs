//! Hot-reload of the combat settings file.
//!
//! - Uses `notify` for filesystem events
//! - Validates before applying; invalid files are rejected and the previous
//!   settings stay live
//! - Publishes through the shared [`SettingsHandle`], so every consumer sees
//!   the new values on its next read

use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};

use bevy::prelude::*;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{CombatSettings, SettingsError, SettingsHandle};

/// Watches one settings file and swaps the handle when it changes.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    receiver: Mutex<Receiver<notify::Result<Event>>>,
    path: PathBuf,
    handle: SettingsHandle,
}

/// Result of processing a batch of filesystem events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReloadOutcome {
    Applied,
    Rejected(String),
}

impl SettingsWatcher {
    pub fn watch(path: impl Into<PathBuf>, handle: SettingsHandle) -> Result<Self, SettingsError> {
        let path = path.into();
        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(tx)?;

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        info!("Settings hot-reload enabled for {:?}", path);

        Ok(Self {
            _watcher: watcher,
            receiver: Mutex::new(rx),
            path,
            handle,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drain pending events. Returns the outcome of the last reload attempt,
    /// or `None` if nothing touched the watched file.
    pub fn poll(&self) -> Option<ReloadOutcome> {
        let receiver = self.receiver.lock();
        let mut outcome = None;

        while let Ok(result) = receiver.try_recv() {
            match result {
                Ok(event) if is_settings_modify_event(&event, &self.path) => {
                    outcome = Some(self.reload());
                }
                Ok(_) => {}
                Err(e) => warn!("Settings watcher error: {}", e),
            }
        }

        outcome
    }

    /// Read, validate and publish the file now.
    pub fn reload(&self) -> ReloadOutcome {
        match CombatSettings::load(&self.path).and_then(|s| self.handle.replace(s)) {
            Ok(()) => {
                info!("Combat settings reloaded from {:?}", self.path);
                ReloadOutcome::Applied
            }
            Err(e) => {
                error!("Combat settings reload rejected: {}", e);
                ReloadOutcome::Rejected(e.to_string())
            }
        }
    }
}

fn is_settings_modify_event(event: &Event, watched: &Path) -> bool {
    let Some(name) = watched.file_name() else {
        return false;
    };
    (event.kind.is_modify() || event.kind.is_create())
        && event.paths.iter().any(|p| p.file_name() == Some(name))
}

/// Reload bookkeeping exposed to tools.
#[derive(Resource, Debug, Default, Clone, Serialize, Deserialize)]
pub struct ReloadStatus {
    pub enabled: bool,
    pub reload_count: u32,
    pub last_reload_success: bool,
    pub last_error: Option<String>,
}

/// Fired whenever a reload is attempted.
#[derive(Event, Debug, Clone)]
pub struct SettingsReloaded {
    pub outcome: ReloadOutcome,
}

#[derive(Resource)]
struct WatcherResource(SettingsWatcher);

/// Watches `path` and republishes the [`SettingsHandle`] resource on change.
pub struct SettingsReloadPlugin {
    pub path: PathBuf,
}

impl Plugin for SettingsReloadPlugin {
    fn build(&self, app: &mut App) {
        let path = self.path.clone();
        app.init_resource::<ReloadStatus>()
            .add_event::<SettingsReloaded>()
            .add_systems(
                Startup,
                move |mut commands: Commands,
                      handle: Res<SettingsHandle>,
                      mut status: ResMut<ReloadStatus>| {
                    match SettingsWatcher::watch(path.clone(), handle.clone()) {
                        Ok(watcher) => {
                            status.enabled = true;
                            commands.insert_resource(WatcherResource(watcher));
                        }
                        Err(e) => {
                            warn!("Settings hot-reload disabled: {}", e);
                            status.enabled = false;
                        }
                    }
                },
            )
            .add_systems(Update, process_settings_changes);
    }
}

fn process_settings_changes(
    watcher: Option<Res<WatcherResource>>,
    mut status: ResMut<ReloadStatus>,
    mut events: EventWriter<SettingsReloaded>,
) {
    let Some(watcher) = watcher else {
        return;
    };
    let Some(outcome) = watcher.0.poll() else {
        return;
    };

    status.reload_count += 1;
    match &outcome {
        ReloadOutcome::Applied => {
            status.last_reload_success = true;
            status.last_error = None;
        }
        ReloadOutcome::Rejected(e) => {
            status.last_reload_success = false;
            status.last_error = Some(e.clone());
        }
    }
    events.send(SettingsReloaded { outcome });
}
