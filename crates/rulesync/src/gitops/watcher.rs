//! Turns edits in the config directory into sync triggers.
//!
//! The watcher runs `notify` on its own thread and publishes a
//! [`ConfigChangeEvent`] on a broadcast channel for every YAML file that was
//! written or removed. The scheduler is the usual subscriber; anything else
//! holding a [`ConfigWatcher::sender`] can request a cycle by sending
//! [`ConfigChangeEvent::requested`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use serde::Serialize;
use tokio::sync::broadcast;

use super::error::{ConfigError, Result};
use super::loader::ConfigLoader;

const DEBOUNCE: Duration = Duration::from_millis(500);
const POLL: Duration = Duration::from_millis(100);
const CHANNEL_CAPACITY: usize = 64;

/// What happened to trigger a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A YAML file was created or rewritten.
    Written,
    Removed,
    /// A cycle was asked for without a file change.
    Requested,
}

/// A reason to run a reconciliation cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChangeEvent {
    pub kind: ChangeKind,
    /// Path relative to the config directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// `Kind namespace/name` of the resource in the file, when it still parses.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl ConfigChangeEvent {
    pub fn requested() -> Self {
        Self {
            kind: ChangeKind::Requested,
            path: None,
            resource: None,
        }
    }
}

impl std::fmt::Display for ConfigChangeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.path, &self.resource) {
            (Some(path), Some(resource)) => {
                write!(f, "{:?} {} ({})", self.kind, path.display(), resource)
            }
            (Some(path), None) => write!(f, "{:?} {}", self.kind, path.display()),
            _ => write!(f, "{:?}", self.kind),
        }
    }
}

/// Watches a config directory on a background thread.
pub struct ConfigWatcher {
    config_dir: PathBuf,
    sender: broadcast::Sender<ConfigChangeEvent>,
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ConfigWatcher {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            config_dir: config_dir.into(),
            sender,
            shutdown: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChangeEvent> {
        self.sender.subscribe()
    }

    /// A sender for pushing triggers into the same channel.
    pub fn sender(&self) -> broadcast::Sender<ConfigChangeEvent> {
        self.sender.clone()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Installs the file system watch and starts forwarding events.
    ///
    /// Fails if the watch cannot be installed, for example when the config
    /// directory does not exist. Calling it on a running watcher is a no-op.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer: Debouncer<RecommendedWatcher> =
            new_debouncer(DEBOUNCE, tx).map_err(|e| ConfigError::WatchError(e.to_string()))?;
        debouncer
            .watcher()
            .watch(&self.config_dir, RecursiveMode::Recursive)
            .map_err(|e| ConfigError::WatchError(e.to_string()))?;

        log::info!("Watching {} for changes", self.config_dir.display());

        self.shutdown.store(false, Ordering::Release);
        let config_dir = self.config_dir.clone();
        let sender = self.sender.clone();
        let shutdown = Arc::clone(&self.shutdown);

        self.handle = Some(std::thread::spawn(move || {
            // Dropping the debouncer removes the watch.
            let _debouncer = debouncer;
            while !shutdown.load(Ordering::Acquire) {
                match rx.recv_timeout(POLL) {
                    Ok(Ok(events)) => {
                        for event in events {
                            if let Some(change) = classify(&config_dir, &event) {
                                log::debug!("Config change: {}", change);
                                // No subscriber just means nobody is listening yet.
                                let _ = sender.send(change);
                            }
                        }
                    }
                    Ok(Err(e)) => log::warn!("Watch error on {}: {}", config_dir.display(), e),
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::info!("Stopped watching {}", config_dir.display());
        }));
        Ok(())
    }

    /// Stops the background thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Config watcher thread panicked");
            }
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Maps a debounced file event to a trigger. Non-YAML files and anything
/// below a hidden directory (`.git`, editor swap dirs) are ignored.
fn classify(config_dir: &Path, event: &DebouncedEvent) -> Option<ConfigChangeEvent> {
    let path = &event.path;
    if !matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    ) {
        return None;
    }

    let relative = path.strip_prefix(config_dir).ok()?;
    if relative
        .components()
        .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
    {
        return None;
    }

    if !path.is_file() {
        return Some(ConfigChangeEvent {
            kind: ChangeKind::Removed,
            path: Some(relative.to_path_buf()),
            resource: None,
        });
    }

    // A file that fails to parse still triggers; the cycle reports the error.
    let resource = ConfigLoader::new(config_dir)
        .load_file(path)
        .ok()
        .map(|r| format!("{} {}", r.kind(), r.metadata().key()));

    Some(ConfigChangeEvent {
        kind: ChangeKind::Written,
        path: Some(relative.to_path_buf()),
        resource,
    })
}
