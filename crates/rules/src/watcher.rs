//! Debounced hot-reload of a single policy file.
//!
//! The `notify` callback runs on the OS event thread and only forwards a
//! "reload requested" message. A tokio task owns the debounce deadline and
//! runs the reload on the blocking pool, so parsing never stalls event
//! delivery and a burst of events collapses into one reload.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::{PolicyError, Result};

/// Default quiet period before a reload fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

type ReloadFn = Arc<dyn Fn() + Send + Sync>;

/// Watches a policy file's directory and runs a reload callback after
/// changes settle.
///
/// Must be created inside a tokio runtime.
pub struct PolicyWatcher {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    shutdown: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl PolicyWatcher {
    /// Start watching `path`. The parent directory is watched rather than the
    /// file so that editors which save by renaming a temp file are seen.
    pub fn spawn<F>(path: &Path, debounce: Duration, reload: F) -> Result<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let file_name: OsString = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                PolicyError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                ))
            })?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));

        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    // Our own reads show up as access events.
                    if matches!(event.kind, EventKind::Access(_)) {
                        return;
                    }
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if relevant {
                        debug!(kind = ?event.kind, "policy file event");
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!(error = %e, "policy watcher error"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let shutdown = Arc::new(Notify::new());
        let task = tokio::spawn(debounce_loop(
            rx,
            Arc::clone(&shutdown),
            debounce,
            Arc::new(reload),
        ));

        info!(path = %path.display(), debounce_ms = debounce.as_millis() as u64, "watching policy file");

        Ok(Self {
            path,
            watcher: Some(watcher),
            shutdown,
            task: Some(task),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop watching. Once this returns no further reload will run; a reload
    /// that was already executing has finished. Safe to call more than once.
    pub async fn close(&mut self) {
        self.watcher.take();
        self.shutdown.notify_one();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(path = %self.path.display(), error = %e, "policy watcher task failed");
            }
            info!(path = %self.path.display(), "stopped watching policy file");
        }
    }
}

impl Drop for PolicyWatcher {
    fn drop(&mut self) {
        self.watcher.take();
        self.shutdown.notify_one();
    }
}

async fn debounce_loop(
    mut rx: mpsc::UnboundedReceiver<()>,
    shutdown: Arc<Notify>,
    debounce: Duration,
    reload: ReloadFn,
) {
    let mut deadline: Option<Instant> = None;
    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => break,

            msg = rx.recv() => match msg {
                // Re-arm: the newest event pushes the reload out again.
                Some(()) => deadline = Some(Instant::now() + debounce),
                None => break,
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                deadline = None;
                let reload = Arc::clone(&reload);
                if let Err(e) = tokio::task::spawn_blocking(move || (*reload)()).await {
                    warn!(error = %e, "policy reload panicked");
                }
            }
        }
    }
}
