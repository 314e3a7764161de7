//! The polling watch loop.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{WatchConfig, format_duration};
use crate::convert::Converter;
use crate::error::Result;
use crate::snapshot::{ChangeSet, Snapshot, diff};
use crate::sync::{SyncReport, sync};

/// Lifecycle of a [`WatchLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Sleeping between polls, or not started yet.
    Idle,

    /// Enumerating and syncing.
    Polling,

    /// Cancelled; `run` has returned.
    Stopped,
}

/// Outcome of one poll.
#[derive(Debug, Clone)]
pub struct Tick {
    /// Files new or modified since the retained snapshot.
    pub changes: ChangeSet,

    /// The snapshot taken by this poll.
    pub snapshot: Snapshot,

    /// Sync result, present only when something changed.
    pub report: Option<SyncReport>,
}

/// Enumerate, diff against `previous`, and sync when anything changed.
///
/// The caller decides what to retain; [`WatchLoop::run`] keeps `tick.snapshot`
/// only when `tick.changes` is non-empty.
pub fn poll_once(
    previous: &Snapshot,
    config: &WatchConfig,
    converter: &dyn Converter,
) -> Result<Tick> {
    let snapshot = Snapshot::enumerate(&config.content_dir, config.follow_symlinks)?;
    let changes = diff(previous, &snapshot);

    let report = if changes.is_empty() {
        None
    } else {
        Some(sync(&changes, &snapshot, config, converter)?)
    };

    Ok(Tick {
        changes,
        snapshot,
        report,
    })
}

/// Delete `output_dir` with everything in it, then recreate it empty.
pub fn clean_output_dir(output_dir: &Path) -> Result<()> {
    if output_dir.exists() {
        std::fs::remove_dir_all(output_dir)?;
    }
    std::fs::create_dir_all(output_dir)?;
    Ok(())
}

/// Polls the content root on a fixed interval and mirrors changes.
pub struct WatchLoop {
    /// Configuration, fixed for the lifetime of the loop.
    config: Arc<WatchConfig>,

    /// Renders files matching the extension filter.
    converter: Arc<dyn Converter>,

    /// Current lifecycle state.
    state: Arc<RwLock<WatchState>>,
}

impl WatchLoop {
    /// Create a new watch loop. Fails if the config does not validate.
    pub fn new(config: WatchConfig, converter: Arc<dyn Converter>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            converter,
            state: Arc::new(RwLock::new(WatchState::Idle)),
        })
    }

    /// The loop's configuration.
    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> WatchState {
        *self.state.read().await
    }

    /// Run until `cancel` fires.
    ///
    /// Each iteration sleeps for the poll interval, then runs [`poll_once`]
    /// on a blocking thread. A failed poll, including one that panicked, is
    /// logged and the retained snapshot is kept, so the next poll sees the
    /// same changes again.
    pub async fn run(&self, cancel: CancellationToken) -> Result<WatchStats> {
        if self.config.clean_output_on_start {
            let output = self.config.output_dir.clone();
            tokio::task::spawn_blocking(move || clean_output_dir(&output)).await??;
            debug!("Cleaned output directory: {}", self.config.output_dir.display());
        }

        info!("Watcher activated");
        info!(
            "Watching {} recursively (every {})",
            self.config.content_dir.display(),
            format_duration(self.config.poll_interval)
        );

        let mut retained = Arc::new(Snapshot::empty());
        let mut stats = WatchStats::default();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            *self.state.write().await = WatchState::Polling;

            let config = Arc::clone(&self.config);
            let converter = Arc::clone(&self.converter);
            let previous = Arc::clone(&retained);
            let outcome = tokio::task::spawn_blocking(move || {
                poll_once(&previous, &config, converter.as_ref())
            })
            .await;

            stats.polls += 1;

            match outcome {
                Ok(Ok(tick)) if tick.changes.is_empty() => {}
                Ok(Ok(tick)) => {
                    stats.syncs += 1;
                    stats.files_changed += tick.changes.len() as u64;
                    if let Some(report) = &tick.report {
                        stats.files_failed += report.failed.len() as u64;
                        debug!(
                            "Synced {} changes: {} converted, {} copied, {} failed",
                            tick.changes.len(),
                            report.converted.len(),
                            report.copied.len(),
                            report.failed.len()
                        );
                    }
                    retained = Arc::new(tick.snapshot);
                }
                Ok(Err(e)) => {
                    stats.failed_polls += 1;
                    warn!("Poll failed, retrying next tick: {e}");
                }
                Err(e) => {
                    stats.failed_polls += 1;
                    warn!("Poll aborted, retrying next tick: {e}");
                }
            }

            *self.state.write().await = WatchState::Idle;
        }

        *self.state.write().await = WatchState::Stopped;
        info!("Ending watch");
        Ok(stats)
    }
}

/// Counters from one [`WatchLoop::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    /// Polls completed.
    pub polls: u64,

    /// Polls that found changes and synced them.
    pub syncs: u64,

    /// Changed files seen across all syncs.
    pub files_changed: u64,

    /// Files whose conversion or copy failed.
    pub files_failed: u64,

    /// Polls aborted by an error.
    pub failed_polls: u64,
}
