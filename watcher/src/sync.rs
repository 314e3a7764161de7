//! Mirroring changed files into the output tree.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::WatchConfig;
use crate::convert::{Converter, copy_atomic, mirror_path};
use crate::error::{Result, WatcherError};
use crate::snapshot::{ChangeSet, FileEntry, Snapshot};

/// What one sync pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Output files written by the converter.
    pub converted: Vec<PathBuf>,

    /// Output files copied through unchanged.
    pub copied: Vec<PathBuf>,

    /// Source files whose conversion or copy failed.
    pub failed: Vec<PathBuf>,
}

impl SyncReport {
    /// Check if every changed file was handled.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Create the output directory of every file in `snapshot`.
///
/// Returns the directories that were missing. Running it again on the same
/// snapshot creates nothing.
pub fn materialize_dirs(snapshot: &Snapshot, config: &WatchConfig) -> Result<Vec<PathBuf>> {
    let mut dirs = BTreeSet::new();
    for entry in snapshot.iter() {
        let mirrored = mirror_path(&entry.path, &config.content_dir, &config.output_dir)?;
        if let Some(parent) = mirrored.parent() {
            dirs.insert(parent.to_path_buf());
        }
    }

    let mut created = Vec::new();
    for dir in dirs {
        if !dir.is_dir() {
            std::fs::create_dir_all(&dir)?;
            created.push(dir);
        }
    }
    Ok(created)
}

/// Format the log line for one changed file: its path and local mtime.
pub fn change_line(entry: &FileEntry) -> String {
    format!(
        "{} {}",
        entry.path.display(),
        entry.modified_local().format("%Y-%m-%d %H:%M:%S%.f")
    )
}

/// Apply `changes` to the output tree.
///
/// Directory creation errors abort the pass. Conversion and copy errors are
/// logged and recorded per file, and the remaining files are still handled.
pub fn sync(
    changes: &ChangeSet,
    snapshot: &Snapshot,
    config: &WatchConfig,
    converter: &dyn Converter,
) -> Result<SyncReport> {
    materialize_dirs(snapshot, config)?;

    for entry in changes {
        info!("{}", change_line(entry));
    }

    let mut report = SyncReport::default();

    for entry in changes.iter().filter(|e| config.is_convertible(&e.path)) {
        match converter.convert(
            &entry.path,
            &config.content_dir,
            &config.output_dir,
            config.output_extension(),
        ) {
            Ok(written) => report.converted.push(written),
            Err(e) => {
                warn!("Conversion failed for {}: {e}", entry.path.display());
                report.failed.push(entry.path.clone());
            }
        }
    }

    for entry in changes.iter().filter(|e| !config.is_convertible(&e.path)) {
        match copy_through(&entry.path, config) {
            Ok(target) => report.copied.push(target),
            Err(e) => {
                warn!("{e}");
                report.failed.push(entry.path.clone());
            }
        }
    }

    Ok(report)
}

/// Copy `source` verbatim to its mirrored location, replacing any existing file.
fn copy_through(source: &Path, config: &WatchConfig) -> Result<PathBuf> {
    let wrap = |e: WatcherError| WatcherError::Copy {
        path: source.to_path_buf(),
        source: Box::new(e),
    };

    let target = mirror_path(source, &config.content_dir, &config.output_dir).map_err(wrap)?;
    copy_atomic(source, &target).map_err(wrap)?;
    Ok(target)
}
