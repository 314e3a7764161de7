//! File tree snapshots and change detection.
//!
//! A [`Snapshot`] is the full inventory of regular files under a root, keyed
//! by `(path, mtime)`. Two snapshots are compared as sets: every entry present
//! in the newer one but not the older one is a change, which covers both new
//! files and files whose modification time moved. Removed files simply drop
//! out of the next snapshot.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Result, WatcherError};

/// One regular file as seen by a single poll.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileEntry {
    /// Path to the file, rooted where the enumeration was rooted.
    pub path: PathBuf,

    /// Last modification time as reported by the filesystem.
    pub modified: SystemTime,
}

impl FileEntry {
    /// Create a new entry.
    pub fn new(path: impl Into<PathBuf>, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            modified,
        }
    }

    /// Modification time in the local timezone.
    pub fn modified_local(&self) -> DateTime<Local> {
        DateTime::<Local>::from(self.modified)
    }
}

/// Complete inventory of regular files under a root at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: HashSet<FileEntry>,
}

impl Snapshot {
    /// An empty snapshot, the state before the first poll.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Walk `root` recursively and record every regular file with its mtime.
    ///
    /// Directories are never recorded. With `follow_symlinks` off, symbolic
    /// links are neither recorded nor descended into. Any error reading the
    /// tree aborts the enumeration.
    pub fn enumerate(root: &Path, follow_symlinks: bool) -> Result<Self> {
        if !root.is_dir() {
            return Err(WatcherError::ContentRootNotFound(root.to_path_buf()));
        }

        let mut entries = HashSet::new();
        for entry in WalkDir::new(root).follow_links(follow_symlinks) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let modified = entry.metadata()?.modified()?;
            entries.insert(FileEntry::new(entry.into_path(), modified));
        }

        debug!("Enumerated {} files under {}", entries.len(), root.display());
        Ok(Self { entries })
    }

    /// Number of files in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if an exact `(path, mtime)` entry is present.
    pub fn contains(&self, entry: &FileEntry) -> bool {
        self.entries.contains(entry)
    }

    /// Iterate over the entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter()
    }
}

impl FromIterator<FileEntry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FileEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Files that are new or modified between two snapshots, ordered by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<FileEntry>,
}

impl ChangeSet {
    /// Check if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of changed files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over the changed entries.
    pub fn iter(&self) -> std::slice::Iter<'_, FileEntry> {
        self.entries.iter()
    }

    /// Check if the change set has an entry for `path`.
    pub fn contains_path(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a FileEntry;
    type IntoIter = std::slice::Iter<'a, FileEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Compute `current - previous`.
pub fn diff(previous: &Snapshot, current: &Snapshot) -> ChangeSet {
    let mut entries: Vec<FileEntry> = current
        .entries
        .difference(&previous.entries)
        .cloned()
        .collect();
    entries.sort();
    ChangeSet { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::{self, File};
    use std::time::Duration;
    use tempfile::TempDir;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_enumerate_is_complete_at_any_depth() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("a/b/c")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        let files = ["top.rst", "a/one.txt", "a/b/two.png", "a/b/c/three.rst"];
        for f in files {
            fs::write(root.join(f), f).unwrap();
        }

        let snapshot = Snapshot::enumerate(root, false).unwrap();
        assert_eq!(snapshot.len(), files.len());

        for f in files {
            let path = root.join(f);
            let modified = fs::metadata(&path).unwrap().modified().unwrap();
            assert!(
                snapshot.contains(&FileEntry::new(&path, modified)),
                "missing {f}"
            );
        }
        assert!(snapshot.iter().all(|e| e.path.is_file()));
    }

    #[test]
    fn test_enumerate_missing_root() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        let result = Snapshot::enumerate(&missing, false);
        assert!(matches!(result, Err(WatcherError::ContentRootNotFound(_))));
    }

    #[test]
    fn test_enumerate_reports_updated_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("doc.rst");
        fs::write(&path, "hello").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(at(1_000_000))
            .unwrap();

        let snapshot = Snapshot::enumerate(temp_dir.path(), false).unwrap();
        assert!(snapshot.contains(&FileEntry::new(&path, at(1_000_000))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_not_followed_by_default() {
        let temp_dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("linked.txt"), "x").unwrap();
        fs::write(temp_dir.path().join("real.txt"), "x").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("dir_link")).unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("file_link.txt"),
        )
        .unwrap();

        let plain = Snapshot::enumerate(temp_dir.path(), false).unwrap();
        assert_eq!(plain.len(), 1);

        let followed = Snapshot::enumerate(temp_dir.path(), true).unwrap();
        let mut names: Vec<_> = followed
            .iter()
            .map(|e| e.path.strip_prefix(temp_dir.path()).unwrap().to_path_buf())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                PathBuf::from("dir_link/linked.txt"),
                PathBuf::from("file_link.txt"),
                PathBuf::from("real.txt"),
            ]
        );
    }

    #[test]
    fn test_diff_new_and_modified() {
        let a: Snapshot = [
            FileEntry::new("p1", at(1)),
            FileEntry::new("p2", at(2)),
        ]
        .into_iter()
        .collect();
        let b: Snapshot = [
            FileEntry::new("p1", at(1)),
            FileEntry::new("p2", at(3)),
            FileEntry::new("p3", at(4)),
        ]
        .into_iter()
        .collect();

        let changes = diff(&a, &b);
        let got: Vec<_> = changes.iter().cloned().collect();
        assert_eq!(
            got,
            vec![FileEntry::new("p2", at(3)), FileEntry::new("p3", at(4))]
        );
    }

    #[test]
    fn test_diff_first_tick_is_full_snapshot() {
        let b: Snapshot = [
            FileEntry::new("x/a.rst", at(10)),
            FileEntry::new("x/b.png", at(11)),
        ]
        .into_iter()
        .collect();

        let changes = diff(&Snapshot::empty(), &b);
        assert_eq!(changes.len(), b.len());
        assert!(b.iter().all(|e| changes.contains_path(&e.path)));
    }

    #[test]
    fn test_diff_ignores_removals() {
        let a: Snapshot = [FileEntry::new("gone", at(1)), FileEntry::new("kept", at(1))]
            .into_iter()
            .collect();
        let b: Snapshot = [FileEntry::new("kept", at(1))].into_iter().collect();

        assert!(diff(&a, &b).is_empty());
    }
}
