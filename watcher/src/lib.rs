//! # Docwatch Watcher
//!
//! Polls a content tree, mirrors it into an output tree, and optionally serves
//! the output over HTTP while it keeps watching.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       ServeCoordinator                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  WatchLoop (task)                        ServeDir (axum)        │
//! │    │  every poll_interval                     ▲                 │
//! │    ▼                                          │ reads           │
//! │  Snapshot ──► diff ──► ChangeSet ──► sync ──► output tree       │
//! │                                       │                         │
//! │                                       ▼                         │
//! │                                   Converter                     │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Change detection is polling-based: a file is changed when its
//! `(path, mtime)` pair is absent from the previous snapshot. Deleted content
//! files are not removed from the output tree.

pub mod config;
pub mod convert;
pub mod error;
pub mod serve;
pub mod snapshot;
pub mod sync;
pub mod watcher;

pub use config::{WatchConfig, parse_duration};
pub use convert::{Converter, converted_path, mirror_path, write_atomic};
pub use error::{Result, WatcherError};
pub use serve::{BoundServer, ServeCoordinator};
pub use snapshot::{ChangeSet, FileEntry, Snapshot, diff};
pub use sync::SyncReport;
pub use watcher::{Tick, WatchLoop, WatchState, WatchStats, poll_once};
