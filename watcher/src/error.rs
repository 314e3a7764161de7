//! Error types for the watcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Errors that can occur while watching, syncing or serving.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// The content root does not exist or is not a directory.
    #[error("content directory not found: {}", .0.display())]
    ContentRootNotFound(PathBuf),

    /// A path that should live under a root does not.
    #[error("{} is not under {}", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// The conversion callable failed for one file.
    #[error("failed to convert {}: {message}", path.display())]
    Conversion { path: PathBuf, message: String },

    /// A pass-through copy failed for one file.
    #[error("failed to copy {}: {source}", path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: Box<WatcherError>,
    },

    /// Invalid polling interval.
    #[error("invalid interval '{0}': expected format like 500ms, 30s, 5m, 1h")]
    InvalidInterval(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Config file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// HTTP server error.
    #[error("server error: {0}")]
    Serve(String),

    /// Directory walk error.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Atomic rename of a temp file failed.
    #[error("persist error: {0}")]
    Persist(#[from] tempfile::PersistError),

    /// A background task panicked or was aborted.
    #[error("task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
