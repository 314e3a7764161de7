//! Configuration types for a watch run.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};

/// Configuration for a watch run. Fixed for the lifetime of a [`crate::WatchLoop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Content root being watched.
    pub content_dir: PathBuf,

    /// Output root receiving converted and copied files.
    pub output_dir: PathBuf,

    /// Extension of files handed to the converter (with or without the dot).
    pub extension: String,

    /// Extension of converted files.
    pub out_format: String,

    /// Time between polls.
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,

    /// Delete and recreate the output root before the first poll.
    pub clean_output_on_start: bool,

    /// Whether to follow symbolic links while enumerating.
    pub follow_symlinks: bool,
}

impl WatchConfig {
    /// Create a new config over a content and an output root.
    pub fn new(content_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
            output_dir: output_dir.into(),
            extension: "md".to_string(),
            out_format: "html".to_string(),
            poll_interval: Duration::from_secs(1),
            clean_output_on_start: true,
            follow_symlinks: false,
        }
    }

    /// Set the extension routed to the converter.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the extension of converted output.
    pub fn with_out_format(mut self, out_format: impl Into<String>) -> Self {
        self.out_format = out_format.into();
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set whether the output root is wiped before the first poll.
    pub fn with_clean_output(mut self, clean: bool) -> Self {
        self.clean_output_on_start = clean;
        self
    }

    /// Enable following symbolic links.
    pub fn follow_symlinks(mut self) -> Self {
        self.follow_symlinks = true;
        self
    }

    /// Load a config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Check the config for values a watch run cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.filter_extension().is_empty() {
            return Err(WatcherError::Config("extension must not be empty".into()));
        }
        if self.out_format.trim_start_matches('.').is_empty() {
            return Err(WatcherError::Config("out_format must not be empty".into()));
        }
        if self.poll_interval.is_zero() {
            return Err(WatcherError::InvalidInterval("0".into()));
        }

        let content = resolve_dir(&self.content_dir)?;
        let output = resolve_dir(&self.output_dir)?;
        if output.starts_with(&content) || content.starts_with(&output) {
            return Err(WatcherError::Config(format!(
                "output directory {} and content directory {} must not overlap",
                self.output_dir.display(),
                self.content_dir.display()
            )));
        }

        Ok(())
    }

    /// The extension filter without a leading dot.
    pub fn filter_extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    /// The output extension without a leading dot.
    pub fn output_extension(&self) -> &str {
        self.out_format.trim_start_matches('.')
    }

    /// Whether `path` is routed to the converter.
    pub fn is_convertible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == self.filter_extension())
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self::new("content", "output")
    }
}

/// Absolute form of `path` for overlap checks.
///
/// The longest existing ancestor is canonicalized and the missing tail is
/// appended to it, so directories that do not exist yet still compare
/// against ones that do.
fn resolve_dir(path: &Path) -> Result<PathBuf> {
    let normalized = normalize(&std::path::absolute(path)?);

    let mut existing = normalized.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(missing
                .iter()
                .rev()
                .fold(canonical, |resolved, name| resolved.join(name)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    Ok(normalized)
}

/// Drop `.` and fold `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Parse a human-readable duration string into a [`Duration`].
///
/// Supported suffixes: `ms`, `s`, `m`, `h`, `d`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || WatcherError::InvalidInterval(s.to_string());

    let (digits, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if s.ends_with(['s', 'm', 'h', 'd']) {
        s.split_at(s.len() - 1)
    } else {
        return Err(invalid());
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;

    if unit == "ms" {
        return Ok(Duration::from_millis(value));
    }
    let scale = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        _ => return Err(invalid()),
    };
    value
        .checked_mul(scale)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// Format a duration the way [`parse_duration`] reads it back.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{millis}ms")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
