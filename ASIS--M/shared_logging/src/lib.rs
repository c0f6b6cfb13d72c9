#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Structured JSON-lines logging shared across the activation stack.
//!
//! Every record is one JSON object per line. Files are rotated by size:
//! `activation.log` becomes `activation.log.1`, the previous `.1` becomes
//! `.2`, and so on up to the configured number of kept files.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Log severity level, ordered from least to most severe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Debug information.
    Debug,
    /// Informational events.
    Info,
    /// Warning indicator.
    Warn,
    /// Error indicator.
    Error,
}

/// Structured log record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp in ISO8601.
    pub timestamp: DateTime<Utc>,
    /// Module emitting the log.
    pub module: String,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Arbitrary JSON payload for fields.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    /// Creates a record with the provided info.
    #[must_use]
    pub fn new(module: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            module: module.into(),
            level,
            message: message.into(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Attaches the fields of a JSON object as metadata. Non-object values are ignored.
    #[must_use]
    pub fn with_metadata(mut self, metadata: &serde_json::Value) -> Self {
        if let Some(obj) = metadata.as_object() {
            self.metadata = obj.clone();
        }
        self
    }
}

/// Size-based rotation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    /// Rotate once the active file would exceed this many bytes.
    pub max_bytes: u64,
    /// Number of rotated files retained next to the active one.
    pub keep: usize,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_bytes: 5 * 1024 * 1024,
            keep: 3,
        }
    }
}

#[derive(Debug)]
struct WriterState {
    file: File,
    written: u64,
}

/// Thread-safe JSON logger with append-only semantics and optional rotation.
#[derive(Debug)]
pub struct JsonLogger {
    path: PathBuf,
    min_level: LogLevel,
    rotation: Option<RotationPolicy>,
    writer: Mutex<WriterState>,
}

impl JsonLogger {
    /// Creates or opens a logger at the desired path. No rotation, all levels.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
        }
        let file = open_append(&path)?;
        let written = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        Ok(Self {
            path,
            min_level: LogLevel::Debug,
            rotation: None,
            writer: Mutex::new(WriterState { file, written }),
        })
    }

    /// Enables size-based rotation.
    #[must_use]
    pub fn with_rotation(mut self, policy: RotationPolicy) -> Self {
        self.rotation = Some(policy);
        self
    }

    /// Drops records below the given level.
    #[must_use]
    pub const fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Writes a log record as JSON line.
    pub fn log(&self, record: &LogRecord) -> Result<()> {
        if record.level < self.min_level {
            return Ok(());
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut state = self.writer.lock();
        if let Some(policy) = self.rotation {
            let incoming = line.len() as u64;
            if state.written > 0 && state.written + incoming > policy.max_bytes {
                self.rotate(&mut state, policy)?;
            }
        }
        state.file.write_all(&line)?;
        state.file.flush()?;
        state.written += line.len() as u64;
        Ok(())
    }

    /// Returns the underlying file path (useful for tests).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the rotated file with the given index (1 is the newest).
    #[must_use]
    pub fn rotated_path(&self, index: usize) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_os_string();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn rotate(&self, state: &mut WriterState, policy: RotationPolicy) -> Result<()> {
        state.file.flush()?;
        if policy.keep == 0 {
            File::create(&self.path)?;
        } else {
            let oldest = self.rotated_path(policy.keep);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..policy.keep).rev() {
                let from = self.rotated_path(index);
                if from.exists() {
                    fs::rename(&from, self.rotated_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.rotated_path(1))
                .with_context(|| format!("rotating {}", self.path.display()))?;
        }
        state.file = open_append(&self.path)?;
        state.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_json_lines() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("test.log")).unwrap();
        logger
            .log(&LogRecord::new("module", LogLevel::Info, "hello"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(content.contains("\"message\":\"hello\""));
        assert!(content.contains("\"level\":\"INFO\""));
    }

    #[test]
    fn filters_below_min_level() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("filtered.log"))
            .unwrap()
            .with_min_level(LogLevel::Warn);
        logger
            .log(&LogRecord::new("module", LogLevel::Debug, "quiet"))
            .unwrap();
        logger
            .log(&LogRecord::new("module", LogLevel::Error, "loud"))
            .unwrap();
        let content = fs::read_to_string(logger.path()).unwrap();
        assert!(!content.contains("quiet"));
        assert!(content.contains("loud"));
    }

    #[test]
    fn rotates_when_size_exceeded() {
        let dir = tempdir().unwrap();
        let logger = JsonLogger::new(dir.path().join("rotating.log"))
            .unwrap()
            .with_rotation(RotationPolicy {
                max_bytes: 200,
                keep: 2,
            });
        for idx in 0..12 {
            logger
                .log(&LogRecord::new("module", LogLevel::Info, format!("entry-{idx}")))
                .unwrap();
        }
        assert!(logger.rotated_path(1).exists());
        assert!(logger.rotated_path(2).exists());
        assert!(!logger.rotated_path(3).exists());
        let active = fs::read_to_string(logger.path()).unwrap();
        assert!(active.contains("entry-11"));
        assert!(active.len() <= 200);
    }

    #[test]
    fn metadata_only_accepts_objects() {
        let record = LogRecord::new("module", LogLevel::Info, "meta")
            .with_metadata(&serde_json::json!({ "phase": "core" }));
        assert_eq!(record.metadata["phase"], "core");
        let ignored = LogRecord::new("module", LogLevel::Info, "meta")
            .with_metadata(&serde_json::json!([1, 2]));
        assert!(ignored.metadata.is_empty());
    }
}
