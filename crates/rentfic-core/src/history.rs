//! Persistent record of report dates that were already archived.
//!
//! The history is a single JSON object keyed by `YYYYMMDD` date keys. It is
//! read whole, updated in memory and written back whole; there is no locking,
//! so only one run may use a history file at a time.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// One archived report.
///
/// The record is kept as the JSON value found in the file, so entries written
/// by hand or by other tools load and save back unchanged. Only the date key
/// matters for the idempotency check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessedDateRecord(serde_json::Value);

impl ProcessedDateRecord {
    pub fn new(downloaded_at: impl Into<String>, path: impl Into<String>) -> Self {
        Self(serde_json::json!({
            "downloaded_at": downloaded_at.into(),
            "path": path.into(),
        }))
    }

    /// Local download time, `%Y-%m-%d_%H-%M-%S`.
    pub fn downloaded_at(&self) -> Option<&str> {
        self.field("downloaded_at").and_then(serde_json::Value::as_str)
    }

    pub fn path(&self) -> Option<&str> {
        self.field("path").and_then(serde_json::Value::as_str)
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }
}

/// Date key → record. Entries are only ever added.
pub type History = BTreeMap<String, ProcessedDateRecord>;

/// JSON file backing a [`History`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    verify_paths: bool,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            verify_paths: false,
        }
    }

    /// Drop entries whose archived PDF is gone when loading.
    pub fn verify_paths(mut self, verify: bool) -> Self {
        self.verify_paths = verify;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path the history is moved to when it cannot be parsed.
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Read the history.
    ///
    /// A missing file is an empty history. A file that is not a JSON object
    /// is renamed to [`backup_path`](Self::backup_path), replacing any
    /// earlier backup, and an empty history is returned. Records are not
    /// validated.
    pub fn load(&self) -> Result<History, CoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(History::new()),
            Err(e) => return Err(e.into()),
        };

        let mut history = match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(serde_json::Value::Object(entries)) => entries
                .into_iter()
                .map(|(date_key, value)| (date_key, ProcessedDateRecord(value)))
                .collect::<History>(),
            Ok(other) => {
                let kind = match other {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    _ => "null",
                };
                return self.quarantine(&format!("top level is {kind}, not an object"));
            }
            Err(e) => return self.quarantine(&e.to_string()),
        };

        if self.verify_paths {
            // Records without a path cannot be checked and are kept
            history.retain(|date_key, record| match record.path() {
                Some(path) if !Path::new(path).exists() => {
                    log::warn!("Forgetting {date_key}: archived file {path} no longer exists");
                    false
                }
                _ => true,
            });
        }

        Ok(history)
    }

    fn quarantine(&self, reason: &str) -> Result<History, CoreError> {
        let backup = self.backup_path();
        std::fs::rename(&self.path, &backup)?;
        log::warn!(
            "History file {} is corrupt ({reason}); moved it to {} and starting with an empty history",
            self.path.display(),
            backup.display()
        );
        Ok(History::new())
    }

    /// Replace the history file with `history`.
    ///
    /// The JSON is written to a temporary file next to the target and renamed
    /// over it, so readers never see a half-written history.
    pub fn save(&self, history: &History) -> Result<(), CoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        history.serialize(&mut ser)?;
        buf.push(b'\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&buf)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}
