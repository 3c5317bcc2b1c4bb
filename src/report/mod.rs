//! Analysis report channel.
//!
//! Pipeline stages never write files themselves; they push `(stage, key,
//! value)` records and warnings into a `Reporter`. The file reporter appends
//! them to `log.txt` and mirrors each one as a `tracing` event, so the report
//! and the console log always agree.
//!
//! Text formatting of results lives in `format`.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub mod format;

pub use format::*;

/// Per-item detail (plots, per-run tables) is emitted for the first
/// `DETAIL_LIMIT` items unless debugging.
pub const DETAIL_LIMIT: usize = 10;

pub fn should_emit_detail(index: usize, debug: bool) -> bool {
    debug || index < DETAIL_LIMIT
}

/// One report entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportEntry {
    Record { stage: String, key: String, value: String },
    Warning { stage: String, message: String },
    Block { stage: String, text: String },
}

/// Sink for analysis records.
pub trait Reporter {
    fn record(&mut self, stage: &str, key: &str, value: &str);
    fn warn(&mut self, stage: &str, message: &str);
    /// Multi-line preformatted text (tables).
    fn block(&mut self, stage: &str, text: &str);
}

/// Append-only `log.txt` writer.
pub struct FileReporter {
    path: PathBuf,
    file: File,
}

impl FileReporter {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::external(format!("Failed to create '{}': {e}", parent.display()))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::external(format!("Failed to open report '{}': {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&mut self, text: &str) {
        if let Err(e) = writeln!(self.file, "{text}") {
            tracing::error!(path = %self.path.display(), error = %e, "failed to append to report");
        }
    }
}

impl Reporter for FileReporter {
    fn record(&mut self, stage: &str, key: &str, value: &str) {
        tracing::info!(stage, key, value, "record");
        self.append(&format!("[{stage}] {key}: {value}"));
    }

    fn warn(&mut self, stage: &str, message: &str) {
        tracing::warn!(stage, "{message}");
        self.append(&format!("[{stage}] WARNING: {message}"));
    }

    fn block(&mut self, stage: &str, text: &str) {
        tracing::debug!(stage, "{text}");
        self.append(&format!("[{stage}]\n{text}"));
    }
}

/// In-memory reporter used by tests and by callers that format later.
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    pub entries: Vec<ReportEntry>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self, stage: &str, key: &str) -> Option<&str> {
        self.entries.iter().rev().find_map(|e| match e {
            ReportEntry::Record { stage: s, key: k, value } if s == stage && k == key => {
                Some(value.as_str())
            }
            _ => None,
        })
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter_map(|e| match e {
                ReportEntry::Warning { message, .. } => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn record(&mut self, stage: &str, key: &str, value: &str) {
        self.entries.push(ReportEntry::Record {
            stage: stage.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
    }

    fn warn(&mut self, stage: &str, message: &str) {
        self.entries.push(ReportEntry::Warning {
            stage: stage.to_string(),
            message: message.to_string(),
        });
    }

    fn block(&mut self, stage: &str, text: &str) {
        self.entries.push(ReportEntry::Block {
            stage: stage.to_string(),
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_capped_unless_debugging() {
        assert!(should_emit_detail(0, false));
        assert!(should_emit_detail(9, false));
        assert!(!should_emit_detail(10, false));
        assert!(should_emit_detail(250, true));
    }

    #[test]
    fn file_reporter_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("log.txt");
        {
            let mut r = FileReporter::open(&path).unwrap();
            r.record("selection", "runs", "3");
        }
        {
            let mut r = FileReporter::open(&path).unwrap();
            r.warn("fit", "ERROR IN OPTIMISATION");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "[selection] runs: 3\n[fit] WARNING: ERROR IN OPTIMISATION\n");
    }

    #[test]
    fn memory_reporter_lookup() {
        let mut r = MemoryReporter::new();
        r.record("a", "k", "1");
        r.record("a", "k", "2");
        r.warn("b", "careful");
        assert_eq!(r.value("a", "k"), Some("2"));
        assert_eq!(r.warnings(), ["careful"]);
    }
}
