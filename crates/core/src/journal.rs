//! Append-only error journal.
//!
//! Separate from the `log` facade: this is the user-facing record of failed
//! images and failed runs, one timestamped line per event.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Default journal file name, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "extraction_log.txt";

/// Destination for error events.
pub trait ErrorLog: Send + Sync {
    /// Record one error event.
    fn error(&self, message: &str);
}

/// Format a journal line: `2024-05-01 09:30:12,345 - ERROR - message`.
pub fn format_line(message: &str) -> String {
    format!(
        "{} - ERROR - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
        message
    )
}

/// Journal backed by a file opened in append mode for the process lifetime.
#[derive(Debug)]
pub struct FileErrorLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileErrorLog {
    /// Open (or create) the journal file for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ErrorLog for FileErrorLog {
    fn error(&self, message: &str) {
        log::error!("{message}");

        let line = format_line(message);
        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(file, "{line}").and_then(|_| file.flush()) {
            log::warn!("Could not append to {}: {}", self.path.display(), e);
        }
    }
}

/// Journal that keeps lines in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded so far, without timestamps.
    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ErrorLog for MemoryErrorLog {
    fn error(&self, message: &str) {
        log::error!("{message}");
        match self.lines.lock() {
            Ok(mut lines) => lines.push(message.to_string()),
            Err(poisoned) => poisoned.into_inner().push(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_line_shape() {
        let line = format_line("Failed to save image #3");
        assert!(line.ends_with(" - ERROR - Failed to save image #3"));
        // "YYYY-MM-DD HH:MM:SS,mmm"
        let stamp = line.split(" - ").next().unwrap();
        assert_eq!(stamp.len(), 23);
        assert_eq!(&stamp[19..20], ",");
    }

    #[test]
    fn test_file_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_LOG_FILE);

        {
            let log = FileErrorLog::open(&path).unwrap();
            log.error("first");
        }
        let log = FileErrorLog::open(&path).unwrap();
        log.error("second");

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("ERROR - first"));
        assert!(lines[1].ends_with("ERROR - second"));
    }

    #[test]
    fn test_memory_log_collects() {
        let log = MemoryErrorLog::new();
        log.error("a");
        log.error("b");
        assert_eq!(log.lines(), vec!["a".to_string(), "b".to_string()]);
    }
}
