use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// File name of the removal log kept inside the swept folder.
pub const HISTORY_FILE: &str = ".history.jsonl";

/// One removal, as appended to the history log.
#[derive(Debug, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub timestamp: String,
    /// Anchor frame the removed frame was judged against.
    pub kept: String,
    pub removed: String,
    pub score: f64,
    pub threshold: f64,
}

impl RemovalRecord {
    pub fn new(kept: &Path, removed: &Path, score: f64, threshold: f64) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            kept: kept.to_string_lossy().into_owned(),
            removed: removed.to_string_lossy().into_owned(),
            score,
            threshold,
        }
    }
}

/// Append-only JSONL log of removals.
///
/// Writing is best effort: a log failure must never abort a sweep that
/// already deleted files. The file is opened on first append so dry runs
/// leave no log behind.
pub struct HistoryLog {
    path: PathBuf,
    writer: Mutex<Option<File>>,
}

impl HistoryLog {
    pub fn new(folder: &Path) -> Self {
        Self {
            path: folder.join(HISTORY_FILE),
            writer: Mutex::new(None),
        }
    }

    pub fn append(&self, record: &RemovalRecord) {
        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(err) => {
                log::warn!("cannot encode removal record: {}", err);
                return;
            }
        };

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if writer.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *writer = Some(file),
                Err(err) => {
                    log::warn!("cannot open {}: {}", self.path.display(), err);
                    return;
                }
            }
        }
        if let Some(file) = writer.as_mut() {
            if let Err(err) = writeln!(file, "{line}") {
                log::warn!("cannot append to {}: {}", self.path.display(), err);
            }
        }
    }
}

/// Read all removal records logged in `folder`, skipping malformed lines.
pub fn read_history(folder: &Path) -> std::io::Result<Vec<RemovalRecord>> {
    let file = File::open(folder.join(HISTORY_FILE))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(err) => log::warn!("skipping malformed history entry {}: {}", index, err),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_and_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let history = HistoryLog::new(dir.path());

        history.append(&RemovalRecord::new(
            Path::new("cam1-a.png"),
            Path::new("cam1-b.png"),
            1.5,
            4.0,
        ));
        history.append(&RemovalRecord::new(
            Path::new("cam1-a.png"),
            Path::new("cam1-c.png"),
            2.5,
            4.0,
        ));

        let records = read_history(dir.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].removed, "cam1-b.png");
        assert_eq!(records[1].removed, "cam1-c.png");
        assert_eq!(records[1].kept, "cam1-a.png");
        assert_eq!(records[1].threshold, 4.0);
    }

    #[test]
    fn missing_log_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(read_history(dir.path()).is_err());
    }

    #[test]
    fn no_log_file_until_first_append() {
        let dir = TempDir::new().unwrap();
        let _history = HistoryLog::new(dir.path());
        assert!(!dir.path().join(HISTORY_FILE).exists());
    }
}
