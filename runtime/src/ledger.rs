//! JSONL run ledger: append-only log of stage outcomes.
//!
//! Features:
//! - One JSON object per line, one line per finished stage
//! - Automatic rotation when the file exceeds `MAX_LEDGER_SIZE` (10MB)
//! - Rotated files named `.1`, `.2`, etc. (max 5 rotations)

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::progress::Stage;

/// Maximum ledger size before rotation (10 MB).
const MAX_LEDGER_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated ledger files to keep.
const MAX_ROTATIONS: u32 = 5;

/// Final status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every attempted item succeeded or was skipped.
    Ok,
    /// Some items failed.
    Partial,
    /// Nothing succeeded, or the stage aborted.
    Failed,
}

impl RunStatus {
    /// Derive a status from item counts.
    pub fn from_counts(attempted: usize, succeeded: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Ok
        } else if succeeded == 0 && attempted > 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }
}

/// One ledger line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEntry {
    pub timestamp: String,
    pub category: String,
    pub stage: Stage,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub status: RunStatus,
}

impl RunEntry {
    /// An entry stamped now, with the status derived from the counts.
    pub fn new(
        category: &str,
        stage: Stage,
        attempted: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        duration: Duration,
    ) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            category: category.to_string(),
            stage,
            attempted,
            succeeded,
            failed,
            skipped,
            duration_ms: duration.as_millis() as u64,
            status: RunStatus::from_counts(attempted, succeeded, failed),
        }
    }
}

/// Append-only JSONL ledger with automatic rotation.
pub struct RunLedger {
    file: File,
    path: PathBuf,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
}

impl RunLedger {
    /// Open or create the ledger file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open run ledger: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.to_path_buf(),
            current_size,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry.
    pub fn record(&mut self, entry: &RunEntry) -> Result<()> {
        if self.current_size >= MAX_LEDGER_SIZE {
            self.rotate()?;
        }

        let json = serde_json::to_string(entry)?;
        writeln!(self.file, "{json}")?;
        self.current_size += json.len() as u64 + 1;
        Ok(())
    }

    /// Read every entry of the current file, skipping malformed lines.
    pub fn entries(&self) -> Result<Vec<RunEntry>> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to read run ledger: {}", self.path.display()))?;
        let entries = BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();
        Ok(entries)
    }

    /// Rotate ledger files: runs.jsonl → runs.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let _ = std::fs::rename(&self.path, rotation_path(&self.path, 1));

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen run ledger after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated ledger: `runs.jsonl.1`, `runs.jsonl.2`, etc.
fn rotation_path(base: &Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("runs.jsonl")
    );
    base.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_counts() {
        assert_eq!(RunStatus::from_counts(0, 0, 0), RunStatus::Ok);
        assert_eq!(RunStatus::from_counts(3, 2, 0), RunStatus::Ok);
        assert_eq!(RunStatus::from_counts(3, 2, 1), RunStatus::Partial);
        assert_eq!(RunStatus::from_counts(2, 0, 2), RunStatus::Failed);
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/runs.jsonl");

        let mut ledger = RunLedger::open(&path).unwrap();
        ledger
            .record(&RunEntry::new(
                "invention",
                Stage::Download,
                10,
                7,
                1,
                2,
                Duration::from_millis(1500),
            ))
            .unwrap();
        ledger
            .record(&RunEntry::new("invention", Stage::Parse, 9, 9, 0, 0, Duration::ZERO))
            .unwrap();
        drop(ledger);

        // Reopening appends rather than truncating.
        let mut ledger = RunLedger::open(&path).unwrap();
        ledger
            .record(&RunEntry::new("design", Stage::Process, 1, 1, 0, 0, Duration::ZERO))
            .unwrap();

        let entries = ledger.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].stage, Stage::Download);
        assert_eq!(entries[0].status, RunStatus::Partial);
        assert_eq!(entries[0].duration_ms, 1500);
        assert_eq!(entries[2].category, "design");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.lines().next().unwrap().contains("\"stage\":\"download\""));
    }

    #[test]
    fn test_rotation_path() {
        let p = rotation_path(Path::new("/data/runs.jsonl"), 2);
        assert_eq!(p, PathBuf::from("/data/runs.jsonl.2"));
    }
}
