//! Append-only dispatch outcome log and aggregate statistics.
//!
//! One JSON object per line in `recall_log.jsonl`. Each dispatch appends a
//! `decision` record before execution and an `outcome` record after it.
//! Appends are single atomic line writes under a mutex; readers tolerate and
//! skip malformed lines left by a crashed writer. Records are never mutated
//! or deleted.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DispatchError;

/// Where a task was (or was intended to be) executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Local,
    Remote,
}

impl Destination {
    pub fn as_str(self) -> &'static str {
        match self {
            Destination::Local => "local",
            Destination::Remote => "remote",
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Pre-execution routing intent.
    Decision,
    /// Post-execution result.
    Outcome,
}

/// One log line. Tasks are truncated for storage; the log is an audit
/// record, not the source of truth for task text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub event: RecordKind,
    pub id: String,
    pub task: String,
    pub score: f64,
    pub threshold: f64,
    pub routed_to: Destination,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fallback_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

const TASK_PREVIEW_LEN: usize = 100;

/// Truncate task text for storage.
pub fn task_preview(task: &str) -> String {
    if task.chars().count() > TASK_PREVIEW_LEN {
        let preview: String = task.chars().take(TASK_PREVIEW_LEN).collect();
        format!("{}...", preview)
    } else {
        task.to_string()
    }
}

/// Aggregate routing statistics computed from a log scan.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    pub total: u64,
    pub local: u64,
    pub remote: u64,
    pub errors: u64,
    /// Fraction of outcomes that succeeded, in [0, 1]. 0 with no outcomes.
    pub success_rate: f64,
    /// Fraction of outcomes whose score-vs-threshold prediction matched the
    /// destination actually used, in [0, 1]. Validates threshold calibration.
    pub routing_accuracy: f64,
    pub avg_local_duration_ms: f64,
    pub avg_remote_duration_ms: f64,
}

pub struct OutcomeLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl OutcomeLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DispatchError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Append one record as a single line. The lock spans serialize and
    /// write so concurrent appends cannot tear lines.
    pub fn append(&self, record: &LogRecord) -> Result<(), DispatchError> {
        let line = serde_json::to_string(record)
            .map_err(|e| DispatchError::Config(format!("failed to serialize log record: {}", e)))?;
        let mut file = self.file.lock().unwrap();
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }

    /// Scan the full log, skipping malformed lines.
    pub fn read_all(&self) -> Vec<LogRecord> {
        let _guard = self.file.lock().unwrap();
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("[Outcome] failed to read {}: {}", self.path.display(), e);
                return Vec::new();
            }
        };
        let mut skipped = 0usize;
        let records: Vec<LogRecord> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(_) => {
                    skipped += 1;
                    None
                }
            })
            .collect();
        if skipped > 0 {
            debug!("[Outcome] skipped {} malformed log lines", skipped);
        }
        records
    }

    /// Statistics over the whole log, or over the trailing `window` when
    /// given.
    pub fn stats(&self, window: Option<Duration>) -> DispatchStats {
        let cutoff = window.map(|w| Utc::now() - w);
        let records: Vec<LogRecord> = self
            .read_all()
            .into_iter()
            .filter(|r| cutoff.map_or(true, |c| r.timestamp >= c))
            .collect();

        let mut stats = DispatchStats {
            total: 0,
            local: 0,
            remote: 0,
            errors: 0,
            success_rate: 0.0,
            routing_accuracy: 0.0,
            avg_local_duration_ms: 0.0,
            avg_remote_duration_ms: 0.0,
        };

        let mut outcomes = 0u64;
        let mut successes = 0u64;
        let mut accurate = 0u64;
        let mut local_durations = (0u64, 0u64);
        let mut remote_durations = (0u64, 0u64);

        for record in &records {
            match record.event {
                RecordKind::Decision => {
                    stats.total += 1;
                    match record.routed_to {
                        Destination::Local => stats.local += 1,
                        Destination::Remote => stats.remote += 1,
                    }
                }
                RecordKind::Outcome => {
                    outcomes += 1;
                    match record.success {
                        Some(true) => successes += 1,
                        Some(false) => stats.errors += 1,
                        None => {}
                    }
                    let predicted = if record.score >= record.threshold {
                        Destination::Remote
                    } else {
                        Destination::Local
                    };
                    if predicted == record.routed_to {
                        accurate += 1;
                    }
                    if let Some(duration) = record.duration_ms {
                        match record.routed_to {
                            Destination::Local => {
                                local_durations.0 += duration;
                                local_durations.1 += 1;
                            }
                            Destination::Remote => {
                                remote_durations.0 += duration;
                                remote_durations.1 += 1;
                            }
                        }
                    }
                }
            }
        }

        if outcomes > 0 {
            stats.success_rate = successes as f64 / outcomes as f64;
            stats.routing_accuracy = accurate as f64 / outcomes as f64;
        }
        if local_durations.1 > 0 {
            stats.avg_local_duration_ms = local_durations.0 as f64 / local_durations.1 as f64;
        }
        if remote_durations.1 > 0 {
            stats.avg_remote_duration_ms = remote_durations.0 as f64 / remote_durations.1 as f64;
        }
        stats
    }

    /// The last `n` outcome records, oldest first.
    pub fn recent(&self, n: usize) -> Vec<LogRecord> {
        let outcomes: Vec<LogRecord> = self
            .read_all()
            .into_iter()
            .filter(|r| r.event == RecordKind::Outcome)
            .collect();
        let start = outcomes.len().saturating_sub(n);
        outcomes[start..].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(event: RecordKind, routed_to: Destination, success: Option<bool>) -> LogRecord {
        LogRecord {
            timestamp: Utc::now(),
            event,
            id: "d-1".to_string(),
            task: "check containers".to_string(),
            score: 0.3,
            threshold: 0.7,
            routed_to,
            reason: "score 0.30 < threshold 0.70".to_string(),
            success,
            response_length: success.map(|_| 42),
            error: None,
            fallback_used: false,
            duration_ms: success.map(|_| 120),
        }
    }

    #[test]
    fn test_append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let log = OutcomeLog::open(dir.path().join("recall_log.jsonl")).unwrap();
        log.append(&record(RecordKind::Decision, Destination::Local, None))
            .unwrap();
        log.append(&record(RecordKind::Outcome, Destination::Local, Some(true)))
            .unwrap();

        let records = log.read_all();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event, RecordKind::Decision);
        assert_eq!(records[1].success, Some(true));
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recall_log.jsonl");
        let log = OutcomeLog::open(&path).unwrap();
        log.append(&record(RecordKind::Decision, Destination::Local, None))
            .unwrap();
        // Simulate a torn write from a crash.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            writeln!(file, "{{\"timestamp\": \"2024").unwrap();
        }
        log.append(&record(RecordKind::Outcome, Destination::Local, Some(true)))
            .unwrap();

        assert_eq!(log.read_all().len(), 2);
        let stats = log.stats(None);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_stats_counts_and_rates() {
        let dir = tempdir().unwrap();
        let log = OutcomeLog::open(dir.path().join("recall_log.jsonl")).unwrap();

        log.append(&record(RecordKind::Decision, Destination::Local, None))
            .unwrap();
        log.append(&record(RecordKind::Outcome, Destination::Local, Some(true)))
            .unwrap();
        log.append(&record(RecordKind::Decision, Destination::Remote, None))
            .unwrap();
        log.append(&record(RecordKind::Outcome, Destination::Remote, Some(false)))
            .unwrap();

        let stats = log.stats(None);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.local, 1);
        assert_eq!(stats.remote, 1);
        assert_eq!(stats.errors, 1);
        assert!((stats.success_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_routing_accuracy_flags_miscalibration() {
        let dir = tempdir().unwrap();
        let log = OutcomeLog::open(dir.path().join("recall_log.jsonl")).unwrap();

        // Score below threshold but executed remotely (e.g. forced): the
        // prediction disagrees with the actual destination.
        let mut forced = record(RecordKind::Outcome, Destination::Remote, Some(true));
        forced.score = 0.2;
        log.append(&forced).unwrap();
        // Score below threshold executed locally: prediction agrees.
        log.append(&record(RecordKind::Outcome, Destination::Local, Some(true)))
            .unwrap();

        let stats = log.stats(None);
        assert!((stats.routing_accuracy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_window_filters_old_records() {
        let dir = tempdir().unwrap();
        let log = OutcomeLog::open(dir.path().join("recall_log.jsonl")).unwrap();

        let mut old = record(RecordKind::Decision, Destination::Local, None);
        old.timestamp = Utc::now() - Duration::hours(48);
        log.append(&old).unwrap();
        log.append(&record(RecordKind::Decision, Destination::Local, None))
            .unwrap();

        assert_eq!(log.stats(None).total, 2);
        assert_eq!(log.stats(Some(Duration::hours(24))).total, 1);
    }

    #[test]
    fn test_recent_returns_trailing_outcomes() {
        let dir = tempdir().unwrap();
        let log = OutcomeLog::open(dir.path().join("recall_log.jsonl")).unwrap();
        for i in 0..5 {
            let mut outcome = record(RecordKind::Outcome, Destination::Local, Some(true));
            outcome.id = format!("d-{}", i);
            log.append(&outcome).unwrap();
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "d-3");
        assert_eq!(recent[1].id, "d-4");
    }

    #[test]
    fn test_task_preview_truncates() {
        let long = "x".repeat(150);
        let preview = task_preview(&long);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
        assert_eq!(task_preview("short"), "short");
    }
}
