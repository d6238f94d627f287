//! Progress reporting module for scan operations
//!
//! This module provides data structures and utilities for reporting
//! scan progress to external callers via stderr, one JSON object per line.

use serde::Serialize;
use std::cell::Cell;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::config::ScanConfig;
use crate::models::{ScanErrorItem, ScanProgress, ScanReport};

/// Start message sent when scan begins
#[derive(Debug, Clone, Serialize)]
pub struct StartMessage {
    /// Message type identifier
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Scan root
    pub root: String,
    /// Interpretation timezone
    pub timezone: String,
    /// Whether the clip cache is enabled
    pub cache: bool,
}

impl StartMessage {
    /// Create a new start message
    pub fn new(seq: u64, ts: u64, root: String, timezone: String, cache: bool) -> Self {
        Self {
            msg_type: "start",
            seq,
            ts,
            root,
            timezone,
            cache,
        }
    }
}

/// Progress message sent during scan
#[derive(Debug, Clone, Serialize)]
pub struct ProgressMessage {
    /// Message type identifier ("p" for progress)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Files processed so far
    #[serde(rename = "n")]
    pub processed: u64,
    /// Files found during enumeration
    #[serde(rename = "of")]
    pub total: u64,
    /// Percentage done, one decimal
    pub pct: f64,
    /// Current file description
    pub msg: String,
}

impl ProgressMessage {
    /// Create a new progress message
    pub fn new(seq: u64, ts: u64, progress: &ScanProgress) -> Self {
        Self {
            msg_type: "p",
            seq,
            ts,
            processed: progress.processed,
            total: progress.total,
            pct: (progress.percent() * 10.0).round() / 10.0,
            msg: progress.message.clone(),
        }
    }
}

/// Error message sent for a recorded per-file error
#[derive(Debug, Clone, Serialize)]
pub struct ErrorProgressMessage {
    /// Message type identifier ("err" for error)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Stage that produced the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Error message description
    pub message: String,
    /// Path that caused the error (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorProgressMessage {
    /// Create a new error progress message
    pub fn new(seq: u64, ts: u64, item: &ScanErrorItem) -> Self {
        Self {
            msg_type: "err",
            seq,
            ts,
            context: item.context.clone(),
            message: item.message.clone(),
            path: item.path.as_ref().map(|p| p.to_string_lossy().to_string()),
        }
    }
}

/// Done message sent when scan completes
#[derive(Debug, Clone, Serialize)]
pub struct DoneMessage {
    /// Message type identifier ("done" for completion)
    #[serde(rename = "_t")]
    pub msg_type: &'static str,
    /// Sequence number
    pub seq: u64,
    /// Timestamp in milliseconds since reporter creation
    pub ts: u64,
    /// Total number of files found
    #[serde(rename = "tf")]
    pub total_files: u64,
    /// Files with a video extension
    #[serde(rename = "vf")]
    pub candidate_video_files: u64,
    /// Clips indexed
    #[serde(rename = "ic")]
    pub indexed_clips: u64,
    /// Skipped files
    #[serde(rename = "sc")]
    pub skip_count: usize,
    /// Number of errors encountered
    #[serde(rename = "ec")]
    pub error_count: usize,
    /// Whether the scan was cancelled
    pub cancelled: bool,
    /// Total scan duration in milliseconds
    pub ms: i64,
}

impl DoneMessage {
    /// Create a done message from a finished report
    pub fn new(seq: u64, ts: u64, report: &ScanReport) -> Self {
        Self {
            msg_type: "done",
            seq,
            ts,
            total_files: report.total_files,
            candidate_video_files: report.candidate_video_files,
            indexed_clips: report.indexed_clips,
            skip_count: report.skip_count(),
            error_count: report.error_count(),
            cancelled: report.cancelled,
            ms: report.duration().num_milliseconds(),
        }
    }
}

/// Progress reporter for outputting scan progress to stderr
///
/// Progress lines are throttled to `interval_ms`, except the final one
/// (processed == total) which always goes out.
#[derive(Debug)]
pub struct ProgressReporter {
    /// Whether progress reporting is enabled
    enabled: bool,
    /// Reporting interval in milliseconds
    interval_ms: u64,
    /// Last report time, `None` before the first progress line
    last_report: Cell<Option<Instant>>,
    /// Sequence number for messages
    seq: AtomicU64,
    /// Start time of the reporter
    start_time: Instant,
}

impl ProgressReporter {
    /// Create a new ProgressReporter
    ///
    /// # Arguments
    /// * `enabled` - Whether progress reporting is enabled
    /// * `interval_ms` - Minimum interval between progress messages in milliseconds
    pub fn new(enabled: bool, interval_ms: u64) -> Self {
        Self {
            enabled,
            interval_ms,
            last_report: Cell::new(None),
            seq: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Check if enough time has passed since the last report
    pub fn should_report(&self) -> bool {
        if !self.enabled {
            return false;
        }
        match self.last_report.get() {
            None => true,
            Some(last) => last.elapsed().as_millis() as u64 >= self.interval_ms,
        }
    }

    /// Get the next sequence number (monotonically increasing)
    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Get the current timestamp in milliseconds since reporter creation
    pub fn current_timestamp(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Output a serializable message to stderr as JSON
    pub fn output_to_stderr<T: Serialize>(&self, msg: &T) {
        if let Ok(json) = serde_json::to_string(msg) {
            eprintln!("{}", json);
            std::io::stderr().flush().ok();
        }
    }

    /// Report scan start
    pub fn report_start(&self, config: &ScanConfig) {
        if !self.enabled {
            return;
        }

        let msg = StartMessage::new(
            self.next_seq(),
            self.current_timestamp(),
            config.root.to_string_lossy().to_string(),
            config.timezone.clone(),
            config.cache_path.is_some(),
        );
        self.output_to_stderr(&msg);
    }

    /// Report scan progress
    ///
    /// Returns true if a message was actually sent.
    pub fn report_progress(&self, progress: &ScanProgress) -> bool {
        if !self.enabled {
            return false;
        }
        let is_final = progress.processed >= progress.total;
        if !is_final && !self.should_report() {
            return false;
        }

        let msg = ProgressMessage::new(self.next_seq(), self.current_timestamp(), progress);
        self.output_to_stderr(&msg);
        self.last_report.set(Some(Instant::now()));
        true
    }

    /// Report the per-file errors of a finished scan
    pub fn report_errors(&self, report: &ScanReport) {
        if !self.enabled {
            return;
        }
        for item in &report.errors {
            let msg = ErrorProgressMessage::new(self.next_seq(), self.current_timestamp(), item);
            self.output_to_stderr(&msg);
        }
    }

    /// Report scan completion
    pub fn report_done(&self, report: &ScanReport) {
        if !self.enabled {
            return;
        }

        let msg = DoneMessage::new(self.next_seq(), self.current_timestamp(), report);
        self.output_to_stderr(&msg);
    }

    /// Check if the reporter is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}
