//! Core data models for the clip catalog

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One indexed recording segment
///
/// Immutable once built. `end` is always `start + duration` and the duration is
/// never negative.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clip {
    path: PathBuf,
    camera_label: String,
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    duration_seconds: f64,
}

impl Clip {
    /// Create a clip; negative or non-finite durations collapse to zero
    pub fn new(
        path: PathBuf,
        camera_label: impl Into<String>,
        start: DateTime<FixedOffset>,
        duration_seconds: f64,
    ) -> Self {
        let mut duration_seconds = if duration_seconds.is_finite() && duration_seconds > 0.0 {
            duration_seconds
        } else {
            0.0
        };
        let delta = TimeDelta::microseconds((duration_seconds * 1_000_000.0).round() as i64);
        let end = match start.checked_add_signed(delta) {
            Some(end) => end,
            None => {
                duration_seconds = 0.0;
                start
            }
        };
        Self {
            path,
            camera_label: camera_label.into(),
            start,
            end,
            duration_seconds,
        }
    }

    /// Source file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Camera label derived from the filename
    pub fn camera_label(&self) -> &str {
        &self.camera_label
    }

    /// Recording start
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.start
    }

    /// Recording end
    pub fn end(&self) -> DateTime<FixedOffset> {
        self.end
    }

    /// Playback duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.duration_seconds
    }

    /// Playback duration
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.duration_seconds)
    }

    /// Whether `moment` falls inside `[start, end]`
    pub fn contains(&self, moment: &DateTime<FixedOffset>) -> bool {
        self.start <= *moment && *moment <= self.end
    }
}

/// Clips of one camera, most recent first
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraIndex {
    camera_label: String,
    clips: Vec<Clip>,
}

impl CameraIndex {
    /// Built by [`crate::index::build_camera_indexes`], which guarantees ordering
    pub(crate) fn new(camera_label: String, clips: Vec<Clip>) -> Self {
        Self {
            camera_label,
            clips,
        }
    }

    /// Camera label shared by every clip in the index
    pub fn camera_label(&self) -> &str {
        &self.camera_label
    }

    /// Clips sorted by start time descending
    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// Number of clips
    pub fn len(&self) -> usize {
        self.clips.len()
    }

    /// Whether the index holds no clips
    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Clip covering `moment`, if any
    ///
    /// When intervals overlap the most recently started covering clip wins.
    pub fn clip_for_time(&self, moment: &DateTime<FixedOffset>) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.contains(moment))
    }
}

/// Why a file was left out of the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Extension not in the video set
    UnsupportedExtension,
    /// No timestamp token in the file name
    NoTimestamp,
}

impl SkipReason {
    /// Human-readable reason
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::UnsupportedExtension => "unsupported extension",
            SkipReason::NoTimestamp => "no timestamp in filename",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A file the scan looked at and deliberately skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSkippedItem {
    /// Skipped file
    pub path: PathBuf,
    /// Reason for skipping
    pub reason: SkipReason,
}

/// Message recorded when a clip's duration could not be read
pub const PROBE_FAILED_MESSAGE: &str = "could not read clip duration";

/// A per-file problem that did not stop the scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanErrorItem {
    /// Affected path, if known
    pub path: Option<PathBuf>,
    /// Human-readable message
    pub message: String,
    /// Stage that produced the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ScanErrorItem {
    /// Create an error item
    pub fn new(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path,
            message: message.into(),
            context: None,
        }
    }

    /// Attach the stage that produced the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Progress notification handed to the caller's hook
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanProgress {
    /// Files processed so far (including skipped ones)
    pub processed: u64,
    /// Files found during enumeration
    pub total: u64,
    /// Short description of the current file
    pub message: String,
}

impl ScanProgress {
    /// Percentage done, 100 for an empty scan
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }
}

/// Result of one scan invocation
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Scanned root
    pub root: PathBuf,
    /// Timezone used to interpret filename timestamps
    pub timezone: String,
    /// Regular files found during enumeration
    pub total_files: u64,
    /// Files handled before completion or cancellation
    pub processed_files: u64,
    /// Files with a supported video extension
    pub candidate_video_files: u64,
    /// Clips that made it into the indexes
    pub indexed_clips: u64,
    /// Per-camera indexes, sorted by camera label
    pub camera_indexes: Vec<CameraIndex>,
    /// Files skipped on purpose
    pub skipped: Vec<ScanSkippedItem>,
    /// Recoverable per-file errors
    pub errors: Vec<ScanErrorItem>,
    /// Whether the cancellation hook stopped the scan
    pub cancelled: bool,
    /// Scan start
    pub started_at: DateTime<Utc>,
    /// Scan completion
    pub finished_at: DateTime<Utc>,
}

impl ScanReport {
    /// Number of skipped files
    pub fn skip_count(&self) -> usize {
        self.skipped.len()
    }

    /// Number of recoverable errors
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Wall-clock scan duration
    pub fn duration(&self) -> TimeDelta {
        self.finished_at - self.started_at
    }

    /// Index for a camera label (exact match)
    pub fn camera(&self, camera_label: &str) -> Option<&CameraIndex> {
        self.camera_indexes
            .iter()
            .find(|index| index.camera_label() == camera_label)
    }

    /// Camera labels in report order
    pub fn camera_labels(&self) -> impl Iterator<Item = &str> {
        self.camera_indexes.iter().map(|index| index.camera_label())
    }

    /// Every indexed clip, camera by camera
    pub fn clips(&self) -> impl Iterator<Item = &Clip> {
        self.camera_indexes.iter().flat_map(|index| index.clips())
    }

    /// Clip of `camera_label` covering `moment`
    pub fn clip_for_time(
        &self,
        camera_label: &str,
        moment: &DateTime<FixedOffset>,
    ) -> Option<&Clip> {
        self.camera(camera_label)
            .and_then(|index| index.clip_for_time(moment))
    }

    /// One-line summary of the counts
    pub fn summary(&self) -> String {
        format!(
            "Scanned: {} files, videos: {}, clips: {}, skipped: {}, errors: {}",
            self.total_files,
            self.candidate_video_files,
            self.indexed_clips,
            self.skip_count(),
            self.error_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, h, m, s)
            .unwrap()
    }

    #[test]
    fn test_clip_end_is_start_plus_duration() {
        let clip = Clip::new(PathBuf::from("/rec/a.mp4"), "CamA", at(3, 4, 5), 90.5);
        assert_eq!(clip.end() - clip.start(), TimeDelta::milliseconds(90_500));
        assert_eq!(clip.duration(), std::time::Duration::from_millis(90_500));
        assert_eq!(clip.camera_label(), "CamA");
    }

    #[test]
    fn test_clip_rejects_negative_and_nan_duration() {
        let negative = Clip::new(PathBuf::from("/rec/a.mp4"), "CamA", at(3, 0, 0), -5.0);
        assert_eq!(negative.duration_seconds(), 0.0);
        assert_eq!(negative.end(), negative.start());

        let nan = Clip::new(PathBuf::from("/rec/b.mp4"), "CamA", at(3, 0, 0), f64::NAN);
        assert_eq!(nan.duration_seconds(), 0.0);
        assert!(nan.end() >= nan.start());
    }

    #[test]
    fn test_clip_contains_is_inclusive() {
        let clip = Clip::new(PathBuf::from("/rec/a.mp4"), "CamA", at(3, 0, 0), 60.0);
        assert!(clip.contains(&at(3, 0, 0)));
        assert!(clip.contains(&at(3, 0, 30)));
        assert!(clip.contains(&at(3, 1, 0)));
        assert!(!clip.contains(&at(2, 59, 59)));
        assert!(!clip.contains(&at(3, 1, 1)));
    }

    #[test]
    fn test_clip_contains_compares_instants_across_offsets() {
        let clip = Clip::new(PathBuf::from("/rec/a.mp4"), "CamA", at(3, 0, 0), 60.0);
        // 02:00:30Z is 03:00:30+01:00
        let utc = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 2, 2, 0, 30)
            .unwrap();
        assert!(clip.contains(&utc));
    }

    #[test]
    fn test_camera_index_clip_for_time() {
        let index = CameraIndex::new(
            "CamA".to_string(),
            vec![
                Clip::new(PathBuf::from("/rec/b.mp4"), "CamA", at(4, 0, 0), 60.0),
                Clip::new(PathBuf::from("/rec/a.mp4"), "CamA", at(3, 0, 0), 60.0),
            ],
        );
        let hit = index.clip_for_time(&at(3, 0, 45)).unwrap();
        assert_eq!(hit.path(), Path::new("/rec/a.mp4"));
        assert!(index.clip_for_time(&at(3, 30, 0)).is_none());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_skip_reason_text() {
        assert_eq!(SkipReason::UnsupportedExtension.to_string(), "unsupported extension");
        assert_eq!(SkipReason::NoTimestamp.to_string(), "no timestamp in filename");
        assert_eq!(
            serde_json::to_string(&SkipReason::NoTimestamp).unwrap(),
            "\"no_timestamp\""
        );
    }

    #[test]
    fn test_scan_progress_percent() {
        let progress = ScanProgress {
            processed: 25,
            total: 100,
            message: String::new(),
        };
        assert_eq!(progress.percent(), 25.0);

        let empty = ScanProgress {
            processed: 0,
            total: 0,
            message: String::new(),
        };
        assert_eq!(empty.percent(), 100.0);
    }

    #[test]
    fn test_report_lookup_and_summary() {
        let started = Utc::now();
        let report = ScanReport {
            root: PathBuf::from("/rec"),
            timezone: "UTC".to_string(),
            total_files: 3,
            processed_files: 3,
            candidate_video_files: 2,
            indexed_clips: 1,
            camera_indexes: vec![CameraIndex::new(
                "CamA".to_string(),
                vec![Clip::new(PathBuf::from("/rec/a.mp4"), "CamA", at(3, 0, 0), 60.0)],
            )],
            skipped: vec![ScanSkippedItem {
                path: PathBuf::from("/rec/notes.txt"),
                reason: SkipReason::UnsupportedExtension,
            }],
            errors: vec![ScanErrorItem::new(
                Some(PathBuf::from("/rec/a.mp4")),
                PROBE_FAILED_MESSAGE,
            )],
            cancelled: false,
            started_at: started,
            finished_at: started,
        };

        assert!(report.clip_for_time("CamA", &at(3, 0, 10)).is_some());
        assert!(report.clip_for_time("CamB", &at(3, 0, 10)).is_none());
        assert_eq!(report.camera_labels().collect::<Vec<_>>(), vec!["CamA"]);
        assert_eq!(report.clips().count(), 1);
        assert_eq!(report.duration(), TimeDelta::zero());
        assert_eq!(
            report.summary(),
            "Scanned: 3 files, videos: 2, clips: 1, skipped: 1, errors: 1"
        );
    }
}
