//! Camera recording catalog
//!
//! Walks a directory of camera recordings, reads each clip's camera label and
//! start time from its file name, probes its duration with ffprobe, and builds
//! per-camera indexes answering "which clip covers this instant". Parsed and
//! probed results are memoized in an SQLite cache keyed by path, size,
//! modification time and timezone.

pub mod cache;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod parser;
pub mod probe;
pub mod progress;
pub mod scanner;

pub use cache::{CachedClip, FileStamp, MemoryScanCache, ScanCache, SqliteScanCache};
pub use config::ScanConfig;
pub use error::{ScanError, ScanErrorKind};
pub use index::{build_camera_indexes, overlapping_pairs};
pub use models::{
    CameraIndex, Clip, ScanErrorItem, ScanProgress, ScanReport, ScanSkippedItem, SkipReason,
};
pub use parser::{parse_timestamp_from_name, parse_timezone, FilenameParseResult};
pub use probe::{DurationProbe, FfprobeDurationProbe, StaticDurationProbe};
pub use progress::ProgressReporter;
pub use scanner::{CancellationFlag, ClipScanner, FileSystemClipScanner, InMemoryClipScanner};
