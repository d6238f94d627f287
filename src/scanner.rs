//! Scanner module - walks a recordings tree and builds the clip catalog

use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::cache::{FileStamp, ScanCache, SqliteScanCache};
use crate::config::{has_extension_in, ScanConfig};
use crate::error::ScanError;
use crate::index::{build_camera_indexes, overlapping_pairs};
use crate::models::{
    Clip, ScanErrorItem, ScanProgress, ScanReport, ScanSkippedItem, SkipReason,
    PROBE_FAILED_MESSAGE,
};
use crate::parser::{parse_timestamp_from_name, parse_timezone};
use crate::probe::{DurationProbe, FfprobeDurationProbe};

/// Progress hook, called on the scanning thread
pub type ProgressHook<'a> = &'a mut dyn FnMut(&ScanProgress);

/// Cancellation predicate, checked before each file
pub type CancelCheck<'a> = &'a dyn Fn() -> bool;

/// Something that turns a recordings root into a scan report
pub trait ClipScanner {
    /// Scan without progress or cancellation
    fn scan(&mut self, root: &Path, timezone: &str) -> Result<ScanReport, ScanError> {
        self.scan_with_progress(root, timezone, &mut |_| {}, &|| false)
    }

    /// Scan, reporting progress and polling `should_cancel` between files
    fn scan_with_progress(
        &mut self,
        root: &Path,
        timezone: &str,
        progress: ProgressHook<'_>,
        should_cancel: CancelCheck<'_>,
    ) -> Result<ScanReport, ScanError>;
}

/// Shared flag for stopping a scan running on another thread
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the scan to stop before its next file
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clear the flag so the scanner can be reused
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Scanner over the real filesystem
///
/// Runs strictly sequentially: enumerate, then for each file check the cache,
/// parse the name, probe the duration and store the result. Only a missing
/// root (or an unknown timezone) fails the scan; everything else ends up in
/// the report's skip and error lists.
pub struct FileSystemClipScanner {
    probe: Box<dyn DurationProbe>,
    cache: Option<Box<dyn ScanCache>>,
    video_extensions: HashSet<String>,
    progress_every: u64,
    follow_links: bool,
}

impl std::fmt::Debug for FileSystemClipScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemClipScanner")
            .field("cached", &self.cache.is_some())
            .field("video_extensions", &self.video_extensions)
            .field("progress_every", &self.progress_every)
            .field("follow_links", &self.follow_links)
            .finish()
    }
}

/// Counters and lists accumulated while processing files
#[derive(Debug, Default)]
struct ScanState {
    processed: u64,
    candidate_video_files: u64,
    cache_hits: u64,
    clips: Vec<Clip>,
    skipped: Vec<ScanSkippedItem>,
    errors: Vec<ScanErrorItem>,
}

impl FileSystemClipScanner {
    /// Create an uncached scanner with default settings
    pub fn new(probe: impl DurationProbe + 'static) -> Self {
        let defaults = ScanConfig::default();
        Self {
            probe: Box::new(probe),
            cache: None,
            video_extensions: defaults.video_extensions,
            progress_every: defaults.progress_every,
            follow_links: defaults.follow_links,
        }
    }

    /// Build the production scanner: ffprobe plus an SQLite cache when configured
    ///
    /// A missing root fails here, before the cache file is opened or created.
    pub fn from_config(config: &ScanConfig) -> Result<Self, ScanError> {
        if !config.root.is_dir() {
            return Err(ScanError::root_not_found(config.root.clone()));
        }
        let mut scanner =
            Self::new(FfprobeDurationProbe::from_config(config)).with_settings(config);
        if let Some(cache_path) = &config.cache_path {
            scanner = scanner.with_cache(SqliteScanCache::open(cache_path)?);
        }
        Ok(scanner)
    }

    /// Attach a cache
    pub fn with_cache(mut self, cache: impl ScanCache + 'static) -> Self {
        self.cache = Some(Box::new(cache));
        self
    }

    /// Take extensions, progress cadence and link handling from `config`
    pub fn with_settings(mut self, config: &ScanConfig) -> Self {
        self.video_extensions = config.video_extensions.clone();
        self.progress_every = config.effective_progress_every();
        self.follow_links = config.follow_links;
        self
    }

    /// The attached cache, if any
    pub fn cache_mut(&mut self) -> Option<&mut (dyn ScanCache + 'static)> {
        self.cache.as_deref_mut()
    }

    fn is_video(&self, path: &Path) -> bool {
        has_extension_in(path, &self.video_extensions)
    }

    /// Every regular file under `root`, in a stable order
    ///
    /// Symlinks to files count even when links are not followed; linked
    /// directories are only descended into with `follow_links`.
    fn enumerate(&self, root: &Path, errors: &mut Vec<ScanErrorItem>) -> Vec<PathBuf> {
        let walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name()
            .into_iter();

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(entry) if entry.path_is_symlink() && entry.path().is_file() => {
                    files.push(entry.into_path())
                }
                Ok(_) => {}
                Err(e) => {
                    log::warn!("Cannot read entry while walking {}: {}", root.display(), e);
                    errors.push(
                        ScanErrorItem::new(e.path().map(Path::to_path_buf), e.to_string())
                            .with_context("enumeration"),
                    );
                }
            }
        }
        files
    }

    /// Handle one candidate file
    fn process_file(&mut self, path: PathBuf, tz: &chrono_tz::Tz, state: &mut ScanState) {
        if !self.is_video(&path) {
            state.skipped.push(ScanSkippedItem {
                path,
                reason: SkipReason::UnsupportedExtension,
            });
            return;
        }
        state.candidate_video_files += 1;

        let timezone = tz.name();
        let stamp = match FileStamp::of(&path) {
            Ok(stamp) => Some(stamp),
            Err(e) => {
                log::warn!("Cannot stat {}, bypassing cache: {}", path.display(), e);
                None
            }
        };

        if let (Some(cache), Some(stamp)) = (self.cache.as_deref(), stamp.as_ref()) {
            match cache.load(&path, stamp, timezone) {
                Ok(Some(cached)) => {
                    log::debug!("Cache hit: {}", path.display());
                    state.cache_hits += 1;
                    state.clips.push(cached.into_clip());
                    return;
                }
                Ok(None) => log::debug!("Cache miss: {}", path.display()),
                Err(e) => log::warn!("Cache lookup failed for {}: {}", path.display(), e),
            }
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some(parsed) = parse_timestamp_from_name(&file_name, tz) else {
            state.skipped.push(ScanSkippedItem {
                path,
                reason: SkipReason::NoTimestamp,
            });
            return;
        };

        let probed = self.probe.probe(&path);
        if probed.is_none() {
            state.errors.push(
                ScanErrorItem::new(Some(path.clone()), PROBE_FAILED_MESSAGE)
                    .with_context("duration probe"),
            );
        }

        let clip = Clip::new(
            path,
            parsed.camera_label,
            parsed.timestamp,
            probed.unwrap_or(0.0),
        );

        // Only fully computed clips are remembered, so a failed probe is retried next scan
        if let (Some(cache), Some(stamp), Some(_)) =
            (self.cache.as_deref_mut(), stamp.as_ref(), probed)
        {
            if let Err(e) = cache.save(&clip, stamp, timezone) {
                log::warn!("Cache save failed for {}: {}", clip.path().display(), e);
                state.errors.push(
                    ScanErrorItem::new(Some(clip.path().to_path_buf()), e.message)
                        .with_context("cache"),
                );
            }
        }

        state.clips.push(clip);
    }
}

impl ClipScanner for FileSystemClipScanner {
    fn scan_with_progress(
        &mut self,
        root: &Path,
        timezone: &str,
        progress: ProgressHook<'_>,
        should_cancel: CancelCheck<'_>,
    ) -> Result<ScanReport, ScanError> {
        let started_at = Utc::now();

        if !root.is_dir() {
            return Err(ScanError::root_not_found(root.to_path_buf()));
        }
        let tz = parse_timezone(timezone)?;
        // Cache keys and clip paths are absolute regardless of how the root was given
        let absolute_root = root
            .canonicalize()
            .map_err(|e| ScanError::io_error(Some(root.to_path_buf()), e.to_string()))?;
        let root = absolute_root.as_path();

        log::info!("Scanning {} (timezone {})", root.display(), tz.name());

        let mut state = ScanState::default();
        let candidates = self.enumerate(root, &mut state.errors);
        let total_files = candidates.len() as u64;
        let mut cancelled = false;

        for path in candidates {
            if should_cancel() {
                log::info!(
                    "Scan cancelled after {} of {} files",
                    state.processed,
                    total_files
                );
                cancelled = true;
                break;
            }

            state.processed += 1;
            if state.processed % self.progress_every == 0 || state.processed == total_files {
                progress(&ScanProgress {
                    processed: state.processed,
                    total: total_files,
                    message: format!(
                        "Processing: {}",
                        path.file_name()
                            .map(|n| n.to_string_lossy())
                            .unwrap_or_default()
                    ),
                });
            }

            self.process_file(path, &tz, &mut state);
        }

        let camera_indexes = build_camera_indexes(state.clips);
        for index in &camera_indexes {
            let overlaps = overlapping_pairs(index);
            if !overlaps.is_empty() {
                log::warn!(
                    "Camera {:?} has {} overlapping clip pair(s)",
                    index.camera_label(),
                    overlaps.len()
                );
            }
        }
        let indexed_clips = camera_indexes.iter().map(|i| i.len() as u64).sum::<u64>();

        let report = ScanReport {
            root: root.to_path_buf(),
            timezone: tz.name().to_string(),
            total_files,
            processed_files: state.processed,
            candidate_video_files: state.candidate_video_files,
            indexed_clips,
            camera_indexes,
            skipped: state.skipped,
            errors: state.errors,
            cancelled,
            started_at,
            finished_at: Utc::now(),
        };

        log::info!(
            "{} ({} cache hits, {} cameras)",
            report.summary(),
            state.cache_hits,
            report.camera_indexes.len()
        );
        Ok(report)
    }
}

/// Scanner over a fixed list of clips, for callers that need a catalog
/// without touching the filesystem
#[derive(Debug, Clone, Default)]
pub struct InMemoryClipScanner {
    clips: Vec<Clip>,
}

impl InMemoryClipScanner {
    /// Create a scanner that always reports `clips`
    pub fn new(clips: Vec<Clip>) -> Self {
        Self { clips }
    }
}

impl ClipScanner for InMemoryClipScanner {
    fn scan_with_progress(
        &mut self,
        root: &Path,
        timezone: &str,
        progress: ProgressHook<'_>,
        should_cancel: CancelCheck<'_>,
    ) -> Result<ScanReport, ScanError> {
        let started_at = Utc::now();
        let tz = parse_timezone(timezone)?;
        let total_files = self.clips.len() as u64;

        let mut processed = 0;
        let mut cancelled = false;
        let mut clips = Vec::new();
        for clip in &self.clips {
            if should_cancel() {
                cancelled = true;
                break;
            }
            processed += 1;
            progress(&ScanProgress {
                processed,
                total: total_files,
                message: format!("Processing: {}", clip.path().display()),
            });
            clips.push(clip.clone());
        }

        let camera_indexes = build_camera_indexes(clips);
        Ok(ScanReport {
            root: root.to_path_buf(),
            timezone: tz.name().to_string(),
            total_files,
            processed_files: processed,
            candidate_video_files: processed,
            indexed_clips: camera_indexes.iter().map(|i| i.len() as u64).sum::<u64>(),
            camera_indexes,
            skipped: Vec::new(),
            errors: Vec::new(),
            cancelled,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
