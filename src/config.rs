//! Configuration for the clip catalog

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default interpretation timezone for filename timestamps
pub const DEFAULT_TIMEZONE: &str = "Europe/Warsaw";

/// Default progress cadence (files processed)
pub const DEFAULT_PROGRESS_EVERY: u64 = 25;

/// Default upper bound for a single ffprobe run
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default ffprobe executable
pub const DEFAULT_FFPROBE: &str = "ffprobe";

/// Cache file name placed in the scan root by the CLI
pub const DEFAULT_CACHE_FILE_NAME: &str = ".clip_cache.sqlite";

/// Whether `path` ends in one of `extensions` (lowercase, without the dot)
pub fn has_extension_in(path: &Path, extensions: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.contains(&e.to_lowercase()))
        .unwrap_or(false)
}

/// Configuration for a clip scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Root directory holding the recordings
    pub root: PathBuf,

    /// IANA timezone used to interpret filename timestamps
    pub timezone: String,

    /// Video extensions (lowercase, without dot)
    pub video_extensions: HashSet<String>,

    /// SQLite cache location; `None` disables caching
    pub cache_path: Option<PathBuf>,

    /// ffprobe executable
    pub ffprobe_path: PathBuf,

    /// Upper bound for one probe run; `None` waits forever
    pub probe_timeout: Option<Duration>,

    /// Emit a progress notification every N processed files
    pub progress_every: u64,

    /// Whether to follow symbolic links while walking
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            timezone: DEFAULT_TIMEZONE.to_string(),
            video_extensions: Self::default_video_extensions(),
            cache_path: None,
            ffprobe_path: PathBuf::from(DEFAULT_FFPROBE),
            probe_timeout: Some(DEFAULT_PROBE_TIMEOUT),
            progress_every: DEFAULT_PROGRESS_EVERY,
            follow_links: false,
        }
    }
}

impl ScanConfig {
    /// Create a config builder
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::new()
    }

    /// Get the default video extensions
    pub fn default_video_extensions() -> HashSet<String> {
        [
            "mp4", "mkv", "avi", "ts", "mpg", "mpeg", "mov", "m2ts", "vob", "wmv",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    /// Default cache location for a root directory
    pub fn default_cache_path(root: &Path) -> PathBuf {
        root.join(DEFAULT_CACHE_FILE_NAME)
    }

    /// Effective progress cadence (never zero)
    pub fn effective_progress_every(&self) -> u64 {
        self.progress_every.max(1)
    }
}

/// Builder for ScanConfig
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory
    pub fn root(mut self, root: PathBuf) -> Self {
        self.config.root = root;
        self
    }

    /// Set the interpretation timezone
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.config.timezone = timezone.into();
        self
    }

    /// Add a video extension
    pub fn add_video_extension(mut self, ext: impl AsRef<str>) -> Self {
        self.config
            .video_extensions
            .insert(ext.as_ref().trim_start_matches('.').to_lowercase());
        self
    }

    /// Set the cache database path
    pub fn cache_path(mut self, path: PathBuf) -> Self {
        self.config.cache_path = Some(path);
        self
    }

    /// Set the ffprobe executable
    pub fn ffprobe_path(mut self, path: PathBuf) -> Self {
        self.config.ffprobe_path = path;
        self
    }

    /// Set the probe timeout
    pub fn probe_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Set the progress cadence
    pub fn progress_every(mut self, every: u64) -> Self {
        self.config.progress_every = every;
        self
    }

    /// Enable or disable following symbolic links
    pub fn follow_links(mut self, enabled: bool) -> Self {
        self.config.follow_links = enabled;
        self
    }

    /// Build the config
    pub fn build(self) -> ScanConfig {
        self.config
    }
}
