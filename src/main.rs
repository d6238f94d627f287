//! Clip Catalog CLI
//!
//! Scans a directory of camera recordings and answers questions about it.

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::{error, info};
use std::path::PathBuf;
use std::time::Duration;

use clip_catalog::config::{DEFAULT_FFPROBE, DEFAULT_PROGRESS_EVERY, DEFAULT_TIMEZONE};
use clip_catalog::parser::{parse_timezone, to_timezone};
use clip_catalog::{
    ClipScanner, FileSystemClipScanner, ProgressReporter, ScanCache, ScanConfig, ScanError,
    ScanReport, SqliteScanCache,
};

const ABOUT: &str = r#"
Clip Catalog - camera recording index

Examples:
  clip_catalog --root /recordings scan                      Scan and print a summary
  clip_catalog --root /recordings scan --json               Full report as JSON
  clip_catalog --root /recordings list-cameras              Camera labels
  clip_catalog --root /recordings list-clips --camera CamA  Clips of one camera
  clip_catalog --root /recordings clip-at --timestamp 2024-01-02T03:04:05
  clip_catalog --root /recordings prune-cache               Forget deleted files
  clip_catalog --root /recordings --ext dav scan            Also index .dav files
"#;

/// Camera recording catalog
#[derive(Parser)]
#[command(name = "clip_catalog")]
#[command(author, version, about = ABOUT, long_about = None)]
struct Cli {
    /// Directory holding the recordings
    #[arg(short = 'r', long, global = true, default_value = ".")]
    root: PathBuf,

    /// IANA timezone for filename timestamps
    #[arg(short = 'z', long, global = true, default_value = DEFAULT_TIMEZONE)]
    timezone: String,

    /// Cache database (defaults to <root>/.clip_cache.sqlite)
    #[arg(short = 'd', long, global = true)]
    cache: Option<PathBuf>,

    /// Do not read or write the cache
    #[arg(long, global = true, conflicts_with = "cache")]
    no_cache: bool,

    /// ffprobe executable
    #[arg(long, global = true, default_value = DEFAULT_FFPROBE)]
    ffprobe: PathBuf,

    /// Seconds before a single ffprobe run is abandoned (0 = wait forever)
    #[arg(long, global = true, default_value = "30")]
    probe_timeout: u64,

    /// Extra video extension to index (repeatable)
    #[arg(short = 'e', long = "ext", global = true)]
    extensions: Vec<String>,

    /// Follow symbolic links to directories
    #[arg(long, global = true)]
    follow_links: bool,

    /// Emit JSON progress lines on stderr
    #[arg(long, global = true)]
    progress: bool,

    /// Progress notification cadence in files
    #[arg(long, global = true, default_value_t = DEFAULT_PROGRESS_EVERY)]
    progress_every: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the root and print a summary
    Scan {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List camera labels
    ListCameras,
    /// List the clips of one camera, most recent first
    ListClips {
        /// Camera label (exact match)
        #[arg(short = 'c', long)]
        camera: String,
    },
    /// Find the clip of every camera covering a moment
    ClipAt {
        /// ISO-8601 moment; without an offset it is read in --timezone
        #[arg(short = 't', long)]
        timestamp: String,
    },
    /// Drop cache records for files that no longer exist
    PruneCache,
}

impl Cli {
    fn config(&self) -> ScanConfig {
        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        let mut builder = ScanConfig::builder()
            .root(root.clone())
            .timezone(self.timezone.clone())
            .ffprobe_path(self.ffprobe.clone())
            .probe_timeout((self.probe_timeout > 0).then(|| Duration::from_secs(self.probe_timeout)))
            .follow_links(self.follow_links)
            .progress_every(self.progress_every);
        for ext in &self.extensions {
            builder = builder.add_video_extension(ext);
        }
        if !self.no_cache {
            builder = builder.cache_path(
                self.cache
                    .clone()
                    .unwrap_or_else(|| ScanConfig::default_cache_path(&root)),
            );
        }
        builder.build()
    }
}

fn run_scan(config: &ScanConfig, show_progress: bool) -> Result<ScanReport, ScanError> {
    let mut scanner = FileSystemClipScanner::from_config(config)?;
    let reporter = ProgressReporter::new(show_progress, 500);

    reporter.report_start(config);
    let report = scanner.scan_with_progress(
        &config.root,
        &config.timezone,
        &mut |p| {
            reporter.report_progress(p);
        },
        &|| false,
    )?;
    reporter.report_errors(&report);
    reporter.report_done(&report);
    Ok(report)
}

fn run(cli: Cli) -> Result<i32, ScanError> {
    let config = cli.config();
    info!("Root: {}", config.root.display());
    info!("Timezone: {}", config.timezone);
    info!("Cache: {:?}", config.cache_path);

    match &cli.command {
        Commands::Scan { json } => {
            let report = run_scan(&config, cli.progress)?;
            if *json {
                let out = serde_json::to_string_pretty(&report)
                    .map_err(|e| ScanError::io_error(None, e.to_string()))?;
                println!("{}", out);
            } else {
                println!("Scan completed:");
                println!("  Total files: {}", report.total_files);
                println!("  Video files: {}", report.candidate_video_files);
                println!("  Indexed clips: {}", report.indexed_clips);
                println!("  Cameras: {}", report.camera_indexes.len());
                println!("  Skipped: {}", report.skip_count());
                println!("  Errors: {}", report.error_count());
                if report.cancelled {
                    println!("  Cancelled after {} files", report.processed_files);
                }
                println!("  Duration: {}ms", report.duration().num_milliseconds());
            }
        }
        Commands::ListCameras => {
            let report = run_scan(&config, cli.progress)?;
            for label in report.camera_labels() {
                println!("{}", label);
            }
        }
        Commands::ListClips { camera } => {
            let report = run_scan(&config, cli.progress)?;
            let Some(index) = report.camera(camera) else {
                eprintln!("No such camera: {}", camera);
                return Ok(1);
            };
            for clip in index.clips() {
                println!(
                    "{} -> {} | {}",
                    clip.start().to_rfc3339(),
                    clip.end().to_rfc3339(),
                    clip.path().display()
                );
            }
        }
        Commands::ClipAt { timestamp } => {
            let tz = parse_timezone(&config.timezone)?;
            let Some(moment) = to_timezone(timestamp, &tz) else {
                eprintln!("Cannot read timestamp: {}", timestamp);
                return Ok(2);
            };
            let report = run_scan(&config, cli.progress)?;
            for index in &report.camera_indexes {
                if let Some(clip) = index.clip_for_time(&moment) {
                    println!("{}: {}", index.camera_label(), clip.path().display());
                }
            }
        }
        Commands::PruneCache => {
            let Some(cache_path) = &config.cache_path else {
                eprintln!("Cache is disabled");
                return Ok(1);
            };
            let mut cache = SqliteScanCache::open(cache_path)?;
            let removed = cache.prune_missing()?;
            println!("Removed {} stale cache records, {} left", removed, cache.len()?);
        }
    }
    Ok(0)
}

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}
