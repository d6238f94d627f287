//! Clip duration probing via ffprobe

use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{ScanConfig, DEFAULT_FFPROBE};
use crate::error::ScanError;

/// Poll interval while waiting for a bounded probe
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Something that can tell how long a clip plays
///
/// `None` means the duration is unavailable; callers treat that as a per-file
/// problem and keep going.
pub trait DurationProbe {
    /// Duration of the clip at `path` in seconds
    fn probe(&self, path: &Path) -> Option<f64>;
}

/// Runs `ffprobe -show_entries format=duration -of json`
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl Default for FfprobeDurationProbe {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_FFPROBE),
            timeout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<serde_json::Value>,
}

impl FfprobeDurationProbe {
    /// Create a probe for the given executable
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
        }
    }

    /// Create a probe from the scan configuration
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(config.ffprobe_path.clone()).with_timeout(config.probe_timeout)
    }

    /// Bound how long a single run may take
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("json")
            .arg(path.as_os_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd
    }

    /// Run ffprobe and return its stdout
    ///
    /// Stdout is drained on a helper thread while waiting, so a chatty child
    /// cannot stall on a full pipe.
    fn run(&self, path: &Path) -> Result<Vec<u8>, ScanError> {
        let mut child = self
            .command(path)
            .spawn()
            .map_err(|e| ScanError::probe_error(path.to_path_buf(), format!("spawn failed: {e}")))?;

        let reader = child.stdout.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut stdout = Vec::new();
                pipe.read_to_end(&mut stdout).map(|_| stdout)
            })
        });

        // On failure the reader is left detached; it ends once the pipe closes.
        let status = match self.timeout {
            Some(timeout) => wait_bounded(&mut child, timeout)
                .map_err(|e| ScanError::probe_error(path.to_path_buf(), e))?,
            None => child
                .wait()
                .map_err(|e| ScanError::probe_error(path.to_path_buf(), e.to_string()))?,
        };

        if !status.success() {
            return Err(ScanError::probe_error(
                path.to_path_buf(),
                format!("ffprobe exited with {status}"),
            ));
        }

        match reader {
            Some(handle) => handle
                .join()
                .map_err(|_| ScanError::probe_error(path.to_path_buf(), "stdout reader panicked"))?
                .map_err(|e| ScanError::probe_error(path.to_path_buf(), e.to_string())),
            None => Ok(Vec::new()),
        }
    }
}

/// Wait for `child`, killing it once `timeout` has passed
fn wait_bounded(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus, String> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(format!("timed out after {:?}", timeout));
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(e.to_string()),
        }
    }
}

/// Pull `format.duration` out of ffprobe's JSON
///
/// ffprobe prints the duration as a string; plain numbers are accepted too.
pub fn parse_ffprobe_duration(stdout: &[u8]) -> Option<f64> {
    let output: FfprobeOutput = serde_json::from_slice(stdout).ok()?;
    let seconds = match output.format?.duration? {
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

impl DurationProbe for FfprobeDurationProbe {
    fn probe(&self, path: &Path) -> Option<f64> {
        let stdout = match self.run(path) {
            Ok(stdout) => stdout,
            Err(e) => {
                log::warn!("Duration probe failed: {}", e);
                return None;
            }
        };
        let duration = parse_ffprobe_duration(&stdout);
        if duration.is_none() {
            log::warn!("ffprobe returned no usable duration for {}", path.display());
        }
        duration
    }
}

/// Probe backed by a fixed path-to-duration table
///
/// Clones share the table and the call counter.
#[derive(Debug, Clone, Default)]
pub struct StaticDurationProbe {
    durations: Arc<Mutex<HashMap<PathBuf, f64>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticDurationProbe {
    /// Create an empty probe; every lookup is unavailable
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a duration for `path`
    pub fn with_duration(self, path: impl Into<PathBuf>, seconds: f64) -> Self {
        self.set_duration(path, seconds);
        self
    }

    /// Register or replace a duration for `path`
    pub fn set_duration(&self, path: impl Into<PathBuf>, seconds: f64) {
        if let Ok(mut durations) = self.durations.lock() {
            durations.insert(path.into(), seconds);
        }
    }

    /// Number of probe calls so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DurationProbe for StaticDurationProbe {
    fn probe(&self, path: &Path) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.durations.lock().ok()?.get(path).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_duration() {
        let json = br#"{"format": {"duration": "61.250000"}}"#;
        assert_eq!(parse_ffprobe_duration(json), Some(61.25));
    }

    #[test]
    fn test_parse_numeric_duration() {
        let json = br#"{"format": {"duration": 12}}"#;
        assert_eq!(parse_ffprobe_duration(json), Some(12.0));
    }

    #[test]
    fn test_parse_rejects_malformed_output() {
        assert_eq!(parse_ffprobe_duration(b""), None);
        assert_eq!(parse_ffprobe_duration(b"not json"), None);
        assert_eq!(parse_ffprobe_duration(br#"{}"#), None);
        assert_eq!(parse_ffprobe_duration(br#"{"format": {}}"#), None);
        assert_eq!(parse_ffprobe_duration(br#"{"format": {"duration": "N/A"}}"#), None);
        assert_eq!(parse_ffprobe_duration(br#"{"format": {"duration": null}}"#), None);
        assert_eq!(parse_ffprobe_duration(br#"{"format": {"duration": "-3.0"}}"#), None);
        assert_eq!(parse_ffprobe_duration(br#"{"format": {"duration": "inf"}}"#), None);
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let probe = FfprobeDurationProbe::new("/nonexistent/bin/ffprobe-missing");
        assert_eq!(probe.probe(Path::new("/tmp/whatever.mp4")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_unavailable() {
        let probe = FfprobeDurationProbe::new("false");
        assert_eq!(probe.probe(Path::new("/tmp/whatever.mp4")), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_probe_times_out() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-probe.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(file, "#!/bin/sh\nsleep 5").unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let probe =
            FfprobeDurationProbe::new(&script).with_timeout(Some(Duration::from_millis(100)));
        let start = Instant::now();
        assert_eq!(probe.probe(Path::new("/tmp/whatever.mp4")), None);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_script_probe_output_is_parsed() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ffprobe.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        writeln!(
            file,
            "#!/bin/sh\necho '{{\"format\": {{\"duration\": \"42.5\"}}}}'"
        )
        .unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let probe = FfprobeDurationProbe::new(&script).with_timeout(Some(Duration::from_secs(5)));
        assert_eq!(probe.probe(Path::new("/tmp/whatever.mp4")), Some(42.5));
    }

    #[cfg(unix)]
    #[test]
    fn test_large_output_does_not_stall() {
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("chatty-ffprobe.sh");
        let mut file = std::fs::File::create(&script).unwrap();
        // 256 KiB of leading whitespace overflows any pipe buffer
        writeln!(
            file,
            "#!/bin/sh\nhead -c 262144 /dev/zero | tr '\\000' ' '\necho '{{\"format\": {{\"duration\": \"7.5\"}}}}'"
        )
        .unwrap();
        drop(file);
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let probe = FfprobeDurationProbe::new(&script).with_timeout(Some(Duration::from_secs(5)));
        let start = Instant::now();
        assert_eq!(probe.probe(Path::new("/tmp/whatever.mp4")), Some(7.5));
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_static_probe_counts_calls() {
        let probe = StaticDurationProbe::new().with_duration("/rec/a.mp4", 30.0);
        let shared = probe.clone();

        assert_eq!(probe.probe(Path::new("/rec/a.mp4")), Some(30.0));
        assert_eq!(probe.probe(Path::new("/rec/b.mp4")), None);
        assert_eq!(shared.calls(), 2);
    }
}
