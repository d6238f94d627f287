//! Persistent clip cache keyed by file identity

use chrono::{DateTime, FixedOffset};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::ScanError;
use crate::models::Clip;

/// Size and modification time observed for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileStamp {
    /// File size in bytes
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: i64,
}

impl FileStamp {
    /// Build a stamp from filesystem metadata
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let mtime_ns = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self {
            size: metadata.len(),
            mtime_ns,
        }
    }

    /// Stat `path` and build its stamp
    pub fn of(path: &Path) -> Result<Self, ScanError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ScanError::io_error(Some(path.to_path_buf()), e.to_string()))?;
        Ok(Self::from_metadata(&metadata))
    }
}

/// Clip fields remembered from an earlier scan
#[derive(Debug, Clone, PartialEq)]
pub struct CachedClip {
    /// File the record belongs to
    pub path: PathBuf,
    /// Camera label
    pub camera_label: String,
    /// Start time as computed in the recorded timezone
    pub start_time: DateTime<FixedOffset>,
    /// Duration in seconds
    pub duration_seconds: f64,
}

impl CachedClip {
    /// Rebuild the clip without parsing or probing
    pub fn into_clip(self) -> Clip {
        Clip::new(
            self.path,
            self.camera_label,
            self.start_time,
            self.duration_seconds,
        )
    }
}

/// Identity-keyed memo of parsed and probed clips
///
/// A record is only returned when the stored size, modification time and
/// timezone all equal the ones passed in.
pub trait ScanCache {
    /// Look up `path`; `stamp` is the file's current state
    fn load(
        &self,
        path: &Path,
        stamp: &FileStamp,
        timezone: &str,
    ) -> Result<Option<CachedClip>, ScanError>;

    /// Insert or replace the record for `clip`'s path
    fn save(&mut self, clip: &Clip, stamp: &FileStamp, timezone: &str) -> Result<(), ScanError>;

    /// Drop records whose file no longer exists; returns how many went
    fn prune_missing(&mut self) -> Result<usize, ScanError>;

    /// Number of stored records
    fn len(&self) -> Result<usize, ScanError>;

    /// Whether the cache holds no records
    fn is_empty(&self) -> Result<bool, ScanError> {
        Ok(self.len()? == 0)
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// SQLite-backed cache
pub struct SqliteScanCache {
    conn: Connection,
}

impl std::fmt::Debug for SqliteScanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteScanCache")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteScanCache {
    /// Open or create the cache database
    pub fn open(path: &Path) -> Result<Self, ScanError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> Result<Self, ScanError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), ScanError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS clip_cache (
                path TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                mtime_ns INTEGER NOT NULL,
                camera_label TEXT NOT NULL,
                start_time TEXT NOT NULL,
                duration_seconds REAL NOT NULL,
                timezone_name TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// All stored paths
    fn paths(&self) -> Result<Vec<String>, ScanError> {
        let mut stmt = self.conn.prepare("SELECT path FROM clip_cache")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }
}

impl ScanCache for SqliteScanCache {
    fn load(
        &self,
        path: &Path,
        stamp: &FileStamp,
        timezone: &str,
    ) -> Result<Option<CachedClip>, ScanError> {
        let row = self
            .conn
            .query_row(
                "SELECT camera_label, start_time, duration_seconds
                 FROM clip_cache
                 WHERE path = ?1 AND size = ?2 AND mtime_ns = ?3 AND timezone_name = ?4",
                params![path_key(path), stamp.size as i64, stamp.mtime_ns, timezone],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((camera_label, start_time, duration_seconds)) = row else {
            return Ok(None);
        };

        // An unreadable timestamp is stale data, not a failure
        let Ok(start_time) = DateTime::parse_from_rfc3339(&start_time) else {
            log::warn!(
                "Ignoring cache record with bad start time {:?} for {}",
                start_time,
                path.display()
            );
            return Ok(None);
        };

        Ok(Some(CachedClip {
            path: path.to_path_buf(),
            camera_label,
            start_time,
            duration_seconds,
        }))
    }

    fn save(&mut self, clip: &Clip, stamp: &FileStamp, timezone: &str) -> Result<(), ScanError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO clip_cache
             (path, size, mtime_ns, camera_label, start_time, duration_seconds, timezone_name)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                path_key(clip.path()),
                stamp.size as i64,
                stamp.mtime_ns,
                clip.camera_label(),
                clip.start().to_rfc3339(),
                clip.duration_seconds(),
                timezone,
            ],
        )?;
        Ok(())
    }

    fn prune_missing(&mut self) -> Result<usize, ScanError> {
        let missing: Vec<String> = self
            .paths()?
            .into_iter()
            .filter(|p| !Path::new(p).exists())
            .collect();
        if missing.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("DELETE FROM clip_cache WHERE path = ?1")?;
            for path in &missing {
                stmt.execute(params![path])?;
            }
        }
        tx.commit()?;
        Ok(missing.len())
    }

    fn len(&self) -> Result<usize, ScanError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM clip_cache", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    stamp: FileStamp,
    timezone: String,
    clip: CachedClip,
}

/// In-memory cache; clones share the same records
#[derive(Debug, Clone, Default)]
pub struct MemoryScanCache {
    records: Arc<Mutex<HashMap<PathBuf, MemoryRecord>>>,
}

impl MemoryScanCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, HashMap<PathBuf, MemoryRecord>>, ScanError> {
        self.records
            .lock()
            .map_err(|_| ScanError::database_error("memory cache lock poisoned"))
    }
}

impl ScanCache for MemoryScanCache {
    fn load(
        &self,
        path: &Path,
        stamp: &FileStamp,
        timezone: &str,
    ) -> Result<Option<CachedClip>, ScanError> {
        Ok(self
            .records()?
            .get(path)
            .filter(|r| r.stamp == *stamp && r.timezone == timezone)
            .map(|r| r.clip.clone()))
    }

    fn save(&mut self, clip: &Clip, stamp: &FileStamp, timezone: &str) -> Result<(), ScanError> {
        let record = MemoryRecord {
            stamp: *stamp,
            timezone: timezone.to_string(),
            clip: CachedClip {
                path: clip.path().to_path_buf(),
                camera_label: clip.camera_label().to_string(),
                start_time: clip.start(),
                duration_seconds: clip.duration_seconds(),
            },
        };
        self.records()?.insert(clip.path().to_path_buf(), record);
        Ok(())
    }

    fn prune_missing(&mut self) -> Result<usize, ScanError> {
        let mut records = self.records()?;
        let before = records.len();
        records.retain(|path, _| path.exists());
        Ok(before - records.len())
    }

    fn len(&self) -> Result<usize, ScanError> {
        Ok(self.records()?.len())
    }
}
