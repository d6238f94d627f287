//! Error types for the clip catalog

use std::path::PathBuf;
use thiserror::Error;

/// Error kinds that can occur while building a catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanErrorKind {
    /// Scan root does not exist
    NotFound,
    /// Timezone name is not a known IANA zone
    InvalidTimezone,
    /// Cache store operation failed
    DatabaseError,
    /// I/O error during file operations
    IoError,
    /// Duration probe could not be run or understood
    ProbeError,
}

/// Represents an error that occurred during scanning
#[derive(Debug, Error)]
#[error("{kind:?}: {message} (path: {path:?})")]
pub struct ScanError {
    /// The kind of error
    pub kind: ScanErrorKind,
    /// The path where the error occurred
    pub path: Option<PathBuf>,
    /// Human-readable error message
    pub message: String,
}

impl ScanError {
    /// Create a new scan error
    pub fn new(kind: ScanErrorKind, path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path,
            message: message.into(),
        }
    }

    /// The scan root is missing; carries the root path
    pub fn root_not_found(root: PathBuf) -> Self {
        Self::new(
            ScanErrorKind::NotFound,
            Some(root.clone()),
            format!("Root directory not found: {}", root.display()),
        )
    }

    /// Create an invalid timezone error
    pub fn invalid_timezone(name: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ScanErrorKind::InvalidTimezone,
            None,
            format!("Unknown timezone {:?}: {}", name, reason),
        )
    }

    /// Create an I/O error
    pub fn io_error(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::IoError, path, message)
    }

    /// Create a database error
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::DatabaseError, None, message)
    }

    /// Create a probe error
    pub fn probe_error(path: PathBuf, message: impl Into<String>) -> Self {
        Self::new(ScanErrorKind::ProbeError, Some(path), message)
    }

    /// Whether this is the fatal missing-root condition
    pub fn is_root_not_found(&self) -> bool {
        self.kind == ScanErrorKind::NotFound
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ScanErrorKind::IoError, None, err.to_string())
    }
}

impl From<rusqlite::Error> for ScanError {
    fn from(err: rusqlite::Error) -> Self {
        Self::database_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_not_found_carries_path() {
        let err = ScanError::root_not_found(PathBuf::from("/missing/root"));
        assert!(err.is_root_not_found());
        assert_eq!(err.path, Some(PathBuf::from("/missing/root")));
        assert!(err.to_string().contains("/missing/root"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ScanError = io.into();
        assert_eq!(err.kind, ScanErrorKind::IoError);
        assert!(!err.is_root_not_found());
    }

    #[test]
    fn test_invalid_timezone_message() {
        let err = ScanError::invalid_timezone("Mars/Olympus", "not in database");
        assert_eq!(err.kind, ScanErrorKind::InvalidTimezone);
        assert!(err.message.contains("Mars/Olympus"));
    }
}
