//! Error taxonomy for a dump run.

use std::path::PathBuf;

use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::runner::RunnerError;

/// Errors surfaced to the caller driving a dump.
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("cannot collect file {path}: {source}")]
    FileUnit {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot collect {name}: {source}")]
    Runner {
        name: String,
        #[source]
        source: RunnerError,
    },

    #[error("cannot create output file {}: {source}", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for dump operations.
pub type Result<T> = std::result::Result<T, CollectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_unit_error_display() {
        let err = CollectError::FileUnit {
            path: "/etc/missing".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/missing"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_archive_error_is_transparent() {
        let err = CollectError::from(ArchiveError::Closed);
        assert_eq!(err.to_string(), "archive is already closed");
    }
}
