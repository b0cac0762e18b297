use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed manifest {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("{backend} backend failed for {item}: {reason}")]
    Backend {
        backend: &'static str,
        item: String,
        reason: String,
    },
    #[error("no removable volume detected: {0}")]
    VolumeNotFound(String),
    #[error("manifest invariant violated: {0}")]
    Invariant(String),
    #[error("another ingest run holds the lock {0}")]
    Locked(PathBuf),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IngestError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn backend(backend: &'static str, item: impl Into<String>, reason: impl ToString) -> Self {
        Self::Backend {
            backend,
            item: item.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable machine code used in warn lines and reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io { .. } => "E001_IO",
            Self::Decode { .. } => "E002_DECODE",
            Self::Backend { .. } => "E003_BACKEND",
            Self::VolumeNotFound(_) => "E004_VOLUME_NOT_FOUND",
            Self::Invariant(_) => "E005_INVARIANT",
            Self::Locked(_) => "E006_LOCKED",
            Self::Config(_) => "E007_CONFIG",
        }
    }
}
