pub mod ingest;
pub mod scan;
pub mod status;
pub mod verify;

use serde::Serialize;
use std::path::PathBuf;

use crate::media::config::IngestConfig;
use crate::media::volume::{FixedDirectory, MountTableDetector, VolumeDetector};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }
}

/// `--dir` wins; otherwise look for a mounted card.
pub fn source_detector(dir: Option<PathBuf>, cfg: &IngestConfig) -> Box<dyn VolumeDetector> {
    match dir {
        Some(dir) => Box::new(FixedDirectory(dir)),
        None => Box::new(MountTableDetector::new(cfg.volume.mount_prefixes.clone())),
    }
}
