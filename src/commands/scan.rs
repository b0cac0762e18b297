use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::commands::ingest::{self, IngestOptions};
use crate::media::config::ScanErrorPolicy;

#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    pub dir: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub on_scan_error: Option<ScanErrorPolicy>,
}

/// Report new files without handing them to a backend.
pub fn run(opts: &ScanOptions) -> Result<CommandReport> {
    ingest::run(&IngestOptions {
        dir: opts.dir.clone(),
        manifest: opts.manifest.clone(),
        on_scan_error: opts.on_scan_error,
        dry_run: true,
        ..IngestOptions::default()
    })
}
