use anyhow::Result;
use std::env;
use std::path::PathBuf;

use crate::commands::{CommandReport, source_detector};
use crate::media::classify::MediaClassifier;
use crate::media::config::load_config;
use crate::media::manifest::ManifestStore;
use crate::media::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/ingest_env_allowlist.rs"));

#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    pub manifest: Option<PathBuf>,
    pub dir: Option<PathBuf>,
}

pub fn run(opts: &StatusOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?.with_manifest(opts.manifest.clone());
    let cfg = load_config()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("build_id={}", env!("BUILD_ID")));
    report.detail(format!("ingest_home={}", paths.ingest_home.display()));
    report.detail(format!("manifest={}", paths.manifest_file.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("outbox_dir={}", paths.outbox_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("backend={}", cfg.backend.kind));
    report.detail(format!(
        "scan.extensions={}",
        MediaClassifier::new(&cfg.scan.extensions).extensions().join(",")
    ));
    report.detail(format!("scan.on_error={}", cfg.scan.on_error));
    for key in GENERATED_INGEST_ENV_ALLOWLIST {
        if env::var_os(key).is_some() {
            report.detail(format!("env.{key}=set"));
        }
    }

    match source_detector(opts.dir.clone(), &cfg).detect() {
        Ok(dir) => report.detail(format!("volume={}", dir.display())),
        Err(err) => report.detail(format!("volume=none ({err})")),
    }

    let store = ManifestStore::new(&paths.manifest_file);
    if !store.exists() {
        report.detail("manifest.state=absent (created on first ingest)");
        return Ok(report);
    }
    match store.load() {
        Ok(manifest) => {
            report.detail(format!("manifest.entries={}", manifest.len()));
            if manifest.is_empty() {
                return Ok(report);
            }
            for (status, count) in manifest.count_by_status() {
                report.detail(format!("manifest.{}={count}", status.as_str()));
            }
            if let Some(last) = manifest.entries().last() {
                let at = last
                    .processed_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                report.detail(format!("manifest.last={} at={at}", last.filename));
            }
        }
        Err(err) => report.issue(format!("manifest unreadable: {err}")),
    }

    Ok(report)
}
