use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, source_detector};
use crate::media::config::load_config;
use crate::media::manifest::ManifestStore;
use crate::media::paths::resolve_paths;
use crate::media::reconcile::Reconciler;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub manifest: Option<PathBuf>,
    pub dir: Option<PathBuf>,
    pub rehash: bool,
    pub strict: bool,
}

pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let paths = resolve_paths()?.with_manifest(opts.manifest.clone());
    let mut report = CommandReport::new("verify");
    report.detail(format!("manifest={}", paths.manifest_file.display()));

    let store = ManifestStore::new(&paths.manifest_file);
    if !store.exists() {
        report.issue("manifest does not exist yet; run `ingest` first");
        return Ok(report);
    }
    let manifest = match store.load() {
        Ok(manifest) => manifest,
        Err(err) => {
            report.issue(format!("{err}"));
            return Ok(report);
        }
    };
    report.detail(format!("manifest.entries={}", manifest.len()));
    report.detail("manifest.invariants=ok");

    if !opts.rehash {
        return Ok(report);
    }

    let cfg = load_config()?;
    let dir = source_detector(opts.dir.clone(), &cfg).detect()?;
    let discovery = Reconciler::from_config(&cfg.scan).find_new(&manifest, &dir)?;
    report.detail(format!("rehash.dir={}", dir.display()));
    report.detail(format!("rehash.known={}", discovery.stats.known));
    report.detail(format!("rehash.new={}", discovery.candidates.len()));
    for candidate in &discovery.candidates {
        report.detail(format!("rehash.unrecorded={}", candidate.path.display()));
    }

    if opts.strict && !discovery.candidates.is_empty() {
        report.issue(format!(
            "strict verify failed: {} file(s) under {} are not in the manifest",
            discovery.candidates.len(),
            dir.display()
        ));
    }

    Ok(report)
}
