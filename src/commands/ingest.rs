use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, source_detector};
use crate::media::audit;
use crate::media::backend::{build_backend, check_archive_dir};
use crate::media::config::{BackendKind, IngestConfig, ScanErrorPolicy, load_config, validate};
use crate::media::lock::RunLock;
use crate::media::manifest::ManifestStore;
use crate::media::paths::resolve_paths;
use crate::media::progress::{NoProgress, ProgressSink, TerminalProgress};
use crate::media::reconcile::{Reconciler, ScanStats};

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    pub dir: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub backend: Option<BackendKind>,
    pub archive_dir: Option<PathBuf>,
    pub outbox_dir: Option<PathBuf>,
    pub endpoint: Option<String>,
    pub delete_source: bool,
    pub on_scan_error: Option<ScanErrorPolicy>,
    pub progress: bool,
    pub dry_run: bool,
}

fn effective_config(opts: &IngestOptions) -> Result<IngestConfig> {
    let mut cfg = load_config()?;
    if let Some(kind) = opts.backend {
        cfg.backend.kind = kind;
    }
    if let Some(endpoint) = &opts.endpoint {
        cfg.backend.endpoint = Some(endpoint.clone());
    }
    if opts.delete_source {
        cfg.backend.delete_source = true;
    }
    if let Some(policy) = opts.on_scan_error {
        cfg.scan.on_error = policy;
    }
    if opts.progress {
        cfg.progress.enabled = true;
    }
    validate(&cfg)?;
    Ok(cfg)
}

fn stats_details(report: &mut CommandReport, stats: &ScanStats) {
    report.detail(format!("scan.eligible={}", stats.scanned));
    report.detail(format!("scan.known={}", stats.known));
    report.detail(format!("scan.duplicates_in_run={}", stats.duplicates_in_run));
    report.detail(format!("scan.skipped_errors={}", stats.skipped_errors));
}

pub fn run(opts: &IngestOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new(if opts.dry_run { "scan" } else { "ingest" });

    let cfg = effective_config(opts)?;
    let mut paths = resolve_paths()?.with_manifest(opts.manifest.clone());
    if let Some(dir) = &opts.archive_dir {
        paths.archive_dir = dir.clone();
    }
    if let Some(dir) = &opts.outbox_dir {
        paths.outbox_dir = dir.clone();
    }

    let lock = RunLock::acquire(&paths.manifest_file)?;
    tracing::debug!(lock = %lock.path().display(), "run lock held");

    let source = source_detector(opts.dir.clone(), &cfg).detect()?;
    tracing::info!(source = %source.display(), "using video directory");
    report.detail(format!("source_dir={}", source.display()));
    let store = ManifestStore::new(&paths.manifest_file);
    report.detail(format!("manifest={}", store.path().display()));

    let mut manifest = store.load()?;
    report.detail(format!("manifest.entries_before={}", manifest.len()));

    let reconciler = Reconciler::from_config(&cfg.scan);

    if opts.dry_run {
        let discovery = reconciler.find_new(&manifest, &source)?;
        stats_details(&mut report, &discovery.stats);
        report.detail(format!("new={}", discovery.candidates.len()));
        for candidate in &discovery.candidates {
            report.detail(format!(
                "detected={} hash={}",
                candidate.path.display(),
                candidate.entry.content_hash
            ));
        }
        return Ok(report);
    }

    if cfg.backend.kind == BackendKind::Archive {
        check_archive_dir(&paths.archive_dir, &source)?;
    }
    let backend = build_backend(&cfg.backend, &paths)?;
    report.detail(format!("backend={}", backend.name()));

    let mut progress: Box<dyn ProgressSink> = if cfg.progress.enabled {
        Box::new(TerminalProgress::stderr())
    } else {
        Box::new(NoProgress)
    };

    let outcome = reconciler.run(&mut manifest, &source, backend.as_ref(), progress.as_mut())?;
    store.save(&manifest)?;

    stats_details(&mut report, &outcome.stats);
    report.detail(format!("committed={}", outcome.committed.len()));
    report.detail(format!("failed={}", outcome.failures.len()));
    report.detail(format!("manifest.entries_after={}", manifest.len()));
    for entry in &outcome.committed {
        report.detail(format!(
            "{}={} hash={}",
            entry.status.as_str(),
            entry.filename,
            entry.content_hash
        ));
    }
    for failure in &outcome.failures {
        report.issue(format!(
            "not processed (retried next run): {} code={} reason={}",
            failure.path, failure.code, failure.reason
        ));
    }

    let status = if outcome.failures.is_empty() { "ok" } else { "partial" };
    let message = format!(
        "source={} backend={} committed={} failed={} known={}",
        source.display(),
        backend.name(),
        outcome.committed.len(),
        outcome.failures.len(),
        outcome.stats.known
    );
    if let Err(err) = audit::append_event(&paths.logs_dir, "ingest", status, &message) {
        tracing::warn!("audit append failed: {err:#}");
    }

    Ok(report)
}
