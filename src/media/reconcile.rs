use crate::error::IngestError;
use crate::media::backend::Backend;
use crate::media::classify::MediaClassifier;
use crate::media::config::{ScanConfig, ScanErrorPolicy};
use crate::media::fingerprint::fingerprint;
use crate::media::manifest::{Manifest, MediaEntry, MediaStatus};
use crate::media::progress::ProgressSink;
use crate::media::scanner::Scanner;
use crate::media::warn::{self, WarnEvent};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A file whose content hash is not in the manifest, with its pending entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub entry: MediaEntry,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub scanned: usize,
    pub known: usize,
    pub duplicates_in_run: usize,
    pub skipped_errors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub candidates: Vec<Candidate>,
    pub stats: ScanStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemFailure {
    pub filename: String,
    pub path: String,
    pub hash: String,
    pub code: &'static str,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub stats: ScanStats,
    pub committed: Vec<MediaEntry>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    scanner: Scanner,
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl Reconciler {
    pub fn new(scanner: Scanner) -> Self {
        Self { scanner }
    }

    pub fn from_config(cfg: &ScanConfig) -> Self {
        Self::new(Scanner::new(
            MediaClassifier::new(&cfg.extensions),
            cfg.on_error,
        ))
    }

    /// Every eligible file under `root` whose content hash is not yet in
    /// `manifest`, in scan order. Identical content seen twice in one scan
    /// is offered once.
    pub fn find_new(&self, manifest: &Manifest, root: &Path) -> Result<Discovery, IngestError> {
        let known = manifest.known_hashes();
        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut out = Discovery::default();

        let mut scan = self.scanner.scan(root);
        for item in scan.by_ref() {
            let path = item?;
            out.stats.scanned += 1;

            let hash = match fingerprint(&path) {
                Ok(hash) => hash,
                Err(err) if self.scanner.policy() == ScanErrorPolicy::Skip => {
                    out.stats.skipped_errors += 1;
                    warn::emit(WarnEvent {
                        code: err.code(),
                        stage: "fingerprint",
                        action: "hash-file",
                        item: &base_name(&path),
                        source: &path.display().to_string(),
                        retry: "next-run",
                        reason: "unreadable-file-skipped",
                        err: &err.to_string(),
                    });
                    continue;
                }
                Err(err) => return Err(err),
            };

            if known.contains(&hash) {
                out.stats.known += 1;
                tracing::debug!(path = %path.display(), %hash, "already in manifest");
                continue;
            }
            if !seen_this_run.insert(hash.clone()) {
                out.stats.duplicates_in_run += 1;
                tracing::info!(path = %path.display(), %hash, "same content already found in this scan");
                continue;
            }

            out.candidates.push(Candidate {
                entry: MediaEntry::pending(base_name(&path), hash),
                path,
            });
        }
        out.stats.skipped_errors += scan.skipped();

        Ok(out)
    }

    /// Hand one candidate to the backend and record the result. The error
    /// carries the stage that failed.
    fn process_one(
        manifest: &mut Manifest,
        root: &Path,
        backend: &dyn Backend,
        candidate: &Candidate,
    ) -> Result<MediaEntry, (&'static str, IngestError)> {
        let status = backend
            .process(root, candidate)
            .map_err(|err| ("backend", err))?;
        let entry = candidate
            .entry
            .clone()
            .promote(status, Utc::now())
            .map_err(|err| ("commit", err))?;
        commit(manifest, entry.clone()).map_err(|err| ("commit", err))?;
        Ok(entry)
    }

    /// Scan, hand each new file to `backend`, commit what succeeds.
    /// Backend and commit failures are reported per item and never stop the batch.
    pub fn run(
        &self,
        manifest: &mut Manifest,
        root: &Path,
        backend: &dyn Backend,
        progress: &mut dyn ProgressSink,
    ) -> Result<RunOutcome, IngestError> {
        let discovery = self.find_new(manifest, root)?;
        let mut outcome = RunOutcome {
            stats: discovery.stats,
            ..RunOutcome::default()
        };

        let total = discovery.candidates.len();
        tracing::info!(
            backend = backend.name(),
            new = total,
            scanned = discovery.stats.scanned,
            known = discovery.stats.known,
            "scan complete"
        );
        progress.start(total);

        for (idx, candidate) in discovery.candidates.into_iter().enumerate() {
            let label = candidate.entry.filename.clone();
            match Self::process_one(manifest, root, backend, &candidate) {
                Ok(entry) => {
                    tracing::info!(
                        file = %entry.filename,
                        hash = %entry.content_hash,
                        status = entry.status.as_str(),
                        "committed"
                    );
                    outcome.committed.push(entry);
                }
                Err((stage, err)) => {
                    let source = candidate.path.display().to_string();
                    warn::emit(WarnEvent {
                        code: err.code(),
                        stage,
                        action: backend.name(),
                        item: &candidate.entry.filename,
                        source: &source,
                        retry: "next-run",
                        reason: if stage == "backend" { "backend-failed" } else { "commit-rejected" },
                        err: &err.to_string(),
                    });
                    outcome.failures.push(ItemFailure {
                        filename: candidate.entry.filename,
                        path: source,
                        hash: candidate.entry.content_hash,
                        code: err.code(),
                        reason: err.to_string(),
                    });
                }
            }
            progress.advance(idx + 1, &label);
        }
        progress.finish();

        Ok(outcome)
    }
}

/// Append a processed entry. Only terminal entries with a hash not yet in
/// the manifest are accepted.
pub fn commit(manifest: &mut Manifest, entry: MediaEntry) -> Result<(), IngestError> {
    if entry.status == MediaStatus::Pending || entry.processed_at.is_none() {
        return Err(IngestError::Invariant(format!(
            "refusing to commit unprocessed entry {} ({})",
            entry.filename, entry.content_hash
        )));
    }
    manifest.append(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::fingerprint::fingerprint_reader;
    use crate::media::manifest::ManifestStore;
    use std::cell::RefCell;
    use std::fs;
    use tempfile::tempdir;

    fn reconciler() -> Reconciler {
        Reconciler::from_config(&ScanConfig::default())
    }

    fn digest(bytes: &str) -> String {
        fingerprint_reader(bytes.as_bytes()).expect("digest")
    }

    fn done(entry: MediaEntry) -> MediaEntry {
        entry
            .promote(MediaStatus::Uploaded, Utc::now())
            .expect("promote")
    }

    /// Succeeds for everything except filenames listed in `fail`.
    struct ScriptedBackend {
        fail: Vec<&'static str>,
        unfinished: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl ScriptedBackend {
        fn failing(fail: Vec<&'static str>) -> Self {
            Self {
                fail,
                unfinished: Vec::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        /// Reports success for `unfinished` files but hands back `Pending`.
        fn leaving_pending(unfinished: Vec<&'static str>) -> Self {
            Self {
                unfinished,
                ..Self::failing(Vec::new())
            }
        }
    }

    impl Backend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn process(&self, _root: &Path, candidate: &Candidate) -> Result<MediaStatus, IngestError> {
            self.calls.borrow_mut().push(candidate.entry.filename.clone());
            if self.fail.iter().any(|f| *f == candidate.entry.filename) {
                return Err(IngestError::backend("scripted", &candidate.entry.filename, "refused"));
            }
            if self.unfinished.iter().any(|f| *f == candidate.entry.filename) {
                return Ok(MediaStatus::Pending);
            }
            Ok(MediaStatus::Uploaded)
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        total: Option<usize>,
        advances: Vec<(usize, String)>,
        finished: bool,
    }

    impl ProgressSink for RecordingProgress {
        fn start(&mut self, total: usize) {
            self.total = Some(total);
        }
        fn advance(&mut self, done: usize, label: &str) {
            self.advances.push((done, label.to_string()));
        }
        fn finish(&mut self) {
            self.finished = true;
        }
    }

    #[test]
    fn empty_directory_and_manifest_find_nothing() {
        let tmp = tempdir().expect("tempdir");
        let found = reconciler()
            .find_new(&Manifest::default(), tmp.path())
            .expect("find_new");
        assert!(found.candidates.is_empty());
        assert_eq!(found.stats, ScanStats::default());
    }

    #[test]
    fn single_new_video_becomes_pending_entry() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("video.mp4"), "X").expect("write");

        let found = reconciler()
            .find_new(&Manifest::default(), tmp.path())
            .expect("find_new");
        assert_eq!(found.candidates.len(), 1);
        let entry = &found.candidates[0].entry;
        assert_eq!(entry.filename, "video.mp4");
        assert_eq!(entry.content_hash, digest("X"));
        assert_eq!(entry.status, MediaStatus::Pending);
        assert_eq!(entry.processed_at, None);
        assert_eq!(found.candidates[0].path, tmp.path().join("video.mp4"));
    }

    #[test]
    fn renamed_file_with_known_content_is_not_new() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("renamed.mp4"), "X").expect("write");
        let manifest = Manifest::from_entries(vec![done(MediaEntry::pending("video.mp4", digest("X")))]);

        let found = reconciler().find_new(&manifest, tmp.path()).expect("find_new");
        assert!(found.candidates.is_empty());
        assert_eq!(found.stats.known, 1);
    }

    #[test]
    fn same_name_different_content_is_new() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("video.mp4"), "Y").expect("write");
        let manifest = Manifest::from_entries(vec![done(MediaEntry::pending("video.mp4", digest("X")))]);

        let found = reconciler().find_new(&manifest, tmp.path()).expect("find_new");
        assert_eq!(found.candidates.len(), 1);
        assert_eq!(found.candidates[0].entry.content_hash, digest("Y"));
    }

    #[test]
    fn duplicate_content_within_one_scan_is_offered_once() {
        let tmp = tempdir().expect("tempdir");
        fs::create_dir_all(tmp.path().join("copy")).expect("mkdir");
        fs::write(tmp.path().join("a.mp4"), "same").expect("write");
        fs::write(tmp.path().join("copy/a-again.mov"), "same").expect("write");

        let found = reconciler()
            .find_new(&Manifest::default(), tmp.path())
            .expect("find_new");
        assert_eq!(found.candidates.len(), 1);
        assert_eq!(found.candidates[0].entry.filename, "a.mp4");
        assert_eq!(found.stats.duplicates_in_run, 1);
        assert_eq!(found.stats.scanned, 2);
    }

    #[test]
    fn ineligible_files_are_ignored() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("clip.txt"), "t").expect("write");
        fs::write(tmp.path().join("clip"), "c").expect("write");

        let found = reconciler()
            .find_new(&Manifest::default(), tmp.path())
            .expect("find_new");
        assert!(found.candidates.is_empty());
        assert_eq!(found.stats.scanned, 0);
    }

    #[test]
    fn commit_then_rescan_is_idempotent() {
        let tmp = tempdir().expect("tempdir");
        let media = tmp.path().join("card");
        fs::create_dir_all(media.join("DCIM")).expect("mkdir");
        fs::write(media.join("DCIM/one.mp4"), "1").expect("write");
        fs::write(media.join("two.mkv"), "2").expect("write");
        let store = ManifestStore::new(tmp.path().join("video_mapping.json"));

        let mut manifest = store.load().expect("load");
        let found = reconciler().find_new(&manifest, &media).expect("first scan");
        assert_eq!(found.candidates.len(), 2);
        for candidate in found.candidates {
            commit(&mut manifest, done(candidate.entry)).expect("commit");
        }
        store.save(&manifest).expect("save");

        let reloaded = store.load().expect("reload");
        assert_eq!(reloaded, manifest);
        let again = reconciler().find_new(&reloaded, &media).expect("second scan");
        assert!(again.candidates.is_empty());
        assert_eq!(again.stats.known, 2);
    }

    #[test]
    fn commit_rejects_pending_and_duplicates() {
        let mut manifest = Manifest::default();
        let err = commit(&mut manifest, MediaEntry::pending("a.mp4", "h")).expect_err("pending");
        assert!(matches!(err, IngestError::Invariant(_)));

        commit(&mut manifest, done(MediaEntry::pending("a.mp4", "h"))).expect("first");
        let err = commit(&mut manifest, done(MediaEntry::pending("b.mp4", "h"))).expect_err("dup");
        assert!(matches!(err, IngestError::Invariant(_)));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn backend_failure_leaves_item_for_next_run() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("good.mp4"), "good").expect("write");
        fs::write(tmp.path().join("bad.mp4"), "bad").expect("write");

        let backend = ScriptedBackend::failing(vec!["bad.mp4"]);
        let mut progress = RecordingProgress::default();
        let mut manifest = Manifest::default();

        let outcome = reconciler()
            .run(&mut manifest, tmp.path(), &backend, &mut progress)
            .expect("run");

        assert_eq!(*backend.calls.borrow(), vec!["bad.mp4", "good.mp4"]);
        assert_eq!(outcome.committed.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].filename, "bad.mp4");
        assert_eq!(outcome.failures[0].code, "E003_BACKEND");

        assert_eq!(manifest.len(), 1);
        let committed = &manifest.entries()[0];
        assert_eq!(committed.filename, "good.mp4");
        assert_eq!(committed.content_hash, digest("good"));
        assert_eq!(committed.status, MediaStatus::Uploaded);
        assert!(committed.processed_at.is_some());

        assert_eq!(progress.total, Some(2));
        assert_eq!(
            progress.advances,
            vec![(1, "bad.mp4".to_string()), (2, "good.mp4".to_string())]
        );
        assert!(progress.finished);

        let retry = reconciler().find_new(&manifest, tmp.path()).expect("rescan");
        assert_eq!(retry.candidates.len(), 1);
        assert_eq!(retry.candidates[0].entry.filename, "bad.mp4");
    }

    #[test]
    fn non_terminal_backend_status_fails_only_that_item() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.mp4"), "a").expect("write");
        fs::write(tmp.path().join("b.mp4"), "b").expect("write");
        fs::write(tmp.path().join("c.mp4"), "c").expect("write");

        let backend = ScriptedBackend::leaving_pending(vec!["b.mp4"]);
        let mut progress = RecordingProgress::default();
        let mut manifest = Manifest::default();

        let outcome = reconciler()
            .run(&mut manifest, tmp.path(), &backend, &mut progress)
            .expect("run keeps going");

        assert_eq!(*backend.calls.borrow(), vec!["a.mp4", "b.mp4", "c.mp4"]);
        assert_eq!(outcome.committed.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].filename, "b.mp4");
        assert_eq!(outcome.failures[0].code, "E005_INVARIANT");
        let names: Vec<_> = manifest.entries().iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, vec!["a.mp4", "c.mp4"]);
        assert!(manifest.entries().iter().all(|e| e.status.is_terminal()));
        assert_eq!(progress.advances.len(), 3);
    }

    #[test]
    fn known_hashes_never_reach_the_backend() {
        let tmp = tempdir().expect("tempdir");
        fs::write(tmp.path().join("old.mp4"), "old").expect("write");
        let mut manifest =
            Manifest::from_entries(vec![done(MediaEntry::pending("old.mp4", digest("old")))]);
        let backend = ScriptedBackend::failing(vec![]);

        let outcome = reconciler()
            .run(&mut manifest, tmp.path(), &backend, &mut RecordingProgress::default())
            .expect("run");
        assert!(backend.calls.borrow().is_empty());
        assert!(outcome.committed.is_empty());
        assert_eq!(outcome.stats.known, 1);
        assert_eq!(manifest.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_file_aborts_or_is_skipped() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().expect("tempdir");
        let locked = tmp.path().join("a.mp4");
        fs::write(&locked, "secret").expect("write");
        fs::write(tmp.path().join("b.mp4"), "open").expect("write");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("chmod");
        if fs::File::open(&locked).is_ok() {
            return;
        }

        let err = reconciler()
            .find_new(&Manifest::default(), tmp.path())
            .expect_err("abort");
        assert!(matches!(err, IngestError::Io { .. }));

        let skipping = Reconciler::from_config(&ScanConfig {
            on_error: ScanErrorPolicy::Skip,
            ..ScanConfig::default()
        });
        let found = skipping
            .find_new(&Manifest::default(), tmp.path())
            .expect("skip");
        assert_eq!(found.candidates.len(), 1);
        assert_eq!(found.stats.skipped_errors, 1);
    }
}
