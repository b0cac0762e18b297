use crate::error::IngestError;
use crate::media::classify::MediaClassifier;
use crate::media::config::ScanErrorPolicy;
use crate::media::warn::{self, WarnEvent};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct Scanner {
    classifier: MediaClassifier,
    policy: ScanErrorPolicy,
}

impl Scanner {
    pub fn new(classifier: MediaClassifier, policy: ScanErrorPolicy) -> Self {
        Self { classifier, policy }
    }

    pub fn policy(&self) -> ScanErrorPolicy {
        self.policy
    }

    /// Depth-first walk of `root`, sorted by file name at each level,
    /// yielding eligible non-directory entries.
    pub fn scan(&self, root: &Path) -> Scan<'_> {
        Scan {
            walker: WalkDir::new(root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
            scanner: self,
            root: root.to_path_buf(),
            skipped: 0,
            done: false,
        }
    }
}

/// Lazy scan. After an error under [`ScanErrorPolicy::Abort`] it yields
/// nothing more.
pub struct Scan<'a> {
    walker: walkdir::IntoIter,
    scanner: &'a Scanner,
    root: PathBuf,
    skipped: usize,
    done: bool,
}

impl Scan<'_> {
    /// Entries dropped under [`ScanErrorPolicy::Skip`].
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for Scan<'_> {
    type Item = Result<PathBuf, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if entry.file_type().is_dir() {
                        continue;
                    }
                    if self
                        .scanner
                        .classifier
                        .is_eligible(&entry.file_name().to_string_lossy())
                    {
                        return Some(Ok(entry.into_path()));
                    }
                }
                Err(err) => {
                    let at_root = err.depth() == 0;
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    let source = err
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
                    let failure = IngestError::io(path, source);

                    if at_root || self.scanner.policy == ScanErrorPolicy::Abort {
                        self.done = true;
                        return Some(Err(failure));
                    }

                    self.skipped += 1;
                    warn::emit(WarnEvent {
                        code: failure.code(),
                        stage: "scan",
                        action: "read-dir",
                        item: "",
                        source: &self.root.display().to_string(),
                        retry: "next-run",
                        reason: "unreadable-entry-skipped",
                        err: &failure.to_string(),
                    });
                }
            }
        }
    }
}
