use crate::error::IngestError;
use crate::media::config::{BackendConfig, BackendKind};
use crate::media::fingerprint::fingerprint;
use crate::media::manifest::{MediaEntry, MediaStatus};
use crate::media::paths::IngestPaths;
use crate::media::reconcile::Candidate;
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Takes one confirmed-new file somewhere durable.
pub trait Backend {
    fn name(&self) -> &'static str;

    /// Returns the terminal status to record on success.
    fn process(&self, source_root: &Path, candidate: &Candidate)
    -> Result<MediaStatus, IngestError>;
}

pub fn build_backend(cfg: &BackendConfig, paths: &IngestPaths) -> Result<Box<dyn Backend>, IngestError> {
    match cfg.kind {
        BackendKind::Archive => Ok(Box::new(ArchiveBackend::new(&paths.archive_dir))),
        BackendKind::Upload => {
            let target = match &cfg.endpoint {
                Some(endpoint) => UploadTarget::http(endpoint, Duration::from_secs(cfg.timeout_secs))?,
                None => UploadTarget::Outbox(paths.outbox_dir.clone()),
            };
            Ok(Box::new(UploadBackend::new(target, cfg.delete_source)))
        }
    }
}

fn relative_to_root(source_root: &Path, candidate: &Candidate) -> PathBuf {
    candidate
        .path
        .strip_prefix(source_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| PathBuf::from(&candidate.entry.filename))
}

/// `path` with symlinks and `..` resolved as far as it exists on disk.
fn resolve_lenient(path: &Path) -> PathBuf {
    let mut missing = Vec::new();
    let mut current = path.to_path_buf();
    loop {
        if let Ok(resolved) = fs::canonicalize(&current) {
            return missing.iter().rev().fold(resolved, |acc, part| acc.join(part));
        }
        match (current.file_name().map(|n| n.to_os_string()), current.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name);
                current = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    a == b || resolve_lenient(a) == resolve_lenient(b)
}

/// The archive must live outside the tree being scanned, otherwise files
/// would be moved onto themselves or back onto the card.
pub fn check_archive_dir(archive_dir: &Path, source_root: &Path) -> Result<(), IngestError> {
    let archive = resolve_lenient(archive_dir);
    let source = resolve_lenient(source_root);
    if archive.starts_with(&source) {
        return Err(IngestError::Config(format!(
            "archive dir {} is inside the scanned directory {}",
            archive_dir.display(),
            source_root.display()
        )));
    }
    Ok(())
}

/// Move a candidate to `to`. Across filesystems the data is copied, the
/// copy is re-hashed against the scanned hash, then the source is removed.
fn relocate(candidate: &Candidate, to: &Path) -> Result<(), IngestError> {
    let from = candidate.path.as_path();
    if same_file(from, to) {
        return Ok(());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).map_err(|err| IngestError::io(parent, err))?;
    }

    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::CrossesDevices | ErrorKind::PermissionDenied
            ) =>
        {
            fs::copy(from, to).map_err(|err| IngestError::io(to, err))?;
            let copied = fingerprint(to)?;
            if copied != candidate.entry.content_hash {
                discard_partial(to);
                return Err(IngestError::backend(
                    "archive",
                    &candidate.entry.filename,
                    format!("copy at {} hashes to {copied}", to.display()),
                ));
            }
            fs::remove_file(from).map_err(|err| IngestError::io(from, err))
        }
        Err(err) => Err(IngestError::io(from, err)),
    }
}

fn discard_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        tracing::warn!(path = %path.display(), "could not remove rejected copy: {err}");
    }
}

fn hash_suffixed(target: &Path, hash: &str) -> PathBuf {
    let short = &hash[..hash.len().min(12)];
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "media".to_string());
    let name = match target.extension() {
        Some(ext) => format!("{stem}-{short}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{short}"),
    };
    target.with_file_name(name)
}

/// Moves new files into a local archive tree mirroring the source layout.
#[derive(Debug, Clone)]
pub struct ArchiveBackend {
    archive_dir: PathBuf,
}

impl ArchiveBackend {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    fn archive(&self, source_root: &Path, candidate: &Candidate) -> Result<PathBuf, IngestError> {
        let hash = &candidate.entry.content_hash;
        let mut target = self.archive_dir.join(relative_to_root(source_root, candidate));

        if same_file(&target, &candidate.path) {
            return Ok(target);
        }
        if target.exists() {
            if &fingerprint(&target)? == hash {
                fs::remove_file(&candidate.path)
                    .map_err(|err| IngestError::io(&candidate.path, err))?;
                return Ok(target);
            }
            target = hash_suffixed(&target, hash);
        }

        relocate(candidate, &target)?;
        Ok(target)
    }
}

impl Backend for ArchiveBackend {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn process(
        &self,
        source_root: &Path,
        candidate: &Candidate,
    ) -> Result<MediaStatus, IngestError> {
        let target = self
            .archive(source_root, candidate)
            .map_err(|err| IngestError::backend(self.name(), &candidate.entry.filename, err))?;
        tracing::debug!(from = %candidate.path.display(), to = %target.display(), "archived");
        Ok(MediaStatus::Archived)
    }
}

#[derive(Debug, Clone)]
pub enum UploadTarget {
    /// Local stand-in for a remote store.
    Outbox(PathBuf),
    Http {
        client: reqwest::blocking::Client,
        endpoint: reqwest::Url,
    },
}

impl UploadTarget {
    pub fn http(endpoint: &str, timeout: Duration) -> Result<Self, IngestError> {
        let endpoint = reqwest::Url::parse(endpoint)
            .map_err(|err| IngestError::Config(format!("upload endpoint `{endpoint}`: {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(IngestError::Config(format!(
                "upload endpoint `{endpoint}` cannot take path segments"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| IngestError::Config(format!("http client: {err}")))?;
        Ok(Self::Http { client, endpoint })
    }
}

/// `<endpoint>/<hash>/<filename>`, with each segment percent-encoded.
fn upload_url(endpoint: &reqwest::Url, entry: &MediaEntry) -> Result<reqwest::Url> {
    let mut url = endpoint.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("endpoint {endpoint} cannot take path segments"))?
        .pop_if_empty()
        .push(&entry.content_hash)
        .push(&entry.filename);
    Ok(url)
}

/// Sends new files to the upload target, optionally deleting the source
/// once the transfer is confirmed.
#[derive(Debug, Clone)]
pub struct UploadBackend {
    target: UploadTarget,
    delete_source: bool,
}

impl UploadBackend {
    pub fn new(target: UploadTarget, delete_source: bool) -> Self {
        Self {
            target,
            delete_source,
        }
    }

    fn upload(&self, candidate: &Candidate) -> Result<()> {
        let entry = &candidate.entry;
        match &self.target {
            UploadTarget::Outbox(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                let dest = dir.join(format!("{}-{}", entry.content_hash, entry.filename));
                fs::copy(&candidate.path, &dest).with_context(|| {
                    format!("failed to copy {} to {}", candidate.path.display(), dest.display())
                })?;
                let copied = fingerprint(&dest)?;
                if copied != entry.content_hash {
                    discard_partial(&dest);
                    anyhow::bail!(
                        "verification failed for {}: expected {}, got {copied}",
                        dest.display(),
                        entry.content_hash
                    );
                }
                Ok(())
            }
            UploadTarget::Http { client, endpoint } => {
                let url = upload_url(endpoint, entry)?;
                let file = fs::File::open(&candidate.path)
                    .with_context(|| format!("failed to open {}", candidate.path.display()))?;
                let response = client
                    .put(url.clone())
                    .header("x-content-sha256", &entry.content_hash)
                    .body(file)
                    .send()
                    .with_context(|| format!("PUT {url} failed"))?;
                let status = response.status();
                if !status.is_success() {
                    anyhow::bail!("PUT {url} returned {status}");
                }
                Ok(())
            }
        }
    }
}

impl Backend for UploadBackend {
    fn name(&self) -> &'static str {
        "upload"
    }

    fn process(
        &self,
        _source_root: &Path,
        candidate: &Candidate,
    ) -> Result<MediaStatus, IngestError> {
        let fail = |err: anyhow::Error| {
            IngestError::backend(self.name(), &candidate.entry.filename, format!("{err:#}"))
        };

        self.upload(candidate).map_err(fail)?;
        if self.delete_source {
            fs::remove_file(&candidate.path)
                .with_context(|| format!("uploaded but failed to delete {}", candidate.path.display()))
                .map_err(fail)?;
        }
        Ok(MediaStatus::Uploaded)
    }
}
