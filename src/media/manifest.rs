use crate::error::IngestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Pending,
    Uploaded,
    Archived,
}

impl MediaStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Archived => "archived",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One media file the tool has seen. `content_hash` is the identity;
/// `filename` is informational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub filename: String,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "upload_status")]
    pub status: MediaStatus,
    #[serde(
        rename = "upload_timestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub processed_at: Option<DateTime<Utc>>,
}

impl MediaEntry {
    pub fn pending(filename: impl Into<String>, content_hash: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            content_hash: content_hash.into(),
            status: MediaStatus::Pending,
            processed_at: None,
        }
    }

    /// Move a pending entry to its terminal state. Happens once.
    pub fn promote(mut self, status: MediaStatus, at: DateTime<Utc>) -> Result<Self, IngestError> {
        if self.status.is_terminal() {
            return Err(IngestError::Invariant(format!(
                "entry {} is already {}",
                self.content_hash,
                self.status.as_str()
            )));
        }
        if !status.is_terminal() {
            return Err(IngestError::Invariant(format!(
                "entry {} cannot be promoted to pending",
                self.content_hash
            )));
        }
        self.status = status;
        self.processed_at = Some(at);
        Ok(self)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<MediaEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<MediaEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Ordered record of every processed file, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_empty")]
    videos: Vec<MediaEntry>,
}

impl Manifest {
    pub fn entries(&self) -> &[MediaEntry] {
        &self.videos
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }

    pub fn known_hashes(&self) -> HashSet<String> {
        self.videos.iter().map(|v| v.content_hash.clone()).collect()
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.videos.iter().any(|v| v.content_hash == hash)
    }

    pub fn count_by_status(&self) -> BTreeMap<MediaStatus, usize> {
        let mut out = BTreeMap::new();
        for entry in &self.videos {
            *out.entry(entry.status).or_insert(0) += 1;
        }
        out
    }

    pub(crate) fn append(&mut self, entry: MediaEntry) -> Result<(), IngestError> {
        if self.contains_hash(&entry.content_hash) {
            return Err(IngestError::Invariant(format!(
                "hash {} ({}) is already in the manifest",
                entry.content_hash, entry.filename
            )));
        }
        self.videos.push(entry);
        Ok(())
    }

    fn check_invariants(&self) -> Result<(), String> {
        let mut seen = HashSet::with_capacity(self.videos.len());
        for (idx, entry) in self.videos.iter().enumerate() {
            if entry.content_hash.trim().is_empty() {
                return Err(format!("entry {idx} ({}) has an empty hash", entry.filename));
            }
            if !seen.insert(entry.content_hash.as_str()) {
                return Err(format!(
                    "entry {idx} ({}) repeats hash {}",
                    entry.filename, entry.content_hash
                ));
            }
            if entry.status.is_terminal() != entry.processed_at.is_some() {
                return Err(format!(
                    "entry {idx} ({}) is {} but upload_timestamp is {}",
                    entry.filename,
                    entry.status.as_str(),
                    if entry.processed_at.is_some() { "set" } else { "missing" }
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
impl Manifest {
    pub(crate) fn from_entries(videos: Vec<MediaEntry>) -> Self {
        Self { videos }
    }
}

/// JSON snapshot of the manifest on disk. Single process, single run.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the snapshot. A missing file is bootstrapped as an empty manifest
    /// on disk before returning.
    pub fn load(&self) -> Result<Manifest, IngestError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let empty = Manifest::default();
                self.save(&empty)?;
                tracing::info!(manifest = %self.path.display(), "created empty manifest");
                return Ok(empty);
            }
            Err(err) => return Err(IngestError::io(&self.path, err)),
        };

        let manifest: Manifest = serde_json::from_str(&raw).map_err(|err| IngestError::Decode {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;
        manifest
            .check_invariants()
            .map_err(|reason| IngestError::Decode {
                path: self.path.clone(),
                reason,
            })?;
        Ok(manifest)
    }

    /// Replace the snapshot with the full in-memory state.
    pub fn save(&self, manifest: &Manifest) -> Result<(), IngestError> {
        let data = serde_json::to_string_pretty(manifest).map_err(|err| {
            IngestError::Invariant(format!("manifest is not serializable: {err}"))
        })?;
        write_atomic(&self.path, format!("{data}\n").as_bytes())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IngestError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|err| IngestError::io(&parent, err))?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|err| IngestError::io(&parent, err))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|err| IngestError::io(tmp.path(), err))?;
    tmp.persist(path)
        .map_err(|err| IngestError::io(path, err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn uploaded(name: &str, hash: &str) -> MediaEntry {
        MediaEntry::pending(name, hash)
            .promote(
                MediaStatus::Uploaded,
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            )
            .expect("promote")
    }

    #[test]
    fn load_bootstraps_missing_manifest() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("state/video_mapping.json");
        let store = ManifestStore::new(&path);

        let manifest = store.load().expect("load");
        assert!(manifest.is_empty());
        assert!(path.is_file());

        let raw = fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value, serde_json::json!({ "videos": [] }));
    }

    #[test]
    fn save_then_load_preserves_entries_and_order() {
        let tmp = tempdir().expect("tempdir");
        let store = ManifestStore::new(tmp.path().join("video_mapping.json"));

        let mut manifest = Manifest::default();
        manifest.append(uploaded("b.mp4", "bbbb")).expect("append b");
        manifest.append(uploaded("a.mov", "aaaa")).expect("append a");
        store.save(&manifest).expect("save");

        let loaded = store.load().expect("load");
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.entries()[0].filename, "b.mp4");
        assert_eq!(loaded.entries()[1].filename, "a.mov");
    }

    #[test]
    fn wire_format_uses_mapping_field_names() {
        let mut manifest = Manifest::default();
        manifest.append(uploaded("clip.mp4", "abc123")).expect("append");

        let value = serde_json::to_value(&manifest).expect("to_value");
        let entry = &value["videos"][0];
        assert_eq!(entry["filename"], "clip.mp4");
        assert_eq!(entry["hash"], "abc123");
        assert_eq!(entry["upload_status"], "uploaded");
        assert_eq!(entry["upload_timestamp"], "2024-05-01T12:30:00Z");

        let pending = serde_json::to_value(MediaEntry::pending("p.mp4", "ff")).expect("pending");
        assert!(pending.get("upload_timestamp").is_none());
    }

    #[test]
    fn null_video_list_loads_as_empty() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("video_mapping.json");
        fs::write(&path, "{\"videos\":null}\n").expect("write");

        let manifest = ManifestStore::new(&path).load().expect("load");
        assert!(manifest.is_empty());
    }

    #[test]
    fn corrupt_manifest_is_a_decode_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("video_mapping.json");
        fs::write(&path, "{\"videos\": [").expect("write");

        let err = ManifestStore::new(&path).load().expect_err("corrupt");
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn duplicate_hash_on_disk_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("video_mapping.json");
        let dup = Manifest::from_entries(vec![uploaded("a.mp4", "same"), uploaded("b.mp4", "same")]);
        fs::write(&path, serde_json::to_string(&dup).expect("json")).expect("write");

        let err = ManifestStore::new(&path).load().expect_err("duplicate");
        match err {
            IngestError::Decode { reason, .. } => assert!(reason.contains("repeats hash same")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn terminal_entry_without_timestamp_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("video_mapping.json");
        fs::write(
            &path,
            r#"{"videos":[{"filename":"a.mp4","hash":"aa","upload_status":"uploaded"}]}"#,
        )
        .expect("write");

        let err = ManifestStore::new(&path).load().expect_err("missing timestamp");
        assert!(matches!(err, IngestError::Decode { .. }));
    }

    #[test]
    fn append_refuses_known_hash() {
        let mut manifest = Manifest::default();
        manifest.append(uploaded("a.mp4", "h1")).expect("first");
        let err = manifest
            .append(uploaded("renamed.mp4", "h1"))
            .expect_err("second");
        assert!(matches!(err, IngestError::Invariant(_)));
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn promote_happens_once() {
        let entry = uploaded("a.mp4", "h1");
        assert!(entry.promote(MediaStatus::Archived, Utc::now()).is_err());
        assert!(
            MediaEntry::pending("a.mp4", "h1")
                .promote(MediaStatus::Pending, Utc::now())
                .is_err()
        );
    }

    #[test]
    fn count_by_status_groups_entries() {
        let archived = MediaEntry::pending("c.mkv", "h3")
            .promote(MediaStatus::Archived, Utc::now())
            .expect("promote");
        let manifest = Manifest::from_entries(vec![
            uploaded("a.mp4", "h1"),
            uploaded("b.mp4", "h2"),
            archived,
        ]);
        let counts = manifest.count_by_status();
        assert_eq!(counts.get(&MediaStatus::Uploaded), Some(&2));
        assert_eq!(counts.get(&MediaStatus::Archived), Some(&1));
        assert_eq!(counts.get(&MediaStatus::Pending), None);
    }
}
