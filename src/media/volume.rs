use crate::error::IngestError;
use std::path::{Path, PathBuf};

/// Finds the directory to ingest from.
pub trait VolumeDetector {
    fn detect(&self) -> Result<PathBuf, IngestError>;
}

/// A directory given explicitly, e.g. `--dir`.
#[derive(Debug, Clone)]
pub struct FixedDirectory(pub PathBuf);

impl VolumeDetector for FixedDirectory {
    fn detect(&self) -> Result<PathBuf, IngestError> {
        if self.0.is_dir() {
            Ok(self.0.clone())
        } else {
            Err(IngestError::VolumeNotFound(format!(
                "{} is not a directory",
                self.0.display()
            )))
        }
    }
}

/// First mounted filesystem under one of the configured prefixes.
#[derive(Debug, Clone)]
pub struct MountTableDetector {
    mount_prefixes: Vec<String>,
}

impl MountTableDetector {
    pub fn new(mount_prefixes: Vec<String>) -> Self {
        Self { mount_prefixes }
    }
}

impl VolumeDetector for MountTableDetector {
    fn detect(&self) -> Result<PathBuf, IngestError> {
        platform_detect(&self.mount_prefixes)
    }
}

#[cfg(target_os = "linux")]
fn platform_detect(prefixes: &[String]) -> Result<PathBuf, IngestError> {
    const MOUNTS: &str = "/proc/mounts";
    let raw = std::fs::read_to_string(MOUNTS).map_err(|err| IngestError::io(MOUNTS, err))?;
    first_removable_mount(&raw, prefixes).ok_or_else(|| {
        IngestError::VolumeNotFound(format!("no mount under {}", prefixes.join(", ")))
    })
}

#[cfg(target_os = "macos")]
fn platform_detect(_prefixes: &[String]) -> Result<PathBuf, IngestError> {
    const VOLUMES: &str = "/Volumes";
    let entries = std::fs::read_dir(VOLUMES).map_err(|err| IngestError::io(VOLUMES, err))?;
    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::io(VOLUMES, err))?;
        // The boot volume appears here as a symlink to `/`.
        let is_link = entry.file_type().map(|t| t.is_symlink()).unwrap_or(true);
        if !is_link && entry.path().is_dir() {
            found.push(entry.path());
        }
    }
    found.sort();
    found
        .into_iter()
        .next()
        .ok_or_else(|| IngestError::VolumeNotFound(format!("nothing mounted in {VOLUMES}")))
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_detect(_prefixes: &[String]) -> Result<PathBuf, IngestError> {
    Err(IngestError::VolumeNotFound(
        "automatic detection is not supported on this platform; pass --dir".to_string(),
    ))
}

/// Undo the octal escapes `/proc/mounts` uses for space, tab, newline and backslash.
fn decode_mount_field(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let escape = bytes
            .get(i + 1..i + 4)
            .filter(|digits| bytes[i] == b'\\' && digits.iter().all(|b| (b'0'..=b'7').contains(b)))
            .map(|digits| digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0')))
            .and_then(|value| u8::try_from(value).ok());
        match escape {
            Some(value) => {
                out.push(value);
                i += 4;
            }
            None => {
                out.push(bytes[i]);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn under_prefix(mount_point: &Path, prefix: &str) -> bool {
    mount_point.starts_with(prefix) && mount_point != Path::new(prefix)
}

pub fn first_removable_mount(mount_table: &str, prefixes: &[String]) -> Option<PathBuf> {
    mount_table
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(|field| PathBuf::from(decode_mount_field(field)))
        .find(|mount_point| prefixes.iter().any(|p| under_prefix(mount_point, p)))
}
