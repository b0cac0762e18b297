use crate::error::IngestError;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the duration of one run.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

pub fn lock_path_for(manifest: &Path) -> PathBuf {
    let mut name = manifest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "video_mapping.json".into());
    name.push(".lock");
    manifest.with_file_name(name)
}

impl RunLock {
    pub fn acquire(manifest: &Path) -> Result<Self, IngestError> {
        let path = lock_path_for(manifest);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| IngestError::io(parent, err))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|err| IngestError::io(&path, err))?;

        if let Err(err) = file.try_lock_exclusive() {
            if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(IngestError::Locked(path));
            }
            return Err(IngestError::io(&path, err));
        }

        file.set_len(0).map_err(|err| IngestError::io(&path, err))?;
        writeln!(file, "{}", std::process::id()).map_err(|err| IngestError::io(&path, err))?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
