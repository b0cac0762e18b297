use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct IngestPaths {
    pub ingest_home: PathBuf,
    pub manifest_file: PathBuf,
    pub archive_dir: PathBuf,
    pub outbox_dir: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<IngestPaths> {
    let ingest_home = match env::var("INGEST_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".media_ingest"),
    };

    let manifest_file =
        env_or_default_path("INGEST_MANIFEST", ingest_home.join("video_mapping.json"));
    let archive_dir = env_or_default_path("INGEST_ARCHIVE_DIR", ingest_home.join("archive"));
    let outbox_dir = env_or_default_path("INGEST_OUTBOX_DIR", ingest_home.join("outbox"));
    let logs_dir = env_or_default_path("INGEST_LOGS_DIR", ingest_home.join("logs"));

    Ok(IngestPaths {
        ingest_home,
        manifest_file,
        archive_dir,
        outbox_dir,
        logs_dir,
    })
}

impl IngestPaths {
    pub fn with_manifest(mut self, manifest: Option<PathBuf>) -> Self {
        if let Some(path) = manifest {
            self.manifest_file = path;
        }
        self
    }
}
