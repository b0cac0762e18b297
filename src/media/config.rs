use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".mkv"];
pub const DEFAULT_MOUNT_PREFIXES: &[&str] = &["/media", "/mnt"];

/// What the scan does when a directory or candidate file cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanErrorPolicy {
    #[default]
    Abort,
    Skip,
}

impl FromStr for ScanErrorPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" => Ok(Self::Skip),
            other => Err(anyhow!("unknown scan error policy `{other}`: use `abort` or `skip`")),
        }
    }
}

impl fmt::Display for ScanErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Abort => "abort",
            Self::Skip => "skip",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Archive,
    Upload,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "archive" => Ok(Self::Archive),
            "upload" => Ok(Self::Upload),
            other => Err(anyhow!("unknown backend `{other}`: use `archive` or `upload`")),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Archive => "archive",
            Self::Upload => "upload",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    pub on_error: ScanErrorPolicy,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            on_error: ScanErrorPolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: Option<String>,
    pub delete_source: bool,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Archive,
            endpoint: None,
            delete_source: false,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub mount_prefixes: Vec<String>,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            mount_prefixes: DEFAULT_MOUNT_PREFIXES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProgressConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IngestConfig {
    pub scan: ScanConfig,
    pub backend: BackendConfig,
    pub volume: VolumeConfig,
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialIngestConfig {
    scan: Option<ScanConfig>,
    backend: Option<BackendConfig>,
    volume: Option<VolumeConfig>,
    progress: Option<ProgressConfig>,
}

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_value(lookup: EnvLookup<'_>, var: &str) -> Option<String> {
    lookup(var)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or_u64(lookup: EnvLookup<'_>, var: &str, fallback: u64) -> u64 {
    env_value(lookup, var)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(fallback)
}

fn env_or_bool(lookup: EnvLookup<'_>, var: &str, fallback: bool) -> bool {
    match env_value(lookup, var).as_deref() {
        Some("1" | "true" | "TRUE" | "yes" | "on") => true,
        Some("0" | "false" | "FALSE" | "no" | "off") => false,
        _ => fallback,
    }
}

fn env_or_csv(lookup: EnvLookup<'_>, var: &str, fallback: &[String]) -> Vec<String> {
    let Some(raw) = env_value(lookup, var) else {
        return fallback.to_vec();
    };
    let out = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect::<Vec<_>>();
    if out.is_empty() { fallback.to_vec() } else { out }
}

fn env_or_parsed<T: FromStr<Err = anyhow::Error>>(
    lookup: EnvLookup<'_>,
    var: &str,
    fallback: T,
) -> Result<T> {
    match env_value(lookup, var) {
        Some(raw) => raw.parse::<T>().map_err(|err| anyhow!("{var}: {err}")),
        None => Ok(fallback),
    }
}

pub fn validate(cfg: &IngestConfig) -> Result<()> {
    if cfg.scan.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
        return Err(anyhow!("invalid scan extensions: at least one extension is required"));
    }
    if cfg.volume.mount_prefixes.is_empty() {
        return Err(anyhow!("invalid volume mount prefixes: cannot be empty"));
    }
    if let Some(bad) = cfg
        .volume
        .mount_prefixes
        .iter()
        .find(|p| !p.starts_with('/'))
    {
        return Err(anyhow!("invalid volume mount prefix `{bad}`: must be absolute"));
    }
    if cfg.backend.timeout_secs == 0 {
        return Err(anyhow!("invalid upload timeout: must be >= 1 second"));
    }
    if let Some(endpoint) = &cfg.backend.endpoint {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(anyhow!(
                "invalid upload endpoint `{endpoint}`: must start with http:// or https://"
            ));
        }
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("INGEST_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".media_ingest").join("ingest.toml"))
}

fn merge_file_config(base: &mut IngestConfig, raw: &str) -> Result<()> {
    let parsed: PartialIngestConfig = toml::from_str(raw)?;
    if let Some(scan) = parsed.scan {
        base.scan = scan;
    }
    if let Some(backend) = parsed.backend {
        base.backend = backend;
    }
    if let Some(volume) = parsed.volume {
        base.volume = volume;
    }
    if let Some(progress) = parsed.progress {
        base.progress = progress;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut IngestConfig, lookup: EnvLookup<'_>) -> Result<()> {
    cfg.scan.extensions = env_or_csv(lookup, "INGEST_EXTENSIONS", &cfg.scan.extensions);
    cfg.scan.on_error = env_or_parsed(lookup, "INGEST_SCAN_ERROR_POLICY", cfg.scan.on_error)?;
    cfg.backend.kind = env_or_parsed(lookup, "INGEST_BACKEND", cfg.backend.kind)?;
    if let Some(endpoint) = env_value(lookup, "INGEST_UPLOAD_ENDPOINT") {
        cfg.backend.endpoint = Some(endpoint);
    }
    cfg.backend.delete_source =
        env_or_bool(lookup, "INGEST_DELETE_SOURCE", cfg.backend.delete_source);
    cfg.backend.timeout_secs =
        env_or_u64(lookup, "INGEST_UPLOAD_TIMEOUT_SECS", cfg.backend.timeout_secs);
    cfg.volume.mount_prefixes =
        env_or_csv(lookup, "INGEST_MOUNT_PREFIXES", &cfg.volume.mount_prefixes);
    cfg.progress.enabled = env_or_bool(lookup, "INGEST_PROGRESS", cfg.progress.enabled);
    Ok(())
}

/// Defaults, then the TOML file, then `INGEST_*` variables. CLI flags are
/// layered on top by the command and re-validated there.
pub fn load_config() -> Result<IngestConfig> {
    let mut cfg = IngestConfig::default();

    if let Some(path) = resolve_config_path() {
        if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|err| anyhow!("failed to read config {}: {err}", path.display()))?;
            merge_file_config(&mut cfg, &raw)
                .map_err(|err| anyhow!("failed to parse config {}: {err}", path.display()))?;
        }
    }

    apply_env_overrides(&mut cfg, &|var: &str| env::var(var).ok())?;

    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults_match_video_allow_list() {
        let cfg = IngestConfig::default();
        assert_eq!(cfg.scan.extensions, vec![".mp4", ".mov", ".avi", ".mkv"]);
        assert_eq!(cfg.scan.on_error, ScanErrorPolicy::Abort);
        assert_eq!(cfg.backend.kind, BackendKind::Archive);
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn file_config_replaces_sections() {
        let mut cfg = IngestConfig::default();
        merge_file_config(
            &mut cfg,
            r#"
[scan]
extensions = [".mts", ".mp4"]
on_error = "skip"

[backend]
kind = "upload"
delete_source = true
"#,
        )
        .expect("merge");

        assert_eq!(cfg.scan.extensions, vec![".mts", ".mp4"]);
        assert_eq!(cfg.scan.on_error, ScanErrorPolicy::Skip);
        assert_eq!(cfg.backend.kind, BackendKind::Upload);
        assert!(cfg.backend.delete_source);
        assert_eq!(cfg.backend.timeout_secs, 300);
        assert_eq!(cfg.volume.mount_prefixes, vec!["/media", "/mnt"]);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = IngestConfig::default();
        let lookup = lookup_from(&[
            ("INGEST_EXTENSIONS", ".mp4, .mts ,"),
            ("INGEST_BACKEND", "UPLOAD"),
            ("INGEST_DELETE_SOURCE", "yes"),
            ("INGEST_SCAN_ERROR_POLICY", "skip"),
            ("INGEST_UPLOAD_TIMEOUT_SECS", "not-a-number"),
        ]);
        apply_env_overrides(&mut cfg, &lookup).expect("overrides");

        assert_eq!(cfg.scan.extensions, vec![".mp4", ".mts"]);
        assert_eq!(cfg.backend.kind, BackendKind::Upload);
        assert!(cfg.backend.delete_source);
        assert_eq!(cfg.scan.on_error, ScanErrorPolicy::Skip);
        assert_eq!(cfg.backend.timeout_secs, 300);
    }

    #[test]
    fn unknown_backend_in_env_is_an_error() {
        let mut cfg = IngestConfig::default();
        let lookup = lookup_from(&[("INGEST_BACKEND", "ftp")]);
        let err = apply_env_overrides(&mut cfg, &lookup).expect_err("bad backend");
        assert!(err.to_string().contains("INGEST_BACKEND"));
    }

    #[test]
    fn validate_rejects_empty_extensions_and_relative_prefixes() {
        let mut cfg = IngestConfig::default();
        cfg.scan.extensions = vec![".".to_string(), " ".to_string()];
        assert!(validate(&cfg).is_err());

        let mut cfg = IngestConfig::default();
        cfg.volume.mount_prefixes = vec!["media".to_string()];
        assert!(validate(&cfg).is_err());

        let mut cfg = IngestConfig::default();
        cfg.backend.endpoint = Some("ftp://example".to_string());
        assert!(validate(&cfg).is_err());
    }
}
