use crate::relay::discover::{file_name_string, parse_version};
use crate::relay::util::{file_sha256, now_epoch_secs};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Record of the last archive whose contents reached the published tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionMarker {
    pub schema_version: u32,
    pub archive_name: String,
    pub archive_sha256: Option<String>,
    pub archive_version: Option<String>,
    pub completed_at_epoch_secs: u64,
    pub build_uuid: String,
}

impl Default for CompletionMarker {
    fn default() -> Self {
        Self {
            schema_version: 1,
            archive_name: String::new(),
            archive_sha256: None,
            archive_version: None,
            completed_at_epoch_secs: 0,
            build_uuid: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIdentity {
    pub name: String,
    pub sha256: String,
    pub version: Option<String>,
}

impl ArchiveIdentity {
    pub fn from_path(path: &Path, prefix: &str) -> Result<Self> {
        let name = file_name_string(path)
            .ok_or_else(|| anyhow!("archive path has no file name: {}", path.display()))?;
        let sha256 = file_sha256(path)?;
        let version = parse_version(&name, prefix).map(|(digits, _)| digits);
        Ok(Self {
            name,
            sha256,
            version,
        })
    }

    /// Same content as the marked archive. A marker without a digest falls
    /// back to comparing names.
    pub fn matches(&self, marker: &CompletionMarker) -> bool {
        match &marker.archive_sha256 {
            Some(sha) => sha.eq_ignore_ascii_case(&self.sha256),
            None => !marker.archive_name.is_empty() && marker.archive_name == self.name,
        }
    }

    pub fn to_marker(&self) -> Result<CompletionMarker> {
        Ok(CompletionMarker {
            archive_name: self.name.clone(),
            archive_sha256: Some(self.sha256.clone()),
            archive_version: self.version.clone(),
            completed_at_epoch_secs: now_epoch_secs()?,
            build_uuid: env!("BUILD_UUID").to_string(),
            ..CompletionMarker::default()
        })
    }
}

pub fn load(path: &Path) -> Result<Option<CompletionMarker>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: CompletionMarker = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(parsed))
}

pub fn save(path: &Path, marker: &CompletionMarker) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(marker)?;
    fs::write(path, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}
