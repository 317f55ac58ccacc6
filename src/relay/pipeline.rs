use crate::relay::extract::{self, ExtractOptions, ExtractionResult};
use crate::relay::marker::{self, ArchiveIdentity};
use crate::relay::tree_sync::{self, SyncResult};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub extract: ExtractOptions,
    /// Empty the scratch tree before extracting.
    pub clean_scratch: bool,
    pub marker_path: PathBuf,
    pub archive_prefix: String,
    /// Ingest even when the marker says the archive is already published.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Published,
    PublishedWithWarnings,
    AlreadyPublished,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::PublishedWithWarnings => "published_with_warnings",
            Self::AlreadyPublished => "already_published",
            Self::Failed => "failed",
        }
    }

    pub fn published(self) -> bool {
        matches!(self, Self::Published | Self::PublishedWithWarnings)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub archive_name: String,
    pub archive_version: Option<String>,
    pub archive_sha256: String,
    pub status: RunStatus,
    pub extraction: Option<ExtractionResult>,
    pub sync: Option<SyncResult>,
    pub failure: Option<String>,
    pub marker_written: bool,
}

impl PipelineOutcome {
    fn new(identity: &ArchiveIdentity, status: RunStatus) -> Self {
        Self {
            archive_name: identity.name.clone(),
            archive_version: identity.version.clone(),
            archive_sha256: identity.sha256.clone(),
            status,
            extraction: None,
            sync: None,
            failure: None,
            marker_written: false,
        }
    }

    fn failed(mut self, reason: String) -> Self {
        self.status = RunStatus::Failed;
        self.failure = Some(reason);
        self
    }
}

fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            fs::remove_dir_all(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        } else {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
        }
    }
    Ok(())
}

/// Extract `archive` into `scratch`, then merge scratch into `published`.
///
/// Hard failures of extraction or sync come back as a `Failed` outcome;
/// the `Err` path is reserved for marker and scratch housekeeping.
pub fn run(
    cfg: &PipelineConfig,
    archive: &Path,
    scratch: &Path,
    published: &Path,
) -> Result<PipelineOutcome> {
    let identity = ArchiveIdentity::from_path(archive, &cfg.archive_prefix)?;

    if !cfg.force {
        if let Some(previous) = marker::load(&cfg.marker_path)? {
            if identity.matches(&previous) {
                return Ok(PipelineOutcome::new(&identity, RunStatus::AlreadyPublished));
            }
        }
    }

    let mut outcome = PipelineOutcome::new(&identity, RunStatus::Published);

    if cfg.clean_scratch {
        clear_dir(scratch)?;
    }

    let extraction = match extract::extract(archive, scratch, &cfg.extract) {
        Ok(result) => result,
        Err(err) => return Ok(outcome.failed(format!("extract: {err}"))),
    };
    let extraction_warnings = extraction.has_warnings();
    outcome.extraction = Some(extraction);

    let synced = match tree_sync::sync(scratch, published) {
        Ok(result) => result,
        Err(err) => return Ok(outcome.failed(format!("sync: {err}"))),
    };
    let sync_clean = synced.issues.is_empty();
    outcome.sync = Some(synced);

    if extraction_warnings || !sync_clean {
        outcome.status = RunStatus::PublishedWithWarnings;
    }

    if sync_clean {
        marker::save(&cfg.marker_path, &identity.to_marker()?)?;
        outcome.marker_written = true;
    }

    Ok(outcome)
}
