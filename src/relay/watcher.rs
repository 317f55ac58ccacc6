use crate::error::ZxErrorCode;
use crate::relay::audit;
use crate::relay::config::{RelayConfig, load_config};
use crate::relay::discover;
use crate::relay::extract::ExtractOptions;
use crate::relay::lock;
use crate::relay::notify::{self, NotifyPayload};
use crate::relay::paths::{ZxPaths, resolve_paths};
use crate::relay::pipeline::{self, PipelineConfig, PipelineOutcome, RunStatus};
use crate::relay::retention::{self, RetentionOutcome};
use crate::relay::util::truncate_with_ellipsis;
use crate::relay::warn;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const MAX_ERROR_CHARS: usize = 300;

#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Ingest this file instead of the newest archive in the inbox.
    pub archive: Option<PathBuf>,
    pub force: bool,
}

#[derive(Debug, Clone)]
pub struct NotifyResult {
    pub notifier: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub paths: ZxPaths,
    pub poll_interval_secs: u64,
    pub archive: Option<PathBuf>,
    pub pipeline: Option<PipelineOutcome>,
    pub notify: Option<NotifyResult>,
    pub retention: Option<RetentionOutcome>,
}

fn pipeline_config(cfg: &RelayConfig, paths: &ZxPaths, force: bool) -> Result<PipelineConfig> {
    Ok(PipelineConfig {
        extract: ExtractOptions { zone: cfg.zone()? },
        clean_scratch: cfg.extract.clean_scratch,
        marker_path: paths.marker_file(),
        archive_prefix: cfg.archive.prefix.clone(),
        force,
    })
}

fn locate_archive(
    cfg: &RelayConfig,
    paths: &ZxPaths,
    opts: &IngestOptions,
) -> Result<Option<PathBuf>> {
    if let Some(explicit) = &opts.archive {
        if !explicit.is_file() {
            anyhow::bail!("archive not found: {}", explicit.display());
        }
        audit::append_event(
            &paths.logs_dir,
            "discover",
            "ok",
            &format!("explicit archive {}", explicit.display()),
        )?;
        return Ok(Some(explicit.clone()));
    }

    match discover::newest_archive(&paths.inbox_dir, &cfg.rules())? {
        Some(candidate) => {
            audit::append_event(
                &paths.logs_dir,
                "discover",
                "ok",
                &format!("newest archive {} version={}", candidate.name, candidate.version),
            )?;
            Ok(Some(candidate.path))
        }
        None => {
            audit::append_event(
                &paths.logs_dir,
                "discover",
                "skipped",
                &format!("no qualifying archive in {}", paths.inbox_dir.display()),
            )?;
            Ok(None)
        }
    }
}

fn record_pipeline(paths: &ZxPaths, archive: &Path, outcome: &PipelineOutcome) -> Result<()> {
    let logs = &paths.logs_dir;
    let archive_label = archive.display().to_string();

    if outcome.status == RunStatus::AlreadyPublished {
        audit::append_event(
            logs,
            "extract",
            "skipped",
            &format!("{} already published", outcome.archive_name),
        )?;
        return Ok(());
    }

    match &outcome.extraction {
        Some(extraction) => {
            let status = if extraction.has_warnings() { "degraded" } else { "ok" };
            audit::append_event(
                logs,
                "extract",
                status,
                &format!(
                    "entries={} files={} dirs={} renamed={} issues={} timestamp_failures={}",
                    extraction.entries_total,
                    extraction.files_extracted,
                    extraction.directories_created,
                    extraction.renamed.len(),
                    extraction.issues.len(),
                    extraction.timestamp_failures
                ),
            )?;
        }
        None => {
            let reason = outcome.failure.clone().unwrap_or_default();
            audit::append_event(logs, "extract", "failed", &reason)?;
            audit::append_event(logs, "sync", "skipped", "extraction failed")?;
            return Ok(());
        }
    }

    match &outcome.sync {
        Some(sync) => {
            let status = if sync.issues.is_empty() { "ok" } else { "degraded" };
            audit::append_event(
                logs,
                "sync",
                status,
                &format!(
                    "created={} updated={} dirs_created={} unchanged={} issues={}",
                    sync.created.len(),
                    sync.updated.len(),
                    sync.directories_created,
                    sync.unchanged,
                    sync.issues.len()
                ),
            )?;
            for issue in &sync.issues {
                warn::emit(
                    ZxErrorCode::E006SyncDegraded.as_str(),
                    "sync",
                    "continue",
                    &archive_label,
                    &issue.path,
                    "per-path-failure",
                    &issue.message,
                );
            }
        }
        None => {
            let reason = outcome.failure.clone().unwrap_or_default();
            audit::append_event(logs, "sync", "failed", &reason)?;
        }
    }

    let marker_status = if outcome.marker_written { "ok" } else { "skipped" };
    audit::append_event(
        logs,
        "marker",
        marker_status,
        &format!("{}", paths.marker_file().display()),
    )?;
    Ok(())
}

fn send_notification(
    cfg: &RelayConfig,
    paths: &ZxPaths,
    archive: &Path,
    outcome: &PipelineOutcome,
) -> Result<Option<NotifyResult>> {
    let Some(notifier) = notify::from_config(&cfg.notify) else {
        audit::append_event(&paths.logs_dir, "notify", "skipped", "notifications disabled")?;
        return Ok(None);
    };
    let payload =
        NotifyPayload::from_outcome(outcome, cfg.notify.max_listed_paths, &cfg.notify.addendum);

    let error = match notifier.notify(&payload) {
        Ok(()) => {
            audit::append_event(&paths.logs_dir, "notify", "ok", notifier.label())?;
            None
        }
        Err(err) => {
            let message = truncate_with_ellipsis(&format!("{err:#}"), MAX_ERROR_CHARS);
            warn::emit(
                ZxErrorCode::E008NotifyFailed.as_str(),
                "notify",
                "degrade",
                &archive.display().to_string(),
                "na",
                notifier.label(),
                &message,
            );
            audit::append_event(&paths.logs_dir, "notify", "degraded", &message)?;
            Some(message)
        }
    };
    Ok(Some(NotifyResult {
        notifier: notifier.label().to_string(),
        error,
    }))
}

fn prune_inbox(cfg: &RelayConfig, paths: &ZxPaths, archive: &Path) -> Result<RetentionOutcome> {
    let out = retention::prune_archives(
        &paths.inbox_dir,
        &cfg.rules(),
        cfg.retention.keep_archives,
        archive,
    )?;
    let status = if out.failed.is_empty() { "ok" } else { "degraded" };
    audit::append_event(
        &paths.logs_dir,
        "retention",
        status,
        &format!(
            "kept={} removed={} failed={}",
            out.kept,
            out.removed.len(),
            out.failed.len()
        ),
    )?;
    Ok(out)
}

/// One discover, ingest, notify and prune pass under the ingest lock.
pub fn run_once(opts: &IngestOptions) -> Result<CycleOutcome> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let _guard = lock::acquire(&paths.lock_file())?;

    let mut out = CycleOutcome {
        paths: paths.clone(),
        poll_interval_secs: cfg.watcher.poll_interval_secs,
        archive: None,
        pipeline: None,
        notify: None,
        retention: None,
    };

    let Some(archive) = locate_archive(&cfg, &paths, opts)? else {
        return Ok(out);
    };
    out.archive = Some(archive.clone());

    let pipeline_cfg = pipeline_config(&cfg, &paths, opts.force)?;
    let outcome = pipeline::run(
        &pipeline_cfg,
        &archive,
        &paths.scratch_dir,
        &paths.published_dir,
    )
    .with_context(|| format!("failed to ingest {}", archive.display()))?;
    record_pipeline(&paths, &archive, &outcome)?;

    if outcome.status.published() {
        out.notify = send_notification(&cfg, &paths, &archive, &outcome)?;
        out.retention = Some(prune_inbox(&cfg, &paths, &archive)?);
    }

    out.pipeline = Some(outcome);
    Ok(out)
}

pub fn run_daemon() -> Result<()> {
    let opts = IngestOptions::default();
    loop {
        let poll_interval_secs = match run_once(&opts) {
            Ok(cycle) => cycle.poll_interval_secs,
            Err(err) => {
                warn::emit(
                    "na",
                    "watch",
                    "retry",
                    "na",
                    "na",
                    "cycle-failed",
                    &format!("{err:#}"),
                );
                load_config()?.watcher.poll_interval_secs
            }
        };
        thread::sleep(Duration::from_secs(poll_interval_secs));
    }
}
