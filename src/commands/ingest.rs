use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::relay::extract::EntryIssueKind;
use crate::relay::pipeline::RunStatus;
use crate::relay::watcher::{self, CycleOutcome, IngestOptions};

#[derive(Debug, Clone, Default)]
pub struct IngestCommandOptions {
    pub archive: Option<PathBuf>,
    pub force: bool,
}

/// Fold one ingest cycle into report lines.
pub fn describe(cycle: &CycleOutcome) -> CommandReport {
    let mut report = CommandReport::new("ingest");
    report.detail(format!("inbox_dir={}", cycle.paths.inbox_dir.display()));
    report.detail(format!("published_dir={}", cycle.paths.published_dir.display()));

    let Some(archive) = &cycle.archive else {
        report.detail("archive=none");
        return report;
    };
    report.detail(format!("archive={}", archive.display()));

    let Some(outcome) = &cycle.pipeline else {
        return report;
    };
    report.detail(format!("status={}", outcome.status.as_str()));
    if let Some(version) = &outcome.archive_version {
        report.detail(format!("version={version}"));
    }
    report.detail(format!("sha256={}", outcome.archive_sha256));

    if let Some(extraction) = &outcome.extraction {
        report.detail(format!("extract.entries={}", extraction.entries_total));
        report.detail(format!("extract.files={}", extraction.files_extracted));
        report.detail(format!("extract.bytes={}", extraction.bytes_written));
        report.detail(format!("extract.renamed={}", extraction.renamed.len()));
        report.detail(format!(
            "extract.decode_warnings={}",
            extraction.issues_of(EntryIssueKind::Decode)
        ));
        report.detail(format!(
            "extract.timestamp_failures={}",
            extraction.timestamp_failures
        ));
        for renamed in &extraction.renamed {
            report.detail(format!(
                "extract.rename={} -> {} ({})",
                renamed.from, renamed.to, renamed.strategy
            ));
        }
        for issue in &extraction.issues {
            report.detail(format!(
                "extract.warning={} kind={:?} {}",
                issue.entry, issue.kind, issue.message
            ));
        }
    }

    if let Some(sync) = &outcome.sync {
        report.detail(format!("sync.created={}", sync.created.len()));
        report.detail(format!("sync.updated={}", sync.updated.len()));
        report.detail(format!("sync.unchanged={}", sync.unchanged));
        report.detail(format!("sync.changed={}", sync.has_changes()));
        for path in &sync.created {
            report.detail(format!("sync.create={path}"));
        }
        for path in &sync.updated {
            report.detail(format!("sync.update={path}"));
        }
        for issue in &sync.issues {
            report.issue(format!("sync failed for {}: {}", issue.path, issue.message));
        }
    }
    report.detail(format!("marker_written={}", outcome.marker_written));

    if outcome.status == RunStatus::Failed {
        let reason = outcome.failure.as_deref().unwrap_or("unknown failure");
        report.issue(format!("ingest failed: {reason}"));
    }

    if let Some(notify) = &cycle.notify {
        match &notify.error {
            None => report.detail(format!("notify={} ok", notify.notifier)),
            Some(err) => report.detail(format!("notify={} degraded: {err}", notify.notifier)),
        }
    }

    if let Some(retention) = &cycle.retention {
        report.detail(format!(
            "retention.kept={} retention.removed={}",
            retention.kept,
            retention.removed.len()
        ));
        for failed in &retention.failed {
            report.detail(format!("retention.failed={failed}"));
        }
    }

    report
}

pub fn run(opts: &IngestCommandOptions) -> Result<CommandReport> {
    let cycle = watcher::run_once(&IngestOptions {
        archive: opts.archive.clone(),
        force: opts.force,
    })?;
    Ok(describe(&cycle))
}
