use anyhow::Result;

use crate::commands::{CommandReport, ingest};
use crate::relay::watcher::{self, IngestOptions};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    if opts.daemon {
        report.detail("starting zxsync watcher in daemon mode");
        watcher::run_daemon()?;
        return Ok(report);
    }

    let cycle = watcher::run_once(&IngestOptions::default())?;
    report.detail("zxsync watcher cycle completed");
    report.detail(format!("poll_interval_secs={}", cycle.poll_interval_secs));
    report.merge(ingest::describe(&cycle));
    Ok(report)
}
