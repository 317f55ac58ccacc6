use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::error::ZxErrorCode;
use crate::relay::audit;
use crate::relay::config::load_config;
use crate::relay::discover;
use crate::relay::lock;
use crate::relay::marker;
use crate::relay::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/zxsync_env_keys.rs"));

const RECENT_EVENTS: usize = 5;

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("zxsync_home={}", paths.home.display()));
    report.detail(format!("inbox_dir={}", paths.inbox_dir.display()));
    report.detail(format!("scratch_dir={}", paths.scratch_dir.display()));
    report.detail(format!("published_dir={}", paths.published_dir.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("build_uuid={}", env!("BUILD_UUID")));

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            report.issue(format!("config invalid: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("config.archive.prefix={}", cfg.archive.prefix));
    report.detail(format!("config.archive.extension={}", cfg.archive.extension));
    report.detail(format!("config.extract.timezone={}", cfg.extract.timezone));
    report.detail(format!("config.watcher.poll_interval_secs={}", cfg.watcher.poll_interval_secs));
    report.detail(format!("config.retention.keep_archives={}", cfg.retention.keep_archives));
    report.detail(format!(
        "config.notify={}",
        notify_label(cfg.notify.enabled, cfg.notify.webhook_url.is_some())
    ));

    if !paths.inbox_dir.exists() {
        report.detail("inbox=missing");
    } else {
        match discover::newest_archive(&paths.inbox_dir, &cfg.rules()) {
            Ok(Some(candidate)) => report.detail(format!("inbox.newest={}", candidate.name)),
            Ok(None) => report.detail("inbox.newest=none"),
            Err(err) => report.issue(format!("inbox unreadable: {err:#}")),
        }
    }

    match marker::load(&paths.marker_file()) {
        Ok(Some(m)) => {
            report.detail(format!("marker.archive={}", m.archive_name));
            if let Some(version) = m.archive_version {
                report.detail(format!("marker.version={version}"));
            }
            report.detail(format!("marker.completed_at_epoch_secs={}", m.completed_at_epoch_secs));
        }
        Ok(None) => report.detail("marker=none"),
        Err(err) => report.issue(format!(
            "{}: {err:#}",
            ZxErrorCode::E007StateCorrupt.as_str()
        )),
    }

    match lock::read_holder(&paths.lock_file()) {
        Ok(Some(holder)) => {
            report.detail(format!("lock.pid={}", holder.pid));
            report.detail(format!("lock.started_at_epoch_secs={}", holder.started_at_epoch_secs));
            if holder.build_uuid != env!("BUILD_UUID") {
                report.detail(format!("lock.build_uuid={} (differs)", holder.build_uuid));
            }
        }
        Ok(None) => report.detail("lock=free"),
        Err(err) => report.detail(format!("lock=unreadable ({err:#})")),
    }

    for event in audit::tail(&paths.logs_dir, RECENT_EVENTS)? {
        report.detail(format!(
            "audit={} {} {} {}",
            event.at_epoch_secs, event.phase, event.status, event.message
        ));
    }

    let set_keys = RECOGNISED_ENV_KEYS
        .iter()
        .filter(|key| env::var_os(key).is_some())
        .copied()
        .collect::<Vec<_>>();
    report.detail(format!("env.recognised={}", RECOGNISED_ENV_KEYS.len()));
    report.detail(format!("env.set={}", set_keys.join(",")));

    Ok(report)
}

fn notify_label(enabled: bool, webhook: bool) -> &'static str {
    match (enabled, webhook) {
        (false, _) => "disabled",
        (true, true) => "webhook",
        (true, false) => "stderr",
    }
}
