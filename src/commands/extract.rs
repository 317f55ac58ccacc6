use anyhow::Result;
use std::path::Path;

use crate::commands::CommandReport;
use crate::relay::config::load_config;
use crate::relay::extract::{self, ExtractOptions};

pub fn run(archive: &Path, destination: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("extract");
    let cfg = load_config()?;
    let opts = ExtractOptions { zone: cfg.zone()? };

    report.detail(format!("archive={}", archive.display()));
    report.detail(format!("destination={}", destination.display()));
    report.detail(format!("timezone={}", opts.zone.label()));

    let result = match extract::extract(archive, destination, &opts) {
        Ok(result) => result,
        Err(err) => {
            report.issue(format!("{}: {err}", err.code().as_str()));
            return Ok(report);
        }
    };

    report.detail(format!("entries={}", result.entries_total));
    report.detail(format!("files={}", result.files_extracted));
    report.detail(format!("directories={}", result.directories_created));
    report.detail(format!("bytes={}", result.bytes_written));
    report.detail(format!("timestamp_failures={}", result.timestamp_failures));
    for renamed in &result.renamed {
        report.detail(format!(
            "rename={} -> {} ({})",
            renamed.from, renamed.to, renamed.strategy
        ));
    }
    for issue in &result.issues {
        report.detail(format!(
            "warning={} kind={:?} {}",
            issue.entry, issue.kind, issue.message
        ));
    }
    Ok(report)
}
