use anyhow::Result;
use std::path::Path;

use crate::commands::CommandReport;
use crate::relay::tree_sync;

pub fn run(source: &Path, destination: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("sync");
    report.detail(format!("source={}", source.display()));
    report.detail(format!("destination={}", destination.display()));

    let result = match tree_sync::sync(source, destination) {
        Ok(result) => result,
        Err(err) => {
            report.issue(format!("{}: {err}", err.code().as_str()));
            return Ok(report);
        }
    };

    report.detail(format!("created={}", result.created.len()));
    report.detail(format!("updated={}", result.updated.len()));
    report.detail(format!("directories_created={}", result.directories_created));
    report.detail(format!("unchanged={}", result.unchanged));
    for path in &result.created {
        report.detail(format!("create={path}"));
    }
    for path in &result.updated {
        report.detail(format!("update={path}"));
    }
    for issue in &result.issues {
        report.issue(format!("{}: {}", issue.path, issue.message));
    }
    Ok(report)
}
