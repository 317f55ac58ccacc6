use crate::relay::config::NotifyConfig;
use crate::relay::pipeline::{PipelineOutcome, RunStatus};
use anyhow::Result;
use reqwest::blocking::Client;
use serde::Serialize;
use std::time::Duration;

/// Paths listed in full, or only counted once the list grows too long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ChangedPaths {
    Listed(Vec<String>),
    Count(usize),
}

impl ChangedPaths {
    fn from_list(paths: &[String], max_listed: usize) -> Self {
        if paths.len() > max_listed {
            Self::Count(paths.len())
        } else {
            Self::Listed(paths.to_vec())
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Listed(paths) => paths.len(),
            Self::Count(count) => *count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyPayload {
    pub archive_name: String,
    pub archive_version: Option<String>,
    pub status: RunStatus,
    pub created: ChangedPaths,
    pub updated: ChangedPaths,
    pub addendum: String,
}

impl NotifyPayload {
    pub fn from_outcome(outcome: &PipelineOutcome, max_listed: usize, addendum: &str) -> Self {
        let (created, updated) = match &outcome.sync {
            Some(sync) => (
                ChangedPaths::from_list(&sync.created, max_listed),
                ChangedPaths::from_list(&sync.updated, max_listed),
            ),
            None => (ChangedPaths::Listed(Vec::new()), ChangedPaths::Listed(Vec::new())),
        };
        Self {
            archive_name: outcome.archive_name.clone(),
            archive_version: outcome.archive_version.clone(),
            status: outcome.status,
            created,
            updated,
            addendum: addendum.to_string(),
        }
    }

    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();
        let headline = match self.status {
            RunStatus::PublishedWithWarnings => "⚠️ 已同步最新文件（有警告）",
            _ => "✅ 已同步最新文件",
        };
        lines.push(headline.to_string());
        lines.push(format!("文件名: {}", self.archive_name));
        if let Some(version) = &self.archive_version {
            lines.push(format!("版本: {version}"));
        }
        lines.push(format!(
            "时间: {}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
        ));
        push_paths(&mut lines, "新增", &self.created);
        push_paths(&mut lines, "更新", &self.updated);
        if !self.addendum.trim().is_empty() {
            lines.push(String::new());
            lines.push(self.addendum.trim().to_string());
        }
        lines.join("\n")
    }
}

fn push_paths(lines: &mut Vec<String>, label: &str, paths: &ChangedPaths) {
    lines.push(format!("{label}: {}", paths.len()));
    if let ChangedPaths::Listed(list) = paths {
        for path in list {
            lines.push(format!("  {path}"));
        }
    }
}

pub trait Notifier {
    fn label(&self) -> &'static str;
    fn notify(&self, payload: &NotifyPayload) -> Result<()>;
}

pub struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn label(&self) -> &'static str {
        "stderr"
    }

    fn notify(&self, payload: &NotifyPayload) -> Result<()> {
        eprintln!("{}", payload.render_text());
        Ok(())
    }
}

pub struct WebhookNotifier {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: String,
    #[serde(flatten)]
    payload: &'a NotifyPayload,
}

impl Notifier for WebhookNotifier {
    fn label(&self) -> &'static str {
        "webhook"
    }

    fn notify(&self, payload: &NotifyPayload) -> Result<()> {
        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;
        let body = WebhookBody {
            text: payload.render_text(),
            payload,
        };
        let response = client.post(&self.url).json(&body).send()?;
        if !response.status().is_success() {
            anyhow::bail!("webhook call failed with status {}", response.status());
        }
        Ok(())
    }
}

/// `None` when notifications are switched off.
pub fn from_config(cfg: &NotifyConfig) -> Option<Box<dyn Notifier>> {
    if !cfg.enabled {
        return None;
    }
    match &cfg.webhook_url {
        Some(url) => Some(Box::new(WebhookNotifier {
            url: url.clone(),
            timeout_secs: cfg.timeout_secs,
        })),
        None => Some(Box::new(StderrNotifier)),
    }
}
