use crate::relay::discover::ArchiveRules;
use crate::relay::extract::TimestampZone;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub prefix: String,
    pub extension: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            prefix: "真心".to_string(),
            extension: ".zip".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// `local` or an IANA zone name used to read archive timestamps.
    pub timezone: String,
    pub clean_scratch: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            timezone: "local".to_string(),
            clean_scratch: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub poll_interval_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub keep_archives: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { keep_archives: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub max_listed_paths: usize,
    pub addendum: String,
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            max_listed_paths: 20,
            addendum: String::new(),
            timeout_secs: 20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    pub archive: ArchiveConfig,
    pub extract: ExtractConfig,
    pub watcher: WatcherConfig,
    pub retention: RetentionConfig,
    pub notify: NotifyConfig,
}

impl RelayConfig {
    pub fn rules(&self) -> ArchiveRules {
        ArchiveRules {
            prefix: self.archive.prefix.clone(),
            extension: self.archive.extension.clone(),
        }
    }

    pub fn zone(&self) -> Result<TimestampZone> {
        TimestampZone::parse(&self.extract.timezone).map_err(|err| anyhow!(err))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialRelayConfig {
    archive: Option<ArchiveConfig>,
    extract: Option<ExtractConfig>,
    watcher: Option<WatcherConfig>,
    retention: Option<RetentionConfig>,
    notify: Option<NotifyConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_optional_string(var: &str, fallback: Option<String>) -> Option<String> {
    match env::var(var) {
        Ok(v) if v.trim().is_empty() => None,
        Ok(v) => Some(v.trim().to_string()),
        Err(_) => fallback,
    }
}

fn validate(cfg: &RelayConfig) -> Result<()> {
    if cfg.archive.prefix.trim().is_empty() {
        return Err(anyhow!("invalid archive prefix: cannot be empty"));
    }
    if !cfg.archive.extension.starts_with('.') || cfg.archive.extension.len() < 2 {
        return Err(anyhow!(
            "invalid archive extension `{}`: must look like `.zip`",
            cfg.archive.extension
        ));
    }
    cfg.zone()?;
    if cfg.watcher.poll_interval_secs == 0 {
        return Err(anyhow!(
            "invalid watcher poll interval: must be >= 1 second"
        ));
    }
    if cfg.notify.timeout_secs == 0 {
        return Err(anyhow!("invalid notify timeout: must be >= 1 second"));
    }
    if let Some(url) = &cfg.notify.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!("invalid notify webhook url: use http:// or https://"));
        }
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("ZXSYNC_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".config").join("zxsync").join("zxsync.toml"))
}

fn merge_file_config(base: &mut RelayConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: PartialRelayConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse zxsync config {}: {err}", path.display()))?;
    if let Some(archive) = parsed.archive {
        base.archive = archive;
    }
    if let Some(extract) = parsed.extract {
        base.extract = extract;
    }
    if let Some(watcher) = parsed.watcher {
        base.watcher = watcher;
    }
    if let Some(retention) = parsed.retention {
        base.retention = retention;
    }
    if let Some(notify) = parsed.notify {
        base.notify = notify;
    }
    Ok(())
}

fn apply_env_overrides(cfg: &mut RelayConfig) {
    cfg.archive.prefix = env_or_string("ZXSYNC_ARCHIVE_PREFIX", &cfg.archive.prefix);
    cfg.archive.extension = env_or_string("ZXSYNC_ARCHIVE_EXTENSION", &cfg.archive.extension);
    cfg.extract.timezone = env_or_string("ZXSYNC_TIMEZONE", &cfg.extract.timezone);
    cfg.extract.clean_scratch = env_or_bool("ZXSYNC_CLEAN_SCRATCH", cfg.extract.clean_scratch);
    cfg.watcher.poll_interval_secs =
        env_or_u64("ZXSYNC_POLL_INTERVAL_SECS", cfg.watcher.poll_interval_secs);
    cfg.retention.keep_archives =
        env_or_usize("ZXSYNC_KEEP_ARCHIVES", cfg.retention.keep_archives);
    cfg.notify.enabled = env_or_bool("ZXSYNC_NOTIFY_ENABLED", cfg.notify.enabled);
    cfg.notify.webhook_url =
        env_optional_string("ZXSYNC_NOTIFY_WEBHOOK_URL", cfg.notify.webhook_url.take());
    cfg.notify.max_listed_paths =
        env_or_usize("ZXSYNC_NOTIFY_MAX_PATHS", cfg.notify.max_listed_paths);
    cfg.notify.addendum = env_or_string("ZXSYNC_NOTIFY_ADDENDUM", &cfg.notify.addendum);
    cfg.notify.timeout_secs = env_or_u64("ZXSYNC_NOTIFY_TIMEOUT_SECS", cfg.notify.timeout_secs);
}

pub fn load_config() -> Result<RelayConfig> {
    let mut cfg = RelayConfig::default();
    if let Some(path) = resolve_config_path() {
        merge_file_config(&mut cfg, &path)?;
    }
    apply_env_overrides(&mut cfg);
    validate(&cfg)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let cfg = RelayConfig::default();
        validate(&cfg).expect("defaults validate");
        assert_eq!(cfg.archive.prefix, "真心");
        assert_eq!(cfg.retention.keep_archives, 3);
        assert_eq!(cfg.zone().expect("zone"), TimestampZone::Local);
    }

    #[test]
    fn partial_file_replaces_only_named_sections() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("zxsync.toml");
        fs::write(
            &path,
            "[extract]\ntimezone = \"Asia/Shanghai\"\n\n[retention]\nkeep_archives = 5\n",
        )
        .expect("write config");

        let mut cfg = RelayConfig::default();
        merge_file_config(&mut cfg, &path).expect("merge");
        assert_eq!(cfg.extract.timezone, "Asia/Shanghai");
        assert!(cfg.extract.clean_scratch);
        assert_eq!(cfg.retention.keep_archives, 5);
        assert_eq!(cfg.archive.extension, ".zip");
        validate(&cfg).expect("valid");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("zxsync.toml");
        fs::write(&path, "[watcher\npoll_interval_secs = 1").expect("write config");
        let mut cfg = RelayConfig::default();
        assert!(merge_file_config(&mut cfg, &path).is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = RelayConfig::default();
        cfg.extract.timezone = "Nowhere/Special".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = RelayConfig::default();
        cfg.archive.extension = "zip".to_string();
        assert!(validate(&cfg).is_err());

        let mut cfg = RelayConfig::default();
        cfg.watcher.poll_interval_secs = 0;
        assert!(validate(&cfg).is_err());

        let mut cfg = RelayConfig::default();
        cfg.notify.webhook_url = Some("ftp://example.invalid".to_string());
        assert!(validate(&cfg).is_err());
    }
}
