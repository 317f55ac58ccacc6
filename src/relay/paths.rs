use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ZxPaths {
    pub home: PathBuf,
    /// Where the download collaborator drops fetched archives.
    pub inbox_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub published_dir: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl ZxPaths {
    pub fn under(home: PathBuf) -> Self {
        Self {
            inbox_dir: home.join("inbox"),
            scratch_dir: home.join("zxdown"),
            published_dir: home.join("zx_updated_files"),
            state_dir: home.join("state"),
            logs_dir: home.join("logs"),
            home,
        }
    }

    pub fn marker_file(&self) -> PathBuf {
        self.state_dir.join("last_ingested.json")
    }

    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join("zxsync.lock")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    env_path(var).unwrap_or(fallback)
}

pub fn resolve_paths() -> Result<ZxPaths> {
    let home = match env_path("ZXSYNC_HOME") {
        Some(home) => home,
        None => required_home_dir()?.join("zxsync"),
    };
    let defaults = ZxPaths::under(home);

    Ok(ZxPaths {
        inbox_dir: env_or_default_path("ZXSYNC_INBOX_DIR", defaults.inbox_dir),
        scratch_dir: env_or_default_path("ZXSYNC_SCRATCH_DIR", defaults.scratch_dir),
        published_dir: env_or_default_path("ZXSYNC_PUBLISHED_DIR", defaults.published_dir),
        state_dir: env_or_default_path("ZXSYNC_STATE_DIR", defaults.state_dir),
        logs_dir: env_or_default_path("ZXSYNC_LOGS_DIR", defaults.logs_dir),
        home: defaults.home,
    })
}
