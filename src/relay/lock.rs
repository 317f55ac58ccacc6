use crate::error::ZxErrorCode;
use crate::relay::util::now_epoch_secs;
use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockPayload {
    pub pid: u32,
    pub build_uuid: String,
    pub started_at_epoch_secs: u64,
}

/// Held for the duration of one ingest. The OS lock drops with the file.
#[derive(Debug)]
pub struct IngestLock {
    file: File,
}

impl Drop for IngestLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        let _ = FileExt::unlock(&self.file);
    }
}

pub fn acquire(path: &Path) -> Result<IngestLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        let holder = read_holder(path)
            .ok()
            .flatten()
            .map(|p| format!(" (pid={})", p.pid))
            .unwrap_or_default();
        return Err(anyhow!(
            "{}: another zxsync ingest holds {}{holder}",
            ZxErrorCode::E001Locked.as_str(),
            path.display()
        ));
    }

    let payload = LockPayload {
        pid: std::process::id(),
        build_uuid: env!("BUILD_UUID").to_string(),
        started_at_epoch_secs: now_epoch_secs()?,
    };
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    let data = serde_json::to_string(&payload)?;
    file.write_all(format!("{data}\n").as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()?;

    Ok(IngestLock { file })
}

/// Payload of the current holder, if the lock file has one.
pub fn read_holder(path: &Path) -> Result<Option<LockPayload>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let parsed = serde_json::from_str(raw.trim())
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_is_refused_until_release() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("state").join("zxsync.lock");

        let guard = acquire(&path).expect("first lock");
        let holder = read_holder(&path).expect("read").expect("payload");
        assert_eq!(holder.pid, std::process::id());

        let err = acquire(&path).expect_err("second lock");
        assert!(err.to_string().contains("E001_LOCKED"));

        drop(guard);
        assert!(read_holder(&path).expect("read").is_none());
        let _again = acquire(&path).expect("relock");
    }
}
