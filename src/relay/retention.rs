use crate::relay::discover::{self, ArchiveRules};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct RetentionOutcome {
    pub kept: usize,
    pub removed: Vec<PathBuf>,
    pub failed: Vec<String>,
}

/// Keep the newest `keep` qualifying archives in `inbox` by mtime and delete
/// the rest. `protect` is never deleted. `keep == 0` disables pruning.
pub fn prune_archives(
    inbox: &Path,
    rules: &ArchiveRules,
    keep: usize,
    protect: &Path,
) -> Result<RetentionOutcome> {
    let mut out = RetentionOutcome::default();
    let mut candidates = discover::scan(inbox, rules)?;
    if keep == 0 {
        out.kept = candidates.len();
        return Ok(out);
    }

    candidates.sort_by(|a, b| (b.modified, &b.name).cmp(&(a.modified, &a.name)));
    let protected = protect.file_name();

    for (rank, candidate) in candidates.into_iter().enumerate() {
        if rank < keep || candidate.path.file_name() == protected {
            out.kept += 1;
            continue;
        }
        match fs::remove_file(&candidate.path) {
            Ok(()) => out.removed.push(candidate.path),
            Err(err) => out
                .failed
                .push(format!("{}: {err}", candidate.path.display())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::tempdir;

    fn rules() -> ArchiveRules {
        ArchiveRules {
            prefix: "真心".to_string(),
            extension: ".zip".to_string(),
        }
    }

    fn drop_archive(dir: &Path, name: &str, mtime: i64) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).expect("write");
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).expect("mtime");
        path
    }

    #[test]
    fn keeps_newest_and_the_protected_archive() {
        let tmp = tempdir().expect("tempdir");
        let oldest = drop_archive(tmp.path(), "真心20240101.zip", 1_700_000_000);
        let old = drop_archive(tmp.path(), "真心20240201.zip", 1_700_100_000);
        let mid = drop_archive(tmp.path(), "真心20240301.zip", 1_700_200_000);
        let new = drop_archive(tmp.path(), "真心20240401.zip", 1_700_300_000);
        let other = tmp.path().join("readme.txt");
        fs::write(&other, b"x").expect("write");

        let out = prune_archives(tmp.path(), &rules(), 2, &oldest).expect("prune");
        assert_eq!(out.kept, 3);
        assert_eq!(out.removed, vec![old.clone()]);
        assert!(out.failed.is_empty());
        assert!(oldest.exists());
        assert!(!old.exists());
        assert!(mid.exists());
        assert!(new.exists());
        assert!(other.exists());
    }

    #[test]
    fn zero_keep_disables_pruning() {
        let tmp = tempdir().expect("tempdir");
        let a = drop_archive(tmp.path(), "真心20240101.zip", 1_700_000_000);
        let b = drop_archive(tmp.path(), "真心20240201.zip", 1_700_100_000);
        let out = prune_archives(tmp.path(), &rules(), 0, &b).expect("prune");
        assert!(out.removed.is_empty());
        assert_eq!(out.kept, 2);
        assert!(a.exists());
    }
}
