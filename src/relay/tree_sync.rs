use crate::error::RelayError;
use filetime::FileTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

const COMPARE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDecision {
    Create,
    Update,
    Recurse,
    Skip,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncIssue {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub directories_created: usize,
    pub directories_recursed: usize,
    pub unchanged: usize,
    pub issues: Vec<SyncIssue>,
}

impl SyncResult {
    fn issue(&mut self, path: &str, err: impl std::fmt::Display) {
        self.issues.push(SyncIssue {
            path: path.to_string(),
            message: err.to_string(),
        });
    }

    /// Number of files written into the destination.
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    pub fn has_changes(&self) -> bool {
        self.writes() > 0 || self.directories_created > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    File,
    Directory,
}

fn node_kind(path: &Path) -> io::Result<Option<NodeKind>> {
    // Follows symlinks. Only source entries go through here; `decide` checks
    // the destination side without following.
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(Some(NodeKind::Directory)),
        Ok(meta) if meta.is_file() => Ok(Some(NodeKind::File)),
        Ok(_) => Ok(None),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

fn join_rel(parent: &str, name: &OsString) -> String {
    let name = name.to_string_lossy();
    if parent.is_empty() {
        name.into_owned()
    } else {
        format!("{parent}/{name}")
    }
}

fn list_children(dir: &Path) -> io::Result<BTreeMap<OsString, NodeKind>> {
    let mut out = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(kind) = node_kind(&entry.path())? {
            out.insert(entry.file_name(), kind);
        }
    }
    Ok(out)
}

/// Byte-for-byte equality of two regular files.
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    let mut left = BufReader::new(File::open(a)?);
    let mut right = BufReader::new(File::open(b)?);
    let mut lbuf = vec![0u8; COMPARE_CHUNK];
    let mut rbuf = vec![0u8; COMPARE_CHUNK];
    loop {
        let n = read_full(&mut left, &mut lbuf)?;
        let m = read_full(&mut right, &mut rbuf)?;
        if n != m || lbuf[..n] != rbuf[..m] {
            return Ok(false);
        }
        if n == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Decide what to do with `source` given what sits at `destination`.
///
/// A kind mismatch (file against directory) is an error: resolving it would
/// mean deleting from the destination. A symlink in the destination counts
/// as a mismatch whatever it points to, so nothing is written outside the
/// destination root.
pub fn decide(source: &Path, destination: &Path) -> io::Result<SyncDecision> {
    let Some(src_kind) = node_kind(source)? else {
        return Err(io::Error::other("source is neither a file nor a directory"));
    };
    let dst_kind = match fs::symlink_metadata(destination) {
        Ok(meta) if meta.file_type().is_symlink() => {
            return Err(io::Error::other(
                "destination is a symbolic link; refusing to write through it",
            ));
        }
        Ok(_) => node_kind(destination)?,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(SyncDecision::Create),
        Err(err) => return Err(err),
    };
    match (src_kind, dst_kind) {
        (NodeKind::Directory, Some(NodeKind::Directory)) => Ok(SyncDecision::Recurse),
        (NodeKind::File, Some(NodeKind::File)) => {
            if same_content(source, destination)? {
                Ok(SyncDecision::Skip)
            } else {
                Ok(SyncDecision::Update)
            }
        }
        (NodeKind::Directory, _) => Err(io::Error::other(
            "source is a directory but the destination is not",
        )),
        (NodeKind::File, _) => Err(io::Error::other(
            "source is a file but the destination is not",
        )),
    }
}

fn copy_times(source: &Path, destination: &Path) -> io::Result<()> {
    let meta = fs::metadata(source)?;
    filetime::set_file_times(
        destination,
        FileTime::from_last_access_time(&meta),
        FileTime::from_last_modification_time(&meta),
    )
}

/// Copy one file through a temporary sibling, then carry over permissions
/// and timestamps.
fn copy_file(source: &Path, destination: &Path) -> io::Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| io::Error::other("destination has no parent directory"))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".zxsync-")
        .suffix(".part")
        .tempfile_in(parent)?;
    let mut reader = File::open(source)?;
    io::copy(&mut reader, staged.as_file_mut())?;
    fs::set_permissions(staged.path(), fs::metadata(source)?.permissions())?;
    staged.persist(destination).map_err(|err| err.error)?;
    copy_times(source, destination)
}

fn sync_dir(source: &Path, destination: &Path, rel: &str, out: &mut SyncResult) {
    let children = match list_children(source) {
        Ok(children) => children,
        Err(err) => {
            out.issue(if rel.is_empty() { "." } else { rel }, err);
            return;
        }
    };

    for (name, kind) in children {
        let src = source.join(&name);
        let dst = destination.join(&name);
        let child_rel = join_rel(rel, &name);

        let decision = match decide(&src, &dst) {
            Ok(decision) => decision,
            Err(err) => {
                out.issue(&child_rel, err);
                continue;
            }
        };

        match (decision, kind) {
            (SyncDecision::Create, NodeKind::Directory) => {
                if let Err(err) = fs::create_dir(&dst) {
                    out.issue(&child_rel, err);
                    continue;
                }
                out.directories_created += 1;
                sync_dir(&src, &dst, &child_rel, out);
                if let Err(err) = copy_times(&src, &dst) {
                    out.issue(&child_rel, err);
                }
            }
            (SyncDecision::Create, NodeKind::File) => match copy_file(&src, &dst) {
                Ok(()) => out.created.push(child_rel),
                Err(err) => out.issue(&child_rel, err),
            },
            (SyncDecision::Update, _) => match copy_file(&src, &dst) {
                Ok(()) => out.updated.push(child_rel),
                Err(err) => out.issue(&child_rel, err),
            },
            (SyncDecision::Recurse, _) => {
                out.directories_recursed += 1;
                sync_dir(&src, &dst, &child_rel, out);
            }
            (SyncDecision::Skip, _) => out.unchanged += 1,
        }
    }
}

/// Publish `source_root` into `destination_root`.
///
/// Additive: nothing present only in the destination is touched. Files with
/// identical content are skipped even when their timestamps differ.
pub fn sync(source_root: &Path, destination_root: &Path) -> Result<SyncResult, RelayError> {
    let root_err = |path: &Path, source: io::Error| RelayError::SyncRoot {
        path: path.to_path_buf(),
        source,
    };
    if !source_root.is_dir() {
        return Err(root_err(
            source_root,
            io::Error::new(io::ErrorKind::NotFound, "source root is not a directory"),
        ));
    }
    fs::create_dir_all(destination_root).map_err(|err| root_err(destination_root, err))?;

    let mut out = SyncResult::default();
    sync_dir(source_root, destination_root, "", &mut out);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn write(path: &Path, body: &str, mtime: i64) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, body).expect("write");
        let stamp = FileTime::from_unix_time(mtime, 0);
        filetime::set_file_times(path, stamp, stamp).expect("set times");
    }

    fn mtime(path: &Path) -> i64 {
        FileTime::from_last_modification_time(&fs::metadata(path).expect("meta")).unix_seconds()
    }

    fn roots() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let tmp = tempdir().expect("tempdir");
        let src = tmp.path().join("scratch");
        let dst = tmp.path().join("published");
        fs::create_dir_all(&src).expect("mkdir src");
        (tmp, src, dst)
    }

    #[test]
    fn changed_and_new_files_are_published_with_source_times() {
        let (_tmp, src, dst) = roots();
        write(&dst.join("lib/a.so"), "X", 1_600_000_000);
        write(&src.join("lib/a.so"), "Y", 1_700_000_000);
        write(&src.join("lib/b.so"), "new", 1_700_000_100);

        let out = sync(&src, &dst).expect("sync");
        assert_eq!(out.updated, vec!["lib/a.so".to_string()]);
        assert_eq!(out.created, vec!["lib/b.so".to_string()]);
        assert_eq!(out.directories_recursed, 1);
        assert!(out.issues.is_empty(), "{:?}", out.issues);
        assert_eq!(fs::read_to_string(dst.join("lib/a.so")).expect("read"), "Y");
        assert_eq!(mtime(&dst.join("lib/a.so")), 1_700_000_000);
        assert_eq!(mtime(&dst.join("lib/b.so")), 1_700_000_100);
    }

    #[test]
    fn second_run_writes_nothing() {
        let (_tmp, src, dst) = roots();
        write(&src.join("a.txt"), "a", 1_700_000_000);
        write(&src.join("nested/deep/b.txt"), "b", 1_700_000_000);

        let first = sync(&src, &dst).expect("first");
        assert_eq!(first.writes(), 2);
        assert_eq!(first.directories_created, 2);

        let second = sync(&src, &dst).expect("second");
        assert_eq!(second.writes(), 0);
        assert_eq!(second.directories_created, 0);
        assert_eq!(second.unchanged, 2);
        assert!(!second.has_changes());
    }

    #[test]
    fn identical_content_with_other_timestamp_is_skipped() {
        let (_tmp, src, dst) = roots();
        write(&src.join("same.txt"), "same", 1_700_000_000);
        write(&dst.join("same.txt"), "same", 1_500_000_000);

        let out = sync(&src, &dst).expect("sync");
        assert_eq!(out.writes(), 0);
        assert_eq!(out.unchanged, 1);
        assert_eq!(mtime(&dst.join("same.txt")), 1_500_000_000);
    }

    #[test]
    fn destination_only_files_survive() {
        let (_tmp, src, dst) = roots();
        write(&dst.join("history/old.txt"), "old", 1_400_000_000);
        write(&dst.join("keep.txt"), "keep", 1_400_000_000);
        write(&src.join("history/new.txt"), "new", 1_700_000_000);

        sync(&src, &dst).expect("sync");
        assert_eq!(fs::read_to_string(dst.join("history/old.txt")).expect("old"), "old");
        assert_eq!(fs::read_to_string(dst.join("keep.txt")).expect("keep"), "keep");
        assert!(dst.join("history/new.txt").is_file());
    }

    #[test]
    fn new_directory_trees_keep_directory_times() {
        let (_tmp, src, dst) = roots();
        write(&src.join("fresh/inner/f.txt"), "f", 1_700_000_000);
        let stamp = FileTime::from_unix_time(1_650_000_000, 0);
        filetime::set_file_times(src.join("fresh"), stamp, stamp).expect("dir times");

        let out = sync(&src, &dst).expect("sync");
        assert_eq!(out.created, vec!["fresh/inner/f.txt".to_string()]);
        assert_eq!(mtime(&dst.join("fresh")), 1_650_000_000);
    }

    #[test]
    fn kind_mismatch_is_reported_and_siblings_continue() {
        let (_tmp, src, dst) = roots();
        write(&src.join("clash"), "file in source", 1_700_000_000);
        fs::create_dir_all(dst.join("clash")).expect("mkdir clash");
        write(&src.join("ok.txt"), "ok", 1_700_000_000);

        let out = sync(&src, &dst).expect("sync");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].path, "clash");
        assert_eq!(out.created, vec!["ok.txt".to_string()]);
        assert!(dst.join("clash").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_destination_directory_is_not_followed() {
        let (tmp, src, dst) = roots();
        let outside = tmp.path().join("outside");
        fs::create_dir_all(&outside).expect("mkdir outside");
        fs::create_dir_all(&dst).expect("mkdir dst");
        std::os::unix::fs::symlink(&outside, dst.join("lib")).expect("symlink");
        write(&src.join("lib/x.so"), "x", 1_700_000_000);
        write(&src.join("ok.txt"), "ok", 1_700_000_000);

        let out = sync(&src, &dst).expect("sync");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.issues[0].path, "lib");
        assert!(out.created.iter().all(|p| !p.starts_with("lib")));
        assert_eq!(out.created, vec!["ok.txt".to_string()]);
        assert!(!outside.join("x.so").exists());
        assert!(
            fs::symlink_metadata(dst.join("lib"))
                .expect("link meta")
                .file_type()
                .is_symlink()
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_destination_file_is_a_mismatch() {
        let (tmp, src, dst) = roots();
        let target = tmp.path().join("elsewhere.txt");
        fs::write(&target, "old").expect("write target");
        fs::create_dir_all(&dst).expect("mkdir dst");
        std::os::unix::fs::symlink(&target, dst.join("a.txt")).expect("symlink");
        write(&src.join("a.txt"), "new", 1_700_000_000);

        assert!(decide(&src.join("a.txt"), &dst.join("a.txt")).is_err());
        let out = sync(&src, &dst).expect("sync");
        assert_eq!(out.issues.len(), 1);
        assert_eq!(out.writes(), 0);
        assert_eq!(fs::read_to_string(&target).expect("read"), "old");
    }

    #[test]
    fn decide_covers_every_case() {
        let (_tmp, src, dst) = roots();
        write(&src.join("f"), "1", 1);
        fs::create_dir_all(src.join("d")).expect("mkdir");
        fs::create_dir_all(dst.join("d")).expect("mkdir");
        assert_eq!(decide(&src.join("f"), &dst.join("f")).expect("create"), SyncDecision::Create);
        write(&dst.join("f"), "1", 2);
        assert_eq!(decide(&src.join("f"), &dst.join("f")).expect("skip"), SyncDecision::Skip);
        write(&dst.join("f"), "2", 2);
        assert_eq!(decide(&src.join("f"), &dst.join("f")).expect("update"), SyncDecision::Update);
        assert_eq!(decide(&src.join("d"), &dst.join("d")).expect("recurse"), SyncDecision::Recurse);
    }

    #[test]
    fn missing_source_root_is_fatal() {
        let tmp = tempdir().expect("tempdir");
        let err = sync(&tmp.path().join("absent"), &tmp.path().join("dst")).unwrap_err();
        assert!(matches!(err, RelayError::SyncRoot { .. }));
    }
}
