use crate::error::RelayError;
use crate::relay::decode::{self, DecodedName};
use crate::relay::warn;
use chrono::{NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use filetime::FileTime;
use serde::Serialize;
use std::fs;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// How archive timestamps (stored without a zone) are mapped to instants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimestampZone {
    #[default]
    Local,
    Named(Tz),
}

impl TimestampZone {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        trimmed
            .parse::<Tz>()
            .map(Self::Named)
            .map_err(|err| format!("unknown timezone `{trimmed}`: {err}"))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Local => "local".to_string(),
            Self::Named(tz) => tz.name().to_string(),
        }
    }

    /// Unix seconds for a wall-clock time, taking the earlier instant when
    /// the time is ambiguous. `None` when it falls in a DST gap.
    pub fn unix_seconds(&self, naive: &NaiveDateTime) -> Option<i64> {
        match self {
            Self::Local => chrono::Local
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.timestamp()),
            Self::Named(tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.timestamp()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntryTimestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl EntryTimestamp {
    pub fn to_naive(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())?.and_hms_opt(
            self.hour.into(),
            self.minute.into(),
            self.second.into(),
        )
    }

    pub fn resolve(&self, zone: &TimestampZone) -> Option<FileTime> {
        let naive = self.to_naive()?;
        let secs = zone.unix_seconds(&naive)?;
        Some(FileTime::from_unix_time(secs, 0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Directory,
}

/// Read-only metadata for one archive member.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub index: usize,
    pub raw_name: Vec<u8>,
    pub presented_name: String,
    pub explicit_utf8: bool,
    pub size: u64,
    pub modified: Option<EntryTimestamp>,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    fn new(
        index: usize,
        raw_name: &[u8],
        presented_name: &str,
        last_modified: Option<zip::DateTime>,
        is_dir: bool,
        size: u64,
    ) -> Self {
        // The reader only renders a name as UTF-8 when the entry's UTF-8 flag
        // is set; a legacy rendering (CP437) of non-ASCII bytes never equals
        // the raw bytes.
        let explicit_utf8 = presented_name.as_bytes() == raw_name;
        let modified = last_modified.map(|dt| EntryTimestamp {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: dt.second(),
        });
        let kind = if is_dir {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        Self {
            index,
            raw_name: raw_name.to_vec(),
            presented_name: presented_name.to_string(),
            explicit_utf8,
            size,
            modified,
            kind,
        }
    }

    fn label(&self) -> String {
        if self.presented_name.is_empty() {
            format!("#{}", self.index)
        } else {
            self.presented_name.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryIssueKind {
    Read,
    Decode,
    Write,
    Timestamp,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryIssue {
    pub entry: String,
    pub kind: EntryIssueKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenamedEntry {
    pub from: String,
    pub to: String,
    pub strategy: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    pub entries_total: usize,
    pub files_extracted: usize,
    pub directories_created: usize,
    pub bytes_written: u64,
    pub renamed: Vec<RenamedEntry>,
    pub timestamp_failures: usize,
    pub issues: Vec<EntryIssue>,
}

impl ExtractionResult {
    fn issue(&mut self, entry: String, kind: EntryIssueKind, message: impl Into<String>) {
        if kind == EntryIssueKind::Timestamp {
            self.timestamp_failures += 1;
        }
        self.issues.push(EntryIssue {
            entry,
            kind,
            message: message.into(),
        });
    }

    pub fn has_warnings(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn issues_of(&self, kind: EntryIssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub zone: TimestampZone,
}

/// Stream one entry into place through a temporary sibling so a partially
/// written file never carries the final name.
fn write_entry(reader: &mut impl Read, target: &Path) -> io::Result<u64> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::other("entry target has no parent directory"))?;
    fs::create_dir_all(parent)?;
    if target.is_dir() {
        return Err(io::Error::other("a directory already occupies the target path"));
    }
    let mut staged = tempfile::Builder::new()
        .prefix(".zxsync-")
        .suffix(".part")
        .tempfile_in(parent)?;
    let written = io::copy(reader, staged.as_file_mut())?;
    staged.persist(target).map_err(|err| err.error)?;
    Ok(written)
}

fn restore_times(target: &Path, stamp: FileTime) -> io::Result<()> {
    filetime::set_file_times(target, stamp, stamp)
}

fn abort_on_traversal(archive_path: &Path, entry: &ArchiveEntry, err: &RelayError) {
    warn::emit(
        err.code().as_str(),
        "extract",
        "abort",
        &archive_path.display().to_string(),
        &entry.label(),
        "path-traversal",
        &err.to_string(),
    );
}

/// Extract every entry of `archive_path` under `destination_root`.
///
/// Per-entry failures land in the result. A traversal attempt aborts the
/// whole extraction; entries already written stay on disk.
pub fn extract(
    archive_path: &Path,
    destination_root: &Path,
    opts: &ExtractOptions,
) -> Result<ExtractionResult, RelayError> {
    let open_err = |source: zip::result::ZipError| RelayError::ArchiveOpen {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = fs::File::open(archive_path).map_err(|err| open_err(err.into()))?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(open_err)?;

    fs::create_dir_all(destination_root).map_err(|source| RelayError::Destination {
        path: destination_root.to_path_buf(),
        source,
    })?;

    let mut out = ExtractionResult {
        entries_total: archive.len(),
        ..ExtractionResult::default()
    };
    let mut directory_times: Vec<(PathBuf, String, Option<EntryTimestamp>)> = Vec::new();

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(err) => {
                out.issue(format!("#{index}"), EntryIssueKind::Read, err.to_string());
                continue;
            }
        };
        let entry = ArchiveEntry::new(
            index,
            file.name_raw(),
            file.name(),
            file.last_modified(),
            file.is_dir(),
            file.size(),
        );

        let decoded: DecodedName =
            match decode::decode(&entry.raw_name, &entry.presented_name, entry.explicit_utf8) {
                Ok(decoded) => decoded,
                Err(err) if err.is_fatal() => {
                    abort_on_traversal(archive_path, &entry, &err);
                    return Err(err);
                }
                Err(err) => {
                    out.issue(entry.label(), EntryIssueKind::Decode, err.to_string());
                    continue;
                }
            };
        if decoded.strategy.is_exhausted() {
            out.issue(
                entry.label(),
                EntryIssueKind::Decode,
                format!(
                    "no encoding matched; extracted as `{}` ({})",
                    decoded.display,
                    decoded.strategy.label()
                ),
            );
        }

        let target = destination_root.join(&decoded.relative);

        if entry.kind == EntryKind::Directory {
            match fs::create_dir_all(&target) {
                Ok(()) => {
                    out.directories_created += 1;
                    directory_times.push((target, decoded.display.clone(), entry.modified));
                }
                Err(err) => out.issue(entry.label(), EntryIssueKind::Write, err.to_string()),
            }
            continue;
        }

        match write_entry(&mut file, &target) {
            Ok(written) => {
                out.files_extracted += 1;
                out.bytes_written += written;
                if written != entry.size {
                    out.issue(
                        entry.label(),
                        EntryIssueKind::Read,
                        format!("expected {} bytes, wrote {written}", entry.size),
                    );
                }
            }
            Err(err) => {
                out.issue(entry.label(), EntryIssueKind::Write, err.to_string());
                continue;
            }
        }

        if decoded.display != entry.presented_name {
            out.renamed.push(RenamedEntry {
                from: entry.presented_name.clone(),
                to: decoded.display.clone(),
                strategy: decoded.strategy.label(),
            });
        }

        match entry.modified.and_then(|stamp| stamp.resolve(&opts.zone)) {
            Some(stamp) => {
                if let Err(err) = restore_times(&target, stamp) {
                    out.issue(entry.label(), EntryIssueKind::Timestamp, err.to_string());
                }
            }
            None => out.issue(
                entry.label(),
                EntryIssueKind::Timestamp,
                "entry carries no valid date",
            ),
        }
    }

    // Writing files touches their parents' mtimes, so directories go last.
    for (dir, label, modified) in directory_times {
        match modified.and_then(|stamp| stamp.resolve(&opts.zone)) {
            Some(stamp) => {
                if let Err(err) = restore_times(&dir, stamp) {
                    out.issue(label, EntryIssueKind::Timestamp, err.to_string());
                }
            }
            None => out.issue(label, EntryIssueKind::Timestamp, "entry carries no valid date"),
        }
    }

    Ok(out)
}
