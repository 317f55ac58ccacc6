use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

const VERSION_DIGITS: usize = 8;

/// Which file names in the inbox count as channel drops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRules {
    pub prefix: String,
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveCandidate {
    pub path: PathBuf,
    pub name: String,
    /// The `YYYYMMDD` digits following the prefix.
    pub version: String,
    pub date: NaiveDate,
    pub modified: SystemTime,
}

impl ArchiveRules {
    pub fn qualifies(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
            && name
                .to_lowercase()
                .ends_with(&self.extension.to_lowercase())
            && !name.contains('"')
    }

    pub fn version_of(&self, name: &str) -> Option<(String, NaiveDate)> {
        parse_version(name, &self.prefix)
    }
}

/// Version digits and date embedded right after `prefix`, e.g.
/// `真心20240301.zip` → `20240301`.
pub fn parse_version(name: &str, prefix: &str) -> Option<(String, NaiveDate)> {
    let start = name.find(prefix)? + prefix.len();
    let digits = name.get(start..)?.chars().take(VERSION_DIGITS).collect::<String>();
    if digits.chars().count() != VERSION_DIGITS || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::parse_from_str(&digits, "%Y%m%d").ok()?;
    Some((digits, date))
}

pub fn file_name_string(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// All qualifying archives with a parseable version, unordered.
pub fn scan(inbox: &Path, rules: &ArchiveRules) -> Result<Vec<ArchiveCandidate>> {
    if !inbox.exists() {
        return Ok(Vec::new());
    }
    let read_dir =
        fs::read_dir(inbox).with_context(|| format!("failed to read {}", inbox.display()))?;

    let mut out = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = file_name_string(&path) else {
            continue;
        };
        if !rules.qualifies(&name) {
            continue;
        }
        let Some((version, date)) = rules.version_of(&name) else {
            continue;
        };
        let modified = entry.metadata()?.modified().unwrap_or(UNIX_EPOCH);
        out.push(ArchiveCandidate {
            path,
            name,
            version,
            date,
            modified,
        });
    }
    Ok(out)
}

/// Newest qualifying archive by embedded date, then by file mtime.
pub fn newest_archive(inbox: &Path, rules: &ArchiveRules) -> Result<Option<ArchiveCandidate>> {
    let candidates = scan(inbox, rules)?;
    Ok(candidates
        .into_iter()
        .max_by(|a, b| (a.date, a.modified, &a.name).cmp(&(b.date, b.modified, &b.name))))
}
