use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Hard failures of the ingestion core.
///
/// Only `ArchiveOpen`, `PathTraversal`, `Destination` and `SyncRoot` stop a
/// run. `EntryDecode` is returned by the decoder for a single entry and is
/// recorded by the extractor rather than propagated.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to open archive {path}: {source}")]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("path traversal in archive entry '{entry}': {reason}")]
    PathTraversal { entry: String, reason: String },
    #[error("cannot decode archive entry name '{entry}': {reason}")]
    EntryDecode { entry: String, reason: String },
    #[error("extraction destination {path} is unusable: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("sync root {path} is unusable: {source}")]
    SyncRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RelayError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::EntryDecode { .. })
    }

    pub fn code(&self) -> ZxErrorCode {
        match self {
            Self::ArchiveOpen { .. } => ZxErrorCode::E003ArchiveOpen,
            Self::PathTraversal { .. } => ZxErrorCode::E002Traversal,
            Self::EntryDecode { .. } => ZxErrorCode::E004EntryDecode,
            Self::Destination { .. } | Self::SyncRoot { .. } => ZxErrorCode::E005RootUnusable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZxErrorCode {
    E001Locked,
    E002Traversal,
    E003ArchiveOpen,
    E004EntryDecode,
    E005RootUnusable,
    E006SyncDegraded,
    E007StateCorrupt,
    E008NotifyFailed,
}

impl ZxErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::E001Locked => "E001_LOCKED",
            Self::E002Traversal => "E002_TRAVERSAL",
            Self::E003ArchiveOpen => "E003_ARCHIVE_OPEN",
            Self::E004EntryDecode => "E004_ENTRY_DECODE",
            Self::E005RootUnusable => "E005_ROOT_UNUSABLE",
            Self::E006SyncDegraded => "E006_SYNC_DEGRADED",
            Self::E007StateCorrupt => "E007_STATE_CORRUPT",
            Self::E008NotifyFailed => "E008_NOTIFY_FAILED",
        }
    }
}
