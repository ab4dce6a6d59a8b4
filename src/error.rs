use std::fmt;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DexError {
    #[error(
        "invalid concurrency ceiling: {0} (must be between 1 and {max})",
        max = crate::dispatch::MAX_CONCURRENCY
    )]
    InvalidConcurrency(usize),

    #[error("invalid listing limit: {0} (must be at least 1)")]
    InvalidListingLimit(usize),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("snapshot not found at {0}")]
    #[diagnostic(help("run the fetch step first (`dex-catalog fetch`)"))]
    SnapshotMissing(Utf8PathBuf),

    #[error("catalog database not found at {0}")]
    #[diagnostic(help("run the load step first (`dex-catalog load`)"))]
    DatabaseMissing(Utf8PathBuf),

    #[error("snapshot at {0} contains no entity records")]
    SnapshotEmpty(Utf8PathBuf),

    #[error("snapshot at {path} mixes stat layouts: record {id} differs from the first record")]
    #[diagnostic(help("re-run the fetch step to rebuild the snapshot"))]
    SnapshotInconsistent { path: Utf8PathBuf, id: u32 },

    #[error("failed to read snapshot: {0}")]
    SnapshotRead(String),

    #[error("failed to parse snapshot: {0}")]
    SnapshotParse(String),

    #[error("failed to write snapshot: {0}")]
    SnapshotWrite(String),

    #[error("HTTP client setup failed: {0}")]
    Http(String),

    #[error("listing request failed: {0}")]
    ListingHttp(String),

    #[error("listing returned status {status}: {message}")]
    ListingStatus { status: u16, message: String },

    #[error("listing payload is malformed: {0}")]
    ListingMalformed(String),

    #[error("entry '{0}' not found")]
    NotFound(String),

    #[error("lookup of '{input}' failed: {reason}")]
    Lookup { input: String, reason: FailureReason },

    #[error("catalog store error: {0}")]
    Store(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read confirmation: {0}")]
    Prompt(String),
}

impl DexError {
    /// Errors that stem from how the run was set up rather than from the remote side.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DexError::InvalidConcurrency(_)
                | DexError::InvalidListingLimit(_)
                | DexError::ConfigRead(_)
                | DexError::ConfigParse(_)
                | DexError::SnapshotMissing(_)
                | DexError::DatabaseMissing(_)
                | DexError::SnapshotEmpty(_)
        )
    }

    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DexError::ListingHttp(_)
                | DexError::ListingStatus { .. }
                | DexError::ListingMalformed(_)
                | DexError::Lookup { .. }
        )
    }
}

/// Why a single item could not be fetched. Carried as data, never raised past the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "category", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    NotFound,
    RemoteError(u16),
    NetworkError(String),
    MalformedData(String),
}

impl FailureReason {
    pub fn category(&self) -> &'static str {
        match self {
            FailureReason::NotFound => "not_found",
            FailureReason::RemoteError(_) => "remote_error",
            FailureReason::NetworkError(_) => "network_error",
            FailureReason::MalformedData(_) => "malformed_data",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotFound => write!(f, "not found"),
            FailureReason::RemoteError(status) => write!(f, "remote returned status {status}"),
            FailureReason::NetworkError(detail) => write!(f, "network error: {detail}"),
            FailureReason::MalformedData(detail) => write!(f, "malformed data: {detail}"),
        }
    }
}
