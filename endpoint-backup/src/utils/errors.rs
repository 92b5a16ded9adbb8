//! Custom error types for the backup subsystem.
//!
//! Two shapes of failure exist side by side: a single [`BackupError`] that
//! short-circuits an operation, and an [`ErrorList`] that accumulates every
//! non-fatal failure of a multi-step operation (collection, upload, listing,
//! pruning) so that partial progress can still be reported.

use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("backup already running")]
    AlreadyRunning,

    #[error("backup manager already started")]
    AlreadyStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<BackupError>,
    },

    #[error("path traversal detected: {key:?} resolves outside base {base:?}")]
    PathTraversal { key: String, base: String },

    #[error("decompressed size of {path} exceeds limit of {limit} bytes")]
    DecompressionLimit { path: String, limit: u64 },

    #[error("failed to upload {path}: {source}")]
    Upload {
        path: String,
        #[source]
        source: Box<BackupError>,
    },

    #[error("failed to download {key}: {source}")]
    Download {
        key: String,
        #[source]
        source: Box<BackupError>,
    },

    #[error("failed to delete {key}: {source}")]
    Delete {
        key: String,
        #[source]
        source: Box<BackupError>,
    },

    #[error("snapshot manifest error: {0}")]
    Manifest(String),

    #[error("no files changed since last snapshot")]
    NothingToBackup,

    #[error("{0} not implemented")]
    NotImplemented(String),

    #[error("{0}")]
    Multiple(ErrorList),
}

impl BackupError {
    /// Wrap this error with a human-readable description of what was being attempted.
    pub fn context(self, context: impl Into<String>) -> Self {
        BackupError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

/// Extension for attaching context to fallible calls, e.g. `fs::create_dir_all(p).context(..)?`.
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<BackupError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(context))
    }
}

/// Accumulator for failures that must not abort the surrounding operation.
///
/// Every cause is kept in insertion order. Rendering joins them one per line.
#[derive(Debug, Default)]
pub struct ErrorList(Vec<BackupError>);

impl ErrorList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: BackupError) {
        self.0.push(err);
    }

    /// Merge another error into this list. Nested lists are flattened.
    pub fn absorb(&mut self, err: BackupError) {
        match err {
            BackupError::Multiple(list) => self.0.extend(list.0),
            other => self.0.push(other),
        }
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BackupError> {
        self.0.iter()
    }

    /// `None` when nothing was recorded. A single cause is returned as itself.
    pub fn into_error(mut self) -> Option<BackupError> {
        match self.0.len() {
            0 => None,
            1 => self.0.pop(),
            _ => Some(BackupError::Multiple(self)),
        }
    }

    pub fn into_result(self) -> Result<()> {
        match self.into_error() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, err) in self.0.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorList {}

impl From<BackupError> for ErrorList {
    fn from(err: BackupError) -> Self {
        let mut list = ErrorList::new();
        list.absorb(err);
        list
    }
}

impl FromIterator<BackupError> for ErrorList {
    fn from_iter<I: IntoIterator<Item = BackupError>>(iter: I) -> Self {
        let mut list = ErrorList::new();
        for err in iter {
            list.absorb(err);
        }
        list
    }
}

/// Join optional errors, dropping the `None`s.
pub fn join_errors<I>(errors: I) -> Option<BackupError>
where
    I: IntoIterator<Item = Option<BackupError>>,
{
    errors.into_iter().flatten().collect::<ErrorList>().into_error()
}

pub type Result<T> = std::result::Result<T, BackupError>;
