//! Fatal build errors.
//!
//! Everything that can degrade gracefully is a [`crate::validate::Diagnostic`]
//! instead; a `BoxError` aborts the build.

use std::path::PathBuf;
use thiserror::Error;

pub type BoxResult<T> = Result<T, BoxError>;

#[derive(Error, Debug)]
pub enum BoxError {
    /// The entry component does not exist
    #[error("entry component not found: {path}")]
    EntryNotFound { path: PathBuf },

    /// The source directory does not exist
    #[error("source directory not found: {path}")]
    SourceDirNotFound { path: PathBuf },

    /// Walking the source tree failed
    #[error("failed to scan {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Reading an endpoint file failed
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisting artifacts failed
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output directory has no parent to stage a temporary directory in
    #[error("invalid output directory: {path}")]
    InvalidOutputDir { path: PathBuf },

    /// File watcher setup failed
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}
