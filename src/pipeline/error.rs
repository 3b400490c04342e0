//! Run-level errors. Per-chapter failures never surface here; they are collected in
//! [FailedFiles](super::FailedFiles).

use crate::source::SourceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Could not create working directory: {source}")]
    WorkDir {
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read extracted chapters in {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Failed to write merged document {path}: {source}")]
    Merge {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy merged document to {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
