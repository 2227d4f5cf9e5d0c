//! Error taxonomy for the whole pipeline.
//!
//! The split mirrors how failures propagate: file-access and alignment
//! errors are fatal and abort the run; row-level parse errors never escape
//! the ingestion engine (they become capped warnings); numerical errors in
//! the refinement loop degrade to "keep the last good state". Expected QP
//! outcomes (infeasible, numerical failure) are *values*, not errors — see
//! [`crate::qp::SolverStatus`].

use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems opening or mapping an input file. Raised before any
/// worker thread is spawned.
#[derive(Error, Debug)]
pub enum FileAccessError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{path}' is not a regular file")]
    NotRegularFile { path: PathBuf },
    #[error("'{path}' is empty")]
    Empty { path: PathBuf },
    #[error("failed to memory-map '{path}': {source}")]
    Mmap {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single malformed row. Recoverable: the ingestion engine skips the row
/// and records a warning.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowParseError {
    #[error("too few fields (expected >= {expected}, found {found})")]
    TooFewFields { expected: usize, found: usize },
    #[error("could not parse chromosome label '{0}'")]
    BadChromosome(String),
    #[error("could not parse number '{0}'")]
    BadNumber(String),
    #[error("name field must start with 'm' or 'h', found '{0}'")]
    BadMark(char),
    #[error("row predicate failed: {0}")]
    Predicate(String),
}

/// Zero overlap between datasets that must share positions. A configuration
/// error, fatal to the run.
#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("no overlapping CpG sites found between {left} and {right}")]
    NoOverlap {
        left: &'static str,
        right: &'static str,
    },
}

/// Mismatched dimensions reaching the numeric core. This is a pipeline
/// invariant violation, not a user-data problem.
#[derive(Error, Debug)]
#[error("dimension mismatch in {what}: expected {expected}, found {found}")]
pub struct DimensionError {
    pub what: &'static str,
    pub expected: usize,
    pub found: usize,
}

/// Numerical breakdown inside the iterative refinement. Recoverable at the
/// loop boundary: iteration stops, the last good state is kept.
#[derive(Error, Debug)]
pub enum NumericalError {
    #[error(
        "pseudo-inverse is unstable: squared norm {squared_norm:.3e} is below the stability floor"
    )]
    UnstablePseudoInverse { squared_norm: f64 },
}

/// Problems writing the proportions report.
#[derive(Error, Debug)]
pub enum FileWriteError {
    #[error("cannot write to '{path}': {reason}")]
    Rejected { path: PathBuf, reason: String },
    #[error("failed to write '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Umbrella error for the top of the pipeline. Only conditions that abort
/// the run are converted into this type.
#[derive(Error, Debug)]
pub enum DeconvError {
    #[error(transparent)]
    FileAccess(#[from] FileAccessError),
    #[error(transparent)]
    Alignment(#[from] AlignmentError),
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error(transparent)]
    FileWrite(#[from] FileWriteError),
    #[error("{0}")]
    Config(String),
}
