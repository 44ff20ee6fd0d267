//! Per-file conversion errors
//!
//! Every failure inside one file's pipeline ends up as a [`ConvertError`]
//! and is turned into a result record; none of them aborts a batch.

use std::path::PathBuf;

use thiserror::Error;

use crate::aaf::AssemblyError;
use crate::graph::GraphError;
use crate::wav::WavError;

/// Reporting category of a per-file problem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input file could not be opened or resolved
    OpenFailure,
    /// Input is not a readable PCM container
    MalformedInput,
    /// Some metadata was abandoned; the file still converted
    PartialMetadata,
    /// Format fields could not be represented in the container
    AssemblyFailure,
    /// The container could not be written
    WriteFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::OpenFailure => "open_failure",
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::PartialMetadata => "partial_metadata",
            ErrorKind::AssemblyFailure => "assembly_failure",
            ErrorKind::WriteFailure => "write_failure",
        }
    }
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] WavError),

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Assembly failed: {0}")]
    AssemblyFailure(String),

    #[error("Write failed: {0}")]
    WriteFailure(#[source] GraphError),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Open { .. } => ErrorKind::OpenFailure,
            ConvertError::MalformedInput(_) => ErrorKind::MalformedInput,
            ConvertError::AssemblyFailure(_) => ErrorKind::AssemblyFailure,
            ConvertError::WriteFailure(_) => ErrorKind::WriteFailure,
        }
    }
}

impl From<AssemblyError> for ConvertError {
    fn from(e: AssemblyError) -> Self {
        match e {
            AssemblyError::Graph(graph) => ConvertError::WriteFailure(graph),
            other => ConvertError::AssemblyFailure(other.to_string()),
        }
    }
}

impl From<GraphError> for ConvertError {
    fn from(e: GraphError) -> Self {
        ConvertError::WriteFailure(e)
    }
}
