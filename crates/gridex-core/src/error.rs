//! Unified error taxonomy for the gridex crates.
//!
//! Parse failures fall into a fixed set of categories that callers can match
//! on: no parser matched the input ([`GridError::UnrecognizedFormat`]), the
//! format matched but its dialect did not ([`GridError::UnsupportedVersion`]),
//! or a mandatory section/reference was missing
//! ([`GridError::StructuralParse`]). Row-level anomalies are never raised as
//! errors; they are collected in [`crate::Diagnostics`] and the parse
//! continues.

use thiserror::Error;

/// Unified error type for model construction, parsing and merging.
#[derive(Error, Debug)]
pub enum GridError {
    /// I/O errors (file access, archive extraction)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No parser matches the extension or content signature
    #[error("unrecognized format: {0}")]
    UnrecognizedFormat(String),

    /// Format recognized but its version dialect is not supported
    #[error("unsupported {format} version: {version}")]
    UnsupportedVersion { format: String, version: String },

    /// Mandatory section or reference missing or unresolvable; the parse is
    /// aborted and any partial model discarded
    #[error("structural parse error: {0}")]
    StructuralParse(String),

    /// Synchronization inputs carry incompatible entity-kind schemas
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// Model-level integrity violation (duplicate id, dangling reference)
    #[error("validation error: {0}")]
    Validation(String),

    /// Operation cancelled cooperatively between parsing phases
    #[error("operation cancelled")]
    Cancelled,

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for Results using [`GridError`].
pub type GridResult<T> = Result<T, GridError>;

impl From<String> for GridError {
    fn from(s: String) -> Self {
        GridError::Other(s)
    }
}

impl From<&str> for GridError {
    fn from(s: &str) -> Self {
        GridError::Other(s.to_string())
    }
}
