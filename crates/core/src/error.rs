//! Error types for templated slide generation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Which input a missing path belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// The presentation template.
    Template,
    /// The tabular dataset.
    Dataset,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template => f.write_str("Template"),
            Self::Dataset => f.write_str("Dataset"),
        }
    }
}

/// Errors that can occur while generating a deck.
#[derive(Error, Debug)]
pub enum Error {
    /// The template or dataset path does not exist.
    #[error("{kind} file does not exist: {}", path.display())]
    ResourceNotFound { kind: ResourceKind, path: PathBuf },

    /// The dataset exists but no supported reader could parse it.
    #[error("Failed to read dataset {}: {reason}", path.display())]
    DataSource { path: PathBuf, reason: String },

    /// Records per page must be at least 1.
    #[error("Invalid layout: records per page must be at least 1 (got {0})")]
    InvalidLayout(usize),

    /// A single shape could not be cloned or have its text substituted.
    #[error("Failed to process shape '{shape}': {reason}")]
    ShapeProcessing { shape: String, reason: String },

    /// Writing the output document failed.
    #[error("Failed to write output {}: {reason}", path.display())]
    Serialization { path: PathBuf, reason: String },

    /// Generation settings are missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The template could not be interpreted as a presentation.
    #[error("Template error: {0}")]
    Template(String),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(String),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    Xml(String),

    /// Failed to open or read a file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error aborts a generation run.
    ///
    /// Only per-shape failures are tolerated; they are skipped and logged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ShapeProcessing { .. })
    }
}
