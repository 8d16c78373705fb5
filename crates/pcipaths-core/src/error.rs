//! Error types for pcipaths-core
//!
//! Only batch-level failures are errors. A single device that cannot be
//! resolved is reported through sentinel fields instead.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading a snapshot or a display configuration
#[derive(Debug, Error)]
pub enum PciPathError {
    /// Failed to read a dump or configuration file
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The device source produced no usable records
    #[error("Device dump contains no PCI devices")]
    EmptySnapshot,

    /// The dump is neither an ioreg tree nor an InstanceId table
    #[error("Unrecognized device dump format (expected ioreg tree or InstanceId table)")]
    UnrecognizedDump,

    /// The device source itself failed
    #[error("Device source failed: {0}")]
    SourceFailed(String),

    /// Display configuration file could not be parsed
    #[error("Invalid display configuration: {0}")]
    ConfigParse(String),

    /// Unknown column name
    #[error("Unknown column '{0}'")]
    InvalidColumn(String),

    /// Malformed `column=value` predicate
    #[error("Invalid match '{0}', expected column=value")]
    InvalidPredicate(String),
}

/// Result type for pcipaths-core operations
pub type Result<T> = std::result::Result<T, PciPathError>;
