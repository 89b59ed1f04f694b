use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the cleanup-monitor library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Filesystem event source error
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// External processor could not be started
    #[error("Failed to launch '{command}': {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    /// External processor ran past its deadline and was killed
    #[error("'{command}' timed out after {} seconds", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    /// Output directory could not be inspected
    #[error("Failed to inspect {}: {source}", path.display())]
    Inspection {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}
