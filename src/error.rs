use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for the srcshrink library.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// IO error with context about the file path.
    #[error("IO error accessing '{path}': {message}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Configuration validation error.
    #[error("Invalid configuration: {message}")]
    Config {
        /// Detailed error message
        message: String,
    },

    /// The scan root or manifest could not be used to discover candidates.
    #[error("Discovery failed for '{path}': {message}")]
    Discovery {
        /// Scan root or manifest path
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Invalid UTF-8 encountered in file.
    #[error("Invalid UTF-8 encoding in file '{path}'. File may be binary or use unsupported encoding.")]
    InvalidUtf8 {
        /// Path to file with encoding issues
        path: PathBuf,
    },

    /// JSON serialization error.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
    },
}

/// Failure modes of a single safe replacement.
///
/// Only [`ReplaceError::MoveFailed`] with `data_loss` set leaves the original
/// path without either the old or the new content.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ReplaceError {
    /// The scratch file could not be created.
    #[error("could not create temporary file: {message}")]
    TempFile {
        /// Error message
        message: String,
    },

    /// Writing or flushing the scratch file failed.
    #[error("could not write temporary file: {message}")]
    Write {
        /// Error message
        message: String,
    },

    /// The transformed output was empty; the original was left untouched.
    #[error("transformed output is empty")]
    EmptyOutput,

    /// The original could not be deleted (locked or insufficient permissions).
    #[error("original file could not be deleted: {message}")]
    DeleteFailed {
        /// Error message
        message: String,
    },

    /// Moving the scratch file onto the original path failed.
    #[error(
        "{}moving temporary file into place failed: {message}{}",
        data_loss_prefix(*.data_loss),
        kept_suffix(.kept.as_deref())
    )]
    MoveFailed {
        /// Error message
        message: String,
        /// True when the original had already been deleted
        data_loss: bool,
        /// Where the new content was left for manual recovery
        kept: Option<PathBuf>,
    },
}

const fn data_loss_prefix(data_loss: bool) -> &'static str {
    if data_loss { "DATA LOSS: " } else { "" }
}

fn kept_suffix(kept: Option<&Path>) -> String {
    kept.map(|path| format!(" (new content kept at '{}')", path.display()))
        .unwrap_or_default()
}

impl ReplaceError {
    /// Returns true if the original content is gone and was not replaced.
    #[must_use]
    pub const fn is_data_loss(&self) -> bool {
        matches!(self, Self::MoveFailed { data_loss: true, .. })
    }
}

impl Error {
    /// Creates an IO error with path context.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: source.to_string(),
        }
    }

    /// Creates an IO error for a read, mapping invalid data to [`Error::InvalidUtf8`].
    #[must_use]
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::InvalidData {
            Self::invalid_utf8(path)
        } else {
            Self::io(path, source)
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a discovery error.
    #[must_use]
    pub fn discovery(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid UTF-8 error.
    #[must_use]
    pub fn invalid_utf8(path: impl Into<PathBuf>) -> Self {
        Self::InvalidUtf8 { path: path.into() }
    }

    /// Returns true if this is an IO error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Returns true if this is a discovery error.
    #[must_use]
    pub const fn is_discovery(&self) -> bool {
        matches!(self, Self::Discovery { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization {
            message: e.to_string(),
        }
    }
}
