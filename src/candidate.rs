use serde::Serialize;
use std::path::{Path, PathBuf};

/// A file selected by discovery for possible transformation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFile {
    /// Resolved path to the file
    pub path: PathBuf,

    /// Path relative to the scan root, for display
    pub relative_path: String,

    /// Size in bytes at discovery time
    pub size: u64,
}

impl CandidateFile {
    /// Creates a candidate, deriving the display path relative to `root`.
    #[must_use]
    pub fn new(path: PathBuf, root: &Path, size: u64) -> Self {
        let relative_path = pathdiff::diff_paths(&path, root)
            .unwrap_or_else(|| path.clone())
            .to_string_lossy()
            .to_string();

        Self {
            path,
            relative_path,
            size,
        }
    }
}

/// A manifest entry that was reported and skipped during discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedEntry {
    /// Resolved path of the entry
    pub path: PathBuf,

    /// Why the entry was not selected
    pub reason: String,

    /// Number of candidates listed before this entry, which fixes its place
    /// among the outcomes
    pub position: usize,
}

/// Everything discovery produced for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Candidates in scan or manifest order
    pub candidates: Vec<CandidateFile>,

    /// Manifest entries that do not exist, are not regular files, or lack the extension
    pub rejected: Vec<RejectedEntry>,
}

impl Discovery {
    /// Total number of entries the run must account for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len() + self.rejected.len()
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.rejected.is_empty()
    }
}
