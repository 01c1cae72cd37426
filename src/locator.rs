use crate::{
    candidate::{CandidateFile, Discovery, RejectedEntry},
    config::{Config, DiscoveryMode},
    error::{Error, Result},
};
use ignore::WalkBuilder;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, trace, warn};

const COMMENT_MARKER: char = '#';

/// Statistics collected during discovery.
#[derive(Debug, Default, Clone)]
struct LocateStats {
    /// Regular files seen
    seen: usize,

    /// Files dropped by the extension, exclusion, keyword or size filters
    filtered: usize,

    /// Walk entries that could not be read
    errors: usize,
}

/// Resolves the candidate files of a run.
pub struct FileLocator {
    config: Config,
}

impl FileLocator {
    /// Creates a new locator from configuration.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Discovers candidates using the configured mode.
    ///
    /// The returned order is walk or manifest order; nothing is sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Both discovery modes are configured
    /// - The scan root, manifest or manifest root doesn't exist or can't be read
    pub fn locate(&self) -> Result<Discovery> {
        match self.config.discovery_mode()? {
            DiscoveryMode::Directory { root } => Ok(Discovery {
                candidates: self.scan_directory(&root)?,
                rejected: Vec::new(),
            }),
            DiscoveryMode::Manifest { path, root } => self.scan_manifest(&path, root.as_deref()),
        }
    }

    /// Recursively walks `root` and applies the filters to every regular file.
    ///
    /// Symbolic links are not followed and linked files are not candidates.
    fn scan_directory(&self, root: &Path) -> Result<Vec<CandidateFile>> {
        if !root.exists() {
            return Err(Error::discovery(root, "directory does not exist"));
        }
        if !root.is_dir() {
            return Err(Error::discovery(root, "path is not a directory"));
        }

        debug!("Scanning {}", root.display());

        let walker = WalkBuilder::new(root)
            .standard_filters(self.config.respect_ignore_files)
            .follow_links(false)
            .build();

        let mut stats = LocateStats::default();
        let mut candidates = Vec::new();

        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    stats.errors += 1;
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            stats.seen += 1;

            let path = entry.path();
            let path_text = path.to_string_lossy();

            if !self.config.has_extension(path) || self.config.is_excluded(&path_text) {
                trace!("Skipping {}", path_text);
                stats.filtered += 1;
                continue;
            }

            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    warn!("Cannot read metadata of {}: {}", path_text, e);
                    stats.errors += 1;
                    continue;
                }
            };

            if !self.config.matches_keywords(&path_text) || !self.config.exceeds_threshold(size) {
                trace!("Filtered out {} ({} bytes)", path_text, size);
                stats.filtered += 1;
                continue;
            }

            candidates.push(CandidateFile::new(path.to_path_buf(), root, size));
        }

        debug!(
            "Scan complete: {} files seen, {} selected, {} filtered, {} errors",
            stats.seen,
            candidates.len(),
            stats.filtered,
            stats.errors
        );

        Ok(candidates)
    }

    /// Reads candidate paths from a manifest, one per line.
    ///
    /// Entries are resolved against `root`, or the manifest's own directory
    /// when no root is given. A leading `/` or `\` is stripped first, so
    /// entries are always root-relative.
    fn scan_manifest(&self, manifest: &Path, root: Option<&Path>) -> Result<Discovery> {
        let content = fs::read_to_string(manifest)
            .map_err(|e| Error::discovery(manifest, e.to_string()))?;

        let root = match root {
            Some(root) => {
                if !root.is_dir() {
                    return Err(Error::discovery(root, "manifest root is not a directory"));
                }
                root.to_path_buf()
            }
            None => manifest.parent().map(Path::to_path_buf).unwrap_or_default(),
        };

        debug!(
            "Reading manifest {} (root: {})",
            manifest.display(),
            root.display()
        );

        let mut discovery = Discovery::default();
        let mut filtered = 0usize;

        for line in content.lines() {
            let entry = line.trim();
            if entry.is_empty() || entry.starts_with(COMMENT_MARKER) {
                continue;
            }

            let relative = strip_leading_separator(entry);
            let full_path = root.join(&relative);

            match self.check_manifest_entry(&full_path) {
                Ok(size) => {
                    if self.config.matches_keywords(entry) && self.config.exceeds_threshold(size) {
                        discovery
                            .candidates
                            .push(CandidateFile::new(full_path, &root, size));
                    } else {
                        trace!("Filtered out {} ({} bytes)", full_path.display(), size);
                        filtered += 1;
                    }
                }
                Err(reason) => {
                    warn!("Skipping {}: {}", full_path.display(), reason);
                    discovery.rejected.push(RejectedEntry {
                        path: full_path,
                        reason,
                        position: discovery.candidates.len(),
                    });
                }
            }
        }

        debug!(
            "Manifest complete: {} selected, {} rejected, {} filtered",
            discovery.candidates.len(),
            discovery.rejected.len(),
            filtered
        );

        Ok(discovery)
    }

    /// Returns the file size if the entry is an existing regular source file.
    fn check_manifest_entry(&self, path: &Path) -> std::result::Result<u64, String> {
        let metadata = fs::metadata(path).map_err(|_| "file does not exist".to_string())?;

        if !metadata.is_file() {
            return Err("not a regular file".to_string());
        }

        if !self.config.has_extension(path) {
            return Err(format!("not a '{}' file", self.config.extension));
        }

        Ok(metadata.len())
    }
}

fn strip_leading_separator(entry: &str) -> PathBuf {
    let entry = entry.strip_prefix('/').unwrap_or(entry);
    let entry = entry.strip_prefix('\\').unwrap_or(entry);
    PathBuf::from(entry)
}
