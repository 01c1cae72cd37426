use crate::error::{Error, Result};
use crate::transform::TransformOptions;
use serde::Serialize;
use std::path::{Path, PathBuf};

const DEFAULT_SCAN_DIR: &str = ".";
const DEFAULT_EXTENSION: &str = ".js";

/// Which logical-line measurements a run takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineAccounting {
    /// No line counting
    #[default]
    Off,
    /// Count the original content only
    Before,
    /// Count whatever is on disk after processing
    After,
    /// Count both
    All,
}

impl LineAccounting {
    /// Returns true if the original content should be measured.
    #[must_use]
    pub const fn measures_before(self) -> bool {
        matches!(self, Self::Before | Self::All)
    }

    /// Returns true if the content on disk should be measured after processing.
    #[must_use]
    pub const fn measures_after(self) -> bool {
        matches!(self, Self::After | Self::All)
    }
}

/// How transformed output is swapped in for the original file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplaceStrategy {
    /// Single rename over the existing file; the original is never absent.
    #[default]
    Atomic,
    /// Delete the original, then rename the temporary file into place.
    ///
    /// Matches the legacy tool. A failed rename after the delete loses the file.
    DeleteThenRename,
}

/// Resolved discovery mode of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Recursively walk a directory
    Directory {
        /// Directory to walk
        root: PathBuf,
    },
    /// Read candidate paths from a manifest file
    Manifest {
        /// Manifest file, one path per line
        path: PathBuf,
        /// Root to resolve entries against (defaults to the manifest's directory)
        root: Option<PathBuf>,
    },
}

/// Configuration for one srcshrink run.
///
/// Use [`Config::builder()`] to construct a new configuration.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct Config {
    /// Directory to scan recursively
    pub scan_dir: Option<PathBuf>,

    /// Manifest file listing candidate paths
    pub manifest: Option<PathBuf>,

    /// Root that manifest entries are resolved against
    pub manifest_root: Option<PathBuf>,

    /// Suffix a candidate path must end with (e.g. `.js`)
    pub extension: String,

    /// Paths containing any of these substrings are skipped
    pub exclusions: Vec<String>,

    /// If non-empty, a path must contain at least one of these substrings
    pub keywords: Vec<String>,

    /// Files must be strictly larger than this many bytes (0 disables)
    pub size_threshold_bytes: u64,

    /// Logical line measurements to take
    pub line_accounting: LineAccounting,

    /// Options forwarded unchanged to the transformer
    pub transform_options: TransformOptions,

    /// How originals are replaced
    pub replace_strategy: ReplaceStrategy,

    /// Where temporary files are created (defaults to the original's directory)
    pub scratch_dir: Option<PathBuf>,

    /// Number of worker threads (1 = sequential)
    pub jobs: usize,

    /// Transform but never replace
    pub dry_run: bool,

    /// Honour `.gitignore`/`.ignore` files and skip hidden entries during scans
    pub respect_ignore_files: bool,

    /// Write a JSON report of the run to this path
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Creates a new configuration builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use srcshrink::{Config, LineAccounting};
    ///
    /// let config = Config::builder()
    ///     .scan_dir("./static")
    ///     .keywords(["echarts", "chart"])
    ///     .line_accounting(LineAccounting::All)
    ///     .build()
    ///     .expect("valid configuration");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Resolves which discovery mode this configuration selects.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if both a scan directory and a manifest
    /// are set.
    pub fn discovery_mode(&self) -> Result<DiscoveryMode> {
        match (&self.scan_dir, &self.manifest) {
            (Some(_), Some(_)) => Err(Error::config(
                "directory scan and manifest scan are mutually exclusive",
            )),
            (None, Some(manifest)) => Ok(DiscoveryMode::Manifest {
                path: manifest.clone(),
                root: self.manifest_root.clone(),
            }),
            (Some(dir), None) => Ok(DiscoveryMode::Directory { root: dir.clone() }),
            (None, None) => Ok(DiscoveryMode::Directory {
                root: PathBuf::from(DEFAULT_SCAN_DIR),
            }),
        }
    }

    /// Validates the configuration.
    ///
    /// Existence of the scan root or manifest is checked at discovery time,
    /// not here.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Both discovery modes are selected
    /// - The extension is empty
    /// - The scratch directory doesn't exist
    /// - `jobs` is zero
    pub fn validate(&self) -> Result<()> {
        self.discovery_mode()?;

        if self.extension.trim().is_empty() {
            return Err(Error::config("extension must not be empty"));
        }

        if let Some(ref scratch) = self.scratch_dir {
            if !scratch.is_dir() {
                return Err(Error::config(format!(
                    "Scratch directory does not exist: {}",
                    scratch.display()
                )));
            }
        }

        if self.jobs == 0 {
            return Err(Error::config("jobs must be greater than 0"));
        }

        if self.manifest_root.is_some() && self.manifest.is_none() {
            tracing::warn!("manifest_root is only used with a manifest; ignoring it");
        }

        Ok(())
    }

    /// Returns true if the path contains a configured exclusion substring.
    #[must_use]
    pub fn is_excluded(&self, path_text: &str) -> bool {
        self.exclusions.iter().any(|ex| path_text.contains(ex.as_str()))
    }

    /// Returns true if no keywords are set or the path contains one of them.
    #[must_use]
    pub fn matches_keywords(&self, path_text: &str) -> bool {
        self.keywords.is_empty() || self.keywords.iter().any(|kw| path_text.contains(kw.as_str()))
    }

    /// Returns true if no threshold is set or `size` is strictly above it.
    #[must_use]
    pub const fn exceeds_threshold(&self, size: u64) -> bool {
        self.size_threshold_bytes == 0 || size > self.size_threshold_bytes
    }

    /// Returns true if `path` carries the configured source extension.
    #[must_use]
    pub fn has_extension(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(self.extension.as_str())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan_dir: None,
            manifest: None,
            manifest_root: None,
            extension: DEFAULT_EXTENSION.to_string(),
            exclusions: Vec::new(),
            keywords: Vec::new(),
            size_threshold_bytes: 0,
            line_accounting: LineAccounting::Off,
            transform_options: TransformOptions::default(),
            replace_strategy: ReplaceStrategy::Atomic,
            scratch_dir: None,
            jobs: 1,
            dry_run: false,
            respect_ignore_files: false,
            report_path: None,
        }
    }
}

/// Builder for creating a [`Config`].
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    scan_dir: Option<PathBuf>,
    manifest: Option<PathBuf>,
    manifest_root: Option<PathBuf>,
    extension: Option<String>,
    exclusions: Vec<String>,
    keywords: Vec<String>,
    size_threshold_bytes: u64,
    line_accounting: LineAccounting,
    transform_options: Option<TransformOptions>,
    replace_strategy: ReplaceStrategy,
    scratch_dir: Option<PathBuf>,
    jobs: Option<usize>,
    dry_run: bool,
    respect_ignore_files: bool,
    report_path: Option<PathBuf>,
}

impl ConfigBuilder {
    /// Sets the directory to scan recursively.
    #[must_use]
    pub fn scan_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scan_dir = Some(path.into());
        self
    }

    /// Sets the manifest file listing candidate paths.
    #[must_use]
    pub fn manifest(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest = Some(path.into());
        self
    }

    /// Sets the root that manifest entries are resolved against.
    #[must_use]
    pub fn manifest_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_root = Some(path.into());
        self
    }

    /// Sets the required path suffix. A missing leading dot is not added.
    #[must_use]
    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extension = Some(ext.into());
        self
    }

    /// Adds exclusion substrings.
    #[must_use]
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.extend(
            patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty()),
        );
        self
    }

    /// Sets the keyword filter. Empty keywords are dropped.
    #[must_use]
    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.is_empty())
            .collect();
        self
    }

    /// Sets the size threshold in bytes (0 disables the filter).
    #[must_use]
    pub fn size_threshold_bytes(mut self, bytes: u64) -> Self {
        self.size_threshold_bytes = bytes;
        self
    }

    /// Sets the size threshold in kilobytes, as the CLI accepts it.
    #[must_use]
    pub fn size_threshold_kb(mut self, kb: u64) -> Self {
        self.size_threshold_bytes = kb.saturating_mul(1024);
        self
    }

    /// Sets the line accounting mode.
    #[must_use]
    pub fn line_accounting(mut self, mode: LineAccounting) -> Self {
        self.line_accounting = mode;
        self
    }

    /// Sets the options forwarded to the transformer.
    #[must_use]
    pub fn transform_options(mut self, options: TransformOptions) -> Self {
        self.transform_options = Some(options);
        self
    }

    /// Sets the replacement strategy.
    #[must_use]
    pub fn replace_strategy(mut self, strategy: ReplaceStrategy) -> Self {
        self.replace_strategy = strategy;
        self
    }

    /// Sets the directory for temporary files.
    #[must_use]
    pub fn scratch_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(path.into());
        self
    }

    /// Sets the number of worker threads. `0` means one per CPU.
    #[must_use]
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    /// Enables dry run mode (no file replacement).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Makes directory scans honour ignore files and skip hidden entries.
    #[must_use]
    pub fn respect_ignore_files(mut self, enabled: bool) -> Self {
        self.respect_ignore_files = enabled;
        self
    }

    /// Sets the path of the JSON run report.
    #[must_use]
    pub fn report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails.
    pub fn build(self) -> Result<Config> {
        let jobs = match self.jobs {
            Some(0) => num_cpus::get(),
            Some(n) => n,
            None => 1,
        };

        let config = Config {
            scan_dir: self.scan_dir,
            manifest: self.manifest,
            manifest_root: self.manifest_root,
            extension: self
                .extension
                .unwrap_or_else(|| DEFAULT_EXTENSION.to_string()),
            exclusions: self.exclusions,
            keywords: self.keywords,
            size_threshold_bytes: self.size_threshold_bytes,
            line_accounting: self.line_accounting,
            transform_options: self.transform_options.unwrap_or_default(),
            replace_strategy: self.replace_strategy,
            scratch_dir: self.scratch_dir,
            jobs,
            dry_run: self.dry_run,
            respect_ignore_files: self.respect_ignore_files,
            report_path: self.report_path,
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::builder().build().unwrap();

        assert_eq!(config.extension, ".js");
        assert_eq!(config.jobs, 1);
        assert_eq!(config.line_accounting, LineAccounting::Off);
        assert_eq!(config.replace_strategy, ReplaceStrategy::Atomic);
        assert_eq!(
            config.discovery_mode().unwrap(),
            DiscoveryMode::Directory {
                root: PathBuf::from(".")
            }
        );
    }

    #[test]
    fn test_conflicting_discovery_modes() {
        let result = Config::builder()
            .scan_dir("src")
            .manifest("files.txt")
            .build();

        assert!(result.unwrap_err().is_config());
    }

    #[test]
    fn test_manifest_mode() {
        let config = Config::builder()
            .manifest("lists/files.txt")
            .manifest_root("/project")
            .build()
            .unwrap();

        assert_eq!(
            config.discovery_mode().unwrap(),
            DiscoveryMode::Manifest {
                path: PathBuf::from("lists/files.txt"),
                root: Some(PathBuf::from("/project")),
            }
        );
    }

    #[test]
    fn test_empty_extension_rejected() {
        assert!(Config::builder().extension("  ").build().is_err());
    }

    #[test]
    fn test_missing_scratch_dir_rejected() {
        let result = Config::builder()
            .scratch_dir("/nonexistent/path/that/should/not/exist")
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_zero_jobs_means_cpu_count() {
        let config = Config::builder().jobs(0).build().unwrap();
        assert_eq!(config.jobs, num_cpus::get());
    }

    #[test]
    fn test_size_threshold_kb() {
        let config = Config::builder().size_threshold_kb(100).build().unwrap();
        assert_eq!(config.size_threshold_bytes, 102_400);
    }

    #[test]
    fn test_keyword_filter_is_or() {
        let config = Config::builder()
            .keywords(["echarts", "chart", ""])
            .build()
            .unwrap();

        assert_eq!(config.keywords.len(), 2);
        assert!(config.matches_keywords("static/echarts/main.js"));
        assert!(config.matches_keywords("static/piechart.js"));
        assert!(!config.matches_keywords("static/app.js"));
    }

    #[test]
    fn test_threshold_is_strict() {
        let config = Config::builder().size_threshold_bytes(100).build().unwrap();

        assert!(!config.exceeds_threshold(99));
        assert!(!config.exceeds_threshold(100));
        assert!(config.exceeds_threshold(101));
    }

    #[test]
    fn test_line_accounting_modes() {
        assert!(LineAccounting::Before.measures_before());
        assert!(!LineAccounting::Before.measures_after());
        assert!(LineAccounting::After.measures_after());
        assert!(!LineAccounting::After.measures_before());
        assert!(LineAccounting::All.measures_before());
        assert!(LineAccounting::All.measures_after());
    }
}
