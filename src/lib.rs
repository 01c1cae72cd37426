//! # srcshrink
//!
//! Batch-transforms source files through an external transformer (typically
//! a minifier) and overwrites the originals in place.
//!
//! ## Features
//!
//! - Directory scan with extension, exclusion, keyword and size filters
//! - Manifest-driven runs from a list of root-relative paths
//! - Verified replacement through a temporary file, never writing empty output
//! - Heuristic logical-line accounting before and after transformation
//! - Optional parallel processing and a JSON run report
//!
//! ## Quick Start
//!
//! ```no_run
//! use srcshrink::{CommandTransformer, Config, LineAccounting, Pipeline};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::builder()
//!     .scan_dir("./src/main/js")
//!     .exclude(["src/main/js/test"])
//!     .line_accounting(LineAccounting::All)
//!     .build()?;
//!
//! let compiler = CommandTransformer::new(
//!     "google-closure-compiler",
//!     ["--language_in={input_dialect}", "--language_out={output_dialect}"],
//! );
//!
//! let summary = Pipeline::new(config, compiler)?.run()?;
//! summary.print_summary();
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library follows a pipeline architecture:
//! 1. **Locator**: Resolves candidate files from a directory or manifest
//! 2. **Transformer**: Turns source text into new text, or diagnostics
//! 3. **Replacer**: Swaps verified output in for the original
//! 4. **Accountant**: Counts logical lines on either side

#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery
)]
#![allow(clippy::module_name_repetitions)]

mod accounting;
mod candidate;
mod config;
mod error;
mod locator;
mod pipeline;
mod replacer;
mod summary;
mod transform;

pub use accounting::{count_logical_lines, CommentSyntax, LineAccountant};
pub use candidate::{CandidateFile, Discovery, RejectedEntry};
pub use config::{Config, ConfigBuilder, DiscoveryMode, LineAccounting, ReplaceStrategy};
pub use error::{Error, ReplaceError, Result};
pub use locator::FileLocator;
pub use pipeline::Pipeline;
pub use replacer::SafeReplacer;
pub use summary::{FailureReason, FileOutcome, LineCountResult, RunSummary};
pub use transform::{CommandTransformer, TransformOptions, TransformOutcome, Transformer};

/// Runs the complete pipeline with the given configuration and transformer.
///
/// This is the main entry point for the library.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - The scan root or manifest doesn't exist or is inaccessible
///
/// Failures of individual files are reported in the returned [`RunSummary`].
///
/// # Examples
///
/// ```no_run
/// use srcshrink::{run, Config, TransformOptions, TransformOutcome};
///
/// # fn main() -> anyhow::Result<()> {
/// let config = Config::builder().scan_dir(".").dry_run(true).build()?;
///
/// let strip_blank = |src: &str, _: &TransformOptions| {
///     let lines: Vec<&str> = src.lines().filter(|l| !l.trim().is_empty()).collect();
///     TransformOutcome::Success(lines.join("\n"))
/// };
///
/// let summary = run(config, strip_blank)?;
/// assert_eq!(summary.processed(), summary.success_count + summary.fail_count);
/// # Ok(())
/// # }
/// ```
pub fn run(config: Config, transformer: impl Transformer + 'static) -> Result<RunSummary> {
    Pipeline::new(config, transformer)?.run()
}
