use crate::{
    config::LineAccounting,
    error::{Error, ReplaceError, Result},
};
use serde::Serialize;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;

/// Line accounting record for one file.
///
/// A count is `None` when it was not requested or could not be measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LineCountResult {
    /// Logical lines of the original content
    pub before: Option<usize>,

    /// Logical lines of whatever is on disk after processing
    pub after: Option<usize>,

    /// Whether the file was transformed and replaced
    pub succeeded: bool,
}

/// Why a file was counted as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Listed in the manifest but not a usable source file
    Rejected {
        /// Reason reported by discovery
        reason: String,
    },
    /// The original could not be read
    Unreadable {
        /// Error message
        message: String,
    },
    /// The transformer reported a failure
    Transform {
        /// Diagnostics in the order reported
        diagnostics: Vec<String>,
    },
    /// The transformed output could not replace the original
    Replace {
        /// Failed step
        error: ReplaceError,
    },
}

impl FailureReason {
    /// Returns true if the original file was lost.
    #[must_use]
    pub const fn is_data_loss(&self) -> bool {
        match self {
            Self::Replace { error } => error.is_data_loss(),
            _ => false,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { reason } => write!(f, "skipped: {reason}"),
            Self::Unreadable { message } => write!(f, "unreadable: {message}"),
            Self::Transform { diagnostics } => {
                write!(f, "transform failed")?;
                if let Some(first) = diagnostics.first() {
                    write!(f, ": {first}")?;
                    if diagnostics.len() > 1 {
                        write!(f, " (+{} more)", diagnostics.len() - 1)?;
                    }
                }
                Ok(())
            }
            Self::Replace { error } => write!(f, "replace failed: {error}"),
        }
    }
}

/// Outcome of processing one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    /// File that was processed
    pub path: PathBuf,

    /// Line counts and success flag
    pub lines: LineCountResult,

    /// Failure details, `None` on success
    pub failure: Option<FailureReason>,
}

impl FileOutcome {
    /// Creates a successful outcome.
    #[must_use]
    pub fn succeeded(path: PathBuf, before: Option<usize>, after: Option<usize>) -> Self {
        Self {
            path,
            lines: LineCountResult {
                before,
                after,
                succeeded: true,
            },
            failure: None,
        }
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(
        path: PathBuf,
        reason: FailureReason,
        before: Option<usize>,
        after: Option<usize>,
    ) -> Self {
        Self {
            path,
            lines: LineCountResult {
                before,
                after,
                succeeded: false,
            },
            failure: Some(reason),
        }
    }

    /// Returns true if the file was transformed and replaced.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.lines.succeeded
    }
}

/// Aggregate result of a run.
///
/// Only [`RunSummary::record`] and [`RunSummary::merge`] change the counters,
/// so `success_count + fail_count` always equals the number of recorded outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Files transformed and replaced
    pub success_count: usize,

    /// Files that failed at any step
    pub fail_count: usize,

    /// Sum of measured before-counts
    pub total_before: usize,

    /// Sum of measured after-counts
    pub total_after: usize,

    /// Accounting mode of the run
    pub line_accounting: LineAccounting,

    /// Whether the run left originals untouched
    pub dry_run: bool,

    /// Per-file outcomes in scan or manifest order
    pub outcomes: Vec<FileOutcome>,

    /// Total execution time
    pub duration: Duration,
}

impl RunSummary {
    /// Creates an empty summary for a run with the given accounting mode.
    #[must_use]
    pub fn new(line_accounting: LineAccounting) -> Self {
        Self {
            line_accounting,
            ..Self::default()
        }
    }

    /// Folds one outcome into the totals.
    pub fn record(&mut self, outcome: FileOutcome) {
        if outcome.is_success() {
            self.success_count += 1;
        } else {
            self.fail_count += 1;
        }
        if let Some(before) = outcome.lines.before {
            self.total_before += before;
        }
        if let Some(after) = outcome.lines.after {
            self.total_after += after;
        }
        self.outcomes.push(outcome);
    }

    /// Merges a summary produced by another worker.
    pub fn merge(&mut self, other: Self) {
        self.success_count += other.success_count;
        self.fail_count += other.fail_count;
        self.total_before += other.total_before;
        self.total_after += other.total_after;
        self.outcomes.extend(other.outcomes);
    }

    /// Number of files accounted for.
    #[must_use]
    pub const fn processed(&self) -> usize {
        self.success_count + self.fail_count
    }

    /// Iterates over failed outcomes.
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Number of files whose original was lost.
    #[must_use]
    pub fn data_loss_count(&self) -> usize {
        self.failures()
            .filter(|o| o.failure.as_ref().is_some_and(FailureReason::is_data_loss))
            .count()
    }

    /// Logical lines removed (negative if the output grew).
    #[must_use]
    pub fn reduction(&self) -> i64 {
        let before = i64::try_from(self.total_before).unwrap_or(i64::MAX);
        let after = i64::try_from(self.total_after).unwrap_or(i64::MAX);
        before - after
    }

    /// Reduction as a percentage of the before total (0 when nothing was measured).
    #[must_use]
    pub fn reduction_ratio(&self) -> f64 {
        if self.total_before == 0 {
            return 0.0;
        }
        self.reduction() as f64 * 100.0 / self.total_before as f64
    }

    /// Prints a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!();
        if self.failures().next().is_some() {
            println!("Failures:");
            for outcome in self.failures() {
                if let Some(ref reason) = outcome.failure {
                    println!("  ✗ {}: {}", outcome.path.display(), reason);
                }
            }
            println!();
        }

        println!(
            "✅ Done: {} succeeded, {} failed ({:.2}s){}",
            self.success_count,
            self.fail_count,
            self.duration.as_secs_f64(),
            if self.dry_run { " [dry run]" } else { "" }
        );

        let lost = self.data_loss_count();
        if lost > 0 {
            println!("❌ {lost} file(s) were deleted but not replaced; restore them from version control");
        }

        if self.success_count == 0 {
            return;
        }

        if self.line_accounting.measures_before() {
            println!("📈 Logical lines before: {}", self.total_before);
        }
        if self.line_accounting.measures_after() {
            println!("📈 Logical lines after:  {}", self.total_after);
        }
        if self.line_accounting == LineAccounting::All {
            println!(
                "📈 Reduction: {} lines ({:.2}%)",
                self.reduction(),
                self.reduction_ratio()
            );
        }
    }

    /// Writes a JSON report of the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the report file cannot be written.
    pub fn write_report(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct Report<'a> {
            generated_at: String,
            reduction: i64,
            reduction_ratio: f64,
            data_loss: usize,
            #[serde(flatten)]
            summary: &'a RunSummary,
        }

        let report = Report {
            generated_at: chrono::Local::now()
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            reduction: self.reduction(),
            reduction_ratio: self.reduction_ratio(),
            data_loss: self.data_loss_count(),
            summary: self,
        };

        let file = fs::File::create(path).map_err(|e| Error::io(path, e))?;
        serde_json::to_writer_pretty(file, &report).map_err(Error::from)?;

        info!("Wrote report to {}", path.display());
        Ok(())
    }
}
