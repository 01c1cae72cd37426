use crate::{
    accounting::LineAccountant,
    candidate::{CandidateFile, RejectedEntry},
    config::Config,
    error::{Error, Result},
    locator::FileLocator,
    replacer::SafeReplacer,
    summary::{FailureReason, FileOutcome, RunSummary},
    transform::{TransformOutcome, Transformer},
};
use std::{
    any::Any,
    fs,
    panic::{self, AssertUnwindSafe},
    path::Path,
    sync::Arc,
    thread,
    time::Instant,
};
use tracing::{debug, error, info, instrument, warn};

/// Drives discovery, transformation, replacement and accounting for one run.
pub struct Pipeline {
    config: Config,
    locator: FileLocator,
    accountant: LineAccountant,
    replacer: SafeReplacer,
    transformer: Arc<dyn Transformer>,
}

impl Pipeline {
    /// Creates a new pipeline with the given configuration and transformer.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails, including when
    /// both discovery modes are selected.
    pub fn new(config: Config, transformer: impl Transformer + 'static) -> Result<Self> {
        Self::with_transformer(config, Arc::new(transformer))
    }

    /// Creates a new pipeline sharing an existing transformer.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration validation fails.
    pub fn with_transformer(config: Config, transformer: Arc<dyn Transformer>) -> Result<Self> {
        config.validate()?;

        let locator = FileLocator::new(&config);
        let replacer = SafeReplacer::new(&config);

        Ok(Self {
            config,
            locator,
            accountant: LineAccountant::default(),
            replacer,
            transformer,
        })
    }

    /// Executes the run and returns its summary.
    ///
    /// # Process
    ///
    /// 1. **Locate**: discovers candidates once, before any file is touched
    /// 2. **Process**: per candidate, read, optionally count, transform,
    ///    replace and optionally count again
    /// 3. **Summarize**: folds every outcome into the [`RunSummary`]
    ///
    /// Per-file failures never abort the run; they are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns an error only if discovery fails, in which case no file has
    /// been modified.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use srcshrink::{CommandTransformer, Config, LineAccounting, Pipeline};
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::builder()
    ///     .scan_dir("./static")
    ///     .line_accounting(LineAccounting::All)
    ///     .build()?;
    ///
    /// let terser = CommandTransformer::new("terser", ["--compress", "--mangle"]);
    /// let summary = Pipeline::new(config, terser)?.run()?;
    /// summary.print_summary();
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), fields(jobs = self.config.jobs, dry_run = self.config.dry_run))]
    pub fn run(&self) -> Result<RunSummary> {
        let start_time = Instant::now();

        info!("Locating candidate files...");
        let discovery = self.locator.locate()?;
        info!(
            "Found {} file(s) to process{}",
            discovery.candidates.len(),
            if discovery.rejected.is_empty() {
                String::new()
            } else {
                format!(", {} manifest entries skipped", discovery.rejected.len())
            }
        );

        if discovery.is_empty() {
            warn!("No source files matched; nothing to do");
        }

        let mut summary = RunSummary::new(self.config.line_accounting);
        summary.dry_run = self.config.dry_run;

        let processed = if self.config.jobs > 1 && discovery.candidates.len() > 1 {
            self.process_parallel(&discovery.candidates, self.config.jobs)
        } else {
            self.process_sequential(&discovery.candidates)
        };

        // Rejected manifest entries go back to their place in manifest order.
        let mut rejected = discovery.rejected.into_iter().peekable();
        for (index, outcome) in processed.outcomes.into_iter().enumerate() {
            while let Some(entry) = rejected.next_if(|r| r.position <= index) {
                summary.record(rejected_outcome(entry));
            }
            summary.record(outcome);
        }
        for entry in rejected {
            summary.record(rejected_outcome(entry));
        }
        summary.duration = start_time.elapsed();

        if let Some(ref report_path) = self.config.report_path {
            if let Err(e) = summary.write_report(report_path) {
                warn!("Could not write report: {}", e);
            }
        }

        info!(
            "Run complete: {} succeeded, {} failed in {:.2}s",
            summary.success_count,
            summary.fail_count,
            summary.duration.as_secs_f64()
        );

        Ok(summary)
    }

    fn process_sequential(&self, candidates: &[CandidateFile]) -> RunSummary {
        let mut summary = RunSummary::new(self.config.line_accounting);
        for candidate in candidates {
            summary.record(self.process_file(candidate));
        }
        summary
    }

    /// Splits candidates into contiguous slices, one summary per worker.
    ///
    /// Merging in slice order keeps outcomes in candidate order.
    fn process_parallel(&self, candidates: &[CandidateFile], jobs: usize) -> RunSummary {
        let chunk_size = candidates.len().div_ceil(jobs);
        debug!("Processing {} files on {} workers", candidates.len(), jobs);

        let partials: Vec<RunSummary> = thread::scope(|scope| {
            let handles: Vec<_> = candidates
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.process_sequential(chunk)))
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| panic::resume_unwind(payload)))
                .collect()
        });

        let mut summary = RunSummary::new(self.config.line_accounting);
        for partial in partials {
            summary.merge(partial);
        }
        summary
    }

    /// Processes one candidate; every failure becomes a failed outcome.
    fn process_file(&self, candidate: &CandidateFile) -> FileOutcome {
        let path = &candidate.path;
        let accounting = self.config.line_accounting;
        debug!("Processing {} ({} bytes)", candidate.relative_path, candidate.size);

        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) => {
                let err = Error::read(path, e);
                error!("✗ {}: {}", candidate.relative_path, err);
                return FileOutcome::failed(
                    path.clone(),
                    FailureReason::Unreadable {
                        message: err.to_string(),
                    },
                    None,
                    None,
                );
            }
        };

        let before = accounting
            .measures_before()
            .then(|| self.accountant.count(&source));

        let text = match self.transform(&source) {
            TransformOutcome::Success(text) => text,
            TransformOutcome::Failure(diagnostics) => {
                error!("✗ Transform failed: {}", candidate.relative_path);
                for diagnostic in &diagnostics {
                    error!("   → {}", diagnostic);
                }
                return FileOutcome::failed(
                    path.clone(),
                    FailureReason::Transform { diagnostics },
                    before,
                    self.measure_after(path),
                );
            }
        };

        if self.config.dry_run {
            info!("~ Would replace {}", candidate.relative_path);
            let after = accounting.measures_after().then(|| self.accountant.count(&text));
            return FileOutcome::succeeded(path.clone(), before, after);
        }

        match self.replacer.replace(path, &text) {
            Ok(()) => {
                info!("✓ Replaced {}", candidate.relative_path);
                FileOutcome::succeeded(path.clone(), before, self.measure_after(path))
            }
            Err(e) => {
                if e.is_data_loss() {
                    error!(
                        path = %path.display(),
                        "✗ Original deleted but replacement failed: {}", e
                    );
                } else {
                    error!("✗ {}: {}", candidate.relative_path, e);
                }
                FileOutcome::failed(
                    path.clone(),
                    FailureReason::Replace { error: e },
                    before,
                    self.measure_after(path),
                )
            }
        }
    }

    /// Runs the transformer, turning a panic into a failure for this file only.
    fn transform(&self, source: &str) -> TransformOutcome {
        panic::catch_unwind(AssertUnwindSafe(|| {
            self.transformer
                .transform(source, &self.config.transform_options)
        }))
        .unwrap_or_else(|payload| {
            TransformOutcome::failure(format!("transformer panicked: {}", panic_message(&*payload)))
        })
    }

    /// Counts whatever is on disk now; a failure only drops the count.
    fn measure_after(&self, path: &Path) -> Option<usize> {
        if !self.config.line_accounting.measures_after() {
            return None;
        }
        match self.accountant.count_file(path) {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Line count unavailable: {}", e);
                None
            }
        }
    }
}

fn rejected_outcome(entry: RejectedEntry) -> FileOutcome {
    FileOutcome::failed(
        entry.path,
        FailureReason::Rejected {
            reason: entry.reason,
        },
        None,
        None,
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LineAccounting, ReplaceStrategy};
    use crate::transform::TransformOptions;
    use assert_fs::prelude::*;

    const SOURCE: &str = "\
// greeting helpers
function greet(name) {
  return 'Hello, ' + name;
}
";

    fn minify(source: &str, _: &TransformOptions) -> TransformOutcome {
        let joined: Vec<&str> = source
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("//"))
            .collect();
        TransformOutcome::Success(joined.join(""))
    }

    fn reject(_: &str, _: &TransformOptions) -> TransformOutcome {
        TransformOutcome::Failure(vec!["JSC_PARSE_ERROR: unexpected token".into()])
    }

    fn dir_config(root: &Path) -> crate::config::ConfigBuilder {
        Config::builder().scan_dir(root)
    }

    #[test]
    fn test_pipeline_replaces_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();
        temp.child("lib/b.js").write_str(SOURCE).unwrap();

        let config = dir_config(temp.path())
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, minify).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 2);
        assert_eq!(summary.fail_count, 0);
        assert_eq!(summary.total_before, 6);
        assert_eq!(summary.total_after, 2);
        temp.child("a.js")
            .assert("function greet(name) {return 'Hello, ' + name;}");
    }

    #[test]
    fn test_transform_failure_leaves_bytes_unchanged() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();

        let config = dir_config(temp.path())
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, reject).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(fs::read(temp.child("a.js").path()).unwrap(), SOURCE.as_bytes());

        // The untouched original is measured on both sides.
        assert_eq!(summary.total_before, 3);
        assert_eq!(summary.total_after, 3);
        assert!(matches!(
            summary.outcomes[0].failure,
            Some(FailureReason::Transform { ref diagnostics }) if diagnostics.len() == 1
        ));
    }

    #[test]
    fn test_empty_output_is_failure() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();

        let config = dir_config(temp.path()).build().unwrap();
        let empty = |_: &str, _: &TransformOptions| TransformOutcome::Success(String::new());
        let summary = Pipeline::new(config, empty).unwrap().run().unwrap();

        assert_eq!(summary.fail_count, 1);
        assert_eq!(
            summary.outcomes[0].failure,
            Some(FailureReason::Replace {
                error: crate::error::ReplaceError::EmptyOutput
            })
        );
        temp.child("a.js").assert(SOURCE);
    }

    #[test]
    fn test_panicking_transformer_is_isolated() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("boom.js").write_str("boom").unwrap();
        temp.child("fine.js").write_str("var a = 1;").unwrap();

        let config = dir_config(temp.path()).build().unwrap();
        let flaky = |src: &str, _: &TransformOptions| {
            if src == "boom" {
                panic!("internal compiler error");
            }
            TransformOutcome::Success(src.replace(' ', ""))
        };
        let summary = Pipeline::new(config, flaky).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.fail_count, 1);
        temp.child("boom.js").assert("boom");
        temp.child("fine.js").assert("vara=1;");

        let failure = summary.failures().next().unwrap();
        assert!(failure.failure.as_ref().unwrap().to_string().contains("internal compiler error"));
    }

    #[test]
    fn test_unreadable_file_counts_as_failure() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("binary.js").write_binary(&[0xff, 0xfe, 0x00, 0x80]).unwrap();
        temp.child("ok.js").write_str("var a = 1;").unwrap();

        let config = dir_config(temp.path())
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, minify).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(summary.total_before, 1);
        let failure = summary.failures().next().unwrap();
        assert!(matches!(failure.failure, Some(FailureReason::Unreadable { .. })));
        assert_eq!(failure.lines.before, None);
    }

    #[test]
    fn test_accounting_modes() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();

        let config = dir_config(temp.path())
            .line_accounting(LineAccounting::Before)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, minify).unwrap().run().unwrap();
        assert_eq!(summary.outcomes[0].lines.before, Some(3));
        assert_eq!(summary.outcomes[0].lines.after, None);
        assert_eq!(summary.total_after, 0);

        let config = dir_config(temp.path())
            .line_accounting(LineAccounting::Off)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, minify).unwrap().run().unwrap();
        assert_eq!(summary.outcomes[0].lines.before, None);
        assert_eq!(summary.total_before, 0);
    }

    #[test]
    fn test_dry_run_leaves_files() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();

        let config = dir_config(temp.path())
            .dry_run(true)
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, minify).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.total_before, 3);
        assert_eq!(summary.total_after, 1);
        assert!(summary.dry_run);
        temp.child("a.js").assert(SOURCE);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let temp = assert_fs::TempDir::new().unwrap();
        for i in 0..7 {
            temp.child(format!("f{i}.js")).write_str(SOURCE).unwrap();
        }
        temp.child("bad.js").write_str("bad").unwrap();

        let transformer = |src: &str, opts: &TransformOptions| {
            if src == "bad" {
                reject(src, opts)
            } else {
                minify(src, opts)
            }
        };

        let config = dir_config(temp.path())
            .jobs(3)
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let pipeline = Pipeline::new(config, transformer).unwrap();
        let candidates = pipeline.locator.locate().unwrap().candidates;
        let summary = pipeline.run().unwrap();

        assert_eq!(summary.success_count, 7);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(summary.processed(), candidates.len());
        assert_eq!(summary.total_before, 7 * 3 + 1);
        assert_eq!(summary.total_after, 7 + 1);

        // Outcomes come back in locate order.
        let order: Vec<_> = summary.outcomes.iter().map(|o| o.path.clone()).collect();
        let expected: Vec<_> = candidates.iter().map(|c| c.path.clone()).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn test_delete_then_rename_strategy() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();

        let config = dir_config(temp.path())
            .replace_strategy(ReplaceStrategy::DeleteThenRename)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, minify).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 1);
        temp.child("a.js")
            .assert("function greet(name) {return 'Hello, ' + name;}");
    }

    #[test]
    fn test_conflicting_modes_abort_before_work() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();
        temp.child("files.txt").write_str("a.js\n").unwrap();

        let mut config = dir_config(temp.path()).build().unwrap();
        config.manifest = Some(temp.child("files.txt").path().to_path_buf());

        assert!(FileLocator::new(&config).locate().unwrap_err().is_config());
        assert!(Pipeline::new(config, minify).is_err());
        temp.child("a.js").assert(SOURCE);
    }

    #[test]
    fn test_missing_root_aborts_run() {
        let config = Config::builder()
            .scan_dir("/nonexistent/path/that/should/not/exist")
            .build()
            .unwrap();

        let result = Pipeline::new(config, minify).unwrap().run();
        assert!(result.unwrap_err().is_discovery());
    }

    #[test]
    fn test_report_is_written() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("src/a.js").write_str(SOURCE).unwrap();
        let report = temp.child("report.json");

        let config = dir_config(temp.child("src").path())
            .report_path(report.path())
            .build()
            .unwrap();
        Pipeline::new(config, minify).unwrap().run().unwrap();

        assert!(report.exists());
    }

    #[test]
    fn test_outcomes_follow_manifest_order() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("a.js").write_str(SOURCE).unwrap();
        temp.child("b.js").write_str(SOURCE).unwrap();
        temp.child("files.txt")
            .write_str("gone.js\na.js\nmissing.js\nb.js\nlost.js\n")
            .unwrap();

        for jobs in [1, 2] {
            let config = Config::builder()
                .manifest(temp.child("files.txt").path())
                .jobs(jobs)
                .dry_run(true)
                .build()
                .unwrap();
            let summary = Pipeline::new(config, minify).unwrap().run().unwrap();

            let order: Vec<_> = summary
                .outcomes
                .iter()
                .map(|o| o.path.file_name().unwrap().to_string_lossy().to_string())
                .collect();
            assert_eq!(order, vec!["gone.js", "a.js", "missing.js", "b.js", "lost.js"]);
            assert_eq!(summary.success_count, 2);
            assert_eq!(summary.fail_count, 3);
        }
    }

    #[test]
    fn test_replace_failure_reaches_summary() {
        let temp = assert_fs::TempDir::new().unwrap();
        temp.child("ok.js").write_str(SOURCE).unwrap();
        temp.child("swapped.js").write_str("swap").unwrap();
        let swapped = temp.child("swapped.js").path().to_path_buf();

        // Turns the original into a directory, which cannot be deleted as a file.
        let transformer = move |src: &str, opts: &TransformOptions| {
            if src == "swap" {
                fs::remove_file(&swapped).unwrap();
                fs::create_dir(&swapped).unwrap();
                return TransformOutcome::Success("var swapped;".to_string());
            }
            minify(src, opts)
        };

        let config = dir_config(temp.path())
            .replace_strategy(ReplaceStrategy::DeleteThenRename)
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, transformer).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.fail_count, 1);

        let failure = summary.failures().next().unwrap();
        assert!(failure.path.ends_with("swapped.js"));
        assert!(matches!(
            failure.failure,
            Some(FailureReason::Replace {
                error: crate::error::ReplaceError::DeleteFailed { .. }
            })
        ));
        assert!(!failure.failure.as_ref().unwrap().is_data_loss());
        assert_eq!(summary.data_loss_count(), 0);

        // The directory cannot be counted, so only ok.js contributes after.
        assert_eq!(failure.lines.before, Some(1));
        assert_eq!(failure.lines.after, None);
        assert_eq!(summary.total_before, 3 + 1);
        assert_eq!(summary.total_after, 1);
    }

    #[test]
    fn test_manifest_end_to_end() {
        let temp = assert_fs::TempDir::new().unwrap();
        let body: String = (1..=10).map(|i| format!("var v{i} = {i};\n")).collect();
        temp.child("a.src")
            .write_str(&format!("// ten statements\n\n{body}"))
            .unwrap();
        temp.child("files.txt").write_str("a.src\nmissing.src\n").unwrap();

        let halve = |src: &str, _: &TransformOptions| {
            let code: Vec<&str> = src
                .lines()
                .filter(|l| !l.trim().is_empty() && !l.starts_with("//"))
                .collect();
            let kept: Vec<&str> = code.iter().take(code.len() / 2).copied().collect();
            TransformOutcome::Success(kept.join("\n"))
        };

        let config = Config::builder()
            .manifest(temp.child("files.txt").path())
            .extension(".src")
            .line_accounting(LineAccounting::All)
            .build()
            .unwrap();
        let summary = Pipeline::new(config, halve).unwrap().run().unwrap();

        assert_eq!(summary.success_count, 1);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(summary.total_before, 10);
        assert_eq!(summary.total_after, 5);

        let on_disk = fs::read_to_string(temp.child("a.src").path()).unwrap();
        assert_eq!(on_disk.lines().count(), 5);
        assert!(on_disk.starts_with("var v1 = 1;"));
    }
}
