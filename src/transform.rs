//! The transformation seam.
//!
//! The pipeline never looks inside a transformation: it hands source text and
//! an opaque [`TransformOptions`] bag to a [`Transformer`] and gets back a
//! [`TransformOutcome`].

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

const DEFAULT_INPUT_DIALECT: &str = "ECMASCRIPT_2020";
const DEFAULT_OUTPUT_DIALECT: &str = "ECMASCRIPT5";
const DEFAULT_OPTIMIZATION_LEVEL: &str = "SIMPLE_OPTIMIZATIONS";

/// Options forwarded unchanged to the transformer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOptions {
    /// Language level of the input
    pub input_dialect: String,
    /// Language level of the output
    pub output_dialect: String,
    /// Optimization level understood by the transformer
    pub optimization_level: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            input_dialect: DEFAULT_INPUT_DIALECT.to_string(),
            output_dialect: DEFAULT_OUTPUT_DIALECT.to_string(),
            optimization_level: DEFAULT_OPTIMIZATION_LEVEL.to_string(),
        }
    }
}

/// Result of transforming one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformOutcome {
    /// Transformed source text
    Success(String),
    /// Ordered diagnostics explaining the failure
    Failure(Vec<String>),
}

impl TransformOutcome {
    /// Creates a failure with a single diagnostic.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(vec![message.into()])
    }

    /// Returns true if the transformation succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Turns source text into transformed text.
///
/// Implementations must be thread-safe; the pipeline may call them from
/// several workers when `jobs > 1`.
pub trait Transformer: Send + Sync {
    /// Transforms `source` using `options`.
    fn transform(&self, source: &str, options: &TransformOptions) -> TransformOutcome;
}

impl<F> Transformer for F
where
    F: Fn(&str, &TransformOptions) -> TransformOutcome + Send + Sync,
{
    fn transform(&self, source: &str, options: &TransformOptions) -> TransformOutcome {
        self(source, options)
    }
}

/// Runs an external program as the transformer.
///
/// The source is written to the program's stdin and the transformed text is
/// read from its stdout. A non-zero exit turns stderr into diagnostics.
/// Arguments may contain `{input_dialect}`, `{output_dialect}` and
/// `{optimization_level}` placeholders.
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandTransformer {
    /// Creates a transformer running `program` with `args`.
    #[must_use]
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn expand_args(&self, options: &TransformOptions) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input_dialect}", &options.input_dialect)
                    .replace("{output_dialect}", &options.output_dialect)
                    .replace("{optimization_level}", &options.optimization_level)
            })
            .collect()
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

impl Transformer for CommandTransformer {
    fn transform(&self, source: &str, options: &TransformOptions) -> TransformOutcome {
        let args = self.expand_args(options);
        debug!(program = %self.program.display(), ?args, "spawning transformer");

        let mut child = match Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                return TransformOutcome::failure(format!(
                    "failed to start '{}': {e}",
                    self.program_name()
                ));
            }
        };

        let Some(mut stdin) = child.stdin.take() else {
            return TransformOutcome::failure("failed to capture transformer stdin");
        };

        // Feed stdin from a separate thread so a full stdout pipe cannot deadlock us.
        let input = source.to_owned();
        let feeder = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = match child.wait_with_output() {
            Ok(output) => output,
            Err(e) => {
                return TransformOutcome::failure(format!(
                    "failed to wait for '{}': {e}",
                    self.program_name()
                ));
            }
        };

        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => trace!("transformer closed stdin early: {e}"),
            Err(_) => return TransformOutcome::failure("stdin writer thread panicked"),
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let diagnostics: Vec<String> = stderr
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect();

        if !output.status.success() {
            if diagnostics.is_empty() {
                return TransformOutcome::failure(format!(
                    "'{}' exited with {}",
                    self.program_name(),
                    output.status
                ));
            }
            return TransformOutcome::Failure(diagnostics);
        }

        for warning in &diagnostics {
            debug!("transformer: {warning}");
        }

        match String::from_utf8(output.stdout) {
            Ok(text) => TransformOutcome::Success(text),
            Err(_) => TransformOutcome::failure(format!(
                "'{}' produced output that is not valid UTF-8",
                self.program_name()
            )),
        }
    }
}
