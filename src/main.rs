use anyhow::Context;
use clap::Parser;
use srcshrink::{
    CommandTransformer, Config, LineAccounting, Pipeline, ReplaceStrategy, TransformOptions,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "srcshrink",
    version,
    author,
    about = "Batch-transform source files and overwrite the originals",
    long_about = "Batch-transform source files through an external transformer and overwrite the originals.\n\n\
    Candidates come from a recursive directory scan or from a manifest listing one path per line. \
    Each file is piped through the transformer command; successful output replaces the original \
    through a verified temporary file. Failures never touch the original.\n\n\
    USAGE EXAMPLES:\n  \
      # Minify every .js file under ./static\n  \
      srcshrink --dir ./static -- terser --compress --mangle\n\n  \
      # Only files mentioning echarts, larger than 100 KB, with line counts\n  \
      srcshrink --dir ./static --keywords echarts,chart --size 100 --cloc all -- terser\n\n  \
      # Process the files listed in a manifest\n  \
      srcshrink --file bundles.txt --root ./webapp -- google-closure-compiler \\\n      \
      --language_in={input_dialect} --language_out={output_dialect} -O {optimization_level}"
)]
struct Cli {
    /// Directory to scan recursively (defaults to the current directory)
    #[arg(short, long, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Manifest file listing one root-relative path per line
    #[arg(short, long, value_name = "FILE")]
    file: Option<PathBuf>,

    /// Root that manifest entries resolve against (defaults to the manifest's directory)
    #[arg(long, value_name = "PATH")]
    root: Option<PathBuf>,

    /// Suffix a candidate path must end with
    #[arg(long, default_value = ".js")]
    ext: String,

    /// Skip paths containing this substring (can be used multiple times)
    #[arg(long, value_name = "SUBSTRING")]
    exclude: Vec<String>,

    /// Only process paths containing one of these comma-separated keywords
    #[arg(short, long, value_delimiter = ',')]
    keywords: Vec<String>,

    /// Only process files larger than this many kilobytes
    #[arg(short, long, value_name = "KB")]
    size: Option<u64>,

    /// Count logical lines (bare --cloc counts after processing)
    #[arg(long, value_enum, num_args = 0..=1, default_missing_value = "after", value_name = "MODE")]
    cloc: Option<CliCloc>,

    /// Language level of the input
    #[arg(long, default_value = "ECMASCRIPT_2020")]
    input_dialect: String,

    /// Language level of the output
    #[arg(long, default_value = "ECMASCRIPT5")]
    output_dialect: String,

    /// Optimization level passed to the transformer
    #[arg(long, default_value = "SIMPLE_OPTIMIZATIONS")]
    level: String,

    /// How transformed output replaces the original
    #[arg(long, value_enum, default_value = "atomic")]
    strategy: CliStrategy,

    /// Directory for temporary files (defaults to each original's directory)
    #[arg(long, value_name = "PATH")]
    scratch_dir: Option<PathBuf>,

    /// Worker threads (0 = one per CPU)
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Honour .gitignore files and skip hidden entries during directory scans
    #[arg(long)]
    respect_ignore: bool,

    /// Dry run (transform but don't replace files)
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON report of the run to this file
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Transformer program and its arguments
    ///
    /// Source text is written to the program's stdin and the transformed text
    /// is read from its stdout. Arguments may use the {input_dialect},
    /// {output_dialect} and {optimization_level} placeholders.
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliCloc {
    Before,
    After,
    All,
}

impl From<CliCloc> for LineAccounting {
    fn from(c: CliCloc) -> Self {
        match c {
            CliCloc::Before => Self::Before,
            CliCloc::After => Self::After,
            CliCloc::All => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliStrategy {
    /// Rename over the original in one step
    Atomic,
    /// Delete the original first, then rename (legacy behaviour)
    DeleteThenRename,
}

impl From<CliStrategy> for ReplaceStrategy {
    fn from(s: CliStrategy) -> Self {
        match s {
            CliStrategy::Atomic => Self::Atomic,
            CliStrategy::DeleteThenRename => Self::DeleteThenRename,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_tracing(cli.verbose)?;

    let mut builder = Config::builder()
        .extension(cli.ext)
        .exclude(cli.exclude)
        .keywords(cli.keywords)
        .line_accounting(cli.cloc.map_or(LineAccounting::Off, Into::into))
        .transform_options(TransformOptions {
            input_dialect: cli.input_dialect,
            output_dialect: cli.output_dialect,
            optimization_level: cli.level,
        })
        .replace_strategy(cli.strategy.into())
        .jobs(cli.jobs)
        .respect_ignore_files(cli.respect_ignore)
        .dry_run(cli.dry_run);

    if let Some(dir) = cli.dir {
        builder = builder.scan_dir(dir);
    }

    if let Some(manifest) = cli.file {
        builder = builder.manifest(manifest);
    }

    if let Some(root) = cli.root {
        builder = builder.manifest_root(root);
    }

    if let Some(kb) = cli.size {
        builder = builder.size_threshold_kb(kb);
    }

    if let Some(scratch) = cli.scratch_dir {
        builder = builder.scratch_dir(scratch);
    }

    if let Some(report) = cli.report {
        builder = builder.report_path(report);
    }

    let config = builder.build().context("Failed to build configuration")?;

    let (program, args) = cli
        .command
        .split_first()
        .context("No transformer command given")?;
    let transformer = CommandTransformer::new(program, args.to_vec());

    let summary = Pipeline::new(config, transformer)
        .context("Failed to create pipeline")?
        .run()
        .context("Run failed")?;

    summary.print_summary();

    Ok(())
}

fn setup_tracing(verbosity: u8) -> anyhow::Result<()> {
    let filter = match verbosity {
        0 => EnvFilter::new("srcshrink=info"),
        1 => EnvFilter::new("srcshrink=debug"),
        _ => EnvFilter::new("srcshrink=trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .init();

    Ok(())
}
