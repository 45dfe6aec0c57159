mod compare;
mod exec;
mod loader;
mod report;
mod resolve;
mod runner;
mod schema;
mod table;

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use termcolor::{ColorChoice, StandardStream};

/// Exit status when at least one case failed.
const EXIT_FAILED: u8 = 1;

/// Exit status for configuration and setup errors.
const EXIT_ERROR: u8 = 2;

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable output, detailed or terse
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum ColorMode {
    /// Color when stdout is a terminal
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn choice(self) -> ColorChoice {
        match self {
            ColorMode::Auto if std::io::stdout().is_terminal() => ColorChoice::Auto,
            ColorMode::Auto => ColorChoice::Never,
            ColorMode::Always => ColorChoice::Always,
            ColorMode::Never => ColorChoice::Never,
        }
    }
}

#[derive(Parser)]
#[command(name = "goldtest")]
#[command(about = "A golden-fixture test harness for executables")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cases of a test table
    Run {
        /// Path to the test table
        #[arg(long, default_value = loader::TABLE_FILENAME)]
        table: PathBuf,
        /// Show detailed output for each test (commands, diffs)
        #[arg(short, long)]
        details: bool,
        /// Time limit, in seconds, for each test
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        timeout: Option<u64>,
        /// Use the full path for all files in displayed commands
        #[arg(long)]
        full_path: bool,
        /// Directory for captured output (default: ./testres)
        #[arg(long)]
        results_dir: Option<PathBuf>,
        /// Directory holding fixtures (default: <table dir>/assets)
        #[arg(long)]
        assets_dir: Option<PathBuf>,
        /// Directory executables are resolved against (default: current directory)
        #[arg(long)]
        exec_dir: Option<PathBuf>,
        /// Output format
        #[arg(short, long, default_value = "human")]
        output: OutputFormat,
        /// When to color human output
        #[arg(long, default_value = "auto")]
        color: ColorMode,
        /// The specific test to run (1-based)
        index: Option<usize>,
    },
    /// Parse a test table and list its cases without running them
    Validate {
        /// Path to the test table
        #[arg(long, default_value = loader::TABLE_FILENAME)]
        table: PathBuf,
    },
    /// Scaffold a test table, suite config and assets directory
    Init {
        /// Directory to create the files in
        #[arg(default_value = ".")]
        dir: PathBuf,
    },
    /// Output the suite config schema
    Schema,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run {
            table,
            details,
            timeout,
            full_path,
            results_dir,
            assets_dir,
            exec_dir,
            output,
            color,
            index,
        } => {
            let overrides = schema::ConfigOverrides {
                results_dir,
                assets_dir,
                exec_dir,
                timeout,
                details,
                full_paths: full_path,
            };
            run(&table, &overrides, output, color, index)
        }
        Command::Validate { table } => validate(&table),
        Command::Init { dir } => init(&dir),
        Command::Schema => schema_json(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

type CliResult = Result<ExitCode, Box<dyn std::error::Error>>;

fn table_dir(table: &Path) -> &Path {
    match table.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn run(
    table: &Path,
    overrides: &schema::ConfigOverrides,
    output: OutputFormat,
    color: ColorMode,
    index: Option<usize>,
) -> CliResult {
    // Everything that can be misconfigured is checked before any case runs.
    let cases = loader::load_table(table)?;
    let dir = table_dir(table);
    let suite = loader::load_suite_config(dir)?;
    let cwd = std::env::current_dir()?;
    let config = schema::RunConfig::layered(&cwd, dir, suite.as_ref(), overrides);
    tracing::debug!(?config, cases = cases.len(), "configuration resolved");

    let selection = runner::Selection::from(index);
    let summary = match output {
        OutputFormat::Human => {
            let out = StandardStream::stdout(color.choice());
            let mut report = report::HumanReport::new(out, &config);
            runner::run_cases(&cases, &config, selection, &mut report)?
        }
        OutputFormat::Json => {
            let summary = runner::run_cases(&cases, &config, selection, &mut runner::Silent)?;
            println!("{}", report::format_json(&summary)?);
            summary
        }
        OutputFormat::Junit => {
            let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
            let summary = runner::run_cases(&cases, &config, selection, &mut runner::Silent)?;
            print!(
                "{}",
                report::format_junit_xml(&summary, &table.display().to_string(), &timestamp)
            );
            summary
        }
    };

    Ok(if summary.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    })
}

fn validate(table: &Path) -> CliResult {
    let cases = loader::load_table(table)?;
    loader::load_suite_config(table_dir(table))?;

    for (i, case) in cases.iter().enumerate() {
        let label = if case.label.is_empty() {
            "(unlabeled)"
        } else {
            case.label.as_str()
        };
        println!("{:>4}  {label}", i + 1);
    }
    println!("\n{} ({} tests) is valid", table.display(), cases.len());
    Ok(ExitCode::SUCCESS)
}

const TABLE_TEMPLATE: &str = r#"# goldtest test table
#
# One test per line, fields separated by '|':
#   executable|exit code|input|expected stdout|expected stderr|||arguments|label
#
# The executable is resolved against the exec directory (default: the
# current directory); input and expected files against the assets directory.
# The arguments are split like a shell would, so quoting works.

/bin/sh|0|empty|hello.out|empty|||-c 'echo hello'|Says hello
"#;

const CONFIG_TEMPLATE: &str = r#"# goldtest suite configuration. Relative paths are relative to this file.

# results_dir: testres
# assets_dir: assets
# exec_dir: .
timeout: 5
# details: false
# full_paths: false
"#;

fn init(dir: &Path) -> CliResult {
    let table_path = dir.join(loader::TABLE_FILENAME);
    let config_path = dir.join(loader::SUITE_CONFIG_FILENAMES[0]);
    let assets = dir.join(schema::DEFAULT_ASSETS_DIR);

    for path in [&table_path, &config_path, &assets] {
        if path.exists() {
            return Err(format!("file already exists: {}", path.display()).into());
        }
    }

    fs::create_dir_all(&assets)?;
    fs::write(assets.join("empty"), "")?;
    fs::write(assets.join("hello.out"), "hello\n")?;
    fs::write(&config_path, CONFIG_TEMPLATE)?;
    fs::write(&table_path, TABLE_TEMPLATE)?;

    for path in [&table_path, &config_path, &assets] {
        println!("Created: {}", path.display());
    }
    Ok(ExitCode::SUCCESS)
}

fn schema_json() -> CliResult {
    let schema = schema::generate_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(ExitCode::SUCCESS)
}
