//! Schema definitions for goldtest.
//!
//! This module defines the suite configuration file, the test case records
//! parsed from a test table, and the effective configuration of a run.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Default timeout per case in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default results directory, relative to the working directory.
pub const DEFAULT_RESULTS_DIR: &str = "testres";

/// Default assets directory, relative to the directory holding the table.
pub const DEFAULT_ASSETS_DIR: &str = "assets";

/// Suite-level configuration loaded from `goldtest.yaml` next to the test table.
///
/// Every field is optional; unset fields fall back to built-in defaults and
/// are in turn overridden by command line flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// Directory receiving `test.<N>.out` / `test.<N>.err` capture files.
    #[serde(default)]
    pub results_dir: Option<PathBuf>,

    /// Directory holding input and expected-output fixtures.
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,

    /// Directory executables are resolved against; also the child's working directory.
    #[serde(default)]
    pub exec_dir: Option<PathBuf>,

    /// Time limit in seconds for each case. Zero is rejected.
    #[serde(default)]
    pub timeout: Option<NonZeroU64>,

    /// Show detailed output (commands, diffs) for each case.
    #[serde(default)]
    pub details: Option<bool>,

    /// Show absolute, unquoted paths in displayed command lines.
    #[serde(default)]
    pub full_paths: Option<bool>,
}

/// One row of the test table.
///
/// Cases are immutable once parsed; their position in the table defines
/// their ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCase {
    /// Program under test, relative to the exec directory unless absolute.
    pub executable: String,
    /// Exit code the program must finish with.
    pub expected_exit_code: i32,
    /// File fed to standard input, relative to the assets directory.
    pub input_file: String,
    /// Golden standard output, relative to the assets directory.
    pub expected_stdout_file: String,
    /// Golden standard error, relative to the assets directory.
    pub expected_stderr_file: String,
    /// Argument string exactly as written in the table.
    pub argument_string: String,
    /// Argument vector split from `argument_string` with shell word rules.
    pub arguments: Vec<String>,
    /// Human readable name; may be empty.
    pub label: String,
    /// 1-based line number in the table source.
    pub line: usize,
    /// The table line this case was parsed from.
    pub raw_definition: String,
}

/// Effective configuration of a run after layering defaults, the suite
/// config file, and command line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub results_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub exec_dir: PathBuf,
    pub timeout: Duration,
    pub details: bool,
    pub full_paths: bool,
}

/// Values given on the command line. `None` leaves the lower layer in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub results_dir: Option<PathBuf>,
    pub assets_dir: Option<PathBuf>,
    pub exec_dir: Option<PathBuf>,
    pub timeout: Option<u64>,
    pub details: bool,
    pub full_paths: bool,
}

impl RunConfig {
    /// Layer defaults, an optional suite config and CLI overrides.
    ///
    /// `cwd` anchors CLI paths and the default results/exec roots,
    /// `table_dir` anchors the default assets root and the suite config's
    /// relative paths.
    pub fn layered(
        cwd: &Path,
        table_dir: &Path,
        suite: Option<&SuiteConfig>,
        overrides: &ConfigOverrides,
    ) -> Self {
        let table_dir = absolute(cwd, table_dir);
        let suite_path = |p: Option<&PathBuf>| p.map(|p| absolute(&table_dir, p));
        let cli_path = |p: Option<&PathBuf>| p.map(|p| absolute(cwd, p));

        let results_dir = cli_path(overrides.results_dir.as_ref())
            .or_else(|| suite_path(suite.and_then(|s| s.results_dir.as_ref())))
            .unwrap_or_else(|| absolute(cwd, Path::new(DEFAULT_RESULTS_DIR)));
        let assets_dir = cli_path(overrides.assets_dir.as_ref())
            .or_else(|| suite_path(suite.and_then(|s| s.assets_dir.as_ref())))
            .unwrap_or_else(|| absolute(&table_dir, Path::new(DEFAULT_ASSETS_DIR)));
        let exec_dir = cli_path(overrides.exec_dir.as_ref())
            .or_else(|| suite_path(suite.and_then(|s| s.exec_dir.as_ref())))
            .unwrap_or_else(|| normalize(cwd));

        let timeout_secs = overrides
            .timeout
            .or(suite.and_then(|s| s.timeout).map(NonZeroU64::get))
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            results_dir,
            assets_dir,
            exec_dir,
            timeout: Duration::from_secs(timeout_secs),
            details: overrides.details || suite.and_then(|s| s.details).unwrap_or(false),
            full_paths: overrides.full_paths || suite.and_then(|s| s.full_paths).unwrap_or(false),
        }
    }
}

/// Join `path` onto `base` unless it is already absolute, then normalize.
pub fn absolute(base: &Path, path: &Path) -> PathBuf {
    normalize(&base.join(path))
}

/// Lexically normalize a path: drop `.` components, fold `..` into the
/// preceding component and collapse redundant separators.
///
/// The filesystem is never consulted, so symlinks are not resolved.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Generate the JSON Schema for the suite configuration file.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(SuiteConfig)
}
