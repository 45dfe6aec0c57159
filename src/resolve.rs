//! Case resolution.
//!
//! Turns a parsed [`TestCase`] into concrete, normalized paths for one run:
//! the executable under `exec_dir`, fixtures under `assets_dir`, and fresh
//! capture files under `results_dir` named by the case ordinal.

use crate::schema::{RunConfig, TestCase, absolute};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// A case with every path made concrete for the current run.
#[derive(Debug, Clone)]
pub struct ResolvedCase<'a> {
    /// 1-based position of the case in the table.
    pub ordinal: usize,
    pub case: &'a TestCase,
    pub executable: PathBuf,
    pub working_dir: PathBuf,
    pub input: PathBuf,
    pub expected_stdout: PathBuf,
    pub expected_stderr: PathBuf,
    pub actual_stdout: PathBuf,
    pub actual_stderr: PathBuf,
    /// Shell-equivalent rendering of the invocation, for display only.
    pub command_line: String,
}

impl ResolvedCase<'_> {
    /// The argument vector passed to the executable.
    pub fn arguments(&self) -> &[String] {
        &self.case.arguments
    }
}

/// Name of the file capturing a case's standard output.
pub fn stdout_capture_name(ordinal: usize) -> String {
    format!("test.{ordinal}.out")
}

/// Name of the file capturing a case's standard error.
pub fn stderr_capture_name(ordinal: usize) -> String {
    format!("test.{ordinal}.err")
}

/// Resolve one case. Nothing is checked for existence here; missing files
/// surface when the case executes or is compared.
pub fn resolve<'a>(case: &'a TestCase, config: &RunConfig, ordinal: usize) -> ResolvedCase<'a> {
    let executable = absolute(&config.exec_dir, Path::new(&case.executable));
    let input = absolute(&config.assets_dir, Path::new(&case.input_file));
    let expected_stdout = absolute(&config.assets_dir, Path::new(&case.expected_stdout_file));
    let expected_stderr = absolute(&config.assets_dir, Path::new(&case.expected_stderr_file));
    let actual_stdout = absolute(&config.results_dir, Path::new(&stdout_capture_name(ordinal)));
    let actual_stderr = absolute(&config.results_dir, Path::new(&stderr_capture_name(ordinal)));

    let show = |p: &Path| display_path(p, config);
    let mut command_line = show(&executable);
    if !case.argument_string.trim().is_empty() {
        command_line.push(' ');
        command_line.push_str(case.argument_string.trim());
    }
    command_line.push_str(&format!(
        " < {} 1> {} 2> {}",
        show(&input),
        show(&actual_stdout),
        show(&actual_stderr)
    ));

    ResolvedCase {
        ordinal,
        case,
        executable,
        working_dir: config.exec_dir.clone(),
        input,
        expected_stdout,
        expected_stderr,
        actual_stdout,
        actual_stderr,
        command_line,
    }
}

/// Render a path for display in a command line.
///
/// With `full_paths` the absolute path is shown as is. Otherwise paths under
/// `exec_dir` are shown as `./relative` and the result is shell-quoted.
pub fn display_path(path: &Path, config: &RunConfig) -> String {
    if config.full_paths {
        return path.display().to_string();
    }

    let shown = match path.strip_prefix(&config.exec_dir) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => format!("./{}", rel.display()),
        Err(_) => path.display().to_string(),
    };
    match shlex::try_quote(&shown) {
        Ok(Cow::Borrowed(_)) => shown,
        Ok(Cow::Owned(quoted)) => quoted,
        // Only NUL bytes are unquotable; show the raw path instead.
        Err(_) => shown,
    }
}
