//! Test table parser.
//!
//! A test table holds one case per line as pipe-delimited fields:
//!
//! ```text
//! executable|exit_code|input|expected_stdout|expected_stderr|<reserved>|<reserved>|arguments|label
//! ```
//!
//! Blank lines and lines starting with `#` are ignored. The two reserved
//! fields are accepted and discarded.

use crate::schema::TestCase;

/// Field delimiter.
pub const DELIMITER: char = '|';

/// Number of fields every case line must have.
pub const FIELD_COUNT: usize = 9;

/// A malformed table line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableError {
    /// 1-based line number in the table source.
    pub line: usize,
    /// The offending line, trimmed.
    pub source_line: String,
    pub kind: TableErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableErrorKind {
    /// Wrong number of `|` separated fields.
    FieldCount(usize),
    /// Exit code field is not an integer.
    ExitCode(String),
    /// Executable field is empty.
    EmptyExecutable,
    /// Argument string has unbalanced quotes or a dangling escape.
    Arguments(String),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            TableErrorKind::FieldCount(n) => {
                write!(f, "expected {FIELD_COUNT} fields separated by '{DELIMITER}', found {n}")?
            }
            TableErrorKind::ExitCode(s) => write!(f, "exit code {s:?} is not an integer")?,
            TableErrorKind::EmptyExecutable => write!(f, "executable field is empty")?,
            TableErrorKind::Arguments(s) => write!(f, "cannot split arguments {s:?}")?,
        }
        write!(f, "\n  {}", self.source_line)
    }
}

impl std::error::Error for TableError {}

/// Parse a whole table. The first malformed line aborts the parse, so a
/// successful result always carries the full, stably indexed case list.
pub fn parse_table(source: &str) -> Result<Vec<TestCase>, TableError> {
    let mut cases = Vec::new();

    for (idx, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        cases.push(parse_line(idx + 1, line)?);
    }

    tracing::debug!(cases = cases.len(), "parsed test table");
    Ok(cases)
}

fn parse_line(line_no: usize, line: &str) -> Result<TestCase, TableError> {
    let error = |kind| TableError {
        line: line_no,
        source_line: line.to_string(),
        kind,
    };

    let fields: Vec<&str> = line.split(DELIMITER).collect();
    let [executable, code, input, stdout, stderr, _, _, arguments, label] = fields[..] else {
        return Err(error(TableErrorKind::FieldCount(fields.len())));
    };

    if executable.trim().is_empty() {
        return Err(error(TableErrorKind::EmptyExecutable));
    }
    let expected_exit_code = code
        .trim()
        .parse::<i32>()
        .map_err(|_| error(TableErrorKind::ExitCode(code.to_string())))?;
    let argv = shlex::split(arguments)
        .ok_or_else(|| error(TableErrorKind::Arguments(arguments.to_string())))?;

    Ok(TestCase {
        executable: executable.trim().to_string(),
        expected_exit_code,
        input_file: input.trim().to_string(),
        expected_stdout_file: stdout.trim().to_string(),
        expected_stderr_file: stderr.trim().to_string(),
        argument_string: arguments.to_string(),
        arguments: argv,
        label: label.to_string(),
        line: line_no,
        raw_definition: line.to_string(),
    })
}
