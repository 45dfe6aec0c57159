//! Outcome evaluation.
//!
//! Compares a finished run against its expectations: the exit code, and the
//! captured stdout/stderr against the golden fixtures as a unified line diff.

use crate::exec::ExecutionOutcome;
use crate::resolve::ResolvedCase;
use serde::Serialize;
use similar::{ChangeTag, DiffOp, TextDiff};
use std::path::Path;

/// Lines of context around each hunk.
pub const CONTEXT_LINES: usize = 3;

/// A captured output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub const ALL: [Stream; 2] = [Stream::Stdout, Stream::Stderr];

    pub fn name(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

/// Role of one line in a unified diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffTag {
    /// `---` / `+++` file header.
    Header,
    /// `@@ -a,b +c,d @@` hunk header.
    Hunk,
    /// Line present in both files.
    Context,
    /// Line only in the expected file.
    Removed,
    /// Line only in the actual file.
    Added,
    /// `\ No newline at end of file`.
    NoNewline,
}

impl DiffTag {
    /// Leading marker a unified diff puts before lines of this kind.
    pub fn marker(self) -> &'static str {
        match self {
            DiffTag::Header | DiffTag::Hunk | DiffTag::NoNewline => "",
            DiffTag::Context => " ",
            DiffTag::Removed => "-",
            DiffTag::Added => "+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffLine {
    pub tag: DiffTag,
    /// Line text without its marker or trailing newline.
    pub text: String,
}

impl std::fmt::Display for DiffLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.tag.marker(), self.text)
    }
}

/// Result of comparing one stream against its fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Comparison {
    /// Not compared because the run timed out.
    Skipped,
    Matches,
    Differs { diff: Vec<DiffLine> },
    /// Expected or actual file could not be read.
    Unreadable { path: String, reason: String },
}

impl Comparison {
    pub fn matches(&self) -> bool {
        matches!(self, Comparison::Matches)
    }
}

/// Exit code check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitCheck {
    pub expected: i32,
    /// `None` when the run timed out.
    pub actual: Option<i32>,
}

impl ExitCheck {
    pub fn matches(&self) -> bool {
        self.actual == Some(self.expected)
    }
}

/// Everything known about a case after it ran.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub outcome: ExecutionOutcome,
    pub exit: ExitCheck,
    pub stdout: Comparison,
    pub stderr: Comparison,
}

impl Evaluation {
    /// The case passes only if the program actually ran to completion with
    /// the expected exit code and both streams match. Launch failures and
    /// timeouts never pass, whatever code they report.
    pub fn passed(&self) -> bool {
        matches!(self.outcome, ExecutionOutcome::Exited { .. })
            && self.exit.matches()
            && self.stdout.matches()
            && self.stderr.matches()
    }

    pub fn stream(&self, stream: Stream) -> &Comparison {
        match stream {
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }

    /// One line per problem, suitable for terse listings and JUnit messages.
    pub fn failures(&self) -> Vec<String> {
        let mut failures = Vec::new();
        match &self.outcome {
            ExecutionOutcome::TimedOut { after } => {
                failures.push(format!("Execution timed out after {after} seconds"));
                return failures;
            }
            ExecutionOutcome::LaunchFailed { reason, .. } => failures.push(reason.clone()),
            ExecutionOutcome::Exited { .. } => {}
        }
        if let Some(actual) = self.exit.actual
            && !self.exit.matches()
        {
            failures.push(format!(
                "Wrong exit code; got {actual} but expecting {}",
                self.exit.expected
            ));
        }
        for stream in Stream::ALL {
            match self.stream(stream) {
                Comparison::Differs { .. } => failures.push(format!("{} differs", stream.name())),
                Comparison::Unreadable { path, reason } => {
                    failures.push(format!("{}: cannot read {path}: {reason}", stream.name()))
                }
                Comparison::Matches | Comparison::Skipped => {}
            }
        }
        failures
    }
}

/// Evaluate a finished run.
///
/// Must only be called once the child has exited or been killed, so the
/// capture files are final.
pub fn evaluate(outcome: ExecutionOutcome, resolved: &ResolvedCase<'_>) -> Evaluation {
    let exit = ExitCheck {
        expected: resolved.case.expected_exit_code,
        actual: outcome.exit_code(),
    };

    let (stdout, stderr) = if outcome.timed_out() {
        (Comparison::Skipped, Comparison::Skipped)
    } else {
        (
            compare_files(&resolved.expected_stdout, &resolved.actual_stdout),
            compare_files(&resolved.expected_stderr, &resolved.actual_stderr),
        )
    };

    tracing::debug!(
        case = resolved.ordinal,
        exit_ok = exit.matches(),
        stdout_ok = stdout.matches(),
        stderr_ok = stderr.matches(),
        "evaluated"
    );

    Evaluation {
        outcome,
        exit,
        stdout,
        stderr,
    }
}

/// Compare an expected fixture with an actual capture file.
pub fn compare_files(expected: &Path, actual: &Path) -> Comparison {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|e| Comparison::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    };
    let expected_bytes = match read(expected) {
        Ok(b) => b,
        Err(c) => return c,
    };
    let actual_bytes = match read(actual) {
        Ok(b) => b,
        Err(c) => return c,
    };

    if expected_bytes == actual_bytes {
        return Comparison::Matches;
    }
    let diff = unified_diff(
        &expected_bytes,
        &actual_bytes,
        &format!("{} (expected)", expected.display()),
        &format!("{} (actual)", actual.display()),
    );
    Comparison::Differs { diff }
}

/// Line-level unified diff of two byte buffers.
///
/// Lines keep their terminators, so a missing final newline or a CRLF/LF
/// mismatch is a difference. Returns an empty vector when the inputs are
/// identical.
pub fn unified_diff(expected: &[u8], actual: &[u8], from: &str, to: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(expected, actual);
    let groups = diff.grouped_ops(CONTEXT_LINES);
    if groups.is_empty() {
        return Vec::new();
    }

    let mut lines = vec![
        DiffLine {
            tag: DiffTag::Header,
            text: format!("--- {from}"),
        },
        DiffLine {
            tag: DiffTag::Header,
            text: format!("+++ {to}"),
        },
    ];

    for group in &groups {
        lines.push(DiffLine {
            tag: DiffTag::Hunk,
            text: hunk_header(group),
        });
        for op in group {
            for change in diff.iter_changes(op) {
                let tag = match change.tag() {
                    ChangeTag::Equal => DiffTag::Context,
                    ChangeTag::Delete => DiffTag::Removed,
                    ChangeTag::Insert => DiffTag::Added,
                };
                lines.push(DiffLine {
                    tag,
                    text: render_line(change.value()),
                });
                if change.missing_newline() {
                    lines.push(DiffLine {
                        tag: DiffTag::NoNewline,
                        text: "\\ No newline at end of file".to_string(),
                    });
                }
            }
        }
    }
    lines
}

/// Printable form of one diff line: the newline is dropped, a carriage
/// return shows as `^M`, and lines that are not UTF-8 are byte-escaped.
fn render_line(value: &[u8]) -> String {
    let line = value.strip_suffix(b"\n").unwrap_or(value);
    let (line, carriage_return) = match line.strip_suffix(b"\r") {
        Some(line) => (line, true),
        None => (line, false),
    };
    let mut text = match std::str::from_utf8(line) {
        Ok(s) => s.to_string(),
        Err(_) => line.escape_ascii().to_string(),
    };
    if carriage_return {
        text.push_str("^M");
    }
    text
}

fn hunk_header(group: &[DiffOp]) -> String {
    let (Some(first), Some(last)) = (group.first(), group.last()) else {
        return "@@ @@".to_string();
    };
    let old = first.old_range().start..last.old_range().end;
    let new = first.new_range().start..last.new_range().end;
    format!(
        "@@ -{} +{} @@",
        format_range(old.start, old.len()),
        format_range(new.start, new.len())
    )
}

/// Range in unified diff notation: 1-based start, length omitted when 1,
/// and an empty range anchored at the line before it.
fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        n => format!("{},{n}", start + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tagged(diff: &[DiffLine], tag: DiffTag) -> Vec<&str> {
        diff.iter()
            .filter(|l| l.tag == tag)
            .map(|l| l.text.as_str())
            .collect()
    }

    #[test]
    fn identical_texts_have_no_diff() {
        assert!(unified_diff(b"a\nb\n", b"a\nb\n", "x", "y").is_empty());
        assert!(unified_diff(b"", b"", "x", "y").is_empty());
    }

    #[test]
    fn single_line_change() {
        let diff = unified_diff(b"Player A discarded 3.\n", b"Player A discarded 4.\n", "e", "a");
        assert_eq!(tagged(&diff, DiffTag::Removed), vec!["Player A discarded 3."]);
        assert_eq!(tagged(&diff, DiffTag::Added), vec!["Player A discarded 4."]);
        assert!(tagged(&diff, DiffTag::Context).is_empty());
        assert_eq!(tagged(&diff, DiffTag::Hunk), vec!["@@ -1 +1 @@"]);
        assert_eq!(tagged(&diff, DiffTag::Header), vec!["--- e", "+++ a"]);
    }

    #[test]
    fn context_is_limited_around_changes() {
        let expected: String = (1..=10).map(|i| format!("{i}\n")).collect();
        let actual = expected.replace("5\n", "five\n");
        let diff = unified_diff(expected.as_bytes(), actual.as_bytes(), "e", "a");

        assert_eq!(tagged(&diff, DiffTag::Hunk), vec!["@@ -2,7 +2,7 @@"]);
        assert_eq!(tagged(&diff, DiffTag::Context), vec!["2", "3", "4", "6", "7", "8"]);
        let rendered: Vec<String> = diff.iter().map(ToString::to_string).collect();
        assert!(rendered.contains(&"-5".to_string()));
        assert!(rendered.contains(&"+five".to_string()));
    }

    #[test]
    fn far_apart_changes_make_two_hunks() {
        let expected: String = (1..=20).map(|i| format!("{i}\n")).collect();
        let actual = expected.replace("2\n", "two\n").replace("19\n", "nineteen\n");
        let diff = unified_diff(expected.as_bytes(), actual.as_bytes(), "e", "a");
        assert_eq!(tagged(&diff, DiffTag::Hunk).len(), 2);
    }

    #[test]
    fn insertion_into_empty_file() {
        let diff = unified_diff(b"", b"hello\n", "e", "a");
        assert_eq!(tagged(&diff, DiffTag::Hunk), vec!["@@ -0,0 +1 @@"]);
        assert_eq!(tagged(&diff, DiffTag::Added), vec!["hello"]);
    }

    #[test]
    fn missing_trailing_newline_is_a_difference() {
        let diff = unified_diff(b"done\n", b"done", "e", "a");
        assert!(!diff.is_empty());
        assert_eq!(tagged(&diff, DiffTag::NoNewline).len(), 1);
    }

    #[test]
    fn carriage_returns_stay_visible() {
        let diff = unified_diff(b"x\r\n", b"x\n", "e", "a");
        assert_eq!(tagged(&diff, DiffTag::Removed), vec!["x^M"]);
        assert_eq!(tagged(&diff, DiffTag::Added), vec!["x"]);
    }

    #[test]
    fn invalid_utf8_lines_are_escaped() {
        let diff = unified_diff(b"ok\n\xff\n", b"ok\n\xfe\n", "e", "a");
        assert_eq!(tagged(&diff, DiffTag::Context), vec!["ok"]);
        assert_eq!(tagged(&diff, DiffTag::Removed), vec!["\\xff"]);
        assert_eq!(tagged(&diff, DiffTag::Added), vec!["\\xfe"]);
    }

    #[test]
    fn compare_files_distinguishes_invalid_bytes() {
        let dir = tempdir().unwrap();
        let expected = dir.path().join("expected");
        let actual = dir.path().join("actual");
        std::fs::write(&expected, [0xff, b'\n']).unwrap();
        std::fs::write(&actual, [0xfe, b'\n']).unwrap();

        assert!(!compare_files(&expected, &actual).matches());
        assert!(compare_files(&expected, &expected).matches());
    }

    #[test]
    fn compare_files_reports_unreadable_fixture() {
        let dir = tempdir().unwrap();
        let actual = dir.path().join("actual");
        std::fs::write(&actual, "x\n").unwrap();

        let result = compare_files(&dir.path().join("missing"), &actual);
        match result {
            Comparison::Unreadable { path, .. } => assert!(path.ends_with("missing")),
            other => panic!("expected unreadable, got {other:?}"),
        }
    }

    #[test]
    fn compare_files_match_and_differ() {
        let dir = tempdir().unwrap();
        let expected = dir.path().join("expected");
        let same = dir.path().join("same");
        let other = dir.path().join("other");
        std::fs::write(&expected, "a\nb\n").unwrap();
        std::fs::write(&same, "a\nb\n").unwrap();
        std::fs::write(&other, "a\nc\n").unwrap();

        assert!(compare_files(&expected, &same).matches());
        match compare_files(&expected, &other) {
            Comparison::Differs { diff } => {
                assert!(diff[0].text.ends_with("expected (expected)"));
                assert!(diff[1].text.ends_with("other (actual)"));
            }
            c => panic!("expected differs, got {c:?}"),
        }
    }

    fn evaluation(outcome: ExecutionOutcome, expected: i32) -> Evaluation {
        let exit = ExitCheck {
            expected,
            actual: outcome.exit_code(),
        };
        let timed_out = outcome.timed_out();
        let stream = || {
            if timed_out {
                Comparison::Skipped
            } else {
                Comparison::Matches
            }
        };
        Evaluation {
            outcome,
            exit,
            stdout: stream(),
            stderr: stream(),
        }
    }

    #[test]
    fn verdict_requires_every_check() {
        let ok = evaluation(ExecutionOutcome::Exited { code: 2, signal: None }, 2);
        assert!(ok.passed());
        assert!(ok.failures().is_empty());

        let wrong_code = evaluation(ExecutionOutcome::Exited { code: 0, signal: None }, 2);
        assert!(!wrong_code.passed());
        assert_eq!(
            wrong_code.failures(),
            vec!["Wrong exit code; got 0 but expecting 2"]
        );

        let mut bad_stderr = evaluation(ExecutionOutcome::Exited { code: 2, signal: None }, 2);
        bad_stderr.stderr = Comparison::Differs { diff: Vec::new() };
        assert!(!bad_stderr.passed());
        assert_eq!(bad_stderr.failures(), vec!["stderr differs"]);
    }

    #[test]
    fn timeout_always_fails() {
        let timed_out = evaluation(ExecutionOutcome::TimedOut { after: 2 }, 0);
        assert!(!timed_out.passed());
        assert_eq!(timed_out.stdout, Comparison::Skipped);
        assert_eq!(
            timed_out.failures(),
            vec!["Execution timed out after 2 seconds"]
        );
    }

    #[test]
    fn launch_failure_reports_reason_and_code() {
        let failed = evaluation(
            ExecutionOutcome::LaunchFailed {
                code: 127,
                reason: "cannot run ./p".to_string(),
            },
            0,
        );
        assert!(!failed.passed());
        assert_eq!(
            failed.failures(),
            vec!["cannot run ./p", "Wrong exit code; got 127 but expecting 0"]
        );
    }

    #[test]
    fn launch_failure_fails_even_with_the_expected_code() {
        for code in [1, 127] {
            let failed = evaluation(
                ExecutionOutcome::LaunchFailed {
                    code,
                    reason: "cannot open input".to_string(),
                },
                code,
            );
            assert!(failed.exit.matches());
            assert!(!failed.passed());
            assert_eq!(failed.failures(), vec!["cannot open input"]);
        }
    }
}
