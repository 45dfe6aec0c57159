//! Run reporting.
//!
//! The human reporter streams results while cases run, in either a detailed
//! or a terse tier. JSON and JUnit renderings are produced from the finished
//! [`RunSummary`].

use crate::compare::{Comparison, DiffLine, DiffTag, Stream};
use crate::exec::ExecutionOutcome;
use crate::resolve::{self, ResolvedCase};
use crate::runner::{CaseResult, Report, RunSummary};
use crate::schema::RunConfig;
use std::fmt::Write as _;
use std::io::{self, Write};
use termcolor::{Color, ColorSpec, WriteColor};

const RULE_WIDTH: usize = 80;

/// Human-readable reporter.
///
/// Colors are controlled entirely by the writer handed in, so nothing here
/// touches global terminal state.
pub struct HumanReport<'a, W: WriteColor> {
    out: W,
    config: &'a RunConfig,
}

impl<'a, W: WriteColor> HumanReport<'a, W> {
    pub fn new(out: W, config: &'a RunConfig) -> Self {
        Self { out, config }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn colored(&mut self, color: Option<Color>, text: &str) -> io::Result<()> {
        self.out.set_color(ColorSpec::new().set_fg(color))?;
        write!(self.out, "{text}")?;
        self.out.reset()
    }

    fn rule(&mut self, ch: char) -> io::Result<()> {
        writeln!(self.out, "{}", ch.to_string().repeat(RULE_WIDTH))
    }

    fn verdict(&mut self, passed: bool) -> io::Result<()> {
        if passed {
            self.colored(Some(Color::Green), "PASSED")
        } else {
            self.colored(Some(Color::Red), "FAILED")
        }
    }

    fn diff(&mut self, diff: &[DiffLine]) -> io::Result<()> {
        for line in diff {
            let color = match line.tag {
                DiffTag::Added => Some(Color::Cyan),
                DiffTag::Removed => Some(Color::Red),
                DiffTag::Hunk | DiffTag::Header | DiffTag::NoNewline => Some(Color::Yellow),
                DiffTag::Context => None,
            };
            self.colored(color, &line.to_string())?;
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn details(&mut self, resolved: &ResolvedCase<'_>, result: &CaseResult) -> io::Result<()> {
        let evaluation = &result.evaluation;
        if let ExecutionOutcome::LaunchFailed { reason, .. } = &evaluation.outcome {
            writeln!(self.out, "Failed to launch: {reason}")?;
        }
        if let Some(actual) = evaluation.exit.actual
            && !evaluation.exit.matches()
        {
            writeln!(
                self.out,
                "Failed with wrong exit code; got {actual} but expecting {}",
                evaluation.exit.expected
            )?;
        }

        for stream in Stream::ALL {
            let (expected, actual) = match stream {
                Stream::Stdout => (&resolved.expected_stdout, &resolved.actual_stdout),
                Stream::Stderr => (&resolved.expected_stderr, &resolved.actual_stderr),
            };
            match evaluation.stream(stream) {
                Comparison::Differs { diff } => {
                    let command = format!(
                        "diff {} {}",
                        resolve::display_path(expected, self.config),
                        resolve::display_path(actual, self.config)
                    );
                    writeln!(self.out, "{} differs:", stream.name())?;
                    writeln!(self.out, "\t{command}")?;
                    self.rule('-')?;
                    self.diff(diff)?;
                    self.rule('-')?;
                }
                Comparison::Unreadable { path, reason } => {
                    writeln!(self.out, "{}: cannot read {path}: {reason}", stream.name())?;
                }
                Comparison::Matches | Comparison::Skipped => {}
            }
        }

        if !result.passed {
            writeln!(self.out, "Definition (line {}):", resolved.case.line)?;
            writeln!(self.out, "\t{}", result.definition)?;
        }
        Ok(())
    }
}

impl<W: WriteColor> Report for HumanReport<'_, W> {
    fn case_started(&mut self, resolved: &ResolvedCase<'_>) -> io::Result<()> {
        if self.config.details {
            write!(self.out, "Test {}", resolved.ordinal)?;
            if !resolved.case.label.is_empty() {
                write!(self.out, " ({})", resolved.case.label)?;
            }
            writeln!(self.out, ":")?;
            writeln!(self.out, "\t{}", resolved.command_line)?;
        }
        Ok(())
    }

    fn case_finished(&mut self, resolved: &ResolvedCase<'_>, result: &CaseResult) -> io::Result<()> {
        // Shown in both tiers.
        if let ExecutionOutcome::TimedOut { after } = result.evaluation.outcome {
            writeln!(self.out, "Execution timed out after {after} seconds...")?;
        }

        if self.config.details {
            self.details(resolved, result)?;
            self.verdict(result.passed)?;
            writeln!(self.out)?;
            self.rule('=')?;
        } else {
            let color = if result.passed { Color::Green } else { Color::Red };
            self.out.set_color(ColorSpec::new().set_fg(Some(color)))?;
            write!(self.out, "Test {} ", resolved.ordinal)?;
            write!(self.out, "{}", if result.passed { "PASSED" } else { "FAILED" })?;
            if !resolved.case.label.is_empty() {
                write!(self.out, " ({})", resolved.case.label)?;
            }
            self.out.reset()?;
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn run_finished(&mut self, summary: &RunSummary) -> io::Result<()> {
        writeln!(self.out, "Passed {}/{} tests", summary.passed(), summary.total())?;
        self.out.flush()
    }
}

/// Render a finished run as pretty-printed JSON.
pub fn format_json(summary: &RunSummary) -> serde_json::Result<String> {
    let document = serde_json::json!({
        "passed": summary.passed(),
        "total": summary.total(),
        "results": summary.cases,
    });
    serde_json::to_string_pretty(&document)
}

/// Render a finished run as JUnit XML.
pub fn format_junit_xml(summary: &RunSummary, suite_name: &str, timestamp: &str) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let total_time: f64 = summary.cases.iter().map(|c| c.duration.as_secs_f64()).sum();
    let failures = summary.total() - summary.passed();

    let _ = writeln!(
        xml,
        "<testsuites tests=\"{}\" failures=\"{failures}\" time=\"{total_time:.3}\">",
        summary.total()
    );
    let _ = writeln!(
        xml,
        "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{failures}\" time=\"{total_time:.3}\" timestamp=\"{}\">",
        escape_xml(suite_name),
        summary.total(),
        escape_xml(timestamp)
    );

    for case in &summary.cases {
        let _ = writeln!(
            xml,
            "    <testcase name=\"{}\" time=\"{:.3}\">",
            escape_xml(&junit_case_name(case)),
            case.duration.as_secs_f64()
        );

        if !case.passed {
            let message = case
                .failures
                .first()
                .map(|s| s.as_str())
                .unwrap_or("Test failed");
            let _ = writeln!(xml, "      <failure message=\"{}\">", escape_xml(message));
            for failure in &case.failures {
                let _ = writeln!(xml, "{}", escape_xml(failure));
            }
            for stream in Stream::ALL {
                if let Comparison::Differs { diff } = case.evaluation.stream(stream) {
                    for line in diff {
                        let _ = writeln!(xml, "{}", escape_xml(&line.to_string()));
                    }
                }
            }
            let _ = writeln!(xml, "{}", escape_xml(&case.definition));
            xml.push_str("      </failure>\n");
        }

        let _ = writeln!(
            xml,
            "      <system-out>{}</system-out>",
            escape_xml(&case.command)
        );
        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
    xml.push_str("</testsuites>\n");
    xml
}

fn junit_case_name(case: &CaseResult) -> String {
    if case.label.is_empty() {
        format!("{}", case.ordinal)
    } else {
        format!("{} {}", case.ordinal, case.label)
    }
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::{Evaluation, ExitCheck};
    use crate::resolve::resolve;
    use crate::schema::TestCase;
    use crate::table::parse_table;
    use std::path::PathBuf;
    use std::time::Duration;
    use termcolor::NoColor;

    fn config(details: bool) -> RunConfig {
        RunConfig {
            results_dir: PathBuf::from("/w/res"),
            assets_dir: PathBuf::from("/w/assets"),
            exec_dir: PathBuf::from("/w"),
            timeout: Duration::from_secs(2),
            details,
            full_paths: false,
        }
    }

    fn case() -> TestCase {
        parse_table("./player|0|in|out|err|||3 A|Gameover").unwrap().remove(0)
    }

    fn result(outcome: ExecutionOutcome, stdout: Comparison) -> CaseResult {
        let evaluation = Evaluation {
            exit: ExitCheck {
                expected: 0,
                actual: outcome.exit_code(),
            },
            outcome,
            stdout,
            stderr: Comparison::Matches,
        };
        CaseResult {
            ordinal: 1,
            label: "Gameover".to_string(),
            command: "./player 3 A".to_string(),
            definition: "./player|0|in|out|err|||3 A|Gameover".to_string(),
            passed: evaluation.passed(),
            duration: Duration::from_millis(5),
            failures: evaluation.failures(),
            evaluation,
        }
    }

    fn exited() -> ExecutionOutcome {
        ExecutionOutcome::Exited {
            code: 0,
            signal: None,
        }
    }

    fn render(details: bool, result: CaseResult) -> String {
        let config = config(details);
        let case = case();
        let resolved = resolve(&case, &config, 1);
        let mut report = HumanReport::new(NoColor::new(Vec::new()), &config);
        report.case_started(&resolved).unwrap();
        report.case_finished(&resolved, &result).unwrap();
        report
            .run_finished(&RunSummary {
                cases: vec![result],
            })
            .unwrap();
        String::from_utf8(report.into_inner().into_inner()).unwrap()
    }

    fn one_line_diff() -> Comparison {
        Comparison::Differs {
            diff: crate::compare::unified_diff(
                b"Player A discarded 3.\n",
                b"Player A discarded 4.\n",
                "/w/assets/out (expected)",
                "/w/res/test.1.out (actual)",
            ),
        }
    }

    #[test]
    fn terse_pass_is_one_line_plus_summary() {
        let out = render(false, result(exited(), Comparison::Matches));
        assert_eq!(out, "Test 1 PASSED (Gameover)\nPassed 1/1 tests\n");
    }

    #[test]
    fn terse_failure_hides_diff() {
        let out = render(false, result(exited(), one_line_diff()));
        assert_eq!(out, "Test 1 FAILED (Gameover)\nPassed 0/1 tests\n");
    }

    #[test]
    fn detailed_failure_shows_command_diff_and_definition() {
        let out = render(true, result(exited(), one_line_diff()));
        assert!(out.starts_with(
            "Test 1 (Gameover):\n\t./player 3 A < ./assets/in 1> ./res/test.1.out 2> ./res/test.1.err\n"
        ));
        assert!(out.contains("stdout differs:\n\tdiff ./assets/out ./res/test.1.out\n"));
        assert!(out.contains("\n-Player A discarded 3.\n+Player A discarded 4.\n"));
        assert!(out.contains("Definition (line 1):\n\t./player|0|in|out|err|||3 A|Gameover\n"));
        assert!(out.contains("FAILED\n"));
        assert!(out.ends_with("Passed 0/1 tests\n"));
    }

    #[test]
    fn detailed_pass_omits_definition() {
        let out = render(true, result(exited(), Comparison::Matches));
        assert!(out.contains("PASSED\n"));
        assert!(!out.contains("Definition"));
    }

    #[test]
    fn timeout_notice_in_both_tiers() {
        for details in [false, true] {
            let timed_out = result(ExecutionOutcome::TimedOut { after: 2 }, Comparison::Skipped);
            let out = render(details, timed_out);
            assert!(out.contains("Execution timed out after 2 seconds..."));
            assert!(out.contains("FAILED"));
        }
    }

    #[test]
    fn json_contains_counts_and_cases() {
        let summary = RunSummary {
            cases: vec![result(exited(), one_line_diff())],
        };
        let json: serde_json::Value =
            serde_json::from_str(&format_json(&summary).unwrap()).unwrap();
        assert_eq!(json["passed"], 0);
        assert_eq!(json["total"], 1);
        let case = &json["results"][0];
        assert_eq!(case["ordinal"], 1);
        assert_eq!(case["outcome"]["status"], "exited");
        assert_eq!(case["stdout"]["status"], "differs");
        assert_eq!(case["stderr"]["status"], "matches");
    }

    #[test]
    fn junit_escapes_and_reports_failures() {
        let summary = RunSummary {
            cases: vec![result(exited(), one_line_diff())],
        };
        let xml = format_junit_xml(&summary, "goldtest.table", "2024-01-01T00:00:00");
        assert!(xml.contains("<testsuites tests=\"1\" failures=\"1\""));
        assert!(xml.contains("<testcase name=\"1 Gameover\""));
        assert!(xml.contains("<failure message=\"stdout differs\">"));
        assert!(xml.contains("-Player A discarded 3."));
        assert!(xml.contains("timestamp=\"2024-01-01T00:00:00\""));
    }

    #[test]
    fn escape_xml_special_chars() {
        assert_eq!(escape_xml("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }
}
