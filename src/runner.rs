//! Test execution engine.
//!
//! Runs the selected cases one after another: resolve, execute, evaluate,
//! report. Case-level problems become failing results; only problems that
//! make the whole run meaningless are returned as errors.

use crate::compare::{self, Evaluation};
use crate::exec;
use crate::resolve::{self, ResolvedCase};
use crate::schema::{RunConfig, TestCase};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Which cases a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every case, in table order.
    All,
    /// A single case by 1-based ordinal.
    Single(usize),
}

impl From<Option<usize>> for Selection {
    fn from(index: Option<usize>) -> Self {
        index.map_or(Selection::All, Selection::Single)
    }
}

/// Error that aborts a run before or while cases execute.
#[derive(Debug)]
pub enum RunError {
    /// The results directory could not be created.
    ResultsDir(PathBuf, std::io::Error),
    /// The selected ordinal is outside the table.
    NoSuchCase { index: usize, total: usize },
    /// Writing the report failed.
    Report(std::io::Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::ResultsDir(p, e) => {
                write!(f, "cannot create results directory {}: {e}", p.display())
            }
            RunError::NoSuchCase { index, total } => {
                write!(f, "no test {index}; the table defines tests 1 to {total}")
            }
            RunError::Report(e) => write!(f, "failed to write report: {e}"),
        }
    }
}

impl std::error::Error for RunError {}

/// Result of running a single case.
#[derive(Debug, Serialize)]
pub struct CaseResult {
    pub ordinal: usize,
    pub label: String,
    pub command: String,
    pub definition: String,
    pub passed: bool,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
    pub failures: Vec<String>,
    #[serde(flatten)]
    pub evaluation: Evaluation,
}

/// Results of a whole run, in execution order.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub cases: Vec<CaseResult>,
}

impl RunSummary {
    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|c| c.passed).count()
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Receives progress while a run is underway.
pub trait Report {
    /// Called after a case is resolved, before its program starts.
    fn case_started(&mut self, _resolved: &ResolvedCase<'_>) -> std::io::Result<()> {
        Ok(())
    }

    /// Called once a case has been evaluated.
    fn case_finished(
        &mut self,
        _resolved: &ResolvedCase<'_>,
        _result: &CaseResult,
    ) -> std::io::Result<()> {
        Ok(())
    }

    /// Called after the last selected case.
    fn run_finished(&mut self, _summary: &RunSummary) -> std::io::Result<()> {
        Ok(())
    }
}

/// A reporter that prints nothing; used by machine-readable output formats.
pub struct Silent;

impl Report for Silent {}

/// Pick the cases a selection covers, paired with their ordinals.
pub fn select(
    cases: &[TestCase],
    selection: Selection,
) -> Result<Vec<(usize, &TestCase)>, RunError> {
    match selection {
        Selection::All => Ok(cases.iter().enumerate().map(|(i, c)| (i + 1, c)).collect()),
        Selection::Single(index) => match index.checked_sub(1).and_then(|i| cases.get(i)) {
            Some(case) => Ok(vec![(index, case)]),
            None => Err(RunError::NoSuchCase {
                index,
                total: cases.len(),
            }),
        },
    }
}

/// Make sure the results directory exists. Idempotent.
pub fn ensure_results_dir(config: &RunConfig) -> Result<(), RunError> {
    if !config.results_dir.is_dir() {
        tracing::debug!(dir = %config.results_dir.display(), "creating results directory");
        std::fs::create_dir_all(&config.results_dir)
            .map_err(|e| RunError::ResultsDir(config.results_dir.clone(), e))?;
    }
    Ok(())
}

/// Run the selected cases sequentially.
pub fn run_cases(
    cases: &[TestCase],
    config: &RunConfig,
    selection: Selection,
    report: &mut dyn Report,
) -> Result<RunSummary, RunError> {
    let selected = select(cases, selection)?;
    ensure_results_dir(config)?;

    let mut summary = RunSummary::default();
    for (ordinal, case) in selected {
        let resolved = resolve::resolve(case, config, ordinal);
        report.case_started(&resolved).map_err(RunError::Report)?;

        let result = run_case(&resolved, config.timeout);

        report
            .case_finished(&resolved, &result)
            .map_err(RunError::Report)?;
        summary.cases.push(result);
    }

    report.run_finished(&summary).map_err(RunError::Report)?;
    tracing::debug!(passed = summary.passed(), total = summary.total(), "run finished");
    Ok(summary)
}

/// Execute and evaluate one resolved case.
pub fn run_case(resolved: &ResolvedCase<'_>, timeout: Duration) -> CaseResult {
    let start = Instant::now();
    let outcome = exec::execute(resolved, timeout);
    let evaluation = compare::evaluate(outcome, resolved);

    CaseResult {
        ordinal: resolved.ordinal,
        label: resolved.case.label.clone(),
        command: resolved.command_line.clone(),
        definition: resolved.case.raw_definition.clone(),
        passed: evaluation.passed(),
        duration: start.elapsed(),
        failures: evaluation.failures(),
        evaluation,
    }
}
