use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed { reason: String },
    Skipped { blocked_by: String },
}

impl Outcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Outcome::Passed)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Failed { reason } => write!(f, "failed: {}", reason),
            Outcome::Skipped { blocked_by } => write!(f, "skipped (blocked by {})", blocked_by),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub id: String,
    pub intent: String,
    pub outcome: Outcome,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

/// Outcome of every step, in declaration order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    steps: Vec<StepReport>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    elapsed: Duration,
}

impl Report {
    pub(crate) fn new(steps: Vec<StepReport>, elapsed: Duration) -> Self {
        Self { steps, elapsed }
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.steps.iter().find(|step| step.id == id).map(|step| &step.outcome)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn passed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Passed))
    }

    pub fn failed(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|outcome| matches!(outcome, Outcome::Skipped { .. }))
    }

    /// True when every step passed.
    pub fn is_success(&self) -> bool {
        self.steps.iter().all(|step| step.outcome.is_passed())
    }

    fn count(&self, predicate: impl Fn(&Outcome) -> bool) -> usize {
        self.steps.iter().filter(|step| predicate(&step.outcome)).count()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.steps.iter().map(|step| step.id.len()).max().unwrap_or(0);
        for step in &self.steps {
            writeln!(f, "{:<width$}  {}  {}", step.id, step.intent, step.outcome, width = width)?;
        }
        write!(
            f,
            "{} step(s): {} passed, {} failed, {} skipped in {:.1}s",
            self.steps.len(),
            self.passed(),
            self.failed(),
            self.skipped(),
            self.elapsed.as_secs_f64()
        )
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}
