//! Ordered steps with single-predecessor dependencies.

mod report;

use std::any::Any;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use std::time::Instant;

use log::{debug, error, info, warn};

use crate::error::ScenarioError;

pub use report::{Outcome, Report, StepReport};

pub type StepFn<W> = Box<dyn FnMut(&mut W) -> anyhow::Result<()>>;

pub struct Step<W> {
    id: String,
    intent: String,
    after: Option<String>,
    body: StepFn<W>,
}

impl<W> Step<W> {
    pub fn new<F>(id: impl Into<String>, intent: impl Into<String>, body: F) -> Self
    where
        F: FnMut(&mut W) -> anyhow::Result<()> + 'static,
    {
        Self {
            id: id.into(),
            intent: intent.into(),
            after: None,
            body: Box::new(body),
        }
    }

    /// Only run this step when `predecessor` passed.
    pub fn after(mut self, predecessor: impl Into<String>) -> Self {
        self.after = Some(predecessor.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    pub fn predecessor(&self) -> Option<&str> {
        self.after.as_deref()
    }
}

pub struct ScenarioBuilder<W> {
    steps: Vec<Step<W>>,
}

impl<W> ScenarioBuilder<W> {
    pub fn step(mut self, step: Step<W>) -> Self {
        self.steps.push(step);
        self
    }

    /// Fails when a step id repeats or a predecessor is not declared earlier.
    pub fn build(self) -> Result<Scenario<W>, ScenarioError> {
        let mut declared = HashSet::new();

        for step in &self.steps {
            if let Some(predecessor) = &step.after {
                if !declared.contains(predecessor.as_str()) {
                    return Err(ScenarioError::UnknownPredecessor {
                        step: step.id.clone(),
                        predecessor: predecessor.clone(),
                    });
                }
            }
            if !declared.insert(step.id.as_str()) {
                return Err(ScenarioError::DuplicateStep(step.id.clone()));
            }
        }

        Ok(Scenario { steps: self.steps })
    }
}

pub struct Scenario<W> {
    steps: Vec<Step<W>>,
}

impl<W> Scenario<W> {
    pub fn builder() -> ScenarioBuilder<W> {
        ScenarioBuilder { steps: Vec::new() }
    }

    pub fn steps(&self) -> &[Step<W>] {
        &self.steps
    }

    /// Run every step once, in order, and report each outcome.
    pub fn run(mut self, world: &mut W) -> Report {
        let started = Instant::now();
        let mut outcomes: HashMap<String, Outcome> = HashMap::new();
        let mut reports = Vec::with_capacity(self.steps.len());

        for step in &mut self.steps {
            let step_started = Instant::now();

            let blocked_by = step
                .after
                .as_ref()
                .filter(|predecessor| !matches!(outcomes.get(predecessor.as_str()), Some(Outcome::Passed)));

            let outcome = match blocked_by {
                Some(predecessor) => Outcome::Skipped {
                    blocked_by: predecessor.clone(),
                },
                None => execute(&mut step.body, world),
            };

            match &outcome {
                Outcome::Passed => info!("✓ {} {}", step.id, step.intent),
                Outcome::Failed { reason } => error!("✗ {} {}: {}", step.id, step.intent, reason),
                Outcome::Skipped { blocked_by } => {
                    warn!("- {} {} (blocked by {})", step.id, step.intent, blocked_by)
                }
            }

            outcomes.insert(step.id.clone(), outcome.clone());
            reports.push(StepReport {
                id: step.id.clone(),
                intent: step.intent.clone(),
                outcome,
                elapsed: step_started.elapsed(),
            });
        }

        let report = Report::new(reports, started.elapsed());
        info!(
            "Scenario finished: {} passed, {} failed, {} skipped ({:?})",
            report.passed(),
            report.failed(),
            report.skipped(),
            report.elapsed()
        );
        report
    }
}

thread_local! {
    static IN_STEP: Cell<bool> = Cell::new(false);
}

static QUIET_PANIC_HOOK: Once = Once::new();

// Panics inside a step go to the log; every other panic reaches the previous hook.
fn install_panic_hook() {
    QUIET_PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if IN_STEP.with(Cell::get) {
                debug!("Step panicked: {}", info);
            } else {
                previous(info);
            }
        }));
    });
}

fn execute<W>(body: &mut StepFn<W>, world: &mut W) -> Outcome {
    install_panic_hook();
    IN_STEP.with(|in_step| in_step.set(true));
    let result = panic::catch_unwind(AssertUnwindSafe(|| body(world)));
    IN_STEP.with(|in_step| in_step.set(false));

    match result {
        Ok(Ok(())) => Outcome::Passed,
        Ok(Err(err)) => Outcome::Failed {
            reason: format!("{:#}", err),
        },
        Err(payload) => Outcome::Failed {
            reason: panic_message(payload.as_ref()),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "step panicked".to_string()
    }
}
