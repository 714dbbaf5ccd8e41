use std::fmt;

use crate::error::StepError;

/// Process-wide run settings, created once from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    /// When set, nothing is written anywhere; actions are only announced.
    pub simulate: bool,
}

impl ExecutionContext {
    pub fn live() -> Self {
        Self { simulate: false }
    }

    pub fn simulated() -> Self {
        Self { simulate: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criticality {
    /// A failure aborts the run.
    Critical,
    /// A failure is recorded and the run continues.
    NonCritical,
}

/// Capability behind every step.
///
/// `probe` must be cheap, must not touch the network and must not mutate
/// anything: when it reports `true` the install is skipped entirely.
pub trait StepAction {
    fn probe(&self) -> bool;

    /// One-line description of what `install` would do, used in simulation.
    fn describe(&self) -> String;

    fn install(&self) -> Result<(), StepError>;
}

pub struct Step {
    pub name: String,
    pub criticality: Criticality,
    pub action: Box<dyn StepAction>,
}

impl Step {
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self {
            name: name.into(),
            criticality: Criticality::NonCritical,
            action: Box::new(action),
        }
    }

    pub fn with_criticality(mut self, criticality: Criticality) -> Self {
        self.criticality = criticality;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.criticality == Criticality::Critical
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("criticality", &self.criticality)
            .field("action", &self.action.describe())
            .finish()
    }
}
