use devstrap_core::{ConfigWriteError, StepError};
use thiserror::Error;

/// What happened to one step in a run.
#[derive(Debug)]
pub enum StepOutcome {
    /// The probe reported the desired state already holds.
    Skipped,
    /// The install would have run, but the run is simulated.
    Simulated,
    Installed,
    /// A non-critical install failed; the run continued.
    Failed(StepError),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Simulated => "simulated",
            Self::Installed => "installed",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Errors that abort a run. Everything else is contained per step.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("duplicate step name '{0}' in provisioning order")]
    DuplicateStep(String),

    #[error("critical step '{name}' failed: {source}")]
    CriticalStep {
        name: String,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Config(#[from] ConfigWriteError),
}
