use devstrap_core::{ExecutionContext, Step};
use tracing::{info, warn};

use crate::{EngineError, StepOutcome};

/// Runs one step: probe, then simulate or install.
///
/// Install failures of non-critical steps are logged and returned as
/// [`StepOutcome::Failed`]; they never propagate. A failing critical step is
/// the only way this returns `Err`.
pub fn run_step(step: &Step, ctx: &ExecutionContext) -> Result<StepOutcome, EngineError> {
    if step.action.probe() {
        info!(step = %step.name, "already satisfied");
        return Ok(StepOutcome::Skipped);
    }

    if ctx.simulate {
        info!(step = %step.name, action = %step.action.describe(), "would install");
        return Ok(StepOutcome::Simulated);
    }

    info!(step = %step.name, action = %step.action.describe(), "installing");
    match step.action.install() {
        Ok(()) => {
            info!(step = %step.name, "installed");
            Ok(StepOutcome::Installed)
        }
        Err(source) if step.is_critical() => Err(EngineError::CriticalStep {
            name: step.name.clone(),
            source,
        }),
        Err(err) => {
            warn!(step = %step.name, error = %err, "step failed; continuing with the next step");
            Ok(StepOutcome::Failed(err))
        }
    }
}
