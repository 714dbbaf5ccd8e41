use devstrap_core::{ConfigWriteError, ExecutionContext, Step};
use tracing::debug;

use crate::executor::run_step;
use crate::order::check_declared_order;
use crate::{EngineError, RunReport, StepRecord};

/// Runs every step in declared order, one at a time, and reports each
/// outcome to `on_step` before the next step starts.
pub fn run_steps<O>(
    steps: &[Step],
    ctx: &ExecutionContext,
    mut on_step: O,
) -> Result<RunReport, EngineError>
where
    O: FnMut(usize, &StepRecord),
{
    check_declared_order(steps)?;

    let mut report = RunReport::new();
    for (index, step) in steps.iter().enumerate() {
        debug!(step = %step.name, index, total = steps.len(), "starting step");
        let outcome = run_step(step, ctx)?;
        let record = report.push(step.name.clone(), outcome);
        debug!(step = %record.name, outcome = record.outcome.label(), "step finished");
        on_step(index, record);
    }
    Ok(report)
}

/// Full run: all tool steps, then the configuration pass.
///
/// The configuration pass always runs once the steps are done, whatever
/// their outcomes, and its errors abort the run.
pub fn run_provisioning<O, C>(
    steps: &[Step],
    ctx: &ExecutionContext,
    on_step: O,
    config_pass: C,
) -> Result<RunReport, EngineError>
where
    O: FnMut(usize, &StepRecord),
    C: FnOnce(&ExecutionContext) -> Result<(), ConfigWriteError>,
{
    let report = run_steps(steps, ctx, on_step)?;
    debug!(
        failed = report.failures().len(),
        "tool steps finished; applying configuration"
    );
    config_pass(ctx)?;
    Ok(report)
}
