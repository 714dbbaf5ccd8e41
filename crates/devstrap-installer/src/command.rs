use std::process::Command;

use devstrap_core::StepError;
use tracing::debug;

/// Runs `command` with the terminal attached so package managers can prompt
/// (sudo, apt) and show their own progress.
pub(crate) fn run_command(command: &mut Command) -> Result<(), StepError> {
    let rendered = render_command(command);
    debug!(command = %rendered, "running");

    let status = command.status().map_err(|err| StepError::Command {
        command: rendered.clone(),
        reason: format!("failed to start: {err}"),
    })?;
    if status.success() {
        return Ok(());
    }

    Err(StepError::Command {
        command: rendered,
        reason: format!("exited with {status}"),
    })
}

pub(crate) fn render_command(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
