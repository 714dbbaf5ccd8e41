use devstrap_core::ExecutionContext;

use crate::{RunReport, StepOutcome};

pub fn summary_lines(report: &RunReport, ctx: &ExecutionContext) -> Vec<String> {
    let mut lines = Vec::new();

    let headline = if ctx.simulate {
        "dry run complete; nothing was changed"
    } else {
        "provisioning complete"
    };
    lines.push(format!(
        "{headline} ({} installed, {} already present, {} planned, {} failed)",
        report.count(|outcome| matches!(outcome, StepOutcome::Installed)),
        report.count(|outcome| matches!(outcome, StepOutcome::Skipped)),
        report.count(|outcome| matches!(outcome, StepOutcome::Simulated)),
        report.count(StepOutcome::is_failure),
    ));

    let failures = report.failures();
    if failures.is_empty() {
        return lines;
    }

    lines.push(format!("{} step(s) did not complete:", failures.len()));
    for (name, err) in failures {
        lines.push(format!("  - {name}: {err}"));
    }
    lines.push("re-run devstrap to retry them, or install the listed tools manually".to_string());
    lines
}
