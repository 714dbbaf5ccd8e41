use std::fs;
use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use devstrap_core::{ExecutionContext, ProvisionPlan, Step};
use devstrap_engine::{run_provisioning, summary_lines, StepOutcome, StepRecord};
use devstrap_installer::{
    build_steps, default_target_layout, http_client, ConfigPatcher, DirectiveEffect, InstallEnv,
    PatchReport, DEFAULT_API_BASE,
};
use tracing::debug;

use crate::render::{render_status_line, OutputStyle, Status, TerminalRenderer};
use crate::Cli;

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let plan = load_plan(cli.plan.as_deref())?;
    let layout = default_target_layout()?;
    let api_base = std::env::var("DEVSTRAP_GITHUB_API")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let client = http_client().context("failed to build HTTP client")?;
    let env = Rc::new(InstallEnv::new(layout, client, &api_base));
    let ctx = if cli.dry_run {
        ExecutionContext::simulated()
    } else {
        ExecutionContext::live()
    };
    debug!(
        steps = plan.steps.len(),
        config_files = plan.config_files.len(),
        simulate = ctx.simulate,
        "loaded plan"
    );

    let renderer = TerminalRenderer::current();
    if ctx.simulate {
        renderer.print_status(
            Status::Warn,
            "dry run: nothing will be installed, downloaded or written",
        );
    }

    let steps = build_steps(&plan, &env);
    renderer.print_section("tools");
    let label = if ctx.simulate { "dry-run" } else { "provision" };
    let mut progress = renderer.start_progress(label, steps.len() as u64);
    let mut patch_reports = Vec::new();

    let result = run_provisioning(
        &steps,
        &ctx,
        |index, record| {
            progress.println(&format_step_line(record, &steps, index, renderer.style()));
            progress.set(index as u64 + 1);
        },
        |ctx| {
            patch_reports = ConfigPatcher::new(env.layout()).apply_all(&plan.config_files, ctx)?;
            Ok(())
        },
    );
    let report = match result {
        Ok(report) => {
            progress.finish_success();
            report
        }
        Err(err) => {
            progress.finish_abandon();
            return Err(err).context("provisioning aborted");
        }
    };

    renderer.print_section("config");
    renderer.print_lines(&format_patch_lines(&patch_reports, renderer.style()));

    renderer.print_section("summary");
    renderer.print_lines(&summary_lines(&report, &ctx));
    Ok(())
}

fn load_plan(path: Option<&Path>) -> Result<ProvisionPlan> {
    let Some(path) = path else {
        return ProvisionPlan::builtin().context("built-in plan is invalid");
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading plan {}", path.display()))?;
    ProvisionPlan::from_toml_str(&raw).with_context(|| format!("invalid plan {}", path.display()))
}

pub(crate) fn format_step_line(
    record: &StepRecord,
    steps: &[Step],
    index: usize,
    style: OutputStyle,
) -> String {
    let name = &record.name;
    match &record.outcome {
        StepOutcome::Skipped => {
            render_status_line(style, Status::Skip, &format!("{name}: already present"))
        }
        StepOutcome::Simulated => {
            let description = steps
                .get(index)
                .map(|step| step.action.describe())
                .unwrap_or_default();
            render_status_line(style, Status::Plan, &format!("{name}: would {description}"))
        }
        StepOutcome::Installed => {
            render_status_line(style, Status::Ok, &format!("{name}: installed"))
        }
        StepOutcome::Failed(err) => {
            render_status_line(style, Status::Warn, &format!("{name}: failed: {err}"))
        }
    }
}

pub(crate) fn format_patch_lines(reports: &[PatchReport], style: OutputStyle) -> Vec<String> {
    if reports.is_empty() {
        return vec![render_status_line(
            style,
            Status::Skip,
            "no configuration files declared",
        )];
    }

    reports
        .iter()
        .map(|report| {
            let path = report.path.display();
            let effects = report
                .effects
                .iter()
                .map(describe_effect)
                .collect::<Vec<_>>()
                .join("; ");
            match (report.changed, report.simulated) {
                (false, _) => {
                    render_status_line(style, Status::Skip, &format!("{path}: unchanged"))
                }
                (true, true) => render_status_line(
                    style,
                    Status::Plan,
                    &format!("{path}: would update ({effects})"),
                ),
                (true, false) => {
                    let backup = report
                        .backup
                        .as_ref()
                        .map(|backup| format!(", backup at {}", backup.display()))
                        .unwrap_or_else(|| ", created".to_string());
                    render_status_line(
                        style,
                        Status::Ok,
                        &format!("{path}: updated ({effects}){backup}"),
                    )
                }
            }
        })
        .collect()
}

fn describe_effect(effect: &DirectiveEffect) -> String {
    match effect {
        DirectiveEffect::Replaced { pattern, lines } => {
            format!("replaced {lines} line(s) matching {pattern}")
        }
        DirectiveEffect::NoMatch { pattern } => format!("no line matches {pattern}"),
        DirectiveEffect::Appended { marker } => format!("appended '{marker}'"),
        DirectiveEffect::AlreadyPresent { marker } => format!("'{marker}' already present"),
    }
}
