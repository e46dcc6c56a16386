use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{CancelToken, DestroyReport, Error, ExecutionPlan, plan_destroy};

use super::{Session, print_failures};
use crate::Context;
use crate::cli::DestroyArgs;
use crate::progress::{BarProgress, TerminalConfirm};
use crate::ui;

pub fn run(ctx: &Context, args: DestroyArgs) -> Result<()> {
    let mut session = Session::open(ctx, &args.file)?;
    let opts = ctx.settings.execute_options(args.jobs);
    let plan = target_plan(&session)?;

    ui::header(&format!("Destroying '{}'", session.stack.name));
    if plan.is_empty() {
        ui::info("Nothing to destroy");
        return Ok(());
    }
    for step in plan.steps() {
        println!("  {} {}", "−".red(), step.id);
    }
    println!();

    let progress = BarProgress::new(ctx.quiet);
    let mut confirm = TerminalConfirm {
        assume_yes: args.yes,
    };
    let result = declarative::destroy(
        plan,
        &session.provider,
        &opts,
        &progress,
        &mut confirm,
        &CancelToken::new(),
    );

    let report = match result {
        Ok(report) => report,
        Err(Error::PartialDestroy(report)) => *report,
        Err(Error::Aborted) => {
            ui::warn("Aborted, nothing was deleted");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    session
        .state
        .stack_mut(&session.stack.name)
        .record_destroy(&report);
    session.save(ctx)?;

    print_summary(&report);

    if !report.is_success() {
        bail!("destroy incomplete: {report}");
    }
    Ok(())
}

/// Reverse of what previous applies attempted, or of the declarations if
/// this stack was never applied
///
/// Once an apply has been recorded the record is authoritative: an empty
/// record means an earlier destroy already removed everything.
fn target_plan(session: &Session) -> Result<ExecutionPlan> {
    match session.state.stack(&session.stack.name) {
        Some(stack) if stack.last_apply.is_some() => {
            log::debug!(
                "Destroying from the apply record ({} resources)",
                stack.record.len()
            );
            Ok(stack.record.destroy_plan())
        }
        _ => {
            log::debug!("No apply record, destroying in reverse declaration order");
            Ok(plan_destroy(&session.stack.graph)?)
        }
    }
}

fn print_summary(report: &DestroyReport) {
    println!();
    if report.is_success() {
        println!(
            "  {} Deleted {} resources",
            "✓".green().bold(),
            report.deleted().len()
        );
        return;
    }

    println!("  {} Destroy finished with errors", "⚠".yellow().bold());
    println!("    • {} resources deleted", report.deleted().len());

    let failed = report.failed();
    if !failed.is_empty() {
        println!("    • {} {}", failed.len(), "failed".red());
        print_failures(&failed);
    }

    if !report.blocked.is_empty() {
        println!("    • {} blocked by a failed deletion", report.blocked.len());
        for id in &report.blocked {
            println!("      {} {}", "○".dimmed(), id);
        }
    }

    if report.cancelled {
        println!("    • cancelled before completion");
    }
    ui::dim("Run destroy again once the failures are resolved.");
}
