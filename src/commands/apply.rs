use anyhow::{Result, bail};
use colored::Colorize;
use declarative::{ApplyReport, CancelToken, Error};

use super::{Session, print_failures};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::progress::BarProgress;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let mut session = Session::open(ctx, &args.file)?;
    let opts = ctx.settings.execute_options(args.jobs);

    ui::header(&format!("Applying '{}'", session.stack.name));
    if opts.jobs > 1 {
        ui::dim(&format!("{} parallel jobs", opts.jobs));
    }

    let progress = BarProgress::new(ctx.quiet);
    let result = declarative::apply(
        &session.stack.graph,
        &session.provider,
        &opts,
        &progress,
        &CancelToken::new(),
    );

    let report = match result {
        Ok(report) => report,
        Err(Error::PartialApply(report)) => *report,
        // Nothing was sent to the provider
        Err(e) => return Err(e.into()),
    };

    session
        .state
        .stack_mut(&session.stack.name)
        .record_apply(&report, &session.stack.fingerprint);
    session.save(ctx)?;

    print_summary(&report);

    if !report.is_success() {
        bail!("apply incomplete: {report}");
    }
    Ok(())
}

fn print_summary(report: &ApplyReport) {
    println!();
    if report.is_success() {
        println!(
            "  {} All {} resources are up to date",
            "✓".green().bold(),
            report.outcomes.len()
        );
        return;
    }

    println!("  {} Apply stopped early", "⚠".yellow().bold());
    println!("    • {} resources created", report.succeeded().len());

    let failed = report.failed();
    if !failed.is_empty() {
        println!("    • {} {}", failed.len(), "failed".red());
        print_failures(&failed);
    }

    let unattempted = report.unattempted();
    if !unattempted.is_empty() {
        println!("    • {} not attempted", unattempted.len());
        for id in unattempted {
            println!("      {} {}", "○".dimmed(), id);
        }
    }

    if report.cancelled {
        println!("    • cancelled before completion");
    }
}
