use anyhow::Result;
use colored::Colorize;
use declarative::{Provider, ResourceId, ResourceState, plan_apply};

use super::Session;
use crate::Context;
use crate::cli::FileArgs;
use crate::state::StackState;
use crate::ui;

pub fn run(ctx: &Context, args: FileArgs) -> Result<()> {
    let session = Session::open(ctx, &args.file)?;
    let stack = &session.stack;
    let recorded = session.state.stack(&stack.name).cloned().unwrap_or_default();

    ui::header(&format!("Stack '{}'", stack.name));
    ui::kv("Declaration", &args.file.display().to_string());
    ui::kv("Resources", &stack.graph.len().to_string());
    ui::kv("State dir", &ctx.state_dir.display().to_string());
    ui::kv("Local cloud", &session.provider.path().display().to_string());
    ui::kv("Last apply", &format_time(recorded.last_apply));
    ui::kv("Last destroy", &format_time(recorded.last_destroy));

    let changes = match recorded.is_drifted_from(&stack.fingerprint) {
        None => "never applied".dimmed().to_string(),
        Some(false) => "unchanged since last apply".green().to_string(),
        Some(true) => "changed since last apply".yellow().to_string(),
    };
    ui::kv("Declarations", &changes);
    if ctx.verbose > 0 {
        ui::kv("Fingerprint", &stack.fingerprint);
    }

    ui::section("Resources");
    let plan = plan_apply(&stack.graph)?;
    for id in plan.order() {
        print_resource(&session, &recorded, &id);
    }

    let orphaned: Vec<&ResourceId> = recorded
        .record
        .steps
        .iter()
        .map(|s| &s.id)
        .filter(|id| stack.graph.get(id).is_none())
        .collect();
    if !orphaned.is_empty() {
        ui::section("No longer declared");
        for id in orphaned {
            print_resource(&session, &recorded, id);
        }
        ui::dim("These are still removed by destroy.");
    }

    Ok(())
}

fn print_resource(session: &Session, recorded: &StackState, id: &ResourceId) {
    let state = recorded.state_of(id);
    let remote = match session.provider.get(id) {
        Ok(Some(r)) => r.provisioning_state.green().to_string(),
        Ok(None) if state == ResourceState::Created => "missing".red().to_string(),
        Ok(None) => "absent".dimmed().to_string(),
        Err(e) => format!("unknown ({e})").yellow().to_string(),
    };
    println!(
        "  {:<48} {:<24} {}",
        id.to_string(),
        ui::state_label(state),
        remote
    );
    if let Some(error) = recorded.error_of(id) {
        ui::dim(&format!("  last error: {error}"));
    }
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map_or_else(
        || "never".to_string(),
        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
