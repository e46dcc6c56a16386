pub mod apply;
pub mod destroy;
pub mod plan;
pub mod status;
pub mod vm;

use anyhow::Result;
use colored::Colorize;
use declarative::{PlanStep, ResourceOutcome};
use std::path::Path;

use crate::Context;
use crate::declaration::{self, Stack};
use crate::local::LocalProvider;
use crate::state::SkyplanState;

/// Everything a stack command works on
pub struct Session {
    pub stack: Stack,
    pub state: SkyplanState,
    pub provider: LocalProvider,
}

impl Session {
    pub fn open(ctx: &Context, file: &Path) -> Result<Self> {
        let stack = declaration::load(file)?;
        let state = SkyplanState::load(&ctx.state_dir)?;
        let provider = LocalProvider::open(&ctx.state_dir)?;
        Ok(Self {
            stack,
            state,
            provider,
        })
    }

    /// Persist both the run state and the local cloud
    pub fn save(&mut self, ctx: &Context) -> Result<()> {
        self.provider.save()?;
        self.state.touch(&ctx.state_dir)
    }
}

/// `kind/name (after a, b)`
pub fn describe_step(step: &PlanStep) -> String {
    if step.depends_on.is_empty() {
        return step.id.to_string();
    }
    let deps: Vec<String> = step.depends_on.iter().map(ToString::to_string).collect();
    format!(
        "{} {}",
        step.id,
        format!("(after {})", deps.join(", ")).dimmed()
    )
}

/// Print failed resources with their provider errors
pub fn print_failures(failed: &[&ResourceOutcome]) {
    for outcome in failed {
        let reason = outcome
            .error
            .as_ref()
            .map_or_else(|| "unknown error".to_string(), ToString::to_string);
        println!("    {} {}: {}", "✗".red(), outcome.id, reason);
    }
}
