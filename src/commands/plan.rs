use anyhow::Result;
use colored::Colorize;
use declarative::{Direction, plan_apply, plan_destroy};

use super::describe_step;
use crate::Context;
use crate::cli::PlanArgs;
use crate::declaration;
use crate::ui;

pub fn run(_ctx: &Context, args: PlanArgs) -> Result<()> {
    let stack = declaration::load(&args.file)?;
    let plan = if args.destroy {
        plan_destroy(&stack.graph)?
    } else {
        plan_apply(&stack.graph)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(plan.steps())?);
        return Ok(());
    }

    let verb = match plan.direction() {
        Direction::Apply => "Apply",
        Direction::Destroy => "Destroy",
    };
    ui::header(&format!("{verb} plan for '{}'", stack.name));

    if args.levels {
        for (i, level) in plan.levels().iter().enumerate() {
            ui::section(&format!("Level {}", i + 1));
            for &slot in level {
                println!("  {} {}", "•".cyan(), describe_step(&plan.steps()[slot]));
            }
        }
    } else {
        println!();
        for (i, step) in plan.steps().iter().enumerate() {
            ui::step(i + 1, plan.len(), &describe_step(step));
        }
    }

    println!();
    ui::dim(&format!("{} resources", plan.len()));
    Ok(())
}
