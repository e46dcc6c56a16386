//! Terminal implementations of the executor callbacks

use colored::Colorize;
use declarative::{ConfirmCallback, Direction, ProgressCallback, ResourceId, ResourceState};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};

use crate::ui;

/// Progress bar that also prints one line per finished resource
pub struct BarProgress {
    pb: ProgressBar,
}

impl BarProgress {
    pub fn new(quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { pb }
    }
}

impl ProgressCallback for BarProgress {
    fn on_plan_start(&self, total: usize, direction: Direction) {
        self.pb.set_length(total as u64);
        self.pb.set_position(0);
        let verb = match direction {
            Direction::Apply => "Applying",
            Direction::Destroy => "Destroying",
        };
        self.pb.set_message(format!("{verb} {total} resources"));
    }

    fn on_resource_start(&self, id: &ResourceId, state: ResourceState) {
        self.pb.set_message(format!("{state} {id}"));
    }

    fn on_resource_complete(&self, id: &ResourceId, state: ResourceState) {
        self.pb.suspend(|| {
            println!("  {} {}", ui::state_label(state), id.to_string().bold());
        });
        self.pb.inc(1);
    }

    fn on_plan_complete(&self) {
        self.pb.finish_and_clear();
    }
}

/// Asks on the terminal before destructive operations
pub struct TerminalConfirm {
    /// `--yes`: skip the prompt
    pub assume_yes: bool,
}

impl ConfirmCallback for TerminalConfirm {
    fn confirm(&mut self, prompt: &str) -> bool {
        if self.assume_yes {
            return true;
        }

        if !console::Term::stdout().is_term() {
            log::warn!("Not running in a terminal; pass --yes to confirm");
            return false;
        }

        Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}
