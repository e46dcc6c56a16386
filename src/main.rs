mod cli;
mod commands;
mod config;
mod declaration;
mod local;
mod paths;
mod progress;
mod state;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::Settings;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub settings: Settings,
    pub state_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "skyplan", &mut io::stdout());
        return Ok(());
    }

    let settings = Settings::load()?;
    let state_dir = paths::state_dir(cli.state_dir.as_deref(), settings.state_dir.as_deref())?;
    log::debug!("State directory: {}", state_dir.display());

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        settings,
        state_dir,
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Destroy(args) => commands::destroy::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Vm(cmd) => commands::vm::run(&ctx, cmd),
        Command::Completions { .. } => Ok(()),
    }
}
