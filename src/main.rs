mod cli;
mod commands;
mod config;
mod deps;
mod paths;
mod steps;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Steps narrate their progress at info level
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp_secs()
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    log::trace!("Running with verbosity {}", ctx.verbose);

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, &cli.state_dir, args),
        Command::Resume(args) => commands::run::resume(&ctx, &cli.state_dir, args),
        Command::Status => commands::status::run(&ctx, &cli.state_dir),
        Command::Reset => commands::reset::run(&ctx, &cli.state_dir),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "provisioner", &mut io::stdout());
            Ok(())
        }
    }
}
