mod cli;
mod commands;
mod config;
mod signals;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use installkit::CancelToken;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// Configuration file in effect.
    pub config_path: PathBuf,
    /// Whether the path was given explicitly (flag or env), in which case
    /// it must exist.
    pub config_explicit: bool,
    pub cancel: CancelToken,
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

    let mut logger = env_logger::Builder::new();
    logger.filter_level(if cli.quiet {
        log::LevelFilter::Error
    } else {
        log_level
    });
    logger.parse_default_env();
    if !cli.log_timestamps {
        logger.format_timestamp(None);
    }
    logger.init();

    let cancel = CancelToken::new();
    if cli.command.observes_cancellation() {
        signals::install(&cancel);
    }

    let (config_path, config_explicit) = cli.config_path();
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path,
        config_explicit,
        cancel,
    };

    match cli.command {
        Command::Install(args) => commands::install::run(&ctx, args),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::List => commands::list::run(&ctx),
        Command::Unit(args) => commands::unit::run(&ctx, args),
        Command::Config(cmd) => commands::config::run(&ctx, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "nodestrap", &mut io::stdout());
            Ok(())
        }
    }
}
