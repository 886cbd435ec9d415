mod cli;
mod commands;
mod config;
mod error;
mod output;

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use duetly_core::Connector;

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let Cli { global, command } = Cli::parse();
    install_logging(global.verbose);

    let outcome = match command {
        Command::Config(args) => commands::config_cmd::handle(args, &global),
        Command::Completions(args) => {
            write_completions(args.shell);
            Ok(())
        }
        online => with_controller(online, &global).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = u8::try_from(err.exit_code()).unwrap_or(1);
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr so piped output stays clean. `RUST_LOG` wins over `-v`.
fn install_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn write_completions(shell: Shell) {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "duetly", &mut std::io::stdout());
}

/// One session per invocation: log in, run the command, then log out
/// whatever the outcome.
async fn with_controller(command: Command, global: &GlobalOpts) -> Result<(), CliError> {
    let connector = Connector::new(config::build_connector_config(global)?);
    commands::connect(&connector).await?;
    debug!(?command, "connected");

    let result = commands::dispatch(command, &connector, global).await;
    connector.disconnect(true).await;
    result
}
