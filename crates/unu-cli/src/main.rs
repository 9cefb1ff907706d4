use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use cli::{Cli, Commands, OutputArgs, ScooterArgs};
use commands::{Action, ControlArgs, OutputOptions, WatchArgs};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "unu", &mut io::stdout());
        return Ok(());
    }

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let config = Config::load();
    let quiet = cli.quiet;
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { scooter, output: out } => {
            let opts = output_options(&config, &out, quiet, output);
            commands::cmd_scan(config.manager_config(&scooter, None)?, opts).await?;
        }
        Commands::Status { scooter, output: out } => {
            let opts = output_options(&config, &out, quiet, output);
            commands::cmd_status(config.manager_config(&scooter, None)?, opts).await?;
        }
        Commands::Watch {
            scooter,
            output: out,
            max_reconnects,
        } => {
            commands::cmd_watch(WatchArgs {
                config: config.manager_config(&scooter, max_reconnects)?,
                opts: output_options(&config, &out, quiet, output),
            })
            .await?;
        }
        Commands::Lock { scooter, output: out } => {
            run_control(Action::Lock, &scooter, &out, &config, quiet, output).await?;
        }
        Commands::Unlock { scooter, output: out } => {
            run_control(Action::Unlock, &scooter, &out, &config, quiet, output).await?;
        }
        Commands::Seat { scooter, output: out } => {
            run_control(Action::OpenSeat, &scooter, &out, &config, quiet, output).await?;
        }
        Commands::Blinker {
            state,
            scooter,
            output: out,
        } => {
            run_control(Action::Blinker(state), &scooter, &out, &config, quiet, output).await?;
        }
        Commands::Hazards { scooter, output: out } => {
            run_control(Action::ToggleHazards, &scooter, &out, &config, quiet, output).await?;
        }
        Commands::RestartAndLock { scooter, output: out } => {
            run_control(Action::RestartAndLock, &scooter, &out, &config, quiet, output).await?;
        }
        Commands::Config { action } => {
            commands::cmd_config(action, quiet)?;
        }
        Commands::Completions { .. } => {
            // Already handled above
        }
    }

    Ok(())
}

/// Output settings from the flags, falling back to the config file.
fn output_options<'a>(
    config: &Config,
    args: &OutputArgs,
    quiet: bool,
    output: Option<&'a PathBuf>,
) -> OutputOptions<'a> {
    OutputOptions {
        format: config.resolve_format(args.format()),
        no_color: args.no_color || config.no_color,
        quiet,
        output,
    }
}

async fn run_control(
    action: Action,
    scooter: &ScooterArgs,
    out: &OutputArgs,
    config: &Config,
    quiet: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    commands::cmd_control(ControlArgs {
        action,
        config: config.manager_config(scooter, None)?,
        opts: output_options(config, out, quiet, output),
    })
    .await
}
