//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Blinker states accepted by the scooter
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BlinkerState {
    Left,
    Right,
    Both,
    Off,
}

impl BlinkerState {
    /// The state word sent after `scooter:blinker`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Both => "both",
            Self::Off => "off",
        }
    }
}

/// Reusable scooter connection arguments
#[derive(Debug, Clone, Default, Args)]
pub struct ScooterArgs {
    /// Advertised scooter name, or use UNU_DEVICE_NAME env var
    #[arg(short = 'n', long = "name", env = "UNU_DEVICE_NAME")]
    pub device_name: Option<String>,

    /// Scan timeout in seconds
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Fall back to a scan filtered by the command service after a few seconds
    #[arg(long)]
    pub phased: bool,
}

/// Reusable output format arguments
#[derive(Debug, Clone, Args)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Shorthand for `--format json`
    #[arg(long, conflicts_with = "format")]
    pub json: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(Debug, Parser)]
#[command(name = "unu")]
#[command(author, version, about = "CLI for unu electric scooters", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Look for the scooter and report whether it is in range
    Scan {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Connect and print the scooter's telemetry
    Status {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Stay connected and print every change until interrupted
    Watch {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,

        /// Give up after this many reconnect attempts (default: unlimited)
        #[arg(long)]
        max_reconnects: Option<u32>,
    },

    /// Wake the scooter if needed, lock it and verify the handlebar lock
    Lock {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Wake the scooter if needed and unlock it
    Unlock {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Open the seat box
    Seat {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Set the blinkers
    Blinker {
        /// Blinker state
        #[arg(value_enum)]
        state: BlinkerState,

        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Toggle the hazard lights
    Hazards {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Restart the scooter from hibernation, then lock it
    RestartAndLock {
        #[command(flatten)]
        scooter: ScooterArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl OutputArgs {
    /// The requested format, if any.
    pub fn format(&self) -> Option<OutputFormat> {
        if self.json {
            Some(OutputFormat::Json)
        } else {
            self.format
        }
    }
}

/// Configuration keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigKey {
    /// Advertised scooter name
    DeviceName,
    /// Scan timeout in seconds
    Timeout,
    /// Use the phased scan
    Phased,
    /// Default output format
    Format,
    /// Disable colored output
    NoColor,
    /// Reconnect attempts before giving up
    MaxReconnects,
}

/// Configuration subcommands
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        #[arg(value_enum)]
        key: ConfigKey,
        /// Configuration value
        value: String,
    },

    /// Unset (remove) a configuration value
    Unset {
        /// Configuration key to remove
        #[arg(value_enum)]
        key: ConfigKey,
    },

    /// Show configuration file path
    Path,
}

/// Parse boolean argument with flexible input
pub fn parse_bool_arg(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "enable" | "enabled" => Ok(true),
        "false" | "no" | "off" | "0" | "disable" | "disabled" => Ok(false),
        _ => Err(format!(
            "Invalid boolean value '{}'. Use: true/false, yes/no, on/off, 1/0",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_blinker() {
        let cli = Cli::try_parse_from(["unu", "blinker", "both", "--name", "My Scooter"]).unwrap();
        match cli.command {
            Commands::Blinker { state, scooter, .. } => {
                assert_eq!(state, BlinkerState::Both);
                assert_eq!(scooter.device_name.as_deref(), Some("My Scooter"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_blinker_state() {
        assert!(Cli::try_parse_from(["unu", "blinker", "up"]).is_err());
    }

    #[test]
    fn test_parse_restart_and_lock() {
        let cli = Cli::try_parse_from(["unu", "-q", "restart-and-lock", "-T", "45", "-f", "json"])
            .unwrap();
        assert!(cli.quiet);
        match cli.command {
            Commands::RestartAndLock { scooter, output } => {
                assert_eq!(scooter.timeout, Some(45));
                assert_eq!(output.format, Some(OutputFormat::Json));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::try_parse_from(["unu", "config", "set", "device-name", "unu Scooter"])
            .unwrap();
        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { key, value },
            } => {
                assert_eq!(key, ConfigKey::DeviceName);
                assert_eq!(value, "unu Scooter");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_bool_arg() {
        assert_eq!(parse_bool_arg("yes"), Ok(true));
        assert_eq!(parse_bool_arg("OFF"), Ok(false));
        assert!(parse_bool_arg("maybe").is_err());
    }

    #[test]
    fn test_json_shorthand() {
        let cli = Cli::try_parse_from(["unu", "status", "--json"]).unwrap();
        match cli.command {
            Commands::Status { output, .. } => assert_eq!(output.format(), Some(OutputFormat::Json)),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["unu", "status", "--json", "-f", "text"]).is_err());
    }

    #[test]
    fn test_blinker_words() {
        assert_eq!(BlinkerState::Left.as_str(), "left");
        assert_eq!(BlinkerState::Both.as_str(), "both");
        assert_eq!(BlinkerState::Off.as_str(), "off");
    }
}
