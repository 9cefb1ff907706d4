//! Command implementations for the CLI.

mod config;
mod control;
mod scan;
mod status;
mod watch;

pub use config::cmd_config;
pub use control::{Action, ControlArgs, cmd_control};
pub use scan::cmd_scan;
pub use status::cmd_status;
pub use watch::{WatchArgs, cmd_watch};

use std::path::PathBuf;

use crate::cli::OutputFormat;

/// Output settings shared by every scooter command.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions<'a> {
    pub format: OutputFormat,
    pub no_color: bool,
    pub quiet: bool,
    pub output: Option<&'a PathBuf>,
}
