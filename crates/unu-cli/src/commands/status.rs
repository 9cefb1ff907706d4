//! Status command implementation.

use anyhow::Result;
use unu_core::ManagerConfig;

use super::OutputOptions;
use crate::cli::OutputFormat;
use crate::format::{format_json, format_snapshot_text};
use crate::util::{connect, finish, write_output};

pub async fn cmd_status(config: ManagerConfig, opts: OutputOptions<'_>) -> Result<()> {
    let scooter = connect(config, opts.quiet).await?;
    let snapshot = scooter.snapshot();
    finish(&scooter).await;

    let content = match opts.format {
        OutputFormat::Json => format_json(&snapshot)?,
        OutputFormat::Text => format_snapshot_text(&snapshot, opts.no_color),
    };
    write_output(opts.output, &content)
}
