//! Sends one RFC 5322 message file to all of its recipients.

use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use outpost::{Mail, config::OutpostConfig};

/// Sign and deliver a message directly to its recipients' mail exchangers
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to `OUTPOST_CONFIG`, then the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Message to send, with its headers
    message: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    outpost_common::logging::init();
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => outpost::config::find_config_file()?,
    };
    let config = OutpostConfig::load(&config_path)?;
    let service = config.build_service()?;

    let raw = tokio::fs::read(&cli.message)
        .await
        .with_context(|| format!("Failed to read message from {}", cli.message.display()))?;
    let mut mail = Mail::from_rfc5322(&raw)
        .with_context(|| format!("Failed to parse message {}", cli.message.display()))?;

    let report = service.send(&mut mail).await?;

    for (recipient, outcome) in report.iter() {
        match outcome {
            Ok(()) => println!("{recipient}: delivered"),
            Err(err) => println!("{recipient}: {err}"),
        }
    }

    Ok(if report.is_complete_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
