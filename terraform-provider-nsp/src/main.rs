//! Terraform Provider for Azure Network Security Perimeters
//!
//! Speaks a line-delimited JSON-RPC rendition of the Terraform plugin
//! protocol on stdin/stdout for profiles and resource associations.

use anyhow::Context;
use clap::Parser;
use std::io::{self, BufRead, Write};
use terraform_provider_nsp::NspProvider;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Terraform Provider for Azure Network Security Perimeters
#[derive(Parser, Debug)]
#[command(name = "terraform-provider-nsp")]
#[command(about = "Terraform provider for Azure Network Security Perimeter profiles and resource associations")]
struct Args {
    /// Enable debug logging; any non-falsey TF_LOG level turns it on
    #[arg(long, env = "TF_LOG", value_parser = clap::builder::FalseyValueParser::new())]
    debug: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.debug { "debug" } else { "info" };

    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Starting Terraform Provider for Network Security Perimeters");

    let provider = NspProvider::new().context("Failed to create Tokio runtime")?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout_lock = stdout.lock();

    for line in stdin.lock().lines() {
        match line {
            Ok(input) => {
                if input.trim().is_empty() {
                    continue;
                }
                let response = provider.handle_request(&input);
                if let Err(e) = writeln!(stdout_lock, "{}", response) {
                    tracing::error!("Failed to write response: {}", e);
                    break;
                }
                if let Err(e) = stdout_lock.flush() {
                    tracing::error!("Failed to flush stdout: {}", e);
                    break;
                }
            }
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        }
    }

    tracing::info!("Terraform Provider shutting down");
    Ok(())
}
