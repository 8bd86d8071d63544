//! CLI entry point for sns-downloader.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sns_downloader_core::{Downloader, ErrorResponse, Settings};
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries only JSON documents
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let mut settings = Settings::from_env().context("invalid configuration")?;
    args.apply(&mut settings);
    debug!(?settings, "settings resolved");

    let downloader =
        Downloader::from_settings(Arc::new(settings)).context("failed to initialize backends")?;

    if args.capabilities {
        print_json(&downloader.capabilities().feature_report())?;
        return Ok(ExitCode::SUCCESS);
    }
    if args.health {
        print_json(&downloader.health().await)?;
        return Ok(ExitCode::SUCCESS);
    }

    // Read input: from positional args or stdin
    let urls: Vec<String> = if !args.urls.is_empty() {
        args.urls.clone()
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect()
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        info!("Example: sns-downloader https://www.instagram.com/reel/ABC12345/");
        return Ok(ExitCode::SUCCESS);
    };

    if urls.is_empty() {
        info!("No URLs found in input");
        return Ok(ExitCode::SUCCESS);
    }

    let failed = run_downloads(&downloader, &urls).await?;
    info!(total = urls.len(), failed, "Downloads finished");

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Downloads `urls` in order, printing one JSON document each; returns the failure count.
///
/// Ctrl-C cancels the in-flight download; remaining URLs count as failed.
async fn run_downloads(downloader: &Downloader, urls: &[String]) -> Result<usize> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut failed = 0;
    for (index, url) in urls.iter().enumerate() {
        tokio::select! {
            outcome = downloader.download(url) => match outcome {
                Ok(response) => print_json(&response)?,
                Err(error) => {
                    failed += 1;
                    warn!(url = %url, kind = %error.kind(), "download failed");
                    print_json(&ErrorResponse::from(&error))?;
                }
            },
            _ = &mut ctrl_c => {
                warn!(remaining = urls.len() - index, "Interrupted, cancelling downloads");
                failed += urls.len() - index;
                break;
            }
        }
    }
    Ok(failed)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value)?;
    println!("{line}");
    Ok(())
}
