//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use sns_downloader_core::Settings;

/// Download Instagram and YouTube media through the best available backend.
///
/// Each URL is classified, routed to an extraction backend and printed as
/// one JSON document (success or error) per line.
#[derive(Parser, Debug)]
#[command(name = "sns-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// Content URLs to download (read from stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print which content types the current configuration can serve and exit
    #[arg(long, conflicts_with = "health")]
    pub capabilities: bool,

    /// Print the service health report and exit
    #[arg(long)]
    pub health: bool,

    /// Directory for downloaded media (overrides SNS_DOWNLOAD_DIR)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum retry attempts for transient failures (0-10, overrides SNS_MAX_RETRIES)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,

    /// Per-call timeout in seconds (1-3600, overrides SNS_REQUEST_TIMEOUT_SECS)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: Option<u64>,
}

impl Args {
    /// Applies command-line overrides on top of environment settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.output_dir {
            settings.download_dir.clone_from(dir);
        }
        if let Some(retries) = self.max_retries {
            // 0 retries means a single attempt
            settings.max_attempts = u32::from(retries) + 1;
        }
        if let Some(secs) = self.timeout {
            settings.request_timeout = std::time::Duration::from_secs(secs);
        }
    }
}
