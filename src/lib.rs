//! SNS Downloader Core Library
//!
//! Routes Instagram and YouTube content URLs to the extraction backend that
//! can serve them, downloads the media into a stable on-disk layout and
//! returns a uniform response document.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`parser`] - URL classification into a [`ContentReference`]
//! - [`config`] - [`Settings`] loaded from the environment
//! - [`capability`] - which backends the configuration enables
//! - [`analyzer`] - content shape detection (video, photo, carousel)
//! - [`router`] - pure backend selection
//! - [`backend`] - `yt-dlp` and Instagram Graph API backends
//! - [`download`] - retry policy and the [`Downloader`] pipeline
//! - [`response`] - normalized success, error and health documents
//! - [`sidecar`] - per-download metadata JSON

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod analyzer;
pub mod backend;
pub mod capability;
pub mod config;
pub mod download;
pub mod parser;
pub mod response;
pub mod router;
pub mod sidecar;
mod user_agent;

// Re-export commonly used types
pub use analyzer::{ContentAnalyzer, ContentShape, YtDlpAnalyzer};
pub use backend::{Backend, ExtractError, ExtractionResult, MediaType};
pub use capability::{BackendKind, CapabilityRegistry, CapabilitySet, FeatureReport};
pub use config::{ConfigError, Settings};
pub use download::{
    DEFAULT_MAX_RETRIES, DownloadError, Downloader, DownloaderBuilder, ErrorKind, FailureType,
    RetryDecision, RetryPolicy, classify_error,
};
pub use parser::{ContentReference, ParseError, Platform, classify};
pub use response::{ErrorResponse, HealthReport, NormalizedResponse};
pub use router::{BackendPlan, PlanEntry, plan};
