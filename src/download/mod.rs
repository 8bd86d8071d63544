//! The download operation and its retry machinery.
//!
//! [`Downloader::download`] is the single entry point: it classifies a URL,
//! routes it to a backend and returns a [`crate::response::NormalizedResponse`]
//! or a [`DownloadError`] that knows its HTTP status.

mod error;
mod retry;
mod service;

pub use error::{DownloadError, ErrorKind};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, MAX_RETRY_AFTER, RetryDecision, RetryPolicy, classify_error,
    parse_retry_after, retry_with_policy, server_retry_after, with_retry,
};
pub use service::{Downloader, DownloaderBuilder};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
