//! HTTP client construction and media streaming for API-based backends.
//!
//! Centralizes timeout, user-agent, compression and proxy policy so every
//! HTTP backend behaves the same way.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, ClientBuilder, Proxy};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::error::ExtractError;

const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Builds an HTTP client for `backend`.
///
/// `timeout` bounds a whole request including body streaming.
///
/// # Errors
///
/// Returns [`ExtractError::Network`] when client construction fails.
pub(crate) fn build_http_client(
    backend: &str,
    user_agent: &str,
    timeout: Duration,
) -> Result<Client, ExtractError> {
    match try_build_client(user_agent, timeout, false) {
        Ok(client) => Ok(client),
        Err(BuildClientFailure::Panic) => {
            // Some sandboxed environments panic when querying system proxy
            // settings; fall back to env proxies only.
            warn!(
                backend,
                "HTTP client hit system proxy panic; using env-proxy fallback builder"
            );
            match try_build_client(user_agent, timeout, true) {
                Ok(client) => Ok(client),
                Err(BuildClientFailure::Panic) => Err(ExtractError::network(
                    backend,
                    "HTTP client construction panicked while initializing networking",
                )),
                Err(BuildClientFailure::Build(error)) => Err(ExtractError::network(
                    backend,
                    format!("HTTP client construction failed: {error}"),
                )),
            }
        }
        Err(BuildClientFailure::Build(error)) => Err(ExtractError::network(
            backend,
            format!("HTTP client construction failed: {error}"),
        )),
    }
}

enum BuildClientFailure {
    Panic,
    Build(reqwest::Error),
}

fn try_build_client(
    user_agent: &str,
    timeout: Duration,
    disable_system_proxy_lookup: bool,
) -> Result<Client, BuildClientFailure> {
    let user_agent = user_agent.to_string();
    catch_unwind(AssertUnwindSafe(move || {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true);
        if disable_system_proxy_lookup {
            builder = apply_env_proxy_fallback(builder.no_proxy());
        }
        builder.build().map_err(BuildClientFailure::Build)
    }))
    .map_err(|_| BuildClientFailure::Panic)?
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = first_env_var(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = first_env_var(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn first_env_var(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

/// Downloads `url` into `dest`, streaming the body.
///
/// A partially written file is removed before the error is returned.
///
/// # Errors
///
/// Returns the classified [`ExtractError`] for transport failures, non-success
/// statuses and local IO errors.
pub(crate) async fn download_media(
    client: &Client,
    backend: &str,
    identifier: &str,
    url: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<u64, ExtractError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ExtractError::from_reqwest(backend, &e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::from_media_status(
            backend,
            identifier,
            status.as_u16(),
        ));
    }

    let mut file = File::create(dest)
        .await
        .map_err(|e| ExtractError::io(dest, e))?;
    match stream_to_file(&mut file, response, backend, dest, timeout).await {
        Ok(bytes) => {
            debug!(backend, path = %dest.display(), bytes, "media downloaded");
            Ok(bytes)
        }
        Err(error) => {
            drop(file);
            let _ = tokio::fs::remove_file(dest).await;
            Err(error)
        }
    }
}

/// Streams response body to file, returning bytes written.
async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    backend: &str,
    file_path: &Path,
    timeout: Duration,
) -> Result<u64, ExtractError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| ExtractError::from_reqwest(backend, &e, timeout))?;

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| ExtractError::io(file_path, e))?;

        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| ExtractError::io(file_path, e))?;

    Ok(bytes_written)
}
