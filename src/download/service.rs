//! The `download(url)` pipeline.
//!
//! [`Downloader`] wires the stages together:
//!
//! ```text
//! classify -> analyze (retried) -> plan -> backend.fetch (retried, in plan order)
//!          -> normalize -> metadata sidecar
//! ```
//!
//! Requests are independent. Two requests for the same storage key are
//! serialized so they never write the same directory at once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sns_downloader_core::config::Settings;
//! use sns_downloader_core::download::Downloader;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Arc::new(Settings::from_env()?);
//! let downloader = Downloader::builder(settings).build()?;
//! let response = downloader
//!     .download("https://www.instagram.com/reel/ABC12345/")
//!     .await?;
//! println!("{}", response.media_url);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use super::error::DownloadError;
use super::retry::{RetryPolicy, retry_with_policy, with_retry};
use crate::analyzer::{ContentAnalyzer, YtDlpAnalyzer};
use crate::backend::{Backend, ExtractError, ExtractionResult, GraphApiBackend, YtDlpBackend};
use crate::capability::{BackendKind, CapabilityRegistry, CapabilitySet};
use crate::config::Settings;
use crate::parser::{self, ContentReference};
use crate::response::{HealthChecks, HealthReport, NormalizedResponse, Normalizer};
use crate::router::{self, BackendPlan, CREDENTIALS_REMEDIATION};
use crate::sidecar;

const HEALTH_PROBE_FILE: &str = ".health_check";

/// Builder for [`Downloader`]; anything not injected is derived from [`Settings`].
pub struct DownloaderBuilder {
    settings: Arc<Settings>,
    capabilities: Option<CapabilitySet>,
    analyzer: Option<Arc<dyn ContentAnalyzer>>,
    backends: Vec<Arc<dyn Backend>>,
    retry_policy: Option<RetryPolicy>,
}

impl DownloaderBuilder {
    /// Overrides the capabilities computed from settings.
    #[must_use]
    pub fn capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    #[must_use]
    pub fn analyzer(mut self, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Registers a backend; it replaces the default backend of the same kind.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Builds the downloader.
    ///
    /// A kind counts as available only when the capabilities allow it and a
    /// backend for it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError`] when a default backend cannot be constructed
    /// (for example the Graph API HTTP client).
    pub fn build(self) -> Result<Downloader, ExtractError> {
        let settings = self.settings;
        let requested = self
            .capabilities
            .unwrap_or_else(|| CapabilityRegistry::new(Arc::clone(&settings)).capabilities());

        let mut backends: HashMap<BackendKind, Arc<dyn Backend>> = HashMap::new();
        for backend in self.backends {
            backends.insert(backend.kind(), backend);
        }
        for kind in requested.available() {
            if backends.contains_key(&kind) {
                continue;
            }
            let default: Option<Arc<dyn Backend>> = match kind {
                BackendKind::Unauthenticated => {
                    Some(Arc::new(YtDlpBackend::unauthenticated(&settings)) as Arc<dyn Backend>)
                }
                BackendKind::Authenticated => YtDlpBackend::authenticated(&settings)
                    .map(|b| Arc::new(b) as Arc<dyn Backend>),
                BackendKind::OfficialApi => GraphApiBackend::from_settings(&settings)?
                    .map(|b| Arc::new(b) as Arc<dyn Backend>),
            };
            if let Some(backend) = default {
                backends.insert(kind, backend);
            }
        }

        let has = |kind| requested.is_available(kind) && backends.contains_key(&kind);
        let capabilities = CapabilitySet::new(
            has(BackendKind::Unauthenticated),
            has(BackendKind::Authenticated),
            has(BackendKind::OfficialApi),
        );

        let analyzer = self
            .analyzer
            .unwrap_or_else(|| Arc::new(YtDlpAnalyzer::from_settings(&settings)));
        let retry_policy = self.retry_policy.unwrap_or_else(|| {
            RetryPolicy::with_max_attempts(settings.max_attempts)
                .base_delay(settings.retry_base_delay)
        });

        info!(
            backends = backends.len(),
            max_attempts = retry_policy.max_attempts(),
            "downloader ready"
        );

        Ok(Downloader {
            normalizer: Normalizer::new(&settings.media_url_prefix),
            call_timeout: settings.request_timeout,
            settings,
            capabilities,
            analyzer,
            backends,
            retry_policy,
            locks: DashMap::new(),
        })
    }
}

/// Shared entry point for downloads; `Send + Sync`, share it behind an `Arc`.
pub struct Downloader {
    settings: Arc<Settings>,
    capabilities: CapabilitySet,
    analyzer: Arc<dyn ContentAnalyzer>,
    backends: HashMap<BackendKind, Arc<dyn Backend>>,
    retry_policy: RetryPolicy,
    call_timeout: Duration,
    normalizer: Normalizer,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("capabilities", &self.capabilities)
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

impl Downloader {
    #[must_use]
    pub fn builder(settings: Arc<Settings>) -> DownloaderBuilder {
        DownloaderBuilder {
            settings,
            capabilities: None,
            analyzer: None,
            backends: Vec::new(),
            retry_policy: None,
        }
    }

    /// Downloader with every component derived from `settings`.
    ///
    /// # Errors
    ///
    /// See [`DownloaderBuilder::build`].
    pub fn from_settings(settings: Arc<Settings>) -> Result<Self, ExtractError> {
        Self::builder(settings).build()
    }

    /// Backends usable by this downloader.
    #[must_use]
    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Downloads the content behind `url`.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidUrl`] before any backend runs
    /// - [`DownloadError::NoBackendAvailable`] when the configuration cannot serve the content
    /// - [`DownloadError::Extract`] with the last backend's error when every plan entry fails
    #[instrument(skip(self, url))]
    pub async fn download(&self, url: &str) -> Result<NormalizedResponse, DownloadError> {
        let reference = parser::classify(url)?;
        let _lock = self.lock_key(reference.storage_key()).await;
        self.run(&reference).await
    }

    #[instrument(skip(self), fields(identifier = reference.identifier(), platform = %reference.platform()))]
    async fn run(&self, reference: &ContentReference) -> Result<NormalizedResponse, DownloadError> {
        let plan = self.plan(reference).await?;
        debug!(backends = ?plan.backends().collect::<Vec<_>>(), "backend plan");

        if plan.is_empty() {
            let remediation = plan.remediation().unwrap_or(CREDENTIALS_REMEDIATION);
            warn!(remediation, "no backend can serve this content");
            return Err(DownloadError::NoBackendAvailable {
                identifier: reference.identifier().to_string(),
                remediation: remediation.to_string(),
            });
        }

        let mut last_error: Option<ExtractError> = None;
        for entry in plan.entries() {
            let Some(backend) = self.backends.get(&entry.backend) else {
                continue;
            };
            if let Some(previous) = last_error.take() {
                warn!(error = %previous, next = backend.name(), "backend failed, trying next");
            }
            debug!(backend = backend.name(), rationale = entry.rationale, "trying backend");

            match with_retry(backend.as_ref(), reference, &self.retry_policy, self.call_timeout)
                .await
            {
                Ok(mut result) => {
                    if let Some(warning) = &entry.degraded {
                        warn!(backend = backend.name(), warning = %warning, "serving degraded result");
                        result.degraded = Some(warning.clone());
                    }
                    return self.finish(reference, result).await;
                }
                Err(error) => last_error = Some(error),
            }
        }

        Err(match last_error {
            Some(error) => error.into(),
            None => DownloadError::NoBackendAvailable {
                identifier: reference.identifier().to_string(),
                remediation: CREDENTIALS_REMEDIATION.to_string(),
            },
        })
    }

    /// Analyzes the content (with retries) and routes it.
    async fn plan(&self, reference: &ContentReference) -> Result<BackendPlan, DownloadError> {
        let analysis = retry_with_policy(
            &self.retry_policy,
            "analyzer",
            self.call_timeout,
            |_| self.analyzer.analyze(reference),
        )
        .await;

        match analysis {
            Ok(shape) => {
                debug!(
                    media_type = shape.media_type.as_str(),
                    items = shape.item_count,
                    requires_login = shape.requires_login,
                    "content analyzed"
                );
                Ok(router::plan(reference, &shape, self.capabilities))
            }
            Err(error @ ExtractError::AnalysisUnavailable { .. }) => {
                info!(error = %error, "analysis needs a login, routing without a shape");
                Ok(router::plan_unprobed(reference, self.capabilities))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn finish(
        &self,
        reference: &ContentReference,
        result: ExtractionResult,
    ) -> Result<NormalizedResponse, DownloadError> {
        let sidecar_input = self.settings.save_metadata.then(|| result.clone());
        let response = self.normalizer.normalize(result).await?;

        if let Some(result) = sidecar_input {
            let key = reference.storage_key();
            let dir = self.settings.download_dir.join(&key);
            let written =
                tokio::task::spawn_blocking(move || sidecar::write_sidecar(&dir, &key, &result))
                    .await;
            match written {
                Ok(Ok(path)) => debug!(path = %path.display(), "metadata saved"),
                Ok(Err(error)) => warn!(error = %error, "failed to save metadata sidecar"),
                Err(error) => warn!(error = %error, "metadata sidecar task failed"),
            }
        }

        info!(
            backend = response.backend.as_str(),
            media_type = response.media_type.as_str(),
            degraded = response.degraded,
            "download completed"
        );
        Ok(response)
    }

    /// Service status: download directory writability and backend availability.
    pub async fn health(&self) -> HealthReport {
        let checks = HealthChecks {
            download_dir_writable: dir_writable(&self.settings.download_dir).await,
            unauthenticated_backend: self.capabilities.is_available(BackendKind::Unauthenticated),
            authenticated_backend: self.capabilities.is_available(BackendKind::Authenticated),
            official_api_backend: self.capabilities.is_available(BackendKind::OfficialApi),
        };
        HealthReport::from_checks(checks)
    }

    async fn lock_key(&self, key: String) -> KeyLock<'_> {
        let mutex = Arc::clone(self.locks.entry(key.clone()).or_default().value());
        let guard = mutex.lock_owned().await;
        KeyLock {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.len()
    }
}

/// Holds the per-key mutex; drops the map entry when no one else wants it.
struct KeyLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

async fn dir_writable(dir: &Path) -> bool {
    if tokio::fs::create_dir_all(dir).await.is_err() {
        return false;
    }
    let probe = dir.join(HEALTH_PROBE_FILE);
    let writable = tokio::fs::write(&probe, b"ok").await.is_ok();
    let _ = tokio::fs::remove_file(&probe).await;
    writable
}
