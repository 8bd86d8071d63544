//! Which extraction backends the current configuration can use.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::info;

use crate::config::Settings;

/// The interchangeable extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Public extractor, no account; single media items only.
    Unauthenticated,
    /// Extractor logged in with the configured account or cookies.
    Authenticated,
    /// Official platform API; only the token owner's own media.
    OfficialApi,
}

impl BackendKind {
    pub const ALL: [Self; 3] = [Self::Unauthenticated, Self::Authenticated, Self::OfficialApi];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::OfficialApi => "official_api",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of each [`BackendKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    unauthenticated: bool,
    authenticated: bool,
    official_api: bool,
}

impl CapabilitySet {
    #[must_use]
    pub fn new(unauthenticated: bool, authenticated: bool, official_api: bool) -> Self {
        Self {
            unauthenticated,
            authenticated,
            official_api,
        }
    }

    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_available(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Unauthenticated => self.unauthenticated,
            BackendKind::Authenticated => self.authenticated,
            BackendKind::OfficialApi => self.official_api,
        }
    }

    /// Kinds that are available, in preference-neutral order.
    pub fn available(&self) -> impl Iterator<Item = BackendKind> + '_ {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
    }

    /// What content the current configuration can serve.
    #[must_use]
    pub fn feature_report(&self) -> FeatureReport {
        let any_video = self.unauthenticated || self.authenticated;
        FeatureReport {
            video_reels: any_video,
            video_posts: any_video,
            photo_posts: self.authenticated,
            carousel_full: self.authenticated,
            carousel_first_item: self.authenticated || self.unauthenticated,
            youtube_videos: self.unauthenticated,
            requires_authentication: !self.authenticated,
            authenticated: self.authenticated,
            official_api: self.official_api,
        }
    }
}

/// Content-level view of a [`CapabilitySet`], serialized by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureReport {
    pub video_reels: bool,
    pub video_posts: bool,
    pub photo_posts: bool,
    pub carousel_full: bool,
    pub carousel_first_item: bool,
    pub youtube_videos: bool,
    /// Photo and full carousel downloads need credentials that are not configured.
    pub requires_authentication: bool,
    pub authenticated: bool,
    pub official_api: bool,
}

/// Derives the [`CapabilitySet`] from [`Settings`] once and hands out copies.
#[derive(Debug)]
pub struct CapabilityRegistry {
    settings: Arc<Settings>,
    cached: OnceLock<CapabilitySet>,
}

impl CapabilityRegistry {
    #[must_use]
    pub fn new(settings: Arc<Settings>) -> Self {
        Self {
            settings,
            cached: OnceLock::new(),
        }
    }

    /// Current capabilities; computed on first call, never fails.
    pub fn capabilities(&self) -> CapabilitySet {
        *self.cached.get_or_init(|| {
            let caps = compute(&self.settings);
            info!(
                unauthenticated = caps.unauthenticated,
                authenticated = caps.authenticated,
                official_api = caps.official_api,
                "backend capabilities resolved"
            );
            caps
        })
    }
}

fn compute(settings: &Settings) -> CapabilitySet {
    CapabilitySet {
        unauthenticated: settings.enable_unauthenticated,
        authenticated: settings.has_account_credentials()
            || settings.instagram_cookies_file.is_some(),
        official_api: settings.graph_api_token.is_some(),
    }
}
