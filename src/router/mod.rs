//! Backend selection.
//!
//! [`plan`] turns a reference, its analyzed shape and the available
//! capabilities into an ordered list of backends to try. It is a pure
//! function: same inputs, same plan, no I/O.
//!
//! | shape | order |
//! |-------|-------|
//! | video, public | unauthenticated, else authenticated (Instagram) |
//! | video, login required | authenticated |
//! | photo | authenticated |
//! | carousel | authenticated, else unauthenticated flagged degraded |
//!
//! On Instagram the official API is tried first whenever a token is set.

use serde::Serialize;

use crate::analyzer::ContentShape;
use crate::backend::MediaType;
use crate::capability::{BackendKind, CapabilitySet};
use crate::parser::{ContentReference, Platform};

/// Remediation shown when content needs an Instagram login the configuration lacks.
pub const CREDENTIALS_REMEDIATION: &str = "Set INSTAGRAM_USERNAME and INSTAGRAM_PASSWORD, or INSTAGRAM_COOKIES_FILE, to enable the authenticated backend";

/// Remediation shown when the unauthenticated backend is switched off.
pub const UNAUTHENTICATED_REMEDIATION: &str =
    "Set SNS_ENABLE_UNAUTHENTICATED=true to allow the public yt-dlp backend";

/// One backend to try, with the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub backend: BackendKind,
    pub rationale: &'static str,
    /// Warning attached to the result when this entry serves only part of the content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl PlanEntry {
    fn full(backend: BackendKind, rationale: &'static str) -> Self {
        Self {
            backend,
            rationale,
            degraded: None,
        }
    }
}

/// Ordered backends for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendPlan {
    entries: Vec<PlanEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remediation: Option<&'static str>,
}

impl BackendPlan {
    fn new(entries: Vec<PlanEntry>, remediation: &'static str) -> Self {
        let remediation = entries.is_empty().then_some(remediation);
        Self {
            entries,
            remediation,
        }
    }

    #[must_use]
    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Backends in try order.
    pub fn backends(&self) -> impl Iterator<Item = BackendKind> + '_ {
        self.entries.iter().map(|e| e.backend)
    }

    /// What configuration would make an empty plan non-empty.
    #[must_use]
    pub fn remediation(&self) -> Option<&'static str> {
        self.remediation
    }
}

/// Chooses backends for analyzed content.
#[must_use]
pub fn plan(reference: &ContentReference, shape: &ContentShape, caps: CapabilitySet) -> BackendPlan {
    let instagram = reference.platform() == Platform::Instagram;
    let authenticated = instagram && caps.is_available(BackendKind::Authenticated);
    let unauthenticated = caps.is_available(BackendKind::Unauthenticated);

    let mut entries = official_first(reference, caps);
    match shape.media_type {
        MediaType::Video if !shape.requires_login => {
            if unauthenticated {
                entries.push(PlanEntry::full(
                    BackendKind::Unauthenticated,
                    "public video; fastest path without account risk",
                ));
            } else if authenticated {
                entries.push(PlanEntry::full(
                    BackendKind::Authenticated,
                    "public video; unauthenticated backend disabled",
                ));
            }
        }
        MediaType::Video | MediaType::Photo => {
            if authenticated {
                entries.push(PlanEntry::full(
                    BackendKind::Authenticated,
                    "content requires an Instagram login",
                ));
            }
        }
        MediaType::Carousel => {
            if authenticated {
                entries.push(PlanEntry::full(
                    BackendKind::Authenticated,
                    "full carousel requires an Instagram login",
                ));
            } else if unauthenticated {
                let item = reference.item_index().unwrap_or(1);
                entries.push(PlanEntry {
                    backend: BackendKind::Unauthenticated,
                    rationale: "degraded fallback without credentials",
                    degraded: Some(format!(
                        "carousel has {} items; only item {item} was downloaded. {CREDENTIALS_REMEDIATION} to fetch all items",
                        shape.item_count
                    )),
                });
            }
        }
    }

    BackendPlan::new(entries, remediation_for(reference))
}

/// Chooses backends when the shape could not be probed without a login.
#[must_use]
pub fn plan_unprobed(reference: &ContentReference, caps: CapabilitySet) -> BackendPlan {
    let mut entries = official_first(reference, caps);
    match reference.platform() {
        Platform::Instagram => {
            if caps.is_available(BackendKind::Authenticated) {
                entries.push(PlanEntry::full(
                    BackendKind::Authenticated,
                    "shape unknown; probe needs an Instagram login",
                ));
            }
        }
        Platform::YouTube => {
            if caps.is_available(BackendKind::Unauthenticated) {
                entries.push(PlanEntry::full(
                    BackendKind::Unauthenticated,
                    "shape unknown; YouTube is served without an account",
                ));
            }
        }
    }
    BackendPlan::new(entries, remediation_for(reference))
}

fn official_first(reference: &ContentReference, caps: CapabilitySet) -> Vec<PlanEntry> {
    if reference.platform() == Platform::Instagram && caps.is_available(BackendKind::OfficialApi) {
        vec![PlanEntry::full(
            BackendKind::OfficialApi,
            "official API preferred; serves only the token owner's media",
        )]
    } else {
        Vec::new()
    }
}

fn remediation_for(reference: &ContentReference) -> &'static str {
    match reference.platform() {
        Platform::Instagram => CREDENTIALS_REMEDIATION,
        Platform::YouTube => UNAUTHENTICATED_REMEDIATION,
    }
}
