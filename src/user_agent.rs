//! Shared User-Agent strings for extraction tools and API clients.
//!
//! Single source for the project URL and UA format so yt-dlp and Graph API
//! traffic stay consistent and easy to update.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/sns-downloader";

/// Desktop browser UA handed to yt-dlp; Instagram serves reduced pages to unknown agents.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Default User-Agent for media page extraction (`SNS_USER_AGENT` overrides it).
#[must_use]
pub(crate) fn default_extraction_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

/// Default User-Agent for official API and media CDN requests (identifies the tool).
#[must_use]
pub(crate) fn default_api_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("sns-downloader/{version} (+{PROJECT_UA_URL})")
}
