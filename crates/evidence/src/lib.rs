//! Evidence Providers
//!
//! Independent sources of raw, unstructured signal about the health of the
//! monitored service:
//! - Official status page
//! - Social-media search
//! - Web search
//! - Full page fetch (deep dive)
//!
//! Every source is independently fallible. Absence of data is a valid
//! outcome and is never an error.

mod client;
mod error;
mod text;

pub use client::{HttpEvidenceProvider, ProviderConfig};
pub use error::EvidenceError;
pub use text::{extract_page_text, parse_post_time, RawText};

use async_trait::async_trait;

/// Capability interface over the four evidence sources.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    /// Authoritative status of the service, if the status page answered.
    async fn fetch_official_status(&self) -> Result<Option<RawText>, EvidenceError>;

    /// Recent social-media posts matching `query`, newest first.
    async fn search_social(&self, query: &str) -> Result<Vec<RawText>, EvidenceError>;

    /// Web search results for `query`, best ranked first.
    async fn search_web(&self, query: &str) -> Result<Vec<RawText>, EvidenceError>;

    /// Readable text of the page at `url`.
    async fn fetch_page(&self, url: &str) -> Result<Option<RawText>, EvidenceError>;
}
