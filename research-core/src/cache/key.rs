//! Deterministic cache fingerprints.
//!
//! A fingerprint is the SHA-256 hex digest of a canonical JSON payload: the
//! normalised query (or page URL), the options that change the result, and the
//! content hash of the active filter lists. Using the content hash rather than
//! the snapshot version keeps fingerprints stable across processes that share
//! the slow tier.

use crate::types::ResearchOptions;
use crate::url_normalize::normalize_url;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;

/// Cache key for a research result or a single fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a full research request.
    pub fn research(query: &str, options: &ResearchOptions, filter_hash: &str) -> Self {
        let payload = json!({
            "kind": "research",
            "query": normalize_query(query),
            "max_results": options.max_results,
            "max_content_chars": options.max_content_chars,
            "min_content_chars": options.min_content_chars,
            "filters": filter_hash,
        });
        Self::digest(&payload)
    }

    /// Fingerprint of a single-page fetch.
    pub fn page(url: &str, options: &ResearchOptions, filter_hash: &str) -> Self {
        let payload = json!({
            "kind": "page",
            "url": normalize_url(url.trim()),
            "max_content_chars": options.max_content_chars,
            "min_content_chars": options.min_content_chars,
            "filters": filter_hash,
        });
        Self::digest(&payload)
    }

    fn digest(payload: &serde_json::Value) -> Self {
        // serde_json maps are ordered by key, so this rendering is canonical.
        let canonical = payload.to_string();
        Self(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trim, collapse internal whitespace, and lowercase a query.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
