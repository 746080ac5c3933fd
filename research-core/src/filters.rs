//! Runtime-configurable URL and content filters.
//!
//! A [`FilterSet`] holds an immutable [`FilterSnapshot`] behind an
//! `RwLock<Arc<_>>`. Readers clone the `Arc` and work lock-free; updates build
//! and validate a complete new snapshot before swapping it in, so a request
//! always sees either the old lists or the new ones, never a mix.

use crate::error::{ResearchError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, RwLock};

/// Number of leading characters inspected for blocked-content markers.
const CONTENT_SCAN_CHARS: usize = 2000;

/// Texts shorter than this are never treated as bot-challenge pages.
const MIN_SCANNED_CHARS: usize = 30;

/// Domains whose pages rarely yield readable article text.
pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "reddit.com",
    "twitter.com",
    "x.com",
    "facebook.com",
    "youtube.com",
    "tiktok.com",
    "instagram.com",
    "linkedin.com",
    "medium.com",
];

/// Binary files, auth flows, shops and listing pages.
pub const DEFAULT_SKIP_URL_PATTERNS: &[&str] = &[
    r"\.pdf$",
    r"\.jpg$",
    r"\.png$",
    r"\.gif$",
    r"/login",
    r"/signin",
    r"/signup",
    r"/cart",
    r"/checkout",
    r"amazon\.com/.*/(dp|gp)/",
    r"ebay\.com/itm/",
    r"/tag/",
    r"/tags/",
    r"/category/",
    r"/categories/",
    r"/topic/",
    r"/topics/",
    r"/archive/",
    r"/page/\d+",
    r"/shop/",
    r"/store/",
    r"/buy/",
    r"/product/",
    r"/products/",
];

/// Phrases that identify CAPTCHA and bot-block interstitials.
pub const DEFAULT_BLOCKED_CONTENT_MARKERS: &[&str] = &[
    "verify you are human",
    "access to this page has been denied",
    "please complete the security check",
    "cloudflare ray id:",
    "checking your browser",
    "enable javascript and cookies",
    "unusual traffic from your computer",
    "are you a robot",
    "captcha",
    "perimeterx",
    "distil networks",
    "blocked by",
];

/// Line prefixes the extractor drops as site navigation.
pub const DEFAULT_NAVIGATION_PATTERNS: &[&str] = &["skip to", "jump to"];

/// Plain filter lists, as configured and as reported by introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterLists {
    pub blocked_domains: Vec<String>,
    pub skip_url_patterns: Vec<String>,
    pub blocked_content_markers: Vec<String>,
    pub navigation_patterns: Vec<String>,
}

impl Default for FilterLists {
    fn default() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| (*s).to_owned()).collect()
        }
        Self {
            blocked_domains: owned(DEFAULT_BLOCKED_DOMAINS),
            skip_url_patterns: owned(DEFAULT_SKIP_URL_PATTERNS),
            blocked_content_markers: owned(DEFAULT_BLOCKED_CONTENT_MARKERS),
            navigation_patterns: owned(DEFAULT_NAVIGATION_PATTERNS),
        }
    }
}

/// How a [`FilterUpdate`] combines with the current lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Supplied components replace the current ones.
    #[default]
    Replace,
    /// Supplied entries are appended to the current ones.
    Merge,
}

/// A partial update. Components left as `None` are unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterUpdate {
    pub blocked_domains: Option<Vec<String>>,
    pub skip_url_patterns: Option<Vec<String>>,
    pub blocked_content_markers: Option<Vec<String>>,
    pub navigation_patterns: Option<Vec<String>>,
    pub mode: UpdateMode,
}

impl FilterUpdate {
    /// True when the update names no component at all.
    pub fn is_empty(&self) -> bool {
        self.blocked_domains.is_none()
            && self.skip_url_patterns.is_none()
            && self.blocked_content_markers.is_none()
            && self.navigation_patterns.is_none()
    }
}

#[derive(Debug)]
struct CompiledPatterns {
    sources: Vec<String>,
    regexes: Vec<Regex>,
}

impl CompiledPatterns {
    fn compile(sources: Vec<String>) -> Result<Self> {
        let regexes = sources
            .iter()
            .map(|source| {
                RegexBuilder::new(source)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        ResearchError::InvalidFilterUpdate(format!("pattern {source:?}: {e}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sources, regexes })
    }
}

/// An immutable, point-in-time view of the active filters.
#[derive(Debug)]
pub struct FilterSnapshot {
    blocked_domains: Arc<Vec<String>>,
    skip_patterns: Arc<CompiledPatterns>,
    content_markers: Arc<Vec<String>>,
    navigation_patterns: Arc<Vec<String>>,
    version: u64,
    content_hash: String,
}

impl FilterSnapshot {
    fn assemble(
        blocked_domains: Arc<Vec<String>>,
        skip_patterns: Arc<CompiledPatterns>,
        content_markers: Arc<Vec<String>>,
        navigation_patterns: Arc<Vec<String>>,
        version: u64,
    ) -> Self {
        let mut snapshot = Self {
            blocked_domains,
            skip_patterns,
            content_markers,
            navigation_patterns,
            version,
            content_hash: String::new(),
        };
        snapshot.content_hash = hash_lists(&snapshot.lists());
        snapshot
    }

    /// True when the URL's host equals a blocked domain or is a subdomain of one.
    pub fn matches_blocked_domain(&self, url: &str) -> bool {
        let Some(host) = host_of(url) else {
            return false;
        };
        self.blocked_domains.iter().any(|domain| {
            host == *domain
                || (host.len() > domain.len()
                    && host.ends_with(domain.as_str())
                    && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
        })
    }

    /// True when any skip pattern matches the URL.
    pub fn matches_skip_pattern(&self, url: &str) -> bool {
        self.skip_patterns.regexes.iter().any(|re| re.is_match(url))
    }

    /// True when the beginning of `text` contains a blocked-content marker.
    pub fn contains_blocked_content(&self, text: &str) -> bool {
        let head: String = text.chars().take(CONTENT_SCAN_CHARS).collect();
        if head.chars().count() < MIN_SCANNED_CHARS {
            return false;
        }
        let head = head.to_lowercase();
        self.content_markers
            .iter()
            .any(|marker| head.contains(marker.as_str()))
    }

    /// Navigation prefixes, for the extractor.
    pub fn navigation_patterns(&self) -> &[String] {
        &self.navigation_patterns
    }

    /// Monotonic counter bumped on every applied update.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Stable SHA-256 hex digest of all filter lists.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Copy the lists out for introspection or persistence.
    pub fn lists(&self) -> FilterLists {
        FilterLists {
            blocked_domains: self.blocked_domains.as_ref().clone(),
            skip_url_patterns: self.skip_patterns.sources.clone(),
            blocked_content_markers: self.content_markers.as_ref().clone(),
            navigation_patterns: self.navigation_patterns.as_ref().clone(),
        }
    }
}

/// Shared, atomically replaceable filter configuration.
#[derive(Debug)]
pub struct FilterSet {
    current: RwLock<Arc<FilterSnapshot>>,
    // Serialises writers so merges never lose each other's entries.
    update_lock: Mutex<()>,
}

impl FilterSet {
    /// Build a filter set from explicit lists, validating every pattern.
    pub fn new(lists: FilterLists) -> Result<Self> {
        let snapshot = FilterSnapshot::assemble(
            Arc::new(normalize_domains(lists.blocked_domains)?),
            Arc::new(CompiledPatterns::compile(normalize_patterns(
                lists.skip_url_patterns,
            ))?),
            Arc::new(normalize_phrases(lists.blocked_content_markers)),
            Arc::new(normalize_phrases(lists.navigation_patterns)),
            0,
        );
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            update_lock: Mutex::new(()),
        })
    }

    /// Build a filter set seeded with the built-in default lists.
    pub fn with_defaults() -> Result<Self> {
        Self::new(FilterLists::default())
    }

    /// Consistent view of the current filters. Holds no lock after returning.
    pub fn snapshot(&self) -> Arc<FilterSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply a partial update atomically.
    ///
    /// Every supplied component is normalised and compiled before the swap;
    /// on any error nothing is applied and the previous snapshot stays active.
    pub fn replace(&self, update: FilterUpdate) -> Result<Arc<FilterSnapshot>> {
        let _writer = self.update_lock.lock().unwrap_or_else(|e| e.into_inner());
        let base = self.snapshot();
        let merge = update.mode == UpdateMode::Merge;

        let blocked_domains = match update.blocked_domains {
            Some(list) => {
                let list = normalize_domains(list)?;
                Arc::new(if merge {
                    merged(&base.blocked_domains, list)
                } else {
                    list
                })
            }
            None => Arc::clone(&base.blocked_domains),
        };
        let skip_patterns = match update.skip_url_patterns {
            Some(list) => {
                let list = normalize_patterns(list);
                let sources = if merge {
                    merged(&base.skip_patterns.sources, list)
                } else {
                    list
                };
                Arc::new(CompiledPatterns::compile(sources)?)
            }
            None => Arc::clone(&base.skip_patterns),
        };
        let content_markers = match update.blocked_content_markers {
            Some(list) => {
                let list = normalize_phrases(list);
                Arc::new(if merge {
                    merged(&base.content_markers, list)
                } else {
                    list
                })
            }
            None => Arc::clone(&base.content_markers),
        };
        let navigation_patterns = match update.navigation_patterns {
            Some(list) => {
                let list = normalize_phrases(list);
                Arc::new(if merge {
                    merged(&base.navigation_patterns, list)
                } else {
                    list
                })
            }
            None => Arc::clone(&base.navigation_patterns),
        };

        let next = Arc::new(FilterSnapshot::assemble(
            blocked_domains,
            skip_patterns,
            content_markers,
            navigation_patterns,
            base.version + 1,
        ));
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::clone(&next);
        tracing::info!(
            version = next.version,
            domains = next.blocked_domains.len(),
            patterns = next.skip_patterns.sources.len(),
            markers = next.content_markers.len(),
            "filter set updated"
        );
        Ok(next)
    }
}

fn host_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    (!host.is_empty()).then_some(host)
}

fn normalize_domains(list: Vec<String>) -> Result<Vec<String>> {
    let mut out = Vec::with_capacity(list.len());
    for raw in list {
        let domain = raw
            .trim()
            .trim_start_matches("*.")
            .trim_start_matches('.')
            .trim_end_matches('.')
            .to_lowercase();
        if domain.is_empty() {
            continue;
        }
        if domain.contains(|c: char| c.is_whitespace() || c == '/' || c == ':') {
            return Err(ResearchError::InvalidFilterUpdate(format!(
                "domain {raw:?} is not a bare host name"
            )));
        }
        if !out.contains(&domain) {
            out.push(domain);
        }
    }
    Ok(out)
}

fn normalize_patterns(list: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(list.len());
    for raw in list {
        let pattern = raw.trim();
        if !pattern.is_empty() && !out.iter().any(|p| p == pattern) {
            out.push(pattern.to_owned());
        }
    }
    out
}

fn normalize_phrases(list: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(list.len());
    for raw in list {
        let phrase = raw.trim().to_lowercase();
        if !phrase.is_empty() && !out.contains(&phrase) {
            out.push(phrase);
        }
    }
    out
}

fn merged(existing: &[String], additions: Vec<String>) -> Vec<String> {
    let mut out = existing.to_vec();
    for item in additions {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn hash_lists(lists: &FilterLists) -> String {
    let mut hasher = Sha256::new();
    for (tag, items) in [
        ("domains", &lists.blocked_domains),
        ("patterns", &lists.skip_url_patterns),
        ("markers", &lists.blocked_content_markers),
        ("navigation", &lists.navigation_patterns),
    ] {
        hasher.update(tag.as_bytes());
        hasher.update([0u8]);
        for item in items {
            hasher.update(item.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update([1u8]);
    }
    format!("{:x}", hasher.finalize())
}
