//! URL canonicalisation for candidate deduplication and page cache keys.
//!
//! Equivalent pages that differ only in query-parameter order, tracking
//! parameters, fragments, default ports, or host capitalisation map to the
//! same string.

use url::form_urlencoded;
use url::Url;

/// Query parameters dropped during canonicalisation.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "ref",
    "si",
];

/// Parse `raw` and accept it only when it is an absolute http(s) URL with a host.
pub fn parse_http_url(raw: &str) -> Option<Url> {
    let parsed = Url::parse(raw.trim()).ok()?;
    let http = matches!(parsed.scheme(), "http" | "https");
    (http && parsed.host_str().is_some_and(|h| !h.is_empty())).then_some(parsed)
}

/// Canonical form of a URL.
///
/// Lowercases scheme and host, removes default ports, the fragment, tracking
/// parameters and a trailing path slash, and sorts the remaining query pairs.
/// Input that does not parse is returned trimmed but otherwise unchanged.
///
/// ```
/// use research_core::url_normalize::normalize_url;
///
/// let a = normalize_url("https://Example.COM/path/?b=2&a=1#section");
/// let b = normalize_url("https://example.com/path?a=1&b=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);
    if matches!(
        (parsed.scheme(), parsed.port()),
        ("http", Some(80)) | ("https", Some(443))
    ) {
        let _ = parsed.set_port(None);
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        parsed.set_query(Some(&query));
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_host_but_not_path() {
        assert_eq!(
            normalize_url("HTTPS://Example.COM/Path"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn strips_trailing_slashes_except_root() {
        assert_eq!(normalize_url("https://example.com/a//"), "https://example.com/a");
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn default_ports_removed_custom_kept() {
        assert_eq!(normalize_url("http://example.com:80/p"), "http://example.com/p");
        assert_eq!(normalize_url("https://example.com:443/p"), "https://example.com/p");
        assert_eq!(
            normalize_url("https://example.com:8443/p"),
            "https://example.com:8443/p"
        );
    }

    #[test]
    fn tracking_params_and_fragment_removed() {
        assert_eq!(
            normalize_url("https://example.com/a?q=rust&UTM_SOURCE=x&gclid=1#top"),
            "https://example.com/a?q=rust"
        );
    }

    #[test]
    fn query_pairs_sorted_and_reencoded() {
        assert_eq!(
            normalize_url("https://example.com/s?z=1&a=hello world"),
            "https://example.com/s?a=hello+world&z=1"
        );
    }

    #[test]
    fn unparseable_input_returned_trimmed() {
        assert_eq!(normalize_url("  not a url "), "not a url");
    }

    #[test]
    fn parse_http_url_accepts_only_web_urls() {
        assert!(parse_http_url("https://example.com/x").is_some());
        assert!(parse_http_url(" http://example.com ").is_some());
        assert!(parse_http_url("ftp://example.com/file").is_none());
        assert!(parse_http_url("mailto:someone@example.com").is_none());
        assert!(parse_http_url("/relative/path").is_none());
        assert!(parse_http_url("").is_none());
    }
}
