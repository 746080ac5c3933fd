//! DuckDuckGo search backend.
//!
//! Scrapes the JavaScript-free endpoint (`html.duckduckgo.com/html/`), which
//! needs no API key.
//! Result pages hold roughly thirty links, so larger requests follow the
//! page's own "next" form until enough candidates are collected.

use crate::config::SearchConfig;
use crate::engine::SearchBackend;
use crate::error::{ResearchError, Result};
use crate::http;
use crate::types::SearchResult;
use crate::url_normalize::{normalize_url, parse_http_url};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Result pages requested for a single query at most.
const MAX_PAGES: usize = 5;

/// DuckDuckGo HTML search scraper.
#[derive(Debug, Clone)]
pub struct DuckDuckGoEngine {
    client: reqwest::Client,
    endpoint: String,
    safe_search: bool,
}

/// One parsed result page.
#[derive(Debug, Default)]
pub(crate) struct ParsedPage {
    pub results: Vec<SearchResult>,
    /// Hidden form fields of the "next page" form, when there is one.
    pub next_form: Option<Vec<(String, String)>>,
    /// The page is DuckDuckGo's bot-detection interstitial.
    pub blocked: bool,
}

impl DuckDuckGoEngine {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            client: http::build_search_client(config)?,
            endpoint: config.endpoint.clone(),
            safe_search: config.safe_search,
        })
    }

    /// Resolve a result link. Outbound links go through
    /// `//duckduckgo.com/l/?uddg=<encoded target>`; the target is decoded
    /// from `uddg`. Other absolute links pass through unchanged.
    fn extract_url(href: &str) -> Option<String> {
        let full_href = if href.starts_with("//") {
            format!("https:{href}")
        } else {
            href.to_string()
        };

        let parsed = Url::parse(&full_href).ok()?;
        if parsed
            .host_str()
            .is_some_and(|h| h.ends_with("duckduckgo.com"))
            && parsed.path().starts_with("/l/")
        {
            parsed
                .query_pairs()
                .find(|(key, _)| key == "uddg")
                .map(|(_, value)| value.into_owned())
        } else {
            Some(full_href)
        }
    }

    async fn fetch_page(&self, form: &[(String, String)]) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| ResearchError::SearchUnavailable(format!("DuckDuckGo request failed: {e}")))?
            .error_for_status()
            .map_err(|e| ResearchError::SearchUnavailable(format!("DuckDuckGo HTTP error: {e}")))?;

        response
            .text()
            .await
            .map_err(|e| ResearchError::SearchUnavailable(format!("DuckDuckGo response read failed: {e}")))
    }
}

#[async_trait]
impl SearchBackend for DuckDuckGoEngine {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        tracing::trace!(query, max_results, "DuckDuckGo search");

        let mut form = vec![("q".to_owned(), query.to_owned())];
        if self.safe_search {
            form.push(("kp".to_owned(), "1".to_owned()));
        }

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for page in 0..MAX_PAGES {
            let html = self.fetch_page(&form).await?;
            let parsed = parse_duckduckgo_html(&html);
            if parsed.blocked && results.is_empty() {
                return Err(ResearchError::SearchUnavailable(
                    "DuckDuckGo served a bot-detection page".into(),
                ));
            }

            let before = results.len();
            for result in parsed.results {
                if results.len() >= max_results {
                    break;
                }
                if seen.insert(normalize_url(&result.url)) {
                    results.push(result);
                }
            }
            tracing::debug!(page, added = results.len() - before, total = results.len(), "DuckDuckGo page parsed");

            match parsed.next_form {
                Some(next) if results.len() < max_results && results.len() > before => form = next,
                _ => break,
            }
        }
        Ok(results)
    }
}

/// Parse a DuckDuckGo HTML response page.
///
/// Ads and non-http(s) links are skipped; order is preserved.
pub(crate) fn parse_duckduckgo_html(html: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let mut page = ParsedPage::default();

    let (Ok(result_sel), Ok(title_sel), Ok(snippet_sel), Ok(nav_sel), Ok(input_sel), Ok(anomaly_sel)) = (
        Selector::parse(
            ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
        ),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
        Selector::parse(".nav-link form"),
        Selector::parse("input[type=\"hidden\"]"),
        Selector::parse(".anomaly-modal__title, form#challenge-form"),
    ) else {
        return page;
    };

    for element in document.select(&result_sel) {
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };
        let title = title_el
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if title.is_empty() {
            continue;
        }
        let Some(url) = title_el
            .value()
            .attr("href")
            .and_then(DuckDuckGoEngine::extract_url)
        else {
            continue;
        };
        if parse_http_url(&url).is_none() {
            continue;
        }

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        page.results.push(SearchResult {
            url,
            title,
            snippet,
        });
    }

    // The last nav form is "Next"; the first on later pages is "Previous".
    page.next_form = document.select(&nav_sel).last().and_then(|form| {
        let fields: Vec<(String, String)> = form
            .select(&input_sel)
            .filter_map(|input| {
                let name = input.value().attr("name")?;
                Some((name.to_owned(), input.value().attr("value").unwrap_or("").to_owned()))
            })
            .collect();
        let is_next = fields.iter().any(|(name, _)| name == "s");
        is_next.then_some(fields)
    });
    page.blocked = page.results.is_empty() && document.select(&anomaly_sel).next().is_some();
    page
}
