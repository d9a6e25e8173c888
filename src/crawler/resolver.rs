//! Canonical identity resolution
//!
//! Many raw anchors on the index page point at the same product through
//! different paths or query strings. The resolver fetches each raw link,
//! reads the page's declared `og:url` (falling back to the post-redirect
//! URL), and remembers every canonical identity it has handed out. A second
//! raw link with a known identity is reported as a duplicate so the page is
//! never processed twice.

use crate::crawler::fetcher::{FetchError, FetchedPage, Fetcher};
use crate::url::resolve_link;
use scraper::{Html, Selector};
use std::collections::HashMap;
use url::Url;

/// A page whose canonical identity was seen for the first time
#[derive(Debug, Clone)]
pub struct ResolvedPage {
    /// The raw href that led here first
    pub raw_link: String,

    /// Canonical identity of the page
    pub canonical: String,

    /// The fetched page, kept so it need not be requested again
    pub page: FetchedPage,
}

/// Outcome of resolving one raw link
#[derive(Debug)]
pub enum Resolution {
    /// First time this canonical identity was seen
    New(ResolvedPage),

    /// Identity already claimed by an earlier raw link
    Duplicate {
        raw_link: String,
        canonical: String,
        first_seen: String,
    },

    /// The href could not be turned into an absolute http(s) URL
    Invalid { raw_link: String },

    /// The fetch failed (network or status)
    Failed { raw_link: String, error: FetchError },

    /// Stop signal observed before fetching
    Cancelled { raw_link: String },
}

/// Reads the `og:url` declaration from a page, if present and non-empty
pub fn extract_canonical(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"meta[property="og:url"]"#).ok()?;

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .find(|content| !content.is_empty())
}

/// Tracks canonical identities for the duration of one crawl
#[derive(Debug)]
pub struct CanonicalResolver {
    base_url: Url,
    first_seen: HashMap<String, String>,
    order: Vec<String>,
}

impl CanonicalResolver {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            first_seen: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Resolves, fetches and deduplicates one raw link
    pub async fn resolve(&mut self, fetcher: &mut Fetcher, raw_link: &str) -> Resolution {
        let raw = raw_link.trim().to_string();

        let Some(absolute) = resolve_link(&raw, &self.base_url) else {
            return Resolution::Invalid { raw_link: raw };
        };

        let page = match fetcher.fetch(&absolute).await {
            Ok(page) => page,
            Err(error) if error.is_cancelled() => return Resolution::Cancelled { raw_link: raw },
            Err(error) => {
                return Resolution::Failed {
                    raw_link: raw,
                    error,
                }
            }
        };

        let canonical = canonical_identity(&page);

        match self.claim(&canonical, &raw) {
            Some(first_seen) => Resolution::Duplicate {
                raw_link: raw,
                canonical,
                first_seen,
            },
            None => Resolution::New(ResolvedPage {
                raw_link: raw,
                canonical,
                page,
            }),
        }
    }

    /// Records `canonical` as claimed by `raw_link`
    ///
    /// Returns the raw link that claimed it first if the identity was
    /// already known, or `None` if this call claimed it.
    pub fn claim(&mut self, canonical: &str, raw_link: &str) -> Option<String> {
        if let Some(first) = self.first_seen.get(canonical) {
            return Some(first.clone());
        }

        self.first_seen
            .insert(canonical.to_string(), raw_link.to_string());
        self.order.push(canonical.to_string());
        None
    }

    /// Canonical identities in first-seen order
    pub fn canonical_urls(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Declared `og:url`, or the final fetched URL when the page declares none
pub fn canonical_identity(page: &FetchedPage) -> String {
    extract_canonical(&page.body).unwrap_or_else(|| page.final_url.to_string())
}
