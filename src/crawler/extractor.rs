//! Hierarchical link extraction
//!
//! Each tier of the library exposes the next tier through a known page shape:
//! - index page: anchors whose path starts with the product prefix
//! - product page: anchors inside the `ul#releasesList` element
//! - download page: anchors shaped like `/download/<id>/from/<mirror>`
//!
//! Extraction only discovers. Deciding whether a page was already handled is
//! the canonical resolver's job.

use crate::config::MirrorDirectory;
use crate::url::{href_path, resolve_link};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Structural marker of the release list on a product page
pub const RELEASES_LIST_SELECTOR: &str = "ul#releasesList a[href]";

/// A mirror location found on a per-file download page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLink {
    /// Friendly mirror name from the directory (or synthesized)
    pub name: String,

    /// Mirror token extracted from the path, if one was recognizable
    pub token: Option<String>,

    /// Absolute download URL
    pub url: String,
}

fn mirror_path_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/download/.+/from/").expect("valid mirror path regex"))
}

fn mirror_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/from/([0-9a-fA-F\-]+)").expect("valid mirror token regex"))
}

fn anchors() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("a[href]").expect("valid anchor selector"))
}

/// Collects raw product hrefs from the index page
///
/// An anchor qualifies when its resolved path starts with `product_prefix`
/// and it points at the same host as `base_url`. Exact duplicate hrefs are
/// collapsed; differing hrefs for the same product are all returned.
///
/// # Example
///
/// ```
/// use url::Url;
/// use winworld_harvester::crawler::extract_product_links;
///
/// let base = Url::parse("https://winworldpc.com/library/operating-systems").unwrap();
/// let html = r#"<a href="/product/ms-dos">DOS</a><a href="/about">About</a>"#;
/// assert_eq!(extract_product_links(html, &base, "/product/"), vec!["/product/ms-dos"]);
/// ```
pub fn extract_product_links(html: &str, base_url: &Url, product_prefix: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(anchors()) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };

        let Some(resolved) = resolve_link(href, base_url) else {
            continue;
        };

        if resolved.host_str() != base_url.host_str() {
            continue;
        }

        let matches_prefix = href_path(href, base_url)
            .map(|path| path.starts_with(product_prefix))
            .unwrap_or(false);

        if matches_prefix && seen.insert(href.to_string()) {
            links.push(href.to_string());
        }
    }

    links
}

/// Returns the product's display name
///
/// Uses the first `<h1>` text, then the `<title>`, then `fallback`.
pub fn extract_product_name(html: &str, fallback: &str) -> String {
    let document = Html::parse_document(html);

    for selector in ["h1", "title"] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };

        let text = document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(text) = text {
            return text;
        }
    }

    fallback.to_string()
}

/// Collects version links from a product page's release list
///
/// Links are resolved against `base_url` and deduplicated in first-seen
/// order. Returns `None` when the release list is absent so the caller can
/// log a structure mismatch and continue with zero versions.
pub fn extract_version_links(html: &str, base_url: &Url) -> Option<Vec<Url>> {
    let document = Html::parse_document(html);
    let list = Selector::parse("ul#releasesList").ok()?;
    let release_anchors = Selector::parse(RELEASES_LIST_SELECTOR).ok()?;

    document.select(&list).next()?;

    let mut seen = HashSet::new();
    let versions = document
        .select(&release_anchors)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .filter(|url| seen.insert(url.to_string()))
        .collect();

    Some(versions)
}

/// Collects mirror links from a per-file download page
///
/// Each anchor whose href matches `/download/<id>/from/<token>` yields one
/// link. The token is resolved through `mirrors`; unknown tokens become
/// `server_<token>` and links without a recognizable token `server_unknown`.
pub fn extract_mirror_links(
    html: &str,
    base_url: &Url,
    mirrors: &MirrorDirectory,
) -> Vec<MirrorLink> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();

    for element in document.select(anchors()) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };

        if !mirror_path_regex().is_match(href) {
            continue;
        }

        let Some(url) = resolve_link(href, base_url) else {
            continue;
        };

        let token = mirror_token_regex()
            .captures(href)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());

        let name = match &token {
            Some(token) => mirrors.resolve(token),
            None => "server_unknown".to_string(),
        };

        links.push(MirrorLink {
            name,
            token,
            url: url.to_string(),
        });
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_url() -> Url {
        Url::parse("https://winworldpc.com/library/operating-systems").unwrap()
    }

    #[test]
    fn test_product_links_match_prefix_only() {
        let html = r#"
            <html><body>
                <a href="/product/ms-dos">MS-DOS</a>
                <a href="/library/applications">Apps</a>
                <a href="/product/os-2">OS/2</a>
                <a href="https://elsewhere.com/product/fake">Elsewhere</a>
            </body></html>
        "#;
        let links = extract_product_links(html, &base_url(), "/product/");
        assert_eq!(links, vec!["/product/ms-dos", "/product/os-2"]);
    }

    #[test]
    fn test_product_links_keep_variants_but_drop_exact_duplicates() {
        let html = r#"
            <a href="/product/a">A</a>
            <a href="/product/a">A again</a>
            <a href="/product/a?ref=x">A with ref</a>
        "#;
        let links = extract_product_links(html, &base_url(), "/product/");
        assert_eq!(links, vec!["/product/a", "/product/a?ref=x"]);
    }

    #[test]
    fn test_product_name_prefers_h1() {
        let html = "<html><head><title>Title</title></head><body><h1> MS-DOS </h1></body></html>";
        assert_eq!(extract_product_name(html, "fallback"), "MS-DOS");
    }

    #[test]
    fn test_product_name_falls_back_to_title_then_url() {
        let html = "<html><head><title>OS/2 Warp</title></head><body></body></html>";
        assert_eq!(extract_product_name(html, "fallback"), "OS/2 Warp");

        let html = "<html><body><h1>  </h1></body></html>";
        assert_eq!(
            extract_product_name(html, "https://x/product/y"),
            "https://x/product/y"
        );
    }

    #[test]
    fn test_version_links_resolved_and_deduplicated() {
        let html = r#"
            <ul id="releasesList">
                <li><a href="/product/ms-dos/622">6.22</a></li>
                <li><a href="/product/ms-dos/50">5.0</a></li>
                <li><a href="/product/ms-dos/622">6.22 again</a></li>
            </ul>
            <a href="/product/ms-dos/elsewhere">not in list</a>
        "#;
        let versions = extract_version_links(html, &base_url()).unwrap();
        let versions: Vec<&str> = versions.iter().map(Url::as_str).collect();
        assert_eq!(
            versions,
            vec![
                "https://winworldpc.com/product/ms-dos/622",
                "https://winworldpc.com/product/ms-dos/50",
            ]
        );
    }

    #[test]
    fn test_missing_release_list_is_none() {
        let html = r#"<ul id="otherList"><li><a href="/product/x/1">1</a></li></ul>"#;
        assert!(extract_version_links(html, &base_url()).is_none());
    }

    #[test]
    fn test_empty_release_list_is_some_empty() {
        let html = r#"<ul id="releasesList"></ul>"#;
        assert_eq!(extract_version_links(html, &base_url()), Some(vec![]));
    }

    #[test]
    fn test_mirror_links_resolve_names() {
        let html = r#"
            <a href="/download/c39ac2af-c381/from/c3ae6ee2-8099-713d-3411-c3a6e280947e">Server 1</a>
            <a href="/download/c39ac2af-c381/from/c39ac2af-c381-c2bf-1b25-11c3a4e284a2">Server 2</a>
            <a href="/download/c39ac2af-c381/from/deadbeef">Other</a>
            <a href="/download/c39ac2af-c381">Back</a>
        "#;
        let links = extract_mirror_links(html, &base_url(), &MirrorDirectory::builtin());

        assert_eq!(links.len(), 3);
        assert_eq!(links[0].name, "server 1");
        assert_eq!(
            links[0].url,
            "https://winworldpc.com/download/c39ac2af-c381/from/c3ae6ee2-8099-713d-3411-c3a6e280947e"
        );
        assert_eq!(links[1].name, "server 2");
        assert_eq!(links[2].name, "server_deadbeef");
        assert_eq!(links[2].token.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_mirror_link_without_token() {
        let html = r#"<a href="/download/42/from/?mirror=zz">Odd</a>"#;
        let links = extract_mirror_links(html, &base_url(), &MirrorDirectory::builtin());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].name, "server_unknown");
        assert_eq!(links[0].token, None);
    }
}
