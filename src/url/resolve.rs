use url::Url;

/// Resolves a link href against a base URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
///
/// # Examples
///
/// ```
/// use url::Url;
/// use winworld_harvester::url::resolve_link;
///
/// let base = Url::parse("https://winworldpc.com/library/operating-systems").unwrap();
/// let resolved = resolve_link("/product/ms-dos", &base).unwrap();
/// assert_eq!(resolved.as_str(), "https://winworldpc.com/product/ms-dos");
/// ```
pub fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) if matches!(absolute_url.scheme(), "http" | "https") => Some(absolute_url),
        _ => None,
    }
}

/// Returns the path of an href, whether it is relative or absolute
///
/// `"/product/x?a=1"` yields `"/product/x"`; `"https://host/product/x"` yields
/// `"/product/x"`. Used for prefix and shape matching on raw anchors.
pub fn href_path(href: &str, base_url: &Url) -> Option<String> {
    resolve_link(href, base_url).map(|url| url.path().to_string())
}
