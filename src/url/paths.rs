use crate::{UrlError, UrlResult};
use std::path::{Path, PathBuf};
use url::Url;

/// Returns the non-empty path segments of a URL
pub fn path_segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Computes the download directory for a version page
///
/// The directory is the URL's last two non-empty path segments joined under
/// `base_dir`, so `https://host/product/ms-dos/622` lands in
/// `<base_dir>/ms-dos/622`.
///
/// # Errors
///
/// Returns `UrlError::Parse` for malformed URLs and `UrlError::ShallowPath`
/// when fewer than two segments are available.
pub fn version_directory(base_dir: &Path, version_url: &str) -> UrlResult<PathBuf> {
    let url = Url::parse(version_url).map_err(|e| UrlError::Parse(e.to_string()))?;
    let segments = path_segments(&url);

    if segments.len() < 2 {
        return Err(UrlError::ShallowPath(version_url.to_string()));
    }

    let parent = segments[segments.len() - 2];
    let leaf = segments[segments.len() - 1];

    Ok(base_dir
        .join(sanitize_file_name(parent))
        .join(sanitize_file_name(leaf)))
}

/// Makes a display name safe to use as a single path component
///
/// Path separators and NUL bytes become `_`; empty names and the special
/// `.`/`..` entries become `download`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "download".to_string(),
        _ => cleaned,
    }
}
