//! Shared fixtures for integration tests

use std::path::Path;
use winworld_harvester::config::{parse_config, Config};

/// Token the built-in mirror table maps to "server 1"
pub const SERVER_1_TOKEN: &str = "c3ae6ee2-8099-713d-3411-c3a6e280947e";

/// Token the built-in mirror table maps to "server 2"
pub const SERVER_2_TOKEN: &str = "c39ac2af-c381-c2bf-1b25-11c3a4e284a2";

/// Builds a validated test configuration pointing at `base_url`
pub fn test_config(base_url: &str, workdir: &Path, request_delay: &str) -> Config {
    let toml = format!(
        r#"
[site]
base-url = "{base_url}"
library-path = "/library/operating-systems"
product-prefix = "/product/"

[crawler]
request-delay = "{request_delay}"
request-timeout-secs = 5

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"

[output]
metadata-path = "{metadata}"

[downloader]
base-dir = "{base_dir}"
max-per-mirror = 3
max-concurrent-transfers = 6
rotation-interval = 50
stabilization-delay-secs = 0
transfer-timeout-secs = 5
connect-timeout-secs = 5

[rotation]
enabled = false
"#,
        metadata = workdir.join("metadata.json").display(),
        base_dir = workdir.join("downloads").display(),
    );

    parse_config(&toml).expect("test config must be valid")
}

/// Wraps a body in a minimal HTML document
pub fn html(head: &str, body: &str) -> String {
    format!(
        "<html><head>{}</head><body>{}</body></html>",
        head, body
    )
}

/// `og:url` meta tag
pub fn og_url(url: &str) -> String {
    format!(r#"<meta property="og:url" content="{}">"#, url)
}

/// Product page with a release list
pub fn product_page(canonical: &str, name: &str, versions: &[&str]) -> String {
    let items: String = versions
        .iter()
        .map(|v| format!(r#"<li><a href="{}">{}</a></li>"#, v, v))
        .collect();
    html(
        &og_url(canonical),
        &format!(r#"<h1>{}</h1><ul id="releasesList">{}</ul>"#, name, items),
    )
}

/// Version page with a download table of `(name, download path, size)` rows
pub fn version_page(rows: &[(&str, &str, &str)]) -> String {
    let rows: String = rows
        .iter()
        .map(|(name, href, size)| {
            format!(
                r#"<tr><td><a href="{}">{}</a></td><td>{}</td><td><img src="a.png" title="x86"></td></tr>"#,
                href, name, size
            )
        })
        .collect();
    html(
        "",
        &format!(
            r#"<table id="downloadsTable"><thead><tr><th>Name</th><th>Size</th><th>Arch</th></tr></thead><tbody>{}</tbody></table>"#,
            rows
        ),
    )
}

/// Download page listing mirror links for one file id
pub fn download_page(file_id: &str, tokens: &[&str]) -> String {
    let links: String = tokens
        .iter()
        .map(|t| format!(r#"<a href="/download/{}/from/{}">Mirror</a>"#, file_id, t))
        .collect();
    html("", &links)
}
