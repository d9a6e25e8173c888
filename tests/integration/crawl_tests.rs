//! End-to-end crawl scenarios against a mock library

use crate::common::{
    download_page, html, og_url, product_page, test_config, version_page, SERVER_1_TOKEN,
    SERVER_2_TOKEN,
};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use winworld_harvester::config::MirrorDirectory;
use winworld_harvester::crawler::{run_crawl, Coordinator};
use winworld_harvester::output::CrawlEvent;
use winworld_harvester::storage::{JsonStorage, Storage};
use winworld_harvester::{HarvestError, PageState};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LIBRARY_PATH: &str = "/library/operating-systems";

async fn mount_html(server: &MockServer, route: &str, body: String) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Library with one product reachable through two raw links
async fn mount_library(server: &MockServer) {
    let uri = server.uri();

    mount_html(
        server,
        LIBRARY_PATH,
        html(
            "<title>Library</title>",
            r#"<a href="/product/a">Product A</a>
               <a href="/product/a?ref=x">Product A again</a>
               <a href="/about">About</a>"#,
        ),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/product/a"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(product_page(
                &format!("{}/product/a", uri),
                "Product A",
                &["/product/a/1"],
            )),
        )
        .expect(2)
        .mount(server)
        .await;

    let version = html(
        "",
        r#"<table id="downloadsTable">
            <tr><th>Name</th><th>Size</th><th>Arch</th></tr>
            <tr><td><a href="/download/1">first.7z</a></td><td>1 MB</td><td><img src="a.png" title="x86"></td></tr>
            <tr><td><a href="/download/2">second.7z</a></td><td>2 MB</td></tr>
            <tr><td><a href="/download/3">third.7z</a></td><td>3 MB</td><td><img src="b.png" alt="PowerPC"></td></tr>
        </table>"#,
    );
    mount_html(server, "/product/a/1", version).await;

    mount_html(
        server,
        "/download/1",
        download_page("1", &[SERVER_1_TOKEN, SERVER_2_TOKEN]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/download/3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_duplicate_canonical_yields_one_product() {
    let server = MockServer::start().await;
    mount_library(&server).await;
    let uri = server.uri();

    let workdir = TempDir::new().unwrap();
    let config = test_config(&uri, workdir.path(), "1/1000");
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = run_crawl(
        &config,
        MirrorDirectory::builtin(),
        CancellationToken::new(),
        Some(tx),
    )
    .await
    .expect("crawl should succeed");

    assert!(!outcome.cancelled);
    assert_eq!(outcome.products.len(), 1);

    let product = &outcome.products[0];
    assert_eq!(product.product_url, format!("{}/product/a", uri));
    assert_eq!(product.os_name, "Product A");
    assert_eq!(product.versions.len(), 1);
    assert_eq!(
        product.versions[0].version_url,
        format!("{}/product/a/1", uri)
    );

    let stats = &outcome.statistics;
    assert_eq!(stats.raw_product_links, 2);
    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(stats.products, 1);
    assert_eq!(stats.files, 2);
    assert_eq!(stats.files_with_mirrors, 1);
    assert_eq!(stats.units_in(PageState::Cancelled), 0);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(
        e,
        CrawlEvent::Status(msg) if msg.starts_with("Duplicate canonical skipped")
    )));
    assert!(events.contains(&CrawlEvent::Overall(100)));
    assert!(events.contains(&CrawlEvent::Inner(100)));
}

#[tokio::test]
async fn test_download_table_rows_and_mirrors() {
    let server = MockServer::start().await;
    mount_library(&server).await;
    let uri = server.uri();

    let workdir = TempDir::new().unwrap();
    let config = test_config(&uri, workdir.path(), "1/1000");

    let outcome = run_crawl(&config, MirrorDirectory::builtin(), CancellationToken::new(), None)
        .await
        .unwrap();

    let files = &outcome.products[0].versions[0].files;
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["first.7z", "third.7z"]);

    let first = &files[0];
    assert_eq!(first.size.as_deref(), Some("1 MB"));
    assert_eq!(first.architecture.as_deref(), Some("x86"));
    assert_eq!(
        first.servers.get("server 1"),
        Some(&format!("{}/download/1/from/{}", uri, SERVER_1_TOKEN))
    );
    assert_eq!(
        first.servers.get("server 2"),
        Some(&format!("{}/download/1/from/{}", uri, SERVER_2_TOKEN))
    );

    // Download page answered 500: the file is kept without mirrors
    let third = &files[1];
    assert_eq!(third.architecture.as_deref(), Some("PowerPC"));
    assert!(third.servers.is_empty());
}

#[tokio::test]
async fn test_metadata_survives_json_roundtrip() {
    let server = MockServer::start().await;
    mount_library(&server).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");

    let outcome = run_crawl(&config, MirrorDirectory::builtin(), CancellationToken::new(), None)
        .await
        .unwrap();

    let storage = JsonStorage::new(&config.output.metadata_path);
    storage.save(&outcome.products).unwrap();
    let loaded = storage.load().unwrap();

    assert_eq!(loaded, outcome.products);
}

#[tokio::test]
async fn test_missing_release_list_is_zero_versions() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_html(
        &server,
        LIBRARY_PATH,
        html("", r#"<a href="/product/b">B</a>"#),
    )
    .await;
    mount_html(
        &server,
        "/product/b",
        html(&og_url(&format!("{}/product/b", uri)), "<h1>B</h1><p>no list</p>"),
    )
    .await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&uri, workdir.path(), "1/5");

    let started = Instant::now();
    let outcome = run_crawl(&config, MirrorDirectory::builtin(), CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(outcome.products.len(), 1);
    assert!(outcome.products[0].versions.is_empty());
    assert_eq!(outcome.statistics.requests_sent, 2);

    // Two requests are separated by at least the pacing delay
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_version_without_table_has_no_files() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_html(
        &server,
        LIBRARY_PATH,
        html("", r#"<a href="/product/c">C</a>"#),
    )
    .await;
    mount_html(
        &server,
        "/product/c",
        product_page(&format!("{}/product/c", uri), "C", &["/product/c/1", "/product/c/2"]),
    )
    .await;
    mount_html(&server, "/product/c/1", html("", "<p>nothing here</p>")).await;
    mount_html(
        &server,
        "/product/c/2",
        version_page(&[("disk.img", "/download/9", "720 KB")]),
    )
    .await;
    mount_html(&server, "/download/9", download_page("9", &["deadbeef"])).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&uri, workdir.path(), "1/1000");

    let outcome = run_crawl(&config, MirrorDirectory::builtin(), CancellationToken::new(), None)
        .await
        .unwrap();

    let versions = &outcome.products[0].versions;
    assert_eq!(versions.len(), 2);
    assert!(versions[0].files.is_empty());
    assert_eq!(versions[1].files.len(), 1);
    assert_eq!(
        versions[1].files[0].servers.keys().collect::<Vec<_>>(),
        vec!["server_deadbeef"]
    );
}

#[tokio::test]
async fn test_failed_version_page_is_skipped() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_html(
        &server,
        LIBRARY_PATH,
        html("", r#"<a href="/product/d">D</a>"#),
    )
    .await;
    mount_html(
        &server,
        "/product/d",
        product_page(&format!("{}/product/d", uri), "D", &["/product/d/1", "/product/d/2"]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/product/d/1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_html(&server, "/product/d/2", version_page(&[])).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&uri, workdir.path(), "1/1000");

    let outcome = run_crawl(&config, MirrorDirectory::builtin(), CancellationToken::new(), None)
        .await
        .unwrap();

    let versions = &outcome.products[0].versions;
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_url, format!("{}/product/d/2", uri));
    assert_eq!(outcome.statistics.units_in(PageState::Skipped), 1);
}

#[tokio::test]
async fn test_unreachable_index_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(LIBRARY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");

    let result =
        run_crawl(&config, MirrorDirectory::builtin(), CancellationToken::new(), None).await;
    assert!(matches!(result, Err(HarvestError::Fetch(_))));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = Coordinator::new(&config, MirrorDirectory::builtin(), cancel, None)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(outcome.cancelled);
    assert!(outcome.products.is_empty());
    assert_eq!(outcome.statistics.requests_sent, 0);
}

#[tokio::test]
async fn test_cancel_mid_crawl_keeps_partial_tree() {
    let server = MockServer::start().await;
    let uri = server.uri();

    mount_html(
        &server,
        LIBRARY_PATH,
        html("", r#"<a href="/product/e">E</a><a href="/product/f">F</a>"#),
    )
    .await;
    mount_html(
        &server,
        "/product/e",
        product_page(&format!("{}/product/e", uri), "E", &["/product/e/1"]),
    )
    .await;
    mount_html(
        &server,
        "/product/f",
        product_page(&format!("{}/product/f", uri), "F", &["/product/f/1"]),
    )
    .await;
    mount_html(&server, "/product/e/1", version_page(&[])).await;
    mount_html(&server, "/product/f/1", version_page(&[])).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&uri, workdir.path(), "1/5");
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let crawl = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            run_crawl(&config, MirrorDirectory::builtin(), cancel, Some(tx)).await
        })
    };

    // Stop as soon as the first product starts its version tier
    while let Some(event) = rx.recv().await {
        if event == CrawlEvent::Inner(0) {
            cancel.cancel();
            break;
        }
    }

    let outcome = crawl.await.unwrap().unwrap();
    assert!(outcome.cancelled);
    assert_eq!(outcome.products.len(), 1);
    assert_eq!(outcome.products[0].os_name, "E");
    assert!(outcome.products[0].versions.is_empty());
    assert!(outcome.statistics.units_in(PageState::Cancelled) >= 1);
}
