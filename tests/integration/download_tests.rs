//! End-to-end download scenarios against mock mirrors

use crate::common::test_config;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use winworld_harvester::downloader::{
    plan_downloads, DownloadOrchestrator, IdentityRotator, RotationError,
};
use winworld_harvester::storage::{FileEntry, Product, Version};
use winworld_harvester::TaskState;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Counts invocations and optionally fails each one
#[derive(Default)]
struct CountingRotator {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl IdentityRotator for CountingRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RotationError::ExitStatus {
                command: "test-rotator".to_string(),
                status: "exit status: 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Request paths the mirror has started serving, with their start times
type StartLog = Arc<Mutex<Vec<(String, Instant)>>>;

/// Serves a fixed body after `delay`, logging when each request arrives
struct RecordingMirror {
    started: StartLog,
    delay: Duration,
}

impl Respond for RecordingMirror {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.started
            .lock()
            .unwrap()
            .push((request.url.path().to_string(), Instant::now()));
        ResponseTemplate::new(200)
            .set_body_bytes(vec![7u8; 64])
            .set_delay(self.delay)
    }
}

/// Snapshots the mirror and the download directory on every rotation
struct ObservingRotator {
    started: StartLog,
    downloads: PathBuf,
    seen: Mutex<Vec<(usize, usize)>>,
}

impl ObservingRotator {
    fn finished_files(&self) -> usize {
        std::fs::read_dir(&self.downloads)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| !entry.file_name().to_string_lossy().ends_with(".part"))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl IdentityRotator for ObservingRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        let started = self.started.lock().unwrap().len();
        let finished = self.finished_files();
        self.seen.lock().unwrap().push((started, finished));
        Ok(())
    }
}

/// One product with `files` single-mirror files spread over `mirrors`
fn products(base: &str, files: usize, mirrors: &[&str]) -> Vec<Product> {
    let assignment: Vec<&str> = (0..files).map(|i| mirrors[i % mirrors.len()]).collect();
    products_on(base, &assignment)
}

/// One product whose file `i` is served only by `mirrors[i]`
fn products_on(base: &str, mirrors: &[&str]) -> Vec<Product> {
    let files = mirrors
        .iter()
        .enumerate()
        .map(|(i, mirror)| {
            let mut file = FileEntry::new(format!("file-{}.bin", i));
            file.servers
                .insert(mirror.to_string(), format!("{}/mirror/{}", base, i));
            file
        })
        .collect();

    vec![Product {
        product_url: format!("{}/product/test", base),
        os_name: "Test OS".to_string(),
        versions: vec![Version {
            version_url: format!("{}/product/test/1-0", base),
            files,
        }],
    }]
}

async fn mount_recording_mirror(server: &MockServer, delay: Duration) -> StartLog {
    let started = StartLog::default();
    Mock::given(method("GET"))
        .and(path_regex(r"^/mirror/\d+$"))
        .respond_with(RecordingMirror {
            started: Arc::clone(&started),
            delay,
        })
        .mount(server)
        .await;
    started
}

fn version_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("test").join("1-0")
}

async fn mount_mirror(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/mirror/\d+$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![7u8; 64])
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_mirror_ceiling_is_never_exceeded() {
    let server = MockServer::start().await;
    mount_mirror(&server, Duration::from_millis(150)).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");
    let tasks = plan_downloads(
        &products(&server.uri(), 5, &["server 1"]),
        &config.downloader.base_dir,
    );
    assert_eq!(tasks.len(), 5);

    let orchestrator = DownloadOrchestrator::new(
        &config,
        Arc::new(CountingRotator::default()),
        CancellationToken::new(),
    )
    .unwrap();
    let summary = orchestrator.run(tasks).await;

    assert_eq!(summary.completed, 5);
    assert_eq!(summary.bytes, 5 * 64);
    assert_eq!(orchestrator.admission().peak("server 1"), 3);
    assert_eq!(orchestrator.admission().in_use("server 1"), 0);

    for i in 0..5 {
        let file = config
            .downloader
            .base_dir
            .join("test")
            .join("1-0")
            .join(format!("file-{}.bin", i));
        assert_eq!(std::fs::read(file).unwrap().len(), 64);
    }
}

#[tokio::test]
async fn test_idle_mirror_is_not_held_behind_a_full_one() {
    let server = MockServer::start().await;
    let started = mount_recording_mirror(&server, Duration::from_millis(400)).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");

    let mut mirrors = vec!["server 1"; 6];
    mirrors.push("server 2");
    let tasks = plan_downloads(
        &products_on(&server.uri(), &mirrors),
        &config.downloader.base_dir,
    );

    let orchestrator = DownloadOrchestrator::new(
        &config,
        Arc::new(CountingRotator::default()),
        CancellationToken::new(),
    )
    .unwrap();
    let summary = orchestrator.run(tasks).await;
    assert_eq!(summary.completed, 7);

    let started = started.lock().unwrap().clone();
    let first = started.iter().map(|(_, at)| *at).min().unwrap();
    let idle_start = started
        .iter()
        .find(|(path, _)| path == "/mirror/6")
        .map(|(_, at)| at.duration_since(first))
        .unwrap();

    // Admitted alongside the first three, not after one of them finishes
    assert!(
        idle_start < Duration::from_millis(300),
        "server 2 started {:?} after the first transfer",
        idle_start
    );
    assert_eq!(orchestrator.admission().peak("server 1"), 3);
    assert_eq!(orchestrator.admission().peak("server 2"), 1);
}

#[tokio::test]
async fn test_rotation_runs_once_per_interval_with_nothing_in_flight() {
    let server = MockServer::start().await;
    let started = mount_recording_mirror(&server, Duration::from_millis(30)).await;

    let workdir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), workdir.path(), "1/1000");
    config.downloader.rotation_interval = 2;

    let tasks = plan_downloads(
        &products(&server.uri(), 8, &["server 1", "server 2"]),
        &config.downloader.base_dir,
    );

    let rotator = Arc::new(ObservingRotator {
        started,
        downloads: version_dir(&config.downloader.base_dir),
        seen: Mutex::new(Vec::new()),
    });
    let orchestrator =
        DownloadOrchestrator::new(&config, rotator.clone(), CancellationToken::new()).unwrap();
    let summary = orchestrator.run(tasks).await;

    assert_eq!(summary.completed, 8);

    let multiples: Vec<u64> = summary.rotations.iter().map(|r| r.multiple).collect();
    assert_eq!(multiples, vec![2, 4, 6, 8]);
    assert!(summary.rotations.iter().all(|r| r.succeeded));

    let seen = rotator.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 4);
    for (index, (started, finished)) in seen.iter().enumerate() {
        // Every request the mirror has seen already landed on disk
        assert_eq!(started, finished, "transfer in flight at rotation {}", index);
        assert!(*finished >= 2 * (index + 1));
    }
}

#[tokio::test]
async fn test_rotation_count_is_floor_of_tasks_over_interval() {
    let server = MockServer::start().await;
    let started = mount_recording_mirror(&server, Duration::from_millis(5)).await;

    let workdir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), workdir.path(), "1/1000");
    config.downloader.rotation_interval = 3;
    config.downloader.max_per_mirror = 2;

    let tasks = plan_downloads(
        &products(&server.uri(), 10, &["server 1", "server 2", "server 3"]),
        &config.downloader.base_dir,
    );

    let rotator = Arc::new(ObservingRotator {
        started,
        downloads: version_dir(&config.downloader.base_dir),
        seen: Mutex::new(Vec::new()),
    });
    let orchestrator =
        DownloadOrchestrator::new(&config, rotator.clone(), CancellationToken::new()).unwrap();
    let summary = orchestrator.run(tasks).await;

    assert_eq!(summary.completed, 10);
    assert_eq!(summary.rotations.len(), 3);

    let seen = rotator.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|(started, finished)| started == finished));
}

#[tokio::test]
async fn test_failed_transfers_count_and_rotation_failure_is_not_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/mirror/0$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    mount_mirror(&server, Duration::from_millis(5)).await;

    let workdir = TempDir::new().unwrap();
    let mut config = test_config(&server.uri(), workdir.path(), "1/1000");
    config.downloader.rotation_interval = 2;

    let tasks = plan_downloads(
        &products(&server.uri(), 3, &["server 1"]),
        &config.downloader.base_dir,
    );

    let rotator = Arc::new(CountingRotator {
        calls: AtomicUsize::new(0),
        fail: true,
    });
    let orchestrator =
        DownloadOrchestrator::new(&config, rotator.clone(), CancellationToken::new()).unwrap();
    let summary = orchestrator.run(tasks).await;

    assert_eq!(summary.total, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 2);
    assert_eq!(summary.reports[0].state(), TaskState::Failed);
    assert!(summary.reports[0].error.is_some());

    assert_eq!(rotator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(summary.rotations.len(), 1);
    assert!(!summary.rotations[0].succeeded);
}

#[tokio::test]
async fn test_cancelled_run_launches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");
    let tasks = plan_downloads(
        &products(&server.uri(), 4, &["server 1"]),
        &config.downloader.base_dir,
    );

    let cancel = CancellationToken::new();
    cancel.cancel();

    let rotator = Arc::new(CountingRotator::default());
    let orchestrator = DownloadOrchestrator::new(&config, rotator.clone(), cancel).unwrap();
    let summary = orchestrator.run(tasks).await;

    assert_eq!(summary.total, 4);
    assert_eq!(summary.cancelled, 4);
    assert_eq!(summary.completed, 0);
    assert!(summary
        .reports
        .iter()
        .all(|r| r.state() == TaskState::Cancelled));
    assert!(summary.rotations.is_empty());
    assert_eq!(rotator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_two_mirrors_of_one_file_share_a_destination() {
    let server = MockServer::start().await;
    mount_mirror(&server, Duration::from_millis(20)).await;

    let workdir = TempDir::new().unwrap();
    let config = test_config(&server.uri(), workdir.path(), "1/1000");

    let mut file = FileEntry::new("shared.iso");
    file.servers
        .insert("server 1".to_string(), format!("{}/mirror/1", server.uri()));
    file.servers
        .insert("server 2".to_string(), format!("{}/mirror/2", server.uri()));
    let products = vec![Product {
        product_url: format!("{}/product/x", server.uri()),
        os_name: "X".to_string(),
        versions: vec![Version {
            version_url: format!("{}/product/x/2", server.uri()),
            files: vec![file],
        }],
    }];

    let tasks = plan_downloads(&products, &config.downloader.base_dir);
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].destination, tasks[1].destination);

    let orchestrator = DownloadOrchestrator::new(
        &config,
        Arc::new(CountingRotator::default()),
        CancellationToken::new(),
    )
    .unwrap();
    let summary = orchestrator.run(tasks).await;

    assert_eq!(summary.completed, 2);
    let dest = config.downloader.base_dir.join("x").join("2").join("shared.iso");
    assert_eq!(std::fs::read(dest).unwrap().len(), 64);
}
