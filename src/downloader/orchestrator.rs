//! Download orchestration
//!
//! One task is planned per (file, mirror) pair and queued behind earlier tasks
//! of the same mirror. The dispatcher serves mirror queues round-robin and
//! launches a task only once it holds both a global transfer permit and its
//! mirror's admission slot, so a full mirror never holds back an idle one.
//! Each launched task is registered with the rotation barrier, transfers,
//! releases its slot and reports its completion; the task whose completion
//! lands on a multiple of the rotation interval runs that rotation once
//! everything in flight has finished.

use crate::config::Config;
use crate::crawler::interruptible_pause;
use crate::downloader::admission::{AdmissionPermit, MirrorAdmission};
use crate::downloader::barrier::{Completion, RotationBarrier};
use crate::downloader::rotation::IdentityRotator;
use crate::downloader::transfer::{build_transfer_client, transfer};
use crate::state::TaskState;
use crate::storage::Product;
use crate::url::{sanitize_file_name, version_directory};
use crate::Result;
use reqwest::Client;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// One (file, mirror) transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    /// Position in the plan
    pub id: usize,

    pub file_name: String,

    /// Mirror name the transfer is admitted against
    pub mirror: String,

    pub url: String,

    pub destination: PathBuf,

    pub state: TaskState,
}

impl DownloadTask {
    /// Moves the task to `next`, logging and ignoring illegal transitions
    fn advance(&mut self, next: TaskState) {
        if self.state.can_transition_to(next) {
            tracing::trace!("Task {} [{}]: {} -> {}", self.id, self.mirror, self.state, next);
            self.state = next;
        } else {
            tracing::warn!(
                "Task {} [{}]: illegal transition {} -> {}",
                self.id,
                self.mirror,
                self.state,
                next
            );
        }
    }
}

/// Outcome of one task
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub task: DownloadTask,
    pub bytes: u64,
    pub duration: Duration,
    pub error: Option<String>,
}

impl DownloadReport {
    pub fn state(&self) -> TaskState {
        self.task.state
    }
}

/// One rotation barrier crossing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationRecord {
    /// Completion count that triggered the rotation
    pub multiple: u64,

    /// Whether the rotator reported success
    pub succeeded: bool,

    /// Whether the rotator was skipped because the run was cancelled
    pub skipped: bool,
}

/// Totals for a download run
#[derive(Debug, Clone, Default)]
pub struct DownloadSummary {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub bytes: u64,
    pub duration: Duration,

    /// Per-task reports in plan order
    pub reports: Vec<DownloadReport>,

    /// Rotations in the order they ran
    pub rotations: Vec<RotationRecord>,
}

impl DownloadSummary {
    fn from_reports(
        mut reports: Vec<DownloadReport>,
        rotations: Vec<RotationRecord>,
        duration: Duration,
    ) -> Self {
        reports.sort_by_key(|r| r.task.id);

        let count = |state: TaskState| reports.iter().filter(|r| r.state() == state).count();

        Self {
            total: reports.len(),
            completed: count(TaskState::Completed),
            failed: count(TaskState::Failed),
            cancelled: count(TaskState::Cancelled),
            bytes: reports.iter().map(|r| r.bytes).sum(),
            duration,
            rotations,
            reports,
        }
    }

    pub fn log(&self) {
        tracing::info!(
            "Downloads finished in {:.1}s: {} total, {} completed, {} failed, {} cancelled, {} bytes, {} rotations",
            self.duration.as_secs_f64(),
            self.total,
            self.completed,
            self.failed,
            self.cancelled,
            self.bytes,
            self.rotations.len()
        );

        for report in self.reports.iter().filter(|r| r.error.is_some()) {
            tracing::warn!(
                "Failed: {} from {} ({})",
                report.task.file_name,
                report.task.mirror,
                report.error.as_deref().unwrap_or_default()
            );
        }
    }
}

/// Plans one task per mirror entry of every file
///
/// Versions whose URL has fewer than two path segments are skipped with a
/// warning since they have no destination directory.
pub fn plan_downloads(products: &[Product], base_dir: &Path) -> Vec<DownloadTask> {
    let mut tasks = Vec::new();

    for version in products.iter().flat_map(|p| &p.versions) {
        let directory = match version_directory(base_dir, &version.version_url) {
            Ok(directory) => directory,
            Err(e) => {
                tracing::warn!("Skipping files of {}: {}", version.version_url, e);
                continue;
            }
        };

        for file in &version.files {
            let destination = directory.join(sanitize_file_name(&file.name));

            for (mirror, url) in &file.servers {
                tasks.push(DownloadTask {
                    id: tasks.len(),
                    file_name: file.name.clone(),
                    mirror: mirror.clone(),
                    url: url.clone(),
                    destination: destination.clone(),
                    state: TaskState::Queued,
                });
            }
        }
    }

    tracing::info!("Planned {} download tasks", tasks.len());
    tasks
}

/// Shared handles every launched task needs
#[derive(Clone)]
struct TaskContext {
    client: Client,
    barrier: Arc<RotationBarrier>,
    rotator: Arc<dyn IdentityRotator>,
    rotations: Arc<Mutex<Vec<RotationRecord>>>,
    cancel: CancellationToken,
    idle_timeout: Duration,
    stabilization_delay: Duration,
}

impl TaskContext {
    async fn execute(
        self,
        mut task: DownloadTask,
        slot: AdmissionPermit,
        permit: OwnedSemaphorePermit,
    ) -> DownloadReport {
        let started = Instant::now();

        task.advance(TaskState::Admitted);
        task.advance(TaskState::Transferring);
        tracing::info!(
            "[{}] Downloading {} -> {}",
            task.mirror,
            task.file_name,
            task.destination.display()
        );

        let result = transfer(
            &self.client,
            &task.url,
            &task.destination,
            &task.mirror,
            self.idle_timeout,
        )
        .await;

        drop(permit);
        drop(slot);

        let (bytes, error) = match result {
            Ok(bytes) => {
                task.advance(TaskState::Completed);
                tracing::info!("[{}] Completed {} ({} bytes)", task.mirror, task.file_name, bytes);
                (bytes, None)
            }
            Err(e) => {
                task.advance(TaskState::Failed);
                tracing::warn!(
                    class = e.class(),
                    "[{}] Failed {}: {}",
                    task.mirror,
                    task.file_name,
                    e
                );
                (0, Some(e.to_string()))
            }
        };

        if let Completion::Coordinate { multiple } = self.barrier.complete() {
            self.coordinate_rotation(multiple).await;
        }

        DownloadReport {
            task,
            bytes,
            duration: started.elapsed(),
            error,
        }
    }

    async fn coordinate_rotation(&self, multiple: u64) {
        self.barrier.begin_rotation(multiple).await;

        let (succeeded, skipped) = if self.cancel.is_cancelled() {
            tracing::info!("Skipping rotation after {} transfers: run cancelled", multiple);
            (false, true)
        } else {
            tracing::info!(
                "Reached {} transfers, rotating network identity",
                multiple
            );
            let succeeded = match self.rotator.rotate().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!("Identity rotation failed, continuing: {}", e);
                    false
                }
            };
            interruptible_pause(self.stabilization_delay, &self.cancel).await;
            (succeeded, false)
        };

        self.rotations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(RotationRecord {
                multiple,
                succeeded,
                skipped,
            });

        self.barrier.finish_rotation(multiple);
    }
}

fn cancelled_report(mut task: DownloadTask) -> DownloadReport {
    task.advance(TaskState::Cancelling);
    task.advance(TaskState::Cancelled);
    DownloadReport {
        task,
        bytes: 0,
        duration: Duration::ZERO,
        error: None,
    }
}

/// Queued tasks grouped by mirror in plan order, served round-robin
#[derive(Debug, Default)]
struct MirrorQueues {
    queues: Vec<(String, VecDeque<DownloadTask>)>,
    next: usize,
}

impl MirrorQueues {
    fn new(tasks: Vec<DownloadTask>) -> Self {
        let mut queues: Vec<(String, VecDeque<DownloadTask>)> = Vec::new();

        for task in tasks {
            match queues.iter_mut().find(|(mirror, _)| *mirror == task.mirror) {
                Some((_, queue)) => queue.push_back(task),
                None => queues.push((task.mirror.clone(), VecDeque::from([task]))),
            }
        }

        Self { queues, next: 0 }
    }

    fn is_empty(&self) -> bool {
        self.queues.iter().all(|(_, queue)| queue.is_empty())
    }

    /// Pops the oldest task of the next mirror that has a free admission slot
    fn pop_admitted(
        &mut self,
        admission: &Arc<MirrorAdmission>,
    ) -> Option<(DownloadTask, AdmissionPermit)> {
        let count = self.queues.len();

        for offset in 0..count {
            let index = (self.next + offset) % count;
            let (mirror, queue) = &mut self.queues[index];
            if queue.is_empty() {
                continue;
            }

            let Some(slot) = admission.try_acquire(mirror) else {
                continue;
            };
            if let Some(task) = queue.pop_front() {
                self.next = (index + 1) % count;
                return Some((task, slot));
            }
        }

        None
    }

    /// Removes every queued task, in plan order
    fn drain(&mut self) -> Vec<DownloadTask> {
        let mut tasks: Vec<_> = self
            .queues
            .iter_mut()
            .flat_map(|(_, queue)| queue.drain(..))
            .collect();
        tasks.sort_by_key(|task| task.id);
        tasks
    }
}

fn collect_report(
    reports: &mut Vec<DownloadReport>,
    joined: std::result::Result<DownloadReport, JoinError>,
) {
    match joined {
        Ok(report) => reports.push(report),
        Err(e) => tracing::error!("Download task aborted: {}", e),
    }
}

/// Runs planned tasks under per-mirror and global limits with rotation
pub struct DownloadOrchestrator {
    client: Client,
    admission: Arc<MirrorAdmission>,
    barrier: Arc<RotationBarrier>,
    rotator: Arc<dyn IdentityRotator>,
    max_concurrent: usize,
    idle_timeout: Duration,
    stabilization_delay: Duration,
    cancel: CancellationToken,
}

impl DownloadOrchestrator {
    /// Creates an orchestrator from the downloader configuration
    pub fn new(
        config: &Config,
        rotator: Arc<dyn IdentityRotator>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let downloader = &config.downloader;
        let client = build_transfer_client(&config.user_agent, downloader)?;

        Ok(Self {
            client,
            admission: Arc::new(MirrorAdmission::new(downloader.max_per_mirror)),
            barrier: Arc::new(RotationBarrier::new(downloader.rotation_interval)),
            rotator,
            max_concurrent: downloader.max_concurrent_transfers.max(1),
            idle_timeout: downloader.transfer_timeout(),
            stabilization_delay: downloader.stabilization_delay(),
            cancel,
        })
    }

    /// Admission counters, exposed for inspection
    pub fn admission(&self) -> &MirrorAdmission {
        &self.admission
    }

    /// Runs every task to a terminal state
    ///
    /// Once the cancellation token fires, tasks not yet launched end
    /// `Cancelled` and transfers already running are allowed to finish.
    /// A task is launched only when its own mirror is below the ceiling
    /// and the global transfer limit has room.
    pub async fn run(&self, tasks: Vec<DownloadTask>) -> DownloadSummary {
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let rotations = Arc::new(Mutex::new(Vec::new()));
        let context = TaskContext {
            client: self.client.clone(),
            barrier: Arc::clone(&self.barrier),
            rotator: Arc::clone(&self.rotator),
            rotations: Arc::clone(&rotations),
            cancel: self.cancel.clone(),
            idle_timeout: self.idle_timeout,
            stabilization_delay: self.stabilization_delay,
        };

        tracing::info!(
            "Starting {} transfers (max {} per mirror, {} concurrent, rotate every {})",
            tasks.len(),
            self.admission.ceiling(),
            self.max_concurrent,
            self.barrier.interval()
        );

        let mut queues = MirrorQueues::new(tasks);
        let mut running = JoinSet::new();
        let mut reports = Vec::new();

        while !queues.is_empty() && !self.cancel.is_cancelled() {
            let released = self.admission.released();
            tokio::pin!(released);
            released.as_mut().enable();

            let launch = match Arc::clone(&semaphore).try_acquire_owned() {
                Ok(permit) => queues
                    .pop_admitted(&self.admission)
                    .map(|(task, slot)| (task, slot, permit)),
                Err(_) => None,
            };

            let Some((task, slot, permit)) = launch else {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = &mut released => {}
                    Some(joined) = running.join_next() => collect_report(&mut reports, joined),
                }
                continue;
            };

            let registered = tokio::select! {
                _ = self.cancel.cancelled() => false,
                _ = self.barrier.register() => true,
            };
            if !registered {
                drop(permit);
                drop(slot);
                reports.push(cancelled_report(task));
                break;
            }

            running.spawn(context.clone().execute(task, slot, permit));
        }

        let remaining = queues.drain();
        if !remaining.is_empty() {
            tracing::info!("Cancelled {} queued transfers", remaining.len());
            reports.extend(remaining.into_iter().map(cancelled_report));
        }

        while let Some(joined) = running.join_next().await {
            collect_report(&mut reports, joined);
        }

        let rotations = std::mem::take(
            &mut *rotations
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );

        let summary = DownloadSummary::from_reports(reports, rotations, started.elapsed());
        summary.log();
        summary
    }
}
