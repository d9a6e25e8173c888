//! Download stage
//!
//! This module fetches every mirrored file of a metadata tree:
//! - Per-mirror admission ceilings
//! - A global limit on launched transfers
//! - Periodic network-identity rotation behind a barrier
//! - Streaming transfers into the version directory layout

mod admission;
mod barrier;
mod orchestrator;
mod rotation;
mod transfer;

pub use admission::{AdmissionPermit, MirrorAdmission};
pub use barrier::{Completion, RotationBarrier};
pub use orchestrator::{
    plan_downloads, DownloadOrchestrator, DownloadReport, DownloadSummary, DownloadTask,
    RotationRecord,
};
pub use rotation::{
    rotator_from_config, CommandRotator, IdentityRotator, NoopRotator, RotationError,
};
pub use transfer::{build_transfer_client, mirror_slug, part_path, transfer, TransferError};

use crate::config::Config;
use crate::storage::Product;
use crate::Result;
use tokio_util::sync::CancellationToken;

/// Downloads every mirrored file of `products` using the configured rotator
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `products` - Metadata tree to download
/// * `cancel` - Cooperative stop signal
pub async fn run_downloads(
    config: &Config,
    products: &[Product],
    cancel: CancellationToken,
) -> Result<DownloadSummary> {
    let tasks = plan_downloads(products, &config.downloader.base_dir);
    let orchestrator =
        DownloadOrchestrator::new(config, rotator_from_config(&config.rotation), cancel)?;
    Ok(orchestrator.run(tasks).await)
}
