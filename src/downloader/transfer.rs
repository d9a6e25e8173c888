//! Single-file transfer
//!
//! Streams a mirror URL into a `.part` file next to the destination and
//! renames it into place once the body is complete. Each wait on the server
//! (headers, then every body chunk) is bounded by the idle timeout. There are
//! no retries: any failure is terminal for the task.

use crate::config::{DownloaderConfig, UserAgentConfig};
use futures::StreamExt;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("network error for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("timed out after {}s waiting on {url}", .after.as_secs())]
    TimedOut { url: String, after: Duration },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Returns the error class label used in logs
    pub fn class(&self) -> &'static str {
        match self {
            Self::Network { .. } | Self::TimedOut { .. } => "transient-network",
            Self::HttpStatus { .. } => "http-status",
            Self::Io { .. } => "io",
        }
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Builds the HTTP client used for transfers
///
/// Only the connect phase is bounded here; reads are bounded per wait by
/// `transfer`, so large files are not cut off by a whole-request timeout.
pub fn build_transfer_client(
    user_agent: &UserAgentConfig,
    config: &DownloaderConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .connect_timeout(config.connect_timeout())
        .build()
}

/// Lowercase mirror name with every non-alphanumeric run collapsed to `-`
pub fn mirror_slug(mirror: &str) -> String {
    let mut slug = String::with_capacity(mirror.len());
    for c in mirror.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "mirror".to_string()
    } else {
        slug.to_string()
    }
}

/// Temporary path a mirror writes to before the final rename
pub fn part_path(destination: &Path, mirror: &str) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", mirror_slug(mirror)));
    destination.with_file_name(name)
}

/// Downloads `url` to `destination`, returning the number of bytes written
pub async fn transfer(
    client: &Client,
    url: &str,
    destination: &Path,
    mirror: &str,
    idle_timeout: Duration,
) -> Result<u64, TransferError> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e))?;
    }

    let timed_out = || TransferError::TimedOut {
        url: url.to_string(),
        after: idle_timeout,
    };
    let network = |source: reqwest::Error| TransferError::Network {
        url: url.to_string(),
        source,
    };

    let response = timeout(idle_timeout, client.get(url).send())
        .await
        .map_err(|_| timed_out())?
        .map_err(network)?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let part = part_path(destination, mirror);
    let result = async {
        let mut file = File::create(&part)
            .await
            .map_err(|e| TransferError::io(&part, e))?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        loop {
            let next = timeout(idle_timeout, stream.next())
                .await
                .map_err(|_| timed_out())?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(network)?;

            file.write_all(&chunk)
                .await
                .map_err(|e| TransferError::io(&part, e))?;
            written += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| TransferError::io(&part, e))?;
        drop(file);

        tokio::fs::rename(&part, destination)
            .await
            .map_err(|e| TransferError::io(destination, e))?;
        Ok::<u64, TransferError>(written)
    }
    .await;

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&part).await {
            tracing::debug!("Could not remove {}: {}", part.display(), e);
        }
    }

    result
}
