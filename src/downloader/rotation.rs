//! Network-identity rotation
//!
//! The download orchestrator calls an `IdentityRotator` at each rotation
//! barrier. The default implementation runs an external command with a
//! random numeric identifier appended to its arguments.

use crate::config::RotationConfig;
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum RotationError {
    #[error("failed to start rotation command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("rotation command '{command}' exited with {status}")]
    ExitStatus { command: String, status: String },

    #[error("rotation command '{command}' did not finish within {after:?}")]
    TimedOut { command: String, after: Duration },
}

/// Changes the machine's network identity
#[async_trait]
pub trait IdentityRotator: Send + Sync {
    async fn rotate(&self) -> Result<(), RotationError>;
}

/// Runs `command args... <id>` with `id` drawn from `min_id..=max_id`
///
/// A command still running after `timeout` is killed.
#[derive(Debug, Clone)]
pub struct CommandRotator {
    command: String,
    args: Vec<String>,
    min_id: u32,
    max_id: u32,
    timeout: Duration,
}

impl CommandRotator {
    pub fn new(config: &RotationConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            min_id: config.min_id.min(config.max_id),
            max_id: config.max_id.max(config.min_id),
            timeout: config.timeout(),
        }
    }

    /// Builds the argument list for one invocation
    pub fn arguments(&self, id: u32) -> Vec<String> {
        let mut args = self.args.clone();
        args.push(id.to_string());
        args
    }

    fn pick_id(&self) -> u32 {
        rand::thread_rng().gen_range(self.min_id..=self.max_id)
    }
}

#[async_trait]
impl IdentityRotator for CommandRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        let args = self.arguments(self.pick_id());
        tracing::info!("Rotating identity: {} {}", self.command, args.join(" "));

        let running = Command::new(&self.command)
            .args(&args)
            .kill_on_drop(true)
            .status();

        let status = tokio::time::timeout(self.timeout, running)
            .await
            .map_err(|_| RotationError::TimedOut {
                command: self.command.clone(),
                after: self.timeout,
            })?
            .map_err(|source| RotationError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if !status.success() {
            return Err(RotationError::ExitStatus {
                command: self.command.clone(),
                status: status.to_string(),
            });
        }

        Ok(())
    }
}

/// Rotator used when rotation is disabled
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRotator;

#[async_trait]
impl IdentityRotator for NoopRotator {
    async fn rotate(&self) -> Result<(), RotationError> {
        tracing::info!("Identity rotation disabled; continuing without a change");
        Ok(())
    }
}

/// Picks the rotator for a configuration
pub fn rotator_from_config(config: &RotationConfig) -> Arc<dyn IdentityRotator> {
    if config.enabled {
        Arc::new(CommandRotator::new(config))
    } else {
        Arc::new(NoopRotator)
    }
}
