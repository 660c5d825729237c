//! Termination workflow
//!
//! ```text
//! shutdown ─▶ snapshot ─▶ prune previous snapshot ─▶ wait for unlock ─▶ delete ─▶ DNS cleanup
//! ```
//!
//! Each step must finish before the next one starts. The first failing step
//! aborts the workflow; whatever was done until then stays done.

use crate::control::ControlPlane;
use crate::error::{ControlError, ProviderOp, Result, provider_err};
use crate::labels;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use ttlfleet_cloud::{CreateImageRequest, Image, ImageType, Server};

/// Workflow step, logged as it starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationPhase {
    ShuttingDown,
    Snapshotting,
    PruningSnapshot,
    AwaitingUnlock,
    Deleting,
    CleaningDns,
}

impl std::fmt::Display for TerminationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminationPhase::ShuttingDown => "shutting down",
            TerminationPhase::Snapshotting => "snapshotting",
            TerminationPhase::PruningSnapshot => "pruning previous snapshot",
            TerminationPhase::AwaitingUnlock => "waiting for unlock",
            TerminationPhase::Deleting => "deleting",
            TerminationPhase::CleaningDns => "cleaning up DNS",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a completed termination
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Termination {
    pub server: String,
    pub snapshot_id: u64,
    pub pruned_snapshot_id: Option<u64>,
    pub dns_records_deleted: usize,
}

impl ControlPlane {
    /// Shut down, snapshot and delete a managed server
    ///
    /// At most one termination per server name runs at a time; a concurrent
    /// call fails with [`ControlError::AlreadyInProgress`].
    pub async fn terminate(&self, name: &str) -> Result<Termination> {
        let _guard = self.in_flight.acquire(name)?;
        let server = self.fetch_managed(name).await?;
        let service = labels::service(&server.labels)
            .unwrap_or(&server.name)
            .to_string();

        // 1. Graceful shutdown
        phase(name, TerminationPhase::ShuttingDown);
        let action = self
            .compute
            .shutdown_server(server.id)
            .await
            .map_err(provider_err(ProviderOp::ShutdownServer, name))?;
        self.await_action(ProviderOp::ShutdownServer, name, action)
            .await?;

        // 2. Snapshot
        phase(name, TerminationPhase::Snapshotting);
        let request = CreateImageRequest {
            description: format!(
                "{}/{}",
                name,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            labels: labels::snapshot_labels(&service, &server.server_type),
        };
        let created = self
            .compute
            .create_image(server.id, &request)
            .await
            .map_err(provider_err(ProviderOp::CreateSnapshot, name))?;
        self.await_action(ProviderOp::CreateSnapshot, name, created.action)
            .await?;
        tracing::info!("Snapshot {} of {} created", created.image.id, name);

        // 3. The boot image is superseded by the new snapshot
        let pruned_snapshot_id = match server.image.as_ref() {
            Some(image) if is_prunable(image, created.image.id) => {
                phase(name, TerminationPhase::PruningSnapshot);
                self.prune_snapshot(name, image).await?
            }
            _ => None,
        };

        // 4. The provider rejects deletes while the snapshot holds the lock
        phase(name, TerminationPhase::AwaitingUnlock);
        let server = match self.await_unlock(name).await? {
            // 5. Delete
            Some(unlocked) => {
                phase(name, TerminationPhase::Deleting);
                match self.compute.delete_server(unlocked.id).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {
                        tracing::warn!("Server {} was already deleted", name);
                    }
                    Err(e) => return Err(provider_err(ProviderOp::DeleteServer, name)(e)),
                }
                unlocked
            }
            None => {
                tracing::warn!("Server {} disappeared while waiting for unlock", name);
                server
            }
        };

        // 6. Forward DNS
        phase(name, TerminationPhase::CleaningDns);
        let dns_records_deleted = self.detach_dns(&server).await?;

        tracing::info!("Server {} terminated", name);
        Ok(Termination {
            server: name.to_string(),
            snapshot_id: created.image.id,
            pruned_snapshot_id,
            dns_records_deleted,
        })
    }

    async fn prune_snapshot(&self, name: &str, image: &Image) -> Result<Option<u64>> {
        match self.compute.delete_image(image.id).await {
            Ok(()) => {
                tracing::info!("Deleted previous snapshot {} of {}", image.id, name);
                Ok(Some(image.id))
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!("Previous snapshot {} of {} was already deleted", image.id, name);
                Ok(None)
            }
            Err(e) => Err(provider_err(
                ProviderOp::DeleteImage,
                format!("{} (previous snapshot of {})", image.id, name),
            )(e)),
        }
    }

    /// Poll until the server lock clears, bounded by `unlock_timeout`
    ///
    /// `None` if the server is gone.
    async fn await_unlock(&self, name: &str) -> Result<Option<Server>> {
        let limit = self.config.unlock_timeout;
        tokio::time::timeout(limit, self.poll_unlocked(name))
            .await
            .map_err(|_| ControlError::UnlockTimeout {
                name: name.to_string(),
                waited: limit,
            })?
    }

    async fn poll_unlocked(&self, name: &str) -> Result<Option<Server>> {
        let mut ticker = tokio::time::interval(self.config.unlock_poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(server) = self
                .compute
                .get_server(name)
                .await
                .map_err(provider_err(ProviderOp::GetServer, name))?
            else {
                return Ok(None);
            };
            if !server.locked {
                return Ok(Some(server));
            }
            tracing::debug!("Server {} is still locked", name);
        }
    }
}

fn phase(name: &str, phase: TerminationPhase) {
    tracing::info!("Terminating {}: {}", name, phase);
}

/// Only unprotected snapshots other than the active blueprint are pruned
fn is_prunable(image: &Image, new_snapshot_id: u64) -> bool {
    image.image_type == ImageType::Snapshot
        && image.id != new_snapshot_id
        && !labels::is_active_blueprint(&image.labels)
        && !image.protection.delete
}
