//! Server type changes and reboots

use crate::control::ControlPlane;
use crate::error::{ControlError, ProviderOp, Result, provider_err};
use crate::labels;
use ttlfleet_cloud::Image;

impl ControlPlane {
    /// Record `server_type` on the newest snapshot of a stopped service
    ///
    /// The next restart of the service uses the new type.
    pub async fn retype(&self, name: &str, server_type: &str) -> Result<Image> {
        if server_type.trim().is_empty() {
            return Err(ControlError::MissingField("serverType"));
        }

        let running = self
            .compute
            .get_server(name)
            .await
            .map_err(provider_err(ProviderOp::GetServer, name))?;
        if running.is_some() {
            return Err(ControlError::InstanceStillRunning(name.to_string()));
        }

        let snapshot = self
            .latest_snapshot(name)
            .await?
            .ok_or_else(|| ControlError::SnapshotNotFound(name.to_string()))?;

        let known = self
            .compute
            .get_server_type(server_type)
            .await
            .map_err(provider_err(ProviderOp::GetServerType, server_type))?;
        if known.is_none() {
            return Err(ControlError::InvalidInstanceType(server_type.to_string()));
        }

        let (image, ()) = self
            .labels
            .update_image(snapshot.id, name, |_, image_labels| {
                image_labels.insert(labels::SERVER_TYPE.to_string(), server_type.to_string());
                Ok(())
            })
            .await?;

        tracing::info!(
            "Snapshot {} of {} will restart as {}",
            image.id,
            name,
            server_type
        );
        Ok(image)
    }

    /// Soft-reboot a managed server and wait for the provider to finish
    pub async fn reboot(&self, name: &str) -> Result<()> {
        let server = self.fetch_managed(name).await?;
        let action = self
            .compute
            .reboot_server(server.id)
            .await
            .map_err(provider_err(ProviderOp::RebootServer, name))?;
        self.await_action(ProviderOp::RebootServer, name, action)
            .await?;
        tracing::info!("Server {} rebooted", name);
        Ok(())
    }
}
