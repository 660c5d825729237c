//! Read-modify-write access to resource labels
//!
//! The provider replaces label maps wholesale, so every write must start
//! from a fresh read of the complete map. Writing a partial map would
//! silently drop the other labels.

use crate::error::{ControlError, ProviderOp, Result, provider_err};
use std::sync::Arc;
use ttlfleet_cloud::{ComputeProvider, Image, Labels, Server};

#[derive(Clone)]
pub struct LabelStore {
    compute: Arc<dyn ComputeProvider>,
}

impl LabelStore {
    pub fn new(compute: Arc<dyn ComputeProvider>) -> Self {
        Self { compute }
    }

    /// Re-read a server by name, let `mutate` edit its full label map and
    /// write the result back
    ///
    /// If `mutate` fails nothing is written.
    pub async fn update_server<T, F>(&self, name: &str, mutate: F) -> Result<(Server, T)>
    where
        F: FnOnce(&Server, &mut Labels) -> Result<T> + Send,
        T: Send,
    {
        let server = self
            .compute
            .get_server(name)
            .await
            .map_err(provider_err(ProviderOp::GetServer, name))?
            .ok_or_else(|| ControlError::InstanceNotFound(name.to_string()))?;

        let mut labels = server.labels.clone();
        let value = mutate(&server, &mut labels)?;

        let updated = self
            .compute
            .update_server_labels(server.id, &labels)
            .await
            .map_err(provider_err(ProviderOp::UpdateServerLabels, name))?;
        Ok((updated, value))
    }

    /// Same as [`LabelStore::update_server`] for an image
    ///
    /// `subject` names the image in errors, usually the service it belongs to.
    pub async fn update_image<T, F>(&self, image_id: u64, subject: &str, mutate: F) -> Result<(Image, T)>
    where
        F: FnOnce(&Image, &mut Labels) -> Result<T> + Send,
        T: Send,
    {
        let image = self
            .compute
            .get_image(image_id)
            .await
            .map_err(provider_err(ProviderOp::GetImage, subject))?
            .ok_or_else(|| ControlError::SnapshotNotFound(subject.to_string()))?;

        let mut labels = image.labels.clone();
        let value = mutate(&image, &mut labels)?;

        let updated = self
            .compute
            .update_image_labels(image.id, &labels)
            .await
            .map_err(provider_err(ProviderOp::UpdateImageLabels, subject))?;
        Ok((updated, value))
    }
}
