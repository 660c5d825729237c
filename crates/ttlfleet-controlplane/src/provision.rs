//! Provisioning: new servers from the blueprint, restarts from snapshots

use crate::control::{ControlPlane, validate_name};
use crate::duration::{format_duration, parse_duration};
use crate::error::{ControlError, ProviderOp, Result, provider_err};
use crate::labels;
use chrono::{DateTime, TimeDelta, Utc};
use ttlfleet_cloud::{CreateServerRequest, Image, ImageType, LabelSelector, Server};

impl ControlPlane {
    /// Create a server named `name` from the active blueprint
    ///
    /// The returned server carries its forward DNS name in
    /// `public_net.ipv4_dns_ptr` when DNS is enabled.
    pub async fn create_new(&self, name: &str, server_type: &str, ttl: &str) -> Result<Server> {
        validate_name(name)?;
        if server_type.trim().is_empty() {
            return Err(ControlError::MissingField("serverType"));
        }
        let lifetime = self.requested_lifetime(ttl)?;
        let blueprint = self.find_blueprint().await?;

        tracing::info!(
            "Creating server {} ({}) from blueprint {}",
            name,
            server_type,
            blueprint.display_name()
        );
        self.provision(name, server_type, &blueprint, lifetime).await
    }

    /// Start a server again from the newest snapshot of service `name`
    pub async fn restart(&self, name: &str, ttl: &str) -> Result<Server> {
        validate_name(name)?;
        let lifetime = self.requested_lifetime(ttl)?;

        let existing = self
            .compute
            .get_server(name)
            .await
            .map_err(provider_err(ProviderOp::GetServer, name))?;
        if existing.is_some() {
            return Err(ControlError::InstanceStillRunning(name.to_string()));
        }

        let snapshot = self
            .latest_snapshot(name)
            .await?
            .ok_or_else(|| ControlError::SnapshotNotFound(name.to_string()))?;

        let server_type = match labels::server_type(&snapshot.labels) {
            Some(server_type) => server_type.to_string(),
            None => {
                tracing::warn!(
                    "Snapshot {} of {} has no server type, using {}",
                    snapshot.id,
                    name,
                    self.config.default_server_type
                );
                self.config.default_server_type.clone()
            }
        };

        tracing::info!(
            "Restarting server {} ({}) from snapshot {}",
            name,
            server_type,
            snapshot.id
        );
        self.provision(name, &server_type, &snapshot, lifetime).await
    }

    /// The image marked as active blueprint
    ///
    /// If several images carry the marker the newest one wins.
    pub async fn find_blueprint(&self) -> Result<Image> {
        let images = self
            .compute
            .list_images(Some(&labels::blueprint_selector()))
            .await
            .map_err(provider_err(ProviderOp::ListImages, "blueprint"))?;

        let blueprints: Vec<Image> = images
            .into_iter()
            .filter(|image| labels::is_active_blueprint(&image.labels))
            .collect();
        if blueprints.len() > 1 {
            tracing::warn!(
                "{} images are marked as active blueprint, using the newest",
                blueprints.len()
            );
        }

        blueprints
            .into_iter()
            .max_by_key(|image| (image.created, image.id))
            .ok_or(ControlError::BlueprintNotFound)
    }

    /// Newest managed snapshot of `service`
    pub async fn latest_snapshot(&self, service: &str) -> Result<Option<Image>> {
        let images = self
            .compute
            .list_images(Some(&LabelSelector::equals(labels::SERVICE, service)))
            .await
            .map_err(provider_err(ProviderOp::ListImages, service))?;

        Ok(images
            .into_iter()
            .filter(|image| {
                image.image_type == ImageType::Snapshot
                    && labels::is_managed(&image.labels)
                    && labels::service(&image.labels) == Some(service)
            })
            .max_by_key(|image| (image.created, image.id)))
    }

    /// Parse and bound a provisioning TTL
    pub(crate) fn requested_lifetime(&self, spec: &str) -> Result<TimeDelta> {
        let lifetime =
            parse_duration(spec).map_err(|e| ControlError::invalid_ttl(spec, e.to_string()))?;
        if lifetime.is_zero() {
            return Err(ControlError::invalid_ttl(spec, "must be greater than zero"));
        }
        if lifetime > self.config.max_ttl {
            return Err(ControlError::invalid_ttl(
                spec,
                format!("must not exceed {}", format_duration(self.config.max_ttl)),
            ));
        }
        TimeDelta::from_std(lifetime).map_err(|e| ControlError::invalid_ttl(spec, e.to_string()))
    }

    async fn provision(
        &self,
        name: &str,
        server_type: &str,
        image: &Image,
        lifetime: TimeDelta,
    ) -> Result<Server> {
        let ttl: DateTime<Utc> = Utc::now() + lifetime;
        let request = CreateServerRequest {
            name: name.to_string(),
            server_type: server_type.to_string(),
            image: image.id,
            location: self.config.location.clone(),
            start_after_create: true,
            labels: labels::instance_labels(name, ttl),
            networks: self.config.networks.clone(),
            ssh_keys: self.config.ssh_keys.clone(),
        };

        let created = self
            .compute
            .create_server(&request)
            .await
            .map_err(provider_err(ProviderOp::CreateServer, name))?;
        let server = created.server;
        tracing::info!(
            "Server {} created (id {}), expires at {}",
            name,
            server.id,
            ttl.to_rfc3339()
        );

        if self.config.dns.is_none() {
            tracing::debug!("DNS disabled, not attaching records to {}", name);
            return Ok(server);
        }

        let (mut server, fqdn) = self.attach_dns(&server).await?;
        server.public_net.ipv4_dns_ptr = Some(fqdn);
        Ok(server)
    }
}
