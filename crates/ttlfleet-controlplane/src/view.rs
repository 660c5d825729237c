//! Listing of managed services

use crate::control::ControlPlane;
use crate::error::{ProviderOp, Result, provider_err};
use crate::labels::{self, TtlLabel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use ttlfleet_cloud::{Image, Server, ServerStatus};

/// Lifecycle state of a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// A server exists
    Running,
    /// Only snapshots exist
    Terminated,
}

/// One service as shown to users
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    pub name: String,
    pub state: ServiceState,
    /// Provider status of the server, absent when terminated
    pub status: Option<ServerStatus>,
    pub server_type: Option<String>,
    pub dns: Option<String>,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub ttl: Option<DateTime<Utc>>,
}

impl ServiceView {
    fn running(server: &Server) -> Self {
        let ttl = match labels::read_ttl(&server.labels) {
            TtlLabel::At(at) => Some(at),
            _ => None,
        };
        Self {
            name: server.name.clone(),
            state: ServiceState::Running,
            status: Some(server.status),
            server_type: Some(server.server_type.clone()),
            dns: server.public_net.ipv4_dns_ptr.clone(),
            ipv4: server.public_net.ipv4.map(|ip| ip.to_string()),
            ipv6: server.public_net.ipv6_host().map(|ip| ip.to_string()),
            ttl,
        }
    }

    fn terminated(service: &str, snapshot: &Image) -> Self {
        Self {
            name: service.to_string(),
            state: ServiceState::Terminated,
            status: None,
            server_type: labels::server_type(&snapshot.labels).map(str::to_string),
            dns: None,
            ipv4: None,
            ipv6: None,
            ttl: None,
        }
    }
}

impl std::fmt::Display for ServiceView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let server_type = self.server_type.as_deref().unwrap_or("?");
        match self.state {
            ServiceState::Terminated => write!(f, "{} ({}) terminated", self.name, server_type),
            ServiceState::Running => {
                let status = self
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                write!(f, "{} ({}) {}", self.name, server_type, status)?;
                if let Some(dns) = &self.dns {
                    write!(f, " {}", dns)?;
                }
                if let Some(ttl) = self.ttl {
                    write!(f, " until {}", ttl.to_rfc3339())?;
                }
                Ok(())
            }
        }
    }
}

impl ControlPlane {
    /// Servers carrying the ownership label
    pub async fn list_managed_servers(&self) -> Result<Vec<Server>> {
        let servers = self
            .compute
            .list_servers(Some(&labels::managed_selector()))
            .await
            .map_err(provider_err(ProviderOp::ListServers, "managed"))?;
        Ok(servers
            .into_iter()
            .filter(|server| labels::is_managed(&server.labels))
            .collect())
    }

    /// Running and terminated services, sorted by name
    ///
    /// A service is terminated when it has a managed snapshot but no server.
    pub async fn list_managed(&self) -> Result<Vec<ServiceView>> {
        let servers = self.list_managed_servers().await?;
        let images = self
            .compute
            .list_images(Some(&labels::managed_selector()))
            .await
            .map_err(provider_err(ProviderOp::ListImages, "managed"))?;

        let mut views: BTreeMap<String, ServiceView> = servers
            .iter()
            .map(|server| (server.name.clone(), ServiceView::running(server)))
            .collect();

        let mut newest: BTreeMap<&str, &Image> = BTreeMap::new();
        for image in images.iter().filter(|i| labels::is_managed(&i.labels)) {
            let Some(service) = labels::service(&image.labels) else {
                continue;
            };
            let entry = newest.entry(service).or_insert(image);
            if (image.created, image.id) > (entry.created, entry.id) {
                *entry = image;
            }
        }
        for (service, snapshot) in newest {
            views
                .entry(service.to_string())
                .or_insert_with(|| ServiceView::terminated(service, snapshot));
        }

        Ok(views.into_values().collect())
    }
}
