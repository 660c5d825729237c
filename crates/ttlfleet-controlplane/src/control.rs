//! Control plane facade
//!
//! [`ControlPlane`] owns the provider handles and the settings every
//! operation shares. The operations themselves live in the sibling
//! modules as further `impl ControlPlane` blocks.

use crate::config::ControlPlaneConfig;
use crate::error::{ControlError, ProviderOp, Result, provider_err};
use crate::guard::InFlight;
use crate::labels;
use crate::store::LabelStore;
use futures_util::StreamExt;
use std::sync::Arc;
use ttlfleet_cloud::{Action, CloudError, ComputeProvider, DnsProvider, Server, watch_progress};

pub struct ControlPlane {
    pub(crate) config: ControlPlaneConfig,
    pub(crate) compute: Arc<dyn ComputeProvider>,
    pub(crate) dns: Option<Arc<dyn DnsProvider>>,
    pub(crate) labels: LabelStore,
    pub(crate) in_flight: InFlight,
}

impl ControlPlane {
    pub fn new(
        config: ControlPlaneConfig,
        compute: Arc<dyn ComputeProvider>,
        dns: Option<Arc<dyn DnsProvider>>,
    ) -> Result<Self> {
        if config.dns.is_some() && dns.is_none() {
            return Err(ControlError::InvalidConfig(
                "a DNS zone is configured but no DNS provider was given".to_string(),
            ));
        }
        if config.unlock_poll_interval.is_zero() || config.action_poll_interval.is_zero() {
            return Err(ControlError::InvalidConfig(
                "poll intervals must be greater than zero".to_string(),
            ));
        }
        if config.max_ttl.is_zero() {
            return Err(ControlError::InvalidConfig(
                "max ttl must be greater than zero".to_string(),
            ));
        }

        tracing::info!(
            "Control plane using compute provider {} (location {})",
            compute.name(),
            config.location
        );
        match (&config.dns, &dns) {
            (Some(settings), Some(provider)) => tracing::info!(
                "Forward DNS via {} in zone {} ({})",
                provider.name(),
                settings.domain,
                settings.zone_id
            ),
            _ => tracing::info!("Forward DNS disabled"),
        }

        Ok(Self {
            labels: LabelStore::new(compute.clone()),
            config,
            compute,
            dns,
            in_flight: InFlight::default(),
        })
    }

    pub fn config(&self) -> &ControlPlaneConfig {
        &self.config
    }

    pub fn label_store(&self) -> &LabelStore {
        &self.labels
    }

    /// True while a termination of `name` is running
    pub fn is_terminating(&self, name: &str) -> bool {
        self.in_flight.contains(name)
    }

    /// Fetch a server by name and check that the control plane owns it
    pub(crate) async fn fetch_managed(&self, name: &str) -> Result<Server> {
        let server = self
            .compute
            .get_server(name)
            .await
            .map_err(provider_err(ProviderOp::GetServer, name))?
            .ok_or_else(|| ControlError::InstanceNotFound(name.to_string()))?;

        if !labels::is_managed(&server.labels) {
            return Err(ControlError::NotManaged(name.to_string()));
        }
        Ok(server)
    }

    /// Follow a provider action to completion, bounded by `action_timeout`
    pub(crate) async fn await_action(&self, op: ProviderOp, name: &str, action: Action) -> Result<()> {
        match self.config.action_timeout {
            Some(limit) => tokio::time::timeout(limit, self.follow_action(op, name, action))
                .await
                .map_err(|_| ControlError::ActionTimeout {
                    op,
                    name: name.to_string(),
                    waited: limit,
                })?,
            None => self.follow_action(op, name, action).await,
        }
    }

    async fn follow_action(&self, op: ProviderOp, name: &str, action: Action) -> Result<()> {
        let mut progress = watch_progress(
            self.compute.as_ref(),
            action,
            self.config.action_poll_interval,
        );

        while let Some(event) = progress.next().await {
            let percent = event.map_err(provider_err(op, name))?;
            tracing::info!("{} {}: {}%", op, name, percent);
            if percent == 100 {
                return Ok(());
            }
        }

        Err(provider_err(op, name)(CloudError::api(
            "incomplete",
            "action progress ended before completion",
        )))
    }
}

/// Check that `name` is usable as a server name and DNS label
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ControlError::MissingField("serverName"));
    }
    let valid = name.len() <= 63
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !name.starts_with('-')
        && !name.ends_with('-');
    if !valid {
        return Err(ControlError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DnsSettings;
    use crate::testing::{ActionOutcome, FakeCloud, test_config};
    use std::time::Duration;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("alpha").is_ok());
        assert!(validate_name("web-01").is_ok());
        assert!(matches!(
            validate_name(""),
            Err(ControlError::MissingField("serverName"))
        ));
        for bad in ["Alpha", "-alpha", "alpha-", "al.pha", "al pha", &"a".repeat(64)] {
            assert!(
                matches!(validate_name(bad), Err(ControlError::InvalidName(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_dns_zone_requires_provider() {
        let config = ControlPlaneConfig::default().with_dns(DnsSettings::new("z", "example.com"));
        let result = ControlPlane::new(config, FakeCloud::new(), None);
        assert!(matches!(result, Err(ControlError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_fetch_managed_rejects_foreign_server() {
        let cloud = FakeCloud::new();
        cloud.add_server("foreign", Default::default());
        let control = cloud.control_plane(test_config()).unwrap();

        assert!(matches!(
            control.fetch_managed("foreign").await,
            Err(ControlError::NotManaged(_))
        ));
        assert!(matches!(
            control.fetch_managed("ghost").await,
            Err(ControlError::InstanceNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_action_times_out() {
        let cloud = FakeCloud::new();
        cloud.set_action_outcome(ActionOutcome::Hang);
        let mut config = test_config();
        config.action_timeout = Some(Duration::from_secs(30));
        let control = cloud.control_plane(config).unwrap();

        let server = cloud.add_server("alpha", Default::default());
        let action = control.compute.reboot_server(server.id).await.unwrap();
        let result = control
            .await_action(ProviderOp::RebootServer, "alpha", action)
            .await;

        assert!(matches!(
            result,
            Err(ControlError::ActionTimeout {
                op: ProviderOp::RebootServer,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_await_action_surfaces_failure() {
        let cloud = FakeCloud::new();
        cloud.set_action_outcome(ActionOutcome::Fail("disk on fire".to_string()));
        let control = cloud.control_plane(test_config()).unwrap();

        let server = cloud.add_server("alpha", Default::default());
        let action = control.compute.shutdown_server(server.id).await.unwrap();
        let err = control
            .await_action(ProviderOp::ShutdownServer, "alpha", action)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("disk on fire"), "{err}");
    }
}
