//! TTL adjustment of running servers

use crate::control::ControlPlane;
use crate::duration::{format_duration, parse_duration};
use crate::error::{ControlError, Result};
use crate::labels::{self, TtlLabel};
use chrono::{DateTime, TimeDelta, Utc};

/// Which way a TTL moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlDirection {
    Extend,
    Prune,
}

impl ControlPlane {
    /// Push the expiry of `name` back by `spec`
    pub async fn extend(&self, name: &str, spec: &str) -> Result<DateTime<Utc>> {
        self.adjust_ttl(name, spec, TtlDirection::Extend).await
    }

    /// Bring the expiry of `name` forward by `spec`
    ///
    /// Pruning into the past is allowed; the reaper collects the server on
    /// its next scan.
    pub async fn prune(&self, name: &str, spec: &str) -> Result<DateTime<Utc>> {
        self.adjust_ttl(name, spec, TtlDirection::Prune).await
    }

    /// Move the stored expiry of `name` by `spec` and return the new expiry
    ///
    /// The result is clamped at the Unix epoch and may not lie more than
    /// `max_ttl` ahead of now. On any error the stored TTL is unchanged.
    pub async fn adjust_ttl(
        &self,
        name: &str,
        spec: &str,
        direction: TtlDirection,
    ) -> Result<DateTime<Utc>> {
        let delta = parse_duration(spec)
            .map_err(|e| ControlError::invalid_ttl(spec, e.to_string()))
            .and_then(|d| {
                TimeDelta::from_std(d).map_err(|e| ControlError::invalid_ttl(spec, e.to_string()))
            })?;
        let max_ttl = self.config.max_ttl;

        let (_, ttl) = self
            .labels
            .update_server(name, |server, labels| {
                if !labels::is_managed(labels) {
                    return Err(ControlError::NotManaged(server.name.clone()));
                }
                let current = match labels::read_ttl(labels) {
                    TtlLabel::At(at) => at,
                    TtlLabel::Missing => return Err(ControlError::MissingTtl(server.name.clone())),
                    TtlLabel::Invalid(raw) => {
                        return Err(ControlError::invalid_ttl(&raw, "stored ttl is not a timestamp"));
                    }
                };

                let exceeded = |requested: DateTime<Utc>| ControlError::TtlBoundExceeded {
                    name: server.name.clone(),
                    requested,
                    limit: format_duration(max_ttl),
                };

                let next = match direction {
                    TtlDirection::Extend => current
                        .checked_add_signed(delta)
                        .ok_or_else(|| exceeded(DateTime::<Utc>::MAX_UTC))?,
                    TtlDirection::Prune => current
                        .checked_sub_signed(delta)
                        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
                        .max(DateTime::<Utc>::UNIX_EPOCH),
                };

                let limit = Utc::now()
                    + TimeDelta::from_std(max_ttl).unwrap_or(TimeDelta::MAX);
                if next > limit {
                    return Err(exceeded(next));
                }

                labels::set_ttl(labels, next);
                Ok(next)
            })
            .await?;

        tracing::info!("TTL of {} set to {}", name, ttl.to_rfc3339());
        Ok(ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCloud, test_config};
    use ttlfleet_cloud::Labels;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn test_extend_from_stored_ttl() {
        let cloud = FakeCloud::new();
        let now = Utc::now().timestamp();
        cloud.add_server("alpha", labels::instance_labels("alpha", at(now + 1800)));
        let control = cloud.control_plane(test_config()).unwrap();

        let ttl = control.extend("alpha", "1h").await.unwrap();
        assert_eq!(ttl, at(now + 5400));

        let stored = cloud.server("alpha").unwrap();
        assert_eq!(labels::read_ttl(&stored.labels), TtlLabel::At(at(now + 5400)));
        assert_eq!(labels::service(&stored.labels), Some("alpha"));
    }

    #[tokio::test]
    async fn test_prune_into_the_past_is_allowed() {
        let cloud = FakeCloud::new();
        let now = Utc::now().timestamp();
        cloud.add_server("alpha", labels::instance_labels("alpha", at(now + 600)));
        let control = cloud.control_plane(test_config()).unwrap();

        let ttl = control.prune("alpha", "15m").await.unwrap();
        assert_eq!(ttl, at(now - 300));
    }

    #[tokio::test]
    async fn test_prune_clamps_at_epoch() {
        let cloud = FakeCloud::new();
        cloud.add_server("alpha", labels::instance_labels("alpha", at(60)));
        let control = cloud.control_plane(test_config()).unwrap();

        assert_eq!(control.prune("alpha", "2h").await.unwrap(), at(0));
    }

    #[tokio::test]
    async fn test_extend_beyond_bound_leaves_ttl() {
        let cloud = FakeCloud::new();
        let now = Utc::now().timestamp();
        cloud.add_server("alpha", labels::instance_labels("alpha", at(now + 11 * 3600)));
        let control = cloud.control_plane(test_config()).unwrap();

        let result = control.extend("alpha", "2h").await;
        assert!(matches!(result, Err(ControlError::TtlBoundExceeded { .. })));
        assert_eq!(cloud.call_count("update_server_labels"), 0);
        assert_eq!(
            labels::read_ttl(&cloud.server("alpha").unwrap().labels),
            TtlLabel::At(at(now + 11 * 3600))
        );
    }

    #[tokio::test]
    async fn test_extend_past_calendar_range_leaves_ttl() {
        let cloud = FakeCloud::new();
        let now = Utc::now().timestamp();
        cloud.add_server("alpha", labels::instance_labels("alpha", at(now + 1800)));
        let control = cloud.control_plane(test_config()).unwrap();

        let result = control.extend("alpha", "3000000000h").await;
        assert!(matches!(result, Err(ControlError::TtlBoundExceeded { .. })));
        assert_eq!(cloud.call_count("update_server_labels"), 0);
        assert_eq!(
            labels::read_ttl(&cloud.server("alpha").unwrap().labels),
            TtlLabel::At(at(now + 1800))
        );
    }

    #[tokio::test]
    async fn test_prune_past_calendar_range_clamps_at_epoch() {
        let cloud = FakeCloud::new();
        cloud.add_server("alpha", labels::instance_labels("alpha", Utc::now()));
        let control = cloud.control_plane(test_config()).unwrap();

        assert_eq!(control.prune("alpha", "3000000000h").await.unwrap(), at(0));
    }

    #[tokio::test]
    async fn test_adjust_rejects_unusable_servers() {
        let cloud = FakeCloud::new();
        cloud.add_server("foreign", Labels::new());
        let mut no_ttl = labels::instance_labels("bare", Utc::now());
        no_ttl.remove(labels::TTL);
        cloud.add_server("bare", no_ttl);
        let control = cloud.control_plane(test_config()).unwrap();

        assert!(matches!(
            control.extend("foreign", "1h").await,
            Err(ControlError::NotManaged(_))
        ));
        assert!(matches!(
            control.extend("bare", "1h").await,
            Err(ControlError::MissingTtl(_))
        ));
        assert!(matches!(
            control.extend("ghost", "1h").await,
            Err(ControlError::InstanceNotFound(_))
        ));
        assert!(matches!(
            control.extend("bare", "later").await,
            Err(ControlError::InvalidTtl { .. })
        ));
    }
}
