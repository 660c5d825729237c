//! Forward and reverse DNS of managed servers

use crate::control::ControlPlane;
use crate::error::{ControlError, ProviderOp, Result, provider_err};
use crate::labels::DnsRecordIds;
use std::net::IpAddr;
use ttlfleet_cloud::{DnsRecord, RecordType, Server};

impl ControlPlane {
    /// Create `<name>.svc` records for the server's public addresses,
    /// persist the record IDs in its labels and point reverse DNS at the
    /// new name
    ///
    /// Returns the updated server and the fully qualified name.
    pub async fn attach_dns(&self, server: &Server) -> Result<(Server, String)> {
        let (Some(settings), Some(dns)) = (self.config.dns.as_ref(), self.dns.as_ref()) else {
            return Err(ControlError::InvalidConfig(
                "DNS is not configured".to_string(),
            ));
        };
        let record_name = settings.record_name(&server.name);
        let fqdn = settings.fqdn(&server.name);

        let ipv4 = server.public_net.ipv4.map(IpAddr::V4);
        let ipv6 = server.public_net.ipv6_host().map(IpAddr::V6);
        if ipv4.is_none() && ipv6.is_none() {
            tracing::warn!("Server {} has no public address, no DNS records created", server.name);
        }

        let mut ids = DnsRecordIds::default();
        for (record_type, ip) in [(RecordType::A, ipv4), (RecordType::Aaaa, ipv6)] {
            let Some(ip) = ip else { continue };
            let record = DnsRecord {
                zone_id: settings.zone_id.clone(),
                record_type,
                name: record_name.clone(),
                value: ip.to_string(),
                ttl: self.config.dns_record_ttl,
            };
            let id = dns
                .create_record(&record)
                .await
                .map_err(provider_err(ProviderOp::CreateDnsRecord, &server.name))?;
            tracing::info!("DNS {} record {} -> {} ({})", record_type, fqdn, ip, id);
            match record_type {
                RecordType::A => ids.a = Some(id),
                RecordType::Aaaa => ids.aaaa = Some(id),
            }
        }

        let (updated, ()) = self
            .labels
            .update_server(&server.name, |_, labels| {
                ids.apply(labels);
                Ok(())
            })
            .await?;

        for ip in [ipv4, ipv6].into_iter().flatten() {
            self.compute
                .change_dns_ptr(server.id, &ip.to_string(), Some(&fqdn))
                .await
                .map_err(provider_err(ProviderOp::ChangeDnsPtr, &server.name))?;
        }

        Ok((updated, fqdn))
    }

    /// Delete the forward records recorded in the server's labels
    ///
    /// Records that are already gone are skipped. Returns the number of
    /// records deleted.
    pub(crate) async fn detach_dns(&self, server: &Server) -> Result<usize> {
        let ids = DnsRecordIds::from_labels(&server.labels);
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(dns) = self.dns.as_ref() else {
            tracing::warn!(
                "Server {} has DNS record labels but DNS is disabled, leaving records",
                server.name
            );
            return Ok(0);
        };

        let mut deleted = 0;
        for (record_type, id) in ids.records() {
            match dns.delete_record(id).await {
                Ok(()) => {
                    tracing::info!("Deleted DNS {} record {} of {}", record_type, id, server.name);
                    deleted += 1;
                }
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        "DNS {} record {} of {} was already deleted",
                        record_type,
                        id,
                        server.name
                    );
                }
                Err(e) => {
                    return Err(provider_err(
                        ProviderOp::DeleteDnsRecord,
                        format!("{} of {}", id, server.name),
                    )(e));
                }
            }
        }
        Ok(deleted)
    }
}
