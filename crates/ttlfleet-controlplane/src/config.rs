//! Control plane configuration

use std::time::Duration;

/// Forward DNS settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsSettings {
    /// Zone ID at the DNS provider
    pub zone_id: String,
    /// Zone domain, e.g. "example.com"
    pub domain: String,
}

impl DnsSettings {
    pub fn new(zone_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            zone_id: zone_id.into(),
            domain: domain.into().trim_matches('.').to_string(),
        }
    }

    /// Record name relative to the zone (`<name>.svc`)
    pub fn record_name(&self, server_name: &str) -> String {
        format!("{}.svc", server_name)
    }

    /// Fully qualified name (`<name>.svc.<domain>`)
    pub fn fqdn(&self, server_name: &str) -> String {
        format!("{}.{}", self.record_name(server_name), self.domain)
    }
}

/// Settings shared by every control plane operation
#[derive(Debug, Clone)]
pub struct ControlPlaneConfig {
    /// Datacenter location for new servers
    pub location: String,
    /// Private networks attached to new servers
    pub networks: Vec<u64>,
    /// SSH keys injected into new servers
    pub ssh_keys: Vec<String>,
    /// Forward DNS; `None` skips DNS attachment
    pub dns: Option<DnsSettings>,
    /// TTL of created DNS records in seconds
    pub dns_record_ttl: u32,

    /// Server type for `!server new` without an explicit type,
    /// and for restarts of snapshots that carry no type label
    pub default_server_type: String,
    /// TTL for chat commands that omit one
    pub default_ttl: String,
    /// Upper bound of any TTL, measured from now
    pub max_ttl: Duration,

    /// Time between reaper scans
    pub reaper_interval: Duration,
    /// Poll interval while waiting for a server lock to clear
    pub unlock_poll_interval: Duration,
    /// Give up waiting for a server lock after this long
    pub unlock_timeout: Duration,
    /// Poll interval for provider action progress
    pub action_poll_interval: Duration,
    /// Give up waiting on a provider action after this long; `None` waits forever
    pub action_timeout: Option<Duration>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            location: "nbg1".to_string(),
            networks: Vec::new(),
            ssh_keys: Vec::new(),
            dns: None,
            dns_record_ttl: 300,
            default_server_type: "cx11".to_string(),
            default_ttl: "12h".to_string(),
            max_ttl: Duration::from_secs(12 * 3600),
            reaper_interval: Duration::from_secs(5 * 60),
            unlock_poll_interval: Duration::from_secs(5),
            unlock_timeout: Duration::from_secs(60),
            action_poll_interval: Duration::from_secs(5),
            action_timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl ControlPlaneConfig {
    pub fn with_dns(mut self, dns: DnsSettings) -> Self {
        self.dns = Some(dns);
        self
    }
}
