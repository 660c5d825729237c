//! Command line and environment configuration

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::time::Duration;
use ttlfleet_controlplane::{ControlPlaneConfig, DnsSettings, Role, parse_duration};

#[derive(Parser, Debug)]
#[command(name = "ttlfleetd")]
#[command(version, about = "ttlfleet Control Plane daemon", long_about = None)]
pub struct Cli {
    /// Log as JSON lines instead of human readable text
    #[arg(long, global = true, env = "TTLFLEET_LOG_JSON")]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API and run the TTL reaper
    Serve(ServeArgs),
    /// Issue a bearer token for the HTTP API
    Token(TokenArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (`:8000` listens on all interfaces)
    #[arg(long, env = "TTLFLEET_LISTEN_ADDR", default_value = ":8000")]
    pub listen_addr: String,

    /// Datacenter location for new servers
    #[arg(long, env = "TTLFLEET_LOCATION", default_value = "nbg1")]
    pub location: String,

    /// Private network IDs attached to new servers (comma separated)
    #[arg(long, env = "TTLFLEET_NETWORK_IDS", value_delimiter = ',')]
    pub network_ids: Vec<u64>,

    /// SSH key names injected into new servers (comma separated)
    #[arg(long, env = "TTLFLEET_SSH_KEYS", value_delimiter = ',')]
    pub ssh_keys: Vec<String>,

    /// Hetzner DNS zone ID; empty disables forward DNS
    #[arg(long, env = "TTLFLEET_DNS_ZONE_ID", default_value = "")]
    pub dns_zone_id: String,

    /// Domain of the DNS zone, e.g. example.com
    #[arg(long, env = "TTLFLEET_DNS_DOMAIN", default_value = "")]
    pub dns_domain: String,

    /// Time between reaper scans
    #[arg(long, env = "TTLFLEET_REAPER_INTERVAL", default_value = "5m", value_parser = duration_arg)]
    pub reaper_interval: Duration,

    /// Give up waiting on a provider action after this long; 0 waits forever
    #[arg(long, env = "TTLFLEET_ACTION_TIMEOUT", default_value = "30m", value_parser = duration_arg)]
    pub action_timeout: Duration,

    /// Server type used when a command names none
    #[arg(long, env = "TTLFLEET_DEFAULT_SERVER_TYPE", default_value = "cx11")]
    pub default_server_type: String,

    /// HS256 secret used to verify bearer tokens
    #[arg(long, env = "TTLFLEET_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Subject the token is issued for
    pub subject: String,

    /// Granted role; repeat for several (admin, power-user, user)
    #[arg(long = "role", required = true, value_parser = role_arg)]
    pub roles: Vec<Role>,

    /// Token lifetime
    #[arg(long, default_value = "24h", value_parser = duration_arg)]
    pub ttl: Duration,

    /// HS256 secret used to sign the token
    #[arg(long, env = "TTLFLEET_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
}

fn duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

fn role_arg(s: &str) -> Result<Role, String> {
    s.parse::<Role>().map_err(|e| e.to_string())
}

impl ServeArgs {
    /// Socket address to bind, accepting the `:port` shorthand
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = match self.listen_addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{}", port),
            None => self.listen_addr.clone(),
        };
        addr.parse()
            .with_context(|| format!("invalid listen address '{}'", self.listen_addr))
    }

    pub fn control_plane_config(&self) -> anyhow::Result<ControlPlaneConfig> {
        if self.reaper_interval.is_zero() {
            bail!("--reaper-interval must be greater than zero");
        }

        let mut config = ControlPlaneConfig {
            location: self.location.clone(),
            networks: self.network_ids.clone(),
            ssh_keys: self
                .ssh_keys
                .iter()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect(),
            default_server_type: self.default_server_type.clone(),
            reaper_interval: self.reaper_interval,
            action_timeout: Some(self.action_timeout).filter(|t| !t.is_zero()),
            ..ControlPlaneConfig::default()
        };

        let zone_id = self.dns_zone_id.trim();
        if !zone_id.is_empty() {
            if self.dns_domain.trim().is_empty() {
                bail!("--dns-domain is required when --dns-zone-id is set");
            }
            config = config.with_dns(DnsSettings::new(zone_id, self.dns_domain.trim()));
        }
        Ok(config)
    }
}
