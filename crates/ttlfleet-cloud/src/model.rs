//! Provider-neutral resource model
//!
//! Mirrors the subset of the compute provider's objects the control plane
//! reads: servers, images (snapshots), server types and DNS records.

use crate::label::Labels;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, Ipv6Addr};

/// A compute instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    /// Provider-assigned ID
    pub id: u64,

    /// Unique human-readable name
    pub name: String,

    /// Current provider status
    pub status: ServerStatus,

    /// Name of the server type (e.g. "cx11")
    pub server_type: String,

    /// Image the server was booted from, if the provider still knows it
    pub image: Option<Image>,

    /// True while the provider is running an exclusive action on the server
    pub locked: bool,

    /// Public network addresses
    pub public_net: PublicNet,

    /// Labels attached to the server
    pub labels: Labels,

    /// Creation timestamp
    pub created: DateTime<Utc>,
}

/// Public network configuration of a server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicNet {
    pub ipv4: Option<Ipv4Addr>,

    /// Reverse DNS entry of the IPv4 address
    pub ipv4_dns_ptr: Option<String>,

    /// IPv6 network in CIDR notation (e.g. "2001:db8::/64")
    pub ipv6_network: Option<String>,
}

impl PublicNet {
    /// First host address (`::1`) of the IPv6 network
    pub fn ipv6_host(&self) -> Option<Ipv6Addr> {
        let network = self.ipv6_network.as_deref()?;
        let addr = network.split('/').next()?;
        let mut segments = addr.parse::<Ipv6Addr>().ok()?.segments();
        segments[7] = 1;
        Some(Ipv6Addr::from(segments))
    }
}

/// Server status reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    Initializing,
    Starting,
    Stopping,
    Off,
    Deleting,
    Migrating,
    Rebuilding,
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Running => write!(f, "running"),
            ServerStatus::Initializing => write!(f, "initializing"),
            ServerStatus::Starting => write!(f, "starting"),
            ServerStatus::Stopping => write!(f, "stopping"),
            ServerStatus::Off => write!(f, "off"),
            ServerStatus::Deleting => write!(f, "deleting"),
            ServerStatus::Migrating => write!(f, "migrating"),
            ServerStatus::Rebuilding => write!(f, "rebuilding"),
            ServerStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A disk image: system image, snapshot or backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub name: Option<String>,
    pub description: String,
    pub image_type: ImageType,
    pub labels: Labels,
    pub created: DateTime<Utc>,
    pub protection: Protection,
}

impl Image {
    /// Name for log messages: the image name or its description
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    System,
    Snapshot,
    Backup,
    App,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protection {
    pub delete: bool,
}

/// An entry of the provider's server type catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerType {
    pub id: u64,
    pub name: String,
    pub cores: u32,
    pub memory_gb: f64,
    pub disk_gb: u64,
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Aaaa => write!(f, "AAAA"),
        }
    }
}

/// A forward DNS record to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub zone_id: String,
    pub record_type: RecordType,
    /// Record name relative to the zone (e.g. "alpha.svc")
    pub name: String,
    pub value: String,
    pub ttl: u32,
}
