//! Hetzner providers for ttlfleet
//!
//! This crate implements the `ComputeProvider` trait for Hetzner Cloud and the
//! `DnsProvider` trait for Hetzner DNS, enabling ttlfleet to manage servers,
//! snapshots and forward records.
//!
//! # Requirements
//!
//! - `HCLOUD_TOKEN`: Hetzner Cloud project API token
//! - `HCLOUD_DNS_TOKEN`: Hetzner DNS API token (only when DNS is enabled)
//!
//! # Example
//!
//! ```ignore
//! use ttlfleet_cloud::{ComputeProvider, LabelSelector};
//! use ttlfleet_cloud_hetzner::{HetznerCloud, HetznerCloudConfig};
//!
//! let cloud = HetznerCloud::new(HetznerCloudConfig::from_env()?)?;
//! let managed = cloud
//!     .list_servers(Some(&LabelSelector::equals("ttlfleet.io/managed-by", "ttlfleet")))
//!     .await?;
//! ```

pub mod compute;
pub mod dns;
pub mod error;

pub use compute::{HetznerCloud, HetznerCloudConfig};
pub use dns::{DnsConfig, HetznerDns};
pub use error::{HetznerError, Result};
