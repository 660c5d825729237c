//! ttlfleet Cloud Infrastructure
//!
//! This crate provides the provider abstraction for ttlfleet: the compute and
//! DNS provider traits, the provider-neutral resource model and the action
//! progress watcher shared by every long-running operation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              ttlfleet-controlplane               │
//! │   (provision / terminate / reap / extend ...)    │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 ttlfleet-cloud                   │
//! │  ┌───────────────────┐  ┌───────────────────┐   │
//! │  │ ComputeProvider   │  │ DnsProvider       │   │
//! │  └───────────────────┘  └───────────────────┘   │
//! │  ┌───────────────────┐  ┌───────────────────┐   │
//! │  │ Labels/Selectors  │  │ watch_progress    │   │
//! │  └───────────────────┘  └───────────────────┘   │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼────────────────┐
//! │ ttlfleet-cloud-hetzner │
//! │ (Cloud API + DNS API)  │
//! └────────────────────────┘
//! ```

pub mod action;
pub mod error;
pub mod label;
pub mod model;
pub mod provider;

// Re-exports
pub use action::{Action, ActionStatus, ProgressEvent, watch_progress};
pub use error::{CloudError, Result};
pub use label::{LabelSelector, Labels};
pub use model::{
    DnsRecord, Image, ImageType, Protection, PublicNet, RecordType, Server, ServerStatus,
    ServerType,
};
pub use provider::{
    ComputeProvider, CreateImageRequest, CreateServerRequest, CreatedImage, CreatedServer,
    DnsProvider,
};
