//! ttlfleet Control Plane
//!
//! Lifecycle orchestration for short-lived cloud servers. Every server has
//! a TTL; when it passes, the server is shut down, snapshotted and deleted.
//! Starting it again boots the newest snapshot. All state lives in provider
//! labels, so the control plane itself is stateless.
//!
//! ## Architecture
//!
//! ```text
//!  HTTP / chat ──▶ Authorization Gate ──▶ ControlPlane ──▶ ComputeProvider
//!                                             │                DnsProvider
//!                    Reaper (interval) ───────┘
//! ```
//!
//! - [`provision`]: new servers from the blueprint, restarts from snapshots
//! - [`terminate`]: shutdown → snapshot → prune → unlock → delete → DNS
//! - [`reaper`]: periodic TTL enforcement
//! - [`ttl`], [`retype`]: adjustments of running and stopped services
//! - [`auth`], [`command`]: role checks and the chat command grammar

pub mod auth;
pub mod command;
pub mod config;
pub mod control;
pub mod dns;
pub mod duration;
pub mod error;
pub mod guard;
pub mod labels;
pub mod provision;
pub mod reaper;
pub mod retype;
pub mod store;
pub mod terminate;
pub mod ttl;
pub mod view;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth::{Authorizer, Caller, Claims, Operation, Role};
pub use command::{Command, CommandError, HELP_TEXT, dispatch, handle_message};
pub use config::{ControlPlaneConfig, DnsSettings};
pub use control::{ControlPlane, validate_name};
pub use duration::{DurationError, format_duration, parse_duration};
pub use error::{ControlError, ErrorKind, ProviderOp, Result};
pub use reaper::{ReapReport, Reaper};
pub use store::LabelStore;
pub use terminate::{Termination, TerminationPhase};
pub use ttl::TtlDirection;
pub use view::{ServiceState, ServiceView};
