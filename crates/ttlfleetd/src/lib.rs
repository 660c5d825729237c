//! ttlfleet daemon
//!
//! Serves the HTTP API and chat webhook in front of the control plane and
//! runs the TTL reaper in the background.

pub mod api;
pub mod config;
pub mod server;
