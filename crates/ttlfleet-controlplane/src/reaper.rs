//! TTL reaper
//!
//! Scans managed servers on a fixed interval and terminates those whose
//! TTL has passed. Servers that are mid-transition (starting, stopping,
//! migrating, ...) are left for a later scan.

use crate::control::ControlPlane;
use crate::error::{ControlError, Result};
use crate::labels::{self, TtlLabel};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use ttlfleet_cloud::ServerStatus;

/// What a single scan did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Servers terminated in this scan
    pub terminated: Vec<String>,
    /// Servers passed over: transitional status, unreadable TTL or a
    /// termination already running
    pub skipped: Vec<String>,
    /// Servers whose termination failed, with the error
    pub failed: Vec<(String, String)>,
}

pub struct Reaper {
    control: Arc<ControlPlane>,
    interval: Duration,
}

impl Reaper {
    pub fn new(control: Arc<ControlPlane>) -> Self {
        let interval = control.config().reaper_interval;
        Self { control, interval }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Scan every `interval` until `shutdown` turns true
    ///
    /// The first scan happens one interval after start. A scan in progress
    /// finishes the termination it is working on but starts no new one once
    /// shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Reaper started, scanning every {:?}", self.interval);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.scan(Some(&shutdown)).await {
                        tracing::error!("Reaper scan failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Reaper stopped");
    }

    /// Run one scan now
    pub async fn tick(&self) -> Result<ReapReport> {
        self.scan(None).await
    }

    async fn scan(&self, shutdown: Option<&watch::Receiver<bool>>) -> Result<ReapReport> {
        let servers = self.control.list_managed_servers().await?;
        let now = Utc::now();
        let mut report = ReapReport::default();

        tracing::debug!("Reaper checking {} servers", servers.len());

        for server in servers {
            let name = server.name;
            if !matches!(server.status, ServerStatus::Running | ServerStatus::Off) {
                tracing::warn!("Skipping {}: status is {}", name, server.status);
                report.skipped.push(name);
                continue;
            }

            let ttl = match labels::read_ttl(&server.labels) {
                TtlLabel::At(ttl) => ttl,
                TtlLabel::Missing => {
                    tracing::error!("Skipping {}: no ttl label", name);
                    report.skipped.push(name);
                    continue;
                }
                TtlLabel::Invalid(raw) => {
                    tracing::error!("Skipping {}: invalid ttl label '{}'", name, raw);
                    report.skipped.push(name);
                    continue;
                }
            };

            if now <= ttl {
                tracing::debug!("{} expires at {}", name, ttl.to_rfc3339());
                continue;
            }

            if shutdown.is_some_and(|rx| *rx.borrow()) {
                tracing::info!("Shutdown requested, stopping scan before {}", name);
                break;
            }

            tracing::info!("{} expired at {}, terminating", name, ttl.to_rfc3339());
            match self.control.terminate(&name).await {
                Ok(_) => report.terminated.push(name),
                Err(ControlError::AlreadyInProgress(_)) => {
                    tracing::info!("Termination of {} already in progress", name);
                    report.skipped.push(name);
                }
                Err(e) => {
                    tracing::error!("Failed to terminate {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}
