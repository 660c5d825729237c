//! Daemon runtime: providers, control plane, reaper and HTTP server

use crate::api::{self, AppState};
use crate::config::ServeArgs;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::watch;
use ttlfleet_cloud::{ComputeProvider, DnsProvider};
use ttlfleet_cloud_hetzner::{DnsConfig, HetznerCloud, HetznerCloudConfig, HetznerDns};
use ttlfleet_controlplane::{Authorizer, ControlPlane, Reaper, format_duration};

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let addr = args.listen_addr()?;
    let config = args.control_plane_config()?;

    // 1. Providers
    let compute: Arc<dyn ComputeProvider> =
        Arc::new(HetznerCloud::new(HetznerCloudConfig::from_env()?)?);
    let dns: Option<Arc<dyn DnsProvider>> = match config.dns {
        Some(_) => Some(Arc::new(HetznerDns::new(DnsConfig::from_env()?)?)),
        None => None,
    };

    // 2. Control plane
    let reaper_interval = config.reaper_interval;
    let control = Arc::new(ControlPlane::new(config, compute, dns)?);
    let authorizer = Authorizer::new(args.jwt_secret.as_bytes())?;

    // 3. Reaper
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tracing::info!(
        "Starting reaper (every {})",
        format_duration(reaper_interval)
    );
    let reaper = tokio::spawn(Reaper::new(control.clone()).run(shutdown_rx));

    // 4. HTTP API
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("ttlfleetd {} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    let app = api::router(Arc::new(AppState {
        control,
        authorizer,
    }));
    axum::serve(listener, app)
        .with_graceful_shutdown(stop_reaper_on(shutdown_signal(), shutdown_tx))
        .await
        .context("HTTP server failed")?;

    // The reaper finishes a termination in progress before it stops
    reaper.await.context("reaper task panicked")?;

    tracing::info!("ttlfleetd shut down");
    Ok(())
}

/// Resolve on `signal` after telling the reaper to stop
///
/// Used as the HTTP shutdown future, so the reaper starts no new
/// termination while in-flight requests drain.
async fn stop_reaper_on(signal: impl Future<Output = ()>, reaper: watch::Sender<bool>) {
    signal.await;
    tracing::info!("Stopping reaper");
    let _ = reaper.send(true);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;
    use ttlfleet_controlplane::labels;
    use ttlfleet_controlplane::testing::{FakeCloud, test_config};

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_reaper_before_drain() {
        let cloud = FakeCloud::new();
        let control = Arc::new(cloud.control_plane(test_config()).unwrap());
        let (tx, rx) = watch::channel(false);
        let reaper = tokio::spawn(
            Reaper::new(control)
                .with_interval(Duration::from_secs(60))
                .run(rx),
        );

        let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
        let shutdown = tokio::spawn(stop_reaper_on(
            async move {
                let _ = signal_rx.await;
            },
            tx,
        ));

        signal_tx.send(()).unwrap();
        shutdown.await.unwrap();

        // Expires after the signal, while requests would still be draining
        let expired = Utc::now() - ChronoDuration::minutes(5);
        cloud.add_server("alpha", labels::instance_labels("alpha", expired));
        tokio::time::sleep(Duration::from_secs(180)).await;

        tokio::time::timeout(Duration::from_secs(1), reaper)
            .await
            .expect("reaper did not stop")
            .unwrap();
        assert!(cloud.server("alpha").is_some());
        assert_eq!(cloud.call_count("shutdown_server"), 0);
    }
}
