//! TTL reaper tests.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use ttlfleet_cloud::{Labels, ServerStatus};
use ttlfleet_controlplane::labels;
use ttlfleet_controlplane::testing::{FakeCloud, test_config};
use ttlfleet_controlplane::{ControlPlane, Reaper};

fn expired() -> DateTime<Utc> {
    Utc::now() - ChronoDuration::minutes(5)
}

fn fresh() -> DateTime<Utc> {
    Utc::now() + ChronoDuration::hours(1)
}

fn setup() -> (Arc<FakeCloud>, Arc<ControlPlane>) {
    let cloud = FakeCloud::new();
    let control = Arc::new(cloud.control_plane(test_config()).unwrap());
    (cloud, control)
}

#[tokio::test]
async fn test_tick_terminates_only_expired_servers() {
    let (cloud, control) = setup();
    cloud.add_server("old", labels::instance_labels("old", expired()));
    cloud.add_server("young", labels::instance_labels("young", fresh()));
    cloud.add_server("stopped", labels::instance_labels("stopped", expired()));
    cloud.set_status("stopped", ServerStatus::Off);

    let report = Reaper::new(control).tick().await.unwrap();

    assert_eq!(report.terminated, vec!["old".to_string(), "stopped".to_string()]);
    assert!(report.failed.is_empty());
    assert!(cloud.server("old").is_none());
    assert!(cloud.server("stopped").is_none());
    assert!(cloud.server("young").is_some());
}

#[tokio::test]
async fn test_tick_skips_transitional_and_unreadable_servers() {
    let (cloud, control) = setup();
    for status in [
        ServerStatus::Starting,
        ServerStatus::Stopping,
        ServerStatus::Initializing,
        ServerStatus::Migrating,
    ] {
        let name = format!("busy-{}", status);
        cloud.add_server(&name, labels::instance_labels(&name, expired()));
        cloud.set_status(&name, status);
    }
    let mut no_ttl = labels::instance_labels("no-ttl", expired());
    no_ttl.remove(labels::TTL);
    cloud.add_server("no-ttl", no_ttl);
    let mut garbage = labels::instance_labels("garbage", expired());
    garbage.insert(labels::TTL.to_string(), "next tuesday".to_string());
    cloud.add_server("garbage", garbage);

    let report = Reaper::new(control).tick().await.unwrap();

    assert!(report.terminated.is_empty());
    assert_eq!(report.skipped.len(), 6);
    assert_eq!(cloud.call_count("shutdown_server"), 0);
}

#[tokio::test]
async fn test_tick_ignores_foreign_servers() {
    let (cloud, control) = setup();
    let mut foreign = Labels::new();
    labels::set_ttl(&mut foreign, expired());
    cloud.add_server("foreign", foreign);

    let report = Reaper::new(control).tick().await.unwrap();

    assert_eq!(report, Default::default());
    assert!(cloud.server("foreign").is_some());
}

#[tokio::test]
async fn test_tick_continues_after_failure() {
    let (cloud, control) = setup();
    cloud.add_server("a", labels::instance_labels("a", expired()));
    cloud.add_server("b", labels::instance_labels("b", expired()));
    cloud.fail("create_image", "quota exceeded");

    let report = Reaper::new(control).tick().await.unwrap();

    assert_eq!(report.failed.len(), 2);
    assert!(report.failed[0].1.contains("quota exceeded"));
    assert_eq!(cloud.call_count("shutdown_server"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_tick_skips_server_with_termination_in_progress() {
    let (cloud, control) = setup();
    cloud.add_server("a", labels::instance_labels("a", expired()));
    cloud.set_action_polls(5);
    let reaper = Reaper::new(control.clone());

    let (terminated, report) = tokio::join!(control.terminate("a"), reaper.tick());

    assert!(terminated.is_ok());
    let report = report.unwrap();
    assert_eq!(report.skipped, vec!["a".to_string()]);
    assert!(report.terminated.is_empty());
    assert!(report.failed.is_empty());
    assert_eq!(cloud.call_count("shutdown_server"), 1);
    assert!(cloud.server("a").is_none());
}

#[tokio::test]
async fn test_tick_fails_when_listing_fails() {
    let (cloud, control) = setup();
    cloud.fail("list_servers", "service unavailable");

    assert!(Reaper::new(control).tick().await.is_err());
}

#[tokio::test]
async fn test_pruned_server_is_reaped_on_next_tick() {
    let (cloud, control) = setup();
    let now = Utc::now().timestamp();
    let ttl = DateTime::<Utc>::from_timestamp(now + 1800, 0).unwrap();
    cloud.add_server("alpha", labels::instance_labels("alpha", ttl));

    let pruned = control.prune("alpha", "45m").await.unwrap();
    assert_eq!(pruned.timestamp(), now - 900);

    let report = Reaper::new(control).tick().await.unwrap();
    assert_eq!(report.terminated, vec!["alpha".to_string()]);
    assert!(cloud.server("alpha").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_run_scans_on_interval() {
    let (cloud, control) = setup();
    cloud.add_server("alpha", labels::instance_labels("alpha", expired()));
    let (tx, rx) = watch::channel(false);

    let reaper = Reaper::new(control).with_interval(Duration::from_secs(60));
    let handle = tokio::spawn(reaper.run(rx));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(cloud.server("alpha").is_some(), "first scan comes after one interval");

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(cloud.server("alpha").is_none());

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_shutdown_signal() {
    let (cloud, control) = setup();
    cloud.add_server("alpha", labels::instance_labels("alpha", expired()));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(Reaper::new(control).run(rx));
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("reaper did not stop")
        .unwrap();
    assert!(cloud.server("alpha").is_some());
    assert_eq!(cloud.call_count("list_servers"), 0);
}
