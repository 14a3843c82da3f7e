//! Dashboard endpoints against a live engine.

use deltamon_alert::{AlertDispatcher, LogSink};
use deltamon_core::{ConfigHandle, MonitorConfig};
use deltamon_dashboard::{serve, AppState, DashboardConfig};
use deltamon_registry::DiscoveryConfig;
use deltamon_scanner::{MonitorEngine, ScanConfig};
use deltamon_screen::{Screen, ScriptedScreen};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

async fn scanned_engine() -> Arc<MonitorEngine> {
    let screen = Arc::new(ScriptedScreen::demo(
        "account_dropdown",
        &[("ACC_A", "0.01"), ("ACC_B", "0.12")],
    ));
    let dispatcher = Arc::new(AlertDispatcher::new(Arc::new(LogSink), Duration::from_secs(1), 100));
    let discovery = DiscoveryConfig {
        open_settle_ms: 0,
        settle_delay_ms: 0,
        ..Default::default()
    };
    let scan = ScanConfig {
        switch_settle_ms: 0,
        ..Default::default()
    };
    let engine = MonitorEngine::new(
        Screen::from_backend(screen),
        ConfigHandle::new(MonitorConfig::default()).unwrap(),
        scan,
        discovery,
        dispatcher,
    )
    .unwrap();
    engine.discover().await.unwrap();
    engine.run_cycle().await;
    Arc::new(engine)
}

async fn start(engine: Arc<MonitorEngine>, config: DashboardConfig) -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        serve(listener, AppState::new(engine, config), async {
            let _ = rx.await;
        })
        .await
        .unwrap();
    });
    (format!("http://{addr}"), tx)
}

#[tokio::test]
async fn test_snapshot_and_health() {
    let (base, _stop) = start(scanned_engine().await, DashboardConfig::default()).await;
    let client = reqwest::Client::new();

    let snapshot: Value = client
        .get(format!("{base}/api/snapshot"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(snapshot["generation"], 1);
    assert_eq!(snapshot["accounts"].as_array().unwrap().len(), 2);
    assert_eq!(snapshot["accounts"][0]["id"], "ACC_A");
    assert_eq!(snapshot["accounts"][1]["last_delta"], "0.12");
    assert_eq!(snapshot["alert_stats"]["dispatched"], 1);
    assert_eq!(snapshot["positive_threshold"], "0.08");

    let response = client.get(format!("{base}/api/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let health: Value = response.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["accounts"], 2);
    assert_eq!(health["cycles_completed"], 1);
}

#[tokio::test]
async fn test_metrics_exposition() {
    let (base, _stop) = start(scanned_engine().await, DashboardConfig::default()).await;
    let body = reqwest::get(format!("{base}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("deltamon_scans_total"));
}

#[tokio::test]
async fn test_basic_auth() {
    let config = DashboardConfig {
        username: "ops".to_string(),
        password: "secret".to_string(),
        ..Default::default()
    };
    let (base, stop) = start(scanned_engine().await, config).await;
    let client = reqwest::Client::new();

    let denied = client.get(format!("{base}/api/snapshot")).send().await.unwrap();
    assert_eq!(denied.status(), 401);

    let allowed = client
        .get(format!("{base}/api/snapshot"))
        .basic_auth("ops", Some("secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), 200);

    // Health stays open for probes.
    let health = client.get(format!("{base}/api/health")).send().await.unwrap();
    assert_eq!(health.status(), 200);

    stop.send(()).unwrap();
}
