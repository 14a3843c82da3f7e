//! Application wiring and config hot reload against the demo screen.

use deltamon_bot::{AppConfig, AppError, Application, ConfigWatcher, ReloadOutcome};
use deltamon_scanner::EngineState;
use rust_decimal_macros::dec;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

const BASE_CONFIG: &str = r#"
reload_interval_secs = 1

[monitor]
positive_threshold = 0.08
negative_threshold = -0.05
scan_interval_seconds = 30

[alerts]
send_lifecycle_notices = false
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn rewrite(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
}

fn bump_mtime(path: &Path) {
    let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
}

fn demo_app(path: &Path) -> Application {
    let config = AppConfig::load_with_env(Some(path), Some(Default::default())).unwrap();
    Application::new(config, Some(path.to_path_buf()), true).unwrap()
}

#[tokio::test]
async fn test_live_run_requires_vision_agent() {
    let file = write_config(
        r#"
[alerts]
webhook_url = "https://discord.example/api/webhooks/1/abc"
"#,
    );
    let config = AppConfig::load_with_env(Some(file.path()), Some(Default::default())).unwrap();
    assert!(config.vision.base_url().is_none());

    let err = Application::new(config.clone(), None, false).err().unwrap();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("vision.base_url")));

    // Dry runs still work: demo screen plus the logging sink.
    assert!(Application::new(config, None, true).is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_discover_once_finds_demo_accounts() {
    let file = write_config(BASE_CONFIG);
    let app = demo_app(file.path());

    let report = app.discover_once().await.unwrap();
    let names: Vec<String> = report.accounts.iter().map(ToString::to_string).collect();
    assert_eq!(names, vec!["DEMO_ALPHA", "DEMO_BETA", "DEMO_GAMMA"]);
    assert_eq!(report.generation, 1);
    assert_eq!(app.engine().registry().snapshot().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_test_alert_delivers_through_log_sink() {
    let file = write_config(BASE_CONFIG);
    let app = demo_app(file.path());

    let result = app.send_test_alert().await;
    assert!(result.is_success());
    // Test alerts bypass the dispatcher.
    assert!(app.engine().dispatcher().recent(10).is_empty());
}

#[tokio::test]
async fn test_reload_applies_threshold_change() {
    let file = write_config(BASE_CONFIG);
    let app = demo_app(file.path());
    let mut watcher = ConfigWatcher::new(
        file.path(),
        app.engine().clone(),
        app.config().clone(),
    );

    rewrite(
        file.path(),
        &BASE_CONFIG.replace("positive_threshold = 0.08", "positive_threshold = 0.12"),
    );
    assert_eq!(watcher.reload(), ReloadOutcome::Applied);

    let current = app.engine().config().current();
    assert_eq!(current.positive_threshold, dec!(0.12));
    assert_eq!(current.negative_threshold, dec!(-0.05));
}

#[tokio::test]
async fn test_reload_rejects_invalid_file_and_keeps_config() {
    let file = write_config(BASE_CONFIG);
    let app = demo_app(file.path());
    let mut watcher = ConfigWatcher::new(
        file.path(),
        app.engine().clone(),
        app.config().clone(),
    );

    // Thresholds cross over.
    rewrite(
        file.path(),
        &BASE_CONFIG.replace("positive_threshold = 0.08", "positive_threshold = -0.2"),
    );
    assert!(matches!(watcher.reload(), ReloadOutcome::Rejected(_)));

    // Unparseable TOML.
    rewrite(file.path(), "[monitor\npositive_threshold = ");
    assert!(matches!(watcher.reload(), ReloadOutcome::Rejected(_)));

    assert_eq!(
        app.engine().config().current().positive_threshold,
        dec!(0.08)
    );
}

#[tokio::test]
async fn test_reload_without_monitor_change_is_unchanged() {
    let file = write_config(BASE_CONFIG);
    let app = demo_app(file.path());
    let mut watcher = ConfigWatcher::new(
        file.path(),
        app.engine().clone(),
        app.config().clone(),
    );

    // A restart-only section changed; the running monitor config is untouched.
    rewrite(
        file.path(),
        &format!("{BASE_CONFIG}\n[dashboard]\nport = 9090\n"),
    );
    assert_eq!(watcher.reload(), ReloadOutcome::Unchanged);
}

#[tokio::test]
async fn test_poll_only_reloads_on_mtime_change() {
    let file = write_config(BASE_CONFIG);
    let app = demo_app(file.path());
    let mut watcher = ConfigWatcher::new(
        file.path(),
        app.engine().clone(),
        app.config().clone(),
    );

    assert_eq!(watcher.poll(), ReloadOutcome::NotModified);

    rewrite(
        file.path(),
        &BASE_CONFIG.replace("scan_interval_seconds = 30", "scan_interval_seconds = 60"),
    );
    bump_mtime(file.path());
    assert_eq!(watcher.poll(), ReloadOutcome::Applied);
    assert_eq!(app.engine().config().current().scan_interval_seconds, 60);

    assert_eq!(watcher.poll(), ReloadOutcome::NotModified);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_cancel() {
    let file = write_config(BASE_CONFIG);
    let app = Arc::new(demo_app(file.path()));
    let cancel = app.cancel_token();

    let handle = tokio::spawn({
        let app = app.clone();
        async move { app.run().await }
    });

    // Two full cycles at a 30s interval.
    tokio::time::sleep(Duration::from_secs(75)).await;
    cancel.cancel();
    handle.await.unwrap().unwrap();

    let stats = app.engine().stats();
    assert!(stats.cycles_completed >= 2);
    assert!(stats.successful_scans >= 6);
    assert_eq!(app.engine().state(), EngineState::Stopped);
}
