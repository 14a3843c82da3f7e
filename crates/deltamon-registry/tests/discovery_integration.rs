//! Integration tests for dropdown discovery against a scripted screen.

use std::sync::Arc;
use std::time::Duration;

use deltamon_core::{AccountId, Rect};
use deltamon_registry::{
    AccountRegistry, DiscoveryConfig, DiscoveryStage, DiscoveryState, DiscoveryStateMachine,
    RegistryError,
};
use deltamon_screen::{Screen, ScriptedScreen};

const TRIGGER: &str = "account_dropdown";

fn fast_config() -> DiscoveryConfig {
    DiscoveryConfig {
        settle_delay_ms: 10,
        open_settle_ms: 10,
        max_iterations: 6,
        ..Default::default()
    }
}

fn scripted(pages: Vec<Vec<&str>>) -> Arc<ScriptedScreen> {
    let screen = Arc::new(ScriptedScreen::new());
    screen.set_template(TRIGGER, Rect::new(400, 80, 160, 24), 0.95);
    screen.set_dropdown_pages(pages);
    screen
}

fn names(ids: &[AccountId]) -> Vec<&str> {
    ids.iter().map(|id| id.as_str()).collect()
}

/// N unique stable lines yield exactly N accounts in first-seen order.
#[tokio::test(start_paused = true)]
async fn test_discovery_first_seen_order_without_duplicates() {
    let screen = scripted(vec![
        vec!["ACC_003", "ACC_001", "ACC_002"],
        vec!["ACC_001", "ACC_002", "ACC_004"],
        vec!["ACC_002", "ACC_004", "ACC_005"],
    ]);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen.clone()), fast_config());

    let report = discovery.run(&registry).await.unwrap();

    assert_eq!(
        names(&report.accounts),
        vec!["ACC_003", "ACC_001", "ACC_002", "ACC_004", "ACC_005"]
    );
    assert!(report.stable);
    // Three distinct pages, then one repeat of the last page.
    assert_eq!(report.iterations, 4);
    assert!(report.dropdown_closed);
    assert_eq!(registry.len(), 5);
    assert_eq!(registry.generation(), report.generation);

    let positions: Vec<_> = registry.accounts().iter().map(|a| a.position).collect();
    assert_eq!(positions, vec![0, 1, 2, 3, 4]);

    assert_eq!(discovery.state(), DiscoveryState::Complete);
    assert_eq!(
        discovery.history(),
        vec![
            DiscoveryState::Idle,
            DiscoveryState::OpeningDropdown,
            DiscoveryState::Enumerating,
            DiscoveryState::ClosingDropdown,
            DiscoveryState::Complete,
        ]
    );
    assert!(!screen.is_dropdown_open());
}

#[tokio::test(start_paused = true)]
async fn test_discovery_without_scrolling_stops_after_two_captures() {
    let screen = scripted(vec![vec!["Alpha", "Beta", "Gamma"]]);
    let registry = AccountRegistry::new();
    let config = DiscoveryConfig {
        scroll: false,
        ..fast_config()
    };
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen.clone()), config);

    let report = discovery.run(&registry).await.unwrap();
    assert_eq!(names(&report.accounts), vec!["Alpha", "Beta", "Gamma"]);
    assert_eq!(report.iterations, 2);
    assert_eq!(screen.dropdown_interactions(), (1, 0, 1));
}

#[tokio::test(start_paused = true)]
async fn test_discovery_cleans_noise_lines() {
    let screen = scripted(vec![vec!["Accounts...", "- All -", "ab", "Main | IRA", "Joint  2"]]);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen), fast_config());

    let report = discovery.run(&registry).await.unwrap();
    assert_eq!(names(&report.accounts), vec!["Main_IRA", "Joint_2"]);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_found_after_retries() {
    let screen = scripted(vec![vec!["ACC_1"]]);
    screen.fail_template_first(TRIGGER, 2);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen.clone()), fast_config());

    discovery.run(&registry).await.unwrap();
    assert_eq!(screen.template_calls(TRIGGER), 3);
}

#[tokio::test(start_paused = true)]
async fn test_trigger_not_found_leaves_registry_untouched() {
    let screen = scripted(vec![vec!["NEW_1"]]);
    screen.fail_template_first(TRIGGER, 10);
    let registry = AccountRegistry::new();
    registry
        .replace(vec![AccountId::new("OLD_1").unwrap()])
        .unwrap();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen.clone()), fast_config());

    let err = discovery.run(&registry).await.unwrap_err();
    match &err {
        RegistryError::DiscoveryFailed { stage, reason, .. } => {
            assert_eq!(*stage, DiscoveryStage::OpeningDropdown);
            assert!(reason.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(screen.template_calls(TRIGGER), 3);
    assert_eq!(discovery.state(), DiscoveryState::Error);
    assert_eq!(names(&registry.snapshot().ids().to_vec()), vec!["OLD_1"]);
}

#[tokio::test(start_paused = true)]
async fn test_weak_trigger_match_is_not_found() {
    let screen = Arc::new(ScriptedScreen::new());
    screen.set_template(TRIGGER, Rect::new(0, 0, 10, 10), 0.5);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen), fast_config());

    let err = discovery.run(&registry).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::DiscoveryFailed {
            stage: DiscoveryStage::OpeningDropdown,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_empty_dropdown_fails_and_closes() {
    let screen = scripted(vec![vec!["..", "--"]]);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen.clone()), fast_config());

    let err = discovery.run(&registry).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::DiscoveryFailed {
            stage: DiscoveryStage::Enumerating,
            ..
        }
    ));
    assert!(err.partial_lines().is_empty());
    assert!(registry.is_empty());
    assert!(!screen.is_dropdown_open());
    assert_eq!(discovery.state(), DiscoveryState::Error);
    assert_eq!(discovery.history().last(), Some(&DiscoveryState::Error));
}

#[tokio::test(start_paused = true)]
async fn test_open_click_failure_is_discovery_failure() {
    let screen = scripted(vec![vec!["ACC_1"]]);
    screen.fail_open_dropdown(true);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen), fast_config());

    let err = discovery.run(&registry).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::DiscoveryFailed {
            stage: DiscoveryStage::OpeningDropdown,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_iteration_cap_without_stability_still_completes() {
    let pages: Vec<Vec<&str>> = vec![
        vec!["A_01"],
        vec!["A_02"],
        vec!["A_03"],
        vec!["A_04"],
        vec!["A_05"],
        vec!["A_06"],
        vec!["A_07"],
    ];
    let screen = scripted(pages);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen), fast_config());

    let report = discovery.run(&registry).await.unwrap();
    assert!(!report.stable);
    assert_eq!(report.iterations, 6);
    assert_eq!(report.accounts.len(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_rediscovery_replaces_registry() {
    let screen = scripted(vec![vec!["ACC_1", "ACC_2"]]);
    let registry = AccountRegistry::new();
    let discovery = DiscoveryStateMachine::new(Screen::from_backend(screen.clone()), fast_config());

    let first = discovery.run(&registry).await.unwrap();
    screen.set_dropdown_pages(vec![vec!["ACC_3"]]);
    let second = discovery.run(&registry).await.unwrap();

    assert!(second.generation > first.generation);
    assert_eq!(names(&registry.snapshot().ids().to_vec()), vec!["ACC_3"]);
}

/// The dropdown is not touched while another task owns the screen.
#[tokio::test(start_paused = true)]
async fn test_discovery_waits_for_screen_before_opening() {
    let screen = scripted(vec![vec!["ACC_1", "ACC_2"]]);
    let bundle = Screen::from_backend(screen.clone());
    let registry = Arc::new(AccountRegistry::new());
    let discovery = Arc::new(DiscoveryStateMachine::new(bundle.clone(), fast_config()));

    let held = bundle.gate.lock().await;
    let task = tokio::spawn({
        let discovery = discovery.clone();
        let registry = registry.clone();
        async move { discovery.run(&registry).await }
    });

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(screen.dropdown_interactions(), (0, 0, 0));
    assert_eq!(screen.template_calls(TRIGGER), 0);

    drop(held);
    let report = task.await.unwrap().unwrap();
    assert_eq!(names(&report.accounts), vec!["ACC_1", "ACC_2"]);
    assert!(!bundle.gate.is_held());
}

#[tokio::test(start_paused = true)]
async fn test_busy_screen_fails_discovery_without_opening() {
    let screen = scripted(vec![vec!["ACC_1"]]);
    let bundle = Screen::from_backend(screen.clone());
    let registry = AccountRegistry::new();
    let config = DiscoveryConfig {
        screen_wait_ms: 1000,
        ..fast_config()
    };
    let discovery = DiscoveryStateMachine::new(bundle.clone(), config);

    let _held = bundle.gate.lock().await;
    let err = discovery.run(&registry).await.unwrap_err();

    match &err {
        RegistryError::DiscoveryFailed { stage, reason, .. } => {
            assert_eq!(*stage, DiscoveryStage::OpeningDropdown);
            assert!(reason.contains("gate"), "{reason}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(screen.dropdown_interactions(), (0, 0, 0));
    assert_eq!(discovery.state(), DiscoveryState::Error);
    assert!(registry.is_empty());
}

/// The gate stays held from opening the list until it is closed.
#[tokio::test(start_paused = true)]
async fn test_gate_held_for_whole_dropdown_session() {
    let screen = scripted(vec![vec!["ACC_1"], vec!["ACC_2"]]);
    let bundle = Screen::from_backend(screen.clone());
    let registry = Arc::new(AccountRegistry::new());
    let discovery = Arc::new(DiscoveryStateMachine::new(bundle.clone(), fast_config()));

    let task = tokio::spawn({
        let discovery = discovery.clone();
        let registry = registry.clone();
        async move { discovery.run(&registry).await }
    });

    // Inside the open settle delay: list open, gate taken exactly once.
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(screen.is_dropdown_open());
    assert!(bundle.gate.is_held());

    task.await.unwrap().unwrap();
    assert!(!screen.is_dropdown_open());
    assert!(!bundle.gate.is_held());
    assert_eq!(bundle.gate.acquisitions(), 1);
}
