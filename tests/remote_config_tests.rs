// Config poll tests: directive application and the fail-safe disable

mod common;

use common::engine_with;
use netflow::models::{CollectionState, Directive};
use netflow::remote_config::{
    FileDirective, SharedDirective, poll_once, spawn_config_poller,
};
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

#[tokio::test]
async fn malformed_directive_keeps_collection_disabled_without_rule_changes() {
    let (engine, fake) = engine_with(&[8080], 1);
    let source = SharedDirective::new(r#"{"open": tru"#);

    let directive = poll_once(&source, engine.as_ref()).await;

    assert_eq!(directive, Directive::Unknown);
    assert_eq!(engine.state(), CollectionState::Disabled);
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn open_then_closed_drives_transitions() {
    let (engine, fake) = engine_with(&[8080], 1);
    let source = SharedDirective::new(r#"{"open":true,"in_bandwidth":0}"#);

    assert_eq!(poll_once(&source, engine.as_ref()).await, Directive::Open);
    assert_eq!(engine.state(), CollectionState::Enabled);
    assert_eq!(fake.rule_count("INPUT", "--dport", 8080), 1);

    // Repeated open polls do not churn rules.
    poll_once(&source, engine.as_ref()).await;
    assert_eq!(fake.rule_calls("-A"), 2);

    source.set_open(false).await;
    assert_eq!(poll_once(&source, engine.as_ref()).await, Directive::Closed);
    assert_eq!(engine.state(), CollectionState::Disabled);
    assert_eq!(fake.rule_count("INPUT", "--dport", 8080), 0);
}

#[tokio::test]
async fn malformed_directive_disables_running_collection() {
    let (engine, _fake) = engine_with(&[8080], 1);
    engine.enable().await;
    let source = SharedDirective::new("<html>502 Bad Gateway</html>");

    assert_eq!(poll_once(&source, engine.as_ref()).await, Directive::Unknown);
    assert!(engine.is_closed());
}

#[tokio::test]
async fn file_directive_is_read_on_every_poll() {
    let (engine, _fake) = engine_with(&[8080], 1);
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("netflow.json");
    std::fs::write(&path, r#"{"open":true}"#).unwrap();
    let source = FileDirective::new(&path);

    assert_eq!(poll_once(&source, engine.as_ref()).await, Directive::Open);
    assert!(!engine.is_closed());

    std::fs::remove_file(&path).unwrap();
    assert_eq!(poll_once(&source, engine.as_ref()).await, Directive::Unknown);
    assert!(engine.is_closed());
}

#[tokio::test(start_paused = true)]
async fn poller_applies_directive_on_its_interval() {
    let (engine, _fake) = engine_with(&[8080], 1);
    let source = SharedDirective::new(r#"{"open":true}"#);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle = spawn_config_poller(
        source.clone(),
        engine.clone(),
        Duration::from_secs(30),
        shutdown_rx,
    );

    sleep(Duration::from_secs(1)).await;
    assert_eq!(engine.state(), CollectionState::Enabled);

    source.set_open(false).await;
    sleep(Duration::from_secs(10)).await;
    assert_eq!(engine.state(), CollectionState::Enabled);
    sleep(Duration::from_secs(20)).await;
    assert_eq!(engine.state(), CollectionState::Disabled);

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}
