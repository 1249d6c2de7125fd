use backflow::multicast::{HubConfig, MulticastHub, ReplayPolicy};
use backflow::source::PushOptions;
use backflow::{ConfigError, EngineConfig, ErrorKind, Flux, UNBOUNDED};
use integration_test_utils::{init_tracing, RecordingSubscriber};
use std::fs;
use std::path::PathBuf;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
        "backflow-{}-{}.json",
        name,
        std::process::id()
    ));
    fs::write(&path, contents).expect("config written");
    path
}

#[test]
fn file_config_drives_push_and_hub_policies() {
    init_tracing();
    let path = write_config(
        "policies",
        r#"{
            "push": { "queue_capacity": 2 },
            "multicast": { "replay_capacity": 1, "connect": "eager" }
        }"#,
    );
    let config = EngineConfig::from_json_file(&path).expect("config loads");
    fs::remove_file(&path).ok();

    let hub_config = HubConfig::from_config(&config.multicast);
    assert_eq!(hub_config.replay, ReplayPolicy::Bounded(1));

    let overflowing = RecordingSubscriber::new(0);
    Flux::create_with(PushOptions::from_config(&config.push), |sink| {
        for item in 0..3 {
            sink.next(item);
        }
    })
    .subscribe(overflowing.clone());
    assert_eq!(
        overflowing.error().map(|e| e.kind()),
        Some(ErrorKind::Producer)
    );

    let hub = MulticastHub::new(Flux::from_iter(vec![1, 2, 3]), hub_config);
    let late = RecordingSubscriber::new(UNBOUNDED);
    hub.subscribe(late.clone());
    assert_eq!(late.items(), vec![3]);
    assert_eq!(late.completions(), 1);
}

#[test]
fn missing_file_is_reported_with_its_path() {
    init_tracing();
    let path = std::env::temp_dir().join("backflow-config-that-does-not-exist.json");

    let error = EngineConfig::from_json_file(&path).expect_err("missing file");

    match error {
        ConfigError::NotFound { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_json_is_rejected() {
    init_tracing();
    let path = write_config("malformed", "{ scheduler: ");

    let result = EngineConfig::from_json_file(&path);
    fs::remove_file(&path).ok();

    assert!(matches!(result, Err(ConfigError::Malformed(_))));
}
