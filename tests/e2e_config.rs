//! E2E tests for persistent configuration
//!
//! Tests config round-trip, defaults, backward compatibility, and the
//! validation boundary into session settings.

use tempfile::tempdir;
use udptester::config::AppConfig;
use udptester_core::IdentityPolicy;

#[test]
fn test_save_creates_parents_and_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.json");

    let config = AppConfig {
        target: "10.1.2.3".to_string(),
        port: 7000,
        interval_ms: 250,
        payload: "HELLO".to_string(),
        iterations: 50,
        broadcast: false,
        identity: IdentityPolicy::Ip,
        log_dir: Some(dir.path().join("logs")),
    };
    config.save(&path).unwrap();

    let loaded: AppConfig =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.target, "10.1.2.3");
    assert_eq!(loaded.port, 7000);
    assert_eq!(loaded.interval_ms, 250);
    assert_eq!(loaded.payload, "HELLO");
    assert_eq!(loaded.iterations, 50);
    assert!(!loaded.broadcast);
    assert_eq!(loaded.identity, IdentityPolicy::Ip);
    assert_eq!(loaded.log_dir, Some(dir.path().join("logs")));
}

#[test]
fn test_saved_config_validates_back_to_same_settings() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    let config = AppConfig {
        interval_ms: 100,
        iterations: 10,
        ..Default::default()
    };
    config.save(&path).unwrap();

    let loaded: AppConfig =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.validate().unwrap(), config.validate().unwrap());
}

#[test]
fn test_garbage_json_is_reported_by_serde() {
    assert!(serde_json::from_str::<AppConfig>("not json").is_err());
    // Unknown fields are tolerated so configs survive option removals
    let loaded: AppConfig =
        serde_json::from_str(r#"{"port": 9000, "legacy_option": true}"#).unwrap();
    assert_eq!(loaded.port, 9000);
}
