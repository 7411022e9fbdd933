//! Tests for configuration validation

use std::collections::HashMap;

use gym_booking::config::{BookingConfig, StoreBackendConfig};
use gym_booking::core::CutoffWindow;

fn valid() -> BookingConfig {
    BookingConfig {
        max_tx_retries: 3,
        retry_backoff_ms: 10,
        cancellation_cutoff_mins: Some(120),
        waitlist_ttl_secs: None,
        event_buffer: 64,
        store: StoreBackendConfig::InMemory,
    }
}

#[test]
fn test_booking_config_validation() {
    assert!(valid().validate().is_ok());
}

#[test]
fn test_invalid_retries() {
    let cfg = BookingConfig {
        max_tx_retries: 0,
        ..valid()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_event_buffer() {
    let cfg = BookingConfig {
        event_buffer: 0,
        ..valid()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_waitlist_ttl() {
    let cfg = BookingConfig {
        waitlist_ttl_secs: Some(0),
        ..valid()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_invalid_postgres_store() {
    let cfg = BookingConfig {
        store: StoreBackendConfig::Postgres {
            url: String::new(),
            max_connections: 5,
        },
        ..valid()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("store invalid"));
}

#[test]
fn test_booking_config_from_json() {
    let json = r#"{
        "max_tx_retries": 5,
        "retry_backoff_ms": 20,
        "cancellation_cutoff_mins": null,
        "waitlist_ttl_secs": 3600,
        "event_buffer": 128,
        "store": { "kind": "postgres", "url": "postgres://localhost/gym", "max_connections": 8 }
    }"#;
    let cfg = BookingConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.max_tx_retries, 5);
    assert_eq!(cfg.cancellation_cutoff_mins, None);
    assert_eq!(cfg.waitlist_ttl_secs, Some(3600));
    assert_eq!(cfg.cancellation_policy(), CutoffWindow::until_start());
    assert!(matches!(
        cfg.store,
        StoreBackendConfig::Postgres {
            max_connections: 8,
            ..
        }
    ));
}

#[test]
fn test_policy_fields_must_be_explicit() {
    let json = r#"{
        "max_tx_retries": 5,
        "retry_backoff_ms": 20,
        "waitlist_ttl_secs": null,
        "event_buffer": 128,
        "store": { "kind": "in_memory" }
    }"#;
    let err = BookingConfig::from_json_str(json).unwrap_err();
    assert!(err.contains("cancellation_cutoff_mins"), "{err}");
}

#[test]
fn test_booking_config_from_lookup() {
    let vars: HashMap<&str, &str> = [
        ("GYM_BOOKING_CANCELLATION_CUTOFF_MINS", "60"),
        ("GYM_BOOKING_WAITLIST_TTL_SECS", "none"),
        ("GYM_BOOKING_MAX_TX_RETRIES", "4"),
    ]
    .into_iter()
    .collect();
    let cfg = BookingConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string())).unwrap();

    assert_eq!(cfg.max_tx_retries, 4);
    assert_eq!(cfg.retry_backoff_ms, 10);
    assert_eq!(cfg.cancellation_cutoff_mins, Some(60));
    assert_eq!(cfg.waitlist_ttl_secs, None);
    assert_eq!(cfg.store, StoreBackendConfig::InMemory);
    assert_eq!(cfg.retry_policy().max_attempts, 4);
}

#[test]
fn test_lookup_requires_policy_variables() {
    let err = BookingConfig::from_lookup(|_| None).unwrap_err();
    assert!(err.contains("CANCELLATION_CUTOFF_MINS"), "{err}");
}

#[test]
fn test_lookup_rejects_garbage() {
    let err = BookingConfig::from_lookup(|key| match key {
        "GYM_BOOKING_CANCELLATION_CUTOFF_MINS" => Some("soon".to_string()),
        "GYM_BOOKING_WAITLIST_TTL_SECS" => Some("none".to_string()),
        _ => None,
    })
    .unwrap_err();
    assert!(err.contains("invalid value"), "{err}");
}
