//! E2E tests for persistent detector configuration
//!
//! Tests config round-trip, defaults, backward compatibility of partial
//! files, and validation at detector creation.

use naptick_wakeword::{Detection, ModelSlot, WakeWordConfig, WakeWordDetector, WakeWordError};

#[test]
fn test_config_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config").join("wakeword.json");

    let config = WakeWordConfig {
        model_path: Some("/spiffs/hey_naptick.tflite".to_string()),
        fallback_model_path: Some("model".to_string()),
        threshold: 0.7,
        cooldown_ms: 1500,
        tensor_arena_size: 64 * 1024,
        ..Default::default()
    };
    config.save(&path).unwrap();

    assert_eq!(WakeWordConfig::load_from(&path), config);
}

/// Files written before newer fields existed still load
#[test]
fn test_partial_config_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("old.json");
    std::fs::write(&path, r#"{ "threshold": 0.4, "cooldown_ms": 1000 }"#).unwrap();

    let config = WakeWordConfig::load_from(&path);
    assert_eq!(config.threshold, 0.4);
    assert_eq!(config.cooldown_ms, 1000);
    assert_eq!(config.sample_rate, 16000);
    assert_eq!(config.frame_size_ms, 80);
    assert_eq!(config.wake_word, "hey_naptick");
    assert!(!config.test_mode);
}

#[test]
fn test_saved_json_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wakeword.json");
    WakeWordConfig::default().save(&path).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["sample_rate"], 16000);
    assert_eq!(value["frame_size_ms"], 80);
    assert_eq!(value["enable_vad"], false);
    assert!(raw.contains('\n'), "config should be pretty-printed");
}

/// Invalid configurations are refused when the detector is created
#[test]
fn test_detector_validates_config() {
    let bad = [
        WakeWordConfig {
            threshold: -0.5,
            ..Default::default()
        },
        WakeWordConfig {
            sample_rate: 0,
            ..Default::default()
        },
        WakeWordConfig {
            frame_size_ms: 0,
            ..Default::default()
        },
        WakeWordConfig {
            tensor_arena_size: 0,
            ..Default::default()
        },
    ];

    for config in bad {
        let result = WakeWordDetector::new(config, ModelSlot::Unloaded, |_: &Detection| {});
        assert!(matches!(result, Err(WakeWordError::InvalidArgument(_))));
    }
}

/// VAD settings are accepted and do not change detector setup
#[test]
fn test_vad_fields_accepted() {
    let config = WakeWordConfig {
        enable_vad: true,
        vad_threshold: 0.3,
        ..Default::default()
    };
    let detector = WakeWordDetector::new(config, ModelSlot::Unloaded, |_: &Detection| {}).unwrap();
    assert_eq!(detector.input_requirements(), 1280);
    assert!(detector.config().enable_vad);
}
