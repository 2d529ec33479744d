//! Scenario: unused config keys are reported (Warn) or rejected (Fail).
//!
//! Also covers loading layered files from disk.

use std::io::Write;

use sipin_config::{load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, UnusedKeyPolicy};

const CLEAN: &str = r#"
db:
  table: sipin_sips
mediahaven:
  url: "https://archief.example.org"
  keys_env:
    username: "MEDIAHAVEN_USERNAME"
poller:
  interval_secs: 3600
"#;

#[test]
fn clean_config_reports_nothing() {
    let loaded = load_layered_yaml_from_strings(&[CLEAN]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "{:?}", report.unused_leaf_pointers);
}

#[test]
fn typo_key_is_warned() {
    let overlay = "poller:\n  interval_sec: 60\n";
    let loaded = load_layered_yaml_from_strings(&[CLEAN, overlay]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(report.unused_leaf_pointers, vec!["/poller/interval_sec".to_string()]);
}

#[test]
fn typo_key_fails_under_fail_policy() {
    let overlay = "pulsar:\n  host: localhost\n";
    let loaded = load_layered_yaml_from_strings(&[CLEAN, overlay]).unwrap();
    let err = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err()
        .to_string();
    assert!(err.contains("CONFIG_UNUSED_KEYS"), "{err}");
    assert!(err.contains("/pulsar/host"), "{err}");
}

#[test]
fn layered_files_load_in_order() {
    let mut base = tempfile::NamedTempFile::new().unwrap();
    base.write_all(CLEAN.as_bytes()).unwrap();
    let mut prod = tempfile::NamedTempFile::new().unwrap();
    prod.write_all(b"poller:\n  interval_secs: 7200\n").unwrap();

    let base_path = base.path().to_str().unwrap().to_string();
    let prod_path = prod.path().to_str().unwrap().to_string();

    let loaded = load_layered_yaml(&[&base_path, &prod_path]).unwrap();
    let cfg = loaded.app_config().unwrap();
    assert_eq!(cfg.poller.interval_secs, 7200);

    let reversed = load_layered_yaml(&[&prod_path, &base_path]).unwrap();
    assert_eq!(reversed.app_config().unwrap().poller.interval_secs, 3600);
    assert_ne!(loaded.config_hash, reversed.config_hash);
}

#[test]
fn missing_file_is_an_error_naming_the_path() {
    let err = load_layered_yaml(&["/nonexistent/sipin.yaml"])
        .unwrap_err()
        .to_string();
    assert!(err.contains("/nonexistent/sipin.yaml"), "{err}");
}

#[test]
fn shipped_base_config_is_clean_and_valid() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join("sipin.yaml");
    let path = path.to_string_lossy().to_string();

    let loaded = load_layered_yaml(&[path.as_str()]).unwrap();
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "{:?}", report.unused_leaf_pointers);

    let cfg = loaded.app_config().unwrap();
    assert_eq!(cfg.poller.interval_secs, 3600);
    assert_eq!(cfg.http.bind, "127.0.0.1:8090");
}
