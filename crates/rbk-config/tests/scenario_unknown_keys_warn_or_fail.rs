//! Unknown config keys
//!
//! GREEN when:
//! - A document that only uses known parameter names reports clean.
//! - A misspelled parameter is reported under `Warn` and rejected under `Fail`.
//! - Keys outside `parameters` / `schedule` are reported as unknown.

use rbk_config::{load_layered_yaml_from_strings, report_unknown_keys, UnknownKeyPolicy};

const CLEAN_YAML: &str = r#"
parameters:
  target_volatility: 0.10
  days_back: 60
  fixed_notional: null
schedule:
  - from: 2024-06-01
    parameters:
      max_global_leverage: 2.0
"#;

const TYPO_YAML: &str = r#"
parameters:
  target_volatility: 0.10
  daysback: 60
schedule:
  - from: 2024-06-01
    parameters:
      max_global_leverge: 2.0
notes:
  owner: "desk"
"#;

#[test]
fn clean_document_reports_nothing() {
    let loaded = load_layered_yaml_from_strings(&[CLEAN_YAML]).unwrap();
    let report = report_unknown_keys(&loaded.config_json, UnknownKeyPolicy::Fail).unwrap();
    assert!(report.is_clean(), "unexpected: {:?}", report.unknown_leaf_pointers);
}

#[test]
fn warn_policy_returns_sorted_report() {
    let loaded = load_layered_yaml_from_strings(&[TYPO_YAML]).unwrap();
    let report = report_unknown_keys(&loaded.config_json, UnknownKeyPolicy::Warn).unwrap();
    assert_eq!(
        report.unknown_leaf_pointers,
        vec![
            "/notes/owner".to_string(),
            "/parameters/daysback".to_string(),
            "/schedule/0/parameters/max_global_leverge".to_string(),
        ]
    );
}

#[test]
fn fail_policy_rejects_unknown_keys() {
    let loaded = load_layered_yaml_from_strings(&[TYPO_YAML]).unwrap();
    let err = report_unknown_keys(&loaded.config_json, UnknownKeyPolicy::Fail).unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNKNOWN_KEYS"));
}

#[test]
fn unknown_parameter_cannot_become_a_dated_config() {
    let loaded = load_layered_yaml_from_strings(&[TYPO_YAML]).unwrap();
    assert!(loaded.dated().is_err());
}
