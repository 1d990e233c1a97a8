//! `rbk` binary end to end
//!
//! GREEN when:
//! - `config-hash` prints a stable hash line plus canonical JSON.
//! - `evaluate` on a world with no lookback prints a bootstrap of 10,000 units.
//! - `--strict-config` rejects a misspelled parameter.
//! - `accrue` prints one day of Act/360 accrual.

use std::fs;
use std::path::Path;

use predicates::prelude::*;
use serde_json::json;

fn write(dir: &Path, name: &str, body: &str) -> String {
    let p = dir.join(name);
    fs::write(&p, body).unwrap();
    p.to_string_lossy().into_owned()
}

fn bootstrap_world() -> serde_json::Value {
    json!({
        "instruments": [
            { "id": 1, "name": "RB", "category": "strategy", "currency": "USD", "portfolio": 1 },
            { "id": 10, "name": "A", "category": "etf", "currency": "USD" }
        ],
        "series": [
            {
                "instrument": 10,
                "kind": "adjusted_close",
                "points": [
                    ["2024-03-08", 97.0],
                    ["2024-03-11", 99.0],
                    ["2024-03-12", 101.0],
                    ["2024-03-13", 98.0],
                    ["2024-03-14", 100.0]
                ]
            }
        ],
        "portfolios": [
            { "id": 1, "currency": "USD", "instruments": [10], "aum": 1000000.0 }
        ]
    })
}

#[test]
fn config_hash_prints_hash_and_json() {
    let dir = tempfile::tempdir().unwrap();
    let base = write(dir.path(), "base.yaml", "parameters:\n  days_back: 60\n");

    let mut cmd = assert_cmd::Command::cargo_bin("rbk").unwrap();
    cmd.args(["config-hash", &base])
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains(r#"{"parameters":{"days_back":60}}"#));
}

#[test]
fn evaluate_bootstraps_from_world_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let world = write(dir.path(), "world.json", &bootstrap_world().to_string());
    let config = write(dir.path(), "rb.yaml", "parameters:\n  target_volatility: 0.1\n");

    let mut cmd = assert_cmd::Command::cargo_bin("rbk").unwrap();
    cmd.args([
        "evaluate", "--world", &world, "--config", &config, "--strategy", "1", "--date", "2024-03-14", "--apply",
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains(r#""mode": "bootstrap""#))
    .stdout(predicate::str::contains(r#""value": 10000.0"#))
    .stdout(predicate::str::contains(r#""applied": 1"#));
}

#[test]
fn strict_config_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let world = write(dir.path(), "world.json", &bootstrap_world().to_string());
    let config = write(dir.path(), "rb.yaml", "parameters:\n  target_vol: 0.1\n");

    let mut cmd = assert_cmd::Command::cargo_bin("rbk").unwrap();
    cmd.args([
        "evaluate", "--world", &world, "--config", &config, "--strict-config", "--strategy", "1", "--date",
        "2024-03-14",
    ])
    .assert()
    .failure()
    .stderr(predicate::str::contains("CONFIG_UNKNOWN_KEYS"));
}

#[test]
fn accrue_commits_one_day_of_interest() {
    let dir = tempfile::tempdir().unwrap();
    let world = json!({
        "instruments": [
            { "id": 50, "name": "DEPO", "category": "strategy", "currency": "USD", "portfolio": 5 },
            { "id": 99, "name": "SOFR", "category": "other", "currency": "USD" }
        ],
        "series": [
            { "instrument": 99, "kind": "close", "points": [["2024-03-01", 5.0]] }
        ],
        "portfolios": [
            { "id": 5, "currency": "USD", "navs": [["2024-03-04", 100.0]] }
        ]
    });
    let world = write(dir.path(), "world.json", &world.to_string());
    let config = write(
        dir.path(),
        "depo.yaml",
        "parameters:\n  spread: 0.0\n  funding_instrument: 99\n",
    );

    let mut cmd = assert_cmd::Command::cargo_bin("rbk").unwrap();
    cmd.args(["accrue", "--world", &world, "--config", &config, "--strategy", "50", "--date", "2024-03-05"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""days": 1"#))
        .stdout(predicate::str::contains(r#""rate": 5.0"#));
}
