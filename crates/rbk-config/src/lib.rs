//! rbk-config
//!
//! Layered YAML configuration for risk-budget strategies:
//! - documents merge in order (earlier = base, later = override)
//! - the merged document is canonicalised to JSON and hashed (SHA-256)
//! - `DatedConfig` turns the merged document into a dated parameter store
//! - `report_unknown_keys` guards against misspelled parameter names

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

mod params;
mod store;

pub use params::{flag, ConfigParam, ConfigSource, StrategyParams};
pub use store::{ConfigError, DatedConfig, RawConfig, RawOverride};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnknownKeyReport {
    /// Leaf pointers that are not a recognised parameter (sorted).
    pub unknown_leaf_pointers: Vec<String>,
}

impl UnknownKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unknown_leaf_pointers.is_empty()
    }
}

/// Walk every leaf of the merged config and flag anything that is not a
/// known parameter under `/parameters/<key>` or
/// `/schedule/<i>/parameters/<key>` (`/schedule/<i>/from` is structural).
///
/// `Warn` logs and returns the report; `Fail` errors when the report is not clean.
pub fn report_unknown_keys(config_json: &Value, policy: UnknownKeyPolicy) -> Result<UnknownKeyReport> {
    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let known: BTreeSet<&'static str> = ConfigParam::ALL.iter().map(|p| p.key()).collect();

    let mut unknown: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !is_known_leaf(lp, &known))
        .collect();
    unknown.sort();
    unknown.dedup();

    let report = UnknownKeyReport {
        unknown_leaf_pointers: unknown,
    };

    if !report.is_clean() {
        match policy {
            UnknownKeyPolicy::Fail => bail!(
                "CONFIG_UNKNOWN_KEYS: {} unknown config leaf key(s) detected. First few: {}",
                report.unknown_leaf_pointers.len(),
                preview_list(&report.unknown_leaf_pointers, 12)
            ),
            UnknownKeyPolicy::Warn => tracing::warn!(
                count = report.unknown_leaf_pointers.len(),
                first = %preview_list(&report.unknown_leaf_pointers, 12),
                "unknown config keys ignored"
            ),
        }
    }

    Ok(report)
}

fn is_known_leaf(pointer: &str, known: &BTreeSet<&'static str>) -> bool {
    let parts: Vec<&str> = pointer.trim_start_matches('/').split('/').collect();
    match parts.as_slice() {
        ["parameters", key] => known.contains(key),
        ["schedule", idx, "from"] => idx.parse::<usize>().is_ok(),
        ["schedule", idx, "parameters", key] => idx.parse::<usize>().is_ok() && known.contains(key),
        _ => false,
    }
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => {
            let p = if prefix.is_empty() {
                "/".to_string()
            } else {
                prefix.to_string()
            };
            out.push(p);
        }
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

fn preview_list(items: &[String], n: usize) -> String {
    let take = items.iter().take(n).cloned().collect::<Vec<_>>();
    format!("{:?}", take)
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Dated parameter store for the merged document.
    pub fn dated(&self) -> Result<DatedConfig> {
        DatedConfig::from_json(&self.config_json).context("config document is not a parameter set")
    }
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

fn canonicalize_json(v: &Value) -> Result<String> {
    // serde_json's default Map is ordered by key, so serialisation is canonical.
    let s = serde_json::to_string(v).context("canonical json serialize failed")?;
    Ok(s)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    hex::encode(out)
}
