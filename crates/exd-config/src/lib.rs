//! Layered YAML configuration.
//!
//! Files are loaded in order and deep-merged (objects merge recursively,
//! arrays and scalars are replaced), then the merged document is
//! canonicalized (sorted keys, compact JSON) and hashed so a run can be
//! tied to the exact configuration it saw.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Typed configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub daemon: DaemonSection,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_fill_poll_interval_ms")]
    pub fill_poll_interval_ms: u64,
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub id: String,
    #[serde(default)]
    pub gateway: GatewayKind,
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    #[default]
    Paper,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            fill_poll_interval_ms: default_fill_poll_interval_ms(),
            cancel_grace_secs: default_cancel_grace_secs(),
        }
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_fill_poll_interval_ms() -> u64 {
    500
}

fn default_cancel_grace_secs() -> u64 {
    30
}

fn default_bind_addr() -> String {
    "127.0.0.1:8899".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_account_id() -> String {
    "paper".to_string()
}

impl EngineConfig {
    pub fn fill_poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.engine.fill_poll_interval_ms)
    }

    pub fn cancel_grace(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.engine.cancel_grace_secs)
    }
}

// ---------------------------------------------------------------------------
// Layered loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: EngineConfig,
    pub canonical_json: String,
    pub config_hash: String,
}

/// Load + merge YAML files in order, then canonicalize, hash, and
/// deserialize into [`EngineConfig`]. Later files override earlier ones.
pub fn load_layered_yaml(paths: &[impl AsRef<Path>]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for p in paths {
        let p = p.as_ref();
        let s = fs::read_to_string(p).with_context(|| format!("read config: {}", p.display()))?;
        let yaml_val: serde_yaml::Value =
            serde_yaml::from_str(&s).with_context(|| format!("parse yaml: {}", p.display()))?;
        let json_val = serde_json::to_value(yaml_val).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_val);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    let config: EngineConfig =
        serde_json::from_value(merged).context("config does not match the expected schema")?;

    Ok(LoadedConfig {
        config,
        canonical_json: canonical,
        config_hash: hash,
    })
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON.
fn canonicalize_json(v: &Value) -> String {
    let sorted = sort_keys(v);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let sorted: BTreeMap<String, Value> = keys
                .into_iter()
                .map(|k| {
                    let sorted_child = sort_keys(&map[&k]);
                    (k, sorted_child)
                })
                .collect();
            serde_json::to_value(sorted).expect("object re-serialization must not fail")
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}
