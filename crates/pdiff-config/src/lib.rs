//! pdiff-config
//!
//! Layered YAML configuration.
//!
//! One or more YAML documents are merged in order (later documents override
//! earlier ones), converted to JSON, canonicalized, and hashed. The hash is
//! logged at run start so two runs can be matched to the exact settings they
//! used. [`ReconConfig`] is the typed view the runtime consumes.

use std::fs;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

mod recon;

pub use recon::{
    DuplicatePolicyConfig, FieldsConfig, ReadyConfig, ReconConfig, RendererConfig, RunConfig,
    SideTransforms, SourceConfig, SourcesConfig, ValuationConfig,
};

/// Merged config layers and their fingerprint.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    fn from_merged(config_json: Value) -> Result<Self> {
        // serde_json::Map is BTreeMap-backed (no preserve_order), so object
        // keys serialize sorted regardless of YAML key order.
        let canonical_json =
            serde_json::to_string(&config_json).context("canonical json serialize failed")?;
        let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
        Ok(Self {
            config_hash,
            canonical_json,
            config_json,
        })
    }

    /// Merge one more layer (typically command-line overrides) on top and
    /// re-hash, so the logged hash covers the settings actually used.
    pub fn with_overlay(&self, overlay: Value) -> Result<LoadedConfig> {
        let mut merged = self.config_json.clone();
        merge_layer(&mut merged, overlay);
        Self::from_merged(merged)
    }
}

/// Read and merge YAML files in order; later files override earlier ones.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        let layer = yaml_layer(&raw).with_context(|| format!("bad yaml layer: {p}"))?;
        merge_layer(&mut merged, layer);
    }
    LoadedConfig::from_merged(merged)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer = yaml_layer(raw).with_context(|| format!("bad yaml layer #{i}"))?;
        merge_layer(&mut merged, layer);
    }
    LoadedConfig::from_merged(merged)
}

fn yaml_layer(raw: &str) -> Result<Value> {
    let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
    serde_json::to_value(v_yaml).context("yaml->json conversion failed")
}

/// Objects merge key by key; anything else (arrays included) is replaced.
fn merge_layer(base: &mut Value, layer: Value) {
    match layer {
        Value::Object(layer_map) if base.is_object() => {
            if let Value::Object(base_map) = base {
                for (k, v) in layer_map {
                    match base_map.get_mut(&k) {
                        Some(slot) => merge_layer(slot, v),
                        None => {
                            base_map.insert(k, v);
                        }
                    }
                }
            }
        }
        other => *base = other,
    }
}
