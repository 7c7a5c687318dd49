//! Typed reconciliation run configuration.
//!
//! Example (reference deployment):
//!
//! ```yaml
//! sources:
//!   a:
//!     tag: ais
//!     url_template: "http://property-test.surge.sh/?p={account}"
//!     ready:
//!       - script: "history.state.opa && history.state.homestead"
//!       - selector: '[data-hook="valuation"]'
//!   b:
//!     tag: opa
//!     url_template: "http://property.phila.gov/?p={account}"
//!     ready:
//!       - script: "history.state.sa && history.state.opa"
//!       - selector: '[data-hook="valuation"]'
//! fields:
//!   keys: [owner-name, sale-price]
//!   transforms:
//!     sale-price: { a: [currency], b: [currency] }
//! valuation:
//!   attrs: [year, market-value, taxable-land]
//! run:
//!   accounts_file: accounts.txt
//! ```

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::LoadedConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    pub sources: SourcesConfig,
    pub fields: FieldsConfig,
    pub valuation: ValuationConfig,
    #[serde(default)]
    pub renderer: RendererConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    /// Secondary source (fetched second).
    pub a: SourceConfig,
    /// Primary source (fetched first).
    pub b: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Short label used in logs and as the CSV column name.
    pub tag: String,
    /// Page URL; `{account}` is replaced by the account id.
    pub url_template: String,
    /// Readiness conditions, awaited in order.
    #[serde(default)]
    pub ready: Vec<ReadyConfig>,
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyConfig {
    Script(String),
    Selector(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldsConfig {
    /// CSS selector for a field; `{key}` is replaced by the field key.
    #[serde(default = "default_selector_template")]
    pub selector_template: String,
    /// Compared field keys, in output order.
    pub keys: Vec<String>,
    /// Transform names per field, per side.
    #[serde(default)]
    pub transforms: BTreeMap<String, SideTransforms>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SideTransforms {
    #[serde(default)]
    pub a: Vec<String>,
    #[serde(default)]
    pub b: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValuationConfig {
    #[serde(default = "default_valuation_container")]
    pub container: String,
    /// Child index of a column holding the value text; `null` reads the column itself.
    #[serde(default = "default_value_child")]
    pub value_child: Option<usize>,
    /// Ordered attrs; the first one is the year key.
    pub attrs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererConfig {
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_browser")]
    pub browser: String,
    #[serde(default)]
    pub show: bool,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_page_load_timeout_ms")]
    pub page_load_timeout_ms: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            show: false,
            poll_interval_ms: default_poll_interval_ms(),
            page_load_timeout_ms: default_page_load_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicyConfig {
    /// Skip an account id already attempted in this run.
    #[default]
    AnyPrior,
    /// Skip only when the earlier occurrence emitted at least one record.
    PriorOutput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Inline account ids (numbers or strings).
    #[serde(default, deserialize_with = "ids_as_strings")]
    pub accounts: Vec<String>,
    /// File with one account id per line; appended after inline ids.
    #[serde(default)]
    pub accounts_file: Option<String>,
    #[serde(default)]
    pub max_accounts: Option<usize>,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicyConfig,
    /// Exit non-zero when any account failed.
    #[serde(default)]
    pub fail_on_error: bool,
}

fn default_ready_timeout_ms() -> u64 {
    30_000
}

fn default_selector_template() -> String {
    r#"[data-hook="{key}"]"#.to_string()
}

fn default_valuation_container() -> String {
    r#"[data-hook="valuation"]"#.to_string()
}

fn default_value_child() -> Option<usize> {
    Some(1)
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

fn default_browser() -> String {
    "chrome".to_string()
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_page_load_timeout_ms() -> u64 {
    60_000
}

fn ids_as_strings<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Value> = Vec::deserialize(deserializer)?;
    raw.into_iter()
        .map(|v| match v {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(serde::de::Error::custom(format!(
                "account id must be a string or number, got {other}"
            ))),
        })
        .collect()
}

impl ReconConfig {
    /// Typed view of a merged config. Does not validate; see [`Self::validate`].
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        serde_json::from_value(loaded.config_json.clone())
            .context("CONFIG_INVALID: config does not match the expected shape")
    }

    /// Structural checks that must pass before any page is fetched.
    ///
    /// Messages carry a stable `CONFIG_*` code so they stay grep-friendly.
    pub fn validate(&self) -> Result<()> {
        for (side, src) in [("a", &self.sources.a), ("b", &self.sources.b)] {
            if src.tag.trim().is_empty() {
                bail!("CONFIG_INVALID_SOURCE: sources.{side}.tag must not be empty");
            }
            if src.tag.contains(',') {
                bail!("CONFIG_INVALID_SOURCE: sources.{side}.tag must not contain ','");
            }
            if !src.url_template.contains("{account}") {
                bail!(
                    "CONFIG_INVALID_SOURCE: sources.{side}.url_template must contain {{account}}: {}",
                    src.url_template
                );
            }
        }
        if self.sources.a.tag == self.sources.b.tag {
            bail!(
                "CONFIG_INVALID_SOURCE: sources.a.tag and sources.b.tag are both '{}'",
                self.sources.a.tag
            );
        }

        if self.fields.keys.is_empty() {
            bail!("CONFIG_NO_FIELDS: fields.keys must list at least one field");
        }
        if let Some(dup) = first_duplicate(&self.fields.keys) {
            bail!("CONFIG_DUPLICATE_KEY: field '{dup}' is declared twice");
        }
        if !self.fields.selector_template.contains("{key}") {
            bail!(
                "CONFIG_INVALID_FIELDS: fields.selector_template must contain {{key}}: {}",
                self.fields.selector_template
            );
        }
        for (key, sides) in &self.fields.transforms {
            if !self.fields.keys.contains(key) {
                bail!("CONFIG_UNDECLARED_FIELD: transforms given for undeclared field '{key}'");
            }
            // A number on one side and text on the other would print the
            // same in the CSV while comparing unequal.
            let a = currency_position(&sides.a);
            let b = currency_position(&sides.b);
            if a.is_some() != b.is_some() {
                bail!(
                    "CONFIG_CURRENCY_CHAIN: fields.transforms.{key}: currency must be applied on both sides or neither"
                );
            }
            for (side, chain, pos) in [("a", &sides.a, a), ("b", &sides.b, b)] {
                if pos.is_some_and(|p| p + 1 != chain.len()) {
                    bail!(
                        "CONFIG_CURRENCY_CHAIN: fields.transforms.{key}.{side}: currency must be the last transform"
                    );
                }
            }
        }

        if self.valuation.attrs.len() < 2 {
            bail!(
                "CONFIG_INVALID_VALUATION: valuation.attrs needs the year key plus at least one attribute (got {})",
                self.valuation.attrs.len()
            );
        }
        if let Some(dup) = first_duplicate(&self.valuation.attrs) {
            bail!("CONFIG_DUPLICATE_KEY: valuation attr '{dup}' is declared twice");
        }

        if self.run.max_accounts == Some(0) {
            bail!("CONFIG_INVALID_RUN: run.max_accounts must be a positive integer");
        }
        if self.renderer.poll_interval_ms == 0 {
            bail!("CONFIG_INVALID_RENDERER: renderer.poll_interval_ms must be > 0");
        }

        Ok(())
    }
}

fn currency_position(chain: &[String]) -> Option<usize> {
    chain
        .iter()
        .position(|t| t.trim().eq_ignore_ascii_case("currency"))
}

fn first_duplicate(items: &[String]) -> Option<&str> {
    let mut seen = BTreeSet::new();
    items
        .iter()
        .find(|k| !seen.insert(k.as_str()))
        .map(|k| k.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_layered_yaml_from_strings;

    const MINIMAL: &str = r#"
sources:
  a: { tag: ais, url_template: "http://a.example/?p={account}" }
  b: { tag: opa, url_template: "http://b.example/?p={account}" }
fields:
  keys: [owner-name]
valuation:
  attrs: [year, market-value]
run:
  accounts: [100, "200"]
"#;

    fn parse(docs: &[&str]) -> ReconConfig {
        ReconConfig::from_loaded(&load_layered_yaml_from_strings(docs).unwrap()).unwrap()
    }

    #[test]
    fn defaults_fill_in() {
        let cfg = parse(&[MINIMAL]);
        assert_eq!(cfg.fields.selector_template, r#"[data-hook="{key}"]"#);
        assert_eq!(cfg.valuation.value_child, Some(1));
        assert_eq!(cfg.renderer.webdriver_url, "http://localhost:9515");
        assert_eq!(cfg.run.duplicate_policy, DuplicatePolicyConfig::AnyPrior);
        assert_eq!(cfg.run.accounts, vec!["100", "200"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let loaded =
            load_layered_yaml_from_strings(&[MINIMAL, "run:\n  max_acounts: 3\n"]).unwrap();
        let err = ReconConfig::from_loaded(&loaded).unwrap_err();
        assert!(format!("{err:#}").contains("CONFIG_INVALID"));
    }

    #[test]
    fn ready_conditions_parse_externally_tagged() {
        let cfg = parse(&[
            MINIMAL,
            "sources:\n  b:\n    ready:\n      - script: \"history.state.opa\"\n      - selector: \"#v\"\n",
        ]);
        assert_eq!(
            cfg.sources.b.ready,
            vec![
                ReadyConfig::Script("history.state.opa".to_string()),
                ReadyConfig::Selector("#v".to_string())
            ]
        );
    }

    #[test]
    fn duplicate_policy_parses_kebab_case() {
        let cfg = parse(&[MINIMAL, "run:\n  duplicate_policy: prior-output\n"]);
        assert_eq!(cfg.run.duplicate_policy, DuplicatePolicyConfig::PriorOutput);
    }

    #[test]
    fn validate_rejects_year_only_valuation() {
        let cfg = parse(&[MINIMAL, "valuation:\n  attrs: [year]\n"]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.starts_with("CONFIG_INVALID_VALUATION"), "{err}");
    }

    #[test]
    fn validate_rejects_template_without_account() {
        let cfg = parse(&[MINIMAL, "sources:\n  a:\n    url_template: \"http://a.example/\"\n"]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.starts_with("CONFIG_INVALID_SOURCE"), "{err}");
    }

    #[test]
    fn validate_rejects_same_tags() {
        let cfg = parse(&[MINIMAL, "sources:\n  a:\n    tag: opa\n"]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_transform_for_undeclared_field() {
        let cfg = parse(&[MINIMAL, "fields:\n  transforms:\n    zip: { a: [trim] }\n"]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.starts_with("CONFIG_UNDECLARED_FIELD"), "{err}");
    }

    #[test]
    fn validate_rejects_one_sided_currency() {
        let cfg = parse(&[MINIMAL, "fields:\n  transforms:\n    owner-name: { b: [currency] }\n"]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.starts_with("CONFIG_CURRENCY_CHAIN"), "{err}");
        assert!(err.contains("both sides"), "{err}");
    }

    #[test]
    fn validate_rejects_transform_after_currency() {
        let cfg = parse(&[
            MINIMAL,
            "fields:\n  transforms:\n    owner-name: { a: [currency], b: [currency, digits-only] }\n",
        ]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.starts_with("CONFIG_CURRENCY_CHAIN"), "{err}");
        assert!(err.contains("owner-name.b"), "{err}");
    }

    #[test]
    fn validate_accepts_currency_last_on_both_sides() {
        let cfg = parse(&[
            MINIMAL,
            "fields:\n  transforms:\n    owner-name: { a: [trim, currency], b: [Currency] }\n",
        ]);
        cfg.validate().unwrap();
    }

    #[test]
    fn validate_rejects_zero_max_accounts() {
        let cfg = parse(&[MINIMAL, "run:\n  max_accounts: 0\n"]);
        assert!(cfg.validate().is_err());
    }
}
