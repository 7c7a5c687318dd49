//! Config -> run plan.
//!
//! Everything that can be wrong with the configuration is caught here, before
//! a renderer is connected or any page is fetched.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use pdiff_config::{DuplicatePolicyConfig, ReadyConfig, ReconConfig, SourceConfig};
use pdiff_reconcile::{DiffEngine, Normalizer, Schema, Side, Transform};
use pdiff_render::{
    Browser, ExtractionSpec, ReadyCondition, TableSelector, WebDriverConfig,
};

use crate::{DuplicatePolicy, RunOptions};

/// One data source as the driver sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSite {
    pub side: Side,
    pub tag: String,
    pub url_template: String,
    pub ready: Vec<ReadyCondition>,
    pub ready_timeout: Duration,
}

impl SourceSite {
    /// The account id is percent-encoded; plain numeric ids pass through as-is.
    pub fn url_for(&self, account: &str) -> String {
        self.url_template
            .replace("{account}", &urlencoding::encode(account))
    }

    fn from_config(side: Side, cfg: &SourceConfig) -> Self {
        Self {
            side,
            tag: cfg.tag.clone(),
            url_template: cfg.url_template.clone(),
            ready: cfg
                .ready
                .iter()
                .map(|r| match r {
                    ReadyConfig::Script(expr) => ReadyCondition::Script(expr.clone()),
                    ReadyConfig::Selector(sel) => ReadyCondition::Selector(sel.clone()),
                })
                .collect(),
            ready_timeout: Duration::from_millis(cfg.ready_timeout_ms),
        }
    }
}

/// Validated, typed inputs for one run.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub engine: DiffEngine,
    pub extraction: ExtractionSpec,
    pub source_a: SourceSite,
    pub source_b: SourceSite,
    pub options: RunOptions,
    pub renderer: WebDriverConfig,
}

impl RunPlan {
    pub fn from_config(cfg: &ReconConfig) -> Result<Self> {
        cfg.validate()?;

        let schema = Schema::new(cfg.fields.keys.clone(), cfg.valuation.attrs.clone())
            .map_err(|e| anyhow!("CONFIG_INVALID_SCHEMA: {e}"))?;

        let mut normalizer = Normalizer::new();
        for (key, sides) in &cfg.fields.transforms {
            for (side, names) in [(Side::A, &sides.a), (Side::B, &sides.b)] {
                if names.is_empty() {
                    continue;
                }
                let chain = names
                    .iter()
                    .map(|n| Transform::parse(n))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| {
                        anyhow!(
                            "CONFIG_UNKNOWN_TRANSFORM: fields.transforms.{key}.{}: {e}",
                            side.as_str().to_ascii_lowercase()
                        )
                    })?;
                normalizer.set_chain(key.clone(), side, chain);
            }
        }

        let extraction = ExtractionSpec::from_template(
            schema.fields(),
            &cfg.fields.selector_template,
            TableSelector {
                container: cfg.valuation.container.clone(),
                value_child: cfg.valuation.value_child,
            },
        );

        let browser = Browser::parse(&cfg.renderer.browser)
            .with_context(|| {
                format!(
                    "CONFIG_INVALID_RENDERER: unknown browser '{}'. expected one of: chrome | firefox",
                    cfg.renderer.browser
                )
            })?;

        let options = RunOptions {
            max_accounts: cfg.run.max_accounts,
            duplicate_policy: match cfg.run.duplicate_policy {
                DuplicatePolicyConfig::AnyPrior => DuplicatePolicy::AnyPrior,
                DuplicatePolicyConfig::PriorOutput => DuplicatePolicy::PriorOutput,
            },
        };

        Ok(Self {
            engine: DiffEngine::new(schema, normalizer),
            extraction,
            source_a: SourceSite::from_config(Side::A, &cfg.sources.a),
            source_b: SourceSite::from_config(Side::B, &cfg.sources.b),
            options,
            renderer: WebDriverConfig {
                endpoint: cfg.renderer.webdriver_url.clone(),
                browser,
                show: cfg.renderer.show,
                poll_interval: Duration::from_millis(cfg.renderer.poll_interval_ms),
                page_load_timeout: Duration::from_millis(cfg.renderer.page_load_timeout_ms),
            },
        })
    }
}
