use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use pdiff_config::{LoadedConfig, ReconConfig};
use pdiff_render::{PageRenderer, WebDriverRenderer};
use pdiff_runtime::accounts::{load_accounts, shuffle_accounts};
use pdiff_runtime::{CsvSink, Reconciler, RunPlan};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Exit status when `fail_on_error` is set and at least one account failed.
const EXIT_ACCOUNT_FAILURES: u8 = 3;

#[derive(Parser)]
#[command(name = "pdiff")]
#[command(about = "Property record reconciliation between two sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile every account and stream discrepancies as CSV
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Write CSV here instead of stdout
        #[arg(long)]
        out: Option<String>,
    },

    /// Validate config and account list without connecting to a browser
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> local...)
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

/// Command-line settings layered over the YAML config.
#[derive(Args)]
struct Overrides {
    /// Layered config paths in merge order
    #[arg(long = "config", required = true)]
    config_paths: Vec<String>,

    /// Stop before this list position (run.max_accounts)
    #[arg(long = "max")]
    max_accounts: Option<usize>,

    /// Shuffle the account list before the run
    #[arg(long, default_value_t = false)]
    shuffle: bool,

    /// Seed for --shuffle (reproducible order)
    #[arg(long)]
    seed: Option<u64>,

    /// Show the browser window instead of running headless
    #[arg(long, default_value_t = false)]
    show: bool,

    /// Account file, one id per line (run.accounts_file)
    #[arg(long = "accounts")]
    accounts_file: Option<String>,

    /// Exit with status 3 when any account failed
    #[arg(long, default_value_t = false)]
    fail_on_error: bool,
}

impl Overrides {
    /// Only flags actually given end up in the overlay, so an unset flag never
    /// clobbers a config value.
    fn overlay(&self) -> Value {
        let mut run = Map::new();
        if let Some(max) = self.max_accounts {
            run.insert("max_accounts".to_string(), json!(max));
        }
        if self.shuffle {
            run.insert("shuffle".to_string(), json!(true));
        }
        if let Some(seed) = self.seed {
            run.insert("seed".to_string(), json!(seed));
        }
        if let Some(path) = &self.accounts_file {
            run.insert("accounts_file".to_string(), json!(path));
        }
        if self.fail_on_error {
            run.insert("fail_on_error".to_string(), json!(true));
        }

        let mut root = Map::new();
        if !run.is_empty() {
            root.insert("run".to_string(), Value::Object(run));
        }
        if self.show {
            root.insert("renderer".to_string(), json!({ "show": true }));
        }
        Value::Object(root)
    }

    fn load(&self) -> Result<(LoadedConfig, ReconConfig)> {
        let path_refs: Vec<&str> = self.config_paths.iter().map(|s| s.as_str()).collect();
        let loaded = pdiff_config::load_layered_yaml(&path_refs)
            .context("CONFIG_UNREADABLE: failed to load config")?
            .with_overlay(self.overlay())?;
        let cfg = ReconConfig::from_loaded(&loaded)?;
        Ok((loaded, cfg))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // dev-time .env.local (RUST_LOG etc.); a missing file is fine
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = pdiff_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Check { overrides } => {
            let (loaded, cfg) = overrides.load()?;
            let plan = RunPlan::from_config(&cfg)?;
            let accounts = load_accounts(&cfg.run)?;
            println!("config_hash={}", loaded.config_hash);
            println!(
                "accounts={} sources={},{} fields={}",
                accounts.len(),
                plan.source_a.tag,
                plan.source_b.tag,
                plan.engine.schema().fields().len()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::Run { overrides, out } => run(&overrides, out.as_deref()).await,
    }
}

async fn run(overrides: &Overrides, out: Option<&str>) -> Result<ExitCode> {
    // Everything config-shaped fails here, before a browser session exists.
    let (loaded, cfg) = overrides.load()?;
    let plan = RunPlan::from_config(&cfg)?;
    let mut accounts = load_accounts(&cfg.run)?;
    if cfg.run.shuffle {
        shuffle_accounts(&mut accounts, cfg.run.seed);
    }

    info!(
        config_hash = %loaded.config_hash,
        accounts = accounts.len(),
        source_a = %plan.source_a.tag,
        source_b = %plan.source_b.tag,
        shuffled = cfg.run.shuffle,
        "config loaded"
    );

    let writer: Box<dyn Write> = match out {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create output file: {path}"))?,
        ),
        None => Box::new(io::stdout()),
    };

    let mut renderer = WebDriverRenderer::connect(&plan.renderer)
        .await
        .with_context(|| format!("webdriver connect failed: {}", plan.renderer.endpoint))?;

    let mut sink = match CsvSink::new(writer, &plan.source_a.tag, &plan.source_b.tag) {
        Ok(sink) => sink,
        Err(e) => {
            if let Err(close_err) = renderer.close().await {
                warn!(error = %close_err, "renderer close failed");
            }
            return Err(e);
        }
    };

    let summary = Reconciler::new(renderer, &plan)
        .run(&accounts, &mut sink)
        .await?;
    sink.into_inner()?.flush().context("flush output failed")?;

    if cfg.run.fail_on_error && summary.failed > 0 {
        warn!(failed = summary.failed, "accounts failed; exiting non-zero");
        return Ok(ExitCode::from(EXIT_ACCOUNT_FAILURES));
    }
    Ok(ExitCode::SUCCESS)
}

fn init_tracing() {
    // stdout carries the CSV stream; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
