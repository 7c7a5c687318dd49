//! Scenario: the account limit halts the run cleanly.
//!
//! # Invariants under test
//!
//! 1. The cutoff is positional: list index `max_accounts` and beyond are
//!    never visited, and skipped duplicates count toward the index.
//! 2. Reaching the limit still closes the renderer exactly once.
//! 3. An empty list closes the renderer without navigating.

use pdiff_config::{load_layered_yaml_from_strings, ReconConfig};
use pdiff_reconcile::{AccountId, Discrepancy};
use pdiff_render::testkit::{ScriptedPage, ScriptedRenderer};
use pdiff_render::RawPage;
use pdiff_runtime::{Reconciler, RunPlan};

const YAML: &str = r#"
sources:
  a: { tag: ais, url_template: "a://{account}" }
  b: { tag: opa, url_template: "b://{account}" }
fields:
  keys: [owner-name]
valuation:
  attrs: [year, market-value]
run:
  accounts: ["0"]
  max_accounts: 3
"#;

fn plan() -> RunPlan {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    RunPlan::from_config(&ReconConfig::from_loaded(&loaded).unwrap()).unwrap()
}

fn renderer(ids: &[&str]) -> ScriptedRenderer {
    let mut p = RawPage::default();
    p.fields.insert("owner-name".to_string(), Some("X".to_string()));
    p.rows = Some(Vec::new());
    ids.iter().fold(ScriptedRenderer::new(), |r, id| {
        r.with_page(format!("a://{id}"), ScriptedPage::Ready(p.clone()))
            .with_page(format!("b://{id}"), ScriptedPage::Ready(p.clone()))
    })
}

#[tokio::test]
async fn scenario_limit_counts_positions_including_duplicates() {
    let renderer = renderer(&["1", "2", "3", "4"]);
    let log = renderer.log();
    let accounts: Vec<AccountId> = ["1", "1", "2", "3", "4"].iter().map(|s| s.to_string()).collect();
    let mut out: Vec<Discrepancy> = Vec::new();

    let summary = Reconciler::new(renderer, &plan())
        .run(&accounts, &mut out)
        .await
        .unwrap();

    assert_eq!(log.navigations(), vec!["b://1", "a://1", "b://2", "a://2"]);
    assert_eq!(summary.positions_visited, 3);
    assert_eq!(summary.skipped_duplicates, 1);
    assert!(summary.stopped_at_limit);
    assert_eq!(log.close_count(), 1);
}

#[tokio::test]
async fn scenario_list_shorter_than_limit_is_not_a_stop() {
    let renderer = renderer(&["1", "2"]);
    let log = renderer.log();
    let accounts: Vec<AccountId> = vec!["1".into(), "2".into()];
    let mut out: Vec<Discrepancy> = Vec::new();

    let summary = Reconciler::new(renderer, &plan())
        .run(&accounts, &mut out)
        .await
        .unwrap();

    assert_eq!(summary.reconciled, 2);
    assert!(!summary.stopped_at_limit);
    assert_eq!(log.close_count(), 1);
}

#[tokio::test]
async fn scenario_empty_list_only_closes() {
    let renderer = renderer(&[]);
    let log = renderer.log();
    let mut out: Vec<Discrepancy> = Vec::new();

    let summary = Reconciler::new(renderer, &plan())
        .run(&[], &mut out)
        .await
        .unwrap();

    assert!(log.navigations().is_empty());
    assert_eq!(summary.positions_visited, 0);
    assert_eq!(log.close_count(), 1);
}
