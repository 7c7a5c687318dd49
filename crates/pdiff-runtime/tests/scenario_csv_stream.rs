//! Scenario: discrepancies stream to CSV as accounts finish.
//!
//! # Invariants under test
//!
//! 1. Header is `account,key,<tag A>,<tag B>,valuation`, using configured tags.
//! 2. A year present in B and missing in A reports every compared attr with
//!    an empty source A column.
//! 3. A sink write failure aborts the run but the renderer is still closed
//!    exactly once.

use std::io::{self, Write};

use pdiff_config::{load_layered_yaml_from_strings, ReconConfig};
use pdiff_reconcile::AccountId;
use pdiff_render::testkit::{ScriptedPage, ScriptedRenderer};
use pdiff_render::RawPage;
use pdiff_runtime::{CsvSink, Reconciler, RunPlan};

const YAML: &str = r#"
sources:
  a: { tag: ais, url_template: "a://{account}" }
  b: { tag: opa, url_template: "b://{account}" }
fields:
  keys: [owner-name, sale-price]
  transforms:
    sale-price: { a: [currency], b: [currency] }
valuation:
  attrs: [year, market-value, taxable-land]
run:
  accounts: ["0"]
"#;

fn plan() -> RunPlan {
    let loaded = load_layered_yaml_from_strings(&[YAML]).unwrap();
    RunPlan::from_config(&ReconConfig::from_loaded(&loaded).unwrap()).unwrap()
}

fn page(owner: &str, price: &str, rows: &[[&str; 3]]) -> ScriptedPage {
    let mut p = RawPage::default();
    p.fields.insert("owner-name".to_string(), Some(owner.to_string()));
    p.fields.insert("sale-price".to_string(), Some(price.to_string()));
    p.rows = Some(
        rows.iter()
            .map(|r| r.iter().map(|c| Some(c.to_string())).collect())
            .collect(),
    );
    ScriptedPage::Ready(p)
}

fn renderer() -> ScriptedRenderer {
    ScriptedRenderer::new()
        .with_page(
            "b://100",
            page("SMITH, A", "$250,000.00", &[["2021", "$300,000", "$50,000"], ["2022", "$310,000", "$52,000"]]),
        )
        .with_page(
            "a://100",
            page("SMITH A", "250000", &[["2021", "300000", "50000"]]),
        )
        .with_page("b://200", page("DOE", "$1", &[]))
        .with_page("a://200", page("DOE", "$2", &[]))
}

#[tokio::test]
async fn scenario_csv_output_matches_record_order() {
    let accounts: Vec<AccountId> = vec!["100".into(), "200".into()];
    let mut sink = CsvSink::new(Vec::new(), "ais", "opa").unwrap();

    Reconciler::new(renderer(), &plan())
        .run(&accounts, &mut sink)
        .await
        .unwrap();

    let out = String::from_utf8(sink.into_inner().unwrap()).unwrap();
    assert_eq!(
        out,
        "account,key,ais,opa,valuation\n\
         100,owner-name,SMITH A,\"SMITH, A\",false\n\
         100,market-value-2022,,310000,true\n\
         100,taxable-land-2022,,52000,true\n\
         200,sale-price,2,1,false\n"
    );
}

/// Accepts the header, then fails every write.
struct FailAfterHeader {
    header_written: bool,
}

impl Write for FailAfterHeader {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.header_written {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"));
        }
        self.header_written = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_sink_failure_is_fatal_and_still_closes() {
    let renderer = renderer();
    let log = renderer.log();
    let accounts: Vec<AccountId> = vec!["100".into(), "200".into()];
    let mut sink = CsvSink::new(FailAfterHeader { header_written: false }, "ais", "opa").unwrap();

    let err = Reconciler::new(renderer, &plan())
        .run(&accounts, &mut sink)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("account=100"), "{err}");
    assert_eq!(log.navigations(), vec!["b://100", "a://100"]);
    assert_eq!(log.close_count(), 1);
}
