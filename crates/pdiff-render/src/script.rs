//! JavaScript evaluated inside the page via `execute/sync`.
//!
//! Scripts receive their inputs through `arguments[..]` and return plain
//! JSON-compatible values.

/// `arguments[0]`: CSS selector. Returns `true` when it matches.
pub const SELECTOR_PRESENT: &str = "return document.querySelector(arguments[0]) !== null;";

/// `arguments[0]`: serialized [`crate::ExtractionSpec`].
///
/// Returns `{ fields: {key: text|null}, rows: [[text|null]] | null }`, the
/// shape of [`pdiff_reconcile::RawPage`].
pub const EXTRACT_PAGE: &str = r#"
const spec = arguments[0];
const fields = {};
for (const f of spec.fields) {
  const el = document.querySelector(f.selector);
  fields[f.key] = el ? el.textContent : null;
}
let rows = null;
const table = document.querySelector(spec.table.container);
if (table) {
  rows = [];
  for (const row of table.children) {
    const cells = [];
    for (const col of row.children) {
      const target = spec.table.value_child === null ? col : col.children[spec.table.value_child];
      cells.push(target ? target.textContent : null);
    }
    rows.push(cells);
  }
}
return { fields: fields, rows: rows };
"#;

/// Wrap a readiness expression so it returns a boolean and never throws.
pub fn ready_expression(expr: &str) -> String {
    format!("try {{ return !!({expr}); }} catch (e) {{ return false; }}")
}
