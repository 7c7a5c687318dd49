//! Value extraction: rendered page values -> [`Snapshot`].
//!
//! A renderer evaluates an extraction script against the loaded document and
//! hands back a [`RawPage`]: plain text for each requested field plus the text
//! of every cell in the valuation table. This module validates that shape and
//! parses it. It never touches a renderer.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

use crate::amount::{parse_amount, AmountError};
use crate::{FieldValue, Schema, Snapshot, ValuationRow, Year};

// ---------------------------------------------------------------------------
// Raw page values
// ---------------------------------------------------------------------------

/// Values pulled from one rendered page, before any parsing.
///
/// Unknown JSON members are ignored so renderer scripts can grow without
/// breaking deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawPage {
    /// Field key -> element text. `None` when the element was not found.
    #[serde(default)]
    pub fields: BTreeMap<String, Option<String>>,
    /// Valuation table rows, each a list of cell texts. `None` when the table
    /// container was not found; a `None` cell means the value element was
    /// missing inside that column.
    #[serde(default)]
    pub rows: Option<Vec<Vec<Option<String>>>>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The rendered document did not contain an expected element or value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    MissingField { key: String },
    MissingValuationTable,
    ShortRow {
        row: usize,
        expected: usize,
        got: usize,
    },
    MissingCell { row: usize, attr: String },
    InvalidYear { row: usize, raw: String },
    InvalidAmount {
        row: usize,
        attr: String,
        source: AmountError,
    },
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField { key } => write!(f, "field '{key}' not found on page"),
            Self::MissingValuationTable => write!(f, "valuation table not found on page"),
            Self::ShortRow { row, expected, got } => write!(
                f,
                "valuation row {row} has {got} column(s), expected at least {expected}"
            ),
            Self::MissingCell { row, attr } => {
                write!(f, "valuation row {row} has no value for '{attr}'")
            }
            Self::InvalidYear { row, raw } => {
                write!(f, "valuation row {row} has unparseable year '{raw}'")
            }
            Self::InvalidAmount { row, attr, source } => {
                write!(f, "valuation row {row} '{attr}': {source}")
            }
        }
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidAmount { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Build a [`Snapshot`] from raw page values.
///
/// - every declared field must be present;
/// - the valuation table must be present (it may have zero rows);
/// - each row carries the year in column 0 and the remaining attrs in
///   declared order; extra trailing columns are ignored;
/// - a later row for the same year replaces the earlier one.
pub fn extract(page: &RawPage, schema: &Schema) -> Result<Snapshot, ExtractionError> {
    let mut fields = BTreeMap::new();
    for key in schema.fields() {
        match page.fields.get(key) {
            Some(Some(text)) => {
                fields.insert(key.clone(), text.clone());
            }
            _ => return Err(ExtractionError::MissingField { key: key.clone() }),
        }
    }

    let rows = page
        .rows
        .as_ref()
        .ok_or(ExtractionError::MissingValuationTable)?;

    let attrs = schema.valuation_attrs();
    let mut valuations: BTreeMap<Year, ValuationRow> = BTreeMap::new();

    for (row_idx, cells) in rows.iter().enumerate() {
        if cells.len() < attrs.len() {
            return Err(ExtractionError::ShortRow {
                row: row_idx,
                expected: attrs.len(),
                got: cells.len(),
            });
        }

        let year_raw = cell_text(cells, attrs, row_idx, 0)?;
        let year: Year = year_raw
            .trim()
            .parse()
            .map_err(|_| ExtractionError::InvalidYear {
                row: row_idx,
                raw: year_raw.to_string(),
            })?;

        let mut row = ValuationRow::new();
        for (col, attr) in attrs.iter().enumerate().skip(1) {
            let value = parse_amount(cell_text(cells, attrs, row_idx, col)?).map_err(|source| {
                ExtractionError::InvalidAmount {
                    row: row_idx,
                    attr: attr.clone(),
                    source,
                }
            })?;
            row.insert(
                attr.clone(),
                value.map(FieldValue::Micros).unwrap_or(FieldValue::Absent),
            );
        }

        valuations.insert(year, row);
    }

    Ok(Snapshot { fields, valuations })
}

fn cell_text<'a>(
    cells: &'a [Option<String>],
    attrs: &[String],
    row: usize,
    col: usize,
) -> Result<&'a str, ExtractionError> {
    cells[col]
        .as_deref()
        .ok_or_else(|| ExtractionError::MissingCell {
            row,
            attr: attrs[col].clone(),
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
