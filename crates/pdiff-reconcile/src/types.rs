use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::amount::format_micros;

/// Opaque account / parcel identifier, stable across both sources.
pub type AccountId = String;

/// Year key of a valuation row.
pub type Year = i32;

/// Role of a data source in a comparison.
///
/// `B` is the primary source (fetched first); `A` is the secondary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A value in comparable form.
///
/// Equality is strict including the variant: `Text("1000")` never equals
/// `Micros(1_000_000_000)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    /// Currency / numeric amount in micros (1 unit = 1_000_000).
    Micros(i64),
    /// No value: the field, year, or amount digits were not there.
    Absent,
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Micros(m) => f.write_str(&format_micros(*m)),
            FieldValue::Absent => Ok(()),
        }
    }
}

/// One year of valuation attributes (attribute key -> value).
pub type ValuationRow = BTreeMap<String, FieldValue>;

/// Everything extracted for one account from one source.
///
/// Created once per (account, source) pair and discarded after diffing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Flat fields, raw text as it appeared on the page.
    pub fields: BTreeMap<String, String>,
    /// Valuation series keyed by year (ascending iteration).
    pub valuations: BTreeMap<Year, ValuationRow>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn years(&self) -> BTreeSet<Year> {
        self.valuations.keys().copied().collect()
    }
}

/// One field (or year-attribute) where the two sources disagree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub account: AccountId,
    /// A field key, or `"<attr>-<year>"` for valuation cells.
    pub key: String,
    pub source_a: FieldValue,
    pub source_b: FieldValue,
    pub is_valuation: bool,
}

impl Discrepancy {
    pub fn valuation_key(attr: &str, year: Year) -> String {
        format!("{attr}-{year}")
    }
}

/// Error building a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    NoFields,
    DuplicateField(String),
    /// The first attribute is the year key; at least one more is needed.
    TooFewValuationAttrs(usize),
    DuplicateValuationAttr(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::NoFields => write!(f, "at least one field key is required"),
            SchemaError::DuplicateField(k) => write!(f, "field key '{k}' is declared twice"),
            SchemaError::TooFewValuationAttrs(n) => write!(
                f,
                "valuation attrs need the year key plus at least one attribute, got {n}"
            ),
            SchemaError::DuplicateValuationAttr(k) => {
                write!(f, "valuation attr '{k}' is declared twice")
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// Declared, ordered field keys and valuation attributes.
///
/// Declaration order drives both extraction and output order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<String>,
    valuation_attrs: Vec<String>,
}

impl Schema {
    pub fn new(fields: Vec<String>, valuation_attrs: Vec<String>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::NoFields);
        }
        let mut seen = BTreeSet::new();
        for k in &fields {
            if !seen.insert(k.as_str()) {
                return Err(SchemaError::DuplicateField(k.clone()));
            }
        }

        if valuation_attrs.len() < 2 {
            return Err(SchemaError::TooFewValuationAttrs(valuation_attrs.len()));
        }
        let mut seen = BTreeSet::new();
        for k in &valuation_attrs {
            if !seen.insert(k.as_str()) {
                return Err(SchemaError::DuplicateValuationAttr(k.clone()));
            }
        }

        Ok(Self {
            fields,
            valuation_attrs,
        })
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// All valuation attrs, year key first.
    pub fn valuation_attrs(&self) -> &[String] {
        &self.valuation_attrs
    }

    /// Valuation attrs that are compared (everything but the year key).
    pub fn compared_attrs(&self) -> &[String] {
        &self.valuation_attrs[1..]
    }
}
