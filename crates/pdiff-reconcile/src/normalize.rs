//! Per-field, per-side normalization before comparison.
//!
//! Transforms are pure and deterministic: the diff engine compares their
//! output with plain equality.

use std::collections::BTreeMap;
use std::fmt;

use crate::amount::parse_amount;
use crate::{FieldValue, Side};

/// A named, pure value transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Transform {
    Trim,
    CollapseWhitespace,
    Uppercase,
    Lowercase,
    /// Drop ASCII punctuation (`A. Smith` -> `A Smith`).
    StripPunctuation,
    DigitsOnly,
    /// Currency text -> micros (absent when no digits).
    Currency,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::Trim => "trim",
            Transform::CollapseWhitespace => "collapse-whitespace",
            Transform::Uppercase => "uppercase",
            Transform::Lowercase => "lowercase",
            Transform::StripPunctuation => "strip-punctuation",
            Transform::DigitsOnly => "digits-only",
            Transform::Currency => "currency",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnknownTransform> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trim" => Ok(Transform::Trim),
            "collapse-whitespace" => Ok(Transform::CollapseWhitespace),
            "uppercase" | "upper" => Ok(Transform::Uppercase),
            "lowercase" | "lower" => Ok(Transform::Lowercase),
            "strip-punctuation" => Ok(Transform::StripPunctuation),
            "digits-only" => Ok(Transform::DigitsOnly),
            "currency" => Ok(Transform::Currency),
            other => Err(UnknownTransform(other.to_string())),
        }
    }

    /// Apply to a value. Text transforms leave non-text values untouched.
    pub fn apply(&self, value: FieldValue) -> FieldValue {
        let text = match value {
            FieldValue::Text(t) => t,
            other => return other,
        };

        match self {
            Transform::Trim => FieldValue::Text(text.trim().to_string()),
            Transform::CollapseWhitespace => {
                FieldValue::Text(text.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            Transform::Uppercase => FieldValue::Text(text.to_uppercase()),
            Transform::Lowercase => FieldValue::Text(text.to_lowercase()),
            Transform::StripPunctuation => FieldValue::Text(
                text.chars().filter(|c| !c.is_ascii_punctuation()).collect(),
            ),
            Transform::DigitsOnly => {
                FieldValue::Text(text.chars().filter(|c| c.is_ascii_digit()).collect())
            }
            // A malformed amount stays text so it can never compare equal to a number.
            Transform::Currency => match parse_amount(&text) {
                Ok(Some(m)) => FieldValue::Micros(m),
                Ok(None) => FieldValue::Absent,
                Err(_) => FieldValue::Text(text),
            },
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTransform(pub String);

impl fmt::Display for UnknownTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown transform '{}'. expected one of: trim | collapse-whitespace | uppercase | \
             lowercase | strip-punctuation | digits-only | currency",
            self.0
        )
    }
}

impl std::error::Error for UnknownTransform {}

/// Transform chains keyed by `(field key, side)`.
///
/// Fields without a chain pass through as text.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Normalizer {
    chains: BTreeMap<(String, Side), Vec<Transform>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the chain for one field on one side.
    pub fn with_chain(mut self, key: impl Into<String>, side: Side, chain: Vec<Transform>) -> Self {
        self.set_chain(key, side, chain);
        self
    }

    pub fn set_chain(&mut self, key: impl Into<String>, side: Side, chain: Vec<Transform>) {
        self.chains.insert((key.into(), side), chain);
    }

    pub fn chain(&self, key: &str, side: Side) -> &[Transform] {
        self.chains
            .get(&(key.to_string(), side))
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// Comparable value for a raw field. `None` (field not in the snapshot)
    /// normalizes to [`FieldValue::Absent`].
    pub fn normalize(&self, key: &str, side: Side, raw: Option<&str>) -> FieldValue {
        let Some(raw) = raw else {
            return FieldValue::Absent;
        };
        self.chain(key, side)
            .iter()
            .fold(FieldValue::text(raw), |v, t| t.apply(v))
    }
}
