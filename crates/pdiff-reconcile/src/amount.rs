//! Currency-formatted amounts <-> integer micros.
//!
//! Page text such as `"$1,234.50"` is reduced to its digits and decimal point,
//! then converted to integer micros without any floating-point step, so two
//! sources that render the same amount differently compare equal.

use std::fmt;

/// Micros scale (1e-6) used for every parsed amount.
pub const MICROS_SCALE: i64 = 1_000_000;

const FRACTION_DIGITS: usize = 6;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors produced while parsing an amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// More than one `.` remained after stripping formatting.
    MultipleDecimalPoints { raw: String },
    /// More than 6 fractional digits (ambiguous micro conversion).
    TooManyDecimalPlaces { raw: String },
    /// The amount does not fit in i64 micros.
    Overflow { raw: String },
}

impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::MultipleDecimalPoints { raw } => {
                write!(f, "amount '{raw}' has more than one decimal point")
            }
            AmountError::TooManyDecimalPlaces { raw } => write!(
                f,
                "amount '{raw}' has more than {FRACTION_DIGITS} decimal places \
                 (ambiguous micro conversion)"
            ),
            AmountError::Overflow { raw } => write!(f, "amount '{raw}' overflows i64 micros"),
        }
    }
}

impl std::error::Error for AmountError {}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse currency-like text into micros.
///
/// Rules:
/// - Every character that is not an ASCII digit or `.` is dropped
///   (currency symbols, thousands separators, whitespace, signs).
/// - If no digit remains the amount is absent: `Ok(None)`.
/// - Otherwise the remainder must be a plain decimal with at most 6
///   fractional digits.
pub fn parse_amount(raw: &str) -> Result<Option<i64>, AmountError> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if !kept.chars().any(|c| c.is_ascii_digit()) {
        return Ok(None);
    }

    let (int_part, frac_part) = match kept.split_once('.') {
        Some((i, f)) => (i, f),
        None => (kept.as_str(), ""),
    };

    if frac_part.contains('.') {
        return Err(AmountError::MultipleDecimalPoints {
            raw: raw.to_string(),
        });
    }
    if frac_part.len() > FRACTION_DIGITS {
        return Err(AmountError::TooManyDecimalPlaces {
            raw: raw.to_string(),
        });
    }

    let overflow = || AmountError::Overflow {
        raw: raw.to_string(),
    };

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<i64>().map_err(|_| overflow())?
    };

    // Pad fractional part to exactly 6 digits, then parse.
    let mut frac_padded = frac_part.to_string();
    while frac_padded.len() < FRACTION_DIGITS {
        frac_padded.push('0');
    }
    let frac_val: i64 = frac_padded.parse::<i64>().map_err(|_| overflow())?;

    int_val
        .checked_mul(MICROS_SCALE)
        .and_then(|v| v.checked_add(frac_val))
        .map(Some)
        .ok_or_else(overflow)
}

/// Render micros as the shortest exact decimal string (`1200`, `12.5`, `-0.25`).
pub fn format_micros(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let scale = MICROS_SCALE as u64;
    let int_part = abs / scale;
    let frac_part = abs % scale;

    if frac_part == 0 {
        return format!("{sign}{int_part}");
    }

    let frac = format!("{frac_part:06}");
    format!("{sign}{int_part}.{}", frac.trim_end_matches('0'))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
