//! pdiff-reconcile
//!
//! Property record reconciliation engine.
//!
//! Two sources present the same account under different formatting. This
//! crate turns what a renderer pulled out of each page into a [`Snapshot`],
//! normalizes the values known to differ only in presentation, and reports
//! every field where the two sides still disagree.
//!
//! Deterministic, pure logic. No IO. No renderer calls.

mod amount;
mod engine;
mod extract;
mod normalize;
mod types;

pub use amount::{format_micros, parse_amount, AmountError, MICROS_SCALE};
pub use engine::DiffEngine;
pub use extract::{extract, ExtractionError, RawPage};
pub use normalize::{Normalizer, Transform, UnknownTransform};
pub use types::*;
