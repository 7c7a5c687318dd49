//! pdiff-runtime
//!
//! Runs a reconciliation: walks the account list, fetches each account from
//! both sources through one [`pdiff_render::PageRenderer`], diffs the two
//! snapshots, and streams discrepancies to a sink.
//!
//! Accounts are processed strictly one at a time; every record for account
//! N is written before any fetch for account N+1 begins.

pub mod accounts;
mod driver;
mod plan;
mod sink;

pub use driver::{
    AccountError, AccountErrorKind, DuplicatePolicy, Reconciler, RunOptions, RunSummary,
};
pub use plan::{RunPlan, SourceSite};
pub use sink::{CsvSink, DiscrepancySink, HEADER_ACCOUNT, HEADER_KEY, HEADER_VALUATION};
