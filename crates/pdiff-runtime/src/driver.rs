//! Reconciliation driver.
//!
//! State machine over the account list:
//!
//! ```text
//! Processing(i) --limit reached------------------------> Done
//! Processing(i) --already seen------> Skipped(i) ------> Processing(i+1)
//! Processing(i) --fetch B, fetch A, diff, write--------> Processing(i+1)
//! Processing(i) --fetch/extract error (logged)---------> Processing(i+1)
//! Processing(last) ------------------------------------> Done
//! Done: close the renderer exactly once
//! ```

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use pdiff_reconcile::{extract, AccountId, DiffEngine, Discrepancy, ExtractionError, Side, Snapshot};
use pdiff_render::{ExtractionSpec, PageRenderer, RenderError};
use tracing::{debug, info, warn};

use crate::{DiscrepancySink, RunPlan, SourceSite};

// ---------------------------------------------------------------------------
// Options / outcome types
// ---------------------------------------------------------------------------

/// When a repeated account id is skipped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Any earlier occurrence (reconciled, clean, or failed) skips it.
    #[default]
    AnyPrior,
    /// Only an earlier occurrence that emitted at least one record skips it.
    PriorOutput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop before index `max_accounts` (duplicates count toward the index).
    pub max_accounts: Option<usize>,
    pub duplicate_policy: DuplicatePolicy,
}

/// Counters for one run. Failures show up here and in the log, never in the
/// primary output stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// List positions reached before the run ended.
    pub positions_visited: usize,
    pub reconciled: usize,
    pub failed: usize,
    pub skipped_duplicates: usize,
    pub discrepancies: usize,
    /// The `max_accounts` cutoff ended the run before the list did.
    pub stopped_at_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountErrorKind {
    Fetch(RenderError),
    Extraction(ExtractionError),
}

/// A per-account failure. Local and non-fatal: the account is skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountError {
    pub account: AccountId,
    pub side: Side,
    pub tag: String,
    pub kind: AccountErrorKind,
}

impl fmt::Display for AccountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AccountErrorKind::Fetch(e) => {
                write!(f, "{} fetch failed for account {}: {e}", self.tag, self.account)
            }
            AccountErrorKind::Extraction(e) => write!(
                f,
                "{} extraction failed for account {}: {e}",
                self.tag, self.account
            ),
        }
    }
}

impl std::error::Error for AccountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            AccountErrorKind::Fetch(e) => Some(e),
            AccountErrorKind::Extraction(e) => Some(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Processing(usize),
    Skipped(usize),
    Done,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

pub struct Reconciler<R: PageRenderer> {
    renderer: R,
    engine: DiffEngine,
    extraction: ExtractionSpec,
    source_a: SourceSite,
    source_b: SourceSite,
    options: RunOptions,
}

impl<R: PageRenderer> Reconciler<R> {
    pub fn new(renderer: R, plan: &RunPlan) -> Self {
        Self {
            renderer,
            engine: plan.engine.clone(),
            extraction: plan.extraction.clone(),
            source_a: plan.source_a.clone(),
            source_b: plan.source_b.clone(),
            options: plan.options.clone(),
        }
    }

    /// Process `accounts` in order, streaming records into `sink`.
    ///
    /// Consumes the reconciler: the renderer is closed exactly once when the
    /// run ends, including when a sink write aborts it.
    pub async fn run<S: DiscrepancySink>(
        mut self,
        accounts: &[AccountId],
        sink: &mut S,
    ) -> Result<RunSummary> {
        info!(
            accounts = accounts.len(),
            max_accounts = ?self.options.max_accounts,
            duplicate_policy = ?self.options.duplicate_policy,
            renderer = self.renderer.name(),
            "reconcile run starting"
        );

        let outcome = self.drive(accounts, sink).await;

        if let Err(e) = self.renderer.close().await {
            warn!(error = %e, "renderer close failed");
        }

        if let Ok(summary) = &outcome {
            info!(
                positions_visited = summary.positions_visited,
                reconciled = summary.reconciled,
                failed = summary.failed,
                skipped_duplicates = summary.skipped_duplicates,
                discrepancies = summary.discrepancies,
                stopped_at_limit = summary.stopped_at_limit,
                "reconcile run finished"
            );
        }
        outcome
    }

    async fn drive<S: DiscrepancySink>(
        &mut self,
        accounts: &[AccountId],
        sink: &mut S,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        // Ids that must not be fetched again this run.
        let mut seen: HashSet<AccountId> = HashSet::new();

        let advance = |i: usize| {
            if i + 1 < accounts.len() {
                DriverState::Processing(i + 1)
            } else {
                DriverState::Done
            }
        };

        let mut state = if accounts.is_empty() {
            DriverState::Done
        } else {
            DriverState::Processing(0)
        };

        loop {
            state = match state {
                DriverState::Done => break,

                DriverState::Skipped(i) => advance(i),

                DriverState::Processing(i) => {
                    if self.options.max_accounts.is_some_and(|max| i >= max) {
                        info!(index = i, "max accounts reached; stopping");
                        summary.stopped_at_limit = true;
                        DriverState::Done
                    } else {
                        summary.positions_visited += 1;
                        let account = &accounts[i];

                        if seen.contains(account) {
                            debug!(index = i, account = %account, "duplicate account; skipping");
                            summary.skipped_duplicates += 1;
                            DriverState::Skipped(i)
                        } else {
                            match self.reconcile_account(account).await {
                                Ok(diffs) => {
                                    for d in &diffs {
                                        sink.write(d)?;
                                    }
                                    debug!(
                                        index = i,
                                        account = %account,
                                        discrepancies = diffs.len(),
                                        "account reconciled"
                                    );
                                    summary.reconciled += 1;
                                    summary.discrepancies += diffs.len();
                                    if self.options.duplicate_policy == DuplicatePolicy::AnyPrior
                                        || !diffs.is_empty()
                                    {
                                        seen.insert(account.clone());
                                    }
                                }
                                Err(e) => {
                                    warn!(
                                        index = i,
                                        account = %e.account,
                                        source = %e.tag,
                                        side = %e.side,
                                        error = %e,
                                        "account skipped"
                                    );
                                    summary.failed += 1;
                                    if self.options.duplicate_policy == DuplicatePolicy::AnyPrior {
                                        seen.insert(account.clone());
                                    }
                                }
                            }
                            advance(i)
                        }
                    }
                }
            };
        }

        Ok(summary)
    }

    /// Fetch B (primary) then A (secondary), then diff.
    async fn reconcile_account(&mut self, account: &str) -> Result<Vec<Discrepancy>, AccountError> {
        let b = self.fetch_snapshot(Side::B, account).await?;
        let a = self.fetch_snapshot(Side::A, account).await?;
        Ok(self.engine.diff(account, &a, &b))
    }

    async fn fetch_snapshot(&mut self, side: Side, account: &str) -> Result<Snapshot, AccountError> {
        let site = match side {
            Side::A => &self.source_a,
            Side::B => &self.source_b,
        };
        let fail = |kind: AccountErrorKind| AccountError {
            account: account.to_string(),
            side: site.side,
            tag: site.tag.clone(),
            kind,
        };

        let url = site.url_for(account);
        self.renderer
            .navigate(&url)
            .await
            .map_err(|e| fail(AccountErrorKind::Fetch(e)))?;
        for cond in &site.ready {
            self.renderer
                .wait_until(cond, site.ready_timeout)
                .await
                .map_err(|e| fail(AccountErrorKind::Fetch(e)))?;
        }
        let page = self
            .renderer
            .extract_structured(&self.extraction)
            .await
            .map_err(|e| fail(AccountErrorKind::Fetch(e)))?;

        extract(&page, self.engine.schema()).map_err(|e| fail(AccountErrorKind::Extraction(e)))
    }
}
