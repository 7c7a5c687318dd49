//! Account source: inline ids and/or an account file, optionally shuffled.

use std::fs;

use anyhow::{bail, Context, Result};
use pdiff_config::RunConfig;
use pdiff_reconcile::AccountId;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// One id per line; blank lines and `#` comments are ignored.
pub fn parse_account_lines(text: &str) -> Vec<AccountId> {
    text.lines()
        .map(|l| l.split('#').next().unwrap_or("").trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect()
}

/// Inline ids followed by the ids in `accounts_file`, in order.
///
/// Duplicates are kept; the driver decides what to do with them.
/// An empty result is a configuration error.
pub fn load_accounts(run: &RunConfig) -> Result<Vec<AccountId>> {
    let mut out: Vec<AccountId> = run.accounts.iter().map(|a| a.trim().to_string()).collect();
    out.retain(|a| !a.is_empty());

    if let Some(path) = &run.accounts_file {
        let text = fs::read_to_string(path)
            .with_context(|| format!("CONFIG_ACCOUNTS_FILE: failed to read {path}"))?;
        out.extend(parse_account_lines(&text));
    }

    if out.is_empty() {
        bail!("CONFIG_NO_ACCOUNTS: no account ids given (run.accounts / run.accounts_file)");
    }
    Ok(out)
}

/// Shuffle in place. A seed makes the order reproducible.
pub fn shuffle_accounts(accounts: &mut [AccountId], seed: Option<u64>) {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    accounts.shuffle(&mut rng);
}
