//! Upstream account pool.
//!
//! Holds the session accounts loaded at startup, picks the best candidate for
//! each attempt and records how that attempt went. Selection approximates
//! round-robin (least recently used first) while keeping accounts that keep
//! failing out of rotation until their cooldown has elapsed.
//!
//! All state lives behind one mutex. It is held only for the selection and
//! outcome bookkeeping, never across a network call, so an account may be
//! handed out again before its previous request has finished.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;

/// Selection thresholds.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Accumulated transient errors after which an account sits out.
    pub max_errors: u32,
    /// Time since last use after which a benched account is eligible again,
    /// with its error count reset.
    pub cooldown: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_errors: 3,
            cooldown: Duration::from_secs(300), // 5 minutes
        }
    }
}

/// A single upstream session account.
#[derive(Debug, Clone)]
pub struct Account {
    pub token: String,
    /// Cleared permanently on an auth failure.
    pub is_valid: bool,
    /// None until the account is first selected.
    pub last_used: Option<DateTime<Utc>>,
    pub error_count: u32,
}

impl Account {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            is_valid: true,
            last_used: None,
            error_count: 0,
        }
    }

    fn cooled_down(&self, now: DateTime<Utc>, cooldown: Duration) -> bool {
        match self.last_used {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed > cooldown)
                .unwrap_or(false),
        }
    }
}

/// Result of one upstream attempt, from the account's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountOutcome {
    Success,
    /// 401/403: credentials are dead.
    AuthFailure,
    /// 429/5xx or transport failure.
    TransientFailure,
    /// The request itself was rejected; not the account's fault.
    ClientFailure,
}

impl std::fmt::Display for AccountOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::AuthFailure => write!(f, "auth_failure"),
            Self::TransientFailure => write!(f, "transient_failure"),
            Self::ClientFailure => write!(f, "client_failure"),
        }
    }
}

/// Handle to a selected account, used to report the outcome back.
#[derive(Debug, Clone)]
pub struct AccountLease {
    index: usize,
    token: String,
}

impl AccountLease {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn masked_token(&self) -> String {
        mask_token(&self.token)
    }
}

/// Render a token as `...abcd` for logs.
pub fn mask_token(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", tail)
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("No valid Yupp.ai accounts available.")]
pub struct NoAccountAvailable;

#[derive(Debug)]
pub struct AccountPool {
    accounts: Mutex<Vec<Account>>,
    size: usize,
    config: PoolConfig,
}

pub type SharedAccountPool = Arc<AccountPool>;

impl AccountPool {
    pub fn new(accounts: Vec<Account>, config: PoolConfig) -> Self {
        Self {
            size: accounts.len(),
            accounts: Mutex::new(accounts),
            config,
        }
    }

    pub fn from_tokens<I, S>(tokens: I, config: PoolConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(tokens.into_iter().map(Account::new).collect(), config)
    }

    /// Number of accounts, valid or not. Bounds the failover loop.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Pick the best eligible account and mark it used.
    pub async fn select(&self) -> Result<AccountLease, NoAccountAvailable> {
        self.select_at(Utc::now()).await
    }

    pub(crate) async fn select_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<AccountLease, NoAccountAvailable> {
        let mut accounts = self.accounts.lock().await;
        let max_errors = self.config.max_errors;
        let cooldown = self.config.cooldown;

        let mut eligible = Vec::new();
        for (index, account) in accounts.iter_mut().enumerate() {
            if !account.is_valid {
                continue;
            }
            if account.error_count >= max_errors {
                if !account.cooled_down(now, cooldown) {
                    continue;
                }
                tracing::debug!(
                    account = %mask_token(&account.token),
                    error_count = account.error_count,
                    "Cooldown elapsed, resetting error count"
                );
                account.error_count = 0;
            }
            eligible.push(index);
        }

        // Oldest use first, fewest errors breaks ties; `min_by_key` keeps the
        // earliest index among equals.
        let index = eligible
            .into_iter()
            .min_by_key(|&i| (accounts[i].last_used, accounts[i].error_count))
            .ok_or(NoAccountAvailable)?;

        let account = &mut accounts[index];
        account.last_used = Some(now);
        Ok(AccountLease {
            index,
            token: account.token.clone(),
        })
    }

    /// Apply the outcome of an attempt made with `lease`.
    pub async fn record_outcome(&self, lease: &AccountLease, outcome: AccountOutcome) {
        let mut accounts = self.accounts.lock().await;
        let Some(account) = accounts.get_mut(lease.index) else {
            return;
        };
        match outcome {
            AccountOutcome::AuthFailure => {
                account.is_valid = false;
                tracing::warn!(
                    account = %lease.masked_token(),
                    "Account marked as invalid due to auth error"
                );
            }
            AccountOutcome::TransientFailure => {
                account.error_count = account.error_count.saturating_add(1);
                tracing::info!(
                    account = %lease.masked_token(),
                    error_count = account.error_count,
                    "Account error count increased"
                );
            }
            AccountOutcome::Success | AccountOutcome::ClientFailure => {}
        }
    }

    /// Copy of the current account states.
    pub async fn snapshot(&self) -> Vec<Account> {
        self.accounts.lock().await.clone()
    }
}
