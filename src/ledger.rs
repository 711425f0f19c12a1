use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bigdecimal::BigDecimal;
use tracing::{error, info, warn};

use crate::accounts::AccountLookup;
use crate::audit::{AuditEvent, AuditSink};
use crate::database::idgen;
use crate::database::models::{LedgerEntry, NewLedgerEntry};
use crate::database::store::{LedgerStore, LedgerTx};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Bet,
    Win,
    Rollback,
    Cancel,
    Deposit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Bet => "bet",
            EntryKind::Win => "win",
            EntryKind::Rollback => "rollback",
            EntryKind::Cancel => "cancel",
            EntryKind::Deposit => "deposit",
        }
    }

    pub fn is_debit(&self) -> bool {
        matches!(self, EntryKind::Bet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountKey {
    pub owner_id: String,
    pub currency: String,
}

impl AccountKey {
    pub fn new(owner_id: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            currency: currency.into(),
        }
    }
}

/// One balance mutation as requested by a caller, before it is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: EntryKind,
    pub account: AccountKey,
    pub external_id: String,
    pub amount: BigDecimal,
    /// External id of the bet a rollback/cancel reverses.
    pub reverses: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl Mutation {
    // bet a rollback or cancel reverses, a cancel without reference names the bet by its own id
    pub fn reversal_target(&self) -> Option<&str> {
        match self.kind {
            EntryKind::Cancel => Some(self.reverses.as_deref().unwrap_or(&self.external_id)),
            EntryKind::Rollback => self.reverses.as_deref(),
            EntryKind::Bet | EntryKind::Win | EntryKind::Deposit => None,
        }
    }
}

// amount and balance columns are NUMERIC(30,8)
pub const AMOUNT_SCALE: i64 = 8;
pub const AMOUNT_INTEGER_DIGITS: i64 = 22;

/// True when `amount` is stored exactly, without rounding or overflow.
pub fn is_storable_amount(amount: &BigDecimal) -> bool {
    let amount = amount.normalized();
    let (_, scale) = amount.as_bigint_and_exponent();
    scale <= AMOUNT_SCALE && amount.digits() as i64 - scale <= AMOUNT_INTEGER_DIGITS
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Applied { entry_id: i64, balance: BigDecimal },
    // the external id was already applied, nothing was written
    Duplicate { entry_id: i64, balance: BigDecimal },
    InsufficientFunds { balance: BigDecimal },
    // cancel of a bet that was never persisted
    NotFound { balance: BigDecimal },
    UnknownAccount,
    AccountDisabled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Inquiry {
    Balance(BigDecimal),
    UnknownAccount,
    AccountDisabled,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("row lock not acquired in time")]
    LockContention,
    #[error("external id {external_id} is already used by another account")]
    Conflict { external_id: String },
    #[error("connection pool: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("storage: {0}")]
    Storage(diesel::result::Error),
}

impl From<diesel::result::Error> for LedgerError {
    fn from(e: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match &e {
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => LedgerError::LockContention,
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => LedgerError::Conflict {
                external_id: info.details().unwrap_or_else(|| info.message()).to_string(),
            },
            // postgres reports lock_timeout (55P03) and deadlocks (40P01) without a dedicated kind
            Error::DatabaseError(DatabaseErrorKind::Unknown, info)
                if info.message().contains("lock timeout") || info.message().contains("deadlock detected") =>
            {
                LedgerError::LockContention
            }
            _ => LedgerError::Storage(e),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_millis() as u64;
        Duration::from_millis(base * attempt as u64 + fastrand::u64(0..=base))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

pub struct Ledger {
    store: Arc<dyn LedgerStore>,
    accounts: Arc<dyn AccountLookup>,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        accounts: Arc<dyn AccountLookup>,
        audit: Arc<dyn AuditSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            accounts,
            audit,
            retry,
        }
    }

    // creates a zero balance for the account, returns false if it already existed
    pub fn open_account(&self, account: &AccountKey) -> Result<bool, LedgerError> {
        self.store.open_account(account)
    }

    // plain read, no lock and no mutation
    pub fn inquire(&self, account: &AccountKey) -> Result<Inquiry, LedgerError> {
        let Some(balance) = self.store.read_balance(account)? else {
            return Ok(Inquiry::UnknownAccount);
        };
        if !self.accounts.is_enabled(&account.owner_id) {
            return Ok(Inquiry::AccountDisabled);
        }
        Ok(Inquiry::Balance(balance))
    }

    /// Applies the mutation exactly once. Lock contention is retried up to
    /// `RetryPolicy::attempts` times, every attempt runs in a fresh transaction.
    pub fn apply(&self, mutation: &Mutation) -> Result<Outcome, LedgerError> {
        let mut attempt = 1;
        let result = loop {
            match self
                .store
                .transaction(&mut |tx: &mut dyn LedgerTx| self.apply_locked(tx, mutation)) {
                Err(LedgerError::LockContention) if attempt < self.retry.attempts => {
                    warn!(
                        owner_id = mutation.account.owner_id.as_str(),
                        external_id = mutation.external_id.as_str(),
                        attempt,
                        "lock contention, retrying"
                    );
                    thread::sleep(self.retry.delay(attempt));
                    attempt += 1;
                }
                res => break res,
            }
        };
        self.report(mutation, &result);
        result
    }

    fn apply_locked(&self, tx: &mut dyn LedgerTx, m: &Mutation) -> Result<Outcome, LedgerError> {
        // lock balance row for the rest of the transaction
        let Some(before) = tx.lock_account(&m.account)? else {
            return Ok(Outcome::UnknownAccount);
        };
        // idempotency check, a replay gets its original answer even if the account was disabled since
        if let Some(existing) = tx.find_entry(&m.external_id, m.kind)? {
            if !existing.belongs_to(&m.account) {
                return Err(LedgerError::Conflict {
                    external_id: m.external_id.clone(),
                });
            }
            return Ok(Outcome::Duplicate {
                entry_id: existing.id,
                balance: before,
            });
        }
        if let Some(target) = m.reversal_target() {
            if let Some(reversal) = tx.find_reversal(&m.account, target)? {
                return Ok(Outcome::Duplicate {
                    entry_id: reversal.id,
                    balance: before,
                });
            }
        }

        // only new mutations are refused
        if !self.accounts.is_enabled(&m.account.owner_id) {
            return Ok(Outcome::AccountDisabled);
        }

        let mut amount = m.amount.clone();
        let mut reverses = m.reverses.clone();
        let mut reversed_entry = None;
        match m.kind {
            EntryKind::Cancel => {
                let target = m.reversal_target().unwrap_or(&m.external_id);
                let bet = match tx.find_entry(target, EntryKind::Bet)? {
                    Some(bet) if bet.belongs_to(&m.account) => bet,
                    _ => return Ok(Outcome::NotFound { balance: before }),
                };
                if bet.amount != m.amount {
                    warn!(
                        external_id = m.external_id.as_str(),
                        requested = %m.amount,
                        reversed = %bet.amount,
                        "cancel amount differs from the bet, reversing the bet amount"
                    );
                }
                amount = bet.amount.clone();
                reverses = Some(target.to_string());
                reversed_entry = Some(bet.id);
            }
            EntryKind::Bet | EntryKind::Win | EntryKind::Rollback | EntryKind::Deposit => {}
        }

        let Some(after) = settle(m.kind, &before, &amount) else {
            return Ok(Outcome::InsufficientFunds { balance: before });
        };

        let entry = NewLedgerEntry {
            id: idgen::next(),
            owner_id: m.account.owner_id.clone(),
            currency: m.account.currency.clone(),
            kind: m.kind.as_str().to_string(),
            amount,
            status: "completed".to_string(),
            external_id: m.external_id.clone(),
            reversed_external_id: reverses,
            balance_before: before,
            balance_after: after.clone(),
            metadata: entry_metadata(m.metadata.clone(), reversed_entry),
            created_at: chrono::Utc::now().naive_utc(),
        };
        // both writes commit or roll back together
        tx.write_balance(&m.account, &after)?;
        tx.insert_entry(&entry)?;

        Ok(Outcome::Applied {
            entry_id: entry.id,
            balance: after,
        })
    }

    fn report(&self, m: &Mutation, result: &Result<Outcome, LedgerError>) {
        let owner_id = m.account.owner_id.as_str();
        let external_id = m.external_id.as_str();
        let kind = m.kind.as_str();
        match result {
            Ok(Outcome::Applied { entry_id, balance }) => {
                info!(owner_id, external_id, kind, entry_id, balance = %balance, "ledger entry applied");
                match m.kind {
                    EntryKind::Cancel => self.audit.record(AuditEvent::Reversed {
                        account: m.account.clone(),
                        external_id: m.external_id.clone(),
                        reversed_external_id: m.reverses.clone().unwrap_or_else(|| m.external_id.clone()),
                    }),
                    EntryKind::Deposit => self.audit.record(AuditEvent::Deposited {
                        account: m.account.clone(),
                        idempotency_key: m.external_id.clone(),
                        amount: m.amount.clone(),
                    }),
                    _ => {}
                }
            }
            Ok(Outcome::Duplicate { entry_id, .. }) => {
                info!(owner_id, external_id, kind, entry_id, "already applied, skipping")
            }
            Ok(Outcome::InsufficientFunds { balance }) => {
                warn!(owner_id, external_id, kind, balance = %balance, amount = %m.amount, "insufficient funds")
            }
            Ok(Outcome::NotFound { .. }) => info!(owner_id, external_id, kind, "nothing to reverse"),
            Ok(Outcome::UnknownAccount) => warn!(owner_id, currency = m.account.currency.as_str(), "unknown account"),
            Ok(Outcome::AccountDisabled) => {
                warn!(owner_id, external_id, kind, "account disabled");
                self.audit.record(AuditEvent::AccountDisabled {
                    account: m.account.clone(),
                    external_id: m.external_id.clone(),
                });
            }
            Err(e) => error!(owner_id, external_id, kind, "ledger mutation failed: {e}"),
        }
    }
}

// new balance after the mutation, None when a debit would go below zero
fn settle(kind: EntryKind, before: &BigDecimal, amount: &BigDecimal) -> Option<BigDecimal> {
    if kind.is_debit() {
        if before < amount {
            return None;
        }
        Some(before - amount)
    } else {
        Some(before + amount)
    }
}

fn entry_metadata(metadata: Option<serde_json::Value>, reversed_entry: Option<i64>) -> Option<serde_json::Value> {
    let Some(reversed_entry) = reversed_entry else {
        return metadata;
    };
    let mut map = match metadata {
        Some(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    map.insert("reversed_entry_id".to_string(), reversed_entry.into());
    Some(serde_json::Value::Object(map))
}

impl LedgerEntry {
    pub fn belongs_to(&self, account: &AccountKey) -> bool {
        self.owner_id == account.owner_id && self.currency == account.currency
    }
}
