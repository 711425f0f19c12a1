//! In-memory `LedgerStore` for tests. Row locks are emulated with a lock set
//! guarded by a `Condvar`, writes are buffered per transaction and only become
//! visible on commit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bigdecimal::BigDecimal;

use crate::database::models::{LedgerEntry, NewLedgerEntry};
use crate::database::store::{LedgerStore, LedgerTx, TxBody};
use crate::ledger::{AccountKey, EntryKind, LedgerError, Outcome};

#[derive(Default)]
struct State {
    balances: HashMap<AccountKey, BigDecimal>,
    entries: Vec<LedgerEntry>,
    locked: HashSet<AccountKey>,
}

pub struct MemoryStore {
    state: Mutex<State>,
    released: Condvar,
    lock_wait: Duration,
    fail_entry_insert: AtomicBool,
}

impl MemoryStore {
    pub fn new(lock_wait: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            released: Condvar::new(),
            lock_wait,
            fail_entry_insert: AtomicBool::new(false),
        }
    }

    // the next insert_entry fails after the balance write went through
    pub fn fail_next_entry_insert(&self) {
        self.fail_entry_insert.store(true, Ordering::SeqCst);
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.state().entries.clone()
    }

    // holds the row lock of the account until the returned guard is dropped
    pub fn hold_lock(&self, account: &AccountKey) -> MemoryTx<'_> {
        let mut tx = MemoryTx::new(self);
        tx.lock_account(account).expect("lock is free");
        tx
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("memory store poisoned")
    }
}

impl LedgerStore for MemoryStore {
    fn transaction(&self, body: &mut TxBody<'_>) -> Result<Outcome, LedgerError> {
        let mut tx = MemoryTx::new(self);
        let outcome = body(&mut tx)?;
        tx.commit();
        Ok(outcome)
    }

    fn read_balance(&self, account: &AccountKey) -> Result<Option<BigDecimal>, LedgerError> {
        Ok(self.state().balances.get(account).cloned())
    }

    fn open_account(&self, account: &AccountKey) -> Result<bool, LedgerError> {
        let mut state = self.state();
        if state.balances.contains_key(account) {
            return Ok(false);
        }
        state.balances.insert(account.clone(), BigDecimal::from(0));
        Ok(true)
    }
}

pub struct MemoryTx<'a> {
    store: &'a MemoryStore,
    held: Vec<AccountKey>,
    balances: HashMap<AccountKey, BigDecimal>,
    entries: Vec<LedgerEntry>,
}

impl<'a> MemoryTx<'a> {
    fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            held: Vec::new(),
            balances: HashMap::new(),
            entries: Vec::new(),
        }
    }

    fn commit(&mut self) {
        let mut state = self.store.state();
        state.balances.extend(self.balances.drain());
        state.entries.append(&mut self.entries);
        for account in self.held.drain(..) {
            state.locked.remove(&account);
        }
        drop(state);
        self.store.released.notify_all();
    }

    fn find<'e>(
        &'e self,
        committed: &'e [LedgerEntry],
        predicate: impl Fn(&LedgerEntry) -> bool,
    ) -> Option<LedgerEntry> {
        self.entries
            .iter()
            .chain(committed.iter())
            .find(|e| predicate(*e))
            .cloned()
    }
}

// rollback: pending writes are dropped, locks released
impl Drop for MemoryTx<'_> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }
        let mut state = self.store.state();
        for account in self.held.drain(..) {
            state.locked.remove(&account);
        }
        drop(state);
        self.store.released.notify_all();
    }
}

impl LedgerTx for MemoryTx<'_> {
    fn lock_account(&mut self, account: &AccountKey) -> Result<Option<BigDecimal>, LedgerError> {
        let store = self.store;
        let mut state = store.state();
        let Some(committed) = state.balances.get(account).cloned() else {
            return Ok(None);
        };
        if !self.held.contains(account) {
            let deadline = Instant::now() + store.lock_wait;
            while state.locked.contains(account) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(LedgerError::LockContention);
                }
                state = store
                    .released
                    .wait_timeout(state, remaining)
                    .expect("memory store poisoned")
                    .0;
            }
            state.locked.insert(account.clone());
            self.held.push(account.clone());
        }
        // the committed value may have moved while we waited
        let current = state.balances.get(account).cloned().unwrap_or(committed);
        Ok(Some(self.balances.get(account).cloned().unwrap_or(current)))
    }

    fn find_entry(&mut self, external_id: &str, kind: EntryKind) -> Result<Option<LedgerEntry>, LedgerError> {
        let state = self.store.state();
        Ok(self.find(&state.entries, |e| {
            e.external_id == external_id && e.kind == kind.as_str()
        }))
    }

    fn find_reversal(
        &mut self,
        account: &AccountKey,
        reversed_external_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        let state = self.store.state();
        Ok(self.find(&state.entries, |e| {
            e.belongs_to(account)
                && (e.kind == EntryKind::Rollback.as_str() || e.kind == EntryKind::Cancel.as_str())
                && e.reversed_external_id.as_deref() == Some(reversed_external_id)
        }))
    }

    fn write_balance(&mut self, account: &AccountKey, value: &BigDecimal) -> Result<(), LedgerError> {
        assert!(self.held.contains(account), "balance written without holding the row lock");
        self.balances.insert(account.clone(), value.clone());
        Ok(())
    }

    fn insert_entry(&mut self, entry: &NewLedgerEntry) -> Result<(), LedgerError> {
        if self.store.fail_entry_insert.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Storage(diesel::result::Error::BrokenTransactionManager));
        }
        let state = self.store.state();
        let duplicate = self.find(&state.entries, |e| e.external_id == entry.external_id && e.kind == entry.kind);
        drop(state);
        if duplicate.is_some() {
            return Err(LedgerError::Conflict {
                external_id: entry.external_id.clone(),
            });
        }
        self.entries.push(entry.clone().into());
        Ok(())
    }
}
