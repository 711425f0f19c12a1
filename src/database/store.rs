use bigdecimal::BigDecimal;

use crate::database::models::{LedgerEntry, NewLedgerEntry};
use crate::ledger::{AccountKey, EntryKind, LedgerError, Outcome};

/// Operations available inside one open database transaction. The row lock
/// taken by `lock_account` is held until the transaction ends.
pub trait LedgerTx {
    // current balance of the locked row, None if the account does not exist
    fn lock_account(&mut self, account: &AccountKey) -> Result<Option<BigDecimal>, LedgerError>;

    fn find_entry(&mut self, external_id: &str, kind: EntryKind) -> Result<Option<LedgerEntry>, LedgerError>;

    // rollback or cancel entry of the account that reversed the given bet
    fn find_reversal(
        &mut self,
        account: &AccountKey,
        reversed_external_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError>;

    fn write_balance(&mut self, account: &AccountKey, value: &BigDecimal) -> Result<(), LedgerError>;

    fn insert_entry(&mut self, entry: &NewLedgerEntry) -> Result<(), LedgerError>;
}

pub type TxBody<'a> = dyn FnMut(&mut dyn LedgerTx) -> Result<Outcome, LedgerError> + 'a;

pub trait LedgerStore: Send + Sync {
    /// Runs `body` in a transaction: committed when it returns `Ok`, rolled
    /// back on `Err`.
    fn transaction(&self, body: &mut TxBody<'_>) -> Result<Outcome, LedgerError>;

    fn read_balance(&self, account: &AccountKey) -> Result<Option<BigDecimal>, LedgerError>;

    fn open_account(&self, account: &AccountKey) -> Result<bool, LedgerError>;
}
