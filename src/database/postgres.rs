use std::ops::DerefMut;
use std::time::Duration;

use bigdecimal::BigDecimal;
use diesel::{
    Connection, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl, RunQueryDsl,
};

use crate::database::connect::DbPool;
use crate::database::models::{LedgerEntry, NewLedgerEntry};
use crate::database::store::{LedgerStore, LedgerTx, TxBody};
use crate::ledger::{AccountKey, EntryKind, LedgerError, Outcome};

pub struct PgLedgerStore {
    pool: DbPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

impl LedgerStore for PgLedgerStore {
    fn transaction(&self, body: &mut TxBody<'_>) -> Result<Outcome, LedgerError> {
        let mut conn = self.pool.get()?;
        let lock_timeout = self.lock_timeout.as_millis();
        // wrap in transaction
        conn.deref_mut().transaction::<_, LedgerError, _>(|conn| {
            // give up on the row lock instead of queueing forever, the caller retries
            diesel::sql_query(format!("SET LOCAL lock_timeout = {lock_timeout}")).execute(conn)?;
            body(&mut PgLedgerTx { conn })
        })
    }

    fn read_balance(&self, account: &AccountKey) -> Result<Option<BigDecimal>, LedgerError> {
        let mut conn = self.pool.get()?;
        use crate::schema::balance::dsl::*;
        balance
            .filter(owner_id.eq(&account.owner_id))
            .filter(currency.eq(&account.currency))
            .select(current_value)
            .first::<BigDecimal>(conn.deref_mut())
            .optional()
            .map_err(Into::into)
    }

    // creates new balance record, on conflict does nothing
    fn open_account(&self, account: &AccountKey) -> Result<bool, LedgerError> {
        let mut conn = self.pool.get()?;
        use crate::schema::balance::dsl::*;
        diesel::insert_into(balance)
            .values((
                owner_id.eq(&account.owner_id),
                currency.eq(&account.currency),
                current_value.eq(BigDecimal::from(0)),
                updated_at.eq(chrono::Utc::now().naive_utc()),
            ))
            .on_conflict((owner_id, currency))
            .do_nothing()
            .execute(conn.deref_mut())
            .map(|res| res > 0)
            .map_err(Into::into)
    }
}

pub struct PgLedgerTx<'a> {
    conn: &'a mut PgConnection,
}

impl LedgerTx for PgLedgerTx<'_> {
    fn lock_account(&mut self, account: &AccountKey) -> Result<Option<BigDecimal>, LedgerError> {
        use crate::schema::balance::dsl::*;
        // load user balance and lock for update
        balance
            .filter(owner_id.eq(&account.owner_id))
            .filter(currency.eq(&account.currency))
            .select(current_value)
            .for_update()
            .first::<BigDecimal>(self.conn)
            .optional()
            .map_err(Into::into)
    }

    fn find_entry(&mut self, req_external_id: &str, req_kind: EntryKind) -> Result<Option<LedgerEntry>, LedgerError> {
        use crate::schema::ledger_entry::dsl::*;
        ledger_entry
            .filter(external_id.eq(req_external_id))
            .filter(kind.eq(req_kind.as_str()))
            .first::<LedgerEntry>(self.conn)
            .optional()
            .map_err(Into::into)
    }

    fn find_reversal(
        &mut self,
        account: &AccountKey,
        req_reversed_external_id: &str,
    ) -> Result<Option<LedgerEntry>, LedgerError> {
        use crate::schema::ledger_entry::dsl::*;
        ledger_entry
            .filter(owner_id.eq(&account.owner_id))
            .filter(currency.eq(&account.currency))
            .filter(kind.eq_any([EntryKind::Rollback.as_str(), EntryKind::Cancel.as_str()]))
            .filter(reversed_external_id.eq(req_reversed_external_id))
            .first::<LedgerEntry>(self.conn)
            .optional()
            .map_err(Into::into)
    }

    fn write_balance(&mut self, account: &AccountKey, value: &BigDecimal) -> Result<(), LedgerError> {
        use crate::schema::balance::dsl::*;
        diesel::update(
            balance
                .filter(owner_id.eq(&account.owner_id))
                .filter(currency.eq(&account.currency)),
        )
        .set((current_value.eq(value), updated_at.eq(chrono::Utc::now().naive_utc())))
        .execute(self.conn)?;
        Ok(())
    }

    fn insert_entry(&mut self, entry: &NewLedgerEntry) -> Result<(), LedgerError> {
        use crate::schema::ledger_entry::dsl::*;
        diesel::insert_into(ledger_entry).values(entry).execute(self.conn)?;
        Ok(())
    }
}
