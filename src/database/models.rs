use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use diesel::prelude::*;

#[derive(Queryable, Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: i64,
    pub owner_id: String,
    pub currency: String,
    pub kind: String,
    pub amount: BigDecimal,
    pub status: String,
    pub external_id: String,
    pub reversed_external_id: Option<String>,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub metadata: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::ledger_entry)]
pub struct NewLedgerEntry {
    pub id: i64,
    pub owner_id: String,
    pub currency: String,
    pub kind: String,
    pub amount: BigDecimal,
    pub status: String,
    pub external_id: String,
    pub reversed_external_id: Option<String>,
    pub balance_before: BigDecimal,
    pub balance_after: BigDecimal,
    pub metadata: Option<serde_json::Value>,
    pub created_at: NaiveDateTime,
}

impl From<NewLedgerEntry> for LedgerEntry {
    fn from(entry: NewLedgerEntry) -> Self {
        Self {
            id: entry.id,
            owner_id: entry.owner_id,
            currency: entry.currency,
            kind: entry.kind,
            amount: entry.amount,
            status: entry.status,
            external_id: entry.external_id,
            reversed_external_id: entry.reversed_external_id,
            balance_before: entry.balance_before,
            balance_after: entry.balance_after,
            metadata: entry.metadata,
            created_at: entry.created_at,
        }
    }
}
