use std::str::FromStr;

use bigdecimal::{BigDecimal, Signed};
use serde::Deserialize;

use crate::currency::CurrencyRegistry;
use crate::ledger::{is_storable_amount, AccountKey, EntryKind, Mutation};

/// Callback body as sent by the game provider. Every field is optional on the
/// wire so that a missing one is reported by name instead of as a parse error.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackRequest {
    #[serde(default)]
    pub operation: Option<String>,
    #[serde(default)]
    pub external_transaction_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub reversed_transaction_id: Option<String>,
    #[serde(default)]
    pub round_id: Option<String>,
    #[serde(default)]
    pub game_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callback {
    GetBalance(AccountKey),
    Bet(Movement),
    Win(Movement),
    Rollback(Movement),
    Cancel(Movement),
}

/// The fields every balance-moving callback carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub account: AccountKey,
    pub external_id: String,
    pub amount: BigDecimal,
    pub reverses: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl Movement {
    pub fn into_mutation(self, kind: EntryKind) -> Mutation {
        Mutation {
            kind,
            account: self.account,
            external_id: self.external_id,
            amount: self.amount,
            reverses: self.reverses,
            metadata: self.metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("malformed payload: {0}")]
    Malformed(String),
    #[error("missing or invalid field `{0}`")]
    BadParameter(&'static str),
    #[error("unsupported operation `{0}`")]
    UnsupportedOperation(String),
}

enum Operation {
    GetBalance,
    Bet,
    Win,
    Rollback,
    Cancel,
}

impl CallbackRequest {
    pub fn parse(payload: &[u8]) -> Result<Self, Rejection> {
        serde_json::from_slice(payload).map_err(|e| Rejection::Malformed(e.to_string()))
    }

    pub fn validate(self, currencies: &CurrencyRegistry) -> Result<Callback, Rejection> {
        let operation = match self.operation.as_deref() {
            Some("getBalance") | Some("balance") => Operation::GetBalance,
            Some("bet") => Operation::Bet,
            Some("result") | Some("win") => Operation::Win,
            Some("rollback") => Operation::Rollback,
            Some("cancel") => Operation::Cancel,
            Some(other) => return Err(Rejection::UnsupportedOperation(other.to_string())),
            None => return Err(Rejection::BadParameter("operation")),
        };

        let owner_id = non_empty(self.owner_id).ok_or(Rejection::BadParameter("owner_id"))?;
        let currency = non_empty(self.currency)
            .filter(|c| currencies.is_currency_valid(c))
            .ok_or(Rejection::BadParameter("currency"))?;
        let account = AccountKey::new(owner_id, currency);

        let into_callback: fn(Movement) -> Callback = match operation {
            Operation::GetBalance => return Ok(Callback::GetBalance(account)),
            Operation::Bet => Callback::Bet,
            Operation::Win => Callback::Win,
            Operation::Rollback => Callback::Rollback,
            Operation::Cancel => Callback::Cancel,
        };

        let external_id =
            non_empty(self.external_transaction_id).ok_or(Rejection::BadParameter("external_transaction_id"))?;
        let amount = self
            .amount
            .as_ref()
            .and_then(parse_amount)
            .ok_or(Rejection::BadParameter("amount"))?;
        Ok(into_callback(Movement {
            account,
            external_id,
            amount,
            reverses: non_empty(self.reversed_transaction_id),
            metadata: round_metadata(self.round_id, self.game_id),
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// decimal amounts come as json numbers or strings, both parsed without floats.
// amounts the ledger cannot store exactly are refused here, not rounded later
fn parse_amount(value: &serde_json::Value) -> Option<BigDecimal> {
    let amount = match value {
        serde_json::Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok()?,
        serde_json::Value::String(s) => BigDecimal::from_str(s.trim()).ok()?,
        _ => return None,
    };
    if amount.is_negative() || !is_storable_amount(&amount) {
        return None;
    }
    Some(amount)
}

fn round_metadata(round_id: Option<String>, game_id: Option<String>) -> Option<serde_json::Value> {
    let mut map = serde_json::Map::new();
    if let Some(round_id) = non_empty(round_id) {
        map.insert("round_id".to_string(), round_id.into());
    }
    if let Some(game_id) = non_empty(game_id) {
        map.insert("game_id".to_string(), game_id.into());
    }
    if map.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(map))
    }
}
