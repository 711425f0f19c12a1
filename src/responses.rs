use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use bigdecimal::BigDecimal;
use serde::{Serialize, Serializer};

use crate::callback::Rejection;
use crate::ledger::{Inquiry, LedgerError, Outcome};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidSignature,
    BadRequest,
    UnsupportedOperation,
    UnknownAccount,
    AccountDisabled,
    InsufficientFunds,
    TransactionConflict,
    RetryLater,
}

impl ErrorCode {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidSignature => StatusCode::UNAUTHORIZED,
            ErrorCode::BadRequest | ErrorCode::UnsupportedOperation => StatusCode::BAD_REQUEST,
            ErrorCode::RetryLater => StatusCode::SERVICE_UNAVAILABLE,
            // business rejections are regular answers of the wallet protocol
            ErrorCode::UnknownAccount
            | ErrorCode::AccountDisabled
            | ErrorCode::InsufficientFunds
            | ErrorCode::TransactionConflict => StatusCode::OK,
        }
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NotFound,
    Rejected,
}

/// Provider facing answer. `error` is null on success and on `not_found`,
/// balance, currency and transaction id are only present then.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    pub error: Option<ErrorCode>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "decimal_as_string")]
    pub balance: Option<BigDecimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl ResponseEnvelope {
    pub fn ok(balance: BigDecimal, currency: &str, transaction_id: Option<&str>) -> Self {
        Self {
            error: None,
            status: Status::Ok,
            balance: Some(balance),
            currency: Some(currency.to_string()),
            transaction_id: transaction_id.map(str::to_string),
        }
    }

    pub fn not_found(balance: BigDecimal, currency: &str, transaction_id: &str) -> Self {
        Self {
            status: Status::NotFound,
            ..Self::ok(balance, currency, Some(transaction_id))
        }
    }

    pub fn rejected(code: ErrorCode) -> Self {
        Self {
            error: Some(code),
            status: Status::Rejected,
            balance: None,
            currency: None,
            transaction_id: None,
        }
    }

    pub fn from_rejection(rejection: &Rejection) -> Self {
        match rejection {
            Rejection::UnsupportedOperation(_) => Self::rejected(ErrorCode::UnsupportedOperation),
            Rejection::Malformed(_) | Rejection::BadParameter(_) => Self::rejected(ErrorCode::BadRequest),
        }
    }

    // internal error details never reach the caller, they are logged by the ledger
    pub fn from_outcome(result: Result<Outcome, LedgerError>, currency: &str, transaction_id: &str) -> Self {
        match result {
            Ok(Outcome::Applied { balance, .. }) | Ok(Outcome::Duplicate { balance, .. }) => {
                Self::ok(balance, currency, Some(transaction_id))
            }
            Ok(Outcome::NotFound { balance }) => Self::not_found(balance, currency, transaction_id),
            Ok(Outcome::InsufficientFunds { .. }) => Self::rejected(ErrorCode::InsufficientFunds),
            Ok(Outcome::UnknownAccount) => Self::rejected(ErrorCode::UnknownAccount),
            Ok(Outcome::AccountDisabled) => Self::rejected(ErrorCode::AccountDisabled),
            Err(LedgerError::Conflict { .. }) => Self::rejected(ErrorCode::TransactionConflict),
            Err(_) => Self::rejected(ErrorCode::RetryLater),
        }
    }

    pub fn from_inquiry(result: Result<Inquiry, LedgerError>, currency: &str) -> Self {
        match result {
            Ok(Inquiry::Balance(balance)) => Self::ok(balance, currency, None),
            Ok(Inquiry::UnknownAccount) => Self::rejected(ErrorCode::UnknownAccount),
            Ok(Inquiry::AccountDisabled) => Self::rejected(ErrorCode::AccountDisabled),
            Err(_) => Self::rejected(ErrorCode::RetryLater),
        }
    }

    pub fn http_status(&self) -> StatusCode {
        self.error.map_or(StatusCode::OK, |code| code.http_status())
    }
}

fn decimal_as_string<S: Serializer>(value: &Option<BigDecimal>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_str(&value.to_string()),
        None => serializer.serialize_none(),
    }
}

pub fn envelope_http_response(envelope: &ResponseEnvelope) -> HttpResponse {
    HttpResponse::build(envelope.http_status()).json(envelope)
}
