use bigdecimal::BigDecimal;
use tracing::info;

use crate::ledger::AccountKey;

#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    SignatureRejected { reason: &'static str },
    AccountDisabled { account: AccountKey, external_id: String },
    Reversed {
        account: AccountKey,
        external_id: String,
        reversed_external_id: String,
    },
    Deposited {
        account: AccountKey,
        idempotency_key: String,
        amount: BigDecimal,
    },
}

/// Fire-and-forget sink for security relevant and administrative events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        match event {
            AuditEvent::SignatureRejected { reason } => {
                info!(target: "audit", reason, "callback signature rejected")
            }
            AuditEvent::AccountDisabled { account, external_id } => info!(
                target: "audit",
                owner_id = account.owner_id.as_str(),
                currency = account.currency.as_str(),
                external_id = external_id.as_str(),
                "mutation refused for disabled account"
            ),
            AuditEvent::Reversed {
                account,
                external_id,
                reversed_external_id,
            } => info!(
                target: "audit",
                owner_id = account.owner_id.as_str(),
                currency = account.currency.as_str(),
                external_id = external_id.as_str(),
                reversed_external_id = reversed_external_id.as_str(),
                "bet cancelled"
            ),
            AuditEvent::Deposited {
                account,
                idempotency_key,
                amount,
            } => info!(
                target: "audit",
                owner_id = account.owner_id.as_str(),
                currency = account.currency.as_str(),
                idempotency_key = idempotency_key.as_str(),
                amount = %amount,
                "deposit"
            ),
        }
    }
}
