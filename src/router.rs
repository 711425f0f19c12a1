use std::sync::Arc;

use tracing::warn;

use crate::audit::{AuditEvent, AuditSink};
use crate::callback::{Callback, CallbackRequest, Movement};
use crate::currency::CurrencyRegistry;
use crate::ledger::{EntryKind, Ledger};
use crate::responses::{ErrorCode, ResponseEnvelope};
use crate::signature;

/// Entry point for provider callbacks: authenticates, validates and
/// dispatches to the ledger. Blocking, run it off the async executor.
pub struct CallbackRouter {
    ledger: Arc<Ledger>,
    currencies: CurrencyRegistry,
    secret: Vec<u8>,
    audit: Arc<dyn AuditSink>,
}

impl CallbackRouter {
    pub fn new(ledger: Arc<Ledger>, currencies: CurrencyRegistry, secret: Vec<u8>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ledger,
            currencies,
            secret,
            audit,
        }
    }

    pub fn handle(&self, payload: &[u8], signature: Option<&str>) -> ResponseEnvelope {
        let verified = match signature {
            Some(signature) => signature::verify(payload, signature, &self.secret),
            None => false,
        };
        if !verified {
            let reason = if signature.is_some() { "mismatch" } else { "missing" };
            warn!(reason, "callback signature rejected");
            self.audit.record(AuditEvent::SignatureRejected { reason });
            return ResponseEnvelope::rejected(ErrorCode::InvalidSignature);
        }

        // no transaction is opened for requests that do not validate
        let callback = match CallbackRequest::parse(payload).and_then(|req| req.validate(&self.currencies)) {
            Ok(callback) => callback,
            Err(rejection) => {
                warn!("callback rejected: {rejection}");
                return ResponseEnvelope::from_rejection(&rejection);
            }
        };
        self.dispatch(callback)
    }

    pub fn dispatch(&self, callback: Callback) -> ResponseEnvelope {
        match callback {
            Callback::GetBalance(account) => {
                ResponseEnvelope::from_inquiry(self.ledger.inquire(&account), &account.currency)
            }
            Callback::Bet(movement) => self.mutate(EntryKind::Bet, movement),
            Callback::Win(movement) => self.mutate(EntryKind::Win, movement),
            Callback::Rollback(movement) => self.mutate(EntryKind::Rollback, movement),
            Callback::Cancel(movement) => self.mutate(EntryKind::Cancel, movement),
        }
    }

    fn mutate(&self, kind: EntryKind, movement: Movement) -> ResponseEnvelope {
        let mutation = movement.into_mutation(kind);
        let result = self.ledger.apply(&mutation);
        ResponseEnvelope::from_outcome(result, &mutation.account.currency, &mutation.external_id)
    }
}
