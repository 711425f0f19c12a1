use std::str::FromStr;

use actix_request_identifier::RequestId;
use actix_web::{get, post, web, HttpRequest, HttpResponse};
use bigdecimal::{BigDecimal, Signed, Zero};
use bytes::Bytes;
use serde::Deserialize;
use tracing::{error, instrument};

use crate::currency::CurrencyRegistry;
use crate::ledger::{is_storable_amount, AccountKey, EntryKind, Ledger, Mutation};
use crate::responses::{envelope_http_response, ErrorCode, ResponseEnvelope};
use crate::router::CallbackRouter;

pub const SIGNATURE_HEADER: &str = "X-Signature";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(callback_handler)
        .service(balance_handler)
        .service(open_account_handler)
        .service(deposit_handler);
}

#[post("/callback")]
#[instrument(skip(router, req, payload), fields(request_id = request_id.as_str()))]
pub async fn callback_handler(
    router: web::Data<CallbackRouter>,
    request_id: RequestId,
    req: HttpRequest,
    payload: Bytes,
) -> HttpResponse {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // the blocking task runs to commit or rollback even if the provider hangs up
    let envelope = web::block(move || router.handle(&payload, signature.as_deref()))
        .await
        .unwrap_or_else(|e| {
            error!("{e}");
            ResponseEnvelope::rejected(ErrorCode::RetryLater)
        });
    envelope_http_response(&envelope)
}

#[get("/balance/{owner_id}/{currency}")]
#[instrument(skip(ledger, curr), fields(request_id = request_id.as_str()))]
pub async fn balance_handler(
    ledger: web::Data<Ledger>,
    curr: web::Data<CurrencyRegistry>,
    request_id: RequestId,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (owner_id, currency) = path.into_inner();
    if owner_id.trim().is_empty() || !curr.is_currency_valid(&currency) {
        return envelope_http_response(&ResponseEnvelope::rejected(ErrorCode::BadRequest));
    }
    let account = AccountKey::new(owner_id, currency);

    let envelope = web::block(move || {
        let result = ledger.inquire(&account);
        ResponseEnvelope::from_inquiry(result, &account.currency)
    })
    .await
    .unwrap_or_else(|e| {
        error!("{e}");
        ResponseEnvelope::rejected(ErrorCode::RetryLater)
    });
    envelope_http_response(&envelope)
}

#[derive(Debug, Deserialize)]
pub struct OpenAccountInput {
    pub owner_id: String,
    pub currency: String,
}

#[post("/accounts")]
#[instrument(skip(ledger, curr), fields(request_id = request_id.as_str()))]
pub async fn open_account_handler(
    ledger: web::Data<Ledger>,
    curr: web::Data<CurrencyRegistry>,
    request_id: RequestId,
    input: web::Json<OpenAccountInput>,
) -> HttpResponse {
    if input.owner_id.trim().is_empty() || !curr.is_currency_valid(&input.currency) {
        return envelope_http_response(&ResponseEnvelope::rejected(ErrorCode::BadRequest));
    }
    let account = AccountKey::new(input.owner_id.trim(), input.currency.as_str());

    let envelope = web::block(move || match ledger.open_account(&account) {
        Ok(_) => ResponseEnvelope::from_inquiry(ledger.inquire(&account), &account.currency),
        Err(e) => {
            error!("failed to open account: {e}");
            ResponseEnvelope::rejected(ErrorCode::RetryLater)
        }
    })
    .await
    .unwrap_or_else(|e| {
        error!("{e}");
        ResponseEnvelope::rejected(ErrorCode::RetryLater)
    });
    envelope_http_response(&envelope)
}

#[derive(Debug, Deserialize)]
pub struct DepositInput {
    pub idempotency_key: String,
    pub owner_id: String,
    pub currency: String,
    pub value: String,
    #[serde(default)]
    pub merchant_data: Option<serde_json::Value>,
}

#[post("/deposit")]
#[instrument(skip(ledger, curr), fields(request_id = request_id.as_str()))]
pub async fn deposit_handler(
    ledger: web::Data<Ledger>,
    curr: web::Data<CurrencyRegistry>,
    request_id: RequestId,
    input: web::Json<DepositInput>,
) -> HttpResponse {
    let bad_request = || envelope_http_response(&ResponseEnvelope::rejected(ErrorCode::BadRequest));

    if input.idempotency_key.trim().is_empty() {
        return bad_request();
    }
    if input.owner_id.trim().is_empty() {
        return bad_request();
    }
    if !curr.is_currency_valid(&input.currency) {
        return bad_request();
    }
    let value = match BigDecimal::from_str(input.value.trim()) {
        Ok(value) if !value.is_negative() && !value.is_zero() && is_storable_amount(&value) => value,
        _ => return bad_request(),
    };

    let input = input.into_inner();
    let mutation = Mutation {
        kind: EntryKind::Deposit,
        account: AccountKey::new(input.owner_id.trim(), input.currency),
        external_id: input.idempotency_key.trim().to_string(),
        amount: value,
        reverses: None,
        metadata: input.merchant_data,
    };
    let envelope = web::block(move || {
        let result = ledger.apply(&mutation);
        ResponseEnvelope::from_outcome(result, &mutation.account.currency, &mutation.external_id)
    })
    .await
    .unwrap_or_else(|e| {
        error!("{e}");
        ResponseEnvelope::rejected(ErrorCode::RetryLater)
    });
    envelope_http_response(&envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responses::Status;
    use crate::router::tests::{harness, Harness, SECRET};
    use crate::signature::sign;
    use actix_request_identifier::RequestIdentifier;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    macro_rules! service {
        ($h:expr) => {
            test::init_service(
                App::new()
                    .wrap(RequestIdentifier::with_uuid())
                    .app_data(web::Data::from($h.router.clone()))
                    .app_data(web::Data::from($h.ledger.clone()))
                    .app_data(web::Data::new(CurrencyRegistry::new(["EUR".to_string()])))
                    .configure(configure),
            )
            .await
        };
    }

    fn signed_callback(body: serde_json::Value) -> test::TestRequest {
        let payload = serde_json::to_vec(&body).unwrap();
        test::TestRequest::post()
            .uri("/callback")
            .insert_header(("content-type", "application/json"))
            .insert_header((SIGNATURE_HEADER, sign(&payload, SECRET)))
            .set_payload(payload)
    }

    #[actix_web::test]
    async fn test_callback_route() {
        let h: Harness = harness("10.00");
        let app = service!(h);

        let req = signed_callback(serde_json::json!({
            "operation": "bet",
            "owner_id": "player-1",
            "currency": "EUR",
            "external_transaction_id": "1",
            "amount": 4.00,
        }));
        let res = test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"], serde_json::Value::Null);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["transaction_id"], "1");
        assert_eq!(BigDecimal::from_str(body["balance"].as_str().unwrap()).unwrap(), BigDecimal::from(6));
    }

    #[actix_web::test]
    async fn test_callback_route_rejects_bad_signature() {
        let h = harness("10");
        let app = service!(h);

        let req = test::TestRequest::post()
            .uri("/callback")
            .insert_header((SIGNATURE_HEADER, "00ff"))
            .set_payload(r#"{"operation":"bet"}"#);
        let res = test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "INVALID_SIGNATURE");
    }

    #[actix_web::test]
    async fn test_deposit_and_balance_routes() {
        let h = harness("0");
        let app = service!(h);

        let req = test::TestRequest::post().uri("/deposit").set_json(serde_json::json!({
            "idempotency_key": "dep-1",
            "owner_id": "player-1",
            "currency": "EUR",
            "value": "25.50",
        }));
        let body: serde_json::Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(body["status"], "ok");

        // retried deposit is applied once
        let req = test::TestRequest::post().uri("/deposit").set_json(serde_json::json!({
            "idempotency_key": "dep-1",
            "owner_id": "player-1",
            "currency": "EUR",
            "value": "25.50",
        }));
        let body: serde_json::Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(body["status"], "ok");

        let req = test::TestRequest::get().uri("/balance/player-1/EUR");
        let body: serde_json::Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(
            BigDecimal::from_str(body["balance"].as_str().unwrap()).unwrap(),
            BigDecimal::from_str("25.50").unwrap()
        );

        for value in ["-1", "0.000000005", "1e23"] {
            let req = test::TestRequest::post().uri("/deposit").set_json(serde_json::json!({
                "idempotency_key": "dep-2",
                "owner_id": "player-1",
                "currency": "EUR",
                "value": value,
            }));
            let res = test::call_service(&app, req.to_request()).await;
            assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{value}");
        }

        let req = test::TestRequest::get().uri("/balance/player-1/EUR");
        let body: serde_json::Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(
            BigDecimal::from_str(body["balance"].as_str().unwrap()).unwrap(),
            BigDecimal::from_str("25.50").unwrap()
        );
    }

    #[actix_web::test]
    async fn test_balance_route_rejects_unsupported_currency() {
        let h = harness("1");
        let app = service!(h);

        let req = test::TestRequest::get().uri("/balance/player-1/GBP");
        let res = test::call_service(&app, req.to_request()).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "BAD_REQUEST");
    }

    #[actix_web::test]
    async fn test_open_account_route() {
        let h = harness("0");
        let app = service!(h);

        let req = test::TestRequest::post().uri("/accounts").set_json(serde_json::json!({
            "owner_id": "player-2",
            "currency": "EUR",
        }));
        let envelope: serde_json::Value = test::call_and_read_body_json(&app, req.to_request()).await;
        assert_eq!(envelope["status"], "ok");
        assert_eq!(envelope["balance"], "0");

        let req = test::TestRequest::get().uri("/balance/player-3/EUR");
        let res = test::call_service(&app, req.to_request()).await;
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["error"], "UNKNOWN_ACCOUNT");
        assert_ne!(body["status"], serde_json::to_value(Status::Ok).unwrap());
    }
}
