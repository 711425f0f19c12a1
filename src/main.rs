use std::sync::Arc;

use actix_request_identifier::{IdReuse, RequestIdentifier};
use actix_web::web::Data;
use anyhow::Context;
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use crate::accounts::DisabledOwners;
use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::Settings;
use crate::currency::CurrencyRegistry;
use crate::database::connect::{create_db_connection_pool, run_migrations};
use crate::database::idgen;
use crate::database::postgres::PgLedgerStore;
use crate::ledger::Ledger;
use crate::router::CallbackRouter;

mod accounts;
mod audit;
mod callback;
mod config;
mod currency;
mod database;
mod ledger;
mod responses;
mod router;
mod routes;
mod schema;
mod signature;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // setup tracing and use bunyan formatter
    let formatting_layer = BunyanFormattingLayer::new("wallet-ledger".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(filter_fn(|metadata| *metadata.level() <= tracing::Level::INFO))
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber).context("failed to install tracing subscriber")?;

    let settings = Settings::from_env()?;
    if let Some(instance_id) = settings.instance_id {
        idgen::init(instance_id);
    }

    let db = create_db_connection_pool(&settings.database_url, settings.pool_size)?;
    run_migrations(&db)?;

    let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
    let ledger = Arc::new(Ledger::new(
        Arc::new(PgLedgerStore::new(db, settings.lock_timeout)),
        Arc::new(DisabledOwners::new(settings.disabled_owners.clone())),
        audit.clone(),
        settings.retry,
    ));
    let currencies = CurrencyRegistry::new(settings.currencies.clone());
    let router = Arc::new(CallbackRouter::new(
        ledger.clone(),
        currencies.clone(),
        settings.provider_secret.clone(),
        audit,
    ));

    let server = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .wrap(RequestIdentifier::with_uuid().use_incoming_id(IdReuse::UseIncoming))
            .wrap(TracingLogger::default())
            .app_data(Data::from(router.clone()))
            .app_data(Data::from(ledger.clone()))
            .app_data(Data::new(currencies.clone()))
            .configure(routes::configure)
    });

    tracing::info!(bind_address = settings.bind_address.as_str(), "starting wallet ledger");
    server
        .bind(&settings.bind_address)
        .with_context(|| format!("failed to bind {}", settings.bind_address))?
        .run()
        .await
        .context("server error")
}
