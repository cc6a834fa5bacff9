// payrecon_server/src/main.rs

use anyhow::Context;
use actix_web::{web as actix_data, App, HttpServer};
use payrecon::{ClickGateway, PaymentLedger, PgStore, Reconciler, Store};
use payrecon_server::config::AppConfig;
use payrecon_server::state::AppState;
use payrecon_server::web::configure_app_routes;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env()) // RUST_LOG override
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting payment reconciliation server...");

  let app_config = AppConfig::from_env().context("Failed to load application configuration")?;

  let db_pool = PgPoolOptions::new()
    .max_connections(app_config.database_max_connections)
    .connect(&app_config.database_url)
    .await
    .context("Failed to connect to the database")?;
  tracing::info!("Successfully connected to the database.");

  let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool));
  let ledger = PaymentLedger::probe(store.clone()).await;
  let gateway = Arc::new(ClickGateway::new(app_config.gateway_config()).context("Invalid gateway configuration")?);
  let reconciler = Reconciler::new(store, ledger, gateway, app_config.reconcile_config());

  let app_state = AppState { reconciler };

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  Ok(())
}
