// storefront/src/main.rs

mod config;
mod db;
mod errors;
mod models;
mod pipelines;
mod pricing;
mod reconcile;
mod services;
mod state;
#[cfg(test)]
mod test_support;
mod web;

use crate::config::{AppConfig, LogFormat};
use crate::errors::AppError;
use crate::services::blob_store::LocalBlobStore;
use crate::services::mailer::Mailer;
use crate::services::payment::gateway_from_config;
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use shopflow::Workflows;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const JSON_BODY_LIMIT: usize = 256 * 1024;

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

async fn build_state(config: Arc<AppConfig>) -> Result<AppState, AppError> {
  let db_pool = db::connect(&config).await?;
  db::run_migrations(&db_pool).await?;
  if config.seed_db {
    db::seed_demo_catalog(&db_pool).await?;
  }

  let payments = gateway_from_config(&config)?;
  tracing::info!(provider = payments.name(), "Payment gateway ready.");

  let workflows = Arc::new(Workflows::<AppError>::new());
  pipelines::register_all_pipelines(&workflows);

  Ok(AppState {
    db_pool,
    workflows,
    payments,
    blobs: Arc::new(LocalBlobStore::new(
      config.blob_root.clone(),
      config.blob_public_base_url.clone(),
    )),
    mailer: Mailer::new(config.mail_sender.clone()),
    config,
  })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  let config = Arc::new(AppConfig::from_env()?);
  init_tracing(config.log_format);
  tracing::info!(?config, "Starting storefront server...");

  let app_state = build_state(config.clone()).await.map_err(|e| {
    tracing::error!(error = %e, "Startup failed.");
    e
  })?;

  let server_address = format!("{}:{}", config.server_host, config.server_port);
  let max_upload_bytes = config.max_upload_bytes;
  tracing::info!(address = %server_address, "Binding HTTP server.");

  HttpServer::new(move || {
    App::new()
      .wrap(tracing_actix_web::TracingLogger::default())
      .app_data(actix_data::Data::new(app_state.clone()))
      .app_data(actix_data::PayloadConfig::new(max_upload_bytes))
      .app_data(web::routes::json_config(JSON_BODY_LIMIT))
      .app_data(web::routes::query_config())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  tracing::info!("Server stopped.");
  Ok(())
}
