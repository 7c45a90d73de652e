// storefront/src/state.rs
use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::blob_store::BlobStore;
use crate::services::mailer::Mailer;
use crate::services::payment::PaymentGateway;
use shopflow::Workflows;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub db_pool: PgPool,
  pub workflows: Arc<Workflows<AppError>>,
  pub config: Arc<AppConfig>,
  pub payments: Arc<dyn PaymentGateway>,
  pub blobs: Arc<dyn BlobStore>,
  pub mailer: Mailer,
}

#[cfg(test)]
impl AppState {
  /// State over a lazily connecting pool; nothing touches the database until a query runs.
  pub fn for_tests(blob_root: &std::path::Path) -> Self {
    let config = AppConfig::for_tests();
    let db_pool = sqlx::postgres::PgPoolOptions::new()
      .max_connections(1)
      .acquire_timeout(std::time::Duration::from_millis(200))
      .connect_lazy(&config.database_url)
      .expect("lazy pool from a well-formed URL");
    Self::with_pool(db_pool, blob_root)
  }

  /// Test state over a live pool, mock gateway and registered pipelines.
  pub fn with_pool(db_pool: PgPool, blob_root: &std::path::Path) -> Self {
    use crate::services::blob_store::LocalBlobStore;
    use crate::services::payment::MockGateway;

    let config = AppConfig::for_tests();
    let workflows = Arc::new(Workflows::<AppError>::new());
    let state = AppState {
      db_pool,
      workflows: workflows.clone(),
      payments: Arc::new(MockGateway::new()),
      blobs: Arc::new(LocalBlobStore::new(blob_root, config.blob_public_base_url.clone())),
      mailer: Mailer::new(config.mail_sender.clone()),
      config: Arc::new(config),
    };
    crate::pipelines::register_all_pipelines(&workflows);
    state
  }
}
