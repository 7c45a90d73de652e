// storefront/src/pipelines/fulfilment_pipeline.rs

use crate::errors::AppError;
use crate::models::user::{User, USER_COLUMNS};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::FulfilOrderCtxData;
use crate::services::orders::{self, Settlement};
use crate::state::AppState;
use shopflow::{ContextData, Pipeline, PipelineControl, SkipCondition, Workflows};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub fn build_fulfilment_pipeline() -> Pipeline<FulfilOrderCtxData, AppError> {
  // Only a settlement that happened in this run mails the buyer.
  let already_processed: SkipCondition<FulfilOrderCtxData> =
    Arc::new(|ctx: ContextData<FulfilOrderCtxData>| ctx.read().settlement != Some(Settlement::Settled));

  let mut p = Pipeline::<FulfilOrderCtxData, AppError>::new(&[
    ("settle_order", false, None),
    ("send_order_confirmation", true, Some(already_processed)),
  ]);

  p.on_root("settle_order", |ctx_data: ContextData<FulfilOrderCtxData>| {
    Box::pin(async move {
      let (order_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.order_id, guard.app_state.db_pool.clone())
      };
      let settlement = orders::settle_paid_order(&db_pool, order_id).await?;
      ctx_data.write().settlement = Some(settlement);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("send_order_confirmation", |ctx_data: ContextData<FulfilOrderCtxData>| {
    Box::pin(async move {
      let (order_id, app_state) = {
        let guard = ctx_data.read();
        (guard.order_id, guard.app_state.clone())
      };

      let order = orders::find_by_id(&app_state.db_pool, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
      let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
      let buyer = sqlx::query_as::<_, User>(&sql)
        .bind(order.user_id)
        .fetch_one(&app_state.db_pool)
        .await?;

      let (subject, html) =
        common_steps::order_confirmation_message(&buyer.name, order.id, order.total_cents, &order.currency);
      let sent = common_steps::notify(&app_state, &buyer.email, subject, html).await;
      ctx_data.write().confirmation_sent = sent;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}

pub fn register_fulfilment_pipeline(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_fulfilment_pipeline());
  info!("Fulfilment pipeline registered.");
}

/// Settles a paid order. A second call for the same order changes nothing.
#[instrument(name = "fulfilment::fulfil", skip(app_state))]
pub async fn fulfil(app_state: &AppState, order_id: Uuid) -> Result<Settlement, AppError> {
  let ctx = ContextData::new(FulfilOrderCtxData {
    app_state: app_state.clone(),
    order_id,
    settlement: None,
    confirmation_sent: false,
  });
  app_state.workflows.run(ctx.clone()).await?;

  let guard = ctx.read();
  if !guard.confirmation_sent && guard.settlement == Some(Settlement::Settled) {
    warn!("Order settled without a confirmation mail.");
  }
  guard
    .settlement
    .ok_or_else(|| AppError::Internal("Fulfilment finished without a settlement.".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confirmation_is_optional_and_conditional() {
    let p = build_fulfilment_pipeline();
    assert_eq!(p.step_names(), vec!["settle_order", "send_order_confirmation"]);
  }
}
