// storefront/src/pipelines/webhook_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::contexts::{PaymentEvent, WebhookAction, WebhookCtxData};
use crate::pipelines::fulfilment_pipeline;
use crate::services::orders::{self, Settlement};
use crate::services::webhook_signature;
use chrono::Utc;
use shopflow::{ContextData, Pipeline, PipelineControl, SkipCondition, Workflows};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Action for a provider event type. Unknown types are acknowledged and dropped.
pub fn action_for(event_type: &str) -> WebhookAction {
  match event_type {
    "payment_intent.succeeded" => WebhookAction::Fulfil,
    "payment_intent.payment_failed" | "payment_intent.canceled" => WebhookAction::MarkFailed,
    _ => WebhookAction::Ignore,
  }
}

pub fn build_webhook_pipeline() -> Pipeline<WebhookCtxData, AppError> {
  let nothing_to_apply: SkipCondition<WebhookCtxData> = Arc::new(|ctx: ContextData<WebhookCtxData>| {
    let guard = ctx.read();
    guard.affected_order_id.is_none() || matches!(guard.action, None | Some(WebhookAction::Ignore))
  });

  let mut p = Pipeline::<WebhookCtxData, AppError>::new(&[
    ("verify_webhook_signature", false, None),
    ("parse_webhook_payload", false, None),
    ("route_webhook_event", false, None),
    ("apply_webhook_action", false, Some(nothing_to_apply)),
    ("acknowledge_webhook_receipt", false, None),
  ]);

  // Step 1: the source must be the configured provider and the body must be signed.
  p.on_root("verify_webhook_signature", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      let expected_source = guard.app_state.payments.name();
      if guard.source != expected_source {
        warn!(source = %guard.source, "Webhook from an unknown source.");
        return Err(AppError::NotFound(format!("No webhook endpoint for '{}'.", guard.source)));
      }
      let header = guard.signature_header.as_deref().ok_or_else(|| {
        warn!(source = %guard.source, "Webhook without a signature.");
        AppError::Auth("Webhook signature missing.".to_string())
      })?;
      webhook_signature::verify(
        &guard.app_state.config.payment_webhook_secret,
        header,
        &guard.raw_payload,
        Utc::now().timestamp(),
      )?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 2
  p.on_root("parse_webhook_payload", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let raw = ctx_data.read().raw_payload.clone();
      let event = serde_json::from_slice::<PaymentEvent>(&raw).map_err(|e| {
        error!(error = %e, size = raw.len(), "Unparseable webhook payload.");
        AppError::Validation(format!("Invalid webhook payload: {}", e))
      })?;
      info!(event_id = %event.id, event_type = %event.event_type, "Webhook event received.");
      ctx_data.write().event = Some(event);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 3: decide the action and find the order it applies to.
  p.on_root("route_webhook_event", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (event, db_pool) = {
        let guard = ctx_data.read();
        let event = guard
          .event
          .clone()
          .ok_or_else(|| AppError::Internal("Event missing before routing.".to_string()))?;
        (event, guard.app_state.db_pool.clone())
      };

      let action = action_for(&event.event_type);
      if action == WebhookAction::Ignore {
        ctx_data.write().action = Some(action);
        return Ok(PipelineControl::Continue);
      }

      let intent_id = event.data.object.id.as_str();
      let from_metadata = event
        .data
        .object
        .metadata
        .get("order_id")
        .and_then(|raw| Uuid::parse_str(raw).ok());
      let order_id = match from_metadata {
        Some(id) => Some(id),
        None => orders::find_by_intent(&db_pool, intent_id).await?.map(|o| o.id),
      };
      if order_id.is_none() {
        warn!(%intent_id, "Webhook event for an unknown order.");
      }

      let mut guard = ctx_data.write();
      guard.action = Some(action);
      guard.affected_order_id = order_id;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 4
  p.on_root("apply_webhook_action", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let (action, order_id, app_state) = {
        let guard = ctx_data.read();
        match (guard.action, guard.affected_order_id) {
          (Some(action), Some(order_id)) => (action, order_id, guard.app_state.clone()),
          _ => return Err(AppError::Internal("Webhook action applied without an order.".to_string())),
        }
      };

      match action {
        WebhookAction::Fulfil => {
          match fulfilment_pipeline::fulfil(&app_state, order_id).await? {
            Settlement::Settled => info!(%order_id, "Payment webhook fulfilled order."),
            Settlement::AlreadyProcessed(status) if status.is_settled() => {
              info!(%order_id, %status, "Duplicate payment webhook; order already settled.")
            }
            Settlement::AlreadyProcessed(status) => {
              error!(%order_id, %status, "Payment succeeded but the order could not be settled.")
            }
          }
        }
        WebhookAction::MarkFailed => {
          let changed = orders::mark_failed(&app_state.db_pool, order_id).await?;
          info!(%order_id, changed, "Payment webhook marked order failed.");
        }
        WebhookAction::Ignore => {}
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 5
  p.on_root("acknowledge_webhook_receipt", |ctx_data: ContextData<WebhookCtxData>| {
    Box::pin(async move {
      let guard = ctx_data.read();
      info!(
        source = %guard.source,
        action = ?guard.action,
        order_id = ?guard.affected_order_id,
        "Webhook acknowledged."
      );
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}

pub fn register_webhook_pipeline(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_webhook_pipeline());
  info!("Payment webhook pipeline registered.");
}
