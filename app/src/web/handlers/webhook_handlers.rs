// storefront/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use shopflow::ContextData;
use tracing::{error, info, instrument};

use crate::errors::AppError;
use crate::pipelines::contexts::WebhookCtxData;
use crate::state::AppState;
use crate::web::handlers::ensure_completed;

/// Header carrying `t=<unix>,v1=<hex>`.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[instrument(
    name = "handler::payment_webhook",
    skip(app_state, req, webhook_source, body),
    fields(webhook_source = %webhook_source.as_str(), size = body.len())
)]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  webhook_source: web::Path<String>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let source = webhook_source.into_inner();
  let signature_header = req
    .headers()
    .get(SIGNATURE_HEADER)
    .and_then(|h| h.to_str().ok())
    .map(String::from);

  let ctx = ContextData::new(WebhookCtxData {
    app_state: app_state.get_ref().clone(),
    source,
    raw_payload: body,
    signature_header,
    event: None,
    action: None,
    affected_order_id: None,
  });

  // An error answer makes the provider retry; fulfilment is idempotent.
  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    error!(error = %e, "Webhook processing failed.");
    e
  })?;
  ensure_completed(result)?;

  let guard = ctx.read();
  info!(action = ?guard.action, order_id = ?guard.affected_order_id, "Webhook processed.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "received": true,
    "event_id": guard.event.as_ref().map(|e| e.id.clone()),
  })))
}
