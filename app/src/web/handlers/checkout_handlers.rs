// storefront/src/web/handlers/checkout_handlers.rs

use actix_web::{http::header, web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shopflow::ContextData;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::pipelines::contexts::CheckoutCtxData;
use crate::reconcile::{self, LookupStatus, PollOutcome, PollPolicy};
use crate::services::order_status::{self, OrderStatusLookup};
use crate::services::orders;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use crate::web::handlers::ensure_completed;

#[instrument(name = "handler::start_checkout", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn start_checkout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(CheckoutCtxData::new(app_state.get_ref().clone(), auth_user.user_id));

  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    error!(error = %e, "Checkout failed.");
    e
  })?;
  ensure_completed(result)?;

  let guard = ctx.read();
  let (order_id, intent, totals) = match (guard.order_id, guard.payment_intent.as_ref(), guard.totals) {
    (Some(order_id), Some(intent), Some(totals)) => (order_id, intent, totals),
    _ => return Err(AppError::Internal("Checkout completed without an order or intent.".to_string())),
  };
  info!(%order_id, intent_id = %intent.id, amount = intent.amount_cents, "Checkout started.");

  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "order_id": order_id,
    "payment_intent_id": intent.id,
    "client_secret": intent.client_secret,
    "amount_cents": intent.amount_cents,
    "currency": intent.currency,
    "totals": totals,
    "return_url": app_state.config.payment_return_url(),
  })))
}

#[derive(Serialize)]
struct StatusBody {
  success: bool,
  #[serde(flatten)]
  lookup: LookupStatus,
}

/// Single status lookup; the client polls this itself when it does not use the
/// return endpoint.
#[instrument(name = "handler::checkout_status", skip(app_state, auth_user, path), fields(user_id = %auth_user.user_id))]
pub async fn checkout_status_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let intent_id = path.into_inner();
  if let Some(order) = orders::find_by_intent(&app_state.db_pool, &intent_id).await? {
    if order.user_id != auth_user.user_id && !auth_user.role.is_staff() {
      warn!(%intent_id, "Status lookup for someone else's order.");
      return Err(AppError::NotFound(format!("Payment {} not found.", intent_id)));
    }
  }

  let lookup = order_status::lookup_status(&app_state, &intent_id).await?;
  Ok(HttpResponse::Ok().json(StatusBody { success: true, lookup }))
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
  pub payment_intent: String,
}

/// Where the hosted payment page sends the shopper. Polls the status lookup
/// and answers with exactly one redirect.
#[instrument(name = "handler::checkout_return", skip(app_state, query), fields(intent_id = %query.payment_intent))]
pub async fn checkout_return_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ReturnQuery>,
) -> Result<HttpResponse, AppError> {
  let policy = PollPolicy {
    interval: app_state.config.reconcile_interval,
    max_attempts: app_state.config.reconcile_max_attempts,
  };
  let lookup = OrderStatusLookup::new(app_state.get_ref().clone());
  let outcome = reconcile::poll_until_settled(&lookup, &query.payment_intent, &policy).await;
  let location = redirect_target(&app_state.config.app_base_url, &outcome);

  info!(?outcome, %location, "Checkout return resolved.");
  Ok(
    HttpResponse::SeeOther()
      .insert_header((header::LOCATION, location))
      .finish(),
  )
}

pub fn redirect_target(base_url: &str, outcome: &PollOutcome) -> String {
  match outcome {
    PollOutcome::Redirect { order_id, .. } => format!("{}/orders/{}/confirmation", base_url, order_id),
    PollOutcome::Failed { message, .. } => {
      let reason = FailureReason::for_message(message);
      format!("{}/checkout/failed?reason={}", base_url, reason.code())
    }
  }
}

#[instrument(name = "handler::mock_confirm", skip(app_state, auth_user, path), fields(user_id = %auth_user.user_id))]
pub async fn mock_confirm_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let intent_id = path.into_inner();
  let mock = app_state
    .payments
    .as_mock()
    .ok_or_else(|| AppError::NotFound("Mock payments are not enabled.".to_string()))?;

  let order = orders::find_by_intent(&app_state.db_pool, &intent_id)
    .await?
    .filter(|o| o.user_id == auth_user.user_id)
    .ok_or_else(|| AppError::NotFound(format!("Payment {} not found.", intent_id)))?;

  let intent = mock.confirm(&intent_id)?;
  info!(order_id = %order.id, status = ?intent.status, "Mock payment confirmed.");
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "payment_intent": intent,
    "redirect_url": format!("{}?payment_intent={}", app_state.config.payment_return_url(), intent_id),
  })))
}

/// Why the shopper landed on the failed page. Only the code travels in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
  Declined,
  Timeout,
}

impl FailureReason {
  fn for_message(message: &str) -> Self {
    if message == reconcile::EXHAUSTED_MESSAGE {
      FailureReason::Timeout
    } else {
      FailureReason::Declined
    }
  }

  pub fn code(&self) -> &'static str {
    match self {
      FailureReason::Declined => "declined",
      FailureReason::Timeout => "timeout",
    }
  }

  /// Unknown or missing codes read as a decline.
  pub fn from_code(code: Option<&str>) -> Self {
    match code {
      Some("timeout") => FailureReason::Timeout,
      _ => FailureReason::Declined,
    }
  }

  pub fn message(&self) -> &'static str {
    match self {
      FailureReason::Declined => "Your payment was not completed. Please try again or use another payment method.",
      FailureReason::Timeout => reconcile::EXHAUSTED_MESSAGE,
    }
  }
}

fn html_page(title: &str, body: &str) -> HttpResponse {
  HttpResponse::Ok()
    .content_type("text/html; charset=utf-8")
    .body(format!(
      "<!doctype html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body><h1>{}</h1>{}</body></html>",
      title, title, body
    ))
}

pub async fn order_confirmation_page(path: web::Path<Uuid>) -> HttpResponse {
  let order_id = path.into_inner();
  html_page(
    "Thank you for your order",
    &format!("<p>Order #{} is confirmed. A receipt is on its way to your inbox.</p>", order_id),
  )
}

#[derive(Debug, Deserialize)]
pub struct FailedQuery {
  pub reason: Option<String>,
}

pub async fn checkout_failed_page(query: web::Query<FailedQuery>) -> HttpResponse {
  let reason = FailureReason::from_code(query.reason.as_deref());
  html_page("Payment not completed", &format!("<p>{}</p>", reason.message()))
}
