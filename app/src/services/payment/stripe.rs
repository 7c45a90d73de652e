// storefront/src/services/payment/stripe.rs

use super::{CreateIntent, IntentStatus, PaymentGateway, PaymentIntent};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;

/// Stripe payment intents over the REST API.
pub struct StripeGateway {
  http: Client,
  api_base: String,
  secret_key: String,
}

#[derive(Debug, Deserialize)]
struct IntentBody {
  id: String,
  amount: i64,
  currency: String,
  status: IntentStatus,
  client_secret: Option<String>,
  #[serde(default)]
  metadata: HashMap<String, String>,
  last_payment_error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
  message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
  error: ErrorDetail,
}

impl From<IntentBody> for PaymentIntent {
  fn from(body: IntentBody) -> Self {
    PaymentIntent {
      order_id: body.metadata.get("order_id").and_then(|s| Uuid::parse_str(s).ok()),
      last_error: body.last_payment_error.and_then(|e| e.message),
      id: body.id,
      amount_cents: body.amount,
      currency: body.currency,
      status: body.status,
      client_secret: body.client_secret,
    }
  }
}

impl StripeGateway {
  pub fn from_config(config: &AppConfig) -> Result<Self> {
    let secret_key = config
      .stripe_secret_key
      .clone()
      .ok_or_else(|| AppError::Config("STRIPE_SECRET_KEY is not set.".to_string()))?;
    let http = Client::builder()
      .timeout(Duration::from_secs(20))
      .user_agent(concat!("storefront/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| AppError::Config(format!("HTTP client: {}", e)))?;
    Ok(Self {
      http,
      api_base: config.stripe_api_base.clone(),
      secret_key,
    })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v1/{}", self.api_base, path)
  }

  async fn read_intent(resp: reqwest::Response) -> Result<PaymentIntent> {
    let status = resp.status();
    let bytes = resp.bytes().await?;
    if status.is_success() {
      let body: IntentBody = serde_json::from_slice(&bytes)
        .map_err(|e| AppError::Upstream(format!("Unexpected payment provider response: {}", e)))?;
      return Ok(body.into());
    }
    Err(provider_error(status, &bytes))
  }
}

/// Card errors reach the shopper; everything else is an upstream failure.
fn provider_error(status: StatusCode, body: &[u8]) -> AppError {
  let message = serde_json::from_slice::<ErrorEnvelope>(body)
    .ok()
    .and_then(|env| env.error.message)
    .unwrap_or_else(|| format!("Payment provider returned {}", status));
  warn!(%status, %message, "Payment provider error.");
  match status {
    StatusCode::PAYMENT_REQUIRED | StatusCode::BAD_REQUEST => AppError::Payment(message),
    StatusCode::NOT_FOUND => AppError::NotFound(message),
    _ => AppError::Upstream(message),
  }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
  fn name(&self) -> &'static str {
    "stripe"
  }

  #[instrument(name = "stripe::create_intent", skip(self, req), fields(order_id = %req.order_id, amount = req.amount_cents))]
  async fn create_intent(&self, req: CreateIntent) -> Result<PaymentIntent> {
    let mut form: Vec<(&str, String)> = vec![
      ("amount", req.amount_cents.to_string()),
      ("currency", req.currency.clone()),
      ("metadata[order_id]", req.order_id.to_string()),
      ("automatic_payment_methods[enabled]", "true".to_string()),
    ];
    if let Some(email) = req.receipt_email {
      form.push(("receipt_email", email));
    }
    let resp = self
      .http
      .post(self.url("payment_intents"))
      .bearer_auth(&self.secret_key)
      .header("Idempotency-Key", format!("order-{}", req.order_id))
      .form(&form)
      .send()
      .await?;
    Self::read_intent(resp).await
  }

  #[instrument(name = "stripe::retrieve_intent", skip(self))]
  async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
    let resp = self
      .http
      .get(self.url(&format!("payment_intents/{}", intent_id)))
      .bearer_auth(&self.secret_key)
      .send()
      .await?;
    Self::read_intent(resp).await
  }

  #[instrument(name = "stripe::cancel_intent", skip(self))]
  async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
    let resp = self
      .http
      .post(self.url(&format!("payment_intents/{}/cancel", intent_id)))
      .bearer_auth(&self.secret_key)
      .send()
      .await?;
    Self::read_intent(resp).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn intent_body_maps_metadata_and_errors() {
    let order_id = Uuid::new_v4();
    let raw = serde_json::json!({
      "id": "pi_3Nabc",
      "object": "payment_intent",
      "amount": 21250,
      "currency": "usd",
      "status": "requires_payment_method",
      "client_secret": "pi_3Nabc_secret_xyz",
      "metadata": { "order_id": order_id.to_string() },
      "last_payment_error": { "message": "Your card has insufficient funds." }
    });
    let intent: PaymentIntent = serde_json::from_value::<IntentBody>(raw).unwrap().into();
    assert_eq!(intent.order_id, Some(order_id));
    assert_eq!(intent.amount_cents, 21_250);
    assert!(intent.has_failed());
  }

  #[test]
  fn provider_errors_are_classified() {
    let body = br#"{"error":{"message":"Your card was declined.","type":"card_error"}}"#;
    assert!(matches!(
      provider_error(StatusCode::PAYMENT_REQUIRED, body),
      AppError::Payment(ref m) if m == "Your card was declined."
    ));
    assert!(matches!(
      provider_error(StatusCode::SERVICE_UNAVAILABLE, b"oops"),
      AppError::Upstream(_)
    ));
  }
}
