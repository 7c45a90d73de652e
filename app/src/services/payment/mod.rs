// storefront/src/services/payment/mod.rs

//! Hosted payment-intent providers behind one trait.

pub mod mock;
pub mod stripe;

use crate::config::{AppConfig, PaymentProvider};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub use mock::MockGateway;
pub use stripe::StripeGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
  RequiresPaymentMethod,
  RequiresConfirmation,
  RequiresAction,
  Processing,
  RequiresCapture,
  Canceled,
  Succeeded,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
  pub id: String,
  pub amount_cents: i64,
  pub currency: String,
  pub status: IntentStatus,
  #[serde(skip_serializing)]
  pub client_secret: Option<String>,
  pub order_id: Option<Uuid>,
  /// Decline reason of the most recent confirmation attempt.
  pub last_error: Option<String>,
}

impl PaymentIntent {
  /// Confirmation was attempted and declined; the shopper has to start over.
  pub fn has_failed(&self) -> bool {
    match self.status {
      IntentStatus::Canceled => true,
      IntentStatus::RequiresPaymentMethod => self.last_error.is_some(),
      _ => false,
    }
  }
}

#[derive(Debug, Clone)]
pub struct CreateIntent {
  pub order_id: Uuid,
  pub amount_cents: i64,
  pub currency: String,
  pub receipt_email: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
  fn name(&self) -> &'static str;

  async fn create_intent(&self, req: CreateIntent) -> Result<PaymentIntent>;

  async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent>;

  async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent>;

  /// The in-memory gateway, when that is what is configured.
  fn as_mock(&self) -> Option<&MockGateway> {
    None
  }
}

/// Gateway selected by `PAYMENT_PROVIDER`.
pub fn gateway_from_config(config: &AppConfig) -> Result<Arc<dyn PaymentGateway>> {
  match config.payment_provider {
    PaymentProvider::Mock => Ok(Arc::new(MockGateway::new())),
    PaymentProvider::Stripe => Ok(Arc::new(StripeGateway::from_config(config)?)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn intent(status: IntentStatus, last_error: Option<&str>) -> PaymentIntent {
    PaymentIntent {
      id: "pi_x".into(),
      amount_cents: 100,
      currency: "usd".into(),
      status,
      client_secret: None,
      order_id: None,
      last_error: last_error.map(str::to_string),
    }
  }

  #[test]
  fn failure_needs_a_cancel_or_a_declined_attempt() {
    assert!(intent(IntentStatus::Canceled, None).has_failed());
    assert!(intent(IntentStatus::RequiresPaymentMethod, Some("declined")).has_failed());
    assert!(!intent(IntentStatus::RequiresPaymentMethod, None).has_failed());
    assert!(!intent(IntentStatus::Processing, None).has_failed());
  }

  #[test]
  fn mock_is_the_default_provider() {
    let gateway = gateway_from_config(&AppConfig::for_tests()).unwrap();
    assert_eq!(gateway.name(), "mock");
    assert!(gateway.as_mock().is_some());
  }
}
