// storefront/src/services/payment/mock.rs

use super::{CreateIntent, IntentStatus, PaymentGateway, PaymentIntent};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

/// In-memory payment provider for development and tests.
///
/// Amounts whose last three digits are `123` cents are declined on confirmation.
#[derive(Debug, Default)]
pub struct MockGateway {
  intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl MockGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Simulates the shopper confirming on the hosted page.
  #[instrument(name = "mock_gateway::confirm", skip(self))]
  pub fn confirm(&self, intent_id: &str) -> Result<PaymentIntent> {
    let mut intents = self.intents.lock();
    let intent = intents
      .get_mut(intent_id)
      .ok_or_else(|| AppError::NotFound(format!("Payment intent {} not found.", intent_id)))?;

    match intent.status {
      IntentStatus::RequiresPaymentMethod | IntentStatus::RequiresConfirmation | IntentStatus::RequiresAction => {}
      other => {
        return Err(AppError::Validation(format!(
          "Payment intent cannot be confirmed in status {:?}.",
          other
        )));
      }
    }

    if intent.amount_cents % 1000 == 123 {
      intent.status = IntentStatus::RequiresPaymentMethod;
      intent.last_error = Some("Your card was declined.".to_string());
      info!(intent_id, "Mock payment declined.");
    } else {
      intent.status = IntentStatus::Succeeded;
      intent.last_error = None;
      info!(intent_id, "Mock payment succeeded.");
    }
    Ok(intent.clone())
  }
}

#[async_trait]
impl PaymentGateway for MockGateway {
  fn name(&self) -> &'static str {
    "mock"
  }

  #[instrument(name = "mock_gateway::create_intent", skip(self, req), fields(order_id = %req.order_id, amount = req.amount_cents))]
  async fn create_intent(&self, req: CreateIntent) -> Result<PaymentIntent> {
    if req.amount_cents <= 0 {
      return Err(AppError::Payment("Amount must be greater than zero.".to_string()));
    }
    let id = format!("mock_pi_{}", Uuid::new_v4().simple());
    let intent = PaymentIntent {
      client_secret: Some(format!("{}_secret_{}", id, Uuid::new_v4().simple())),
      id: id.clone(),
      amount_cents: req.amount_cents,
      currency: req.currency,
      status: IntentStatus::RequiresPaymentMethod,
      order_id: Some(req.order_id),
      last_error: None,
    };
    self.intents.lock().insert(id, intent.clone());
    info!(intent_id = %intent.id, "Mock payment intent created.");
    Ok(intent)
  }

  async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
    self
      .intents
      .lock()
      .get(intent_id)
      .cloned()
      .ok_or_else(|| AppError::NotFound(format!("Payment intent {} not found.", intent_id)))
  }

  async fn cancel_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
    let mut intents = self.intents.lock();
    let intent = intents
      .get_mut(intent_id)
      .ok_or_else(|| AppError::NotFound(format!("Payment intent {} not found.", intent_id)))?;
    if intent.status == IntentStatus::Succeeded {
      return Err(AppError::Validation("A succeeded payment cannot be canceled.".to_string()));
    }
    intent.status = IntentStatus::Canceled;
    Ok(intent.clone())
  }

  fn as_mock(&self) -> Option<&MockGateway> {
    Some(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(amount_cents: i64) -> CreateIntent {
    CreateIntent {
      order_id: Uuid::new_v4(),
      amount_cents,
      currency: "usd".into(),
      receipt_email: None,
    }
  }

  #[tokio::test]
  async fn create_then_confirm_succeeds() {
    let gw = MockGateway::new();
    let intent = gw.create_intent(request(90_000)).await.unwrap();
    assert_eq!(intent.status, IntentStatus::RequiresPaymentMethod);
    assert!(intent.client_secret.as_deref().unwrap().starts_with(&intent.id));

    let confirmed = gw.confirm(&intent.id).unwrap();
    assert_eq!(confirmed.status, IntentStatus::Succeeded);
    assert_eq!(gw.retrieve_intent(&intent.id).await.unwrap().status, IntentStatus::Succeeded);
  }

  #[tokio::test]
  async fn amounts_ending_in_123_are_declined() {
    let gw = MockGateway::new();
    let intent = gw.create_intent(request(5_123)).await.unwrap();
    let confirmed = gw.confirm(&intent.id).unwrap();
    assert_eq!(confirmed.status, IntentStatus::RequiresPaymentMethod);
    assert!(confirmed.has_failed());
  }

  #[tokio::test]
  async fn zero_amount_is_rejected() {
    let gw = MockGateway::new();
    assert!(matches!(gw.create_intent(request(0)).await, Err(AppError::Payment(_))));
  }

  #[tokio::test]
  async fn cancel_and_unknown_ids() {
    let gw = MockGateway::new();
    let intent = gw.create_intent(request(1_000)).await.unwrap();
    assert_eq!(gw.cancel_intent(&intent.id).await.unwrap().status, IntentStatus::Canceled);
    assert!(gw.confirm(&intent.id).is_err());
    assert!(matches!(gw.retrieve_intent("nope").await, Err(AppError::NotFound(_))));
  }
}
