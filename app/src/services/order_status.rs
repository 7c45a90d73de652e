// storefront/src/services/order_status.rs

//! Status lookup keyed by payment-intent id, polled by the checkout return
//! page. A pending order whose intent already succeeded is settled here, so
//! a lost webhook never leaves a paid order behind.

use crate::errors::Result;
use crate::models::order::{Order, OrderStatus};
use crate::pipelines::fulfilment_pipeline;
use crate::reconcile::{LookupStatus, StatusSource};
use crate::services::orders::{self, Settlement};
use crate::services::payment::{IntentStatus, PaymentIntent};
use crate::state::AppState;
use async_trait::async_trait;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const DEFAULT_DECLINE: &str = "Your payment was not completed.";

/// What the gateway says about an intent, reduced to what the lookup needs.
#[derive(Debug, Clone, PartialEq, Eq)]
enum IntentVerdict {
  Paid,
  Authorised,
  Declined(String),
  Waiting,
}

fn verdict(intent: &PaymentIntent) -> IntentVerdict {
  if intent.has_failed() {
    return IntentVerdict::Declined(intent.last_error.clone().unwrap_or_else(|| DEFAULT_DECLINE.to_string()));
  }
  match intent.status {
    IntentStatus::Succeeded => IntentVerdict::Paid,
    IntentStatus::RequiresCapture => IntentVerdict::Authorised,
    _ => IntentVerdict::Waiting,
  }
}

/// Answer from the stored order alone; `None` means the gateway decides.
fn from_order(order: &Order) -> Option<LookupStatus> {
  match order.status {
    OrderStatus::Pending => None,
    s if s.is_settled() => Some(LookupStatus::Completed { order_id: order.id }),
    _ => Some(LookupStatus::Failed {
      message: DEFAULT_DECLINE.to_string(),
    }),
  }
}

/// A succeeded intent completes the order unless it was cancelled meanwhile.
fn after_settlement(order_id: Uuid, settlement: Settlement) -> LookupStatus {
  match settlement {
    Settlement::AlreadyProcessed(status) if !status.is_settled() => LookupStatus::Failed {
      message: DEFAULT_DECLINE.to_string(),
    },
    _ => LookupStatus::Completed { order_id },
  }
}

#[instrument(name = "order_status::lookup", skip(app_state))]
pub async fn lookup_status(app_state: &AppState, payment_intent_id: &str) -> Result<LookupStatus> {
  let Some(order) = orders::find_by_intent(&app_state.db_pool, payment_intent_id).await? else {
    // Checkout may not have attached the intent yet.
    return Ok(LookupStatus::Processing { order_id: None });
  };
  if let Some(known) = from_order(&order) {
    return Ok(known);
  }

  let intent = app_state.payments.retrieve_intent(payment_intent_id).await?;
  match verdict(&intent) {
    IntentVerdict::Paid => {
      let settlement = fulfilment_pipeline::fulfil(app_state, order.id).await?;
      info!(order_id = %order.id, ?settlement, "Order settled from status lookup.");
      Ok(after_settlement(order.id, settlement))
    }
    IntentVerdict::Authorised => Ok(LookupStatus::Processing {
      order_id: Some(order.id),
    }),
    IntentVerdict::Declined(message) => {
      if orders::mark_failed(&app_state.db_pool, order.id).await? {
        warn!(order_id = %order.id, "Order marked failed after a declined payment.");
      }
      Ok(LookupStatus::Failed { message })
    }
    IntentVerdict::Waiting => Ok(LookupStatus::Processing { order_id: None }),
  }
}

/// [`StatusSource`] over the live database and gateway.
pub struct OrderStatusLookup {
  state: AppState,
}

impl OrderStatusLookup {
  pub fn new(state: AppState) -> Self {
    Self { state }
  }
}

#[async_trait]
impl StatusSource for OrderStatusLookup {
  async fn lookup(&self, payment_intent_id: &str) -> Result<LookupStatus> {
    lookup_status(&self.state, payment_intent_id).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::user::Tier;
  use chrono::Utc;

  fn intent(status: IntentStatus, last_error: Option<&str>) -> PaymentIntent {
    PaymentIntent {
      id: "pi_1".into(),
      amount_cents: 1000,
      currency: "usd".into(),
      status,
      client_secret: None,
      order_id: None,
      last_error: last_error.map(str::to_string),
    }
  }

  fn order(status: OrderStatus) -> Order {
    Order {
      id: Uuid::new_v4(),
      user_id: Uuid::new_v4(),
      status,
      subtotal_cents: 1000,
      discount_cents: 0,
      total_cents: 1000,
      currency: "usd".into(),
      tier_at_purchase: Tier::Bronze,
      payment_intent_id: Some("pi_1".into()),
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn gateway_statuses_map_to_verdicts() {
    assert_eq!(verdict(&intent(IntentStatus::Succeeded, None)), IntentVerdict::Paid);
    assert_eq!(verdict(&intent(IntentStatus::RequiresCapture, None)), IntentVerdict::Authorised);
    assert_eq!(verdict(&intent(IntentStatus::Processing, None)), IntentVerdict::Waiting);
    assert_eq!(verdict(&intent(IntentStatus::RequiresPaymentMethod, None)), IntentVerdict::Waiting);
    assert_eq!(
      verdict(&intent(IntentStatus::RequiresPaymentMethod, Some("Your card was declined."))),
      IntentVerdict::Declined("Your card was declined.".into())
    );
    assert_eq!(
      verdict(&intent(IntentStatus::Canceled, None)),
      IntentVerdict::Declined(DEFAULT_DECLINE.into())
    );
  }

  #[test]
  fn settled_orders_complete_without_asking_the_gateway() {
    for status in [OrderStatus::Paid, OrderStatus::Shipped, OrderStatus::Delivered] {
      let o = order(status);
      assert_eq!(from_order(&o), Some(LookupStatus::Completed { order_id: o.id }));
    }
    assert_eq!(from_order(&order(OrderStatus::Pending)), None);
    assert!(matches!(
      from_order(&order(OrderStatus::Failed)),
      Some(LookupStatus::Failed { .. })
    ));
    assert!(matches!(
      from_order(&order(OrderStatus::Cancelled)),
      Some(LookupStatus::Failed { .. })
    ));
  }

  #[test]
  fn succeeded_intent_on_a_cancelled_order_is_not_completed() {
    let id = Uuid::new_v4();
    assert_eq!(after_settlement(id, Settlement::Settled), LookupStatus::Completed { order_id: id });
    assert_eq!(
      after_settlement(id, Settlement::AlreadyProcessed(OrderStatus::Shipped)),
      LookupStatus::Completed { order_id: id }
    );
    assert!(matches!(
      after_settlement(id, Settlement::AlreadyProcessed(OrderStatus::Cancelled)),
      LookupStatus::Failed { .. }
    ));
  }
}
