// storefront/src/services/orders.rs

//! Order persistence shared by checkout, fulfilment and the order endpoints.

use crate::errors::{AppError, Result};
use crate::models::order::{Order, OrderStatus, ORDER_COLUMNS};
use crate::models::order_item::OrderItem;
use crate::pipelines::fulfilment_pipeline;
use crate::state::AppState;
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// What a settle call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
  /// pending (or failed) -> paid happened now.
  Settled,
  /// The order had already left `pending`.
  AlreadyProcessed(OrderStatus),
}

pub async fn find_by_id(pool: &PgPool, order_id: Uuid) -> Result<Option<Order>> {
  let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
  Ok(sqlx::query_as::<_, Order>(&sql).bind(order_id).fetch_optional(pool).await?)
}

pub async fn find_by_intent(pool: &PgPool, payment_intent_id: &str) -> Result<Option<Order>> {
  let sql = format!("SELECT {} FROM orders WHERE payment_intent_id = $1", ORDER_COLUMNS);
  Ok(
    sqlx::query_as::<_, Order>(&sql)
      .bind(payment_intent_id)
      .fetch_optional(pool)
      .await?,
  )
}

pub async fn items_of(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderItem>> {
  Ok(
    sqlx::query_as::<_, OrderItem>(
      "SELECT id, order_id, product_id, variation_id, product_name, quantity, unit_price_cents \
       FROM order_items WHERE order_id = $1 ORDER BY product_name",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?,
  )
}

/// Marks an order paid once the gateway reports the charge, takes its items
/// out of stock and empties the buyer's cart, all in one transaction. Safe to
/// call repeatedly.
///
/// A `failed` order is settled too: a declined attempt leaves the intent open
/// and the shopper may pay on a retry.
#[instrument(name = "orders::settle", skip(pool))]
pub async fn settle_paid_order(pool: &PgPool, order_id: Uuid) -> Result<Settlement> {
  let mut tx = pool.begin().await?;

  let row: Option<(OrderStatus, Uuid)> = sqlx::query_as("SELECT status, user_id FROM orders WHERE id = $1 FOR UPDATE")
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?;
  let (status, user_id) = row.ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;

  match status {
    OrderStatus::Pending => {}
    OrderStatus::Failed => warn!("Payment succeeded after the order was marked failed; settling it."),
    OrderStatus::Cancelled => {
      error!("Payment succeeded for a cancelled order; refund it by hand.");
      return Ok(Settlement::AlreadyProcessed(status));
    }
    _ => {
      info!(%status, "Order already processed; nothing to settle.");
      return Ok(Settlement::AlreadyProcessed(status));
    }
  }

  sqlx::query("UPDATE orders SET status = 'paid', updated_at = NOW() WHERE id = $1")
    .bind(order_id)
    .execute(&mut *tx)
    .await?;

  let items: Vec<(Uuid, Option<Uuid>, i32)> =
    sqlx::query_as("SELECT product_id, variation_id, quantity FROM order_items WHERE order_id = $1")
      .bind(order_id)
      .fetch_all(&mut *tx)
      .await?;

  for (product_id, variation_id, quantity) in items {
    let result = match variation_id {
      Some(variation_id) => {
        sqlx::query("UPDATE variations SET stock_quantity = GREATEST(stock_quantity - $1, 0) WHERE id = $2")
          .bind(quantity)
          .bind(variation_id)
          .execute(&mut *tx)
          .await?
      }
      None => {
        sqlx::query(
          "UPDATE products SET stock_quantity = GREATEST(stock_quantity - $1, 0), updated_at = NOW() WHERE id = $2",
        )
        .bind(quantity)
        .bind(product_id)
        .execute(&mut *tx)
        .await?
      }
    };
    if result.rows_affected() == 0 {
      warn!(%product_id, ?variation_id, "Purchased item no longer exists; stock left unchanged.");
    }
  }

  sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

  tx.commit().await?;
  info!("Order settled.");
  Ok(Settlement::Settled)
}

/// pending -> failed. Returns whether the order changed.
#[instrument(name = "orders::mark_failed", skip(pool))]
pub async fn mark_failed(pool: &PgPool, order_id: Uuid) -> Result<bool> {
  let result = sqlx::query("UPDATE orders SET status = 'failed', updated_at = NOW() WHERE id = $1 AND status = 'pending'")
    .bind(order_id)
    .execute(pool)
    .await?;
  Ok(result.rows_affected() == 1)
}

/// Manager status change. `paid` runs fulfilment; leaving `pending` any other
/// way cancels the payment intent first so it can no longer be charged.
#[instrument(name = "orders::change_status", skip(app_state))]
pub async fn change_status(app_state: &AppState, order_id: Uuid, next: OrderStatus) -> Result<Order> {
  let current = find_by_id(&app_state.db_pool, order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
  check_transition(current.status, next)?;

  if current.status == OrderStatus::Pending {
    if next == OrderStatus::Paid {
      let settlement = fulfilment_pipeline::fulfil(app_state, order_id).await?;
      if settlement != Settlement::Settled {
        return Err(AppError::Conflict("Order status changed concurrently; reload and retry.".to_string()));
      }
      return find_by_id(&app_state.db_pool, order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)));
    }
    if let Some(intent_id) = current.payment_intent_id.as_deref() {
      app_state.payments.cancel_intent(intent_id).await.map_err(|e| {
        warn!(%intent_id, error = %e, "Payment intent could not be cancelled.");
        AppError::Conflict(format!(
          "The payment for this order could not be cancelled ({}); check its status first.",
          e
        ))
      })?;
      info!(%intent_id, "Payment intent cancelled.");
    }
  }

  transition(&app_state.db_pool, order_id, next).await
}

fn check_transition(current: OrderStatus, next: OrderStatus) -> Result<()> {
  if current.can_transition_to(next) {
    Ok(())
  } else {
    Err(AppError::Validation(format!("Order cannot move from {} to {}.", current, next)))
  }
}

/// Checked status write with an optimistic guard on the current status.
#[instrument(name = "orders::transition", skip(pool))]
pub async fn transition(pool: &PgPool, order_id: Uuid, next: OrderStatus) -> Result<Order> {
  let current = find_by_id(pool, order_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;

  check_transition(current.status, next)?;

  let sql = format!(
    "UPDATE orders SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3 RETURNING {}",
    ORDER_COLUMNS
  );
  sqlx::query_as::<_, Order>(&sql)
    .bind(next)
    .bind(order_id)
    .bind(current.status)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Conflict("Order status changed concurrently; reload and retry.".to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::services::payment::{CreateIntent, IntentStatus};
  use crate::test_support::*;

  #[sqlx::test]
  async fn settling_twice_takes_stock_once_and_clears_the_cart(pool: PgPool) {
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 10).await;
    put_in_cart(&pool, user, product, 2).await;
    let order = insert_order(&pool, user, product, 2, OrderStatus::Pending, None).await;

    assert_eq!(settle_paid_order(&pool, order).await.unwrap(), Settlement::Settled);
    assert_eq!(status_of(&pool, order).await, OrderStatus::Paid);
    assert_eq!(stock_of(&pool, product).await, 8);
    assert_eq!(cart_quantity(&pool, user, product).await, None);

    assert_eq!(
      settle_paid_order(&pool, order).await.unwrap(),
      Settlement::AlreadyProcessed(OrderStatus::Paid)
    );
    assert_eq!(stock_of(&pool, product).await, 8);
  }

  #[sqlx::test]
  async fn failed_order_settles_when_payment_succeeds_later(pool: PgPool) {
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 5).await;
    let order = insert_order(&pool, user, product, 1, OrderStatus::Failed, None).await;

    assert_eq!(settle_paid_order(&pool, order).await.unwrap(), Settlement::Settled);
    assert_eq!(status_of(&pool, order).await, OrderStatus::Paid);
    assert_eq!(stock_of(&pool, product).await, 4);
  }

  #[sqlx::test]
  async fn cancelled_order_is_never_settled(pool: PgPool) {
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 5).await;
    let order = insert_order(&pool, user, product, 1, OrderStatus::Cancelled, None).await;

    assert_eq!(
      settle_paid_order(&pool, order).await.unwrap(),
      Settlement::AlreadyProcessed(OrderStatus::Cancelled)
    );
    assert_eq!(stock_of(&pool, product).await, 5);
  }

  #[sqlx::test]
  async fn mark_failed_only_touches_pending_orders(pool: PgPool) {
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 5).await;
    let pending = insert_order(&pool, user, product, 1, OrderStatus::Pending, None).await;
    let paid = insert_order(&pool, user, product, 1, OrderStatus::Paid, None).await;

    assert!(mark_failed(&pool, pending).await.unwrap());
    assert!(!mark_failed(&pool, paid).await.unwrap());
    assert_eq!(status_of(&pool, paid).await, OrderStatus::Paid);
  }

  #[sqlx::test]
  async fn illegal_transitions_are_rejected(pool: PgPool) {
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 5).await;
    let pending = insert_order(&pool, user, product, 1, OrderStatus::Pending, None).await;
    let paid = insert_order(&pool, user, product, 1, OrderStatus::Paid, None).await;

    for (order, next) in [(pending, OrderStatus::Shipped), (paid, OrderStatus::Delivered), (paid, OrderStatus::Pending)] {
      let err = transition(&pool, order, next).await.unwrap_err();
      assert!(matches!(err, AppError::Validation(ref m) if m.contains("cannot move")), "{:?}", err);
    }
    assert_eq!(transition(&pool, paid, OrderStatus::Shipped).await.unwrap().status, OrderStatus::Shipped);
    assert!(matches!(
      transition(&pool, Uuid::new_v4(), OrderStatus::Paid).await,
      Err(AppError::NotFound(_))
    ));
  }

  #[sqlx::test]
  async fn marking_paid_by_hand_runs_fulfilment(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::with_pool(pool.clone(), dir.path());
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 6).await;
    put_in_cart(&pool, user, product, 3).await;
    let order = insert_order(&pool, user, product, 3, OrderStatus::Pending, None).await;

    let changed = change_status(&state, order, OrderStatus::Paid).await.unwrap();
    assert_eq!(changed.status, OrderStatus::Paid);
    assert_eq!(stock_of(&pool, product).await, 3);
    assert_eq!(cart_quantity(&pool, user, product).await, None);
  }

  #[sqlx::test]
  async fn cancelling_a_pending_order_cancels_its_intent(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::with_pool(pool.clone(), dir.path());
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 6).await;
    let intent = state
      .payments
      .create_intent(CreateIntent {
        order_id: Uuid::new_v4(),
        amount_cents: 1000,
        currency: "usd".into(),
        receipt_email: None,
      })
      .await
      .unwrap();
    let order = insert_order(&pool, user, product, 1, OrderStatus::Pending, Some(&intent.id)).await;

    let changed = change_status(&state, order, OrderStatus::Cancelled).await.unwrap();
    assert_eq!(changed.status, OrderStatus::Cancelled);
    let after = state.payments.retrieve_intent(&intent.id).await.unwrap();
    assert_eq!(after.status, IntentStatus::Canceled);
  }

  #[sqlx::test]
  async fn already_charged_order_cannot_be_cancelled(pool: PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::with_pool(pool.clone(), dir.path());
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 500, 6).await;
    let intent = state
      .payments
      .create_intent(CreateIntent {
        order_id: Uuid::new_v4(),
        amount_cents: 1000,
        currency: "usd".into(),
        receipt_email: None,
      })
      .await
      .unwrap();
    state.payments.as_mock().unwrap().confirm(&intent.id).unwrap();
    let order = insert_order(&pool, user, product, 1, OrderStatus::Pending, Some(&intent.id)).await;

    let err = change_status(&state, order, OrderStatus::Cancelled).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "{:?}", err);
    assert_eq!(status_of(&pool, order).await, OrderStatus::Pending);
  }
}
