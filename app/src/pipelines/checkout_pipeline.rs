// storefront/src/pipelines/checkout_pipeline.rs

use crate::errors::AppError;
use crate::models::cart_item::{CartLineRow, CART_LINES_SQL};
use crate::models::user::{User, USER_COLUMNS};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::pricing;
use crate::services::orders;
use crate::services::payment::CreateIntent;
use shopflow::{ContextData, Pipeline, PipelineControl, Workflows};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub fn build_checkout_pipeline() -> Pipeline<CheckoutCtxData, AppError> {
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&[
    ("load_cart_checkout", false, None),
    ("fetch_customer_checkout", false, None),
    ("price_cart_checkout", false, None),
    ("create_pending_order_checkout", false, None),
    ("create_payment_intent_checkout", false, None),
    ("attach_intent_to_order_checkout", false, None),
  ]);

  // Step 1: the cart must hold at least one active product.
  p.on_root("load_cart_checkout", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.app_state.db_pool.clone())
      };

      let lines = sqlx::query_as::<_, CartLineRow>(CART_LINES_SQL)
        .bind(user_id)
        .fetch_all(&db_pool)
        .await?;

      if lines.is_empty() {
        return Err(AppError::Validation("Your cart is empty.".to_string()));
      }
      if let Some(gone) = lines.iter().find(|l| !l.is_active) {
        return Err(AppError::Validation(format!(
          "'{}' is no longer available; remove it from your cart.",
          gone.product_name
        )));
      }
      info!(%user_id, lines = lines.len(), "Cart loaded for checkout.");
      ctx_data.write().lines = lines;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 2: the tier comes from the stored user, never from the token.
  p.on_root("fetch_customer_checkout", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.user_id, guard.app_state.db_pool.clone())
      };
      let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
      let customer = sqlx::query_as::<_, User>(&sql)
        .bind(user_id)
        .fetch_optional(&db_pool)
        .await?
        .ok_or_else(|| AppError::Auth("Account no longer exists.".to_string()))?;
      ctx_data.write().customer = Some(customer);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 3: stock check and tier-discounted totals.
  p.on_root("price_cart_checkout", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let mut guard = ctx_data.write();
      let tier = guard.customer.as_ref().map(|c| c.tier).unwrap_or_default();

      if let Some(short) = guard.lines.iter().find(|l| l.quantity > l.available_stock) {
        return Err(AppError::Validation(format!(
          "Only {} of '{}' left in stock.",
          short.available_stock, short.product_name
        )));
      }

      let totals = pricing::totals(
        guard.lines.iter().map(|l| l.unit_price_cents * i64::from(l.quantity)),
        tier,
      );
      info!(
        subtotal = totals.subtotal_cents,
        total = totals.total_cents,
        %tier,
        "Cart priced."
      );
      guard.totals = Some(totals);
      Ok(PipelineControl::Continue)
    })
  });

  // Step 4: order and items in one transaction.
  p.on_root("create_pending_order_checkout", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (user_id, lines, totals, currency, db_pool) = {
        let guard = ctx_data.read();
        let totals = guard
          .totals
          .ok_or_else(|| AppError::Internal("Totals missing before order creation.".to_string()))?;
        (
          guard.user_id,
          guard.lines.clone(),
          totals,
          guard.app_state.config.currency.clone(),
          guard.app_state.db_pool.clone(),
        )
      };

      let mut tx = db_pool.begin().await?;
      let order_id: Uuid = sqlx::query_scalar(
        "INSERT INTO orders (user_id, status, subtotal_cents, discount_cents, total_cents, currency, tier_at_purchase) \
         VALUES ($1, 'pending', $2, $3, $4, $5, $6) RETURNING id",
      )
      .bind(user_id)
      .bind(totals.subtotal_cents)
      .bind(totals.discount_cents)
      .bind(totals.total_cents)
      .bind(&currency)
      .bind(totals.tier)
      .fetch_one(&mut *tx)
      .await?;

      for line in &lines {
        let name = match &line.variation_name {
          Some(v) => format!("{} ({})", line.product_name, v),
          None => line.product_name.clone(),
        };
        sqlx::query(
          "INSERT INTO order_items (order_id, product_id, variation_id, product_name, quantity, unit_price_cents) \
           VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.variation_id)
        .bind(name)
        .bind(line.quantity)
        .bind(line.unit_price_cents)
        .execute(&mut *tx)
        .await?;
      }
      tx.commit().await?;

      info!(%order_id, "Pending order created.");
      ctx_data.write().order_id = Some(order_id);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Step 5: hosted payment intent for the discounted total.
  p.on_root("create_payment_intent_checkout", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (request, gateway, db_pool) = {
        let guard = ctx_data.read();
        let order_id = guard
          .order_id
          .ok_or_else(|| AppError::Internal("Order missing before payment.".to_string()))?;
        let total = guard.totals.map(|t| t.total_cents).unwrap_or_default();
        (
          CreateIntent {
            order_id,
            amount_cents: total,
            currency: guard.app_state.config.currency.clone(),
            receipt_email: guard.customer.as_ref().map(|c| c.email.clone()),
          },
          guard.app_state.payments.clone(),
          guard.app_state.db_pool.clone(),
        )
      };
      let order_id = request.order_id;

      match gateway.create_intent(request).await {
        Ok(intent) => {
          info!(%order_id, intent_id = %intent.id, provider = gateway.name(), "Payment intent created.");
          ctx_data.write().payment_intent = Some(intent);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        Err(e) => {
          error!(%order_id, error = %e, "Payment intent creation failed.");
          if let Err(mark_err) = orders::mark_failed(&db_pool, order_id).await {
            warn!(%order_id, error = %mark_err, "Could not mark order failed.");
          }
          Err(e)
        }
      }
    })
  });

  // Step 6: the status lookup finds the order by intent id.
  p.on_root("attach_intent_to_order_checkout", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (order_id, intent_id, db_pool) = {
        let guard = ctx_data.read();
        match (guard.order_id, guard.payment_intent.as_ref()) {
          (Some(order_id), Some(intent)) => (order_id, intent.id.clone(), guard.app_state.db_pool.clone()),
          _ => return Err(AppError::Internal("Order or intent missing.".to_string())),
        }
      };
      sqlx::query("UPDATE orders SET payment_intent_id = $1, updated_at = NOW() WHERE id = $2")
        .bind(&intent_id)
        .bind(order_id)
        .execute(&db_pool)
        .await?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}

pub fn register_checkout_pipeline(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_checkout_pipeline());
  info!("Checkout pipeline registered.");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn payment_comes_after_the_order_exists() {
    let names = build_checkout_pipeline().step_names().join(",");
    let order_at = names.find("create_pending_order_checkout").unwrap();
    let intent_at = names.find("create_payment_intent_checkout").unwrap();
    assert!(order_at < intent_at);
  }
}
