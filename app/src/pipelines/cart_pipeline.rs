// storefront/src/pipelines/cart_pipeline.rs

use crate::errors::AppError;
use crate::models::cart_item::CartItem;
use crate::models::product::{Product, Variation};
use crate::pipelines::contexts::AddToCartCtxData;
use shopflow::{ContextData, Pipeline, PipelineControl, Workflows};
use std::sync::Arc;
use tracing::{info, warn};

pub const MAX_LINE_QUANTITY: i32 = 99;

pub fn build_add_to_cart_pipeline() -> Pipeline<AddToCartCtxData, AppError> {
  let mut p = Pipeline::<AddToCartCtxData, AppError>::new(&[
    ("validate_cart_input", false, None),
    ("fetch_product_for_cart", false, None),
    ("check_product_stock_for_cart", false, None),
    ("add_or_update_cart_item_db", false, None),
  ]);

  p.on_root("validate_cart_input", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let quantity = ctx_data.read().quantity;
      if !(1..=MAX_LINE_QUANTITY).contains(&quantity) {
        warn!(quantity, "Rejected cart quantity.");
        return Err(AppError::Validation(format!(
          "Quantity must be between 1 and {}.",
          MAX_LINE_QUANTITY
        )));
      }
      Ok(PipelineControl::Continue)
    })
  });

  p.on_root("fetch_product_for_cart", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (product_id, variation_id, db_pool) = {
        let guard = ctx_data.read();
        (guard.product_id, guard.variation_id, guard.app_state.db_pool.clone())
      };

      let product = sqlx::query_as::<_, Product>(
        "SELECT id, name, slug, description, category, price_cents, stock_quantity, image_url, is_active, \
         created_at, updated_at FROM products WHERE id = $1",
      )
      .bind(product_id)
      .fetch_optional(&db_pool)
      .await?
      .filter(|p| p.is_active)
      .ok_or_else(|| AppError::NotFound(format!("Product {} not found.", product_id)))?;

      let variation = match variation_id {
        Some(variation_id) => {
          let variation = sqlx::query_as::<_, Variation>(
            "SELECT id, product_id, name, sku, price_cents, stock_quantity FROM variations WHERE id = $1",
          )
          .bind(variation_id)
          .fetch_optional(&db_pool)
          .await?
          .filter(|v| v.product_id == product_id)
          .ok_or_else(|| AppError::Validation("Variation does not belong to this product.".to_string()))?;
          Some(variation)
        }
        None => None,
      };

      let mut guard = ctx_data.write();
      guard.product = Some(product);
      guard.variation = variation;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("check_product_stock_for_cart", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (user_id, product_id, variation_id, requested, available, db_pool) = {
        let guard = ctx_data.read();
        let available = match (&guard.variation, &guard.product) {
          (Some(v), _) => v.stock_quantity,
          (None, Some(p)) => p.stock_quantity,
          (None, None) => return Err(AppError::Internal("Product missing before stock check.".to_string())),
        };
        (
          guard.user_id,
          guard.product_id,
          guard.variation_id,
          guard.quantity,
          available,
          guard.app_state.db_pool.clone(),
        )
      };

      let already_in_cart: i32 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0)::INT FROM cart_items \
         WHERE user_id = $1 AND product_id = $2 AND variation_id IS NOT DISTINCT FROM $3",
      )
      .bind(user_id)
      .bind(product_id)
      .bind(variation_id)
      .fetch_one(&db_pool)
      .await?;

      let wanted = already_in_cart + requested;
      if wanted > available {
        warn!(%product_id, available, wanted, "Insufficient stock.");
        return Err(AppError::Validation(format!("Insufficient stock. Only {} available.", available)));
      }
      if wanted > MAX_LINE_QUANTITY {
        return Err(AppError::Validation(format!(
          "A cart line holds at most {} units.",
          MAX_LINE_QUANTITY
        )));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("add_or_update_cart_item_db", |ctx_data: ContextData<AddToCartCtxData>| {
    Box::pin(async move {
      let (user_id, product_id, variation_id, quantity, db_pool) = {
        let guard = ctx_data.read();
        (
          guard.user_id,
          guard.product_id,
          guard.variation_id,
          guard.quantity,
          guard.app_state.db_pool.clone(),
        )
      };

      let item = sqlx::query_as::<_, CartItem>(
        r#"
        INSERT INTO cart_items (user_id, product_id, variation_id, quantity)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT ON CONSTRAINT cart_items_line_key DO UPDATE
          SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = NOW()
        RETURNING id, user_id, product_id, variation_id, quantity, added_at, updated_at
        "#,
      )
      .bind(user_id)
      .bind(product_id)
      .bind(variation_id)
      .bind(quantity)
      .fetch_one(&db_pool)
      .await?;

      info!(cart_item_id = %item.id, quantity = item.quantity, "Cart line saved.");
      ctx_data.write().updated_cart_item = Some(item);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p
}

pub fn register_add_to_cart_pipeline(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_add_to_cart_pipeline());
  info!("Add to Cart pipeline registered.");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::state::AppState;
  use crate::test_support::{cart_quantity, insert_customer, insert_product};
  use uuid::Uuid;

  fn ctx(state: &AppState, quantity: i32) -> ContextData<AddToCartCtxData> {
    ContextData::new(AddToCartCtxData {
      app_state: state.clone(),
      user_id: Uuid::new_v4(),
      product_id: Uuid::new_v4(),
      variation_id: None,
      quantity,
      product: None,
      variation: None,
      updated_cart_item: None,
    })
  }

  #[tokio::test]
  async fn quantity_outside_range_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    for quantity in [0, -3, 100] {
      let err = state.workflows.run(ctx(&state, quantity)).await.unwrap_err();
      assert!(
        matches!(err, AppError::Validation(ref m) if m.contains("between 1 and 99")),
        "{:?}",
        err
      );
    }
  }

  fn line(state: &AppState, user_id: Uuid, product_id: Uuid, quantity: i32) -> ContextData<AddToCartCtxData> {
    ContextData::new(AddToCartCtxData {
      app_state: state.clone(),
      user_id,
      product_id,
      variation_id: None,
      quantity,
      product: None,
      variation: None,
      updated_cart_item: None,
    })
  }

  #[sqlx::test]
  async fn adding_the_same_product_accumulates_one_line(pool: sqlx::PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::with_pool(pool.clone(), dir.path());
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 1_200, 10).await;

    state.workflows.run(line(&state, user, product, 2)).await.unwrap();
    let second = line(&state, user, product, 3);
    state.workflows.run(second.clone()).await.unwrap();

    assert_eq!(second.read().updated_cart_item.as_ref().map(|i| i.quantity), Some(5));
    assert_eq!(cart_quantity(&pool, user, product).await, Some(5));
    let lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cart_items WHERE user_id = $1")
      .bind(user)
      .fetch_one(&pool)
      .await
      .unwrap();
    assert_eq!(lines, 1);
  }

  #[sqlx::test]
  async fn accumulated_quantity_cannot_exceed_stock(pool: sqlx::PgPool) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::with_pool(pool.clone(), dir.path());
    let user = insert_customer(&pool).await;
    let product = insert_product(&pool, 1_200, 4).await;

    state.workflows.run(line(&state, user, product, 3)).await.unwrap();
    let err = state.workflows.run(line(&state, user, product, 2)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m.contains("Only 4 available")), "{:?}", err);
    assert_eq!(cart_quantity(&pool, user, product).await, Some(3));
  }
}
