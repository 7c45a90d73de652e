// storefront/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shopflow::ContextData;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::cart_item::{CartLineRow, CART_LINES_SQL};
use crate::models::user::Tier;
use crate::pipelines::cart_pipeline::MAX_LINE_QUANTITY;
use crate::pipelines::contexts::AddToCartCtxData;
use crate::pricing::{self, Totals};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use crate::web::handlers::{ensure_completed, tier_of};

#[derive(Deserialize, Debug)]
pub struct AddToCartRequestPayload {
  pub product_id: Uuid,
  pub variation_id: Option<Uuid>,
  #[serde(default = "one")]
  pub quantity: i32,
}

fn one() -> i32 {
  1
}

#[derive(Deserialize, Debug)]
pub struct UpdateQuantityPayload {
  pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct CartLineView {
  pub item_id: Uuid,
  pub product_id: Uuid,
  pub variation_id: Option<Uuid>,
  pub product_name: String,
  pub variation_name: Option<String>,
  pub image_url: Option<String>,
  pub quantity: i32,
  pub unit_price_cents: i64,
  pub discounted_unit_price_cents: i64,
  pub line_total_cents: i64,
  pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct CartView {
  pub lines: Vec<CartLineView>,
  pub totals: Totals,
}

/// Line totals are undiscounted; the tier discount applies once to the subtotal.
pub fn price_cart(rows: Vec<CartLineRow>, tier: Tier) -> CartView {
  let lines: Vec<CartLineView> = rows
    .into_iter()
    .map(|r| CartLineView {
      item_id: r.item_id,
      product_id: r.product_id,
      variation_id: r.variation_id,
      product_name: r.product_name,
      variation_name: r.variation_name,
      image_url: r.image_url,
      quantity: r.quantity,
      unit_price_cents: r.unit_price_cents,
      discounted_unit_price_cents: pricing::discounted_cents(r.unit_price_cents, tier),
      line_total_cents: r.unit_price_cents * i64::from(r.quantity),
      available: r.is_active && r.quantity <= r.available_stock,
    })
    .collect();
  let totals = pricing::totals(lines.iter().map(|l| l.line_total_cents), tier);
  CartView { lines, totals }
}

async fn load_cart(app_state: &AppState, user_id: Uuid) -> Result<CartView, AppError> {
  let rows = sqlx::query_as::<_, CartLineRow>(CART_LINES_SQL)
    .bind(user_id)
    .fetch_all(&app_state.db_pool)
    .await?;
  let tier = tier_of(&app_state.db_pool, user_id).await?;
  Ok(price_cart(rows, tier))
}

#[instrument(name = "handler::view_cart", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn view_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = load_cart(&app_state, auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "cart": cart })))
}

#[instrument(
    name = "handler::add_to_cart",
    skip(app_state, req_payload, auth_user),
    fields(user_id = %auth_user.user_id, product_id = %req_payload.product_id, quantity = %req_payload.quantity)
)]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<AddToCartRequestPayload>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let ctx = ContextData::new(AddToCartCtxData {
    app_state: app_state.get_ref().clone(),
    user_id: auth_user.user_id,
    product_id: payload.product_id,
    variation_id: payload.variation_id,
    quantity: payload.quantity,
    product: None,
    variation: None,
    updated_cart_item: None,
  });

  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    warn!(error = %e, "Add to cart failed.");
    e
  })?;
  ensure_completed(result)?;

  let item = ctx
    .read()
    .updated_cart_item
    .clone()
    .ok_or_else(|| AppError::Internal("Cart update completed, but item details are unavailable.".to_string()))?;
  let cart = load_cart(&app_state, auth_user.user_id).await?;

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "cart_item": item,
    "cart": cart,
  })))
}

#[instrument(name = "handler::update_cart_item", skip(app_state, auth_user, path, payload), fields(user_id = %auth_user.user_id))]
pub async fn update_cart_item_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<UpdateQuantityPayload>,
) -> Result<HttpResponse, AppError> {
  let item_id = path.into_inner();
  let quantity = payload.quantity;
  if !(0..=MAX_LINE_QUANTITY).contains(&quantity) {
    return Err(AppError::Validation(format!(
      "Quantity must be between 0 and {}.",
      MAX_LINE_QUANTITY
    )));
  }

  if quantity == 0 {
    remove_item(&app_state, auth_user.user_id, item_id).await?;
  } else {
    let available: i32 = sqlx::query_scalar(
      "SELECT COALESCE(v.stock_quantity, p.stock_quantity) FROM cart_items ci \
       JOIN products p ON p.id = ci.product_id \
       LEFT JOIN variations v ON v.id = ci.variation_id \
       WHERE ci.id = $1 AND ci.user_id = $2",
    )
    .bind(item_id)
    .bind(auth_user.user_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Cart item {} not found.", item_id)))?;
    if quantity > available {
      return Err(AppError::Validation(format!("Insufficient stock. Only {} available.", available)));
    }
    sqlx::query("UPDATE cart_items SET quantity = $1, updated_at = NOW() WHERE id = $2 AND user_id = $3")
      .bind(quantity)
      .bind(item_id)
      .bind(auth_user.user_id)
      .execute(&app_state.db_pool)
      .await?;
    info!(%item_id, quantity, "Cart quantity updated.");
  }

  let cart = load_cart(&app_state, auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "cart": cart })))
}

async fn remove_item(app_state: &AppState, user_id: Uuid, item_id: Uuid) -> Result<(), AppError> {
  let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
    .bind(item_id)
    .bind(user_id)
    .execute(&app_state.db_pool)
    .await?;
  if result.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("Cart item {} not found.", item_id)));
  }
  info!(%item_id, "Cart item removed.");
  Ok(())
}

#[instrument(name = "handler::remove_cart_item", skip(app_state, auth_user, path), fields(user_id = %auth_user.user_id))]
pub async fn remove_cart_item_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  remove_item(&app_state, auth_user.user_id, path.into_inner()).await?;
  let cart = load_cart(&app_state, auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "cart": cart })))
}

#[instrument(name = "handler::clear_cart", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn clear_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
    .bind(auth_user.user_id)
    .execute(&app_state.db_pool)
    .await?;
  info!(removed = result.rows_affected(), "Cart cleared.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "removed": result.rows_affected() })))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn row(unit_price_cents: i64, quantity: i32, available_stock: i32) -> CartLineRow {
    CartLineRow {
      item_id: Uuid::new_v4(),
      product_id: Uuid::new_v4(),
      variation_id: None,
      product_name: "Mug".into(),
      variation_name: None,
      image_url: None,
      quantity,
      unit_price_cents,
      available_stock,
      is_active: true,
    }
  }

  #[test]
  fn gold_cart_is_ten_percent_off_the_subtotal() {
    let cart = price_cart(vec![row(25_000, 2, 10), row(50_000, 1, 10)], Tier::Gold);
    assert_eq!(cart.lines[0].line_total_cents, 50_000);
    assert_eq!(cart.lines[0].discounted_unit_price_cents, 22_500);
    assert_eq!(cart.totals.subtotal_cents, 100_000);
    assert_eq!(cart.totals.total_cents, 90_000);
    assert_eq!(cart.totals.discount_cents, 10_000);
  }

  #[test]
  fn lines_beyond_stock_are_flagged() {
    let cart = price_cart(vec![row(1_000, 4, 3)], Tier::Bronze);
    assert!(!cart.lines[0].available);
    assert_eq!(cart.totals.total_cents, 4_000);
  }
}
