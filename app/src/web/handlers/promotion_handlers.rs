// storefront/src/web/handlers/promotion_handlers.rs

use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::errors::AppError;
use crate::models::product::{ProductWithSale, ACTIVE_SALE_JOIN, PRODUCT_COLUMNS};
use crate::models::promotion::{BestSeller, OnSaleItem, Slide, SLIDE_COLUMNS};
use crate::models::user::Role;
use crate::state::AppState;
use crate::web::extractors::{AuthenticatedUser, MaybeUser};
use crate::web::handlers::caller_tier;
use crate::web::handlers::product_handlers::ProductView;

const EDITORS: &[Role] = &[Role::Editor];

#[instrument(name = "handler::promotions", skip(app_state, caller))]
pub async fn promotions_handler(app_state: web::Data<AppState>, caller: MaybeUser) -> Result<HttpResponse, AppError> {
  let tier = caller_tier(&app_state.db_pool, &caller).await?;

  let sql = format!(
    "SELECT {} FROM slides WHERE is_active = TRUE ORDER BY position ASC, id",
    SLIDE_COLUMNS
  );
  let slides = sqlx::query_as::<_, Slide>(&sql).fetch_all(&app_state.db_pool).await?;

  let sql = format!(
    "SELECT {}, s.sale_price_cents FROM best_sellers b JOIN products p ON p.id = b.product_id {} \
     WHERE p.is_active = TRUE ORDER BY b.rank ASC",
    PRODUCT_COLUMNS, ACTIVE_SALE_JOIN
  );
  let best_sellers: Vec<ProductView> = sqlx::query_as::<_, ProductWithSale>(&sql)
    .fetch_all(&app_state.db_pool)
    .await?
    .into_iter()
    .map(|p| ProductView::new(p, tier))
    .collect();

  let sql = format!(
    "SELECT {}, s.sale_price_cents FROM products p JOIN on_sale_items s ON s.product_id = p.id \
     AND s.starts_at <= NOW() AND s.ends_at > NOW() WHERE p.is_active = TRUE ORDER BY s.ends_at ASC",
    PRODUCT_COLUMNS
  );
  let on_sale: Vec<ProductView> = sqlx::query_as::<_, ProductWithSale>(&sql)
    .fetch_all(&app_state.db_pool)
    .await?
    .into_iter()
    .map(|p| ProductView::new(p, tier))
    .collect();

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "slides": slides,
    "best_sellers": best_sellers,
    "on_sale": on_sale,
  })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SlideInput {
  #[validate(length(min = 1, max = 120, message = "must be 1 to 120 characters"))]
  pub title: String,
  #[validate(length(max = 240, message = "must be at most 240 characters"))]
  pub subtitle: Option<String>,
  #[validate(url(message = "must be a URL"))]
  pub image_url: String,
  #[validate(url(message = "must be a URL"))]
  pub link_url: Option<String>,
  #[serde(default)]
  pub position: i32,
  #[serde(default = "active_by_default")]
  pub is_active: bool,
}

fn active_by_default() -> bool {
  true
}

#[derive(Debug, Deserialize, Validate)]
pub struct SlidePatch {
  #[validate(length(min = 1, max = 120, message = "must be 1 to 120 characters"))]
  pub title: Option<String>,
  #[validate(length(max = 240, message = "must be at most 240 characters"))]
  pub subtitle: Option<String>,
  #[validate(url(message = "must be a URL"))]
  pub image_url: Option<String>,
  #[validate(url(message = "must be a URL"))]
  pub link_url: Option<String>,
  pub position: Option<i32>,
  pub is_active: Option<bool>,
}

#[instrument(name = "handler::create_slide", skip(app_state, user, payload), fields(user_id = %user.user_id))]
pub async fn create_slide_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  payload: web::Json<SlideInput>,
) -> Result<HttpResponse, AppError> {
  user.require_role(EDITORS)?;
  let input = payload.into_inner();
  input.validate()?;

  let sql = format!(
    "INSERT INTO slides (title, subtitle, image_url, link_url, position, is_active) \
     VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
    SLIDE_COLUMNS
  );
  let slide = sqlx::query_as::<_, Slide>(&sql)
    .bind(&input.title)
    .bind(&input.subtitle)
    .bind(&input.image_url)
    .bind(&input.link_url)
    .bind(input.position)
    .bind(input.is_active)
    .fetch_one(&app_state.db_pool)
    .await?;
  info!(slide_id = %slide.id, "Slide created.");
  Ok(HttpResponse::Created().json(json!({ "success": true, "slide": slide })))
}

#[instrument(name = "handler::update_slide", skip(app_state, user, path, payload), fields(slide_id = %*path))]
pub async fn update_slide_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<SlidePatch>,
) -> Result<HttpResponse, AppError> {
  user.require_role(EDITORS)?;
  let slide_id = path.into_inner();
  let patch = payload.into_inner();
  patch.validate()?;

  let sql = format!(
    "UPDATE slides SET title = COALESCE($1, title), subtitle = COALESCE($2, subtitle), \
       image_url = COALESCE($3, image_url), link_url = COALESCE($4, link_url), \
       position = COALESCE($5, position), is_active = COALESCE($6, is_active) \
     WHERE id = $7 RETURNING {}",
    SLIDE_COLUMNS
  );
  let slide = sqlx::query_as::<_, Slide>(&sql)
    .bind(&patch.title)
    .bind(&patch.subtitle)
    .bind(&patch.image_url)
    .bind(&patch.link_url)
    .bind(patch.position)
    .bind(patch.is_active)
    .bind(slide_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Slide {} not found.", slide_id)))?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "slide": slide })))
}

#[instrument(name = "handler::delete_slide", skip(app_state, user, path), fields(slide_id = %*path))]
pub async fn delete_slide_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  user.require_role(EDITORS)?;
  let slide_id = path.into_inner();
  let result = sqlx::query("DELETE FROM slides WHERE id = $1")
    .bind(slide_id)
    .execute(&app_state.db_pool)
    .await?;
  if result.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("Slide {} not found.", slide_id)));
  }
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct BestSellersInput {
  pub product_ids: Vec<Uuid>,
}

/// Ranks follow list order, starting at 1.
pub fn rank_best_sellers(product_ids: &[Uuid]) -> Result<Vec<BestSeller>, AppError> {
  let mut seen = std::collections::HashSet::new();
  if let Some(dup) = product_ids.iter().find(|id| !seen.insert(**id)) {
    return Err(AppError::Validation(format!("Product {} is listed twice.", dup)));
  }
  Ok(
    product_ids
      .iter()
      .zip(1..)
      .map(|(id, rank)| BestSeller { product_id: *id, rank })
      .collect(),
  )
}

#[instrument(name = "handler::set_best_sellers", skip(app_state, user, payload), fields(user_id = %user.user_id))]
pub async fn set_best_sellers_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  payload: web::Json<BestSellersInput>,
) -> Result<HttpResponse, AppError> {
  user.require_role(EDITORS)?;
  let ranked = rank_best_sellers(&payload.product_ids)?;

  let mut tx = app_state.db_pool.begin().await?;
  sqlx::query("DELETE FROM best_sellers").execute(&mut *tx).await?;
  for entry in &ranked {
    sqlx::query("INSERT INTO best_sellers (product_id, rank) VALUES ($1, $2)")
      .bind(entry.product_id)
      .bind(entry.rank)
      .execute(&mut *tx)
      .await?;
  }
  tx.commit().await?;

  info!(count = ranked.len(), "Best-sellers replaced.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "best_sellers": ranked })))
}

fn ordered_window(input: &OnSaleInput) -> Result<(), ValidationError> {
  if input.starts_at < input.ends_at {
    Ok(())
  } else {
    Err(ValidationError::new("window").with_message("starts_at must be before ends_at".into()))
  }
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "ordered_window"))]
pub struct OnSaleInput {
  #[validate(range(min = 0, message = "must not be negative"))]
  pub sale_price_cents: i64,
  pub starts_at: DateTime<Utc>,
  pub ends_at: DateTime<Utc>,
}

#[instrument(name = "handler::put_on_sale", skip(app_state, user, path, payload), fields(product_id = %*path))]
pub async fn put_on_sale_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<OnSaleInput>,
) -> Result<HttpResponse, AppError> {
  user.require_role(EDITORS)?;
  let product_id = path.into_inner();
  let input = payload.into_inner();
  input.validate()?;

  let list_price: i64 = sqlx::query_scalar("SELECT price_cents FROM products WHERE id = $1")
    .bind(product_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product with ID {} not found.", product_id)))?;
  if input.sale_price_cents >= list_price {
    return Err(AppError::Validation(format!(
      "Sale price must be below the list price of {} cents.",
      list_price
    )));
  }

  let item = sqlx::query_as::<_, OnSaleItem>(
    "INSERT INTO on_sale_items (product_id, sale_price_cents, starts_at, ends_at) VALUES ($1, $2, $3, $4) \
     ON CONFLICT (product_id) DO UPDATE SET sale_price_cents = EXCLUDED.sale_price_cents, \
       starts_at = EXCLUDED.starts_at, ends_at = EXCLUDED.ends_at \
     RETURNING product_id, sale_price_cents, starts_at, ends_at",
  )
  .bind(product_id)
  .bind(input.sale_price_cents)
  .bind(input.starts_at)
  .bind(input.ends_at)
  .fetch_one(&app_state.db_pool)
  .await?;

  info!(%product_id, sale_price = item.sale_price_cents, "Product put on sale.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "on_sale": item })))
}

#[instrument(name = "handler::remove_on_sale", skip(app_state, user, path), fields(product_id = %*path))]
pub async fn remove_on_sale_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  user.require_role(EDITORS)?;
  let product_id = path.into_inner();
  let result = sqlx::query("DELETE FROM on_sale_items WHERE product_id = $1")
    .bind(product_id)
    .execute(&app_state.db_pool)
    .await?;
  if result.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("Product {} is not on sale.", product_id)));
  }
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn best_sellers_are_ranked_in_order() {
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let ranked = rank_best_sellers(&[a, b]).unwrap();
    assert_eq!((ranked[0].product_id, ranked[0].rank), (a, 1));
    assert_eq!((ranked[1].product_id, ranked[1].rank), (b, 2));
    assert!(matches!(rank_best_sellers(&[a, b, a]), Err(AppError::Validation(_))));
  }

  #[test]
  fn sale_window_must_be_ordered() {
    let now = Utc::now();
    let ok = OnSaleInput {
      sale_price_cents: 500,
      starts_at: now,
      ends_at: now + Duration::days(3),
    };
    assert!(ok.validate().is_ok());
    let backwards = OnSaleInput {
      sale_price_cents: 500,
      starts_at: now,
      ends_at: now - Duration::hours(1),
    };
    assert!(backwards.validate().is_err());
  }
}
