// storefront/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::errors::AppError;
use crate::models::product::{Product, ProductWithSale, Variation, ACTIVE_SALE_JOIN, PRODUCT_COLUMNS};
use crate::models::user::{Role, Tier};
use crate::pricing;
use crate::services::catalog::{self, ProductFilter};
use crate::state::AppState;
use crate::web::extractors::{AuthenticatedUser, MaybeUser};
use crate::web::handlers::caller_tier;

const PRODUCT_RETURNING: &str =
  "id, name, slug, description, category, price_cents, stock_quantity, image_url, is_active, created_at, updated_at";
const VARIATION_COLUMNS: &str = "id, product_id, name, sku, price_cents, stock_quantity";

/// Product as shown to a shopper of a given tier.
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
  #[serde(flatten)]
  pub item: ProductWithSale,
  pub display_price_cents: i64,
  pub display_price: String,
}

impl ProductView {
  pub fn new(item: ProductWithSale, tier: Tier) -> Self {
    let display_price_cents = pricing::discounted_cents(item.effective_price_cents(), tier);
    Self {
      item,
      display_price_cents,
      display_price: pricing::format_cents(display_price_cents),
    }
  }
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
  let ok = !slug.is_empty()
    && !slug.starts_with('-')
    && !slug.ends_with('-')
    && slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
  if ok {
    Ok(())
  } else {
    Err(ValidationError::new("slug").with_message("must be lowercase letters, digits and inner hyphens".into()))
  }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductInput {
  #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
  pub name: String,
  #[validate(length(max = 200, message = "must be at most 200 characters"), custom(function = "validate_slug"))]
  pub slug: String,
  pub description: Option<String>,
  #[validate(length(min = 1, max = 80, message = "must be 1 to 80 characters"))]
  pub category: String,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub price_cents: i64,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub stock_quantity: i32,
  #[validate(url(message = "must be a URL"))]
  pub image_url: Option<String>,
  pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductPatch {
  #[validate(length(min = 1, max = 200, message = "must be 1 to 200 characters"))]
  pub name: Option<String>,
  #[validate(custom(function = "validate_slug"))]
  pub slug: Option<String>,
  pub description: Option<String>,
  #[validate(length(min = 1, max = 80, message = "must be 1 to 80 characters"))]
  pub category: Option<String>,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub price_cents: Option<i64>,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub stock_quantity: Option<i32>,
  #[validate(url(message = "must be a URL"))]
  pub image_url: Option<String>,
  pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VariationInput {
  #[validate(length(min = 1, max = 120, message = "must be 1 to 120 characters"))]
  pub name: String,
  #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
  pub sku: String,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub price_cents: Option<i64>,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub stock_quantity: i32,
}

#[instrument(name = "handler::list_products", skip(app_state, caller, query))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  caller: MaybeUser,
  query: web::Query<ProductFilter>,
) -> Result<HttpResponse, AppError> {
  let filter = query.into_inner();
  filter.validate()?;
  let tier = caller_tier(&app_state.db_pool, &caller).await?;

  let rows: Vec<ProductWithSale> = catalog::list_query(&filter)
    .build_query_as()
    .fetch_all(&app_state.db_pool)
    .await?;
  let total: i64 = catalog::count_query(&filter)
    .build_query_scalar()
    .fetch_one(&app_state.db_pool)
    .await?;
  info!(count = rows.len(), total, %tier, "Products listed.");

  let products: Vec<ProductView> = rows.into_iter().map(|p| ProductView::new(p, tier)).collect();
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "products": products,
    "total": total,
    "page": filter.page(),
    "per_page": filter.per_page(),
  })))
}

#[instrument(name = "handler::get_product", skip(app_state, caller, path), fields(product_id = %*path))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  caller: MaybeUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product_id = path.into_inner();
  let is_staff = caller.0.map(|u| u.role.is_staff()).unwrap_or(false);

  let sql = format!(
    "SELECT {}, s.sale_price_cents FROM products p {} WHERE p.id = $1",
    PRODUCT_COLUMNS, ACTIVE_SALE_JOIN
  );
  let product = sqlx::query_as::<_, ProductWithSale>(&sql)
    .bind(product_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .filter(|p| p.product.is_active || is_staff)
    .ok_or_else(|| {
      warn!(%product_id, "Product not found.");
      AppError::NotFound(format!("Product with ID {} not found.", product_id))
    })?;

  let sql = format!("SELECT {} FROM variations WHERE product_id = $1 ORDER BY name", VARIATION_COLUMNS);
  let variations = sqlx::query_as::<_, Variation>(&sql)
    .bind(product_id)
    .fetch_all(&app_state.db_pool)
    .await?;

  let tier = caller_tier(&app_state.db_pool, &caller).await?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "product": ProductView::new(product, tier),
    "variations": variations,
  })))
}

#[instrument(name = "handler::list_categories", skip(app_state))]
pub async fn list_categories_handler(app_state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
  let categories: Vec<String> =
    sqlx::query_scalar("SELECT DISTINCT category FROM products WHERE is_active = TRUE ORDER BY category")
      .fetch_all(&app_state.db_pool)
      .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "categories": categories })))
}

#[instrument(name = "handler::create_product", skip(app_state, user, payload), fields(user_id = %user.user_id))]
pub async fn create_product_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  payload: web::Json<ProductInput>,
) -> Result<HttpResponse, AppError> {
  user.require_role(&[Role::Manager])?;
  let input = payload.into_inner();
  input.validate()?;

  let sql = format!(
    "INSERT INTO products (name, slug, description, category, price_cents, stock_quantity, image_url, is_active) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
    PRODUCT_RETURNING
  );
  let product = sqlx::query_as::<_, Product>(&sql)
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(&input.category)
    .bind(input.price_cents)
    .bind(input.stock_quantity)
    .bind(&input.image_url)
    .bind(input.is_active.unwrap_or(true))
    .fetch_one(&app_state.db_pool)
    .await?;

  info!(product_id = %product.id, slug = %product.slug, "Product created.");
  Ok(HttpResponse::Created().json(json!({ "success": true, "product": product })))
}

#[instrument(name = "handler::update_product", skip(app_state, user, path, payload), fields(product_id = %*path))]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<ProductPatch>,
) -> Result<HttpResponse, AppError> {
  user.require_role(&[Role::Manager])?;
  let product_id = path.into_inner();
  let patch = payload.into_inner();
  patch.validate()?;

  let sql = format!(
    "UPDATE products SET \
       name = COALESCE($1, name), slug = COALESCE($2, slug), description = COALESCE($3, description), \
       category = COALESCE($4, category), price_cents = COALESCE($5, price_cents), \
       stock_quantity = COALESCE($6, stock_quantity), image_url = COALESCE($7, image_url), \
       is_active = COALESCE($8, is_active), updated_at = NOW() \
     WHERE id = $9 RETURNING {}",
    PRODUCT_RETURNING
  );
  let product = sqlx::query_as::<_, Product>(&sql)
    .bind(&patch.name)
    .bind(&patch.slug)
    .bind(&patch.description)
    .bind(&patch.category)
    .bind(patch.price_cents)
    .bind(patch.stock_quantity)
    .bind(&patch.image_url)
    .bind(patch.is_active)
    .bind(product_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product with ID {} not found.", product_id)))?;

  info!(%product_id, "Product updated.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "product": product })))
}

#[instrument(name = "handler::delete_product", skip(app_state, user, path), fields(product_id = %*path))]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  user.require_role(&[Role::Manager])?;
  let product_id = path.into_inner();

  let result = sqlx::query("DELETE FROM products WHERE id = $1")
    .bind(product_id)
    .execute(&app_state.db_pool)
    .await
    .map_err(|e| match AppError::from(e) {
      // Ordered products stay for order history.
      AppError::Validation(_) => {
        AppError::Validation("This product appears in orders; deactivate it instead.".to_string())
      }
      other => other,
    })?;
  if result.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("Product with ID {} not found.", product_id)));
  }

  info!(%product_id, "Product deleted.");
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[instrument(name = "handler::add_variation", skip(app_state, user, path, payload), fields(product_id = %*path))]
pub async fn add_variation_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<VariationInput>,
) -> Result<HttpResponse, AppError> {
  user.require_role(&[Role::Manager])?;
  let product_id = path.into_inner();
  let input = payload.into_inner();
  input.validate()?;

  let sql = format!(
    "INSERT INTO variations (product_id, name, sku, price_cents, stock_quantity) \
     VALUES ($1, $2, $3, $4, $5) RETURNING {}",
    VARIATION_COLUMNS
  );
  // A missing product surfaces as a foreign-key violation.
  let variation = sqlx::query_as::<_, Variation>(&sql)
    .bind(product_id)
    .bind(&input.name)
    .bind(&input.sku)
    .bind(input.price_cents)
    .bind(input.stock_quantity)
    .fetch_one(&app_state.db_pool)
    .await?;

  info!(variation_id = %variation.id, sku = %variation.sku, "Variation added.");
  Ok(HttpResponse::Created().json(json!({ "success": true, "variation": variation })))
}

#[instrument(name = "handler::delete_variation", skip(app_state, user, path))]
pub async fn delete_variation_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
  user.require_role(&[Role::Manager])?;
  let (product_id, variation_id) = path.into_inner();

  let result = sqlx::query("DELETE FROM variations WHERE id = $1 AND product_id = $2")
    .bind(variation_id)
    .bind(product_id)
    .execute(&app_state.db_pool)
    .await?;
  if result.rows_affected() == 0 {
    return Err(AppError::NotFound(format!("Variation {} not found.", variation_id)));
  }
  Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  fn product(price_cents: i64, sale: Option<i64>) -> ProductWithSale {
    ProductWithSale {
      product: Product {
        id: Uuid::new_v4(),
        name: "Lamp".into(),
        slug: "lamp".into(),
        description: None,
        category: "home".into(),
        price_cents,
        stock_quantity: 3,
        image_url: None,
        is_active: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
      },
      sale_price_cents: sale,
    }
  }

  #[test]
  fn display_price_discounts_the_effective_price() {
    let view = ProductView::new(product(100_000, None), Tier::Gold);
    assert_eq!(view.display_price_cents, 90_000);
    assert_eq!(view.display_price, "900.00");

    let view = ProductView::new(product(30_000, Some(25_000)), Tier::Platinum);
    assert_eq!(view.display_price_cents, 21_250);
    assert_eq!(view.display_price, "212.50");
  }

  #[test]
  fn view_serializes_flat() {
    let value = serde_json::to_value(ProductView::new(product(1_000, None), Tier::Bronze)).unwrap();
    assert_eq!(value["price_cents"], 1_000);
    assert_eq!(value["display_price_cents"], 1_000);
    assert!(value["sale_price_cents"].is_null());
  }

  #[test]
  fn slug_rules() {
    assert!(validate_slug("desk-lamp-2").is_ok());
    for bad in ["", "-lamp", "lamp-", "Desk", "desk lamp", "desk_lamp"] {
      assert!(validate_slug(bad).is_err(), "{}", bad);
    }
  }
}
