// storefront/src/models/product.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  pub slug: String,
  pub description: Option<String>,
  pub category: String,
  pub price_cents: i64,
  pub stock_quantity: i32,
  pub image_url: Option<String>,
  pub is_active: bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Product row plus its currently active sale price, if any.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProductWithSale {
  #[sqlx(flatten)]
  #[serde(flatten)]
  pub product: Product,
  pub sale_price_cents: Option<i64>,
}

impl ProductWithSale {
  /// Active sale price if present, else list price.
  pub fn effective_price_cents(&self) -> i64 {
    self.sale_price_cents.unwrap_or(self.product.price_cents)
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Variation {
  pub id: Uuid,
  pub product_id: Uuid,
  pub name: String,
  pub sku: String,
  pub price_cents: Option<i64>,
  pub stock_quantity: i32,
}

pub const PRODUCT_COLUMNS: &str = "p.id, p.name, p.slug, p.description, p.category, p.price_cents, \
   p.stock_quantity, p.image_url, p.is_active, p.created_at, p.updated_at";

/// Join producing `sale_price_cents` for sales active right now.
pub const ACTIVE_SALE_JOIN: &str =
  "LEFT JOIN on_sale_items s ON s.product_id = p.id AND s.starts_at <= NOW() AND s.ends_at > NOW()";
