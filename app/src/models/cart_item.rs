// storefront/src/models/cart_item.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One line of a user's cart. Unique per (user, product, variation).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CartItem {
  pub id: Uuid,
  pub user_id: Uuid,
  pub product_id: Uuid,
  pub variation_id: Option<Uuid>,
  pub quantity: i32,
  pub added_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Cart line joined with what pricing needs.
#[derive(Debug, Clone, FromRow)]
pub struct CartLineRow {
  pub item_id: Uuid,
  pub product_id: Uuid,
  pub variation_id: Option<Uuid>,
  pub product_name: String,
  pub variation_name: Option<String>,
  pub image_url: Option<String>,
  pub quantity: i32,
  /// Sale price, variation override or list price, in that order.
  pub unit_price_cents: i64,
  pub available_stock: i32,
  pub is_active: bool,
}

pub const CART_LINES_SQL: &str = r#"
  SELECT ci.id AS item_id,
         ci.product_id,
         ci.variation_id,
         p.name AS product_name,
         v.name AS variation_name,
         p.image_url,
         ci.quantity,
         COALESCE(s.sale_price_cents, v.price_cents, p.price_cents) AS unit_price_cents,
         COALESCE(v.stock_quantity, p.stock_quantity) AS available_stock,
         p.is_active
    FROM cart_items ci
    JOIN products p ON p.id = ci.product_id
    LEFT JOIN variations v ON v.id = ci.variation_id
    LEFT JOIN on_sale_items s
           ON s.product_id = p.id AND s.starts_at <= NOW() AND s.ends_at > NOW()
   WHERE ci.user_id = $1
   ORDER BY ci.added_at ASC
"#;
