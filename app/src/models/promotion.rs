// storefront/src/models/promotion.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Hero carousel entry on the storefront landing page.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Slide {
  pub id: Uuid,
  pub title: String,
  pub subtitle: Option<String>,
  pub image_url: String,
  pub link_url: Option<String>,
  pub position: i32,
  pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct BestSeller {
  pub product_id: Uuid,
  pub rank: i32,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OnSaleItem {
  pub product_id: Uuid,
  pub sale_price_cents: i64,
  pub starts_at: DateTime<Utc>,
  pub ends_at: DateTime<Utc>,
}

pub const SLIDE_COLUMNS: &str = "id, title, subtitle, image_url, link_url, position, is_active";
