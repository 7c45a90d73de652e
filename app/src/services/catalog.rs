// storefront/src/services/catalog.rs

//! Product listing queries.

use crate::models::product::{ACTIVE_SALE_JOIN, PRODUCT_COLUMNS};
use crate::web::handlers::page_offset;
use serde::Deserialize;
use sqlx::{Postgres, QueryBuilder};
use validator::Validate;

pub const DEFAULT_PER_PAGE: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
  #[default]
  Newest,
  PriceAsc,
  PriceDesc,
  Name,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProductFilter {
  #[validate(length(max = 100, message = "must be at most 100 characters"))]
  pub q: Option<String>,
  pub category: Option<String>,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub min_price: Option<i64>,
  #[validate(range(min = 0, message = "must not be negative"))]
  pub max_price: Option<i64>,
  #[serde(default)]
  pub in_stock: bool,
  #[serde(default)]
  pub on_sale: bool,
  #[serde(default)]
  pub sort: ProductSort,
  #[validate(range(min = 1, max = 1000000, message = "must be between 1 and 1000000"))]
  pub page: Option<i64>,
  #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
  pub per_page: Option<i64>,
}

impl ProductFilter {
  pub fn page(&self) -> i64 {
    self.page.unwrap_or(1)
  }

  pub fn per_page(&self) -> i64 {
    self.per_page.unwrap_or(DEFAULT_PER_PAGE)
  }
}

const EFFECTIVE_PRICE: &str = "COALESCE(s.sale_price_cents, p.price_cents)";

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
  qb.push(" WHERE p.is_active = TRUE");

  if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
    let pattern = format!("%{}%", escape_like(q));
    qb.push(" AND (p.name ILIKE ")
      .push_bind(pattern.clone())
      .push(" OR p.description ILIKE ")
      .push_bind(pattern)
      .push(")");
  }
  if let Some(category) = filter.category.as_deref().filter(|c| !c.is_empty()) {
    qb.push(" AND p.category = ").push_bind(category.to_string());
  }
  if let Some(min) = filter.min_price {
    qb.push(format!(" AND {} >= ", EFFECTIVE_PRICE)).push_bind(min);
  }
  if let Some(max) = filter.max_price {
    qb.push(format!(" AND {} <= ", EFFECTIVE_PRICE)).push_bind(max);
  }
  if filter.in_stock {
    qb.push(" AND p.stock_quantity > 0");
  }
  if filter.on_sale {
    qb.push(" AND s.sale_price_cents IS NOT NULL");
  }
}

fn escape_like(raw: &str) -> String {
  raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// `SELECT` of one page of products with their active sale price.
pub fn list_query(filter: &ProductFilter) -> QueryBuilder<'static, Postgres> {
  let mut qb = QueryBuilder::new(format!(
    "SELECT {}, s.sale_price_cents FROM products p {}",
    PRODUCT_COLUMNS, ACTIVE_SALE_JOIN
  ));
  push_filters(&mut qb, filter);

  let order_by = match filter.sort {
    ProductSort::Newest => " ORDER BY p.created_at DESC, p.id".to_string(),
    ProductSort::PriceAsc => format!(" ORDER BY {} ASC, p.id", EFFECTIVE_PRICE),
    ProductSort::PriceDesc => format!(" ORDER BY {} DESC, p.id", EFFECTIVE_PRICE),
    ProductSort::Name => " ORDER BY p.name ASC, p.id".to_string(),
  };
  qb.push(order_by);

  let per_page = filter.per_page();
  qb.push(" LIMIT ").push_bind(per_page);
  qb.push(" OFFSET ").push_bind(page_offset(filter.page(), per_page));
  qb
}

/// Total matching rows for the same filter.
pub fn count_query(filter: &ProductFilter) -> QueryBuilder<'static, Postgres> {
  let mut qb = QueryBuilder::new(format!("SELECT COUNT(*) FROM products p {}", ACTIVE_SALE_JOIN));
  push_filters(&mut qb, filter);
  qb
}
