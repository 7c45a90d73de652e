// storefront/src/db.rs

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, instrument};

pub async fn connect(config: &AppConfig) -> Result<PgPool> {
  let pool = PgPoolOptions::new()
    .max_connections(config.database_max_connections)
    .acquire_timeout(Duration::from_secs(5))
    .connect(&config.database_url)
    .await?;
  info!(max_connections = config.database_max_connections, "Connected to the database.");
  Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
  sqlx::migrate!("./migrations")
    .run(pool)
    .await
    .map_err(|e| AppError::Internal(format!("Migration failed: {}", e)))?;
  info!("Database migrations applied.");
  Ok(())
}

pub(crate) struct DemoProduct {
  pub name: &'static str,
  pub slug: &'static str,
  pub category: &'static str,
  pub description: &'static str,
  pub price_cents: i64,
  pub stock_quantity: i32,
  /// (name, sku, price override, stock)
  pub variations: &'static [(&'static str, &'static str, Option<i64>, i32)],
}

pub(crate) const DEMO_CATALOG: &[DemoProduct] = &[
  DemoProduct {
    name: "Linen Shirt",
    slug: "linen-shirt",
    category: "apparel",
    description: "Breathable linen shirt with a relaxed fit.",
    price_cents: 4900,
    stock_quantity: 0,
    variations: &[
      ("Small", "LS-S", None, 12),
      ("Medium", "LS-M", None, 20),
      ("Large", "LS-L", Some(5400), 8),
    ],
  },
  DemoProduct {
    name: "Canvas Tote",
    slug: "canvas-tote",
    category: "accessories",
    description: "Heavy canvas tote with an inner pocket.",
    price_cents: 2500,
    stock_quantity: 40,
    variations: &[],
  },
  DemoProduct {
    name: "Ceramic Mug",
    slug: "ceramic-mug",
    category: "home",
    description: "Stoneware mug, 350 ml.",
    price_cents: 1800,
    stock_quantity: 3,
    variations: &[],
  },
  DemoProduct {
    name: "Desk Lamp",
    slug: "desk-lamp",
    category: "home",
    description: "Adjustable LED desk lamp.",
    price_cents: 8900,
    stock_quantity: 15,
    variations: &[("Black", "DL-BLK", None, 9), ("White", "DL-WHT", None, 6)],
  },
];

/// Inserts [`DEMO_CATALOG`]. Products whose slug already exists are left alone.
#[instrument(name = "db::seed_demo_catalog", skip(pool))]
pub async fn seed_demo_catalog(pool: &PgPool) -> Result<usize> {
  let mut tx = pool.begin().await?;
  let mut inserted = 0;
  for item in DEMO_CATALOG {
    let product_id: Option<uuid::Uuid> = sqlx::query_scalar(
      "INSERT INTO products (name, slug, description, category, price_cents, stock_quantity, is_active) \
       VALUES ($1, $2, $3, $4, $5, $6, TRUE) ON CONFLICT (slug) DO NOTHING RETURNING id",
    )
    .bind(item.name)
    .bind(item.slug)
    .bind(item.description)
    .bind(item.category)
    .bind(item.price_cents)
    .bind(item.stock_quantity)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(product_id) = product_id else { continue };
    for (name, sku, price_cents, stock) in item.variations {
      sqlx::query(
        "INSERT INTO variations (product_id, name, sku, price_cents, stock_quantity) \
         VALUES ($1, $2, $3, $4, $5) ON CONFLICT (sku) DO NOTHING",
      )
      .bind(product_id)
      .bind(*name)
      .bind(*sku)
      .bind(*price_cents)
      .bind(*stock)
      .execute(&mut *tx)
      .await?;
    }
    inserted += 1;
  }
  tx.commit().await?;
  info!(inserted, "Demo catalog seeded.");
  Ok(inserted)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn demo_catalog_is_consistent() {
    let slugs: HashSet<_> = DEMO_CATALOG.iter().map(|p| p.slug).collect();
    assert_eq!(slugs.len(), DEMO_CATALOG.len());

    let skus: Vec<_> = DEMO_CATALOG.iter().flat_map(|p| p.variations.iter().map(|v| v.1)).collect();
    let unique: HashSet<_> = skus.iter().collect();
    assert_eq!(unique.len(), skus.len());

    for p in DEMO_CATALOG {
      assert!(p.price_cents > 0, "{}", p.slug);
      assert!(p.slug.chars().all(|c| c.is_ascii_lowercase() || c == '-'), "{}", p.slug);
    }
  }
}
