// storefront/src/test_support.rs

//! Row fixtures for database-backed tests.

use crate::models::order::OrderStatus;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn insert_customer(pool: &PgPool) -> Uuid {
  let email = format!("buyer-{}@shop.test", Uuid::new_v4().simple());
  sqlx::query_scalar("INSERT INTO users (email, password_hash, name) VALUES ($1, 'x', 'Buyer') RETURNING id")
    .bind(email)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn insert_product(pool: &PgPool, price_cents: i64, stock: i32) -> Uuid {
  let slug = format!("item-{}", Uuid::new_v4().simple());
  sqlx::query_scalar(
    "INSERT INTO products (name, slug, description, category, price_cents, stock_quantity) \
     VALUES ('Test item', $1, '', 'test', $2, $3) RETURNING id",
  )
  .bind(slug)
  .bind(price_cents)
  .bind(stock)
  .fetch_one(pool)
  .await
  .unwrap()
}

pub async fn stock_of(pool: &PgPool, product_id: Uuid) -> i32 {
  sqlx::query_scalar("SELECT stock_quantity FROM products WHERE id = $1")
    .bind(product_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

pub async fn cart_quantity(pool: &PgPool, user_id: Uuid, product_id: Uuid) -> Option<i32> {
  sqlx::query_scalar("SELECT quantity FROM cart_items WHERE user_id = $1 AND product_id = $2")
    .bind(user_id)
    .bind(product_id)
    .fetch_optional(pool)
    .await
    .unwrap()
}

pub async fn put_in_cart(pool: &PgPool, user_id: Uuid, product_id: Uuid, quantity: i32) {
  sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)")
    .bind(user_id)
    .bind(product_id)
    .bind(quantity)
    .execute(pool)
    .await
    .unwrap();
}

/// One-line order in `status`, optionally bound to a payment intent.
pub async fn insert_order(
  pool: &PgPool,
  user_id: Uuid,
  product_id: Uuid,
  quantity: i32,
  status: OrderStatus,
  payment_intent_id: Option<&str>,
) -> Uuid {
  let order_id: Uuid = sqlx::query_scalar(
    "INSERT INTO orders (user_id, status, subtotal_cents, total_cents, currency, tier_at_purchase, payment_intent_id) \
     VALUES ($1, $2, 1000, 1000, 'usd', 'BRONZE', $3) RETURNING id",
  )
  .bind(user_id)
  .bind(status)
  .bind(payment_intent_id)
  .fetch_one(pool)
  .await
  .unwrap();
  sqlx::query(
    "INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price_cents) \
     VALUES ($1, $2, 'Test item', $3, 500)",
  )
  .bind(order_id)
  .bind(product_id)
  .bind(quantity)
  .execute(pool)
  .await
  .unwrap();
  order_id
}

pub async fn status_of(pool: &PgPool, order_id: Uuid) -> OrderStatus {
  sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
    .bind(order_id)
    .fetch_one(pool)
    .await
    .unwrap()
}
