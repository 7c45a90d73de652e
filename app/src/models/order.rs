// storefront/src/models/order.rs

use crate::models::user::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Paid,
  Failed,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Paid => "paid",
      OrderStatus::Failed => "failed",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }

  /// pending -> paid | failed | cancelled, paid -> shipped | cancelled, shipped -> delivered.
  pub fn can_transition_to(&self, next: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
      (self, next),
      (Pending, Paid) | (Pending, Failed) | (Pending, Cancelled) | (Paid, Shipped) | (Paid, Cancelled) | (Shipped, Delivered)
    )
  }

  /// Payment has been captured for this order.
  pub fn is_settled(&self) -> bool {
    matches!(self, OrderStatus::Paid | OrderStatus::Shipped | OrderStatus::Delivered)
  }

  pub fn is_terminal_failure(&self) -> bool {
    matches!(self, OrderStatus::Failed | OrderStatus::Cancelled)
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub status: OrderStatus,
  pub subtotal_cents: i64,
  pub discount_cents: i64,
  pub total_cents: i64,
  pub currency: String,
  pub tier_at_purchase: Tier,
  pub payment_intent_id: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

pub const ORDER_COLUMNS: &str = "id, user_id, status, subtotal_cents, discount_cents, total_cents, currency, \
   tier_at_purchase, payment_intent_id, created_at, updated_at";
