// storefront/src/web/handlers/dashboard_handlers.rs

//! One summary per role.

use actix_web::{web, HttpResponse};
use serde::Serialize;
use serde_json::json;
use sqlx::FromRow;
use tracing::instrument;

use crate::errors::AppError;
use crate::models::order::{Order, OrderStatus, ORDER_COLUMNS};
use crate::models::product::Product;
use crate::models::user::{Role, User, USER_COLUMNS};
use crate::pricing;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

pub const LOW_STOCK_THRESHOLD: i32 = 5;
const RECENT_ORDERS: i64 = 5;

#[derive(Debug, Serialize, FromRow)]
struct RoleCount {
  role: Role,
  count: i64,
}

#[derive(Debug, Serialize, FromRow)]
struct StatusCount {
  status: OrderStatus,
  count: i64,
}

#[instrument(name = "handler::customer_dashboard", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn customer_dashboard_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let pool = &app_state.db_pool;
  let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
  let user = sqlx::query_as::<_, User>(&sql)
    .bind(auth_user.user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Auth("Account no longer exists.".to_string()))?;

  let order_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
    .bind(user.id)
    .fetch_one(pool)
    .await?;
  let sql = format!(
    "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    ORDER_COLUMNS
  );
  let recent_orders = sqlx::query_as::<_, Order>(&sql)
    .bind(user.id)
    .bind(RECENT_ORDERS)
    .fetch_all(pool)
    .await?;
  let open_tickets: i64 =
    sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE user_id = $1 AND status <> 'closed'")
      .bind(user.id)
      .fetch_one(pool)
      .await?;

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "profile": user,
    "tier": user.tier,
    "discount_rate": pricing::rate(user.tier),
    "order_count": order_count,
    "recent_orders": recent_orders,
    "open_tickets": open_tickets,
  })))
}

#[instrument(name = "handler::manager_dashboard", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn manager_dashboard_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Manager])?;
  let pool = &app_state.db_pool;

  let awaiting_shipment: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE status = 'paid'")
    .fetch_one(pool)
    .await?;
  let open_tickets: i64 =
    sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status IN ('open', 'in_progress')")
      .fetch_one(pool)
      .await?;
  let low_stock = sqlx::query_as::<_, Product>(
    "SELECT id, name, slug, description, category, price_cents, stock_quantity, image_url, is_active, \
     created_at, updated_at FROM products WHERE is_active = TRUE AND stock_quantity < $1 \
     ORDER BY stock_quantity ASC, name",
  )
  .bind(LOW_STOCK_THRESHOLD)
  .fetch_all(pool)
  .await?;

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "orders_awaiting_shipment": awaiting_shipment,
    "open_tickets": open_tickets,
    "low_stock_threshold": LOW_STOCK_THRESHOLD,
    "low_stock": low_stock,
  })))
}

#[instrument(name = "handler::editor_dashboard", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn editor_dashboard_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Editor])?;
  let (slides, active_slides, best_sellers, on_sale): (i64, i64, i64, i64) = sqlx::query_as(
    "SELECT (SELECT COUNT(*) FROM slides), \
            (SELECT COUNT(*) FROM slides WHERE is_active = TRUE), \
            (SELECT COUNT(*) FROM best_sellers), \
            (SELECT COUNT(*) FROM on_sale_items WHERE starts_at <= NOW() AND ends_at > NOW())",
  )
  .fetch_one(&app_state.db_pool)
  .await?;

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "slides": slides,
    "active_slides": active_slides,
    "best_sellers": best_sellers,
    "on_sale_now": on_sale,
  })))
}

#[instrument(name = "handler::admin_dashboard", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn admin_dashboard_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let pool = &app_state.db_pool;

  let users_by_role = sqlx::query_as::<_, RoleCount>(
    "SELECT role, COUNT(*) AS count FROM users GROUP BY role ORDER BY role",
  )
  .fetch_all(pool)
  .await?;
  let orders_by_status = sqlx::query_as::<_, StatusCount>(
    "SELECT status, COUNT(*) AS count FROM orders GROUP BY status ORDER BY status",
  )
  .fetch_all(pool)
  .await?;
  let revenue_cents: i64 = sqlx::query_scalar(
    "SELECT COALESCE(SUM(total_cents), 0)::BIGINT FROM orders WHERE status IN ('paid', 'shipped', 'delivered')",
  )
  .fetch_one(pool)
  .await?;
  let open_tickets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE status <> 'closed'")
    .fetch_one(pool)
    .await?;

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "users_by_role": users_by_role,
    "orders_by_status": orders_by_status,
    "revenue_cents": revenue_cents,
    "revenue": pricing::format_cents(revenue_cents),
    "open_tickets": open_tickets,
  })))
}
