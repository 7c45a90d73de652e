// storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::order::{Order, OrderStatus, ORDER_COLUMNS};
use crate::models::user::Role;
use crate::services::orders;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use crate::web::handlers::Paging;

#[instrument(name = "handler::my_orders", skip(app_state, auth_user, paging), fields(user_id = %auth_user.user_id))]
pub async fn list_my_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  paging: web::Query<Paging>,
) -> Result<HttpResponse, AppError> {
  paging.validate()?;
  let sql = format!(
    "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    ORDER_COLUMNS
  );
  let orders = sqlx::query_as::<_, Order>(&sql)
    .bind(auth_user.user_id)
    .bind(paging.limit())
    .bind(paging.offset())
    .fetch_all(&app_state.db_pool)
    .await?;
  let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE user_id = $1")
    .bind(auth_user.user_id)
    .fetch_one(&app_state.db_pool)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "orders": orders, "total": total })))
}

#[instrument(name = "handler::order_detail", skip(app_state, auth_user, path), fields(order_id = %*path))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order_id = path.into_inner();
  let order = orders::find_by_id(&app_state.db_pool, order_id)
    .await?
    .filter(|o| o.user_id == auth_user.user_id || auth_user.role.is_staff())
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
  let items = orders::items_of(&app_state.db_pool, order_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "order": order, "items": items })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct OrderListQuery {
  pub status: Option<OrderStatus>,
  #[validate(range(min = 1, max = 1000000, message = "must be between 1 and 1000000"))]
  pub page: Option<i64>,
  #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
  pub per_page: Option<i64>,
}

#[instrument(name = "handler::manage_orders", skip(app_state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn list_all_orders_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  query: web::Query<OrderListQuery>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Manager])?;
  query.validate()?;
  let paging = Paging::from((query.page, query.per_page));

  let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM orders", ORDER_COLUMNS));
  let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM orders");
  if let Some(status) = query.status {
    qb.push(" WHERE status = ").push_bind(status);
    count.push(" WHERE status = ").push_bind(status);
  }
  qb.push(" ORDER BY created_at DESC LIMIT ")
    .push_bind(paging.limit())
    .push(" OFFSET ")
    .push_bind(paging.offset());

  let orders: Vec<Order> = qb.build_query_as().fetch_all(&app_state.db_pool).await?;
  let total: i64 = count.build_query_scalar().fetch_one(&app_state.db_pool).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "orders": orders, "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct StatusChange<S> {
  pub status: S,
}

#[instrument(name = "handler::set_order_status", skip(app_state, auth_user, path, payload), fields(order_id = %*path))]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<StatusChange<OrderStatus>>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Manager])?;
  let order = orders::change_status(&app_state, path.into_inner(), payload.status).await?;
  info!(order_id = %order.id, status = %order.status, by = %auth_user.user_id, "Order status changed.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "order": order })))
}
