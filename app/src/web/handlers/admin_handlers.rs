// storefront/src/web/handlers/admin_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use sqlx::{Postgres, QueryBuilder};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::errors::AppError;
use crate::models::user::{Role, Tier, User, USER_COLUMNS};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;
use crate::web::handlers::Paging;

#[derive(Debug, Deserialize, Validate)]
pub struct UserListQuery {
  pub role: Option<Role>,
  #[validate(range(min = 1, max = 1000000, message = "must be between 1 and 1000000"))]
  pub page: Option<i64>,
  #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
  pub per_page: Option<i64>,
}

#[instrument(name = "handler::admin_users", skip(app_state, auth_user, query), fields(user_id = %auth_user.user_id))]
pub async fn list_users_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  query: web::Query<UserListQuery>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  query.validate()?;
  let paging = Paging::from((query.page, query.per_page));

  let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM users", USER_COLUMNS));
  let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM users");
  if let Some(role) = query.role {
    qb.push(" WHERE role = ").push_bind(role);
    count.push(" WHERE role = ").push_bind(role);
  }
  qb.push(" ORDER BY created_at DESC LIMIT ")
    .push_bind(paging.limit())
    .push(" OFFSET ")
    .push_bind(paging.offset());

  let users: Vec<User> = qb.build_query_as().fetch_all(&app_state.db_pool).await?;
  let total: i64 = count.build_query_scalar().fetch_one(&app_state.db_pool).await?;
  Ok(HttpResponse::Ok().json(json!({ "success": true, "users": users, "total": total })))
}

#[derive(Debug, Deserialize)]
pub struct UserAccessPatch {
  pub role: Option<Role>,
  pub tier: Option<Tier>,
}

#[instrument(name = "handler::admin_update_user", skip(app_state, auth_user, path, payload), fields(target = %*path))]
pub async fn update_user_access_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<UserAccessPatch>,
) -> Result<HttpResponse, AppError> {
  auth_user.require_role(&[Role::Admin])?;
  let target = path.into_inner();
  let patch = payload.into_inner();
  if patch.role.is_none() && patch.tier.is_none() {
    return Err(AppError::Validation("Provide a role or a tier.".to_string()));
  }
  if target == auth_user.user_id && patch.role.is_some_and(|r| r != Role::Admin) {
    return Err(AppError::Validation("Admins cannot demote themselves.".to_string()));
  }

  let sql = format!(
    "UPDATE users SET role = COALESCE($1, role), tier = COALESCE($2, tier), updated_at = NOW() \
     WHERE id = $3 RETURNING {}",
    USER_COLUMNS
  );
  let user = sqlx::query_as::<_, User>(&sql)
    .bind(patch.role)
    .bind(patch.tier)
    .bind(target)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {} not found.", target)))?;

  info!(user_id = %user.id, role = %user.role, tier = %user.tier, "User access updated.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "user": user })))
}
