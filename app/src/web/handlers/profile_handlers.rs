// storefront/src/web/handlers/profile_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use validator::Validate;

use crate::errors::AppError;
use crate::models::user::{User, USER_COLUMNS};
use crate::pricing;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(name = "handler::me", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_me_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let sql = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
  let user = sqlx::query_as::<_, User>(&sql)
    .bind(auth_user.user_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::Auth("Account no longer exists.".to_string()))?;
  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "user": user,
    "discount_rate": pricing::rate(user.tier),
  })))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfilePatch {
  #[validate(length(min = 1, max = 80, message = "must be 1 to 80 characters"))]
  pub name: Option<String>,
  #[validate(url(message = "must be a URL"))]
  pub avatar_url: Option<String>,
  #[validate(url(message = "must be a URL"))]
  pub background_url: Option<String>,
}

#[instrument(name = "handler::update_me", skip(app_state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn update_me_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  payload: web::Json<ProfilePatch>,
) -> Result<HttpResponse, AppError> {
  let mut patch = payload.into_inner();
  patch.name = patch.name.map(|n| n.trim().to_string());
  patch.validate()?;

  let sql = format!(
    "UPDATE users SET name = COALESCE($1, name), avatar_url = COALESCE($2, avatar_url), \
       background_url = COALESCE($3, background_url), updated_at = NOW() \
     WHERE id = $4 RETURNING {}",
    USER_COLUMNS
  );
  let user = sqlx::query_as::<_, User>(&sql)
    .bind(&patch.name)
    .bind(&patch.avatar_url)
    .bind(&patch.background_url)
    .bind(auth_user.user_id)
    .fetch_optional(&app_state.db_pool)
    .await?
    .ok_or_else(|| AppError::Auth("Account no longer exists.".to_string()))?;
  info!("Profile updated.");
  Ok(HttpResponse::Ok().json(json!({ "success": true, "user": user })))
}
