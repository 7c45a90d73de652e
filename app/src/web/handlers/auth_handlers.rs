// storefront/src/web/handlers/auth_handlers.rs

use actix_web::{web, HttpResponse};
use serde_json::json;
use shopflow::ContextData;
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::pipelines::contexts::{SigninCtxData, SigninInput, SignupCtxData, SignupInput};
use crate::state::AppState;
use crate::web::handlers::ensure_completed;

#[instrument(name = "handler::signup", skip(app_state, req_payload))]
pub async fn signup_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<SignupInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(SignupCtxData {
    app_state: app_state.get_ref().clone(),
    input: req_payload.into_inner(),
    created_user: None,
    welcome_email_sent: false,
  });

  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    warn!(error = %e, "Signup failed.");
    e
  })?;
  ensure_completed(result)?;

  let guard = ctx.read();
  let user = guard
    .created_user
    .as_ref()
    .ok_or_else(|| AppError::Internal("Signup completed without creating a user.".to_string()))?;
  info!(user_id = %user.id, welcome_email_sent = guard.welcome_email_sent, "Signup successful.");

  Ok(HttpResponse::Created().json(json!({
    "success": true,
    "user": user,
    "welcome_email_sent": guard.welcome_email_sent,
  })))
}

#[instrument(name = "handler::signin", skip(app_state, req_payload))]
pub async fn signin_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<SigninInput>,
) -> Result<HttpResponse, AppError> {
  let ctx = ContextData::new(SigninCtxData {
    app_state: app_state.get_ref().clone(),
    input: req_payload.into_inner(),
    user: None,
    session_token: None,
  });

  let result = app_state.workflows.run(ctx.clone()).await.map_err(|e| {
    warn!(error = %e, "Signin failed.");
    e
  })?;
  ensure_completed(result)?;

  let guard = ctx.read();
  let (user, token) = match (guard.user.as_ref(), guard.session_token.as_ref()) {
    (Some(user), Some(token)) => (user, token),
    _ => return Err(AppError::Internal("Signin completed without a session.".to_string())),
  };
  info!(user_id = %user.id, "Signin successful.");

  Ok(HttpResponse::Ok().json(json!({
    "success": true,
    "token": token,
    "expires_in_hours": app_state.config.session_ttl_hours,
    "user": user,
  })))
}
