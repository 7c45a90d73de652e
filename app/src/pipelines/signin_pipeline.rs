// storefront/src/pipelines/signin_pipeline.rs

use crate::errors::AppError;
use crate::models::user::{User, USER_COLUMNS};
use crate::pipelines::contexts::SigninCtxData;
use crate::services::auth_service;
use shopflow::{ContextData, Pipeline, PipelineControl, Workflows};
use std::sync::Arc;
use tracing::{event, warn, Level};
use validator::Validate;

const BAD_CREDENTIALS: &str = "Invalid email or password.";

pub fn build_signin_pipeline() -> Pipeline<SigninCtxData, AppError> {
  let mut signin_p = Pipeline::<SigninCtxData, AppError>::new(&[
    ("validate_signin_input", false, None),
    ("fetch_user_by_email_signin", false, None),
    ("verify_user_password_signin", false, None),
    ("issue_session_token_signin", false, None),
  ]);

  signin_p.on_root("validate_signin_input", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let input = {
        let mut guard = ctx_data.write();
        guard.input.email = guard.input.email.trim().to_lowercase();
        guard.input.clone()
      };
      input.validate()?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signin_p.on_root("fetch_user_by_email_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (email, db_pool) = {
        let guard = ctx_data.read();
        (guard.input.email.clone(), guard.app_state.db_pool.clone())
      };

      let sql = format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS);
      let user = sqlx::query_as::<_, User>(&sql)
        .bind(&email)
        .fetch_optional(&db_pool)
        .await?;

      match user {
        Some(user) => {
          event!(Level::DEBUG, user_id = %user.id, "User found for signin.");
          ctx_data.write().user = Some(user);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        None => {
          warn!("Signin for unknown email.");
          Err(AppError::Auth(BAD_CREDENTIALS.to_string()))
        }
      }
    })
  });

  signin_p.on_root("verify_user_password_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (hash, password) = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("User missing before password check.".to_string()))?;
        (user.password_hash.clone(), guard.input.password.clone())
      };

      // Argon2 is CPU-bound; keep it off the async workers.
      let matches = tokio::task::spawn_blocking(move || auth_service::verify_password(&hash, &password))
        .await
        .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))??;

      if !matches {
        warn!("Signin with a wrong password.");
        return Err(AppError::Auth(BAD_CREDENTIALS.to_string()));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signin_p.on_root("issue_session_token_signin", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let token = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("User missing before token issue.".to_string()))?;
        let config = &guard.app_state.config;
        auth_service::issue_session_token(user.id, user.role, &config.jwt_secret, config.session_ttl_hours)?
      };
      ctx_data.write().session_token = Some(token);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signin_p
}

pub fn register_signin_pipeline(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_signin_pipeline());
  tracing::info!("Sign-in pipeline registered.");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipelines::contexts::SigninInput;
  use crate::state::AppState;

  #[tokio::test]
  async fn malformed_email_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    let ctx = ContextData::new(SigninCtxData {
      app_state: state.clone(),
      input: SigninInput {
        email: "nobody".into(),
        password: "whatever".into(),
      },
      user: None,
      session_token: None,
    });
    let err = state.workflows.run(ctx).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
  }
}
