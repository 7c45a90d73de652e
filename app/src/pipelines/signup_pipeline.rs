// storefront/src/pipelines/signup_pipeline.rs

use crate::errors::AppError;
use crate::models::user::{User, USER_COLUMNS};
use crate::pipelines::common_steps;
use crate::pipelines::contexts::SignupCtxData;
use crate::services::auth_service;
use shopflow::{ContextData, Pipeline, PipelineControl, Workflows};
use std::sync::Arc;
use tracing::{event, info, warn, Level};
use validator::Validate;

pub fn build_signup_pipeline() -> Pipeline<SignupCtxData, AppError> {
  let mut signup_p = Pipeline::<SignupCtxData, AppError>::new(&[
    ("validate_signup_input", false, None),
    ("check_existing_user_signup", false, None),
    ("create_user_in_db", false, None),
    ("send_welcome_email_signup", true, None),
  ]);

  signup_p.on_root("validate_signup_input", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let input = {
        let mut guard = ctx_data.write();
        guard.input.email = guard.input.email.trim().to_lowercase();
        guard.input.name = guard.input.name.trim().to_string();
        guard.input.clone()
      };
      event!(Level::DEBUG, email = %input.email, "Validating signup input.");
      input.validate()?;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signup_p.on_root("check_existing_user_signup", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (email, db_pool) = {
        let guard = ctx_data.read();
        (guard.input.email.clone(), guard.app_state.db_pool.clone())
      };

      let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&db_pool)
        .await?;
      if exists {
        warn!("Signup attempted with an existing email.");
        return Err(AppError::Conflict("An account with this email already exists.".to_string()));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signup_p.on_root("create_user_in_db", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (input, db_pool) = {
        let guard = ctx_data.read();
        (guard.input.clone(), guard.app_state.db_pool.clone())
      };

      let password_hash = auth_service::hash_password(&input.password)?;
      let sql = format!(
        "INSERT INTO users (email, password_hash, name) VALUES ($1, $2, $3) RETURNING {}",
        USER_COLUMNS
      );
      // A concurrent signup with the same email lands on the unique constraint -> Conflict.
      let user = sqlx::query_as::<_, User>(&sql)
        .bind(&input.email)
        .bind(password_hash)
        .bind(&input.name)
        .fetch_one(&db_pool)
        .await?;

      info!(user_id = %user.id, "User created.");
      ctx_data.write().created_user = Some(user);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signup_p.on_root("send_welcome_email_signup", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (app_state, user) = {
        let guard = ctx_data.read();
        (guard.app_state.clone(), guard.created_user.clone())
      };
      let Some(user) = user else {
        warn!("No created user in context; skipping welcome email.");
        return Ok::<_, AppError>(PipelineControl::Continue);
      };

      let (subject, html) = common_steps::welcome_message(&user.name);
      let sent = common_steps::notify(&app_state, &user.email, subject, html).await;
      ctx_data.write().welcome_email_sent = sent;
      Ok(PipelineControl::Continue)
    })
  });

  signup_p
}

pub fn register_signup_pipeline(workflows: &Arc<Workflows<AppError>>) {
  workflows.register_pipeline(build_signup_pipeline());
  tracing::info!("Sign-up pipeline registered.");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipelines::contexts::SignupInput;
  use crate::state::AppState;

  fn ctx(state: &AppState, email: &str, password: &str, name: &str) -> ContextData<SignupCtxData> {
    ContextData::new(SignupCtxData {
      app_state: state.clone(),
      input: SignupInput {
        email: email.into(),
        password: password.into(),
        name: name.into(),
      },
      created_user: None,
      welcome_email_sent: false,
    })
  }

  #[tokio::test]
  async fn invalid_input_fails_before_touching_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());

    for (email, password, name) in [
      ("not-an-email", "longenough", "Ada"),
      ("ada@example.test", "short", "Ada"),
      ("ada@example.test", "longenough", "   "),
    ] {
      let err = state.workflows.run(ctx(&state, email, password, name)).await.unwrap_err();
      assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
    }
  }

  #[test]
  fn steps_are_in_order() {
    assert_eq!(
      build_signup_pipeline().step_names(),
      vec![
        "validate_signup_input",
        "check_existing_user_signup",
        "create_user_in_db",
        "send_welcome_email_signup"
      ]
    );
  }
}
