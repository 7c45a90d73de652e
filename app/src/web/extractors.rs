// storefront/src/web/extractors.rs

use crate::errors::AppError;
use crate::models::user::Role;
use crate::services::auth_service;
use crate::state::AppState;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::{ready, Ready};
use tracing::warn;
use uuid::Uuid;

/// Caller identified by `Authorization: Bearer <session token>`.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub role: Role,
}

impl AuthenticatedUser {
  /// `Forbidden` unless the caller holds one of `allowed`. Admins always pass.
  pub fn require_role(&self, allowed: &[Role]) -> Result<(), AppError> {
    if self.role == Role::Admin || allowed.contains(&self.role) {
      Ok(())
    } else {
      warn!(user_id = %self.user_id, role = %self.role, "Role check failed.");
      Err(AppError::Forbidden("You do not have access to this resource.".to_string()))
    }
  }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
  req
    .headers()
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Bearer ")
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

fn authenticate(req: &HttpRequest, token: &str) -> Result<AuthenticatedUser, AppError> {
  let state = req
    .app_data::<web::Data<AppState>>()
    .ok_or_else(|| AppError::Internal("Application state not configured.".to_string()))?;
  let claims = auth_service::validate_session_token(token, &state.config.jwt_secret)?;
  Ok(AuthenticatedUser {
    user_id: claims.user_id()?,
    role: claims.role,
  })
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = match bearer_token(req) {
      Some(token) => authenticate(req, token),
      None => Err(AppError::Auth("Sign in to continue.".to_string())),
    };
    ready(result)
  }
}

/// Like [`AuthenticatedUser`] but anonymous callers get `None`. A present but
/// invalid token is still an error.
#[derive(Debug, Clone, Copy)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

impl FromRequest for MaybeUser {
  type Error = AppError;
  type Future = Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let result = match bearer_token(req) {
      Some(token) => authenticate(req, token).map(|u| MaybeUser(Some(u))),
      None => Ok(MaybeUser(None)),
    };
    ready(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::test::TestRequest;

  fn state() -> (tempfile::TempDir, AppState) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    (dir, state)
  }

  fn token_for(state: &AppState, role: Role) -> (Uuid, String) {
    let id = Uuid::new_v4();
    let token = auth_service::issue_session_token(id, role, &state.config.jwt_secret, 1).unwrap();
    (id, token)
  }

  #[actix_web::test]
  async fn bearer_token_identifies_the_caller() {
    let (_dir, state) = state();
    let (id, token) = token_for(&state, Role::Manager);
    let req = TestRequest::default()
      .app_data(web::Data::new(state))
      .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
      .to_http_request();

    let user = AuthenticatedUser::extract(&req).await.unwrap();
    assert_eq!(user.user_id, id);
    assert_eq!(user.role, Role::Manager);
  }

  #[actix_web::test]
  async fn missing_or_bad_tokens_are_auth_errors() {
    let (_dir, state) = state();
    let data = web::Data::new(state);

    let req = TestRequest::default().app_data(data.clone()).to_http_request();
    assert!(matches!(AuthenticatedUser::extract(&req).await, Err(AppError::Auth(_))));

    let req = TestRequest::default()
      .app_data(data)
      .insert_header((header::AUTHORIZATION, "Bearer not-a-jwt"))
      .to_http_request();
    assert!(matches!(AuthenticatedUser::extract(&req).await, Err(AppError::Auth(_))));
  }

  #[actix_web::test]
  async fn maybe_user_is_none_without_a_header() {
    let (_dir, state) = state();
    let req = TestRequest::default().app_data(web::Data::new(state)).to_http_request();
    assert!(MaybeUser::extract(&req).await.unwrap().0.is_none());
  }

  #[test]
  fn admin_passes_every_role_check() {
    let admin = AuthenticatedUser {
      user_id: Uuid::new_v4(),
      role: Role::Admin,
    };
    let editor = AuthenticatedUser {
      user_id: Uuid::new_v4(),
      role: Role::Editor,
    };
    assert!(admin.require_role(&[Role::Editor]).is_ok());
    assert!(editor.require_role(&[Role::Editor]).is_ok());
    assert!(matches!(
      editor.require_role(&[Role::Manager]),
      Err(AppError::Forbidden(_))
    ));
  }
}
