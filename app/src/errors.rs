// storefront/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use shopflow::FlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Conflict: {0}")]
  Conflict(String),

  #[error("Payment Processing Error: {0}")]
  Payment(String),

  #[error("Storage Error: {0}")]
  Storage(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(sqlx::Error),

  #[error("Upstream Service Error: {0}")]
  Upstream(String),

  #[error("Workflow Error: {source}")]
  Workflow {
    #[from]
    source: FlowError,
  },

  #[error("Internal Server Error: {0}")]
  Internal(String),

  #[error("Pipeline execution was halted at step '{0}'.")]
  PipelineHalted(String),
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for AppError {
  fn from(err: sqlx::Error) -> Self {
    if let sqlx::Error::Database(db_err) = &err {
      match db_err.code().as_deref() {
        Some(UNIQUE_VIOLATION) => return AppError::Conflict(unique_violation_message(db_err.constraint())),
        Some(FOREIGN_KEY_VIOLATION) => {
          return AppError::Validation("Referenced record does not exist.".to_string());
        }
        _ => {}
      }
    }
    AppError::Sqlx(err)
  }
}

/// User-facing text for a unique violation, keyed by constraint name.
fn unique_violation_message(constraint: Option<&str>) -> String {
  match constraint {
    Some("users_email_key") => "An account with this email already exists.".to_string(),
    Some("products_slug_key") => "A product with this slug already exists.".to_string(),
    Some("variations_sku_key") => "A variation with this SKU already exists.".to_string(),
    Some("best_sellers_product_id_key") => "This product is already a best-seller.".to_string(),
    Some(other) => format!("A record with the same unique value already exists ({}).", other),
    None => "A record with the same unique value already exists.".to_string(),
  }
}

impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<AppError>() {
      Ok(app_err) => app_err,
      Err(err) => match err.downcast::<sqlx::Error>() {
        Ok(sqlx_err) => AppError::from(sqlx_err),
        Err(err) => AppError::Internal(err.to_string()),
      },
    }
  }
}

impl From<validator::ValidationErrors> for AppError {
  fn from(errs: validator::ValidationErrors) -> Self {
    let mut fields: Vec<String> = errs
      .field_errors()
      .iter()
      .map(|(field, errors)| {
        let detail = errors
          .iter()
          .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
          .next()
          .unwrap_or_else(|| "is invalid".to_string());
        format!("{}: {}", field, detail)
      })
      .collect();
    fields.sort();
    AppError::Validation(fields.join("; "))
  }
}

impl From<reqwest::Error> for AppError {
  fn from(err: reqwest::Error) -> Self {
    AppError::Upstream(err.to_string())
  }
}

impl AppError {
  /// Message safe to show to the caller; infrastructure detail stays in the logs.
  pub fn public_message(&self) -> String {
    match self {
      AppError::Validation(m)
      | AppError::Auth(m)
      | AppError::Forbidden(m)
      | AppError::NotFound(m)
      | AppError::Conflict(m)
      | AppError::Payment(m) => m.clone(),
      AppError::Storage(_) => "File storage is unavailable.".to_string(),
      AppError::Upstream(_) => "An upstream service failed. Please try again.".to_string(),
      AppError::Config(_) => "Configuration issue.".to_string(),
      AppError::Sqlx(_) => "Database operation failed.".to_string(),
      AppError::Workflow { source } => match source {
        // Handler errors carry the app error that failed the step.
        FlowError::Handler { source } => match source.downcast_ref::<AppError>() {
          Some(inner) => inner.public_message(),
          None => "Workflow processing error.".to_string(),
        },
        _ => "Workflow processing error.".to_string(),
      },
      AppError::Internal(_) => "An internal error occurred.".to_string(),
      AppError::PipelineHalted(_) => "Process halted by business logic.".to_string(),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Conflict(_) | AppError::PipelineHalted(_) => StatusCode::CONFLICT,
      AppError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
      AppError::Upstream(_) | AppError::Storage(_) => StatusCode::BAD_GATEWAY,
      AppError::Config(_) | AppError::Sqlx(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      AppError::Workflow { source } => match source {
        FlowError::Handler { source } => match source.downcast_ref::<AppError>() {
          Some(inner) => inner.status_code(),
          None => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::debug!(application_error = %self, "Responding with client error");
    }
    HttpResponse::build(status).json(json!({
      "success": false,
      "error": self.public_message(),
    }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::body::to_bytes;
  use validator::Validate;

  async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
    let resp = err.error_response();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[actix_web::test]
  async fn client_errors_keep_their_message() {
    let (status, body) = body_json(AppError::Validation("Quantity must be between 1 and 99.".into())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Quantity must be between 1 and 99.");
  }

  #[actix_web::test]
  async fn server_errors_hide_detail() {
    let (status, body) = body_json(AppError::Internal("pool exhausted at 10.0.0.3".into())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "An internal error occurred.");
  }

  #[actix_web::test]
  async fn workflow_errors_surface_the_failing_handler_error() {
    let flow = FlowError::from(anyhow::Error::new(AppError::Forbidden("Managers only.".into())));
    let (status, body) = body_json(AppError::from(flow)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Managers only.");
  }

  #[test]
  fn anyhow_round_trip_keeps_the_variant() {
    let err = AppError::from(anyhow::Error::new(AppError::NotFound("Order".into())));
    assert!(matches!(err, AppError::NotFound(ref m) if m == "Order"));
  }

  #[test]
  fn unique_violation_messages_name_the_field() {
    assert_eq!(
      unique_violation_message(Some("users_email_key")),
      "An account with this email already exists."
    );
    assert!(unique_violation_message(None).contains("already exists"));
  }

  #[derive(Debug, Validate)]
  struct ContactForm {
    #[validate(length(min = 3, message = "must be at least 3 characters"))]
    subject: String,
  }

  #[test]
  fn validator_errors_become_validation_errors() {
    let err = AppError::from(ContactForm { subject: "hi".into() }.validate().unwrap_err());
    match err {
      AppError::Validation(m) => assert_eq!(m, "subject: must be at least 3 characters"),
      other => panic!("expected Validation, got {:?}", other),
    }
  }
}
