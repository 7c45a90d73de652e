// storefront/src/web/handlers/mod.rs

pub mod admin_handlers;
pub mod auth_handlers;
pub mod cart_handlers;
pub mod checkout_handlers;
pub mod dashboard_handlers;
pub mod order_handlers;
pub mod product_handlers;
pub mod profile_handlers;
pub mod promotion_handlers;
pub mod ticket_handlers;
pub mod upload_handlers;
pub mod webhook_handlers;

use crate::errors::AppError;
use crate::models::user::Tier;
use crate::web::extractors::MaybeUser;
use serde::Deserialize;
use shopflow::PipelineResult;
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

/// Request workflows are expected to run to the end; a stop is an error.
pub(crate) fn ensure_completed(result: PipelineResult) -> Result<(), AppError> {
  match result {
    PipelineResult::Completed => Ok(()),
    PipelineResult::Stopped { step } => {
      warn!(%step, "Workflow stopped before completion.");
      Err(AppError::PipelineHalted(step))
    }
  }
}

/// Stored tier of a user; tokens do not carry it.
pub(crate) async fn tier_of(pool: &PgPool, user_id: Uuid) -> Result<Tier, AppError> {
  sqlx::query_scalar::<_, Tier>("SELECT tier FROM users WHERE id = $1")
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::Auth("Account no longer exists.".to_string()))
}

/// Anonymous callers price as BRONZE.
pub(crate) async fn caller_tier(pool: &PgPool, caller: &MaybeUser) -> Result<Tier, AppError> {
  match caller.0 {
    Some(user) => tier_of(pool, user.user_id).await,
    None => Ok(Tier::default()),
  }
}

/// Highest page a list endpoint accepts.
pub const MAX_PAGE: i64 = 1_000_000;

/// Rows to skip for a 1-based `page`; out-of-range pages are clamped.
pub fn page_offset(page: i64, per_page: i64) -> i64 {
  (page.clamp(1, MAX_PAGE) - 1).saturating_mul(per_page.max(0))
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Validate)]
pub struct Paging {
  #[validate(range(min = 1, max = 1000000, message = "must be between 1 and 1000000"))]
  pub page: Option<i64>,
  #[validate(range(min = 1, max = 100, message = "must be between 1 and 100"))]
  pub per_page: Option<i64>,
}

impl From<(Option<i64>, Option<i64>)> for Paging {
  fn from((page, per_page): (Option<i64>, Option<i64>)) -> Self {
    Paging { page, per_page }
  }
}

impl Paging {
  pub fn limit(&self) -> i64 {
    self.per_page.unwrap_or(20)
  }

  pub fn offset(&self) -> i64 {
    page_offset(self.page.unwrap_or(1), self.limit())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stopped_workflows_become_errors() {
    assert!(ensure_completed(PipelineResult::Completed).is_ok());
    let err = ensure_completed(PipelineResult::Stopped {
      step: "price_cart_checkout".into(),
    })
    .unwrap_err();
    assert!(matches!(err, AppError::PipelineHalted(ref s) if s == "price_cart_checkout"));
  }

  #[test]
  fn paging_offsets() {
    assert_eq!((Paging::default().limit(), Paging::default().offset()), (20, 0));
    let p = Paging {
      page: Some(3),
      per_page: Some(10),
    };
    assert_eq!((p.limit(), p.offset()), (10, 20));
    assert!(Paging {
      page: Some(0),
      per_page: None
    }
    .validate()
    .is_err());
  }

  #[test]
  fn huge_pages_are_rejected_and_clamped() {
    let p = Paging {
      page: Some(i64::MAX),
      per_page: Some(20),
    };
    assert!(p.validate().is_err());
    assert_eq!(p.offset(), (MAX_PAGE - 1) * 20);
    assert!(Paging {
      page: Some(MAX_PAGE),
      per_page: Some(100)
    }
    .validate()
    .is_ok());
    assert_eq!(page_offset(i64::MIN, 20), 0);
  }
}
