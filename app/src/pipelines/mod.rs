// storefront/src/pipelines/mod.rs

//! Workflows of the store, one pipeline per context type.

use crate::errors::AppError;
use shopflow::Workflows;
use std::sync::Arc;

pub mod common_steps;
pub mod contexts;

pub mod cart_pipeline;
pub mod checkout_pipeline;
pub mod fulfilment_pipeline;
pub mod signin_pipeline;
pub mod signup_pipeline;
pub mod ticket_pipeline;
pub mod webhook_pipeline;

/// Registers every pipeline with `workflows`. Called once at startup.
pub fn register_all_pipelines(workflows: &Arc<Workflows<AppError>>) {
  tracing::info!("Registering pipelines...");

  signup_pipeline::register_signup_pipeline(workflows);
  signin_pipeline::register_signin_pipeline(workflows);
  cart_pipeline::register_add_to_cart_pipeline(workflows);
  checkout_pipeline::register_checkout_pipeline(workflows);
  fulfilment_pipeline::register_fulfilment_pipeline(workflows);
  webhook_pipeline::register_webhook_pipeline(workflows);
  ticket_pipeline::register_ticket_pipelines(workflows);

  tracing::info!(count = workflows.len(), "All pipelines registered.");
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pipelines::contexts::*;

  #[test]
  fn every_context_has_a_pipeline() {
    let workflows = Arc::new(Workflows::<AppError>::new());
    register_all_pipelines(&workflows);
    assert_eq!(workflows.len(), 8);
    assert!(workflows.is_registered::<SignupCtxData>());
    assert!(workflows.is_registered::<SigninCtxData>());
    assert!(workflows.is_registered::<AddToCartCtxData>());
    assert!(workflows.is_registered::<CheckoutCtxData>());
    assert!(workflows.is_registered::<FulfilOrderCtxData>());
    assert!(workflows.is_registered::<WebhookCtxData>());
    assert!(workflows.is_registered::<OpenTicketCtxData>());
    assert!(workflows.is_registered::<TicketReplyCtxData>());
    assert!(!workflows.is_registered::<NotificationCtxData>());
  }
}
