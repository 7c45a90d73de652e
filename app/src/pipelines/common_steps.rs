// storefront/src/pipelines/common_steps.rs

use crate::errors::AppError;
use crate::pipelines::contexts::NotificationCtxData;
use crate::pricing::format_cents;
use crate::state::AppState;
use shopflow::{ContextData, FlowError, FlowResult, PipelineControl};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Sends the message held in `ctx_data`; records the message id on success.
#[instrument(name = "common_step::send_notification", skip(ctx_data), err)]
pub async fn send_notification_step(ctx_data: ContextData<NotificationCtxData>) -> FlowResult<PipelineControl> {
  let (mailer, to, subject, html) = {
    let guard = ctx_data.read();
    (
      guard.app_state.mailer.clone(),
      guard.recipient_email.clone(),
      guard.subject.clone(),
      guard.html_body.clone(),
    )
  };

  match mailer.send_mail(&to, &subject, &html).await {
    Ok(sent) => {
      info!(recipient = %to, message_id = %sent.message_id, "Notification sent.");
      ctx_data.write().message_id = Some(sent.message_id);
      Ok(PipelineControl::Continue)
    }
    Err(e) => {
      warn!(recipient = %to, error = %e, "Notification failed.");
      Err(FlowError::Handler {
        source: anyhow::Error::new(e),
      })
    }
  }
}

/// Runs [`send_notification_step`] for a one-off message. `Ok(false)` means
/// the mail was not sent; callers treat notifications as best effort.
pub async fn notify(app_state: &AppState, to: &str, subject: String, html_body: String) -> bool {
  let ctx = ContextData::new(NotificationCtxData {
    app_state: app_state.clone(),
    recipient_email: to.to_string(),
    subject,
    html_body,
    message_id: None,
  });
  match send_notification_step(ctx).await {
    Ok(_) => true,
    Err(e) => {
      warn!(error = %AppError::from(e), "Best-effort notification dropped.");
      false
    }
  }
}

pub fn welcome_message(name: &str) -> (String, String) {
  (
    format!("Welcome to the store, {}!", name),
    format!("<p>Hi {},</p><p>Thanks for creating an account.</p>", name),
  )
}

pub fn order_confirmation_message(name: &str, order_id: Uuid, total_cents: i64, currency: &str) -> (String, String) {
  (
    format!("Your order #{} is confirmed", order_id),
    format!(
      "<p>Hi {},</p><p>We received your payment of {} {} for order #{}.</p>",
      name,
      format_cents(total_cents),
      currency.to_uppercase(),
      order_id
    ),
  )
}

pub fn ticket_reply_message(subject: &str, ticket_id: Uuid) -> (String, String) {
  (
    format!("New reply on your ticket: {}", subject),
    format!("<p>Our support team replied to ticket #{}.</p>", ticket_id),
  )
}

pub fn ticket_opened_message(subject: &str, ticket_id: Uuid, opener: &str) -> (String, String) {
  (
    format!("[support] {}", subject),
    format!("<p>{} opened ticket #{}.</p>", opener, ticket_id),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn confirmation_shows_two_decimal_total() {
    let id = Uuid::nil();
    let (subject, html) = order_confirmation_message("Ada", id, 21_250, "usd");
    assert!(subject.contains(&id.to_string()));
    assert!(html.contains("212.50 USD"));
  }

  #[tokio::test]
  async fn notify_swallows_transport_failures() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::for_tests(dir.path());
    assert!(notify(&state, "a@b.test", "Hello".into(), "<p/>".into()).await);
    assert!(!notify(&state, "a@b.test", "fail_test".into(), "<p/>".into()).await);
  }
}
