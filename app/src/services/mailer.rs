// storefront/src/services/mailer.rs

//! Log-backed outbound mail.

use crate::errors::{AppError, Result as AppResult};
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SentMail {
  pub to: String,
  pub subject: String,
  pub message_id: String,
}

#[derive(Debug, Clone)]
pub struct Mailer {
  sender: String,
}

impl Mailer {
  pub fn new(sender: impl Into<String>) -> Self {
    Self { sender: sender.into() }
  }

  /// Writes the message to the log. Subjects containing `fail_test` fail.
  #[instrument(name = "mailer::send", skip(self, html_body), fields(from = %self.sender))]
  pub async fn send_mail(&self, to: &str, subject: &str, html_body: &str) -> AppResult<SentMail> {
    if subject.to_lowercase().contains("fail_test") {
      warn!("Simulated mail transport failure.");
      return Err(AppError::Upstream("Mail transport rejected the message.".to_string()));
    }

    let message_id = format!("mail_{}", uuid::Uuid::new_v4().simple());
    let preview: String = html_body.chars().take(60).collect();
    info!(%message_id, %preview, "Mail sent.");
    Ok(SentMail {
      to: to.to_string(),
      subject: subject.to_string(),
      message_id,
    })
  }
}
