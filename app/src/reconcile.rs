// storefront/src/reconcile.rs

//! Polling of the order-status lookup after the shopper returns from the
//! hosted payment page.

use crate::errors::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{event, instrument, Level};
use uuid::Uuid;

pub const EXHAUSTED_MESSAGE: &str =
  "We could not confirm your payment in time. If you were charged, your order will appear in your account shortly.";

/// Result of one status lookup keyed by payment-intent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupStatus {
  Processing { order_id: Option<Uuid> },
  Completed { order_id: Uuid },
  Failed { message: String },
}

#[async_trait]
pub trait StatusSource: Send + Sync {
  async fn lookup(&self, payment_intent_id: &str) -> Result<LookupStatus>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
  pub interval: Duration,
  pub max_attempts: u32,
}

impl Default for PollPolicy {
  fn default() -> Self {
    Self {
      interval: Duration::from_secs(3),
      max_attempts: 10,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
  /// Send the shopper to the confirmation page of this order.
  Redirect { order_id: Uuid, attempts: u32 },
  Failed { message: String, attempts: u32 },
}

/// Looks the intent up at most `policy.max_attempts` times, one at a time,
/// sleeping `policy.interval` between attempts.
///
/// `Completed`, or `Processing` with an order id, ends with a redirect.
/// A lookup error counts as a spent attempt.
#[instrument(name = "reconcile::poll", skip(source, policy), fields(max_attempts = policy.max_attempts))]
pub async fn poll_until_settled<S>(source: &S, payment_intent_id: &str, policy: &PollPolicy) -> PollOutcome
where
  S: StatusSource + ?Sized,
{
  for attempt in 1..=policy.max_attempts {
    match source.lookup(payment_intent_id).await {
      Ok(LookupStatus::Completed { order_id })
      | Ok(LookupStatus::Processing {
        order_id: Some(order_id),
      }) => {
        event!(Level::INFO, %order_id, attempt, "Order reconciled; redirecting.");
        return PollOutcome::Redirect {
          order_id,
          attempts: attempt,
        };
      }
      Ok(LookupStatus::Failed { message }) => {
        event!(Level::WARN, attempt, %message, "Payment failed.");
        return PollOutcome::Failed {
          message,
          attempts: attempt,
        };
      }
      Ok(LookupStatus::Processing { order_id: None }) => {
        event!(Level::DEBUG, attempt, "Order still processing.");
      }
      Err(e) => {
        event!(Level::WARN, attempt, error = %e, "Status lookup failed.");
      }
    }

    if attempt < policy.max_attempts {
      tokio::time::sleep(policy.interval).await;
    }
  }

  event!(Level::WARN, attempts = policy.max_attempts, "Gave up waiting for the order.");
  PollOutcome::Failed {
    message: EXHAUSTED_MESSAGE.to_string(),
    attempts: policy.max_attempts,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::errors::AppError;
  use parking_lot::Mutex;
  use std::collections::VecDeque;
  use tokio::time::Instant;

  /// Replays scripted answers, then keeps answering with `fallback`.
  struct Scripted {
    answers: Mutex<VecDeque<Result<LookupStatus>>>,
    fallback: LookupStatus,
    calls: Mutex<Vec<Instant>>,
  }

  impl Scripted {
    fn new(answers: Vec<Result<LookupStatus>>, fallback: LookupStatus) -> Self {
      Self {
        answers: Mutex::new(answers.into()),
        fallback,
        calls: Mutex::new(Vec::new()),
      }
    }

    fn call_count(&self) -> usize {
      self.calls.lock().len()
    }
  }

  #[async_trait]
  impl StatusSource for Scripted {
    async fn lookup(&self, _payment_intent_id: &str) -> Result<LookupStatus> {
      self.calls.lock().push(Instant::now());
      let next = self.answers.lock().pop_front();
      next.unwrap_or_else(|| Ok(self.fallback.clone()))
    }
  }

  fn processing() -> LookupStatus {
    LookupStatus::Processing { order_id: None }
  }

  #[tokio::test(start_paused = true)]
  async fn completes_after_nine_processing_answers() {
    let order_id = Uuid::new_v4();
    let mut answers: Vec<Result<LookupStatus>> = (0..9).map(|_| Ok(processing())).collect();
    answers.push(Ok(LookupStatus::Completed { order_id }));
    let source = Scripted::new(answers, processing());

    let started = Instant::now();
    let outcome = poll_until_settled(&source, "pi_1", &PollPolicy::default()).await;

    assert_eq!(outcome, PollOutcome::Redirect { order_id, attempts: 10 });
    assert_eq!(source.call_count(), 10);
    assert_eq!(started.elapsed(), Duration::from_secs(27));
  }

  #[tokio::test(start_paused = true)]
  async fn never_leaving_processing_stops_after_exactly_ten_attempts() {
    let source = Scripted::new(Vec::new(), processing());

    let outcome = poll_until_settled(&source, "pi_2", &PollPolicy::default()).await;

    assert_eq!(
      outcome,
      PollOutcome::Failed {
        message: EXHAUSTED_MESSAGE.to_string(),
        attempts: 10
      }
    );
    assert_eq!(source.call_count(), 10);
  }

  #[tokio::test(start_paused = true)]
  async fn lookups_are_spaced_by_the_interval() {
    let source = Scripted::new(Vec::new(), processing());
    poll_until_settled(&source, "pi_3", &PollPolicy::default()).await;

    let calls = source.calls.lock().clone();
    for pair in calls.windows(2) {
      assert_eq!(pair[1] - pair[0], Duration::from_secs(3));
    }
  }

  #[tokio::test(start_paused = true)]
  async fn processing_with_an_order_id_redirects_immediately() {
    let order_id = Uuid::new_v4();
    let source = Scripted::new(vec![Ok(LookupStatus::Processing { order_id: Some(order_id) })], processing());

    let outcome = poll_until_settled(&source, "pi_4", &PollPolicy::default()).await;

    assert_eq!(outcome, PollOutcome::Redirect { order_id, attempts: 1 });
    assert_eq!(source.call_count(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn failure_is_surfaced_without_further_lookups() {
    let source = Scripted::new(
      vec![
        Ok(processing()),
        Ok(LookupStatus::Failed {
          message: "Your card was declined.".into(),
        }),
      ],
      processing(),
    );

    let outcome = poll_until_settled(&source, "pi_5", &PollPolicy::default()).await;

    assert_eq!(
      outcome,
      PollOutcome::Failed {
        message: "Your card was declined.".into(),
        attempts: 2
      }
    );
    assert_eq!(source.call_count(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn lookup_errors_spend_an_attempt() {
    let order_id = Uuid::new_v4();
    let source = Scripted::new(
      vec![
        Err(AppError::Upstream("timeout".into())),
        Ok(LookupStatus::Completed { order_id }),
      ],
      processing(),
    );

    let outcome = poll_until_settled(
      &source,
      "pi_6",
      &PollPolicy {
        interval: Duration::from_millis(10),
        max_attempts: 2,
      },
    )
    .await;

    assert_eq!(outcome, PollOutcome::Redirect { order_id, attempts: 2 });
  }
}
