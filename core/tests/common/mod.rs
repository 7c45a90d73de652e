// tests/common/mod.rs
#![allow(dead_code)]

use once_cell::sync::Lazy;
use shopflow::{ContextData, FlowError, PipelineControl};
use tracing::Level;

/// Context shaped like a small checkout: a running total plus an audit trail.
#[derive(Clone, Debug, Default)]
pub struct OrderCtx {
  pub total_cents: i64,
  pub trail: Vec<String>,
  pub stop_at: Option<String>,
  pub notified: bool,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("engine error: {0}")]
  Flow(String),

  #[error("step failed: {0}")]
  Step(String),
}

impl From<FlowError> for TestError {
  fn from(fe: FlowError) -> Self {
    TestError::Flow(format!("{:?}", fe))
  }
}

/// Adds `cents` to the total and records `label` in the trail.
pub fn add_line(label: &'static str, cents: i64) -> shopflow::Handler<OrderCtx, TestError> {
  Box::new(move |ctx: ContextData<OrderCtx>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.total_cents += cents;
      guard.trail.push(label.to_string());
      tracing::debug!(target: "test_handlers", step = label, total = guard.total_cents, "line added");
      if guard.stop_at.as_deref() == Some(label) {
        return Ok(PipelineControl::Stop);
      }
      Ok(PipelineControl::Continue)
    })
  })
}

pub fn failing(label: &'static str, message: &'static str) -> shopflow::Handler<OrderCtx, TestError> {
  Box::new(move |ctx: ContextData<OrderCtx>| {
    Box::pin(async move {
      ctx.write().trail.push(label.to_string());
      Err(TestError::Step(message.to_string()))
    })
  })
}

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}
