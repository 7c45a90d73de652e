// shopflow/src/error.rs

//! Engine-level failures.

use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Errors raised by the engine itself. Applications embed these in their own
/// error type through `From<FlowError>`.
#[derive(Debug, Error)]
pub enum FlowError {
  /// A pipeline edit named a step the pipeline does not have.
  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },

  /// A non-optional step was reached with no handler in any phase.
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  /// `Workflows::run` was called for a context type with no pipeline.
  #[error("No pipeline registered for context type {type_name}")]
  NotRegistered { type_name: String },

  /// The registry handed a runner a context of the wrong type.
  #[error("Context type mismatch at '{step_name}' (expected {expected_type})")]
  TypeMismatch { step_name: String, expected_type: String },

  /// Any other failure raised inside a handler.
  #[error("Handler failed: {source}")]
  Handler {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal shopflow error: {0}")]
  Internal(String),
}

impl From<AnyhowError> for FlowError {
  fn from(err: AnyhowError) -> Self {
    // Unwrap a FlowError that travelled through anyhow instead of nesting it.
    match err.downcast::<FlowError>() {
      Ok(flow_err) => flow_err,
      Err(source) => FlowError::Handler { source },
    }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn anyhow_wrapped_flow_error_is_not_nested() {
    let inner = FlowError::StepNotFound {
      step_name: "missing".to_string(),
    };
    let converted = FlowError::from(anyhow::Error::new(inner));
    assert!(matches!(converted, FlowError::StepNotFound { ref step_name } if step_name == "missing"));
  }

  #[test]
  fn foreign_errors_become_handler_errors() {
    let converted = FlowError::from(anyhow::anyhow!("boom"));
    match converted {
      FlowError::Handler { source } => assert_eq!(source.to_string(), "boom"),
      other => panic!("expected Handler, got {:?}", other),
    }
  }
}
