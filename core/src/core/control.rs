// shopflow/src/core/control.rs

//! Flow signals returned by handlers and the outcome of a whole run.

/// Returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Keep going with the remaining handlers and steps.
  Continue,
  /// Halt the run right after this handler.
  Stop,
}

/// Outcome of [`Pipeline::run`](crate::Pipeline::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
  /// Every step either ran or was skipped.
  Completed,
  /// A handler returned [`PipelineControl::Stop`] while running `step`.
  Stopped { step: String },
}

impl PipelineResult {
  pub fn is_completed(&self) -> bool {
    matches!(self, PipelineResult::Completed)
  }

  /// Name of the step that stopped the run, if any.
  pub fn stopped_at(&self) -> Option<&str> {
    match self {
      PipelineResult::Completed => None,
      PipelineResult::Stopped { step } => Some(step.as_str()),
    }
  }
}
