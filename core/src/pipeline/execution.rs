// shopflow/src/pipeline/execution.rs

//! Running a pipeline.
//!
//! Each step runs inside its own `pipeline_step` span. Within a step, the
//! `before`, `on` and `after` handlers run in that order and in registration
//! order within each phase. The first `Stop` or error ends the step.

use crate::core::context::Handler;
use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::core::step::StepDef;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use tracing::{event, info_span, instrument, Instrument, Level};

/// What a single step did.
enum StepOutcome<Err> {
  Continue,
  Stop,
  Failed(Err),
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Runs every step in order against `ctx_data`.
  ///
  /// A handler error on a non-optional step ends the run with that error; on an
  /// optional step it is logged and the run moves on to the next step.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(
      context_type = %std::any::type_name::<TData>(),
      num_steps = self.steps.len(),
    ),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    event!(Level::DEBUG, "Pipeline run starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = info_span!(
        "pipeline_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );

      let outcome = self.run_step(step_def, &ctx_data).instrument(step_span).await;
      match outcome {
        StepOutcome::Continue => {}
        StepOutcome::Stop => {
          event!(Level::INFO, step = %step_def.name, "Pipeline stopped by a handler.");
          return Ok(PipelineResult::Stopped {
            step: step_def.name.clone(),
          });
        }
        StepOutcome::Failed(err) if step_def.optional => {
          event!(Level::WARN, step = %step_def.name, error = %err, "Optional step failed; continuing.");
        }
        StepOutcome::Failed(err) => return Err(err),
      }
    }

    event!(Level::DEBUG, "Pipeline run completed.");
    Ok(PipelineResult::Completed)
  }

  /// Skip check, handler presence check, then the three phases.
  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: &ContextData<TData>) -> StepOutcome<Err> {
    if let Some(skip_if) = &step_def.skip_if {
      if skip_if(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by its skip condition.");
        return StepOutcome::Continue;
      }
    }

    let name = step_def.name.as_str();
    let phases = [
      ("before", self.before.get(name)),
      ("on", self.on.get(name)),
      ("after", self.after.get(name)),
    ];

    let has_handlers = phases.iter().any(|(_, hs)| hs.map_or(false, |v| !v.is_empty()));
    if !has_handlers {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers.");
        return StepOutcome::Continue;
      }
      event!(Level::ERROR, "Non-optional step has no handlers.");
      return StepOutcome::Failed(Err::from(FlowError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    for (phase, handlers) in phases {
      let Some(handlers) = handlers else { continue };
      match run_phase(phase, handlers, ctx_data).await {
        StepOutcome::Continue => {}
        other => return other,
      }
    }
    StepOutcome::Continue
  }
}

/// Runs one phase's handlers until one stops or fails.
async fn run_phase<TData, Err>(
  phase: &'static str,
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
) -> StepOutcome<Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + Send + Sync + 'static,
{
  for (handler_idx, handler_fn) in handlers.iter().enumerate() {
    event!(Level::TRACE, phase, handler_idx, "Running handler.");
    match handler_fn(ctx_data.clone()).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => return StepOutcome::Stop,
      Err(e) => {
        event!(Level::DEBUG, phase, handler_idx, error = %e, "Handler returned an error.");
        return StepOutcome::Failed(e);
      }
    }
  }
  StepOutcome::Continue
}
