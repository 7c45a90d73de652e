// shopflow/src/pipeline/definition.rs

//! Pipeline construction and editing. Handler registration lives in `hooks.rs`;
//! running lives in `execution.rs`.

use crate::core::context::Handler;
use crate::core::step::{SkipCondition, StepDef};
use crate::error::{FlowError, FlowResult};
use std::collections::HashMap;

/// An ordered set of named steps over the root data `TData`.
///
/// `Err` is what handlers return; it must absorb engine errors
/// (`From<FlowError>`) so a run always yields a single error type.
pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) before: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Builds a pipeline from `(name, optional, skip_if)` tuples.
  ///
  /// Steps run in the given order. No handlers are attached yet; a
  /// non-optional step must get at least one before the pipeline runs.
  pub fn new(step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(name, optional, skip_if)| StepDef {
        name: (*name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  /// Step names in run order.
  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  pub fn has_step(&self, step_name: &str) -> bool {
    self.position(step_name).is_some()
  }

  fn position(&self, step_name: &str) -> Option<usize> {
    self.steps.iter().position(|s| s.name == step_name)
  }

  fn index_of(&self, step_name: &str) -> FlowResult<usize> {
    self.position(step_name).ok_or_else(|| FlowError::StepNotFound {
      step_name: step_name.to_string(),
    })
  }

  /// Hook registration on an unknown step is a wiring bug, not a runtime condition.
  pub(crate) fn assert_step_exists(&self, step_name: &str) {
    if !self.has_step(step_name) {
      panic!("shopflow: step '{}' is not part of this pipeline", step_name);
    }
  }

  fn insert_at(
    &mut self,
    idx: usize,
    name: String,
    optional: bool,
    skip_if: Option<SkipCondition<TData>>,
  ) -> FlowResult<()> {
    if self.has_step(&name) {
      return Err(FlowError::Internal(format!("step '{}' already exists", name)));
    }
    self.steps.insert(idx, StepDef { name, optional, skip_if });
    Ok(())
  }

  /// Adds a step right before `existing_step_name`.
  ///
  /// Fails with `StepNotFound` if the anchor is missing and with `Internal`
  /// if the new name is already taken.
  pub fn insert_before_step<S: Into<String>>(
    &mut self,
    existing_step_name: &str,
    new_step_name: S,
    optional: bool,
    skip_if: Option<SkipCondition<TData>>,
  ) -> FlowResult<()> {
    let idx = self.index_of(existing_step_name)?;
    self.insert_at(idx, new_step_name.into(), optional, skip_if)
  }

  /// Adds a step right after `existing_step_name`. Same errors as
  /// [`Pipeline::insert_before_step`].
  pub fn insert_after_step<S: Into<String>>(
    &mut self,
    existing_step_name: &str,
    new_step_name: S,
    optional: bool,
    skip_if: Option<SkipCondition<TData>>,
  ) -> FlowResult<()> {
    let idx = self.index_of(existing_step_name)?;
    self.insert_at(idx + 1, new_step_name.into(), optional, skip_if)
  }

  /// Removes a step together with its handlers.
  pub fn remove_step(&mut self, step_name: &str) -> FlowResult<()> {
    let idx = self.index_of(step_name)?;
    self.steps.remove(idx);
    self.before.remove(step_name);
    self.on.remove(step_name);
    self.after.remove(step_name);
    Ok(())
  }

  /// Changes whether a failure of this step ends the run.
  pub fn set_optional(&mut self, step_name: &str, optional: bool) -> FlowResult<()> {
    let idx = self.index_of(step_name)?;
    self.steps[idx].optional = optional;
    Ok(())
  }

  /// Replaces (or with `None`, clears) the step's skip condition.
  pub fn set_skip_condition(&mut self, step_name: &str, skip_if: Option<SkipCondition<TData>>) -> FlowResult<()> {
    let idx = self.index_of(step_name)?;
    self.steps[idx].skip_if = skip_if;
    Ok(())
  }
}
