// shopflow/src/lib.rs

//! shopflow: asynchronous, type-safe step pipelines.
//!
//! Every request-scoped server action of the storefront (sign-up, add to
//! cart, checkout, webhook fulfilment, ...) is written as a [`Pipeline`]:
//!  - an ordered list of named steps, each with `before` / `on` / `after` handlers;
//!  - handlers share one [`ContextData`] and may stop the run early;
//!  - optional steps tolerate a missing handler or a failing handler;
//!  - steps can be skipped by a predicate over the context;
//!  - a [`Workflows`] registry dispatches a context to the pipeline registered for its type.

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context::Handler;
pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::Workflows;
