// tests/error_handling_tests.rs
mod common;

use common::*;
use serial_test::serial;
use shopflow::{ContextData, FlowError, Pipeline, PipelineControl};

#[tokio::test]
#[serial]
async fn pipeline_can_use_flow_error_directly() {
  setup_tracing();
  let mut pipeline = Pipeline::<OrderCtx, FlowError>::new(&[("task", false, None)]);
  pipeline.on_root("task", |ctx: ContextData<OrderCtx>| {
    Box::pin(async move {
      ctx.write().total_cents = 1;
      Ok::<_, FlowError>(PipelineControl::Continue)
    })
  });

  let ctx = ContextData::new(OrderCtx::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().total_cents, 1);
}

#[tokio::test]
#[serial]
async fn anyhow_errors_are_lifted_into_flow_errors() {
  setup_tracing();
  let mut pipeline = Pipeline::<OrderCtx, FlowError>::new(&[("task", false, None)]);
  pipeline.on_root("task", |_ctx: ContextData<OrderCtx>| {
    Box::pin(async move { Err::<PipelineControl, _>(anyhow::anyhow!("gateway timeout")) })
  });

  let err = pipeline.run(ContextData::new(OrderCtx::default())).await.unwrap_err();
  match err {
    FlowError::Handler { source } => assert_eq!(source.to_string(), "gateway timeout"),
    other => panic!("expected FlowError::Handler, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn internal_flow_error_passes_through_unchanged() {
  setup_tracing();
  let mut pipeline = Pipeline::<OrderCtx, FlowError>::new(&[("task", false, None)]);
  pipeline.on_root("task", |_ctx| {
    Box::pin(async move { Err(FlowError::Internal("intentional".to_string())) })
  });

  match pipeline.run(ContextData::new(OrderCtx::default())).await.unwrap_err() {
    FlowError::Internal(s) => assert_eq!(s, "intentional"),
    other => panic!("expected FlowError::Internal, got {:?}", other),
  }
}
