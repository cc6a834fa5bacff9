// tests/flow_tests.rs
mod common;

use common::*;
use payrecon::flow::{ContextData, Flow, FlowError, FlowOutcome, Handler, SkipCondition, StepControl, StepFuture};
use serial_test::serial;
use std::sync::Arc;

#[derive(Debug, Default)]
struct TraceCtx {
  steps_executed: Vec<String>,
  skip_second: bool,
}

#[derive(Debug, thiserror::Error)]
enum TestError {
  #[error("flow: {0}")]
  Flow(#[from] FlowError),
  #[error("handler failed: {0}")]
  Handler(String),
}

fn record(name: &'static str, control: StepControl) -> Handler<TraceCtx, TestError> {
  Box::new(move |ctx: ContextData<TraceCtx>| -> StepFuture<TestError> {
    Box::pin(async move {
      ctx.write().steps_executed.push(name.to_string());
      Ok(control)
    })
  })
}

fn fail(name: &'static str) -> Handler<TraceCtx, TestError> {
  Box::new(move |ctx: ContextData<TraceCtx>| -> StepFuture<TestError> {
    Box::pin(async move {
      ctx.write().steps_executed.push(name.to_string());
      Err(TestError::Handler(name.to_string()))
    })
  })
}

fn executed(ctx: &ContextData<TraceCtx>) -> Vec<String> {
  ctx.read().steps_executed.clone()
}

#[tokio::test]
#[serial]
async fn runs_steps_and_handlers_in_registration_order() {
  setup_tracing();
  let mut flow = Flow::<TraceCtx, TestError>::new("ordered", &[("one", false, None), ("two", false, None)]);
  flow.on_step("two", record("two", StepControl::Continue));
  flow.on_step("one", record("one", StepControl::Continue));
  flow.on_step("one", record("one:again", StepControl::Continue));

  let ctx = ContextData::new(TraceCtx::default());
  let outcome = flow.run(ctx.clone()).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Completed);
  assert_eq!(executed(&ctx), vec!["one", "one:again", "two"]);
}

#[tokio::test]
#[serial]
async fn stop_ends_the_run() {
  setup_tracing();
  let mut flow = Flow::<TraceCtx, TestError>::new(
    "stopping",
    &[("one", false, None), ("two", false, None), ("three", false, None)],
  );
  flow.on_step("one", record("one", StepControl::Continue));
  flow.on_step("two", record("two", StepControl::Stop));
  flow.on_step("two", record("two:later", StepControl::Continue));
  flow.on_step("three", record("three", StepControl::Continue));

  let ctx = ContextData::new(TraceCtx::default());
  let outcome = flow.run(ctx.clone()).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Stopped);
  assert_eq!(executed(&ctx), vec!["one", "two"]);
}

#[tokio::test]
#[serial]
async fn mandatory_failure_aborts() {
  setup_tracing();
  let mut flow = Flow::<TraceCtx, TestError>::new("abort", &[("bad", false, None), ("never", false, None)]);
  flow.on_step("bad", fail("bad"));
  flow.on_step("never", record("never", StepControl::Continue));

  let ctx = ContextData::new(TraceCtx::default());
  let err = flow.run(ctx.clone()).await.unwrap_err();

  assert!(matches!(err, TestError::Handler(ref s) if s == "bad"));
  assert_eq!(executed(&ctx), vec!["bad"]);
}

#[tokio::test]
#[serial]
async fn optional_failure_is_logged_and_skipped() {
  setup_tracing();
  let mut flow = Flow::<TraceCtx, TestError>::new(
    "soft",
    &[("audit", true, None), ("after_audit", false, None)],
  );
  flow.on_step("audit", fail("audit"));
  flow.on_step("audit", record("audit:later", StepControl::Continue));
  flow.on_step("after_audit", record("after_audit", StepControl::Continue));

  let ctx = ContextData::new(TraceCtx::default());
  let outcome = flow.run(ctx.clone()).await.unwrap();

  assert_eq!(outcome, FlowOutcome::Completed);
  assert_eq!(executed(&ctx), vec!["audit", "after_audit"]);
}

#[tokio::test]
#[serial]
async fn missing_handlers() {
  setup_tracing();
  let flow = Flow::<TraceCtx, TestError>::new("empty_optional", &[("maybe", true, None)]);
  assert_eq!(
    flow.run(ContextData::new(TraceCtx::default())).await.unwrap(),
    FlowOutcome::Completed
  );

  let flow = Flow::<TraceCtx, TestError>::new("empty_mandatory", &[("needed", false, None)]);
  let err = flow.run(ContextData::new(TraceCtx::default())).await.unwrap_err();
  assert!(matches!(
    err,
    TestError::Flow(FlowError::HandlerMissing { ref step_name }) if step_name == "needed"
  ));
}

#[tokio::test]
#[serial]
async fn skip_condition_reads_context() {
  setup_tracing();
  let skip: SkipCondition<TraceCtx> = Arc::new(|ctx: ContextData<TraceCtx>| ctx.read().skip_second);
  let mut flow = Flow::<TraceCtx, TestError>::new(
    "skipping",
    &[("first", false, None), ("second", false, Some(skip)), ("third", false, None)],
  );
  flow.on_step("first", |ctx: ContextData<TraceCtx>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.steps_executed.push("first".into());
      guard.skip_second = true;
      Ok::<_, TestError>(StepControl::Continue)
    })
  });
  flow.on_step("second", record("second", StepControl::Continue));
  flow.on_step("third", record("third", StepControl::Continue));

  let ctx = ContextData::new(TraceCtx::default());
  flow.run(ctx.clone()).await.unwrap();
  assert_eq!(executed(&ctx), vec!["first", "third"]);
}

#[test]
#[should_panic(expected = "step 'ghost' is not defined")]
fn registering_unknown_step_panics() {
  let mut flow = Flow::<TraceCtx, TestError>::new("strict", &[("real", false, None)]);
  flow.on_step("ghost", record("ghost", StepControl::Continue));
}
