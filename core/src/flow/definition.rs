// payrecon/src/flow/definition.rs

//! The `Flow<TData, Err>` struct and handler registration.

use super::context_data::ContextData;
use super::control::StepControl;
use super::error::FlowError;
use super::step::{SkipCondition, StepDef};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

pub type StepFuture<Err> = Pin<Box<dyn Future<Output = Result<StepControl, Err>> + Send>>;

/// A boxed step handler over the shared context.
pub type Handler<TData, Err> = Box<dyn Fn(ContextData<TData>) -> StepFuture<Err> + Send + Sync>;

/// An ordered list of steps over context `TData`. Handlers return `Err`,
/// which must be able to carry the runtime's own `FlowError`.
pub struct Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) name: &'static str,
  pub(crate) steps: Vec<StepDef<TData>>,
  pub(crate) on: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new(name: &'static str, step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step_name, optional, skip_cond_opt)| StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: skip_cond_opt.clone(),
      })
      .collect();

    Self {
      name,
      steps,
      on: HashMap::new(),
    }
  }

  /// Panics on an unknown step name; that is a wiring mistake, not a runtime condition.
  fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!("Flow '{}' setup error: step '{}' is not defined.", self.name, step_name);
    }
  }

  /// Registers the main handler for a step.
  pub fn on_step<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<StepControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self
      .on
      .entry(step_name.to_string())
      .or_default()
      .push(Box::new(move |ctx_data: ContextData<TData>| -> StepFuture<Err> {
        let fut = handler_fn(ctx_data);
        Box::pin(async move { fut.await.map_err(Into::into) })
      }));
  }
}
