// payrecon/src/flow/execution.rs

//! `Flow::run()`: executes steps in order against a shared context.

use super::context_data::ContextData;
use super::control::{FlowOutcome, StepControl};
use super::definition::{Flow, Handler};
use super::error::FlowError;
use tracing::{event, instrument, span, Instrument, Level};

enum StepResult<Err> {
  Continue,
  Stop,
  Failed(Err),
}

impl<TData, Err> Flow<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  async fn run_handlers(handlers: &[Handler<TData, Err>], ctx_data: &ContextData<TData>) -> StepResult<Err> {
    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let handler_span = span!(Level::DEBUG, "step_handler", handler_index = handler_idx);
      match handler_fn(ctx_data.clone()).instrument(handler_span).await {
        Ok(StepControl::Continue) => {}
        Ok(StepControl::Stop) => return StepResult::Stop,
        Err(e) => return StepResult::Failed(e),
      }
    }
    StepResult::Continue
  }

  /// Runs every step against `ctx_data`.
  ///
  /// A failing mandatory step aborts the run with its error. A failing
  /// optional step is logged at WARN and the run moves on to the next step.
  #[instrument(
    name = "Flow::run",
    skip_all,
    fields(flow = self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<FlowOutcome, Err> {
    event!(Level::DEBUG, "Flow execution starting.");

    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name_str = step_def.name.as_str();
      let step_span = span!(
        Level::INFO,
        "flow_step",
        step_name = step_name_str,
        step_index = step_idx,
        optional = step_def.optional
      );

      if let Some(skip_cond_fn) = &step_def.skip_if {
        if skip_cond_fn(ctx_data.clone()) {
          event!(parent: &step_span, Level::DEBUG, "Step skipped due to 'skip_if' condition.");
          continue;
        }
      }

      let Some(on_handlers) = self.on.get(step_name_str).filter(|v| !v.is_empty()) else {
        if step_def.optional {
          event!(parent: &step_span, Level::DEBUG, "Optional step has no handlers, skipping.");
          continue;
        }
        event!(parent: &step_span, Level::ERROR, "Non-optional step has no handlers.");
        return Err(Err::from(FlowError::HandlerMissing {
          step_name: step_def.name.clone(),
        }));
      };

      let result = Self::run_handlers(on_handlers, &ctx_data)
        .instrument(step_span.clone())
        .await;

      match result {
        StepResult::Continue => {}
        StepResult::Stop => {
          event!(parent: &step_span, Level::DEBUG, "Flow stopped by a handler.");
          return Ok(FlowOutcome::Stopped);
        }
        StepResult::Failed(e) if step_def.optional => {
          event!(parent: &step_span, Level::WARN, error = %e, "Optional step failed; continuing.");
        }
        StepResult::Failed(e) => {
          event!(parent: &step_span, Level::ERROR, error = %e, "Step failed.");
          return Err(e);
        }
      }
    }

    event!(Level::DEBUG, "Flow execution completed.");
    Ok(FlowOutcome::Completed)
  }
}
