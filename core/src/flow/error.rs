// payrecon/src/flow/error.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  /// A step expected state that an earlier step should have produced.
  #[error("Step '{step_name}' found no {what} in its context")]
  MissingState { step_name: &'static str, what: &'static str },
}
