// payrecon/src/flow/control.rs

//! Signals for controlling flow execution and the outcome of a run.

/// Returned by a handler to say whether the flow should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  Continue,
  /// Halt immediately. No further handlers or steps run.
  Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
  /// Every non-skipped step ran.
  Completed,
  /// A handler returned `StepControl::Stop`.
  Stopped,
}
