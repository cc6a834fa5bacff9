// payrecon/src/flow/mod.rs

//! A small step runtime. Every reconciliation operation is declared as an
//! ordered list of named steps whose handlers share one lock-protected context.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod error;
pub mod execution;
pub mod step;

pub use context_data::ContextData;
pub use control::{FlowOutcome, StepControl};
pub use definition::{Flow, Handler, StepFuture};
pub use error::FlowError;
pub use step::{SkipCondition, StepDef};
