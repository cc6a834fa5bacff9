// payrecon_server/src/lib.rs

//! HTTP surface for the reconciliation engine.

pub mod config;
pub mod errors;
pub mod state;
pub mod web;
