//! # automate-ids Library
//!
//! This library exposes the function modules for testing and integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::panic))]

pub mod api;
pub mod automation;
pub mod cli;
pub mod error;
pub mod function;
pub mod logging;
pub mod sources;

// Re-export automate_ids_core for convenience
pub use automate_ids_core;
