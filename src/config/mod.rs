//! Engine Configuration Module
//!
//! Run parameters loaded from a TOML file.
//!
//! ## Loading Order
//!
//! 1. `UPLIFT_CONFIG` environment variable (path to TOML file)
//! 2. `uplift_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! The loaded `EngineConfig` is passed explicitly to the pipelines; there is
//! no process-wide config.

mod engine_config;
pub mod validation;

pub use engine_config::*;
