//! # Hoard Config
//!
//! Configuration management for Hoard.
//! Supports layered configuration from files, environment variables,
//! and runtime refresh.

mod app_config;
mod keying;
mod loader;
mod validation;

pub use app_config::*;
pub use keying::*;
pub use loader::*;
pub use validation::*;
