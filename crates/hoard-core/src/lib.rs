//! # Hoard Core
//!
//! Error definitions and logging initialisation shared by every Hoard crate.

pub mod error;
pub mod telemetry;

pub use error::*;
pub use telemetry::*;
