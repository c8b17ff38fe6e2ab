//! # lf-core
//!
//! Shared error and result types for licefit.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FitReport, ScenarioFit};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
