//! # Lumen Core
//!
//! Engine-wide utilities shared by the Lumen crates.

pub mod profiling;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
