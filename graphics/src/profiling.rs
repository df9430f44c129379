//! Profiling support via Tracy.
//!
//! Re-exports the CPU profiling macros of [`lumen_core::profiling`]. They
//! compile to nothing unless the `profiling` feature is enabled:
//!
//! ```toml
//! [dependencies]
//! lumen-graphics = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! The frame executor marks the end of every presented frame with
//! [`frame_mark!`], and scopes renderpack loading, reflection and renderpass
//! recording.
//!
//! ```ignore
//! use lumen_graphics::profiling::{profile_function, profile_scope};
//!
//! fn record_shadow_cascades() {
//!     profile_function!();
//!     for cascade in 0..4 {
//!         profile_scope!("cascade");
//!     }
//! }
//! ```

pub use lumen_core::profiling::*;
