//! Seqrec Common Utilities
//!
//! Shared infrastructure for all seqrec crates:
//! - Error types and result aliases
//! - Session clock and frame timebase helpers
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
