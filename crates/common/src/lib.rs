//! talkpic Common Utilities
//!
//! Shared infrastructure for all talkpic crates:
//! - Error taxonomy and result aliases
//! - Session clock and tick-rate utilities
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
