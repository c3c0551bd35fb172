//! Response cache builder modules
//!
//! Provides the fluent API for configuring and installing a response cache.

pub mod core;
pub mod options;

pub use core::*;
