//! # ember_core - Shared plumbing for the Ember rendering core
//!
//! Error taxonomy, logger bootstrap and frame timing. Everything here is
//! dependency-light so every other crate in the workspace can use it.

pub mod error;
pub mod logger;
pub mod time;

pub use error::{Error, Result};
pub use time::FrameTimer;
