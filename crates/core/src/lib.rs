//! Shared domain types for the Magnetar download manager.
//!
//! Everything here is dependency-light on purpose: status vocabulary,
//! source validation, and helpers used by every other crate in the
//! workspace.

pub mod error;
pub mod magnet;
pub mod progress;
pub mod status;
pub mod types;
