//! Entity models and DTOs.

pub mod download;
pub mod event_log;
