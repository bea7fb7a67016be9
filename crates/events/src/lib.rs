//! In-process event fan-out for live download updates.

pub mod bus;

pub use bus::{DownloadEvent, EventBus};
