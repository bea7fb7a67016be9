//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod download_repo;
pub mod event_log_repo;

pub use download_repo::DownloadRepo;
pub use event_log_repo::EventLogRepo;
