//! Reconciliation between the persistent store and the aria2 daemon.
//!
//! [`engine::Reconciler`] runs single-flight passes that pull daemon
//! state onto the durable download records; [`post_complete`] is the
//! exactly-once workflow fired when a download reaches terminal
//! success.

pub mod config;
pub mod engine;
pub mod post_complete;

pub use config::SyncConfig;
pub use engine::{FeedItem, PassOutcome, Reconciler};
pub use post_complete::{HookOutcome, PostCompleteHook};
