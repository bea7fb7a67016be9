//! aria2 JSON-RPC client and status normalization.
//!
//! [`client::Aria2Client`] is the thin request/response wrapper around
//! the daemon's JSON-RPC protocol; [`status`] holds the pure mapping
//! from one daemon status snapshot to the canonical download status,
//! progress, and advisory phase hints.

pub mod client;
pub mod status;

pub use client::{Aria2Client, Aria2Error};
pub use status::{normalize, NormalizedStatus, StatusSnapshot};
