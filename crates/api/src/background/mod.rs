//! Background tasks spawned alongside the HTTP server.

pub mod sync_task;
