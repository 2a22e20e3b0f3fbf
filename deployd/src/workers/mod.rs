//! Long-running background workers

pub mod status_sync;
