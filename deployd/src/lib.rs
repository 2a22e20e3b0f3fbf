//! deployd Library
//!
//! Deployment orchestration engine: durable keyed job queues, supersession of
//! outdated deployments, dependency-gated scheduling and periodic
//! reconciliation of deployment status with the orchestration platform.

pub mod app;
pub mod controller;
pub mod deploy;
pub mod errors;
pub mod http;
pub mod logs;
pub mod models;
pub mod notify;
pub mod queue;
pub mod services;
pub mod storage;
pub mod store;
pub mod sync;
pub mod utils;
pub mod workers;
