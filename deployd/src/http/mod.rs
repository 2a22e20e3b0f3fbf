//! HTTP adapters for the collaborator services

pub mod client;
pub mod platform;
pub mod registry;
pub mod variables;
