//! Interfaces of the collaborators the engine drives
//!
//! Each trait is the narrow surface the engine consumes. HTTP-backed
//! implementations live in [`crate::http`].

pub mod platform;
pub mod registry;
pub mod variables;
