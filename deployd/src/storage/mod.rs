//! On-disk configuration

pub mod settings;
