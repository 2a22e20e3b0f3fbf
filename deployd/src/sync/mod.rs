//! Reconciliation of deployment records with the platform

pub mod syncer;
