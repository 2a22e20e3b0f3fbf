//! Unit tests for the deployment engine

mod common;
mod test_fsm;
mod test_gate;
mod test_processor;
