//! Build state machine

pub mod fsm;
