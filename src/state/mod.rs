//! Commit state machine module
//!
//! Turns per-frame sign classifications into committed actions:
//! - Idle: no window open, waiting for a confident sign
//! - Dwelling: window open, votes accumulating until the dwell elapses

mod machine;
mod timer;
mod vote;

pub use machine::{CommitStateMachine, Input, MachineStatus};

#[cfg(test)]
pub use machine::Phase;
