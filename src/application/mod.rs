//! Application layer - control loop driving the monitors and lifecycle manager

mod control_loop;

pub use control_loop::{ControlLoop, ControlLoopConfig, LoopState, StatusSnapshot};
