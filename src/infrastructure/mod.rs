//! Infrastructure layer - chain access and notification delivery

pub mod blockchain;
pub mod notification;
