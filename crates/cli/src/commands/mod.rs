//! CLI command implementations

pub mod identity;
pub mod round;
pub mod topology;
