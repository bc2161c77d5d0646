//! Admin routes

pub mod diagnose;
pub mod metrics;
pub mod status;
pub mod targets;
