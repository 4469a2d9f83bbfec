//! Fleet health inspection hub
//!
//! Periodically pulls health reports from every enabled node, persists them,
//! tracks node liveness and raises deduplicated alerts for CRITICAL
//! conditions.

pub mod api;
pub mod config;
pub mod inspection;
pub mod model;
pub mod notify;
pub mod storage;
