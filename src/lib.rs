//! HashPredict: autonomous prediction agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod agent;
pub mod chain;
pub mod config;
pub mod dashboard;
pub mod market;
pub mod storage;
pub mod types;
