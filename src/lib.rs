// src/lib.rs
//! Health-check aggregation for services: register dependency checkers, run
//! them concurrently under one timeout budget and report an aggregated status
//! snapshot (with a shutdown flag for graceful drain) over HTTP.
pub mod config;
pub mod health;
pub mod metrics;
pub mod server;

pub use health::{
    BlockingChecker, CheckError, CheckResult, CheckStatus, Checker, FnChecker, Health,
    HealthOptions, HttpChecker, StatusSnapshot,
};
