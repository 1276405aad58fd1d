// src/health/mod.rs
mod aggregator;
mod checker;
mod http;
mod memory;
mod registry;
mod service;
mod status;

pub use aggregator::{Aggregator, DEFAULT_CHECKERS_TIMEOUT};
pub use checker::{BlockingChecker, CheckError, Checker, FnChecker};
pub use http::HttpChecker;
pub use memory::{Memory, MemoryDiff, MemoryStatus, RuntimeStats};
pub use registry::{CheckerMap, CheckerRegistry, RegistrySnapshot};
pub use service::{Health, HealthOptions};
pub use status::{CheckResult, CheckStatus, StatusSnapshot};
