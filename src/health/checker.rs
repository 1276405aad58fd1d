// src/health/checker.rs
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// A dependency (database, external API, cache) that can report its own health.
///
/// The registry only holds a shared handle; whoever registered the checker
/// keeps ownership of it. `check` is expected to return in bounded time but the
/// aggregator never relies on it: a round stops waiting once its budget is spent.
///
/// `check` runs as a task on the async runtime and must not block the thread
/// (`std::thread::sleep`, synchronous I/O, blocking drivers). A blocking check
/// stalls the timer that bounds the round, so on a single-threaded runtime the
/// round cannot finish before the check does. Wrap synchronous checks in
/// [`BlockingChecker`], which moves them onto the blocking pool.
#[async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self) -> Result<(), CheckError>;
}

// Failure reported by a checker that did answer
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("{0}")]
    Unhealthy(String),

    #[error("HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Checker panicked")]
    Panicked,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CheckError {
    pub fn unhealthy(message: impl Into<String>) -> Self {
        CheckError::Unhealthy(message.into())
    }
}

/// Adapts an async closure into a [`Checker`].
pub struct FnChecker<F> {
    check: F,
}

impl<F> FnChecker<F> {
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

#[async_trait]
impl<F, Fut> Checker for FnChecker<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), CheckError>> + Send,
{
    async fn check(&self) -> Result<(), CheckError> {
        (self.check)().await
    }
}

/// Adapts a synchronous closure into a [`Checker`].
///
/// The closure runs on tokio's blocking pool, so a check that sleeps or does
/// blocking I/O never stalls the runtime workers other checkers run on.
pub struct BlockingChecker<F> {
    check: Arc<F>,
}

impl<F> BlockingChecker<F> {
    pub fn new(check: F) -> Self {
        Self {
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl<F> Checker for BlockingChecker<F>
where
    F: Fn() -> Result<(), CheckError> + Send + Sync + 'static,
{
    async fn check(&self) -> Result<(), CheckError> {
        let check = self.check.clone();
        match tokio::task::spawn_blocking(move || (*check)()).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CheckError::Panicked),
            Err(e) => Err(CheckError::Other(e.into())),
        }
    }
}
