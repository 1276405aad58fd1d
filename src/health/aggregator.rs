// src/health/aggregator.rs
use super::checker::CheckError;
use super::registry::CheckerMap;
use super::status::{CheckResult, CheckStatus};
use crate::metrics::MetricsCollector;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

/// Budget applied when none (or zero) is configured.
pub const DEFAULT_CHECKERS_TIMEOUT: Duration = Duration::from_secs(1);

/// Runs every checker of a registry snapshot concurrently under one round-wide
/// deadline and always answers with exactly one result per checker.
///
/// Checkers that miss the deadline are reported as [`CheckStatus::Timeout`] and
/// are left running in the background; their late answers are dropped.
pub struct Aggregator {
    timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Aggregator {
    pub fn new(timeout: Duration, metrics: Option<Arc<MetricsCollector>>) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_CHECKERS_TIMEOUT
        } else {
            timeout
        };

        Self {
            timeout,
            in_flight: Arc::new(AtomicUsize::new(0)),
            metrics,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Checker tasks still running, including ones a finished round gave up on.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn run(&self, checkers: CheckerMap) -> BTreeMap<String, CheckResult> {
        let mut results = BTreeMap::new();
        if checkers.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.record_round(Duration::ZERO);
            }
            return results;
        }

        let expected = checkers.len();
        let round_id = Uuid::new_v4();
        let span = info_span!("health_round", %round_id, checkers = expected);

        let started = Instant::now();
        let names: Vec<String> = checkers.keys().cloned().collect();

        // One slot per checker: a producer can always deposit its result
        // without waiting, even after the round stopped reading.
        let (tx, mut rx) = mpsc::channel::<CheckResult>(expected);

        for (name, checker) in checkers {
            let tx = tx.clone();
            let guard = InFlightGuard::acquire(self.in_flight.clone(), self.metrics.clone());

            tokio::spawn(
                async move {
                    let _guard = guard;
                    let start = Instant::now();
                    let outcome = AssertUnwindSafe(checker.check()).catch_unwind().await;
                    let error = match outcome {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => Some(e.to_string()),
                        Err(_) => Some(CheckError::Panicked.to_string()),
                    };

                    let result = CheckResult::checked(name, error, start.elapsed());
                    if tx.try_send(result).is_err() {
                        debug!("Discarding late checker result, round already closed");
                    }
                }
                .instrument(span.clone()),
            );
        }
        drop(tx);

        let deadline = sleep(self.timeout);
        tokio::pin!(deadline);

        async {
            while results.len() < expected {
                // Answers already delivered win over an expired deadline.
                tokio::select! {
                    biased;

                    received = rx.recv() => match received {
                        Some(result) => record_answer(&mut results, result),
                        None => break,
                    },
                    _ = &mut deadline => break,
                }
            }
        }
        .instrument(span.clone())
        .await;

        let _entered = span.enter();

        // A checker that stalled the runtime thread can leave the deadline and
        // other answers ready at the same time; keep whatever already arrived.
        while let Ok(result) = rx.try_recv() {
            record_answer(&mut results, result);
        }

        // Closing the receiver turns any later send into a no-op.
        drop(rx);

        for name in names {
            if !results.contains_key(&name) {
                warn!(checker = %name, timeout = ?self.timeout, "Checker timed out");
                results.insert(name.clone(), CheckResult::timed_out(name, self.timeout));
            }
        }

        let elapsed = started.elapsed();
        let timed_out = results
            .values()
            .filter(|r| r.status == CheckStatus::Timeout)
            .count();
        debug!(?elapsed, timed_out, "Round complete");

        if let Some(metrics) = &self.metrics {
            for result in results.values() {
                metrics.record_check(result);
            }
            metrics.record_round(elapsed);
        }

        results
    }
}

fn record_answer(results: &mut BTreeMap<String, CheckResult>, result: CheckResult) {
    debug!(
        checker = %result.name,
        error = ?result.error,
        response_time = ?result.response_time,
        "Checker answered"
    );
    results.insert(result.name.clone(), result);
}

// Counts a checker task as in flight until it finishes, however it finishes.
struct InFlightGuard {
    counter: Arc<AtomicUsize>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl InFlightGuard {
    fn acquire(counter: Arc<AtomicUsize>, metrics: Option<Arc<MetricsCollector>>) -> Self {
        let count = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(metrics) = &metrics {
            metrics.update_checks_in_flight(count);
        }
        Self { counter, metrics }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let count = self.counter.fetch_sub(1, Ordering::SeqCst) - 1;
        if let Some(metrics) = &self.metrics {
            metrics.update_checks_in_flight(count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::checker::{Checker, FnChecker};
    use std::sync::atomic::AtomicU32;

    fn delayed(delay: Duration, error: Option<&'static str>) -> Arc<dyn Checker> {
        Arc::new(FnChecker::new(move || async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            match error {
                Some(message) => Err(CheckError::unhealthy(message)),
                None => Ok(()),
            }
        }))
    }

    fn hanging() -> Arc<dyn Checker> {
        Arc::new(FnChecker::new(|| async {
            std::future::pending::<()>().await;
            Ok::<(), CheckError>(())
        }))
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let aggregator = Aggregator::new(Duration::ZERO, None);
        assert_eq!(aggregator.timeout(), DEFAULT_CHECKERS_TIMEOUT);

        let aggregator = Aggregator::new(Duration::from_millis(250), None);
        assert_eq!(aggregator.timeout(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_no_checkers_returns_immediately() {
        let aggregator = Aggregator::new(Duration::from_secs(5), None);

        let start = Instant::now();
        let results = aggregator.run(CheckerMap::new()).await;

        assert!(results.is_empty());
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_checked_success_and_failure() {
        let aggregator = Aggregator::new(Duration::from_secs(1), None);
        let mut checkers = CheckerMap::new();
        checkers.insert("ok".to_string(), delayed(Duration::ZERO, None));
        checkers.insert(
            "failing".to_string(),
            delayed(Duration::ZERO, Some("Service unreachable")),
        );

        let results = aggregator.run(checkers).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["ok"].status, CheckStatus::Checked);
        assert_eq!(results["ok"].error, None);
        assert!(results["ok"].response_time < Duration::from_millis(100));

        assert_eq!(results["failing"].status, CheckStatus::Checked);
        assert_eq!(results["failing"].error.as_deref(), Some("Service unreachable"));
    }

    #[tokio::test]
    async fn test_round_is_bounded_by_timeout() {
        let aggregator = Aggregator::new(Duration::from_millis(200), None);
        let mut checkers = CheckerMap::new();
        checkers.insert("slow".to_string(), delayed(Duration::from_secs(5), None));
        checkers.insert("hung".to_string(), hanging());

        let start = Instant::now();
        let results = aggregator.run(checkers).await;
        let elapsed = start.elapsed();

        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1000));
        for name in ["slow", "hung"] {
            assert_eq!(results[name].status, CheckStatus::Timeout);
            assert_eq!(results[name].error, None);
            assert_eq!(results[name].response_time, Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn test_panicking_checker_is_isolated() {
        let aggregator = Aggregator::new(Duration::from_secs(1), None);
        let mut checkers = CheckerMap::new();
        checkers.insert(
            "panics".to_string(),
            Arc::new(FnChecker::new(|| async {
                let broken = true;
                if broken {
                    panic!("checker blew up");
                }
                Ok::<(), CheckError>(())
            })) as Arc<dyn Checker>,
        );
        checkers.insert("ok".to_string(), delayed(Duration::ZERO, None));

        let start = Instant::now();
        let results = aggregator.run(checkers).await;

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(results["panics"].status, CheckStatus::Checked);
        assert_eq!(results["panics"].error.as_deref(), Some("Checker panicked"));
        assert_eq!(results["ok"].status, CheckStatus::Checked);
    }

    #[tokio::test]
    async fn test_thread_blocking_checker_does_not_hide_fast_answer() {
        let aggregator = Aggregator::new(Duration::from_millis(100), None);
        let mut checkers = CheckerMap::new();
        checkers.insert("fast".to_string(), delayed(Duration::ZERO, None));
        checkers.insert(
            "blocking".to_string(),
            Arc::new(FnChecker::new(|| async {
                std::thread::sleep(Duration::from_millis(300));
                Ok::<(), CheckError>(())
            })) as Arc<dyn Checker>,
        );

        let results = aggregator.run(checkers).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results["fast"].status, CheckStatus::Checked);
        assert_eq!(results["fast"].error, None);
    }

    #[tokio::test]
    async fn test_empty_round_is_counted() {
        let registry = crate::metrics::MetricsRegistry::new().unwrap();
        let aggregator = Aggregator::new(Duration::from_secs(1), Some(registry.collector()));

        aggregator.run(CheckerMap::new()).await;
        aggregator.run(CheckerMap::new()).await;

        assert_eq!(registry.collector().rounds_total.get(), 2);
    }

    #[tokio::test]
    async fn test_stragglers_finish_in_background() {
        let aggregator = Aggregator::new(Duration::from_millis(100), None);
        let calls = Arc::new(AtomicU32::new(0));

        let counted = calls.clone();
        let mut checkers = CheckerMap::new();
        checkers.insert(
            "straggler".to_string(),
            Arc::new(FnChecker::new(move || {
                let counted = counted.clone();
                async move {
                    sleep(Duration::from_millis(300)).await;
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), CheckError>(())
                }
            })) as Arc<dyn Checker>,
        );

        let results = aggregator.run(checkers).await;
        assert_eq!(results["straggler"].status, CheckStatus::Timeout);
        assert_eq!(aggregator.in_flight(), 1);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(aggregator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_repeated_rounds_do_not_accumulate_tasks() {
        let aggregator = Aggregator::new(Duration::from_millis(20), None);

        for _ in 0..5 {
            let mut checkers = CheckerMap::new();
            checkers.insert("slow".to_string(), delayed(Duration::from_millis(60), None));
            let results = aggregator.run(checkers).await;
            assert_eq!(results["slow"].status, CheckStatus::Timeout);
        }

        sleep(Duration::from_millis(200)).await;
        assert_eq!(aggregator.in_flight(), 0);
    }
}
