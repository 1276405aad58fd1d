// src/health/service.rs
use super::aggregator::Aggregator;
use super::checker::Checker;
use super::memory::{Memory, MemoryStatus, RuntimeStats};
use super::registry::CheckerRegistry;
use super::status::StatusSnapshot;
use crate::config::Config;
use crate::metrics::MetricsCollector;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Tunables of a [`Health`] instance.
#[derive(Debug, Clone, Default)]
pub struct HealthOptions {
    /// Round-wide budget for all checkers; zero means the 1 second default.
    pub checkers_timeout: Duration,
    /// Static key/values echoed in every snapshot (version, region, ...).
    pub metadata: BTreeMap<String, String>,
}

impl From<&Config> for HealthOptions {
    fn from(config: &Config) -> Self {
        Self {
            checkers_timeout: config.checks.timeout(),
            metadata: config.service.metadata.clone(),
        }
    }
}

/// Health of one running service: its registered dependency checkers, the
/// shutdown flag and the process statistics reported with them.
pub struct Health {
    name: String,
    start_time: DateTime<Utc>,
    started: Instant,
    initial_memory: MemoryStatus,
    metadata: BTreeMap<String, String>,
    registry: CheckerRegistry,
    aggregator: Aggregator,
    metrics: Option<Arc<MetricsCollector>>,
}

impl Health {
    pub fn new(name: impl Into<String>, options: HealthOptions) -> Self {
        Self {
            name: name.into(),
            start_time: Utc::now(),
            started: Instant::now(),
            initial_memory: MemoryStatus::read(),
            metadata: options.metadata,
            registry: CheckerRegistry::new(),
            aggregator: Aggregator::new(options.checkers_timeout, None),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.aggregator = Aggregator::new(self.aggregator.timeout(), Some(metrics.clone()));
        metrics.update_registered_checkers(self.registry.len());
        metrics.update_shutting_down(self.registry.is_shutting_down());
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn checkers_timeout(&self) -> Duration {
        self.aggregator.timeout()
    }

    /// Registers `checker` under `name`, replacing any checker already
    /// registered with that name. Rounds already running are unaffected.
    pub fn register_checker(&self, name: impl Into<String>, checker: Arc<dyn Checker>) {
        let name = name.into();
        if self.registry.register(name.clone(), checker).is_some() {
            info!(checker = %name, "Replaced health checker");
        } else {
            info!(checker = %name, "Registered health checker");
        }

        if let Some(metrics) = &self.metrics {
            metrics.update_registered_checkers(self.registry.len());
        }
    }

    pub fn checker_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Marks the service as shutting down. Permanent; repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self.registry.shutdown() {
            info!(service = %self.name, "Service is shutting down");
            if let Some(metrics) = &self.metrics {
                metrics.update_shutting_down(true);
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.registry.is_shutting_down()
    }

    /// Runs one aggregation round and assembles a fresh snapshot.
    pub async fn status(&self) -> StatusSnapshot {
        let snapshot = self.registry.snapshot();
        let memory = Memory::measure(self.initial_memory);

        let health_checkers = self.aggregator.run(snapshot.checkers).await;
        let runtime = RuntimeStats::measure(self.aggregator.in_flight());

        debug!(
            service = %self.name,
            checkers = health_checkers.len(),
            shutting_down = snapshot.shutting_down,
            "Assembled status snapshot"
        );

        StatusSnapshot {
            service: self.name.clone(),
            uptime: self.started.elapsed(),
            start_time: self.start_time,
            memory,
            runtime,
            is_shutting_down: snapshot.shutting_down,
            health_checkers,
            metadata: self.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::checker::{CheckError, FnChecker};
    use crate::health::status::CheckStatus;

    #[tokio::test]
    async fn test_get_status() {
        let health = Health::new("service_test", HealthOptions::default());
        let status = health.status().await;

        assert_eq!(health.name(), "service_test");
        assert_eq!(status.service, "service_test");
        assert!(!status.is_shutting_down);
        assert!(status.health_checkers.is_empty());
        assert!(status.uptime < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_default_timeout() {
        let health = Health::new("service_test", HealthOptions::default());
        assert_eq!(health.checkers_timeout(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_shutdown_is_reported() {
        let health = Health::new("service_test", HealthOptions::default());
        health.shutdown();
        health.shutdown();

        assert!(health.is_shutting_down());
        assert!(health.status().await.is_shutting_down);
    }

    #[tokio::test]
    async fn test_reregistered_checker_replaces_old_one() {
        let health = Health::new("service_test", HealthOptions::default());
        let old_calls = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let counted = old_calls.clone();
        health.register_checker(
            "db",
            Arc::new(FnChecker::new(move || {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Ok::<(), CheckError>(()) }
            })),
        );
        health.register_checker(
            "db",
            Arc::new(FnChecker::new(|| async {
                Err::<(), CheckError>(CheckError::unhealthy("new checker"))
            })),
        );

        assert_eq!(health.checker_names(), vec!["db".to_string()]);

        let status = health.status().await;
        assert_eq!(status.health_checkers.len(), 1);
        assert_eq!(status.health_checkers["db"].status, CheckStatus::Checked);
        assert_eq!(status.health_checkers["db"].error.as_deref(), Some("new checker"));
        assert_eq!(old_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_metadata_is_echoed() {
        let mut options = HealthOptions::default();
        options.metadata.insert("version".to_string(), "1.2.3".to_string());
        let health = Health::new("service_test", options);

        let status = health.status().await;
        assert_eq!(status.metadata["version"], "1.2.3");
    }
}
