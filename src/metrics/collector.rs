// src/metrics/collector.rs
use crate::health::{CheckResult, CheckStatus};
use anyhow::{Context, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Duration;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("Failed to encode metrics")?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Checker metrics
    pub checks_total: IntCounterVec,
    pub check_duration_seconds: HistogramVec,
    pub checks_in_flight: IntGauge,
    pub registered_checkers: IntGauge,

    // Round metrics
    pub rounds_total: IntCounter,
    pub round_duration_seconds: Histogram,

    // Lifecycle
    pub shutting_down: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let checks_total = IntCounterVec::new(
            Opts::new("health_checks_total", "Checker invocations by outcome"),
            &["checker", "outcome"],
        )?;
        registry.register(Box::new(checks_total.clone()))?;

        let check_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "health_check_duration_seconds",
                "Checker response time in seconds",
            ),
            &["checker"],
        )?;
        registry.register(Box::new(check_duration_seconds.clone()))?;

        let checks_in_flight = IntGauge::new(
            "health_checks_in_flight",
            "Checker tasks still running, abandoned ones included",
        )?;
        registry.register(Box::new(checks_in_flight.clone()))?;

        let registered_checkers =
            IntGauge::new("health_registered_checkers", "Number of registered checkers")?;
        registry.register(Box::new(registered_checkers.clone()))?;

        let rounds_total = IntCounter::new("health_rounds_total", "Total aggregation rounds")?;
        registry.register(Box::new(rounds_total.clone()))?;

        let round_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "health_round_duration_seconds",
            "Aggregation round duration in seconds",
        ))?;
        registry.register(Box::new(round_duration_seconds.clone()))?;

        let shutting_down = IntGauge::new(
            "health_shutting_down",
            "Whether shutdown was signalled (1=shutting down)",
        )?;
        registry.register(Box::new(shutting_down.clone()))?;

        Ok(Self {
            checks_total,
            check_duration_seconds,
            checks_in_flight,
            registered_checkers,
            rounds_total,
            round_duration_seconds,
            shutting_down,
        })
    }

    pub fn record_check(&self, result: &CheckResult) {
        let outcome = match (result.status, &result.error) {
            (CheckStatus::Timeout, _) => "timeout",
            (CheckStatus::Checked, Some(_)) => "error",
            (CheckStatus::Checked, None) => "ok",
        };

        self.checks_total
            .with_label_values(&[result.name.as_str(), outcome])
            .inc();

        self.check_duration_seconds
            .with_label_values(&[result.name.as_str()])
            .observe(result.response_time.as_secs_f64());
    }

    pub fn record_round(&self, duration: Duration) {
        self.rounds_total.inc();
        self.round_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn update_checks_in_flight(&self, count: usize) {
        self.checks_in_flight.set(count as i64);
    }

    pub fn update_registered_checkers(&self, count: usize) {
        self.registered_checkers.set(count as i64);
    }

    pub fn update_shutting_down(&self, shutting_down: bool) {
        self.shutting_down.set(if shutting_down { 1 } else { 0 });
    }
}
