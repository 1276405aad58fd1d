// src/health/status.rs
use super::memory::{Memory, RuntimeStats};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// The checker answered within the round budget, healthy or not.
    Checked,
    /// No answer arrived before the round budget ran out.
    Timeout,
}

/// Outcome of one checker in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub error: Option<String>,
    #[serde(serialize_with = "serialize_duration")]
    pub response_time: Duration,
}

impl CheckResult {
    pub fn checked(name: impl Into<String>, error: Option<String>, response_time: Duration) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Checked,
            error,
            response_time,
        }
    }

    pub fn timed_out(name: impl Into<String>, budget: Duration) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Timeout,
            error: None,
            response_time: budget,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == CheckStatus::Checked && self.error.is_none()
    }
}

/// Health report built fresh for every status request.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub service: String,
    #[serde(rename = "up_time", serialize_with = "serialize_duration")]
    pub uptime: Duration,
    pub start_time: DateTime<Utc>,
    pub memory: Memory,
    pub runtime: RuntimeStats,
    pub is_shutting_down: bool,
    pub health_checkers: BTreeMap<String, CheckResult>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl StatusSnapshot {
    /// True when every checker answered without an error.
    pub fn all_healthy(&self) -> bool {
        self.health_checkers.values().all(CheckResult::is_healthy)
    }
}

fn serialize_duration<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&format_args!("{:?}", duration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_result_wire_shape() {
        let result = CheckResult::checked(
            "db",
            Some("Service unreachable".to_string()),
            Duration::from_millis(12),
        );

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "db",
                "status": "CHECKED",
                "error": "Service unreachable",
                "response_time": "12ms",
            })
        );
    }

    #[test]
    fn test_all_healthy() {
        let mut snapshot = StatusSnapshot {
            service: "orders".to_string(),
            uptime: Duration::from_secs(3),
            start_time: Utc::now(),
            memory: Memory::from_samples(Default::default(), Default::default()),
            runtime: RuntimeStats::default(),
            is_shutting_down: false,
            health_checkers: BTreeMap::new(),
            metadata: BTreeMap::new(),
        };
        assert!(snapshot.all_healthy());

        snapshot.health_checkers.insert(
            "db".to_string(),
            CheckResult::checked("db", None, Duration::from_millis(3)),
        );
        assert!(snapshot.all_healthy());

        snapshot.health_checkers.insert(
            "api".to_string(),
            CheckResult::timed_out("api", Duration::from_secs(1)),
        );
        assert!(!snapshot.all_healthy());
    }

    #[test]
    fn test_timed_out_result_carries_budget() {
        let result = CheckResult::timed_out("cache", Duration::from_secs(1));

        assert_eq!(result.status, CheckStatus::Timeout);
        assert_eq!(result.error, None);
        assert_eq!(result.response_time, Duration::from_secs(1));
        assert!(!result.is_healthy());

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "TIMEOUT");
        assert!(value["error"].is_null());
    }
}
