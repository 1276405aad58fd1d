// src/health/memory.rs
//
// Process memory and runtime statistics reported alongside checker results.
use serde::Serialize;

/// Memory usage of the process at one instant, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStatus {
    /// Resident set size.
    pub rss: u64,
    /// Virtual memory size.
    pub vms: u64,
}

impl MemoryStatus {
    /// Samples the current process. Platforms without `/proc` report zeros.
    pub fn read() -> Self {
        read_proc_status().unwrap_or_default()
    }
}

/// Signed change between two [`MemoryStatus`] samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryDiff {
    pub rss: i64,
    pub vms: i64,
}

impl MemoryDiff {
    pub fn between(current: MemoryStatus, initial: MemoryStatus) -> Self {
        Self {
            rss: signed_delta(current.rss, initial.rss),
            vms: signed_delta(current.vms, initial.vms),
        }
    }
}

/// Current, initial (taken when the health instance was created) and the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Memory {
    pub current: MemoryStatus,
    pub initial: MemoryStatus,
    pub diff: MemoryDiff,
}

impl Memory {
    pub fn measure(initial: MemoryStatus) -> Self {
        Self::from_samples(MemoryStatus::read(), initial)
    }

    pub fn from_samples(current: MemoryStatus, initial: MemoryStatus) -> Self {
        Self {
            current,
            initial,
            diff: MemoryDiff::between(current, initial),
        }
    }
}

/// Concurrency level of the hosting runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RuntimeStats {
    /// Tokio worker threads, zero when measured outside a runtime.
    pub workers: usize,
    /// Tasks currently alive on the runtime.
    pub alive_tasks: usize,
    /// Checker tasks still running, abandoned stragglers included.
    pub checks_in_flight: usize,
}

impl RuntimeStats {
    pub fn measure(checks_in_flight: usize) -> Self {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let metrics = handle.metrics();
                Self {
                    workers: metrics.num_workers(),
                    alive_tasks: metrics.num_alive_tasks(),
                    checks_in_flight,
                }
            }
            Err(_) => Self {
                checks_in_flight,
                ..Self::default()
            },
        }
    }
}

fn signed_delta(current: u64, initial: u64) -> i64 {
    if current >= initial {
        i64::try_from(current - initial).unwrap_or(i64::MAX)
    } else {
        i64::try_from(initial - current).map(|d| -d).unwrap_or(i64::MIN)
    }
}

#[cfg(target_os = "linux")]
fn read_proc_status() -> Option<MemoryStatus> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_proc_status(&status)
}

#[cfg(not(target_os = "linux"))]
fn read_proc_status() -> Option<MemoryStatus> {
    None
}

// VmRSS/VmSize are reported in kB regardless of the kernel page size.
#[cfg(target_os = "linux")]
fn parse_proc_status(status: &str) -> Option<MemoryStatus> {
    let mut rss = None;
    let mut vms = None;

    for line in status.lines() {
        if let Some(value) = line.strip_prefix("VmRSS:") {
            rss = parse_kb(value);
        } else if let Some(value) = line.strip_prefix("VmSize:") {
            vms = parse_kb(value);
        }
    }

    Some(MemoryStatus {
        rss: rss?,
        vms: vms?,
    })
}

#[cfg(target_os = "linux")]
fn parse_kb(value: &str) -> Option<u64> {
    value
        .split_whitespace()
        .next()?
        .parse::<u64>()
        .ok()
        .map(|kb| kb * 1024)
}
