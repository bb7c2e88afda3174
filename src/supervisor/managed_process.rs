//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use std::sync::atomic::{AtomicU64, Ordering};

/// Declared capacity and worth of one managed service.
///
/// Memory figures are in pages, the unit the kernel reports resident set
/// sizes in. `value` is a relative priority: the higher it is, the longer
/// the service survives under memory pressure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub command: Vec<String>,
    pub expected_typical_memory: u64,
    pub expected_peak_memory: u64,
    pub value: i64,
}

/// A service process spawned and tracked by the supervisor.
///
/// The chore keeper is the only writer of the observable fields. They are
/// atomics so the rest of the daemon can read a consistent value without
/// taking the registry lock.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: i32,
    spec: ServiceSpec,
    current_rss: AtomicU64,
    recent_page_faults: AtomicU64,
}

impl ManagedProcess {
    pub fn new(pid: i32, spec: ServiceSpec) -> Self {
        Self {
            pid,
            spec,
            current_rss: AtomicU64::new(0),
            recent_page_faults: AtomicU64::new(0),
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// Resident set size observed in the last chore cycle, in pages,
    /// including every descendant attributed to this process.
    pub fn current_rss(&self) -> u64 {
        self.current_rss.load(Ordering::Relaxed)
    }

    pub fn set_current_rss(&self, pages: u64) {
        self.current_rss.store(pages, Ordering::Relaxed);
    }

    /// Major faults observed in the last chore cycle, descendants included.
    pub fn recent_page_faults(&self) -> u64 {
        self.recent_page_faults.load(Ordering::Relaxed)
    }

    pub fn set_page_faults(&self, count: u64) {
        self.recent_page_faults.store(count, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observable_fields_start_at_zero() {
        let process = ManagedProcess::new(
            42,
            ServiceSpec {
                name: "echoservice".to_string(),
                command: vec!["echoservice".to_string()],
                expected_typical_memory: 1000,
                expected_peak_memory: 2000,
                value: 5,
            },
        );

        assert_eq!(process.pid(), 42);
        assert_eq!(process.current_rss(), 0);
        assert_eq!(process.recent_page_faults(), 0);

        process.set_current_rss(1234);
        process.set_page_faults(7);
        assert_eq!(process.current_rss(), 1234);
        assert_eq!(process.recent_page_faults(), 7);
    }
}
