//
// Copyright (c) Memfault, Inc.
// See License.txt for details
//! Service supervision
//!
//! This module owns the registry of managed service processes and the
//! Init-style launcher that spawns them. The chore keeper consumes the
//! registry through the `ProcessRegistry` trait and updates each managed
//! process's observable resource fields once per cycle.

mod launcher;
mod managed_process;

pub use launcher::ServiceLauncher;
pub use managed_process::{ManagedProcess, ServiceSpec};

use std::sync::{Arc, Mutex};

/// Source of the processes the chore keeper samples, attributes usage to,
/// and may kill.
///
/// Implementations hand out a snapshot: the returned set must not change
/// under the keeper mid-cycle. Registration and removal happen between
/// snapshots.
pub trait ProcessRegistry {
    fn managed_processes(&self) -> Vec<Arc<ManagedProcess>>;
}

/// Registry of currently live supervised services.
#[derive(Default)]
pub struct SupervisorRegistry {
    processes: Mutex<Vec<Arc<ManagedProcess>>>,
}

impl SupervisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, process: ManagedProcess) -> Arc<ManagedProcess> {
        let process = Arc::new(process);
        self.processes
            .lock()
            .expect("Mutex poisoned")
            .push(process.clone());
        process
    }

    pub fn deregister(&self, pid: i32) {
        self.processes
            .lock()
            .expect("Mutex poisoned")
            .retain(|process| process.pid() != pid);
    }
}

impl ProcessRegistry for SupervisorRegistry {
    fn managed_processes(&self) -> Vec<Arc<ManagedProcess>> {
        self.processes.lock().expect("Mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::service_spec;

    #[test]
    fn test_register_and_deregister() {
        let registry = SupervisorRegistry::new();
        registry.register(ManagedProcess::new(10, service_spec("a", 100, 200, 1)));
        registry.register(ManagedProcess::new(20, service_spec("b", 100, 200, 1)));

        let pids: Vec<i32> = registry
            .managed_processes()
            .iter()
            .map(|p| p.pid())
            .collect();
        assert_eq!(pids, vec![10, 20]);

        registry.deregister(10);
        let pids: Vec<i32> = registry
            .managed_processes()
            .iter()
            .map(|p| p.pid())
            .collect();
        assert_eq!(pids, vec![20]);
    }

    #[test]
    fn test_snapshot_is_detached_from_registry() {
        let registry = SupervisorRegistry::new();
        registry.register(ManagedProcess::new(10, service_spec("a", 100, 200, 1)));

        let snapshot = registry.managed_processes();
        registry.deregister(10);

        // The handed-out snapshot is unaffected by later removals.
        assert_eq!(snapshot.len(), 1);
        assert!(registry.managed_processes().is_empty());
    }
}
