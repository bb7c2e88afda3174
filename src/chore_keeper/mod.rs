//
// Copyright (c) Memfault, Inc.
// See License.txt for details
//! The chore keeper
//!
//! A single long-lived task that keeps the node alive when its co-tenant
//! services outgrow physical memory. Once per second it snapshots the
//! kernel memory counters and the process tree, rolls descendant usage up
//! into each managed service, and watches for sustained thrashing. When
//! the node has been thrashing for eight consecutive cycles it kills the
//! service the capacity declarations say is most affordable to lose, then
//! holds off further kills until the counters re-confirm the pressure.
//!
//! The kernel's own out-of-memory killer reacts only at the point of
//! allocation failure and is blind to service boundaries; by then the
//! node has usually been paging itself to death for a while.

mod aggregator;
mod executor;
mod sampler;
mod selector;
mod thrash;

pub use executor::{SigkillTerminator, Terminator};

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use log::{debug, info, warn};

use crate::supervisor::{ManagedProcess, ProcessRegistry};
use crate::util::task::{interruptible_sleep, run_cycle_loop};

use aggregator::{attribute_to_roots, write_back};
use sampler::{read_vmstat, scan_processes};
use selector::select_victim;
use thrash::{momentary_verdict, ThrashWindow};

const PROC_ROOT: &str = "/proc";
const VMSTAT_PATH: &str = "/proc/vmstat";

/// Nap length while standing down on a host without the needed counters.
const INERT_NAP: Duration = Duration::from_secs(60);

pub struct ChoreKeeper<R: ProcessRegistry> {
    proc_root: PathBuf,
    vmstat_path: PathBuf,
    keeper_pid: i32,
    registry: Arc<R>,
    terminator: Box<dyn Terminator + Send>,
    window: ThrashWindow,
}

impl<R: ProcessRegistry> ChoreKeeper<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self::with_environment(
            PathBuf::from(PROC_ROOT),
            PathBuf::from(VMSTAT_PATH),
            process::id() as i32,
            registry,
            Box::new(SigkillTerminator),
        )
    }

    fn with_environment(
        proc_root: PathBuf,
        vmstat_path: PathBuf,
        keeper_pid: i32,
        registry: Arc<R>,
        terminator: Box<dyn Terminator + Send>,
    ) -> Self {
        Self {
            proc_root,
            vmstat_path,
            keeper_pid,
            registry,
            terminator,
            window: ThrashWindow::new(),
        }
    }

    /// One pass of the pipeline: sample, aggregate, detect, select, kill.
    pub fn cycle(&mut self) -> Result<()> {
        let vmstat = read_vmstat(&self.vmstat_path);
        let mut view = scan_processes(&self.proc_root);

        attribute_to_roots(&mut view, self.keeper_pid);

        let managed = self.registry.managed_processes();
        write_back(&view, &managed);

        // An unreadable vmstat is an absent signal, not a cycle fault.
        let verdict = match vmstat {
            Ok(sample) => momentary_verdict(&sample),
            Err(e) => {
                debug!("No thrash signal this cycle: {:#}", e);
                false
            }
        };
        self.window.push(verdict);

        if self.window.is_sustained() {
            self.kill_one(&managed);
        }

        Ok(())
    }

    fn kill_one(&mut self, managed: &[Arc<ManagedProcess>]) {
        let victim = match select_victim(managed) {
            Some(victim) => victim,
            None => return,
        };
        info!(
            "Node is thrashing: terminating {} (pid {}, rss {} pages)",
            victim.spec().name,
            victim.pid(),
            victim.current_rss()
        );
        if let Err(e) = self.terminator.terminate(victim.pid()) {
            warn!("Unable to kill pid {}: {:#}", victim.pid(), e);
        }
        self.window.suppress();
    }

    /// Startup capability probe: both counter sources must exist.
    fn environment_supported(&self) -> bool {
        self.vmstat_path.is_file() && self.proc_root.join("1").join("stat").is_file()
    }

    /// Run the keeper until `keep_running` goes false.
    ///
    /// On a host without the needed proc files the keeper logs once and
    /// then idles forever instead of exiting; the surrounding daemon must
    /// not observe an error here.
    pub fn run<C: FnMut() -> bool>(&mut self, mut keep_running: C) {
        if !self.environment_supported() {
            info!(
                "{} or {} not available; chore keeper is standing down",
                self.vmstat_path.display(),
                self.proc_root.join("1").join("stat").display()
            );
            while keep_running() {
                interruptible_sleep(INERT_NAP);
            }
            return;
        }

        info!("Chore keeper watching {}", self.proc_root.display());
        run_cycle_loop(|| self.cycle(), keep_running);
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;
    use rstest::rstest;

    use super::executor::MockTerminator;
    use super::*;
    use crate::supervisor::SupervisorRegistry;
    use crate::test_utils::{service_spec, FakeProcTree};

    const KEEPER_PID: i32 = 50;

    fn keeper_on(
        tree: &FakeProcTree,
        registry: Arc<SupervisorRegistry>,
        terminator: MockTerminator,
    ) -> ChoreKeeper<SupervisorRegistry> {
        ChoreKeeper::with_environment(
            tree.path().to_path_buf(),
            tree.vmstat_path(),
            KEEPER_PID,
            registry,
            Box::new(terminator),
        )
    }

    /// Two managed services, one far over its declared peak, on a node
    /// whose counters indicate thrashing.
    fn thrashing_node() -> (FakeProcTree, Arc<SupervisorRegistry>) {
        let tree = FakeProcTree::new();
        tree.write_vmstat(100, 50, 50);
        tree.add_process(100, KEEPER_PID, 10, 0, 1000);
        tree.add_process(200, KEEPER_PID, 1, 0, 400);

        let registry = Arc::new(SupervisorRegistry::new());
        registry.register(ManagedProcess::new(100, service_spec("overgrown", 500, 500, 5)));
        registry.register(ManagedProcess::new(200, service_spec("wellbehaved", 400, 800, 5)));
        (tree, registry)
    }

    #[rstest]
    fn test_eight_thrashing_cycles_kill_exactly_once() {
        let (tree, registry) = thrashing_node();

        let mut terminator = MockTerminator::new();
        terminator
            .expect_terminate()
            .with(eq(100))
            .times(1)
            .returning(|_| Ok(()));

        let mut keeper = keeper_on(&tree, registry, terminator);

        // Seven cycles of thrashing are not yet sustained.
        for _ in 0..7 {
            keeper.cycle().unwrap();
        }
        // The eighth kills; the post-kill suppression holds for at least
        // seven more cycles even though the counters still say thrashing.
        for _ in 7..15 {
            keeper.cycle().unwrap();
        }
    }

    #[rstest]
    fn test_ample_free_ram_never_kills() {
        let (tree, registry) = thrashing_node();
        tree.write_vmstat(6000, 100, 100);

        let mut keeper = keeper_on(&tree, registry, MockTerminator::new());
        for _ in 0..10 {
            keeper.cycle().unwrap();
        }
    }

    #[rstest]
    fn test_missing_vmstat_counts_as_calm() {
        let (tree, registry) = thrashing_node();
        std::fs::remove_file(tree.vmstat_path()).unwrap();

        let mut keeper = keeper_on(&tree, registry, MockTerminator::new());
        for _ in 0..10 {
            keeper.cycle().unwrap();
        }
    }

    #[rstest]
    fn test_cycle_rolls_descendants_into_managed_totals() {
        let tree = FakeProcTree::new();
        tree.write_vmstat(6000, 0, 0);
        tree.add_process(100, KEEPER_PID, 1, 0, 1000);
        tree.add_process(101, 100, 2, 0, 200);
        tree.add_process(102, 101, 4, 0, 30);

        let registry = Arc::new(SupervisorRegistry::new());
        let service = registry.register(ManagedProcess::new(100, service_spec("forky", 500, 500, 5)));

        let mut keeper = keeper_on(&tree, registry, MockTerminator::new());
        keeper.cycle().unwrap();

        assert_eq!(service.current_rss(), 1230);
        assert_eq!(service.recent_page_faults(), 7);
    }

    #[rstest]
    fn test_managed_process_gone_is_zeroed() {
        let tree = FakeProcTree::new();
        tree.write_vmstat(6000, 0, 0);

        let registry = Arc::new(SupervisorRegistry::new());
        let service = registry.register(ManagedProcess::new(100, service_spec("departed", 500, 500, 5)));
        service.set_current_rss(900);
        service.set_page_faults(12);

        let mut keeper = keeper_on(&tree, registry, MockTerminator::new());
        keeper.cycle().unwrap();

        assert_eq!(service.current_rss(), 0);
        assert_eq!(service.recent_page_faults(), 0);
    }

    #[rstest]
    fn test_environment_probe() {
        let tree = FakeProcTree::new();
        tree.write_vmstat(0, 0, 0);
        tree.add_process(1, 0, 0, 0, 100);

        let registry = Arc::new(SupervisorRegistry::new());
        let keeper = keeper_on(&tree, registry.clone(), MockTerminator::new());
        assert!(keeper.environment_supported());

        let bare = FakeProcTree::new();
        let keeper = keeper_on(&bare, registry, MockTerminator::new());
        assert!(!keeper.environment_supported());
    }
}
