//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use std::process::Command;
use std::sync::Arc;

use eyre::{eyre, Result, WrapErr};
use log::{info, warn};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use super::{ManagedProcess, ServiceSpec, SupervisorRegistry};

/// Launches declared services and reaps them when they exit.
///
/// There is no restart policy here: whether a dead service comes back is
/// the control plane's decision, not the supervisor's.
pub struct ServiceLauncher {
    registry: Arc<SupervisorRegistry>,
}

impl ServiceLauncher {
    pub fn new(registry: Arc<SupervisorRegistry>) -> Self {
        Self { registry }
    }

    /// Spawn one service and register it as a managed process.
    pub fn launch(&self, spec: ServiceSpec) -> Result<Arc<ManagedProcess>> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| eyre!("Service {} declares an empty command", spec.name))?;

        let child = Command::new(program)
            .args(args)
            .spawn()
            .wrap_err_with(|| eyre!("Unable to launch service {}", spec.name))?;

        let pid = child.id() as i32;
        info!("Launched service {} (pid {})", spec.name, pid);
        Ok(self.registry.register(ManagedProcess::new(pid, spec)))
    }

    /// Deregister any children that have exited since the last call.
    ///
    /// The keeper kills with SIGKILL; without reaping, a victim would
    /// linger in the registry as a zombie and keep being selected.
    pub fn reap(&self) {
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, status)) => {
                    warn!("Service process {} exited with status {}", pid, status);
                    self.registry.deregister(pid.as_raw());
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    warn!("Service process {} was killed by {}", pid, signal);
                    self.registry.deregister(pid.as_raw());
                }
                Ok(WaitStatus::StillAlive) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    }
}
