//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use eyre::Result;
use log::info;
use nix::sys::signal::{kill, Signal::SIGKILL};
use nix::unistd::Pid;

/// Delivery of a kill decision, separated from the decision itself.
#[cfg_attr(test, mockall::automock)]
pub trait Terminator {
    fn terminate(&self, pid: i32) -> Result<()>;
}

/// Kills with SIGKILL, no grace period. A node that has been thrashing
/// for eight cycles cannot wait for a victim to schedule its shutdown
/// handlers.
pub struct SigkillTerminator;

impl Terminator for SigkillTerminator {
    fn terminate(&self, pid: i32) -> Result<()> {
        info!("Reclaiming memory: killing process {}", pid);
        kill(Pid::from_raw(pid), SIGKILL)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::Command;

    use super::*;

    #[test]
    fn test_sigkill_is_delivered() {
        let mut child = Command::new("sleep").arg("60").spawn().unwrap();

        SigkillTerminator
            .terminate(child.id() as i32)
            .unwrap();

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }
}
