//
// Copyright (c) Memfault, Inc.
// See License.txt for details
//! Rolls per-process samples up into per-service totals
//!
//! Managed services fork workers; the memory a service occupies is the
//! memory of its whole process subtree. Each cycle, every sampled
//! process's usage is added to its attribution root: the ancestor whose
//! parent is the keeper itself, or which has no parent at all. The roots'
//! totals are then pushed into the managed-process registry.

use std::sync::Arc;

use super::sampler::ProcessView;
use crate::supervisor::ManagedProcess;

/// Fold every sampled process's rss and major faults into its attribution
/// root's view entry.
///
/// Only root entries are ever written, and the walk reads nothing but
/// pids and ppids, so mutating totals mid-pass is safe.
pub fn attribute_to_roots(view: &mut ProcessView, keeper_pid: i32) {
    let pids: Vec<i32> = view.keys().copied().collect();
    for pid in pids {
        let root = attribution_root(view, pid, keeper_pid);
        if root == pid {
            continue;
        }
        let (rss, majflt) = match view.get(&pid) {
            Some(sample) => (sample.rss, sample.majflt),
            None => continue,
        };
        if let Some(target) = view.get_mut(&root) {
            target.rss += rss;
            target.majflt += majflt;
        }
    }
}

/// Walk the parent chain of `pid` inside the view until it halts.
///
/// The walk halts at a node with pid 0 or ppid 0, at a node whose parent
/// is the keeper, or at a node whose parent was not sampled this cycle
/// (it exited between the directory listing and the read). The step limit
/// guards against ppid cycles in a malformed view.
fn attribution_root(view: &ProcessView, pid: i32, keeper_pid: i32) -> i32 {
    let mut current = pid;
    for _ in 0..view.len() {
        let process = match view.get(&current) {
            Some(process) => process,
            None => break,
        };
        if process.pid == 0 || process.ppid == 0 || process.ppid == keeper_pid {
            break;
        }
        if !view.contains_key(&process.ppid) {
            break;
        }
        current = process.ppid;
    }
    current
}

/// Push the rolled-up totals into the registry's managed processes.
///
/// A managed pid absent from the view was not observed this cycle; its
/// fields are zeroed rather than left holding stale values.
pub fn write_back(view: &ProcessView, managed: &[Arc<ManagedProcess>]) {
    for process in managed {
        match view.get(&process.pid()) {
            Some(sample) => {
                process.set_current_rss(sample.rss);
                process.set_page_faults(sample.majflt);
            }
            None => {
                process.set_current_rss(0);
                process.set_page_faults(0);
            }
        }
    }
}
