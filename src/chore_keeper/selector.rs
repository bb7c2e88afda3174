//
// Copyright (c) Memfault, Inc.
// See License.txt for details
//! Victim selection under sustained thrashing
//!
//! Five policies run in strict order; the first one that names a victim
//! wins. Broken capacity promises come first, then observed suffering,
//! then declared worth, and as a last resort sheer size.

use std::sync::Arc;

use crate::supervisor::ManagedProcess;

/// Pick the managed process to kill, if any qualifies.
pub fn select_victim(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    furthest_over_peak(managed)
        .or_else(|| furthest_over_typical(managed))
        .or_else(|| thrashing_most(managed))
        .or_else(|| least_valuable(managed))
        .or_else(|| biggest(managed))
}

/// The process furthest above its declared peak memory, if any is over.
fn furthest_over_peak(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    furthest_over(managed, |process| process.spec().expected_peak_memory)
}

/// The process furthest above its declared typical memory, if any is over.
fn furthest_over_typical(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    furthest_over(managed, |process| process.spec().expected_typical_memory)
}

fn furthest_over(
    managed: &[Arc<ManagedProcess>],
    limit: impl Fn(&ManagedProcess) -> u64,
) -> Option<Arc<ManagedProcess>> {
    managed
        .iter()
        .filter_map(|process| {
            process
                .current_rss()
                .checked_sub(limit(process))
                .filter(|overshoot| *overshoot > 0)
                .map(|overshoot| (process, overshoot))
        })
        .max_by_key(|(_, overshoot)| *overshoot)
        .map(|(process, _)| Arc::clone(process))
}

/// The process with strictly the most recent page faults.
///
/// None qualifies unless some process is being served strictly worse than
/// another; with every process faulting equally there is no worst victim
/// to single out.
fn thrashing_most(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    let least = managed
        .iter()
        .map(|process| process.recent_page_faults())
        .min()?;
    let worst = managed
        .iter()
        .max_by_key(|process| process.recent_page_faults())?;
    (worst.recent_page_faults() > least).then(|| Arc::clone(worst))
}

/// The process with strictly the lowest declared value.
///
/// None qualifies when every process is declared equally valuable.
fn least_valuable(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    let most = managed.iter().map(|process| process.spec().value).max()?;
    let cheapest = managed.iter().min_by_key(|process| process.spec().value)?;
    (cheapest.spec().value < most).then(|| Arc::clone(cheapest))
}

/// The process with the largest resident set. Only an empty registry
/// leaves this empty-handed.
fn biggest(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    managed
        .iter()
        .max_by_key(|process| process.current_rss())
        .map(Arc::clone)
}
