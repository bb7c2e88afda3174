//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use std::time::Duration;

use eyre::Result;
use log::warn;

/// Nominal delay between two chore cycles.
pub const CYCLE_PERIOD: Duration = Duration::from_secs(1);

/// Extra sleep after a failed cycle, on top of the normal period.
///
/// An environment hiccup is usually followed by a burst of major faults;
/// acting on samples taken during that burst would be wrong, so the loop
/// stays quiet for ten seconds in total before sampling again.
pub const FAULT_COOL_DOWN: Duration = Duration::from_secs(9);

/// Run `work` once per period while `keep_running` returns true.
///
/// A failing cycle never ends the loop: the error is logged and the next
/// cycle is delayed by the fault cool-down.
pub fn run_cycle_loop<W, C>(work: W, keep_running: C)
where
    W: FnMut() -> Result<()>,
    C: FnMut() -> bool,
{
    run_cycle_loop_with_sleep(work, keep_running, |howlong| {
        interruptible_sleep(howlong);
    })
}

// std::thread::sleep automatically continues sleeping on SIGINT but we want
// to be interrupted so we use shuteye::sleep.
pub fn interruptible_sleep(howlong: Duration) {
    shuteye::sleep(howlong);
}

fn run_cycle_loop_with_sleep<W, C, S>(mut work: W, mut keep_running: C, mut sleep: S)
where
    W: FnMut() -> Result<()>,
    C: FnMut() -> bool,
    S: FnMut(Duration),
{
    while keep_running() {
        sleep(CYCLE_PERIOD);
        if let Err(e) = work() {
            warn!("Error in chore cycle: {:#}", e);
            sleep(FAULT_COOL_DOWN);
        }
    }
}
