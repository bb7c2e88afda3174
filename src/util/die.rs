//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use eyre::Report;
use log::error;

/// Exit status for a broken host environment: the process listing the
/// keeper depends on is no longer enumerable.
pub const EXIT_ENVIRONMENT_BROKEN: i32 = 3;

/// Logs the error and terminates the whole process with `status`.
///
/// The keeper runs on a worker thread; a panic there would leave the rest
/// of the daemon running without supervision, so irrecoverable faults take
/// the process down instead.
pub fn die(status: i32, e: Report) -> ! {
    error!("Irrecoverable error: {:#}", e);
    std::process::exit(status)
}
