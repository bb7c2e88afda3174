//
// Copyright (c) Memfault, Inc.
// See License.txt for details
#[cfg(target_os = "linux")]
use libc::{sysconf, _SC_PAGE_SIZE};

#[cfg(target_os = "linux")]
pub fn bytes_per_page() -> u64 {
    unsafe { sysconf(_SC_PAGE_SIZE) as u64 }
}

/// Mock implementation for non-Linux systems. Designed for development. Not actual use.
#[cfg(not(target_os = "linux"))]
pub fn bytes_per_page() -> u64 {
    4096
}
