//
// Copyright (c) Memfault, Inc.
// See License.txt for details
//! Chored test utils
//!
//! A synthetic /proc tree and small constructors shared by the unit
//! tests.

use std::fs::{create_dir, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::supervisor::{ManagedProcess, ServiceSpec};

/// A fake /proc directory with a vmstat file and per-pid stat files.
pub struct FakeProcTree {
    root: TempDir,
}

impl FakeProcTree {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn vmstat_path(&self) -> PathBuf {
        self.path().join("vmstat")
    }

    /// Write the vmstat file with the three counters the keeper reads,
    /// plus a line it must ignore.
    pub fn write_vmstat(&self, nr_free_pages: u64, pgmajfault: u64, pgpgout: u64) {
        let mut file = File::create(self.vmstat_path()).unwrap();
        writeln!(file, "nr_free_pages {}", nr_free_pages).unwrap();
        writeln!(file, "pgpgin 5829444").unwrap();
        writeln!(file, "pgpgout {}", pgpgout).unwrap();
        writeln!(file, "pgmajfault {}", pgmajfault).unwrap();
    }

    /// Create `<pid>/stat` holding a well-formed stat line.
    pub fn add_process(&self, pid: i32, ppid: i32, majflt: u64, cmajflt: u64, rss: u64) {
        self.add_raw_process(pid, &stat_line(pid, "nodesvc", ppid, majflt, cmajflt, rss));
    }

    /// Create `<pid>/stat` with arbitrary contents.
    pub fn add_raw_process(&self, pid: i32, contents: &str) {
        let dir = self.path().join(pid.to_string());
        create_dir(&dir).unwrap();
        let mut file = File::create(dir.join("stat")).unwrap();
        writeln!(file, "{}", contents).unwrap();
    }

    /// Create a named (non-pid) directory, as /proc is full of.
    pub fn add_named_dir(&self, name: &str) {
        create_dir(self.path().join(name)).unwrap();
    }
}

/// Render a stat line from the fields the sampler extracts; everything
/// else is fixed filler in the shape the kernel produces.
pub fn stat_line(pid: i32, comm: &str, ppid: i32, majflt: u64, cmajflt: u64, rss: u64) -> String {
    format!(
        "{pid} ({comm}) S {ppid} {pid} {pid} 0 -1 4194368 825 0 {majflt} {cmajflt} 155 102 0 0 \
         20 0 19 0 18548522 1411293184 {rss} 18446744073709551615 1 1 0 0 0 0 0 4096 17987 0 0 0 \
         17 7 0 0 0 0 0"
    )
}

pub fn service_spec(name: &str, typical: u64, peak: u64, value: i64) -> ServiceSpec {
    ServiceSpec {
        name: name.to_string(),
        command: vec![name.to_string()],
        expected_typical_memory: typical,
        expected_peak_memory: peak,
        value,
    }
}

pub fn managed_process(
    pid: i32,
    name: &str,
    typical: u64,
    peak: u64,
    value: i64,
) -> Arc<ManagedProcess> {
    Arc::new(ManagedProcess::new(pid, service_spec(name, typical, peak, value)))
}
