//
// Copyright (c) Memfault, Inc.
// See License.txt for details
//! Per-cycle snapshots of the kernel memory counters and the process tree
//!
//! Two sources feed each chore cycle:
//!
//! /proc/vmstat, one `name value` pair per line. Only three counters are
//! read: `nr_free_pages`, `pgmajfault` and `pgpgout`.
//!
//! /proc/<pid>/stat for every PID directory. Example contents:
//!
//!   55270 (nodesvc) S 1 55270 55270 0 -1 4194368 825 0 0 0 155 102 0 0 20 0 19 0 18548522 1411293184 4397 ...
//!
//! Field 2 is the executable name in parentheses; it may contain spaces
//! and parentheses of its own, so it is neutralized before the line is
//! split. Further documentation of the format can be found at:
//! https://man7.org/linux/man-pages/man5/proc_pid_stat.5.html

use std::collections::HashMap;
use std::fs::{read_dir, read_to_string};
use std::path::Path;

use eyre::{eyre, Result};
use nom::{
    bytes::complete::is_not,
    character::complete::{space0, space1, u64},
    combinator::all_consuming,
    sequence::terminated,
    IResult,
};

use crate::util::{die, EXIT_ENVIRONMENT_BROKEN};

/// Kernel memory counters for one cycle.
///
/// The thrash heuristic consumes these as raw momentary levels, not as
/// deltas against the previous cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VmStat {
    pub nr_free_pages: u64,
    pub pgmajfault: u64,
    pub pgpgout: u64,
}

/// One process as sampled from its stat file this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: i32,
    pub ppid: i32,
    /// Major faults of the process plus its waited-for children.
    pub majflt: u64,
    /// Resident set size, in pages.
    pub rss: u64,
}

/// The process tree as seen in one cycle, keyed by pid.
pub type ProcessView = HashMap<i32, RunningProcess>;

// stat(5) field numbers, 1-based.
const STAT_FIELD_PID: usize = 1;
const STAT_FIELD_PPID: usize = 4;
const STAT_FIELD_MAJFLT: usize = 12;
const STAT_FIELD_CMAJFLT: usize = 13;
const STAT_FIELD_RSS: usize = 24;

/// Parses the counter name at the start of a vmstat line.
///
/// Example input:
/// nr_free_pages 323899
/// Example output:
/// nr_free_pages
fn parse_vmstat_name(vmstat_line: &str) -> IResult<&str, &str> {
    terminated(is_not(" \t"), space1)(vmstat_line)
}

/// Parses the decimal counter value that follows the name.
///
/// The value must be the whole remaining token; `8364x` is not a counter.
fn parse_vmstat_value(vmstat_line_suffix: &str) -> IResult<&str, u64> {
    all_consuming(terminated(u64, space0))(vmstat_line_suffix)
}

/// Read the three recognized counters from a vmstat file.
///
/// Counters absent from the file stay zero. A recognized counter with an
/// unreadable value fails the whole read: a half-parsed sample must not
/// feed the thrash heuristic.
pub fn read_vmstat(path: &Path) -> Result<VmStat> {
    parse_vmstat(&read_to_string(path)?)
}

fn parse_vmstat(contents: &str) -> Result<VmStat> {
    let mut vmstat = VmStat::default();
    for line in contents.lines() {
        let (suffix, name) = match parse_vmstat_name(line) {
            Ok(parsed) => parsed,
            Err(_) => continue,
        };
        let counter = match name {
            "nr_free_pages" => &mut vmstat.nr_free_pages,
            "pgmajfault" => &mut vmstat.pgmajfault,
            "pgpgout" => &mut vmstat.pgpgout,
            _ => continue,
        };
        let (_, value) = parse_vmstat_value(suffix)
            .map_err(|_| eyre!("Unreadable {} value in vmstat", name))?;
        *counter = value;
    }
    Ok(vmstat)
}

/// Rewrites the executable-name field so the line splits cleanly on
/// whitespace.
///
/// Everything from the first `(` through the last `)` is overwritten with
/// a filler digit. The name may contain spaces and parentheses, so the
/// scan goes to the last `)` on the line; nothing after the name ever
/// contains one.
fn neutralize_comm(stat_line: &str) -> Option<String> {
    let open = stat_line.find('(')?;
    let close = stat_line.rfind(')')?;
    if close < open {
        return None;
    }

    let mut bytes = stat_line.as_bytes().to_vec();
    for byte in &mut bytes[open..=close] {
        *byte = b'0';
    }
    String::from_utf8(bytes).ok()
}

/// Parses one stat line into a sample record.
///
/// Only pid, ppid, the two major-fault counters and rss are extracted; a
/// record missing any of them, or carrying a non-numeric value, is
/// dropped entirely.
pub fn parse_stat_line(stat_line: &str) -> Option<RunningProcess> {
    let neutral = neutralize_comm(stat_line)?;
    let fields: Vec<&str> = neutral.split_whitespace().collect();
    let field = |number: usize| fields.get(number - 1);

    let pid: i32 = field(STAT_FIELD_PID)?.parse().ok()?;
    let ppid: i32 = field(STAT_FIELD_PPID)?.parse().ok()?;
    let majflt: u64 = field(STAT_FIELD_MAJFLT)?.parse().ok()?;
    let cmajflt: u64 = field(STAT_FIELD_CMAJFLT)?.parse().ok()?;
    let rss: u64 = field(STAT_FIELD_RSS)?.parse().ok()?;

    if pid < 1 || ppid < 0 {
        return None;
    }

    Some(RunningProcess {
        pid,
        ppid,
        majflt: majflt + cmajflt,
        rss,
    })
}

/// True for directory entries that look like PID directories.
///
/// A final decimal digit is enough to separate them from the named
/// entries in /proc; false positives just fail the stat read below.
fn is_pid_entry(name: &str) -> bool {
    name.chars().last().map_or(false, |c| c.is_ascii_digit())
}

/// Snapshot every visible process under `proc_root`.
///
/// Entries that vanish mid-scan or fail to parse are skipped silently.
/// Failing to enumerate the directory itself means the environment the
/// keeper was built for is gone, and takes the daemon down.
pub fn scan_processes(proc_root: &Path) -> ProcessView {
    let entries = match read_dir(proc_root) {
        Ok(entries) => entries,
        Err(e) => die(
            EXIT_ENVIRONMENT_BROKEN,
            eyre!("Unable to enumerate {}: {}", proc_root.display(), e),
        ),
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_pid_entry(&entry.file_name().to_string_lossy()))
        .filter_map(|entry| read_to_string(entry.path().join("stat")).ok())
        .filter_map(|contents| contents.lines().next().and_then(parse_stat_line))
        .map(|process| (process.pid, process))
        .collect()
}
