#![allow(clippy::print_stdout, clippy::print_stderr)]
//
// Copyright (c) Memfault, Inc.
// See License.txt for details

use log::LevelFilter;
use stderrlog::{LogLevelNum, StdErrLog};

mod chored;

fn build_logger(level: LevelFilter) -> StdErrLog {
    let mut log = stderrlog::new();

    log.module("chored");
    log.verbosity(LogLevelNum::from(level));

    log
}

fn init_logger(level: LevelFilter) {
    build_logger(level).init().unwrap();
}

pub fn main() {
    match chored::main() {
        Ok(_) => (),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(-1);
        }
    }
}
