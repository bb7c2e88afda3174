//
// Copyright (c) Memfault, Inc.
// See License.txt for details
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use argh::FromArgs;
use eyre::{eyre, Result, WrapErr};
use log::{info, warn, LevelFilter};

use crate::chore_keeper::ChoreKeeper;
use crate::config::ChoredConfig;
use crate::supervisor::{ProcessRegistry, ServiceLauncher, SupervisorRegistry};
use crate::util::task::{interruptible_sleep, CYCLE_PERIOD};

use super::init_logger;

#[derive(FromArgs)]
/// Chore-keeping supervisor daemon.
struct ChoredArgs {
    /// use service declaration file
    #[argh(option, short = 'c')]
    config_file: Option<String>,

    #[argh(switch, short = 'v')]
    /// verbose output
    verbose: bool,

    #[argh(switch, short = 'q')]
    /// quiet - no output
    quiet: bool,

    #[argh(switch)]
    /// show version
    version: bool,
}

pub fn main() -> Result<()> {
    let args: ChoredArgs = argh::from_env();

    init_logger(match (args.quiet, args.verbose) {
        (true, _) => LevelFilter::Off,
        (false, true) => LevelFilter::Trace,
        _ => LevelFilter::Info,
    });

    if args.version {
        println!("chored {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config_path = args
        .config_file
        .as_deref()
        .map(Path::new)
        .unwrap_or_else(|| Path::new(ChoredConfig::DEFAULT_CONFIG_PATH));
    let config =
        ChoredConfig::load(config_path).wrap_err(eyre!("Unable to load service declarations"))?;

    // Register a flag which will be set when one of these signals is received.
    let term = Arc::new(AtomicBool::new(false));
    for signal in [
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
        signal_hook::consts::SIGHUP,
    ] {
        signal_hook::flag::register(signal, Arc::clone(&term))?;
    }

    let registry = Arc::new(SupervisorRegistry::new());
    let launcher = ServiceLauncher::new(Arc::clone(&registry));
    for spec in config.service_specs() {
        if let Err(e) = launcher.launch(spec) {
            warn!("{:#}", e);
        }
    }

    info!(
        "chored started with {} declared services",
        registry.managed_processes().len()
    );

    let keeper_registry = Arc::clone(&registry);
    let keeper_term = Arc::clone(&term);
    let keeper = thread::Builder::new()
        .name("chore-keeper".into())
        .spawn(move || {
            ChoreKeeper::new(keeper_registry).run(|| !keeper_term.load(Ordering::Relaxed))
        })?;

    while !term.load(Ordering::Relaxed) {
        launcher.reap();
        interruptible_sleep(CYCLE_PERIOD);
    }

    info!("Termination signal received, shutting down");
    keeper
        .join()
        .map_err(|_| eyre!("Chore keeper thread panicked"))?;
    Ok(())
}
