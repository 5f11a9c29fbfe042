//! Marine autopilot and NMEA-0183 hub daemon.
//!
//! Usage:
//!   helmsman -c /etc/helmsman/helmsman.conf
//!   helmsman -c /etc/helmsman/helmsman.conf --foreground   # log to stderr

mod actuator;
mod attitude;
mod autopilot;
mod command;
mod config;
mod error;
mod logger;
mod nmea;
mod relay;
mod serial;
mod state;
mod supervisor;
mod udp;
mod usb;
mod util;

use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::error;

use crate::supervisor::Supervisor;
use crate::usb::UdevFinder;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "helmsman", about = "Marine autopilot and NMEA-0183 hub")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", default_value = "/etc/helmsman/helmsman.conf")]
    config: PathBuf,

    /// Log to stderr instead of syslog (useful for debugging).
    #[arg(long)]
    foreground: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match config::load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("helmsman: config error: {e}");
            process::exit(1);
        }
    };

    setup_logging(!cli.foreground).expect("failed to set up logging");

    if let Err(e) = util::write_pid_file(&PathBuf::from("/var/run/helmsman.pid")) {
        error!("cannot write PID file: {e}");
    }

    let supervisor = Supervisor::with_finder(cfg, UdevFinder);
    if let Err(e) = supervisor.run().await {
        error!("helmsman exiting: {e}");
        util::remove_pid_file(&PathBuf::from("/var/run/helmsman.pid"));
        process::exit(1);
    }

    util::remove_pid_file(&PathBuf::from("/var/run/helmsman.pid"));
}

// ── Logging setup ─────────────────────────────────────────────────────────────

fn setup_logging(use_syslog: bool) -> anyhow::Result<()> {
    if use_syslog {
        let formatter = syslog::Formatter3164 {
            facility: syslog::Facility::LOG_DAEMON,
            hostname: None,
            process: "helmsman".into(),
            pid: process::id(),
        };
        let logger = syslog::unix(formatter)
            .map_err(|e| anyhow::anyhow!("syslog connect failed: {e}"))?;
        log::set_boxed_logger(Box::new(syslog::BasicLogger::new(logger)))
            .map(|()| log::set_max_level(log::LevelFilter::Info))
            .map_err(|e| anyhow::anyhow!("set_logger: {e}"))?;
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }
    Ok(())
}
