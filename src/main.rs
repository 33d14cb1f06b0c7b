//! Command-line frontend for the `thermo_daq` logger.
//!
//! Wires a `LoggerApp` to a real serial port (or the simulated instrument),
//! drives its tick loop from a tokio interval, and shuts the session down
//! cleanly on Ctrl+C.

use std::time::Instant;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use thermo_daq::app::LoggerApp;
use thermo_daq::config::Settings;
use thermo_daq::instrument::{self, mock::MockFluke};

// Use mimalloc as the global allocator for better performance (M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "thermo-daq")]
#[command(about = "Multi-channel temperature logger for a Fluke 1529 readout", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a logging session
    Run {
        /// Configuration name under config/ (defaults to "default")
        #[arg(long)]
        config: Option<String>,

        /// Serial port override, e.g. /dev/ttyUSB0 or COM4
        #[arg(long)]
        port: Option<String>,

        /// Baud rate override
        #[arg(long)]
        baud: Option<u32>,

        /// Log from a simulated instrument instead of real hardware
        #[arg(long)]
        mock: bool,

        /// Push the host date and time to the instrument at session start
        #[arg(long)]
        sync_clock: bool,
    },

    /// List the serial ports visible on this machine
    ListPorts,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, port, baud, mock, sync_clock } => {
            run(config, port, baud, mock, sync_clock).await
        }
        Commands::ListPorts => list_ports(),
    }
}

async fn run(
    config: Option<String>,
    port: Option<String>,
    baud: Option<u32>,
    mock: bool,
    sync_clock: bool,
) -> Result<()> {
    let mut settings = Settings::new(config.as_deref())?;
    if let Some(port) = port {
        settings.serial.port = port;
    }
    if let Some(baud) = baud {
        settings.serial.baud_rate = baud;
    }
    init_logging(&settings.log_level);

    println!("🌡️  Thermo DAQ - Fluke 1529 Data Logger");

    let mut app = LoggerApp::new(settings)?;
    if mock {
        let period = app.settings().acquisition.measure_period;
        let units = app.settings().acquisition.channel_units;
        app.start_with_port(Box::new(MockFluke::synthetic(period, units)))?;
        println!("🔧 Using a simulated instrument (--mock)");
    } else {
        println!("📡 Connecting to '{}'...", app.settings().serial.port);
        app.start()?;
    }
    if sync_clock {
        app.calibrate_clock(Local::now().naive_local())?;
        println!("🕐 Instrument clock sync queued");
    }
    println!(
        "▶️  Logging to '{}' - press Ctrl+C to stop",
        app.settings().storage.save_dir.display()
    );

    let mut ticker = tokio::time::interval(app.settings().acquisition.tick_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = ticker.tick() => app.tick(Instant::now()),
            _ = &mut ctrl_c => break,
        }
    }

    println!();
    println!("👋 Stopping logging...");
    app.stop()?;
    println!("✅ {}", app.status());
    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = instrument::list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {port}");
        }
    }
    Ok(())
}

fn init_logging(level: &str) {
    env_logger::Builder::from_default_env()
        .filter_level(level.parse().unwrap_or(LevelFilter::Info))
        .format_timestamp(None)
        .format_module_path(false)
        .init();
}
