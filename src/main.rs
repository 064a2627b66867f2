mod cli;
mod ui;

use std::process::exit;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::Args;
use dns_traffic_analyzer::Monitor;
use dns_traffic_analyzer::pcap::{PacketSource, PcapSource};
use log::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_interfaces {
        let interfaces = PcapSource::devices()?;
        println!("Available network interfaces:");
        for device in interfaces {
            let status = if device.flags.is_up() { "UP" } else { "DOWN" };
            let running = if device.flags.is_running() {
                "RUNNING"
            } else {
                ""
            };
            let loopback = if device.flags.is_loopback() {
                "LOOPBACK"
            } else {
                ""
            };

            println!("  {} [{}] {} {}", device.name, status, running, loopback);

            if let Some(desc) = device.desc {
                println!("    Description: {desc}");
            }
        }
        return Ok(());
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let interface = if let Some(ref iface) = args.interface {
        iface.clone()
    } else {
        PcapSource::select_default_interface()?
    };

    info!("Starting DNS Traffic Analyzer");
    info!("Interface: {interface}");

    let monitor = Monitor::new(PcapSource, args.filter.clone());
    let status = monitor
        .start_capture(&interface)
        .context("Failed to start packet capture")?;
    info!("Capture status: {status:?}");

    let outcome = if args.json {
        run_json_reporter(&monitor, Duration::from_secs(args.interval)).await
    } else {
        let app = ui::App::new(monitor.clone(), interface);
        ui::run_ui(app).await
    };

    let code = finish(&monitor, outcome, Duration::from_secs(2)).await;
    info!("DNS Traffic Analyzer stopped");
    // A worker stuck inside pcap would hold the runtime open on drop
    exit(code)
}

/// Stop the capture whatever the front end returned, then map its outcome
/// to an exit status.
async fn finish<S: PacketSource>(
    monitor: &Monitor<S>,
    outcome: Result<()>,
    grace: Duration,
) -> i32 {
    info!("Cancelling packet capture...");
    if tokio::time::timeout(grace, monitor.capture().shutdown())
        .await
        .is_err()
    {
        warn!("Capture worker still blocked in pcap, not waiting for it");
    }

    match outcome {
        Ok(()) => 0,
        Err(err) => {
            error!("{err:#}");
            eprintln!("Error: {err:?}");
            1
        }
    }
}

async fn run_json_reporter(monitor: &Monitor<PcapSource>, every: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = monitor.get_stats();
                println!("{}", serde_json::to_string(&snapshot)?);

                let state = monitor.capture_state();
                if !state.capturing
                    && let Some(err) = state.last_error
                {
                    bail!("Packet capture failed: {err}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                break;
            }
        }
    }

    Ok(())
}
