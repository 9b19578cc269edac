//! Listen for BNO08x UART-RVC orientation frames on a serial port
//!
//! Prints every Nth report and periodic framing statistics: frame rate,
//! checksum failures and bytes discarded while resynchronising.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hardware::imu::{ImuConfig, ImuReader, ImuStats, OrientationState};
use hardware::ImuError;

#[derive(Parser, Debug)]
#[command(name = "listen_imu")]
#[command(about = "BNO08x orientation receiver and validator")]
struct Args {
    /// Serial port path
    #[arg(long, default_value = "/dev/ttyAMA0")]
    serial: String,

    /// Baud rate
    #[arg(long, default_value = "115200")]
    baud: u32,

    /// Number of reports to receive (0 = infinite)
    #[arg(short, long, default_value = "0")]
    count: u64,

    /// Print every Nth report
    #[arg(long, default_value = "10")]
    print_every: u64,

    /// Report statistics interval in seconds
    #[arg(long, default_value = "5")]
    report_interval_s: u64,
}

fn report(stats: &ImuStats, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    let framing = stats.framing;
    let total = framing.frames + framing.checksum_failures;
    let pass_pct = if total > 0 {
        100.0 * framing.frames as f64 / total as f64
    } else {
        0.0
    };
    info!(
        "Frames: {} | Rate: {:.1} Hz | Checksum pass: {:.1}% ({} failed) | Discarded: {} bytes | Connects: {} Failures: {}",
        framing.frames,
        framing.frames as f64 / elapsed,
        pass_pct,
        framing.checksum_failures,
        framing.discarded_bytes,
        stats.connects,
        stats.failures
    );
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = ImuConfig {
        serial_path: args.serial.clone(),
        baud_rate: args.baud,
        ..ImuConfig::default()
    };

    let state = Arc::new(OrientationState::new());
    let reader = ImuReader::spawn_serial(config, state.clone());
    let report_interval = Duration::from_secs(args.report_interval_s);

    let start = Instant::now();
    let mut last_report = start;
    let mut last_time = None;
    let mut received: u64 = 0;

    loop {
        match state.wait_for_report_after(last_time) {
            Ok(r) => {
                last_time = Some(r.capture_time);
                received += 1;
                if args.print_every > 0 && received % args.print_every == 0 {
                    println!("{r}  robot yaw {:7.2}", r.robot_yaw());
                }
            }
            Err(ImuError::Stalled(d)) => warn!("No orientation report for {d:?}"),
            Err(e) => warn!("{e}"),
        }

        if last_report.elapsed() >= report_interval {
            report(&reader.stats(), start);
            last_report = Instant::now();
        }

        if args.count > 0 && received >= args.count {
            break;
        }
    }

    info!("=== Final Statistics ===");
    report(&reader.stats(), start);
    reader.shutdown();
    Ok(())
}
