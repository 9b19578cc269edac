//! Mock BNO08x in UART-RVC mode
//!
//! Writes synthetic 19-byte orientation frames to a serial port at 100 Hz,
//! with the yaw advancing at a fixed rate. Pair with a null-modem cable or
//! a pty pair to exercise the acquisition loop without the sensor.

use std::io::Write;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytemuck::bytes_of;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use bno08x::mock::build_frame;

#[derive(Parser, Debug)]
#[command(name = "mock_imu")]
#[command(about = "Mock BNO08x UART-RVC transmitter")]
struct Args {
    /// Serial port path
    #[arg(long)]
    serial: String,

    /// Baud rate
    #[arg(long, default_value = "115200")]
    baud: u32,

    /// Frame interval in milliseconds
    #[arg(short, long, default_value = "10")]
    interval_ms: u64,

    /// Number of frames to send (0 = infinite)
    #[arg(short, long, default_value = "0")]
    count: u64,

    /// Simulated yaw rate in degrees per second
    #[arg(long, default_value = "0.0")]
    yaw_rate: f64,

    /// Fixed pitch in degrees
    #[arg(long, default_value = "0.0")]
    pitch: f64,

    /// Fixed roll in degrees
    #[arg(long, default_value = "0.0")]
    roll: f64,
}

/// Wrap into (-180, 180] and convert to hundredths.
fn to_hundredths(degrees: f64) -> i16 {
    let mut d = degrees % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d <= -180.0 {
        d += 360.0;
    }
    (d * 100.0).round() as i16
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut port = serialport::new(&args.serial, args.baud)
        .timeout(Duration::from_millis(100))
        .open()
        .with_context(|| format!("Failed to open serial port {}", args.serial))?;

    let interval = Duration::from_millis(args.interval_ms);
    let yaw_per_frame = args.yaw_rate * interval.as_secs_f64();
    let pitch = to_hundredths(args.pitch);
    let roll = to_hundredths(args.roll);

    info!(
        "Sending frames every {}ms on {}, yaw rate {} deg/s",
        args.interval_ms, args.serial, args.yaw_rate
    );

    let start_time = Instant::now();
    let mut next_send = start_time;
    let mut yaw = 0.0;
    let mut frame_count: u64 = 0;

    loop {
        let frame = build_frame(
            frame_count as u8,
            to_hundredths(yaw),
            pitch,
            roll,
            [0, 0, 981],
        );
        port.write_all(bytes_of(&frame))
            .context("Failed to write frame")?;
        debug!("Sent frame {frame_count}, yaw {yaw:.2}");

        yaw += yaw_per_frame;
        frame_count += 1;
        if args.count > 0 && frame_count >= args.count {
            break;
        }
        if frame_count % 500 == 0 {
            let elapsed = start_time.elapsed().as_secs_f64();
            info!(
                "Sent {frame_count} frames in {elapsed:.2}s ({:.1} Hz)",
                frame_count as f64 / elapsed
            );
        }

        next_send += interval;
        let now = Instant::now();
        if next_send > now {
            std::thread::sleep(next_send - now);
        }
    }

    let elapsed = start_time.elapsed().as_secs_f64();
    info!(
        "Complete: {frame_count} frames in {elapsed:.2}s ({:.1} Hz)",
        frame_count as f64 / elapsed
    );
    Ok(())
}
