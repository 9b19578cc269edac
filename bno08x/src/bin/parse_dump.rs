//! Convert a raw serial capture from the orientation sensor into CSV.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use bno08x::Framer;

#[derive(Parser, Debug)]
#[command(name = "parse_dump")]
#[command(about = "Decode a UART-RVC byte capture into CSV")]
struct Args {
    /// Raw capture file (e.g. from `cat /dev/ttyAMA0 > capture.bin`)
    dump_file: PathBuf,

    /// Output CSV path
    output_csv: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut data = Vec::new();
    File::open(&args.dump_file)
        .and_then(|mut f| f.read_to_end(&mut data))
        .with_context(|| format!("Failed to read {}", args.dump_file.display()))?;
    info!("Read {} bytes from {}", data.len(), args.dump_file.display());

    let mut framer = Framer::new();
    let frames = framer.push_bytes(&data);
    let stats = framer.stats();

    info!(
        "Parsed {} frames, {} checksum failures, {} bytes discarded, {} trailing",
        stats.frames,
        stats.checksum_failures,
        stats.discarded_bytes,
        framer.pending()
    );

    let file = File::create(&args.output_csv)
        .with_context(|| format!("Failed to create {}", args.output_csv.display()))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "index,yaw_deg,pitch_deg,roll_deg,x_accel,y_accel,z_accel")?;
    for frame in &frames {
        let index = { frame.index };
        let [ax, ay, az] = frame.accel();
        writeln!(
            out,
            "{index},{:.2},{:.2},{:.2},{:.2},{:.2},{:.2}",
            frame.yaw_degrees(),
            frame.pitch_degrees(),
            frame.roll_degrees(),
            ax as f64 / 100.0,
            ay as f64 / 100.0,
            az as f64 / 100.0
        )?;
    }
    out.flush()?;

    info!("Wrote {}", args.output_csv.display());
    Ok(())
}
