//! Interactive heading-hold tool.
//!
//! Brings up the bus loop and orientation reader, then either runs a REPL
//! for driving the heading-hold modes or spins the robot at a fixed yaw rate
//! to check the heading estimate against the commanded rate.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hardware::bus::BusController;
use hardware::CancelToken;
use motion::{AbsoluteController, Angle, Coordinator, RelativeController, RobotConfig};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HISTORY_MAX_LINES: usize = 500;
/// Longest the `w` command waits for convergence
const WAIT_LIMIT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "hh_tool")]
#[command(about = "Drive the robot's heading-hold modes interactively")]
struct Args {
    /// Robot configuration (JSON), defaults are used if missing
    #[arg(long, default_value = "robot.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive command REPL (default)
    Repl,

    /// Spin at a fixed yaw input and compare the estimated rate with the commanded one
    Gyrocal {
        /// Yaw input, -1.0 to 1.0
        #[arg(long, default_value = "0.2")]
        yaw: f64,

        /// Spin duration in seconds
        #[arg(long, default_value = "5")]
        seconds: f64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = RobotConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let coordinator = Coordinator::start(config);
    let result = match args.command.unwrap_or(Command::Repl) {
        Command::Repl => cmd_repl(&coordinator),
        Command::Gyrocal { yaw, seconds } => cmd_gyrocal(&coordinator, yaw, seconds),
    };
    coordinator.shutdown();
    result
}

// ==================== Gyrocal Command ====================

fn cmd_gyrocal(coordinator: &Coordinator<BusController>, yaw: f64, seconds: f64) -> Result<()> {
    if !(-1.0..=1.0).contains(&yaw) || yaw == 0.0 {
        bail!("yaw must be non-zero and within -1.0..=1.0, got {yaw}");
    }
    let commanded = yaw * coordinator.config().relative.max_yaw_rate_dps;

    let hh = coordinator.start_heading_hold_relative()?;
    // Let the hold settle before spinning
    thread::sleep(Duration::from_millis(500));

    let start = Instant::now();
    let mut last = Angle::from_float(hh.current_heading());
    let mut turned = 0.0;
    hh.set_yaw_and_throttle(yaw, 0.0);
    info!("Spinning at {commanded:.1} deg/s for {seconds:.1}s");

    while start.elapsed().as_secs_f64() < seconds {
        thread::sleep(Duration::from_millis(50));
        if !hh.is_running() {
            coordinator.stop_motor_control();
            bail!("heading hold stopped during the spin");
        }
        let heading = Angle::from_float(hh.current_heading());
        turned += heading.sub(last).to_float();
        last = heading;
    }
    let elapsed = start.elapsed().as_secs_f64();
    coordinator.stop_motor_control();

    let measured = turned / elapsed;
    println!("Commanded: {commanded:8.2} deg/s");
    println!("Estimated: {measured:8.2} deg/s ({turned:.1} deg in {elapsed:.2}s)");
    println!("Ratio:     {:8.4}", measured / commanded);
    Ok(())
}

// ==================== REPL ====================

enum Hold {
    None,
    Absolute(Arc<AbsoluteController>),
    Relative(Arc<RelativeController>),
}

fn get_history_path() -> Option<PathBuf> {
    let home = std::env::var("HOME").ok()?;
    let config_dir = std::path::Path::new(&home).join(".config");
    std::fs::create_dir_all(&config_dir).ok()?;
    Some(config_dir.join("hh_tool_hist.txt"))
}

fn truncate_history_file(path: &std::path::Path, max_lines: usize) {
    if let Ok(contents) = std::fs::read_to_string(path) {
        let lines: Vec<&str> = contents.lines().collect();
        if lines.len() > max_lines {
            let skip_count = lines.len() - max_lines;
            let truncated: Vec<&str> = lines.into_iter().skip(skip_count).collect();
            let _ = std::fs::write(path, truncated.join("\n") + "\n");
        }
    }
}

fn print_help() {
    println!("  h <deg>              hold absolute heading");
    println!("  d <deg>              turn by a heading delta");
    println!("  t <throttle> [deg]   absolute throttle, optional travel angle");
    println!("  w                    wait for the heading to settle");
    println!("  r <yaw> <throttle> [translation]  relative yaw rate and throttle");
    println!("  s                    stop motor control");
    println!("  p                    power, faults and wheel distances");
    println!("  quit                 exit");
}

fn parse_arg(parts: &[&str], index: usize, name: &str) -> Result<f64> {
    let Some(text) = parts.get(index) else {
        bail!("missing {name}");
    };
    text.parse()
        .with_context(|| format!("invalid {name} {text:?}"))
}

fn absolute(coordinator: &Coordinator<BusController>, hold: &mut Hold) -> Result<Arc<AbsoluteController>> {
    if let Hold::Absolute(hh) = hold {
        if hh.is_running() {
            return Ok(hh.clone());
        }
    }
    let hh = coordinator.start_heading_hold_absolute()?;
    *hold = Hold::Absolute(hh.clone());
    Ok(hh)
}

fn relative(coordinator: &Coordinator<BusController>, hold: &mut Hold) -> Result<Arc<RelativeController>> {
    if let Hold::Relative(hh) = hold {
        if hh.is_running() {
            return Ok(hh.clone());
        }
    }
    let hh = coordinator.start_heading_hold_relative()?;
    *hold = Hold::Relative(hh.clone());
    Ok(hh)
}

fn run_command(coordinator: &Coordinator<BusController>, hold: &mut Hold, cmd: &str) -> Result<()> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    match parts[0] {
        "h" => {
            let heading = parse_arg(&parts, 1, "heading")?;
            absolute(coordinator, hold)?.set_heading(Angle::from_float(heading));
        }
        "d" => {
            let delta = parse_arg(&parts, 1, "delta")?;
            let hh = absolute(coordinator, hold)?;
            hh.add_heading_delta(delta);
            println!("Target: {}", hh.target_heading());
        }
        "t" => {
            let throttle = parse_arg(&parts, 1, "throttle")?;
            let angle = if parts.len() > 2 {
                parse_arg(&parts, 2, "angle")?
            } else {
                0.0
            };
            absolute(coordinator, hold)?.set_throttle_with_angle(throttle, angle);
        }
        "w" => {
            let Hold::Absolute(hh) = &*hold else {
                bail!("no absolute heading hold running");
            };
            let cancel = CancelToken::new();
            let timer = {
                let cancel = cancel.clone();
                thread::spawn(move || cancel.wait_timeout(WAIT_LIMIT))
            };
            let result = hh.wait(&cancel);
            cancel.cancel();
            let _ = timer.join();
            match result {
                Ok(residual) => println!("Settled at {} (error {residual:.2})", hh.current_heading()),
                Err(e) => println!("Wait ended: {e}"),
            }
        }
        "r" => {
            let yaw = parse_arg(&parts, 1, "yaw")?;
            let throttle = parse_arg(&parts, 2, "throttle")?;
            let translation = if parts.len() > 3 {
                parse_arg(&parts, 3, "translation")?
            } else {
                0.0
            };
            relative(coordinator, hold)?.set_yaw_throttle_and_translation(yaw, throttle, translation);
        }
        "s" => {
            coordinator.stop_motor_control();
            *hold = Hold::None;
        }
        "p" => {
            for reading in coordinator.current_power_readings() {
                println!(
                    "{:>10}: {:6.2} V {:6.3} A {:6.2} W",
                    reading.name, reading.voltage, reading.current, reading.power
                );
            }
            println!("Faults: {:?}", coordinator.faults());
            let [fl, fr, bl, br] = coordinator.current_wheel_distances_mm();
            println!("Wheels (mm): FL {fl:.0} FR {fr:.0} BL {bl:.0} BR {br:.0}");
        }
        "?" | "help" => print_help(),
        other => bail!("unknown command {other:?}, try 'help'"),
    }
    Ok(())
}

fn cmd_repl(coordinator: &Coordinator<BusController>) -> Result<()> {
    println!("Heading-hold REPL, 'help' for commands, 'quit' to exit");
    print_help();
    println!();

    let mut rl = DefaultEditor::new()?;
    let history_path = get_history_path();
    if let Some(ref path) = history_path {
        truncate_history_file(path, HISTORY_MAX_LINES);
        if path.exists() {
            let _ = rl.load_history(path);
        }
    }

    let mut hold = Hold::None;
    loop {
        let prompt = format!("[{} {:7.2}]> ", coordinator.mode(), coordinator.current_heading());
        match rl.readline(&prompt) {
            Ok(line) => {
                let cmd = line.trim();
                if cmd.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&line);
                if let Some(ref path) = history_path {
                    let _ = rl.save_history(path);
                }

                if cmd.eq_ignore_ascii_case("quit") || cmd.eq_ignore_ascii_case("exit") {
                    println!("Bye!");
                    break;
                }

                if let Err(e) = run_command(coordinator, &mut hold, cmd) {
                    println!("Error: {e:#}");
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(err) => {
                println!("Error: {err}");
                break;
            }
        }
    }

    coordinator.stop_motor_control();
    Ok(())
}
