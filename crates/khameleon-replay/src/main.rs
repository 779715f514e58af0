//! Khameleon session replay
//!
//! Pushes a recorded frame log through a full client session, feeding a
//! recorded pointer trace to the predictor and registering queries at
//! recorded points, then prints the telemetry summary as JSON.
//!
//! ## Usage
//!
//! ```bash
//! # Frames only
//! khameleon-replay --frames session.frames
//!
//! # Full session with trace, queries and configuration
//! khameleon-replay --frames session.frames --trace trace.json \
//!     --queries queries.json --config session.json --log-level debug
//! ```

mod channel;
mod replay;

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::replay::{replay, ReplayInput};

#[derive(Parser, Debug)]
#[command(name = "khameleon-replay")]
#[command(version)]
#[command(about = "Replay a recorded Khameleon session", long_about = None)]
struct Args {
    /// Length-prefixed frame log
    #[arg(long)]
    frames: PathBuf,

    /// Pointer trace: JSON array of [x, y, t, action]
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Queries: JSON array of {"at_frame", "key"}
    #[arg(long)]
    queries: Option<PathBuf>,

    /// Session configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Replayed milliseconds between frames
    #[arg(long, default_value = "10")]
    frame_spacing_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let input = ReplayInput::load(
        &args.frames,
        args.trace.as_deref(),
        args.queries.as_deref(),
        args.config.as_deref(),
        args.frame_spacing_ms,
    )?;
    info!(
        frames = input.frames.len(),
        samples = input.trace.len(),
        queries = input.queries.len(),
        "Starting replay"
    );

    let report = replay(input).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
