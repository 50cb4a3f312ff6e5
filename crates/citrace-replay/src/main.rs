#![forbid(unsafe_code)]

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use citrace_format::decode;
use citrace_replay::{Playback, PlaybackConfig, SessionExit, SoftGsp, POLL_ATTEMPTS};
use clap::Parser;
use pica_cmdlist::build_initial_state;
use pica_regs::RegisterStateMask;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Replay a captured CiTrace against the host-side GPU device model")]
struct Args {
    /// Trace file to replay (CiTrace container).
    trace: PathBuf,

    /// Number of passes over the recorded stream.
    #[arg(long, default_value_t = 1)]
    passes: u64,

    /// Completion-poll attempt budget after operation-triggering register
    /// writes.
    #[arg(long, default_value_t = POLL_ATTEMPTS)]
    poll_attempts: u32,

    /// Completion-poll sleep interval in microseconds.
    #[arg(long, default_value_t = 1)]
    poll_interval_us: u64,
}

fn main() -> Result<()> {
    // Diagnostics first: every later failure path reports through this
    // subscriber before the process exits non-zero.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let file = File::open(&args.trace)
        .with_context(|| format!("failed to open trace file {}", args.trace.display()))?;
    let mut reader = BufReader::new(file);

    let trace = decode(&mut reader).context("failed to decode CiTrace container")?;
    tracing::info!("decoded trace: {} stream elements", trace.stream.len());

    let mask = RegisterStateMask::pica();
    let command_list = build_initial_state(&mut reader, &trace.header, &mask)
        .context("failed to build the initial-state command list")?;
    tracing::info!("initial-state command list: {} words", command_list.len());

    let config = PlaybackConfig {
        poll_attempts: args.poll_attempts,
        poll_interval: Duration::from_micros(args.poll_interval_us),
    };
    let mut gsp = SoftGsp::new();
    let mut playback = Playback::with_config(&trace, &command_list, config);

    for pass in 0..args.passes {
        let cancelled = playback
            .run_pass(&mut reader, &mut gsp, &mut || false)
            .with_context(|| format!("playback failed during pass {pass}"))?;
        if cancelled == Some(SessionExit::Cancelled) {
            break;
        }
    }

    let stats = gsp.stats();
    println!("passes completed:        {}", args.passes);
    println!("frames presented:        {}", stats.frames_presented);
    println!("command lists submitted: {}", stats.command_lists_submitted);
    println!("register writes:         {}", stats.register_writes);
    println!("memory bytes written:    {}", stats.memory_bytes_written);
    println!(
        "dma transfers:           {} ({} bytes)",
        stats.dma_transfers, stats.dma_bytes
    );

    Ok(())
}
