//! Synthetic-traffic driver for the simulator.
//!
//! Runs a uniform-random traffic workload over a configured machine: every
//! core sends a number of fixed-size packets to uniformly random receivers
//! on the first user network, the event queue drains, and the per-core
//! summary is written to the configured output file (and optionally
//! stdout).

use std::process::ExitCode;

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::error;

use nocsim_core::common::CoreId;
use nocsim_core::network::packet::{NetMatch, PacketType};
use nocsim_core::{Config, Simulator};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "nocsim", about = "Cycle-level CMP simulator, synthetic traffic driver")]
struct Args {
    /// Path to a JSON configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Packets each core sends.
    #[arg(long, default_value_t = 100)]
    packets_per_core: u32,

    /// Payload size in bytes.
    #[arg(long, default_value_t = 8)]
    packet_bytes: u32,

    /// Seed for the receiver choice.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Also print the summary to stdout.
    #[arg(long, default_value_t = false)]
    print_summary: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            eprintln!("nocsim: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), String> {
    let config: Config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| format!("cannot read {path}: {e}"))?;
            serde_json::from_str(&text).map_err(|e| format!("cannot parse {path}: {e}"))?
        }
        None => Config::default(),
    };

    let mut sim = Simulator::new(config).map_err(|e| e.to_string())?;
    let total_cores = sim.total_cores();
    let mut rng = StdRng::seed_from_u64(args.seed);

    // Uniform-random traffic: every core picks an independent receiver for
    // each packet. The payload carries the packet index for spot checks.
    for round in 0..args.packets_per_core {
        for sender in 0..total_cores as CoreId {
            let receiver = loop {
                let candidate = rng.gen_range(0..total_cores) as CoreId;
                if candidate != sender || total_cores == 1 {
                    break candidate;
                }
            };
            let mut payload = vec![0u8; args.packet_bytes as usize];
            let tag = round.to_le_bytes();
            let n = payload.len().min(tag.len());
            payload[..n].copy_from_slice(&tag[..n]);
            sim.net_send(sender, PacketType::User1, receiver, payload)
                .map_err(|e| e.to_string())?;
        }
        sim.run_until_idle().map_err(|e| e.to_string())?;
    }

    // Drain deliveries so the receive counters reflect the whole run.
    let any = NetMatch::any();
    for core in 0..total_cores as CoreId {
        while sim
            .net_recv(core, &any, None)
            .map_err(|e| e.to_string())?
            .is_some()
        {}
    }

    sim.write_summary_file()
        .map_err(|e| format!("cannot write summary: {e}"))?;
    if args.print_summary {
        let mut stdout = std::io::stdout();
        sim.output_summary(&mut stdout)
            .map_err(|e| format!("cannot print summary: {e}"))?;
    }
    Ok(())
}
