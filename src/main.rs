// =============================================================================
// Bomber Q-learning agent: harness bridge
// =============================================================================
// Build & Run:
//   cargo build --release
//   harness | cargo run --release -- serve --train --model weights.safetensors
//   harness | cargo run --release -- serve --model weights.safetensors
//   cargo run --release -- stats --log statistics

#[cfg(feature = "accelerate")]
extern crate accelerate_src;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use bomber_qlearn::logging::{self, Console};
use bomber_qlearn::{Agent, AgentConfig, Mode, RewardStats, serve};

#[derive(Parser)]
#[command(name = "bomber-agent", about = "Q-learning agent for a grid bomb-placement game")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer harness callbacks (NDJSON) until the input ends
    Serve(ServeArgs),
    /// Summarize a reward log
    Stats(StatsArgs),
}

#[derive(Parser)]
struct ServeArgs {
    /// Learn from events and persist the model every round
    #[arg(long, default_value_t = false)]
    train: bool,
    #[arg(long, default_value = "weights.safetensors")]
    model: PathBuf,
    #[arg(long, default_value = "statistics")]
    stats: PathBuf,
    /// Experience buffer checkpoint written every round
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Continue training from --model and --replay if they exist
    #[arg(long, default_value_t = false)]
    resume: bool,
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
    #[arg(long)]
    seed: Option<u64>,
    /// Read callbacks from a file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,
    /// Write responses to a file instead of stdout. Console logging goes to
    /// stderr while stdout carries responses, and to stdout otherwise
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Parser)]
struct StatsArgs {
    #[arg(long, default_value = "statistics")]
    log: PathBuf,
}

fn run_serve(args: &ServeArgs) -> Result<()> {
    let mode = if args.train { Mode::Train } else { Mode::Play };
    // Console logging must not interleave with responses on stdout.
    let console = if args.output.is_some() {
        Console::Stdout
    } else {
        Console::Stderr
    };
    let log_path = logging::init_session(&args.log_dir, mode, console)?;
    info!(?mode, log = %log_path.display(), "session started");

    let config = AgentConfig {
        model_path: args.model.clone(),
        stats_path: args.stats.clone(),
        replay_path: args.replay.clone(),
        resume: args.resume,
        seed: args.seed,
        ..Default::default()
    };
    let mut agent = Agent::setup(config, mode)?;

    let input: Box<dyn std::io::BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };
    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let stats = serve(&mut agent, input, output)?;
    info!(
        mode = ?agent.mode(),
        steps = stats.steps,
        rounds = stats.rounds,
        epsilon = agent.exploration_rate(),
        "session finished"
    );
    Ok(())
}

fn run_stats(args: &StatsArgs) -> Result<()> {
    let stats = RewardStats::from_log(&args.log)?;
    println!(
        "rewards {count} | total {total:.1} | mean {mean:.3} | min {min:.1} | max {max:.1}",
        count = stats.count,
        total = stats.total,
        mean = stats.mean,
        min = stats.min,
        max = stats.max,
    );
    Ok(())
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Serve(args) => run_serve(args),
        Commands::Stats(args) => run_stats(args),
    }
}
