//! tkrdigi command-line interface.
//!
//! Digitizes truth-hit event files into strip readout.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use thiserror::Error;

use tkrdigi_io::{DigiWriter, HitEvent, OutputFormat};
use tkrdigi_sim::{
    resolve_hits, ChargeTable, Digitizer, DigitizerStatistics, EventDigis, SimulationConfig,
    SimulationContext,
};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    TkrdigiIo(#[from] tkrdigi_io::Error),

    #[error("Simulation error: {0}")]
    Sim(#[from] tkrdigi_sim::Error),

    #[error("Core error: {0}")]
    Core(#[from] tkrdigi_core::Error),
}

/// Output format selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// One row per digitized strip
    Csv,
    /// One JSON document per event
    Json,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Csv => OutputFormat::Csv,
            Format::Json => OutputFormat::JsonLines,
        }
    }
}

/// Silicon-strip tracker digitization.
#[derive(Parser)]
#[command(name = "tkrdigi")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log detail (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Digitize an event file
    Simulate {
        /// Input event file (JSON)
        events: PathBuf,

        /// Induced-charge table
        #[arg(short, long)]
        table: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Simulation configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Channel calibration (JSON)
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: Format,

        /// Base random seed
        #[arg(long, default_value = "1")]
        seed: u64,

        /// Simulate the planes of each event in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Show information about a charge table
    TableInfo {
        /// Induced-charge table
        table: PathBuf,

        /// Simulation configuration holding the table layout (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Time the digitization of an event file
    Benchmark {
        /// Input event file (JSON)
        events: PathBuf,

        /// Induced-charge table
        #[arg(short, long)]
        table: PathBuf,

        /// Simulation configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of iterations
        #[arg(short, long, default_value = "3")]
        iterations: usize,
    },

    /// Write the default configuration
    DefaultConfig {
        /// Output file path
        output: PathBuf,
    },
}

fn load_config(path: Option<&Path>) -> Result<SimulationConfig> {
    match path {
        Some(path) => Ok(tkrdigi_io::load_config(path)?),
        None => Ok(SimulationConfig::default()),
    }
}

fn build_digitizer(
    config: SimulationConfig,
    table: &Path,
    calibration: Option<&Path>,
) -> Result<Digitizer> {
    let table = ChargeTable::load(table, config.table.clone())?;
    let mut context = SimulationContext::new(config, table)?;
    if let Some(path) = calibration {
        let calibration = tkrdigi_io::load_calibration(path)?;
        context = context.with_calibration(Box::new(calibration));
    }
    Ok(Digitizer::new(context))
}

/// Each event draws from its own stream, so results do not depend on
/// which events share a file.
fn event_seed(seed: u64, event: &HitEvent) -> u64 {
    seed.wrapping_add(event.id)
}

fn digitize_event(
    digitizer: &Digitizer,
    event: &HitEvent,
    seed: u64,
    parallel: bool,
) -> EventDigis {
    let seed = event_seed(seed, event);
    if parallel {
        let hits = resolve_hits(&event.hits);
        let skipped = event.hits.len() - hits.len();
        let mut digis = digitizer.process_event_parallel(&hits, seed);
        digis.statistics.hits_skipped = skipped;
        digis
    } else {
        let mut rng = StdRng::seed_from_u64(seed);
        digitizer.process_raw_event(&event.hits, &mut rng)
    }
}

fn print_statistics(stats: &DigitizerStatistics) {
    println!("Hits processed: {}", stats.hits_processed);
    println!("Hits skipped: {}", stats.hits_skipped);
    println!(
        "Clusters: {} ({} off detector)",
        stats.propagation.clusters_processed, stats.propagation.clusters_off_detector
    );
    println!(
        "Carriers: {} outside table, {} dropped",
        stats.propagation.carriers_outside_table, stats.propagation.carriers_dropped
    );
    println!("Strip deposits: {}", stats.propagation.deposits);
    println!(
        "Noise strips: {} added, {} removed",
        stats.noise.strips_added, stats.noise.strips_removed
    );
    println!("Strips with charge: {}", stats.strips_with_charge);
    println!("Strips fired: {}", stats.strips_fired);
    println!("Strips written: {}", stats.strips_output);
    println!("Towers triggered: {}", stats.towers_triggered);
}

fn log_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(cli.verbose)),
    )
    .init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Simulate {
            events,
            table,
            output,
            config,
            calibration,
            format,
            seed,
            parallel,
        } => {
            let config = load_config(config.as_deref())?;
            let digitizer = build_digitizer(config, &table, calibration.as_deref())?;
            let events = tkrdigi_io::read_events(&events)?;

            let start = Instant::now();
            let mut writer = DigiWriter::create(&output, format.into())?;
            let mut totals = DigitizerStatistics::default();

            for event in &events {
                let digis = digitize_event(&digitizer, event, seed, parallel);
                if digis.statistics.hits_skipped > 0 {
                    warn!(
                        "event {}: skipped {} invalid hits",
                        event.id, digis.statistics.hits_skipped
                    );
                }
                writer.write_event(event.id, &digis.digis)?;
                totals.merge(&digis.statistics);
            }
            writer.flush()?;

            let elapsed = start.elapsed();
            info!(
                "wrote {} events ({} strips) to {}",
                writer.events_written(),
                writer.strips_written(),
                output.display()
            );
            println!(
                "Digitized {} events in {:.3}s",
                events.len(),
                elapsed.as_secs_f64()
            );
            print_statistics(&totals);
        }

        Commands::TableInfo { table, config } => {
            let config = load_config(config.as_deref())?;
            let layout = config.table;
            let loaded = ChargeTable::load(&table, layout.clone())?;
            let stats = loaded.statistics();

            println!("File: {}", table.display());
            println!(
                "Layout: {} x {} bins (along x depth), {:?} lookup",
                layout.bins_along, layout.bins_depth, layout.mode
            );
            println!(
                "Along range: {} - {} mm",
                layout.along_min, layout.along_max
            );
            println!(
                "Depth range: {} - {} mm",
                layout.depth_min, layout.depth_max
            );
            println!("Bins: {} ({} non-empty)", stats.bins, stats.non_empty_bins);
            println!("Largest fraction: {:.4}", stats.max_fraction);
            println!("Mean collected fraction: {:.4}", stats.mean_total);
        }

        Commands::Benchmark {
            events,
            table,
            config,
            iterations,
        } => {
            let config = load_config(config.as_deref())?;
            let digitizer = build_digitizer(config, &table, None)?;
            let events = tkrdigi_io::read_events(&events)?;
            let hit_count: usize = events.iter().map(|e| e.hits.len()).sum();

            println!(
                "Benchmarking with {} events ({} hits), {} iterations",
                events.len(),
                hit_count,
                iterations
            );
            println!(
                "{:<10} | {:<15} | {:<15} | {:<15}",
                "Mode", "Mean Time (ms)", "Min Time (ms)", "Max Time (ms)"
            );
            println!("{:-<65}", "");

            for (parallel, name) in [(false, "Serial"), (true, "Parallel")] {
                let mut times = Vec::with_capacity(iterations);
                for _ in 0..iterations {
                    let start = Instant::now();
                    for event in &events {
                        let _ = digitize_event(&digitizer, event, 1, parallel);
                    }
                    times.push(start.elapsed().as_secs_f64() * 1000.0);
                }
                if times.is_empty() {
                    continue;
                }
                let mean = times.iter().sum::<f64>() / times.len() as f64;
                let min = times.iter().copied().fold(f64::INFINITY, f64::min);
                let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                println!(
                    "{:<10} | {:<15.2} | {:<15.2} | {:<15.2}",
                    name, mean, min, max
                );
            }
        }

        Commands::DefaultConfig { output } => {
            tkrdigi_io::save_config(&SimulationConfig::default(), &output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}
