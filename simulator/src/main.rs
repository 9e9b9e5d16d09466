use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::SimulationConfig;
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Offline event driver for the detector effects engine")]
struct Args {
    /// Simulation setup in YAML
    #[arg(long)]
    config: PathBuf,
    /// Number of events, overrides the setup
    #[arg(long)]
    events: Option<u64>,
    /// Random seed, overrides the setup
    #[arg(long)]
    seed: Option<u64>,
    /// Append accepted events as JSON lines
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = false)]
    always_trigger: bool,
    #[arg(long, default_value_t = false)]
    ignore_thresholds: bool,
}

/// Sets the returned flag on Ctrl+C.
fn watch_interrupt() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let watcher = Arc::clone(&flag);
    thread::spawn(move || {
        let runtime = match TokioBuilder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("creating runtime for signal handling: {}", err);
                return;
            }
        };
        runtime.block_on(async {
            match signal::ctrl_c().await {
                Ok(()) => {
                    warn!("Ctrl+C received, finishing the current event");
                    watcher.store(true, Ordering::Relaxed);
                }
                Err(err) => error!("awaiting Ctrl+C: {}", err),
            }
        });
    });
    flag
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = SimulationConfig::load(&args.config)?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let events = args.events.unwrap_or(config.events);
    config.trigger_unit.always_assume_trigger |= args.always_trigger;
    config.trigger_unit.ignore_thresholds |= args.ignore_thresholds;

    let mut runner = Runner::new(&config).context("setting up the detector effects engine")?;
    let interrupt = watch_interrupt();

    let summary = match &args.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening event output {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            runner.run(events, &interrupt, Some(&mut writer as &mut dyn Write))?
        }
        None => runner.run(events, &interrupt, None)?,
    };

    info!("engine metrics: {:?}", runner.engine().metrics().snapshot());
    println!(
        "events {} triggered {} rejected {} ({:.1}% accepted), deposited {:.1} keV, measured {:.1} keV{}",
        summary.processed,
        summary.triggered,
        summary.rejected,
        100.0 * summary.trigger_fraction(),
        summary.deposited_energy,
        summary.measured_energy,
        if summary.interrupted { ", interrupted" } else { "" }
    );
    Ok(())
}
