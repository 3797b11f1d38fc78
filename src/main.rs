//! kinreplay - Record a trajectory by hand, then fly it back
//!
//! Without a config argument the config is read from the platform data
//! directory, falling back to defaults.

use anyhow::Context;
use clap::Parser;
use kinreplay::{
    config::{default_config_path, RunConfig},
    link::{SimConfig, SimPattern, SimulatedConnector},
    logging,
    replay::{planned_duration, ThreadPacer},
    session::{RunOutcome, SessionOrchestrator},
    signal::LineSignalSource,
    Vec3,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kinreplay")]
#[command(about = "Record a vehicle's trajectory by hand, then replay it as motion commands")]
#[command(version)]
struct Cli {
    /// Run config (TOML); defaults to the platform data directory
    config: Option<PathBuf>,

    /// Write the default config to the config path and exit
    #[arg(long)]
    init: bool,
}

impl Cli {
    fn config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(default_config_path)
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.init {
        let path = cli
            .config_path()
            .context("Could not determine the app data directory")?;
        RunConfig::default().save(&path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => {
            RunConfig::load(path).with_context(|| format!("Loading {}", path.display()))?
        }
        None => match default_config_path() {
            Some(path) => RunConfig::load_or_default(path),
            None => RunConfig::default(),
        },
    };

    let _log_guard = logging::init(config.logging.log_dir.as_deref())?;
    tracing::info!("Starting kinreplay against {}", config.link.uri);

    // No radio driver is linked in; the simulated vehicle answers every URI
    let sim = SimConfig::default()
        .with_pattern(SimPattern::Circle {
            center: Vec3::new(0.0, 0.0, 0.5),
            radius: 0.3,
            period_s: 8.0,
        })
        .with_noise(0.002);
    let connector = SimulatedConnector::new(sim);
    let mut signals = LineSignalSource::stdin(config.recording.gate_key.clone())?;

    let planner = config.replay.planner();
    let orchestrator = SessionOrchestrator::new(&connector, config);
    let report = orchestrator.run(&mut signals, ThreadPacer)?;

    let steps: Vec<_> = planner.plan(report.recorded.as_slice()).collect();
    println!(
        "Recorded {} samples ({:.1} s of replay), replayed {} samples",
        report.recorded.len(),
        planned_duration(&steps).as_secs_f64(),
        report.replayed.len()
    );
    if let Some(dispatch) = &report.dispatch {
        println!(
            "Dispatched {} moves, {} skips ({} clamped)",
            dispatch.moves, dispatch.skips, dispatch.clamped
        );
        println!(
            "Command latency {:.0} us, jitter {} us, {:.0}% accepted",
            dispatch.stats.avg_latency_us(),
            dispatch.stats.jitter_us(),
            dispatch.stats.acceptance_rate()
        );
    }
    if let Some(path) = &report.artifact {
        println!("Saved {}", path.display());
    }
    if let Some(e) = &report.persistence_error {
        eprintln!("Artifact not saved: {}", e);
    }

    match report.outcome {
        RunOutcome::Failed(e) => Err(anyhow::Error::new(e).context("Run failed")),
        outcome => {
            println!("Run {}", outcome);
            Ok(())
        }
    }
}
