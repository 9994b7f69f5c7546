//! sisim CLI
//!
//! Runs silicon sensor scenarios: a track gun fires through the sensors,
//! charge is drifted and digitized, and clusters are turned into hits.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

mod config;
mod gun;

use clap::{Parser, Subcommand};
use config::{ClusteringConfig, Scenario};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sisim_algorithms::{
    EventRecord, PixelHitMaker, SensorPipeline, StripHitMaker, TrackerHitDriver,
};
use sisim_core::{ChargeCarrier, ElectrodeKind, Sensor};
use sisim_digi::{CdfSensorSim, RawHitMaker};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Simulation error: {0}")]
    Core(#[from] sisim_core::Error),

    #[error("Scenario error: {0}")]
    Scenario(String),
}

/// Silicon sensor digitization and hit reconstruction.
#[derive(Parser)]
#[command(name = "sisim")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fire tracks through a scenario and reconstruct hits
    Simulate {
        /// Scenario file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Number of events
        #[arg(short = 'n', long, default_value = "10")]
        events: u64,

        /// Random seed
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output file for the event records (JSON)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process sensors one after another
        #[arg(long)]
        sequential: bool,
    },

    /// Show the sensors, electrodes and noise levels of a scenario
    Info {
        /// Scenario file (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Stream of the gun's random generator; sensor streams use the sensor id.
const GUN_STREAM: u64 = u64::MAX;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Simulate {
            config,
            events,
            seed,
            output,
            sequential,
        } => {
            let scenario = Scenario::from_file(&config)?;
            info!(
                "loaded {} with {} sensors",
                config.display(),
                scenario.sensors.len()
            );

            let start = Instant::now();
            let records = simulate(&scenario, events, seed, !sequential)?;
            let elapsed = start.elapsed();

            let raw_hits: usize = records.iter().map(EventRecord::n_raw_hits).sum();
            let hits: usize = records.iter().map(EventRecord::n_hits).sum();
            println!("Events:      {}", records.len());
            println!("Raw hits:    {}", raw_hits);
            println!("Hits:        {}", hits);
            println!(
                "Time:        {:.2}s ({:.1} events/s)",
                elapsed.as_secs_f64(),
                records.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
            );

            if let Some(output) = output {
                let writer = BufWriter::new(File::create(&output)?);
                serde_json::to_writer_pretty(writer, &records)?;
                println!("Wrote {} events to {}", records.len(), output.display());
            }
        }

        Commands::Info { config } => {
            let scenario = Scenario::from_file(&config)?;
            print!("{}", describe(&scenario)?);
        }
    }

    Ok(())
}

/// Simulation, digitization and both hit makers for one sensor.
fn sensor_pipeline(scenario: &Scenario, sensor: &Arc<Sensor>) -> Result<SensorPipeline> {
    let chip = scenario.chip.build()?;
    let simulation = || Box::new(CdfSensorSim::new().with_trapping(scenario.trapping));

    let strips = StripHitMaker::new(simulation(), Arc::clone(&chip))
        .with_clustering(scenario.clustering.build()?)
        .with_config(scenario.strips.clone());
    let pixels = PixelHitMaker::new(simulation(), Arc::clone(&chip))
        .with_clustering(scenario.clustering.build()?)
        .with_config(scenario.pixels.clone());

    Ok(
        SensorPipeline::new(Arc::clone(sensor), Box::new(RawHitMaker::new(simulation(), chip)))
            .with_hit_maker(Box::new(strips))
            .with_hit_maker(Box::new(pixels)),
    )
}

fn build_driver(scenario: &Scenario, seed: u64, parallel: bool) -> Result<TrackerHitDriver> {
    let mut driver = TrackerHitDriver::new(seed).with_parallel(parallel);
    for sensor in &scenario.sensors {
        driver.add_sensor(sensor_pipeline(scenario, sensor)?)?;
    }
    Ok(driver)
}

/// Runs `events` events; the output depends only on the scenario and seed.
fn simulate(
    scenario: &Scenario,
    events: u64,
    seed: u64,
    parallel: bool,
) -> Result<Vec<EventRecord>> {
    let mut driver = build_driver(scenario, seed, parallel)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(GUN_STREAM);

    let mut records = Vec::new();
    for event in 0..events {
        let truth = scenario.gun.fire(&scenario.sensors, &mut rng);
        debug!(
            "event {}: {} truth hits on {} sensors",
            event,
            truth.values().map(Vec::len).sum::<usize>(),
            truth.len()
        );
        records.push(driver.process(event, &truth)?);
    }
    Ok(records)
}

fn describe(scenario: &Scenario) -> Result<String> {
    let chip = scenario.chip.build()?;
    let mut out = String::new();

    out.push_str(&format!("Readout chip: {}\n", chip.name()));
    match &scenario.clustering {
        ClusteringConfig::NearestNeighbor(config) => out.push_str(&format!(
            "Clustering:   NearestNeighbor (seed {} e, neighbor {} e)\n",
            config.seed_threshold, config.neighbor_threshold
        )),
        ClusteringConfig::NearestNeighborRms(config) => out.push_str(&format!(
            "Clustering:   NearestNeighborRMS (seed {}, neighbor {}, cluster {} sigma)\n",
            config.seed_threshold, config.neighbor_threshold, config.cluster_threshold
        )),
    }
    out.push_str(&format!("Trapping:     {} per 100 um\n", scenario.trapping));

    for sensor in &scenario.sensors {
        let position = sensor.local_to_global().translation.vector;
        out.push_str(&format!(
            "\nSensor {} \"{}\"\n  Thickness:  {} mm\n  Position:   ({}, {}, {}) mm\n  Bias:       {} V (depletion {} V)\n",
            sensor.id(),
            sensor.name(),
            sensor.thickness(),
            position.x,
            position.y,
            position.z,
            sensor.bias_voltage(),
            sensor.depletion_voltage()
        ));
        for carrier in sensor.carriers() {
            let Some(electrodes) = sensor.readout_electrodes(carrier) else {
                continue;
            };
            let layout = match electrodes.kind() {
                ElectrodeKind::Strips => "strips",
                ElectrodeKind::Pixels => "pixels",
            };
            let side = match carrier {
                ChargeCarrier::Hole => "Hole side",
                ChargeCarrier::Electron => "Electron side",
            };
            let pitch = (0..electrodes.n_axes())
                .map(|axis| format!("{}", electrodes.pitch(axis)))
                .collect::<Vec<_>>()
                .join(" x ");
            out.push_str(&format!(
                "  {}: {} {}, pitch {} mm{}\n",
                side,
                electrodes.n_cells(),
                layout,
                pitch,
                if sensor.is_ac_coupled(carrier) {
                    ", AC-coupled"
                } else {
                    ""
                }
            ));
            out.push_str(&format!(
                "    Noise:    {:.0} e RMS\n",
                chip.noise_rms(electrodes, 0)
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sisim_core::TruthHitId;

    const TELESCOPE: &str = r#"{
        "sensors": [
            {"id": 0, "position": [0.0, 0.0, 10.0],
             "electrodes": [{"count": 256, "pitch": 0.05, "length": 20.0}]},
            {"id": 1, "position": [0.0, 0.0, 20.0],
             "electrodes": [{"carrier": "electron", "layout": "pixels",
                             "rows": 64, "columns": 32, "row_pitch": 0.05, "column_pitch": 0.1}]}
        ],
        "readout": {"chip": "generic", "noise_intercept": 300.0,
                    "noise_threshold": 1200.0, "neighbor_threshold": 900.0},
        "gun": {"origin": [0.01, 0.02, 0.0], "tracks_per_event": 1}
    }"#;

    #[test]
    fn test_every_track_is_reconstructed() {
        let scenario = Scenario::from_json(TELESCOPE).unwrap();
        let records = simulate(&scenario, 5, 17, true).unwrap();
        assert_eq!(records.len(), 5);

        for record in &records {
            let strips = record.hit_collection("StripClusterer_SiTrackerHitStrip1D");
            let pixels = record.hit_collection("PixelClusterer_SiTrackerHitPixel");
            assert!(strips.iter().any(|hit| hit.truth_hits().contains(&TruthHitId(0))));
            assert!(pixels.iter().any(|hit| hit.truth_hits().contains(&TruthHitId(1))));
        }
    }

    #[test]
    fn test_simulation_is_reproducible() {
        let scenario = Scenario::from_json(TELESCOPE).unwrap();
        let parallel = simulate(&scenario, 3, 5, true).unwrap();
        let sequential = simulate(&scenario, 3, 5, false).unwrap();
        assert_eq!(parallel, sequential);

        let json = serde_json::to_string(&parallel).unwrap();
        let decoded: Vec<EventRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].n_hits(), parallel[0].n_hits());
    }

    #[test]
    fn test_describe_lists_sensors() {
        let scenario = Scenario::from_json(TELESCOPE).unwrap();
        let text = describe(&scenario).unwrap();
        assert!(text.contains("Readout chip: Generic"), "{text}");
        assert!(text.contains("256 strips"), "{text}");
        assert!(text.contains("2048 pixels"), "{text}");
        assert!(text.contains("300 e RMS"), "{text}");
    }
}
