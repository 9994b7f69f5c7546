//! JSON scenario files.
//!
//! A scenario describes the sensors and their electrodes, the readout
//! chip, the clustering and hit-making settings, and a track gun.
//! Every section is optional; missing values fall back to the library
//! defaults.
//!
//! ```json
//! {
//!   "magnetic_field": [0.0, 0.0, 5.0],
//!   "sensors": [
//!     {
//!       "id": 0,
//!       "thickness": 0.3,
//!       "position": [0.0, 0.0, 100.0],
//!       "electrodes": [
//!         { "carrier": "hole", "layout": "strips", "count": 513, "pitch": 0.025,
//!           "readout": { "every": 2, "kernel": [[1.0], [0.15]] } }
//!       ]
//!     }
//!   ],
//!   "readout": { "chip": "kpix" },
//!   "clustering": { "algorithm": "nearest_neighbor_rms" },
//!   "gun": { "direction": [0.1, 0.0, 1.0], "tracks_per_event": 2 }
//! }
//! ```

use crate::gun::TrackGun;
use crate::{CliError, Result};
use nalgebra::{DMatrix, Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::Deserialize;
use sisim_algorithms::{
    ClusteringAlgorithm, NearestNeighbor, NearestNeighborConfig, NearestNeighborRms,
    NearestNeighborRmsConfig, PixelHitMakerConfig, StripHitMakerConfig,
};
use sisim_core::{
    surface_frame, ChargeCarrier, DopedSilicon, Doping, Pixels, ReadoutChip, Sensor, SensorId,
    Strips,
};
use sisim_digi::readout::kpix::{GainMode, Polarity};
use sisim_digi::{
    BasicReadoutChip, BasicReadoutConfig, GenericReadoutChip, GenericReadoutConfig, Kpix,
    KpixConfig,
};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

/// Readout chip selected by a scenario.
#[derive(Clone, Debug, PartialEq)]
pub enum ChipConfig {
    Basic(BasicReadoutConfig),
    Generic(GenericReadoutConfig),
    Kpix(KpixConfig),
}

impl ChipConfig {
    pub fn build(&self) -> sisim_core::Result<Arc<dyn ReadoutChip>> {
        Ok(match self {
            ChipConfig::Basic(config) => Arc::new(BasicReadoutChip::new(config.clone())?),
            ChipConfig::Generic(config) => Arc::new(GenericReadoutChip::new(config.clone())?),
            ChipConfig::Kpix(config) => Arc::new(Kpix::new(config.clone())?),
        })
    }
}

/// Clustering selected by a scenario.
#[derive(Clone, Debug, PartialEq)]
pub enum ClusteringConfig {
    NearestNeighbor(NearestNeighborConfig),
    NearestNeighborRms(NearestNeighborRmsConfig),
}

impl ClusteringConfig {
    /// A fresh algorithm instance; every hit maker owns its own.
    pub fn build(&self) -> sisim_core::Result<Box<dyn ClusteringAlgorithm>> {
        Ok(match self {
            ClusteringConfig::NearestNeighbor(config) => {
                Box::new(NearestNeighbor::new(config.clone())?)
            }
            ClusteringConfig::NearestNeighborRms(config) => {
                Box::new(NearestNeighborRms::new(config.clone())?)
            }
        })
    }
}

/// Validated scenario.
pub struct Scenario {
    pub sensors: Vec<Arc<Sensor>>,
    pub chip: ChipConfig,
    pub clustering: ClusteringConfig,
    pub strips: StripHitMakerConfig,
    pub pixels: PixelHitMakerConfig,
    /// Fraction of charge lost per 100 um of drift.
    pub trapping: f64,
    pub gun: TrackGun,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct JsonScenario {
    magnetic_field: [f64; 3],
    trapping: f64,
    sensors: Vec<JsonSensor>,
    readout: JsonReadoutChip,
    clustering: JsonClustering,
    hit_making: JsonHitMaking,
    gun: JsonGun,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JsonSensor {
    id: u32,
    name: Option<String>,
    thickness: f64,
    position: [f64; 3],
    /// Roll, pitch and yaw (rad).
    rotation: [f64; 3],
    bias_voltage: f64,
    depletion_voltage: f64,
    temperature: f64,
    doping: JsonDoping,
    electrodes: Vec<JsonElectrodes>,
}

impl Default for JsonSensor {
    fn default() -> Self {
        Self {
            id: 0,
            name: None,
            thickness: 0.3,
            position: [0.0; 3],
            rotation: [0.0; 3],
            bias_voltage: 110.0,
            depletion_voltage: 60.0,
            temperature: 293.0,
            doping: JsonDoping::N,
            electrodes: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum JsonDoping {
    #[default]
    N,
    P,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum JsonCarrier {
    #[default]
    Hole,
    Electron,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum JsonLayout {
    #[default]
    Strips,
    Pixels,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JsonElectrodes {
    carrier: JsonCarrier,
    layout: JsonLayout,
    // Strips
    count: usize,
    pitch: f64,
    length: f64,
    stereo_angle: f64,
    // Pixels
    rows: usize,
    columns: usize,
    row_pitch: f64,
    column_pitch: f64,
    /// AC-coupled readout through a subset of the sense strips.
    readout: Option<JsonAcReadout>,
}

impl Default for JsonElectrodes {
    fn default() -> Self {
        Self {
            carrier: JsonCarrier::Hole,
            layout: JsonLayout::Strips,
            count: 512,
            pitch: 0.05,
            length: 40.0,
            stereo_angle: 0.0,
            rows: 64,
            columns: 64,
            row_pitch: 0.05,
            column_pitch: 0.05,
            readout: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JsonAcReadout {
    /// Read out every n-th sense strip, starting with the first.
    every: usize,
    /// Transfer efficiencies by row offset (outer) and column offset (inner).
    kernel: Vec<Vec<f64>>,
}

impl Default for JsonAcReadout {
    fn default() -> Self {
        Self {
            every: 2,
            kernel: vec![vec![1.0], vec![0.5]],
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct JsonReadoutChip {
    chip: JsonChipKind,
    noise_intercept: Option<f64>,
    noise_slope: Option<f64>,
    noise_threshold: Option<f64>,
    neighbor_threshold: Option<f64>,
    // Basic
    nbits: Option<u32>,
    dynamic_range: Option<f64>,
    // Generic
    adc_per_fc: Option<f64>,
    // Kpix
    gain_mode: Option<JsonGainMode>,
    polarity: Option<JsonPolarity>,
    gain_crossover: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum JsonChipKind {
    Basic,
    #[default]
    Generic,
    Kpix,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum JsonGainMode {
    Single,
    Double,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "lowercase")]
enum JsonPolarity {
    Positive,
    Negative,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct JsonClustering {
    algorithm: JsonAlgorithm,
    seed_threshold: Option<f64>,
    neighbor_threshold: Option<f64>,
    cluster_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum JsonAlgorithm {
    #[default]
    NearestNeighbor,
    NearestNeighborRms,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct JsonHitMaking {
    max_cluster_nstrips: Option<usize>,
    max_noaverage_nstrips: Option<usize>,
    max_cluster_npixels: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JsonGun {
    origin: [f64; 3],
    direction: [f64; 3],
    /// Gaussian spread of the direction (rad).
    angular_spread: f64,
    /// Gaussian spread of the origin in x and y (mm).
    position_spread: f64,
    tracks_per_event: usize,
    /// Mean energy loss (MeV/mm).
    energy_loss: f64,
}

impl Default for JsonGun {
    fn default() -> Self {
        let gun = TrackGun::default();
        Self {
            origin: [gun.origin.x, gun.origin.y, gun.origin.z],
            direction: [gun.direction.x, gun.direction.y, gun.direction.z],
            angular_spread: gun.angular_spread,
            position_spread: gun.position_spread,
            tracks_per_event: gun.tracks_per_event,
            energy_loss: gun.energy_loss,
        }
    }
}

impl Scenario {
    /// Load a scenario from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config: JsonScenario = serde_json::from_reader(reader)?;
        Self::from_json_config(config)
    }

    /// Load a scenario from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: JsonScenario = serde_json::from_str(json)?;
        Self::from_json_config(config)
    }

    fn from_json_config(config: JsonScenario) -> Result<Self> {
        if config.sensors.is_empty() {
            return Err(CliError::Scenario("no sensors defined".to_string()));
        }
        if !(0.0..=1.0).contains(&config.trapping) {
            return Err(CliError::Scenario(format!(
                "trapping must lie in [0, 1], got {}",
                config.trapping
            )));
        }

        let b_field = Vector3::from(config.magnetic_field);
        let mut ids = BTreeSet::new();
        let mut sensors = Vec::with_capacity(config.sensors.len());
        for sensor in &config.sensors {
            if !ids.insert(sensor.id) {
                return Err(CliError::Scenario(format!(
                    "sensor id {} used twice",
                    sensor.id
                )));
            }
            sensors.push(Arc::new(build_sensor(sensor, b_field)?));
        }

        let chip = chip_config(&config.readout);
        chip.build()?;
        let clustering = clustering_config(&config.clustering);
        clustering.build()?;

        let mut strips = StripHitMakerConfig::default();
        if let Some(max) = config.hit_making.max_cluster_nstrips {
            strips = strips.with_max_cluster_size(max);
        }
        if let Some(max) = config.hit_making.max_noaverage_nstrips {
            strips = strips.with_central_averaging(max);
        }
        let mut pixels = PixelHitMakerConfig::default();
        if let Some(max) = config.hit_making.max_cluster_npixels {
            pixels = pixels.with_max_cluster_size(max);
        }

        let gun = build_gun(&config.gun)?;

        Ok(Self {
            sensors,
            chip,
            clustering,
            strips,
            pixels,
            trapping: config.trapping,
            gun,
        })
    }
}

fn build_sensor(config: &JsonSensor, b_field: Vector3<f64>) -> Result<Sensor> {
    if config.electrodes.is_empty() {
        return Err(CliError::Scenario(format!(
            "sensor {} has no electrodes",
            config.id
        )));
    }
    let [roll, pitch, yaw] = config.rotation;
    let placement = Isometry3::from_parts(
        Translation3::from(Vector3::from(config.position)),
        UnitQuaternion::from_euler_angles(roll, pitch, yaw),
    );
    let doping = match config.doping {
        JsonDoping::N => Doping::NType,
        JsonDoping::P => Doping::PType,
    };

    let mut builder = Sensor::builder(SensorId(config.id), config.thickness)
        .with_bulk(
            DopedSilicon::default()
                .with_doping(doping)
                .with_temperature(config.temperature),
        )
        .with_voltages(config.bias_voltage, config.depletion_voltage)
        .with_placement(placement)
        .with_magnetic_field(b_field);
    if let Some(name) = &config.name {
        builder = builder.with_name(name.clone());
    }

    for electrodes in &config.electrodes {
        let carrier = match electrodes.carrier {
            JsonCarrier::Hole => ChargeCarrier::Hole,
            JsonCarrier::Electron => ChargeCarrier::Electron,
        };
        let frame = surface_frame(carrier, config.thickness, electrodes.stereo_angle);
        match electrodes.layout {
            JsonLayout::Strips => {
                let sense = Strips::new(
                    carrier,
                    electrodes.count,
                    electrodes.pitch,
                    electrodes.length,
                    frame,
                )?;
                builder = builder.with_sense_electrodes(Box::new(sense));
                if let Some(readout) = &electrodes.readout {
                    let (strips, kernel) = ac_readout(config.id, electrodes, readout, carrier)?;
                    let strips = Strips::new(
                        carrier,
                        strips,
                        electrodes.pitch * readout.every as f64,
                        electrodes.length,
                        frame,
                    )?;
                    builder = builder.with_readout_electrodes(Box::new(strips), kernel);
                }
            }
            JsonLayout::Pixels => {
                if electrodes.readout.is_some() {
                    return Err(CliError::Scenario(format!(
                        "sensor {}: AC readout is only supported for strips",
                        config.id
                    )));
                }
                let sense = Pixels::new(
                    carrier,
                    electrodes.rows,
                    electrodes.columns,
                    electrodes.row_pitch,
                    electrodes.column_pitch,
                    frame,
                )?;
                builder = builder.with_sense_electrodes(Box::new(sense));
            }
        }
    }

    Ok(builder.build()?)
}

/// Readout strip count and transfer kernel of an AC-coupled strip side.
///
/// Readout strips sit on every n-th sense strip, so the first and last
/// sense strips must both be read out.
fn ac_readout(
    sensor: u32,
    electrodes: &JsonElectrodes,
    readout: &JsonAcReadout,
    carrier: ChargeCarrier,
) -> Result<(usize, DMatrix<f64>)> {
    if readout.every == 0 || electrodes.count == 0 || (electrodes.count - 1) % readout.every != 0
    {
        return Err(CliError::Scenario(format!(
            "sensor {sensor}: {} {carrier} strips cannot be read out every {} strips",
            electrodes.count, readout.every
        )));
    }
    let nrows = readout.kernel.len();
    let ncols = readout.kernel.first().map_or(0, Vec::len);
    if nrows == 0 || ncols == 0 || readout.kernel.iter().any(|row| row.len() != ncols) {
        return Err(CliError::Scenario(format!(
            "sensor {sensor}: {carrier} transfer kernel must be a non-empty rectangle"
        )));
    }
    let values: Vec<f64> = readout.kernel.iter().flatten().copied().collect();
    let kernel = DMatrix::from_row_slice(nrows, ncols, &values);
    Ok(((electrodes.count - 1) / readout.every + 1, kernel))
}

fn chip_config(config: &JsonReadoutChip) -> ChipConfig {
    match config.chip {
        JsonChipKind::Basic => {
            let mut chip = BasicReadoutConfig::default();
            chip.noise.intercept = config.noise_intercept.unwrap_or(chip.noise.intercept);
            chip.noise.slope = config.noise_slope.unwrap_or(chip.noise.slope);
            chip.noise_threshold = config.noise_threshold.unwrap_or(chip.noise_threshold);
            chip.neighbor_threshold = config.neighbor_threshold.unwrap_or(chip.neighbor_threshold);
            if let Some(nbits) = config.nbits {
                chip = chip.with_nbits(nbits);
            }
            if let Some(range) = config.dynamic_range {
                chip = chip.with_dynamic_range(range);
            }
            ChipConfig::Basic(chip)
        }
        JsonChipKind::Generic => {
            let mut chip = GenericReadoutConfig::default();
            chip.noise.intercept = config.noise_intercept.unwrap_or(chip.noise.intercept);
            chip.noise.slope = config.noise_slope.unwrap_or(chip.noise.slope);
            chip.noise_threshold = config.noise_threshold.unwrap_or(chip.noise_threshold);
            chip.neighbor_threshold = config.neighbor_threshold.unwrap_or(chip.neighbor_threshold);
            if let Some(adc_per_fc) = config.adc_per_fc {
                chip = chip.with_adc_per_fc(adc_per_fc);
            }
            ChipConfig::Generic(chip)
        }
        JsonChipKind::Kpix => {
            let mut chip = KpixConfig::default();
            chip.noise.intercept = config.noise_intercept.unwrap_or(chip.noise.intercept);
            chip.noise.slope = config.noise_slope.unwrap_or(chip.noise.slope);
            chip.noise_threshold = config.noise_threshold.unwrap_or(chip.noise_threshold);
            chip.neighbor_threshold = config.neighbor_threshold.unwrap_or(chip.neighbor_threshold);
            if let Some(mode) = config.gain_mode {
                chip = chip.with_gain_mode(match mode {
                    JsonGainMode::Single => GainMode::Single,
                    JsonGainMode::Double => GainMode::Double,
                });
            }
            if let Some(polarity) = config.polarity {
                chip.polarity = match polarity {
                    JsonPolarity::Positive => Polarity::Positive,
                    JsonPolarity::Negative => Polarity::Negative,
                };
            }
            chip.gain_crossover = config.gain_crossover.unwrap_or(chip.gain_crossover);
            ChipConfig::Kpix(chip)
        }
    }
}

fn clustering_config(config: &JsonClustering) -> ClusteringConfig {
    match config.algorithm {
        JsonAlgorithm::NearestNeighbor => {
            let defaults = NearestNeighborConfig::default();
            ClusteringConfig::NearestNeighbor(defaults.clone().with_thresholds(
                config.seed_threshold.unwrap_or(defaults.seed_threshold),
                config.neighbor_threshold.unwrap_or(defaults.neighbor_threshold),
            ))
        }
        JsonAlgorithm::NearestNeighborRms => {
            let defaults = NearestNeighborRmsConfig::default();
            ClusteringConfig::NearestNeighborRms(defaults.clone().with_thresholds(
                config.seed_threshold.unwrap_or(defaults.seed_threshold),
                config.neighbor_threshold.unwrap_or(defaults.neighbor_threshold),
                config.cluster_threshold.unwrap_or(defaults.cluster_threshold),
            ))
        }
    }
}

fn build_gun(config: &JsonGun) -> Result<TrackGun> {
    let direction = Vector3::from(config.direction);
    if direction.norm() == 0.0 || !direction.iter().all(|c| c.is_finite()) {
        return Err(CliError::Scenario(
            "gun direction must be a finite non-zero vector".to_string(),
        ));
    }
    if config.angular_spread < 0.0 || config.position_spread < 0.0 {
        return Err(CliError::Scenario("gun spreads must be non-negative".to_string()));
    }
    if config.energy_loss.is_nan() || config.energy_loss < 0.0 {
        return Err(CliError::Scenario(format!(
            "gun energy loss must be non-negative, got {}",
            config.energy_loss
        )));
    }
    Ok(TrackGun {
        origin: Point3::from(config.origin),
        direction: direction.normalize(),
        angular_spread: config.angular_spread,
        position_spread: config.position_spread,
        tracks_per_event: config.tracks_per_event,
        energy_loss: config.energy_loss,
    })
}
