//! sisim-core: Core traits and types for silicon sensor simulation.
//!
//! This crate provides the data model shared by the simulation and
//! reconstruction crates: electrode charge collections, sensor and
//! electrode geometry, and the strategy traits for charge transport,
//! readout chips, clustering and hit making.
//!

pub mod bivariate;
pub mod carrier;
pub mod clustering;
pub mod electrode_data;
pub mod electrodes;
pub mod error;
pub mod geometry;
pub mod hit;
pub mod hit_maker;
pub mod readout;
pub mod sensor;
pub mod silicon;
pub mod simulation;

pub use carrier::{ChargeCarrier, PerCarrier};
pub use clustering::{Cluster, ClusteringAlgorithm};
pub use electrode_data::{ElectrodeData, ElectrodeDataCollection};
pub use electrodes::{ElectrodeKind, Pixels, SensorElectrodes, Strips};
pub use error::{Error, Result};
pub use geometry::{GaussianDistribution2D, Plane};
pub use hit::{
    ChannelId, HitKind, RawHit, ReconstructedHit, SensorId, TrackSegment, TruthHit, TruthHitId,
};
pub use hit_maker::HitMaker;
pub use readout::{DigitizedChannelData, ReadoutChannel, ReadoutChip};
pub use sensor::{surface_frame, Sensor, SensorBuilder};
pub use silicon::{DopedSilicon, Doping, ENERGY_EHPAIR};
pub use simulation::{Digitizer, SensorSimulation};
