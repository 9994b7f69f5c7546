//! Charge transport and digitization traits.

use crate::carrier::{ChargeCarrier, PerCarrier};
use crate::electrode_data::ElectrodeDataCollection;
use crate::error::Result;
use crate::hit::{RawHit, TruthHit};
use crate::sensor::Sensor;
use nalgebra::Point3;
use rand::RngCore;
use std::sync::Arc;

/// Turns energy deposits on a sensor into electrode charge.
pub trait SensorSimulation: Send {
    /// Simulation name.
    fn name(&self) -> &'static str;

    /// Binds the simulation to a sensor.
    fn set_sensor(&mut self, sensor: Arc<Sensor>);

    /// Drifts and collects the charge of `truth_hits`, accumulating into the
    /// readout collections.
    fn compute_electrode_data(
        &mut self,
        truth_hits: &[TruthHit],
    ) -> Result<&PerCarrier<ElectrodeDataCollection>>;

    /// Empties the accumulated readout collections.
    fn clear_readout(&mut self);

    /// Moves a sensor-local point along the drift line of `carrier` to the
    /// mid-plane between the bias surfaces.
    fn lorentz_correct(&self, position: &mut Point3<f64>, carrier: ChargeCarrier) -> Result<()>;
}

/// Produces raw hits for one sensor.
pub trait Digitizer: Send {
    /// Digitizer name, used to name the raw hit collection.
    fn name(&self) -> &str;

    /// Simulates and digitizes the truth hits of one sensor.
    fn make_hits(
        &mut self,
        sensor: &Arc<Sensor>,
        truth_hits: &[TruthHit],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<RawHit>>;

    /// Name of the output collection.
    fn collection_name(&self) -> String {
        format!("{}_RawTrackerHits", self.name())
    }
}
