//! Cluster-to-hit conversion trait.

use crate::hit::{HitKind, RawHit, ReconstructedHit};
use crate::sensor::Sensor;
use crate::Result;
use std::sync::Arc;

/// Clusters the raw hits of a sensor and converts clusters into hits.
pub trait HitMaker: Send {
    /// Producer name, used to name the output collection.
    fn name(&self) -> &str;

    /// Kind of hit produced.
    fn hit_kind(&self) -> HitKind;

    /// Makes hits from the raw hits of one sensor.
    ///
    /// Raw hits on electrodes this maker does not handle are ignored.
    fn make_hits(&mut self, sensor: &Arc<Sensor>, raw_hits: &[RawHit]) -> Result<Vec<ReconstructedHit>>;

    /// Name of the output collection.
    fn collection_name(&self) -> String {
        format!("{}_{}", self.name(), self.hit_kind().collection_suffix())
    }
}
