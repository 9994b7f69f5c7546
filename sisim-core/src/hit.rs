//! Truth, raw and reconstructed hit types.

use crate::carrier::ChargeCarrier;
use nalgebra::{Isometry3, Matrix3, Point3, Vector3};
use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a simulated energy deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthHitId(pub u32);

/// Identifier of a sensor within the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorId(pub u32);

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A simulated straight-line energy deposit in global coordinates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TruthHit {
    /// Provenance identifier.
    pub id: TruthHitId,
    /// Entry point (global frame, mm).
    pub start: Point3<f64>,
    /// Exit point (global frame, mm).
    pub end: Point3<f64>,
    /// Deposited energy (MeV).
    pub energy: f64,
}

impl TruthHit {
    /// Creates a new truth hit.
    pub fn new(id: TruthHitId, start: Point3<f64>, end: Point3<f64>, energy: f64) -> Self {
        Self {
            id,
            start,
            end,
            energy,
        }
    }

    /// Midpoint between entry and exit.
    #[inline]
    pub fn midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.start, &self.end)
    }
}

/// Straight-line energy deposit in a sensor-local frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSegment {
    pub p1: Point3<f64>,
    pub p2: Point3<f64>,
    /// Energy loss along the segment (MeV).
    pub energy_loss: f64,
}

impl TrackSegment {
    /// Creates a segment from two local points.
    pub fn new(p1: Point3<f64>, p2: Point3<f64>, energy_loss: f64) -> Self {
        Self {
            p1,
            p2,
            energy_loss,
        }
    }

    /// Converts a truth hit into the frame given by `global_to_local`.
    pub fn from_truth_hit(hit: &TruthHit, global_to_local: &Isometry3<f64>) -> Self {
        Self::new(
            global_to_local.transform_point(&hit.start),
            global_to_local.transform_point(&hit.end),
            hit.energy,
        )
    }

    /// Displacement from `p1` to `p2`.
    #[inline]
    pub fn vector(&self) -> Vector3<f64> {
        self.p2 - self.p1
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.vector().norm()
    }
}

/// Address of one readout channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelId {
    pub sensor: SensorId,
    /// Carrier collected by the electrodes this channel belongs to.
    pub side: ChargeCarrier,
    /// Cell index on the readout electrodes.
    pub cell: usize,
}

/// Digitized channel as written by a readout chip.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RawHit {
    pub channel: ChannelId,
    /// Raw chip words (one for most chips, two for Kpix).
    pub adc_values: Vec<i32>,
    pub time: i32,
    /// Truth deposits that contributed charge to this channel.
    pub truth_hits: BTreeSet<TruthHitId>,
}

impl RawHit {
    /// Creates a raw hit with no truth provenance.
    pub fn new(channel: ChannelId, adc_values: Vec<i32>, time: i32) -> Self {
        Self {
            channel,
            adc_values,
            time,
            truth_hits: BTreeSet::new(),
        }
    }

    /// Attaches truth provenance.
    #[must_use]
    pub fn with_truth_hits(mut self, truth_hits: BTreeSet<TruthHitId>) -> Self {
        self.truth_hits = truth_hits;
        self
    }

    /// Cell index on the readout electrodes.
    #[inline]
    pub fn cell(&self) -> usize {
        self.channel.cell
    }
}

/// Kind of reconstructed hit, used to name output collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum HitKind {
    /// One measured coordinate from a strip cluster.
    Strip1D,
    /// Two measured coordinates from a pixel cluster.
    Pixel,
}

impl HitKind {
    /// Suffix appended to the producer name to form the collection name.
    pub fn collection_suffix(self) -> &'static str {
        match self {
            HitKind::Strip1D => "SiTrackerHitStrip1D",
            HitKind::Pixel => "SiTrackerHitPixel",
        }
    }
}

/// Space point reconstructed from one cluster.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReconstructedHit {
    /// Position in the frame of this hit (global unless transformed).
    pub position: Point3<f64>,
    /// Symmetric covariance of `position`.
    pub covariance: Matrix3<f64>,
    /// Deposited energy (MeV).
    pub energy: f64,
    pub time: f64,
    pub kind: HitKind,
    pub raw_hits: Vec<RawHit>,
}

impl ReconstructedHit {
    /// Union of truth deposits over all contributing raw hits.
    pub fn truth_hits(&self) -> BTreeSet<TruthHitId> {
        self.raw_hits
            .iter()
            .flat_map(|hit| hit.truth_hits.iter().copied())
            .collect()
    }

    /// Copy of this hit expressed in another frame.
    #[must_use]
    pub fn transformed(&self, transform: &Isometry3<f64>) -> Self {
        let rotation = transform.rotation.to_rotation_matrix();
        let r = rotation.matrix();
        Self {
            position: transform.transform_point(&self.position),
            covariance: r * self.covariance * r.transpose(),
            ..self.clone()
        }
    }
}
