//! Cluster-width resolution model.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Measured-coordinate resolution as a fraction of the sense pitch,
/// stepped by cluster width.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClusterResolution {
    /// Single-cell clusters (default: 1/sqrt(12)).
    pub one: f64,
    /// Two-cell clusters (default: 1/5).
    pub two: f64,
    /// Three-cell clusters (default: 1/3).
    pub three: f64,
    /// Four-cell clusters (default: 1/2).
    pub four: f64,
    /// Five cells or wider (default: 1).
    pub wide: f64,
}

impl Default for ClusterResolution {
    fn default() -> Self {
        Self {
            one: 1.0 / 12.0_f64.sqrt(),
            two: 0.2,
            three: 1.0 / 3.0,
            four: 0.5,
            wide: 1.0,
        }
    }
}

impl ClusterResolution {
    /// Fraction of the pitch for a cluster `width` cells wide.
    pub fn fraction(&self, width: usize) -> f64 {
        match width {
            0 | 1 => self.one,
            2 => self.two,
            3 => self.three,
            4 => self.four,
            _ => self.wide,
        }
    }

    /// Resolution (mm) for a cluster `width` cells wide on electrodes of
    /// the given sense pitch.
    #[inline]
    pub fn resolution(&self, width: usize, pitch: f64) -> f64 {
        pitch * self.fraction(width)
    }
}
