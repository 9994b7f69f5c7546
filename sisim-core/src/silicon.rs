//! Bulk silicon properties.

use crate::carrier::ChargeCarrier;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Mean energy to create one electron-hole pair (MeV).
pub const ENERGY_EHPAIR: f64 = 3.6e-6;

/// Boltzmann constant (eV/K).
pub const K_BOLTZMANN: f64 = 8.617_343e-5;

/// Charge of one electron in femtocoulombs.
pub const FC_PER_ELECTRON: f64 = 1.602e-4;

/// Elementary charge (C).
pub const E_CHARGE: f64 = 1.602e-19;

/// Doping type of the sensor bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Doping {
    NType,
    PType,
}

/// Doped silicon bulk.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DopedSilicon {
    pub doping: Doping,
    /// Temperature (K).
    pub temperature: f64,
    /// Electron mobility (cm^2/V/s).
    pub electron_mobility: f64,
    /// Hole mobility (cm^2/V/s).
    pub hole_mobility: f64,
}

impl Default for DopedSilicon {
    fn default() -> Self {
        Self {
            doping: Doping::NType,
            temperature: 293.0,
            electron_mobility: 1350.0,
            hole_mobility: 480.0,
        }
    }
}

impl DopedSilicon {
    /// Set the doping type.
    #[must_use]
    pub fn with_doping(mut self, doping: Doping) -> Self {
        self.doping = doping;
        self
    }

    /// Set the temperature in kelvin.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn is_n_type(&self) -> bool {
        self.doping == Doping::NType
    }

    /// Mobility of the given carrier (cm^2/V/s).
    #[inline]
    pub fn mobility(&self, carrier: ChargeCarrier) -> f64 {
        match carrier {
            ChargeCarrier::Hole => self.hole_mobility,
            ChargeCarrier::Electron => self.electron_mobility,
        }
    }

    /// Thermal voltage kT/e (V).
    #[inline]
    pub fn thermal_voltage(&self) -> f64 {
        K_BOLTZMANN * self.temperature
    }
}
