//! Charge carrier species.

use std::fmt;
use std::ops::{Index, IndexMut};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Drifting charge species.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ChargeCarrier {
    Hole,
    Electron,
}

impl ChargeCarrier {
    /// Both species, holes first.
    pub const ALL: [ChargeCarrier; 2] = [ChargeCarrier::Hole, ChargeCarrier::Electron];

    /// Charge in units of e.
    #[inline]
    pub fn charge(self) -> f64 {
        match self {
            ChargeCarrier::Hole => 1.0,
            ChargeCarrier::Electron => -1.0,
        }
    }

    #[inline]
    fn index(self) -> usize {
        match self {
            ChargeCarrier::Hole => 0,
            ChargeCarrier::Electron => 1,
        }
    }
}

impl fmt::Display for ChargeCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeCarrier::Hole => f.write_str("hole"),
            ChargeCarrier::Electron => f.write_str("electron"),
        }
    }
}

/// One value per carrier species.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerCarrier<T> {
    values: [T; 2],
}

impl<T> PerCarrier<T> {
    /// Creates a map from explicit hole and electron values.
    pub fn new(hole: T, electron: T) -> Self {
        Self {
            values: [hole, electron],
        }
    }

    /// Iterates over `(carrier, value)` pairs, holes first.
    pub fn iter(&self) -> impl Iterator<Item = (ChargeCarrier, &T)> {
        ChargeCarrier::ALL.into_iter().zip(self.values.iter())
    }

    /// Mutable iteration over `(carrier, value)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChargeCarrier, &mut T)> {
        ChargeCarrier::ALL.into_iter().zip(self.values.iter_mut())
    }
}

impl<T> Index<ChargeCarrier> for PerCarrier<T> {
    type Output = T;

    fn index(&self, carrier: ChargeCarrier) -> &T {
        &self.values[carrier.index()]
    }
}

impl<T> IndexMut<ChargeCarrier> for PerCarrier<T> {
    fn index_mut(&mut self, carrier: ChargeCarrier) -> &mut T {
        &mut self.values[carrier.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_carrier_charge_sign() {
        assert!(ChargeCarrier::Hole.charge() > 0.0);
        assert!(ChargeCarrier::Electron.charge() < 0.0);
    }

    #[test]
    fn test_per_carrier_indexing() {
        let mut map = PerCarrier::new(1, 2);
        map[ChargeCarrier::Electron] += 5;
        assert_eq!(map[ChargeCarrier::Hole], 1);
        assert_eq!(map[ChargeCarrier::Electron], 7);

        let order: Vec<_> = map.iter().map(|(c, _)| c).collect();
        assert_eq!(order, vec![ChargeCarrier::Hole, ChargeCarrier::Electron]);
    }
}
