//! Per-cell accumulated charge with truth provenance.

use crate::hit::TruthHitId;
use std::collections::btree_map::{self, BTreeMap};
use std::collections::BTreeSet;

/// Charge collected on one electrode cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectrodeData {
    charge: i32,
    truth_hits: BTreeSet<TruthHitId>,
}

impl ElectrodeData {
    /// Charge with no truth provenance (noise).
    pub fn from_charge(charge: i32) -> Self {
        Self {
            charge,
            truth_hits: BTreeSet::new(),
        }
    }

    /// Charge attributed to a single truth deposit.
    pub fn with_truth_hit(charge: i32, truth_hit: TruthHitId) -> Self {
        Self {
            charge,
            truth_hits: BTreeSet::from([truth_hit]),
        }
    }

    pub fn new(charge: i32, truth_hits: BTreeSet<TruthHitId>) -> Self {
        Self { charge, truth_hits }
    }

    /// Charge in electrons.
    #[inline]
    pub fn charge(&self) -> i32 {
        self.charge
    }

    #[inline]
    pub fn truth_hits(&self) -> &BTreeSet<TruthHitId> {
        &self.truth_hits
    }

    /// False for an entry carrying neither charge nor provenance.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.charge != 0 || !self.truth_hits.is_empty()
    }

    /// Sums charge and merges provenance. The sum saturates at the `i32` range.
    pub fn add(&mut self, other: &ElectrodeData) {
        self.charge = self.charge.saturating_add(other.charge);
        self.truth_hits.extend(other.truth_hits.iter().copied());
    }

    pub fn add_charge(&mut self, charge: i32) {
        self.charge = self.charge.saturating_add(charge);
    }
}

/// Ordered map from cell index to [`ElectrodeData`].
///
/// Iteration is ascending by cell, which fixes the order in which noise
/// and digitization consume random draws.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElectrodeDataCollection {
    cells: BTreeMap<usize, ElectrodeData>,
}

impl ElectrodeDataCollection {
    /// Creates an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a collection from a charge map attributed to one truth deposit.
    pub fn from_charge_map(charges: &BTreeMap<usize, i32>, truth_hit: TruthHitId) -> Self {
        let mut collection = Self::new();
        collection.add_map(charges, truth_hit);
        collection
    }

    /// Adds data to a cell. Invalid data is ignored.
    pub fn add(&mut self, cell: usize, data: ElectrodeData) {
        if !data.is_valid() {
            return;
        }
        match self.cells.entry(cell) {
            btree_map::Entry::Occupied(mut entry) => entry.get_mut().add(&data),
            btree_map::Entry::Vacant(entry) => {
                entry.insert(data);
            }
        }
    }

    /// Adds every cell of a charge map, attributed to `truth_hit`.
    pub fn add_map(&mut self, charges: &BTreeMap<usize, i32>, truth_hit: TruthHitId) {
        for (&cell, &charge) in charges {
            self.add(cell, ElectrodeData::with_truth_hit(charge, truth_hit));
        }
    }

    /// Merges another collection into this one.
    pub fn add_collection(&mut self, other: &ElectrodeDataCollection) {
        for (&cell, data) in &other.cells {
            self.add(cell, data.clone());
        }
    }

    /// Adds charge to an existing cell; unknown cells are left untouched.
    ///
    /// A cell left with neither charge nor provenance is removed.
    pub fn add_charge(&mut self, cell: usize, charge: i32) {
        if let btree_map::Entry::Occupied(mut entry) = self.cells.entry(cell) {
            entry.get_mut().add_charge(charge);
            if !entry.get().is_valid() {
                entry.remove();
            }
        }
    }

    #[inline]
    pub fn get(&self, cell: usize) -> Option<&ElectrodeData> {
        self.cells.get(&cell)
    }

    #[inline]
    pub fn contains(&self, cell: usize) -> bool {
        self.cells.contains_key(&cell)
    }

    /// Charge per cell.
    pub fn charge_map(&self) -> BTreeMap<usize, i32> {
        self.cells
            .iter()
            .map(|(&cell, data)| (cell, data.charge()))
            .collect()
    }

    /// Total charge over all cells.
    pub fn total_charge(&self) -> i64 {
        self.cells.values().map(|data| i64::from(data.charge())).sum()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Occupied cells in ascending order.
    pub fn cells(&self) -> impl Iterator<Item = usize> + '_ {
        self.cells.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ElectrodeData)> {
        self.cells.iter().map(|(&cell, data)| (cell, data))
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

impl<'a> IntoIterator for &'a ElectrodeDataCollection {
    type Item = (&'a usize, &'a ElectrodeData);
    type IntoIter = btree_map::Iter<'a, usize, ElectrodeData>;

    fn into_iter(self) -> Self::IntoIter {
        self.cells.iter()
    }
}
