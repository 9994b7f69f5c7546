//! Electrode layouts: strip and pixel grids.
//!
//! Every layout lives in its own frame: `x` is the first measured axis,
//! `y` the second (pixels) or the strip direction (strips), and `z` is
//! normal to the collection surface with `z = 0` on it.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::missing_errors_doc
)]

use crate::bivariate::{self, Binning};
use crate::carrier::ChargeCarrier;
use crate::error::{Error, Result};
use crate::geometry::GaussianDistribution2D;
use nalgebra::{Isometry3, Point3, Vector3};
use std::collections::BTreeMap;

/// Default integration window in units of sigma.
pub const DEFAULT_WINDOW: f64 = 5.0;

/// Widths below this fraction of the pitch are treated as a point charge.
const MIN_RELATIVE_WIDTH: f64 = 1e-6;

/// Layout family, used by hit makers to pick their electrodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElectrodeKind {
    Strips,
    Pixels,
}

/// Addressable grid of sensing cells on one side of a sensor.
pub trait SensorElectrodes: Send + Sync + std::fmt::Debug {
    /// Layout family.
    fn kind(&self) -> ElectrodeKind;

    /// Carrier collected by these electrodes.
    fn carrier(&self) -> ChargeCarrier;

    /// Number of measured axes (1 for strips, 2 for pixels).
    fn n_axes(&self) -> usize;

    fn n_cells(&self) -> usize;

    /// Pitch along a measured axis (mm).
    fn pitch(&self, axis: usize) -> f64;

    /// Unit vector of a measured axis in the electrode frame.
    fn measured_coordinate(&self, axis: usize) -> Vector3<f64> {
        if axis == 0 {
            Vector3::x()
        } else {
            Vector3::y()
        }
    }

    /// Unit vector perpendicular to a measured axis, in the electrode plane.
    fn unmeasured_coordinate(&self, axis: usize) -> Vector3<f64> {
        if axis == 0 {
            Vector3::y()
        } else {
            Vector3::x()
        }
    }

    /// Sensor frame to electrode frame.
    fn parent_to_local(&self) -> &Isometry3<f64>;

    /// Row address (the cell index along axis 0).
    fn row_number(&self, cell: usize) -> usize;

    /// Column address (the cell index along axis 1, always 0 for strips).
    fn column_number(&self, cell: usize) -> usize;

    /// Cell at a row/column address, `None` outside the grid.
    fn cell_id(&self, row: i64, column: i64) -> Option<usize>;

    /// Cell containing a point, clamped to the grid.
    fn cell_id_at(&self, position: &Point3<f64>) -> usize;

    /// Centre of a cell in the electrode frame.
    fn cell_position(&self, cell: usize) -> Point3<f64>;

    /// Capacitance of a cell (pF).
    fn capacitance(&self, cell: usize) -> f64;

    /// Representative capacitance of the layout (pF).
    fn nominal_capacitance(&self) -> f64;

    /// Extent of a cell along the unmeasured direction (mm).
    fn cell_length(&self, cell: usize) -> f64;

    /// Adjacent cells, ascending.
    fn nearest_neighbor_cells(&self, cell: usize) -> Vec<usize>;

    /// Integrates a charge distribution given in the electrode frame.
    fn compute_electrode_data(&self, distribution: &GaussianDistribution2D) -> BTreeMap<usize, i32>;

    #[inline]
    fn is_valid_cell(&self, cell: usize) -> bool {
        cell < self.n_cells()
    }

    /// Offset of a point from the centre of the cell containing it.
    fn position_in_cell(&self, position: &Point3<f64>) -> Vector3<f64> {
        position - self.cell_position(self.cell_id_at(position))
    }

    /// Electrode-plane normal expressed in the sensor frame.
    fn normal_in_parent(&self) -> Vector3<f64> {
        self.parent_to_local().inverse_transform_vector(&Vector3::z())
    }

    /// A measured axis expressed in the sensor frame.
    fn measured_coordinate_in_parent(&self, axis: usize) -> Vector3<f64> {
        self.parent_to_local()
            .inverse_transform_vector(&self.measured_coordinate(axis))
    }
}

/// Uniformly spaced cells along one axis, centred on the origin.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
    count: usize,
    pitch: f64,
    offset: f64,
}

impl Axis {
    fn new(count: usize, pitch: f64) -> Self {
        Self {
            count,
            pitch,
            offset: (count as f64 - 1.0) * pitch / 2.0,
        }
    }

    #[inline]
    fn center(&self, index: usize) -> f64 {
        index as f64 * self.pitch - self.offset
    }

    #[inline]
    fn index_at(&self, coordinate: f64) -> usize {
        let raw = ((coordinate + self.offset) / self.pitch).round();
        raw.clamp(0.0, (self.count - 1) as f64) as usize
    }

    /// Range of cells covering `mean +- window`.
    fn span(&self, mean: f64, window: f64) -> (usize, usize) {
        (self.index_at(mean - window), self.index_at(mean + window))
    }

    /// Charge fraction per cell for a 1D Gaussian.
    fn fractions(&self, mean: f64, sigma: f64, window: f64) -> Vec<(usize, f64)> {
        if sigma < MIN_RELATIVE_WIDTH * self.pitch {
            return vec![(self.index_at(mean), 1.0)];
        }
        let (first, last) = self.span(mean, window * sigma);
        (first..=last)
            .map(|index| {
                let lower = self.center(index) - self.pitch / 2.0;
                let upper = lower + self.pitch;
                let fraction =
                    bivariate::phi((upper - mean) / sigma) - bivariate::phi((lower - mean) / sigma);
                (index, fraction)
            })
            .collect()
    }
}

fn validate_axis(name: &str, count: usize, pitch: f64) -> Result<()> {
    if count == 0 {
        return Err(Error::Geometry(format!("{name}: cell count must be positive")));
    }
    if pitch.is_nan() || pitch <= 0.0 {
        return Err(Error::Geometry(format!("{name}: pitch must be positive, got {pitch}")));
    }
    Ok(())
}

/// Parallel strips measuring `x`.
#[derive(Debug, Clone)]
pub struct Strips {
    carrier: ChargeCarrier,
    axis: Axis,
    length: f64,
    capacitance_intercept: f64,
    capacitance_slope: f64,
    window: f64,
    parent_to_local: Isometry3<f64>,
}

impl Strips {
    /// Creates `n_strips` strips of the given pitch and length (mm).
    pub fn new(
        carrier: ChargeCarrier,
        n_strips: usize,
        pitch: f64,
        length: f64,
        parent_to_local: Isometry3<f64>,
    ) -> Result<Self> {
        validate_axis("strips", n_strips, pitch)?;
        if length.is_nan() || length <= 0.0 {
            return Err(Error::Geometry(format!("strip length must be positive, got {length}")));
        }
        Ok(Self {
            carrier,
            axis: Axis::new(n_strips, pitch),
            length,
            capacitance_intercept: 10.0,
            capacitance_slope: 0.1,
            window: DEFAULT_WINDOW,
            parent_to_local,
        })
    }

    /// Capacitance model `intercept + slope * length` (pF, pF/mm).
    #[must_use]
    pub fn with_capacitance(mut self, intercept: f64, slope: f64) -> Self {
        self.capacitance_intercept = intercept;
        self.capacitance_slope = slope;
        self
    }

    /// Integration window in sigma.
    #[must_use]
    pub fn with_window(mut self, sigmas: f64) -> Self {
        self.window = sigmas;
        self
    }

    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }
}

impl SensorElectrodes for Strips {
    fn kind(&self) -> ElectrodeKind {
        ElectrodeKind::Strips
    }

    fn carrier(&self) -> ChargeCarrier {
        self.carrier
    }

    fn n_axes(&self) -> usize {
        1
    }

    fn n_cells(&self) -> usize {
        self.axis.count
    }

    fn pitch(&self, _axis: usize) -> f64 {
        self.axis.pitch
    }

    fn parent_to_local(&self) -> &Isometry3<f64> {
        &self.parent_to_local
    }

    fn row_number(&self, cell: usize) -> usize {
        cell
    }

    fn column_number(&self, _cell: usize) -> usize {
        0
    }

    fn cell_id(&self, row: i64, column: i64) -> Option<usize> {
        if column != 0 || row < 0 || row >= self.axis.count as i64 {
            return None;
        }
        Some(row as usize)
    }

    fn cell_id_at(&self, position: &Point3<f64>) -> usize {
        self.axis.index_at(position.x)
    }

    fn cell_position(&self, cell: usize) -> Point3<f64> {
        Point3::new(self.axis.center(cell), 0.0, 0.0)
    }

    fn capacitance(&self, _cell: usize) -> f64 {
        self.nominal_capacitance()
    }

    fn nominal_capacitance(&self) -> f64 {
        self.capacitance_intercept + self.capacitance_slope * self.length
    }

    fn cell_length(&self, _cell: usize) -> f64 {
        self.length
    }

    fn nearest_neighbor_cells(&self, cell: usize) -> Vec<usize> {
        let mut neighbors = Vec::with_capacity(2);
        if cell > 0 {
            neighbors.push(cell - 1);
        }
        if cell + 1 < self.axis.count {
            neighbors.push(cell + 1);
        }
        neighbors
    }

    fn compute_electrode_data(&self, distribution: &GaussianDistribution2D) -> BTreeMap<usize, i32> {
        let sigma = distribution.sigma_1d(&Vector3::x());
        let norm = distribution.normalization();
        self.axis
            .fractions(distribution.mean().x, sigma, self.window)
            .into_iter()
            .filter_map(|(cell, fraction)| {
                let charge = (norm * fraction).round() as i32;
                (charge != 0).then_some((cell, charge))
            })
            .collect()
    }
}

/// Rectangular pixel grid; rows measure `x`, columns measure `y`.
#[derive(Debug, Clone)]
pub struct Pixels {
    carrier: ChargeCarrier,
    rows: Axis,
    columns: Axis,
    capacitance: f64,
    window: f64,
    parent_to_local: Isometry3<f64>,
}

impl Pixels {
    /// Creates a grid of `n_rows x n_columns` pixels.
    pub fn new(
        carrier: ChargeCarrier,
        n_rows: usize,
        n_columns: usize,
        row_pitch: f64,
        column_pitch: f64,
        parent_to_local: Isometry3<f64>,
    ) -> Result<Self> {
        validate_axis("pixel rows", n_rows, row_pitch)?;
        validate_axis("pixel columns", n_columns, column_pitch)?;
        Ok(Self {
            carrier,
            rows: Axis::new(n_rows, row_pitch),
            columns: Axis::new(n_columns, column_pitch),
            capacitance: 0.1,
            window: DEFAULT_WINDOW,
            parent_to_local,
        })
    }

    /// Per-pixel capacitance (pF).
    #[must_use]
    pub fn with_capacitance(mut self, capacitance: f64) -> Self {
        self.capacitance = capacitance;
        self
    }

    /// Integration window in sigma.
    #[must_use]
    pub fn with_window(mut self, sigmas: f64) -> Self {
        self.window = sigmas;
        self
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.rows.count
    }

    #[inline]
    pub fn n_columns(&self) -> usize {
        self.columns.count
    }

    fn cell(&self, row: usize, column: usize) -> usize {
        row * self.columns.count + column
    }
}

impl SensorElectrodes for Pixels {
    fn kind(&self) -> ElectrodeKind {
        ElectrodeKind::Pixels
    }

    fn carrier(&self) -> ChargeCarrier {
        self.carrier
    }

    fn n_axes(&self) -> usize {
        2
    }

    fn n_cells(&self) -> usize {
        self.rows.count * self.columns.count
    }

    fn pitch(&self, axis: usize) -> f64 {
        if axis == 0 {
            self.rows.pitch
        } else {
            self.columns.pitch
        }
    }

    fn parent_to_local(&self) -> &Isometry3<f64> {
        &self.parent_to_local
    }

    fn row_number(&self, cell: usize) -> usize {
        cell / self.columns.count
    }

    fn column_number(&self, cell: usize) -> usize {
        cell % self.columns.count
    }

    fn cell_id(&self, row: i64, column: i64) -> Option<usize> {
        let in_rows = (0..self.rows.count as i64).contains(&row);
        let in_columns = (0..self.columns.count as i64).contains(&column);
        (in_rows && in_columns).then(|| self.cell(row as usize, column as usize))
    }

    fn cell_id_at(&self, position: &Point3<f64>) -> usize {
        self.cell(self.rows.index_at(position.x), self.columns.index_at(position.y))
    }

    fn cell_position(&self, cell: usize) -> Point3<f64> {
        Point3::new(
            self.rows.center(self.row_number(cell)),
            self.columns.center(self.column_number(cell)),
            0.0,
        )
    }

    fn capacitance(&self, _cell: usize) -> f64 {
        self.capacitance
    }

    fn nominal_capacitance(&self) -> f64 {
        self.capacitance
    }

    fn cell_length(&self, _cell: usize) -> f64 {
        self.columns.pitch
    }

    fn nearest_neighbor_cells(&self, cell: usize) -> Vec<usize> {
        let row = self.row_number(cell) as i64;
        let column = self.column_number(cell) as i64;
        let mut neighbors = Vec::with_capacity(8);
        for dr in -1..=1 {
            for dc in -1..=1 {
                if dr == 0 && dc == 0 {
                    continue;
                }
                if let Some(id) = self.cell_id(row + dr, column + dc) {
                    neighbors.push(id);
                }
            }
        }
        neighbors
    }

    fn compute_electrode_data(&self, distribution: &GaussianDistribution2D) -> BTreeMap<usize, i32> {
        let x_axis = Vector3::x();
        let y_axis = Vector3::y();
        let mean = distribution.mean();
        let norm = distribution.normalization();
        let sigma_x = distribution.sigma_1d(&x_axis);
        let sigma_y = distribution.sigma_1d(&y_axis);

        let mut charges = BTreeMap::new();
        let mut deposit = |row: usize, column: usize, probability: f64| {
            let charge = (norm * probability).round() as i32;
            if charge != 0 {
                charges.insert(self.cell(row, column), charge);
            }
        };

        let point_x = sigma_x < MIN_RELATIVE_WIDTH * self.rows.pitch;
        let point_y = sigma_y < MIN_RELATIVE_WIDTH * self.columns.pitch;
        if point_x || point_y {
            // Degenerate along at least one axis: the distribution factorises.
            for (row, fx) in self.rows.fractions(mean.x, sigma_x, self.window) {
                for (column, fy) in self.columns.fractions(mean.y, sigma_y, self.window) {
                    deposit(row, column, fx * fy);
                }
            }
            return charges;
        }

        let rho = (distribution.covariance_xy(&x_axis, &y_axis) / (sigma_x * sigma_y)).clamp(-1.0, 1.0);
        let (row_min, row_max) = self.rows.span(mean.x, self.window * sigma_x);
        let (col_min, col_max) = self.columns.span(mean.y, self.window * sigma_y);
        let x_bins = Binning::new(
            row_max - row_min + 1,
            self.rows.center(row_min) - self.rows.pitch / 2.0,
            self.rows.pitch,
        );
        let y_bins = Binning::new(
            col_max - col_min + 1,
            self.columns.center(col_min) - self.columns.pitch / 2.0,
            self.columns.pitch,
        );

        let probabilities =
            bivariate::binned_probabilities(x_bins, y_bins, (mean.x, mean.y), (sigma_x, sigma_y), rho);
        for (i, row_probs) in probabilities.iter().enumerate() {
            for (j, &probability) in row_probs.iter().enumerate() {
                deposit(row_min + i, col_min + j, probability);
            }
        }
        charges
    }
}
