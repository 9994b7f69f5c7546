//! Charge drift, diffusion and collection in the sensor bulk.
//!
//! Each deposit is cut into sub-segments short enough that the charge cloud
//! of one sub-segment spans a small fraction of a pitch. Each sub-segment
//! drifts to the collection surface of every instrumented carrier along a
//! Lorentz-tilted line and is spread by thermal diffusion into a 2D
//! Gaussian, which is integrated over the sense electrodes.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use log::{debug, trace};
use nalgebra::{DMatrix, Point3, Unit, Vector3};
use sisim_core::geometry::{perpendicular_unit, ANGULAR_TOLERANCE};
use sisim_core::{
    ChargeCarrier, ElectrodeData, ElectrodeDataCollection, Error, GaussianDistribution2D,
    PerCarrier, Result, Sensor, SensorElectrodes, SensorSimulation, TrackSegment, TruthHit,
    ENERGY_EHPAIR,
};
use std::sync::Arc;

/// Largest sub-segment as a fraction of the pitch or the thickness.
pub const DEPOSITION_GRANULARITY: f64 = 0.10;

/// Distance outside the bulk (mm) tolerated before drifting fails.
pub const DISTANCE_TOLERANCE: f64 = 0.001;

/// Sense cells closer than this fraction of the readout pitch to a readout
/// cell centre are coupled to it.
const ALIGNMENT_TOLERANCE: f64 = 1e-6;

/// Drift direction of a carrier at a sensor-local point.
///
/// `v = unit(q mu E + (q mu)^2 E x B)` with mobility in m^2/Vs and E in V/m.
pub fn drift_direction(
    sensor: &Sensor,
    carrier: ChargeCarrier,
    point: &Point3<f64>,
) -> Unit<Vector3<f64>> {
    let b_field = sensor.b_field_local();
    let e_field = sensor.electric_field(point) * 1000.0;
    let qmu = carrier.charge() * 1.0e-4 * sensor.bulk().mobility(carrier);
    Unit::new_normalize(e_field * qmu + e_field.cross(&b_field) * (qmu * qmu))
}

/// Drift of one carrier species toward its sense electrodes.
struct Drift<'a> {
    sensor: &'a Sensor,
    carrier: ChargeCarrier,
    electrodes: &'a dyn SensorElectrodes,
    direction: Unit<Vector3<f64>>,
    normal: Unit<Vector3<f64>>,
    cos_theta: f64,
}

impl<'a> Drift<'a> {
    fn new(sensor: &'a Sensor, carrier: ChargeCarrier) -> Result<Self> {
        let electrodes = sensor.sense_electrodes(carrier).ok_or(Error::MissingElectrodes {
            sensor: sensor.id().0,
            carrier,
        })?;
        let direction = drift_direction(sensor, carrier, &Point3::origin());
        let normal = *sensor.bias_surface(carrier).normal();
        let cos_theta = direction.dot(&normal);
        if cos_theta.abs() < ANGULAR_TOLERANCE {
            return Err(Error::DriftParallelToSurface(carrier));
        }
        Ok(Self {
            sensor,
            carrier,
            electrodes,
            direction,
            normal,
            cos_theta,
        })
    }

    /// Displacement from `origin` to the collection surface.
    fn vector(&self, origin: &Point3<f64>) -> Vector3<f64> {
        let scale = self.sensor.distance_from_side(origin, self.carrier) / self.cos_theta;
        self.direction.into_inner() * scale
    }

    fn destination(&self, origin: &Point3<f64>) -> Point3<f64> {
        origin + self.vector(origin)
    }

    /// Sub-segments needed for this side.
    fn n_segments(&self, segment: &TrackSegment) -> usize {
        let thickness = self.sensor.thickness();
        let depth = segment.vector().dot(&self.electrodes.normal_in_parent()).abs();
        let mut n = (depth / (thickness * DEPOSITION_GRANULARITY)).ceil() as usize;

        let deposition = self.destination(&segment.p2) - self.destination(&segment.p1);
        for axis in 0..self.electrodes.n_axes() {
            let projected = deposition
                .dot(&self.electrodes.measured_coordinate_in_parent(axis))
                .abs();
            let required =
                (projected / (DEPOSITION_GRANULARITY * self.electrodes.pitch(axis))).ceil() as usize;
            n = n.max(required);
        }
        n
    }

    /// Charge cloud on the collection surface for charge released at `origin`.
    fn diffusion(&self, charge: f64, origin: &Point3<f64>) -> Result<GaussianDistribution2D> {
        let thickness = self.sensor.thickness();
        let distance = self.sensor.distance_from_side(origin, self.carrier);
        if distance < -DISTANCE_TOLERANCE || distance > thickness + DISTANCE_TOLERANCE {
            return Err(Error::DriftOutsideSensor {
                carrier: self.carrier,
                distance,
                thickness,
            });
        }
        let distance = distance.clamp(0.0, thickness);

        let bias = self.sensor.bias_voltage();
        let depletion = self.sensor.depletion_voltage();
        let difference = bias - depletion;
        let sum = bias + depletion;
        let common = 2.0 * distance * depletion / thickness;

        let bulk = self.sensor.bulk();
        let mut sigma_sq = bulk.thermal_voltage() * thickness * thickness / depletion;
        if bulk.is_n_type() == (self.carrier == ChargeCarrier::Hole) {
            sigma_sq *= (sum / (sum - common)).ln();
        } else {
            sigma_sq *= ((difference + common) / difference).ln();
        }
        let sigma = sigma_sq.sqrt();

        let normal = self.normal.into_inner();
        let tilt = self.direction.cross(&normal);
        let (major_axis, minor_axis) = if tilt.norm() < ANGULAR_TOLERANCE {
            let major = perpendicular_unit(&normal).into_inner();
            let minor = normal.cross(&major);
            (major * sigma, minor * sigma)
        } else {
            // Longer drift stretches the cloud, more so along the tilt.
            let major = normal.cross(&tilt).normalize();
            let minor = normal.cross(&major);
            let minor_length = sigma / self.cos_theta;
            let major_length = minor_length / self.cos_theta;
            (major * major_length, minor * minor_length)
        };

        Ok(GaussianDistribution2D::new(
            charge,
            self.destination(origin),
            major_axis,
            minor_axis,
        ))
    }
}

/// Drift-diffusion simulation with optional charge trapping.
#[derive(Debug, Default)]
pub struct CdfSensorSim {
    sensor: Option<Arc<Sensor>>,
    trapping: f64,
    sense_data: PerCarrier<ElectrodeDataCollection>,
    readout_data: PerCarrier<ElectrodeDataCollection>,
}

impl CdfSensorSim {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of charge lost per 100 um of drift.
    #[must_use]
    pub fn with_trapping(mut self, trapping: f64) -> Self {
        self.trapping = trapping;
        self
    }

    #[inline]
    pub fn trapping(&self) -> f64 {
        self.trapping
    }

    /// Accumulated readout charge of one carrier.
    pub fn readout_data(&self, carrier: ChargeCarrier) -> &ElectrodeDataCollection {
        &self.readout_data[carrier]
    }

    fn sensor(&self) -> Result<&Arc<Sensor>> {
        self.sensor.as_ref().ok_or(Error::MissingSensor)
    }

    fn deposit_charge_on_sense(&mut self, sensor: &Sensor, truth_hits: &[TruthHit]) -> Result<()> {
        let drifts = sensor
            .carriers()
            .into_iter()
            .map(|carrier| Drift::new(sensor, carrier))
            .collect::<Result<Vec<_>>>()?;
        if drifts.is_empty() {
            debug!("sensor {} has no electrodes, skipping deposition", sensor.id());
            return Ok(());
        }

        let global_to_local = sensor.global_to_local();
        for hit in truth_hits {
            let segment = TrackSegment::from_truth_hit(hit, &global_to_local);
            let n_segments = drifts
                .iter()
                .map(|drift| drift.n_segments(&segment))
                .max()
                .unwrap_or(0)
                .max(1);
            let step = segment.vector() / n_segments as f64;
            let charge = segment.energy_loss / n_segments as f64 / ENERGY_EHPAIR;
            trace!(
                "sensor {}: truth hit {:?} split into {n_segments} segments",
                sensor.id(),
                hit.id
            );

            for iseg in 0..n_segments {
                let centre = segment.p1 + step * (iseg as f64 + 0.5);
                for drift in &drifts {
                    let efficiency = (1.0
                        - 10.0 * self.trapping * drift.vector(&centre).norm())
                    .clamp(0.0, 1.0);
                    let distribution = drift
                        .diffusion(charge * efficiency, &centre)?
                        .transformed(drift.electrodes.parent_to_local());
                    let charges = drift.electrodes.compute_electrode_data(&distribution);
                    self.sense_data[drift.carrier].add_map(&charges, hit.id);
                }
            }
        }
        Ok(())
    }

    fn transfer_charge_to_readout(&mut self, sensor: &Sensor) {
        for carrier in sensor.carriers() {
            let sense_data = std::mem::take(&mut self.sense_data[carrier]);
            match (
                sensor.is_ac_coupled(carrier),
                sensor.sense_electrodes(carrier),
                sensor.readout_electrodes(carrier),
                sensor.transfer_efficiencies(carrier),
            ) {
                (true, Some(sense), Some(readout), Some(kernel)) => transfer_ac(
                    &sense_data,
                    sense,
                    readout,
                    kernel,
                    &mut self.readout_data[carrier],
                ),
                _ => self.readout_data[carrier].add_collection(&sense_data),
            }
        }
    }
}

/// Couples sense cells onto aligned readout cells through a transfer kernel.
fn transfer_ac(
    sense_data: &ElectrodeDataCollection,
    sense: &dyn SensorElectrodes,
    readout: &dyn SensorElectrodes,
    kernel: &DMatrix<f64>,
    readout_data: &mut ElectrodeDataCollection,
) {
    let row_steps = kernel.nrows() as i64 - 1;
    let col_steps = kernel.ncols() as i64 - 1;

    for (cell, datum) in sense_data.iter() {
        let row = sense.row_number(cell) as i64;
        let col = sense.column_number(cell) as i64;
        for irow in row - row_steps..=row + row_steps {
            for icol in col - col_steps..=col + col_steps {
                let Some(neighbor) = sense.cell_id(irow, icol) else {
                    continue;
                };
                let Some(readout_cell) = aligned_readout_cell(sense, readout, neighbor) else {
                    continue;
                };
                let efficiency = kernel[(
                    (irow - row).unsigned_abs() as usize,
                    (icol - col).unsigned_abs() as usize,
                )];
                let charge = (efficiency * f64::from(datum.charge())).round() as i32;
                readout_data.add(
                    readout_cell,
                    ElectrodeData::new(charge, datum.truth_hits().clone()),
                );
            }
        }
    }
}

/// Readout cell centred on a sense cell, if any.
fn aligned_readout_cell(
    sense: &dyn SensorElectrodes,
    readout: &dyn SensorElectrodes,
    sense_cell: usize,
) -> Option<usize> {
    let in_sensor = sense
        .parent_to_local()
        .inverse_transform_point(&sense.cell_position(sense_cell));
    let position = readout.parent_to_local().transform_point(&in_sensor);
    let cell = readout.cell_id_at(&position);
    if !readout.is_valid_cell(cell) {
        return None;
    }
    let offset = readout.position_in_cell(&position);
    let aligned = offset.x.abs() <= ALIGNMENT_TOLERANCE * readout.pitch(0)
        && offset.y.abs() <= ALIGNMENT_TOLERANCE * readout.pitch(1);
    aligned.then_some(cell)
}

impl SensorSimulation for CdfSensorSim {
    fn name(&self) -> &'static str {
        "CDFSiSensorSim"
    }

    fn set_sensor(&mut self, sensor: Arc<Sensor>) {
        self.sensor = Some(sensor);
    }

    fn compute_electrode_data(
        &mut self,
        truth_hits: &[TruthHit],
    ) -> Result<&PerCarrier<ElectrodeDataCollection>> {
        let sensor = Arc::clone(self.sensor()?);
        let deposited = self.deposit_charge_on_sense(&sensor, truth_hits);
        if deposited.is_err() {
            for (_, data) in self.sense_data.iter_mut() {
                data.clear();
            }
        }
        deposited?;
        self.transfer_charge_to_readout(&sensor);
        Ok(&self.readout_data)
    }

    fn clear_readout(&mut self) {
        for (_, data) in self.readout_data.iter_mut() {
            data.clear();
        }
    }

    fn lorentz_correct(&self, position: &mut Point3<f64>, carrier: ChargeCarrier) -> Result<()> {
        let sensor = self.sensor()?;
        let direction = drift_direction(sensor, carrier, &Point3::origin()).into_inner();
        let origin = *position;
        let [hole, electron] = ChargeCarrier::ALL.map(|side| {
            sensor
                .bias_surface(side)
                .intersect_line(&origin, &direction)
                .ok_or(Error::DriftParallelToSurface(carrier))
        });
        *position = nalgebra::center(&hole?, &electron?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Isometry3;
    use sisim_core::{surface_frame, SensorId, Strips, TruthHitId};

    const THICKNESS: f64 = 0.3;

    fn strips(carrier: ChargeCarrier, n: usize, pitch: f64) -> Box<Strips> {
        Box::new(
            Strips::new(carrier, n, pitch, 40.0, surface_frame(carrier, THICKNESS, 0.0)).unwrap(),
        )
    }

    fn double_sided(b_field: Vector3<f64>) -> Arc<Sensor> {
        Arc::new(
            Sensor::builder(SensorId(7), THICKNESS)
                .with_magnetic_field(b_field)
                .with_sense_electrodes(strips(ChargeCarrier::Hole, 200, 0.05))
                .with_sense_electrodes(strips(ChargeCarrier::Electron, 200, 0.05))
                .build()
                .unwrap(),
        )
    }

    fn through_going(x: f64, energy: f64) -> TruthHit {
        TruthHit::new(
            TruthHitId(1),
            Point3::new(x, 0.0, -THICKNESS / 2.0),
            Point3::new(x, 0.0, THICKNESS / 2.0),
            energy,
        )
    }

    #[test]
    fn test_charge_is_conserved_without_trapping() {
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let energy = 0.0809;
        let data = sim.compute_electrode_data(&[through_going(0.01, energy)]).unwrap();

        let expected = energy / ENERGY_EHPAIR;
        for (carrier, collection) in data.iter() {
            let total = collection.total_charge() as f64;
            assert!(
                (total - expected).abs() < 0.001 * expected,
                "{carrier}: {total} vs {expected}"
            );
            assert!(collection.len() >= 2);
        }
    }

    #[test]
    fn test_readout_accumulates_until_cleared() {
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let hit = through_going(-0.2, 0.03);

        let once = sim
            .compute_electrode_data(std::slice::from_ref(&hit))
            .unwrap()[ChargeCarrier::Hole]
            .total_charge();
        let twice = sim
            .compute_electrode_data(std::slice::from_ref(&hit))
            .unwrap()[ChargeCarrier::Hole]
            .total_charge();
        assert_eq!(twice, 2 * once);

        sim.clear_readout();
        sim.clear_readout();
        assert!(sim.readout_data(ChargeCarrier::Hole).is_empty());
        assert!(sim.readout_data(ChargeCarrier::Electron).is_empty());
    }

    #[test]
    fn test_trapping_reduces_collected_charge() {
        let hit = through_going(0.0, 0.05);
        let mut clean = CdfSensorSim::new();
        clean.set_sensor(double_sided(Vector3::zeros()));
        let full = clean.compute_electrode_data(std::slice::from_ref(&hit)).unwrap()
            [ChargeCarrier::Hole]
            .total_charge();

        let mut trapped = CdfSensorSim::new().with_trapping(0.2);
        trapped.set_sensor(double_sided(Vector3::zeros()));
        let reduced = trapped.compute_electrode_data(&[hit]).unwrap()[ChargeCarrier::Hole]
            .total_charge();

        // Mean drift of 150 um loses about 30%.
        let ratio = reduced as f64 / full as f64;
        assert!((ratio - 0.7).abs() < 0.01, "ratio = {ratio}");
    }

    #[test]
    fn test_deposit_outside_sensor_fails() {
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let hit = TruthHit::new(
            TruthHitId(3),
            Point3::new(0.0, 0.0, 0.2),
            Point3::new(0.0, 0.0, 0.4),
            0.01,
        );
        assert!(matches!(
            sim.compute_electrode_data(&[hit]),
            Err(Error::DriftOutsideSensor { .. })
        ));
    }

    fn flat_deposit(z: f64, half_length: f64) -> TruthHit {
        TruthHit::new(
            TruthHitId(4),
            Point3::new(-half_length, 0.0, z),
            Point3::new(half_length, 0.0, z),
            0.01,
        )
    }

    #[test]
    fn test_deposit_just_outside_surface_is_clamped() {
        let expected = 0.01 / ENERGY_EHPAIR;

        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let hit = flat_deposit(THICKNESS / 2.0 + 0.5 * DISTANCE_TOLERANCE, 0.02);
        let data = sim.compute_electrode_data(&[hit]).unwrap();
        let total = data[ChargeCarrier::Hole].total_charge() as f64;
        assert!((total - expected).abs() < 0.01 * expected, "{total} vs {expected}");

        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let hit = flat_deposit(THICKNESS / 2.0 + 2.0 * DISTANCE_TOLERANCE, 0.02);
        assert!(matches!(
            sim.compute_electrode_data(&[hit]),
            Err(Error::DriftOutsideSensor { .. })
        ));
    }

    #[test]
    fn test_point_deposit_uses_one_segment() {
        let expected = 0.01 / ENERGY_EHPAIR;
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let data = sim.compute_electrode_data(&[flat_deposit(0.0, 0.0)]).unwrap();
        for (carrier, collection) in data.iter() {
            let total = collection.total_charge() as f64;
            assert!(
                (total - expected).abs() < 0.01 * expected,
                "{carrier}: {total} vs {expected}"
            );
        }
    }

    #[test]
    fn test_unbound_simulation_fails() {
        let mut sim = CdfSensorSim::new();
        assert!(matches!(
            sim.compute_electrode_data(&[]),
            Err(Error::MissingSensor)
        ));
        let mut point = Point3::origin();
        assert!(sim.lorentz_correct(&mut point, ChargeCarrier::Hole).is_err());
    }

    #[test]
    fn test_lorentz_correct_without_field_projects_to_midplane() {
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(double_sided(Vector3::zeros()));
        let mut point = Point3::new(0.12, -3.0, THICKNESS / 2.0);
        sim.lorentz_correct(&mut point, ChargeCarrier::Hole).unwrap();
        assert_relative_eq!(point, Point3::new(0.12, -3.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_lorentz_correct_follows_tilted_drift() {
        let sensor = double_sided(Vector3::new(0.0, 5.0, 0.0));
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(Arc::clone(&sensor));

        let direction = drift_direction(&sensor, ChargeCarrier::Hole, &Point3::origin());
        assert!(direction.x < 0.0 && direction.z > 0.0);

        let mut point = Point3::new(0.0, 0.0, THICKNESS / 2.0);
        sim.lorentz_correct(&mut point, ChargeCarrier::Hole).unwrap();
        assert_relative_eq!(point.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(
            point.x,
            -THICKNESS / 2.0 * direction.x / direction.z,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_ac_transfer_uses_aligned_cells() {
        let sense = Strips::new(ChargeCarrier::Hole, 19, 0.025, 40.0, Isometry3::identity())
            .unwrap();
        let readout = Strips::new(ChargeCarrier::Hole, 10, 0.05, 40.0, Isometry3::identity())
            .unwrap();
        let kernel = DMatrix::from_column_slice(2, 1, &[1.0, 0.5]);

        let mut sense_data = ElectrodeDataCollection::new();
        sense_data.add(4, ElectrodeData::with_truth_hit(1000, TruthHitId(1)));
        sense_data.add(5, ElectrodeData::with_truth_hit(400, TruthHitId(2)));

        let mut readout_data = ElectrodeDataCollection::new();
        transfer_ac(&sense_data, &sense, &readout, &kernel, &mut readout_data);

        assert_eq!(
            readout_data.charge_map(),
            [(2, 1200), (3, 200)].into_iter().collect()
        );
        assert_eq!(readout_data.get(2).unwrap().truth_hits().len(), 2);
        assert_eq!(readout_data.get(3).unwrap().truth_hits().len(), 1);
    }

    #[test]
    fn test_ac_coupled_sensor_fills_readout_cells() {
        let kernel = DMatrix::from_column_slice(2, 1, &[0.9, 0.05]);
        let sensor = Sensor::builder(SensorId(2), THICKNESS)
            .with_sense_electrodes(strips(ChargeCarrier::Hole, 199, 0.025))
            .with_readout_electrodes(strips(ChargeCarrier::Hole, 100, 0.05), kernel)
            .build()
            .unwrap();
        let mut sim = CdfSensorSim::new();
        sim.set_sensor(Arc::new(sensor));

        let data = sim.compute_electrode_data(&[through_going(0.0, 0.05)]).unwrap();
        let readout = &data[ChargeCarrier::Hole];
        assert!(!readout.is_empty());
        assert!(readout.cells().all(|cell| cell < 100));
        assert!(data[ChargeCarrier::Electron].is_empty());
    }
}
