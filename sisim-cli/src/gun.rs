//! Straight-line track gun.
//!
//! Each track is intersected with the two bias surfaces of every sensor;
//! a sensor whose sense electrodes cover the crossing gets one truth hit
//! with an energy proportional to the path length.

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::RngCore;
use sisim_core::{ChargeCarrier, Sensor, SensorElectrodes, SensorId, TruthHit, TruthHitId};
use sisim_digi::sampling::gaussian;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Mean energy loss of a minimum ionising particle in silicon (MeV/mm).
pub const MIP_ENERGY_LOSS: f64 = 0.387;

#[derive(Clone, Debug, PartialEq)]
pub struct TrackGun {
    /// Nominal track origin, global frame (mm).
    pub origin: Point3<f64>,
    /// Unit direction of the nominal track.
    pub direction: Vector3<f64>,
    /// Gaussian spread of the direction about two axes (rad).
    pub angular_spread: f64,
    /// Gaussian spread of the origin in x and y (mm).
    pub position_spread: f64,
    pub tracks_per_event: usize,
    /// Energy loss (MeV/mm).
    pub energy_loss: f64,
}

impl Default for TrackGun {
    fn default() -> Self {
        Self {
            origin: Point3::origin(),
            direction: Vector3::z(),
            angular_spread: 0.0,
            position_spread: 0.0,
            tracks_per_event: 1,
            energy_loss: MIP_ENERGY_LOSS,
        }
    }
}

/// Straight track in the global frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Track {
    pub origin: Point3<f64>,
    pub direction: Vector3<f64>,
}

impl TrackGun {
    /// Draws one track. With zero spreads no random numbers are used.
    pub fn track(&self, rng: &mut dyn RngCore) -> Track {
        let mut origin = self.origin;
        if self.position_spread > 0.0 {
            origin.x += self.position_spread * gaussian(rng);
            origin.y += self.position_spread * gaussian(rng);
        }
        let mut direction = self.direction;
        if self.angular_spread > 0.0 {
            let roll = self.angular_spread * gaussian(rng);
            let pitch = self.angular_spread * gaussian(rng);
            direction = UnitQuaternion::from_euler_angles(roll, pitch, 0.0) * direction;
        }
        Track { origin, direction }
    }

    /// Truth hits of one event, grouped by sensor.
    ///
    /// Truth ids count up from zero in track order, then sensor order.
    pub fn fire(
        &self,
        sensors: &[Arc<Sensor>],
        rng: &mut dyn RngCore,
    ) -> BTreeMap<SensorId, Vec<TruthHit>> {
        let mut truth: BTreeMap<SensorId, Vec<TruthHit>> = BTreeMap::new();
        let mut next_id = 0;
        for _ in 0..self.tracks_per_event {
            let track = self.track(rng);
            for sensor in sensors {
                let Some((start, end)) = crossing(sensor, &track) else {
                    continue;
                };
                let energy = self.energy_loss * (end - start).norm();
                truth
                    .entry(sensor.id())
                    .or_default()
                    .push(TruthHit::new(TruthHitId(next_id), start, end, energy));
                next_id += 1;
            }
        }
        truth
    }
}

/// Global entry and exit points of a track through a sensor, if the track
/// crosses it ahead of its origin and inside the electrode area.
pub fn crossing(sensor: &Sensor, track: &Track) -> Option<(Point3<f64>, Point3<f64>)> {
    let to_local = sensor.global_to_local();
    let origin = to_local.transform_point(&track.origin);
    let direction = to_local.transform_vector(&track.direction);

    let entry = sensor
        .bias_surface(ChargeCarrier::Electron)
        .intersect_line(&origin, &direction)?;
    let exit = sensor
        .bias_surface(ChargeCarrier::Hole)
        .intersect_line(&origin, &direction)?;
    if (entry - origin).dot(&direction) < 0.0 || (exit - origin).dot(&direction) < 0.0 {
        return None;
    }

    let midpoint = nalgebra::center(&entry, &exit);
    let covered = sensor.carriers().into_iter().all(|carrier| {
        sensor
            .sense_electrodes(carrier)
            .is_some_and(|electrodes| covers(electrodes, &midpoint))
    });
    if !covered {
        return None;
    }

    let to_global = sensor.local_to_global();
    let (start, end) = if (exit - entry).dot(&direction) >= 0.0 {
        (entry, exit)
    } else {
        (exit, entry)
    };
    Some((to_global.transform_point(&start), to_global.transform_point(&end)))
}

/// True when a sensor-frame point projects inside the electrode grid.
fn covers(electrodes: &dyn SensorElectrodes, point: &Point3<f64>) -> bool {
    let local = electrodes.parent_to_local().transform_point(point);
    let last = electrodes.n_cells() - 1;
    let half_x = (electrodes.row_number(last) + 1) as f64 * electrodes.pitch(0) / 2.0;
    let half_y = if electrodes.n_axes() > 1 {
        (electrodes.column_number(last) + 1) as f64 * electrodes.pitch(1) / 2.0
    } else {
        electrodes.cell_length(0) / 2.0
    };
    local.x.abs() <= half_x && local.y.abs() <= half_y
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use sisim_core::{surface_frame, Strips};

    const THICKNESS: f64 = 0.3;

    fn sensor(id: u32, placement: Isometry3<f64>) -> Arc<Sensor> {
        // 4 x 10 mm of strips.
        let strips = Strips::new(
            ChargeCarrier::Hole,
            80,
            0.05,
            10.0,
            surface_frame(ChargeCarrier::Hole, THICKNESS, 0.0),
        )
        .unwrap();
        Arc::new(
            Sensor::builder(SensorId(id), THICKNESS)
                .with_placement(placement)
                .with_sense_electrodes(Box::new(strips))
                .build()
                .unwrap(),
        )
    }

    fn at_z(id: u32, z: f64) -> Arc<Sensor> {
        let placement =
            Isometry3::from_parts(Translation3::new(0.0, 0.0, z), UnitQuaternion::identity());
        sensor(id, placement)
    }

    #[test]
    fn test_normal_track_crosses_layers() {
        let sensors = vec![at_z(0, 50.0), at_z(1, 100.0)];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let truth = TrackGun::default().fire(&sensors, &mut rng);

        assert_eq!(truth.len(), 2);
        let hits = &truth[&SensorId(1)];
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, TruthHitId(1));
        assert_relative_eq!(hits[0].start.z, 100.0 - THICKNESS / 2.0, epsilon = 1e-12);
        assert_relative_eq!(hits[0].end.z, 100.0 + THICKNESS / 2.0, epsilon = 1e-12);
        assert_relative_eq!(hits[0].energy, MIP_ENERGY_LOSS * THICKNESS, epsilon = 1e-12);
    }

    #[test]
    fn test_inclined_track_deposits_more() {
        let sensors = vec![at_z(0, 3.0)];
        let gun = TrackGun {
            direction: Vector3::new(0.0, 1.0, 1.0).normalize(),
            ..TrackGun::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let truth = gun.fire(&sensors, &mut rng);

        let hit = &truth[&SensorId(0)][0];
        assert_relative_eq!(hit.midpoint().y, 3.0, epsilon = 1e-9);
        assert_relative_eq!(
            hit.energy,
            MIP_ENERGY_LOSS * THICKNESS * 2.0_f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_misses() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        // Behind the origin.
        let truth = TrackGun::default().fire(&[at_z(0, -10.0)], &mut rng);
        assert!(truth.is_empty());

        // Outside the strips: the grid is 4 mm wide.
        let gun = TrackGun {
            origin: Point3::new(2.5, 0.0, 0.0),
            ..TrackGun::default()
        };
        assert!(gun.fire(&[at_z(0, 10.0)], &mut rng).is_empty());

        // Parallel to the sensor.
        let gun = TrackGun {
            direction: Vector3::x(),
            ..TrackGun::default()
        };
        assert!(gun.fire(&[at_z(0, 0.0)], &mut rng).is_empty());
    }

    #[test]
    fn test_rotated_sensor_orders_points_along_track() {
        // Flipped sensor: its hole side faces the gun.
        let flipped = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 30.0),
            UnitQuaternion::from_euler_angles(std::f64::consts::PI, 0.0, 0.0),
        );
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let truth = TrackGun::default().fire(&[sensor(4, flipped)], &mut rng);

        let hit = &truth[&SensorId(4)][0];
        assert!(hit.start.z < hit.end.z);
        assert_relative_eq!(hit.midpoint().z, 30.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spread_is_reproducible() {
        let gun = TrackGun {
            angular_spread: 0.01,
            position_spread: 0.5,
            tracks_per_event: 5,
            ..TrackGun::default()
        };
        let sensors = vec![at_z(0, 10.0), at_z(1, 20.0)];
        let first = gun.fire(&sensors, &mut ChaCha8Rng::seed_from_u64(9));
        let second = gun.fire(&sensors, &mut ChaCha8Rng::seed_from_u64(9));
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
