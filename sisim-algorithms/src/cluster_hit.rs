//! Shared steps for turning a cluster into a reconstructed hit.
#![allow(clippy::cast_precision_loss)]

use nalgebra::{Isometry3, Matrix3, Point3, Vector3};
use sisim_core::{
    ChargeCarrier, Cluster, RawHit, ReadoutChip, Result, Sensor, SensorElectrodes,
    SensorSimulation,
};

/// One cluster member with its decoded signal.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecodedHit {
    pub cell: usize,
    /// Charge in electrons.
    pub charge: f64,
    pub time: f64,
}

pub(crate) fn decode(
    cluster: &Cluster<'_>,
    readout_chip: &dyn ReadoutChip,
) -> Result<Vec<DecodedHit>> {
    cluster
        .iter()
        .map(|hit| {
            Ok(DecodedHit {
                cell: hit.cell(),
                charge: readout_chip.decode_charge(hit)?,
                time: f64::from(readout_chip.decode_time(hit)?),
            })
        })
        .collect()
}

/// Raw hits of one side of a sensor.
pub(crate) fn side_hits(sensor: &Sensor, carrier: ChargeCarrier, raw_hits: &[RawHit]) -> Vec<RawHit> {
    raw_hits
        .iter()
        .filter(|hit| hit.channel.sensor == sensor.id() && hit.channel.side == carrier)
        .cloned()
        .collect()
}

/// Weighted mean of points; the plain mean when the weights sum to zero.
pub(crate) fn weighted_centroid(points: &[(Point3<f64>, f64)]) -> Point3<f64> {
    let total: f64 = points.iter().map(|(_, weight)| weight).sum();
    if total > 0.0 {
        let sum = points
            .iter()
            .fold(Vector3::zeros(), |acc, (point, weight)| acc + point.coords * *weight);
        Point3::from(sum / total)
    } else {
        let sum = points
            .iter()
            .fold(Vector3::zeros(), |acc, (point, _)| acc + point.coords);
        Point3::from(sum / points.len().max(1) as f64)
    }
}

/// Charge-weighted mean time.
pub(crate) fn weighted_time(members: &[DecodedHit]) -> f64 {
    let total: f64 = members.iter().map(|m| m.charge).sum();
    if total > 0.0 {
        members.iter().map(|m| m.time * m.charge).sum::<f64>() / total
    } else {
        members.iter().map(|m| m.time).sum::<f64>() / members.len().max(1) as f64
    }
}

pub(crate) fn total_charge(members: &[DecodedHit]) -> f64 {
    members.iter().map(|m| m.charge).sum()
}

/// Pitch of the sense electrodes behind a set of readout electrodes.
pub(crate) fn sense_pitch(sensor: &Sensor, electrodes: &dyn SensorElectrodes, axis: usize) -> f64 {
    sensor
        .sense_electrodes(electrodes.carrier())
        .map_or_else(|| electrodes.pitch(axis), |sense| sense.pitch(axis))
}

/// Electrode frame to global frame.
pub(crate) fn electrodes_to_global(sensor: &Sensor, electrodes: &dyn SensorElectrodes) -> Isometry3<f64> {
    sensor.local_to_global() * electrodes.parent_to_local().inverse()
}

/// Moves an electrode-frame position back along the drift line to the
/// sensor mid-plane and returns it in the global frame.
pub(crate) fn global_position(
    sensor: &Sensor,
    electrodes: &dyn SensorElectrodes,
    simulation: &dyn SensorSimulation,
    position: &Point3<f64>,
) -> Result<Point3<f64>> {
    let mut local = electrodes.parent_to_local().inverse_transform_point(position);
    simulation.lorentz_correct(&mut local, electrodes.carrier())?;
    Ok(sensor.local_to_global().transform_point(&local))
}

/// Diagonal electrode-frame variances rotated into the global frame.
pub(crate) fn global_covariance(
    sensor: &Sensor,
    electrodes: &dyn SensorElectrodes,
    variances: Vector3<f64>,
) -> Matrix3<f64> {
    let rotation = electrodes_to_global(sensor, electrodes)
        .rotation
        .to_rotation_matrix();
    let r = rotation.matrix();
    r * Matrix3::from_diagonal(&variances) * r.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_centroid_weights() {
        let points = [
            (Point3::new(0.0, 0.0, 0.0), 1.0),
            (Point3::new(0.05, 0.0, 0.0), 3.0),
        ];
        assert_relative_eq!(weighted_centroid(&points).x, 0.0375);

        let unweighted = [
            (Point3::new(0.0, 0.0, 0.0), 0.0),
            (Point3::new(0.05, 0.0, 0.0), 0.0),
        ];
        assert_relative_eq!(weighted_centroid(&unweighted).x, 0.025);
    }

    #[test]
    fn test_weighted_time() {
        let members = [
            DecodedHit {
                cell: 0,
                charge: 3000.0,
                time: 10.0,
            },
            DecodedHit {
                cell: 1,
                charge: 1000.0,
                time: 14.0,
            },
        ];
        assert_relative_eq!(weighted_time(&members), 11.0);
        assert_relative_eq!(total_charge(&members), 4000.0);
    }
}
