//! Silicon sensor description consumed by the simulation.

use crate::carrier::{ChargeCarrier, PerCarrier};
use crate::electrodes::SensorElectrodes;
use crate::error::{Error, Result};
use crate::geometry::Plane;
use crate::hit::SensorId;
use crate::silicon::DopedSilicon;
use nalgebra::{DMatrix, Isometry3, Point3, Translation3, UnitQuaternion, Vector3};

/// Electrodes collecting one carrier species.
#[derive(Debug)]
struct ElectrodeSide {
    sense: Box<dyn SensorElectrodes>,
    readout: Option<Box<dyn SensorElectrodes>>,
    transfer_efficiencies: Option<DMatrix<f64>>,
}

/// A planar silicon sensor.
///
/// The local frame has its origin at the sensor centre and `z` along the
/// thickness. Holes are collected on the `+z` surface, electrons on `-z`.
#[derive(Debug)]
pub struct Sensor {
    id: SensorId,
    name: String,
    thickness: f64,
    bulk: DopedSilicon,
    bias_voltage: f64,
    depletion_voltage: f64,
    local_to_global: Isometry3<f64>,
    b_field: Vector3<f64>,
    sides: PerCarrier<Option<ElectrodeSide>>,
}

impl Sensor {
    /// Starts building a sensor of the given thickness (mm).
    pub fn builder(id: SensorId, thickness: f64) -> SensorBuilder {
        SensorBuilder::new(id, thickness)
    }

    #[inline]
    pub fn id(&self) -> SensorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distance between the bias surfaces (mm).
    #[inline]
    pub fn thickness(&self) -> f64 {
        self.thickness
    }

    pub fn bulk(&self) -> &DopedSilicon {
        &self.bulk
    }

    /// Bias voltage (V).
    #[inline]
    pub fn bias_voltage(&self) -> f64 {
        self.bias_voltage
    }

    /// Full depletion voltage (V).
    #[inline]
    pub fn depletion_voltage(&self) -> f64 {
        self.depletion_voltage
    }

    pub fn local_to_global(&self) -> &Isometry3<f64> {
        &self.local_to_global
    }

    pub fn global_to_local(&self) -> Isometry3<f64> {
        self.local_to_global.inverse()
    }

    /// Magnetic field (T) in the sensor frame.
    pub fn b_field_local(&self) -> Vector3<f64> {
        self.local_to_global.inverse_transform_vector(&self.b_field)
    }

    /// Collection surface of a carrier, normal pointing out of the bulk.
    pub fn bias_surface(&self, carrier: ChargeCarrier) -> Plane {
        let normal = match carrier {
            ChargeCarrier::Hole => Vector3::z_axis(),
            ChargeCarrier::Electron => -Vector3::z_axis(),
        };
        Plane::new(normal, self.thickness / 2.0)
    }

    /// Distance from a local point to a carrier's collection surface.
    #[inline]
    pub fn distance_from_side(&self, point: &Point3<f64>, carrier: ChargeCarrier) -> f64 {
        -self.bias_surface(carrier).signed_distance(point)
    }

    /// Electric field (V/mm) at a local point.
    ///
    /// Linear in depth, strongest at the junction: the hole side for
    /// n-type bulk, the electron side for p-type.
    pub fn electric_field(&self, point: &Point3<f64>) -> Vector3<f64> {
        let junction = if self.bulk.is_n_type() {
            ChargeCarrier::Hole
        } else {
            ChargeCarrier::Electron
        };
        let depth = self.distance_from_side(point, junction) / self.thickness;
        let magnitude = (self.bias_voltage - self.depletion_voltage) / self.thickness
            + 2.0 * self.depletion_voltage / self.thickness * (1.0 - depth);
        self.bias_surface(ChargeCarrier::Hole).normal().into_inner() * magnitude
    }

    /// Carriers with electrodes, holes first.
    pub fn carriers(&self) -> Vec<ChargeCarrier> {
        self.sides
            .iter()
            .filter_map(|(carrier, side)| side.as_ref().map(|_| carrier))
            .collect()
    }

    pub fn has_electrodes(&self, carrier: ChargeCarrier) -> bool {
        self.sides[carrier].is_some()
    }

    /// Electrodes where drifting charge is collected.
    pub fn sense_electrodes(&self, carrier: ChargeCarrier) -> Option<&dyn SensorElectrodes> {
        self.sides[carrier].as_ref().map(|side| side.sense.as_ref())
    }

    /// Electrodes that are read out; the sense electrodes unless AC-coupled.
    pub fn readout_electrodes(&self, carrier: ChargeCarrier) -> Option<&dyn SensorElectrodes> {
        self.sides[carrier]
            .as_ref()
            .map(|side| side.readout.as_ref().unwrap_or(&side.sense).as_ref())
    }

    /// Readout electrodes, or an error naming this sensor.
    pub fn require_readout_electrodes(&self, carrier: ChargeCarrier) -> Result<&dyn SensorElectrodes> {
        self.readout_electrodes(carrier)
            .ok_or(Error::MissingElectrodes {
                sensor: self.id.0,
                carrier,
            })
    }

    /// True when separate readout electrodes pick up charge from the sense electrodes.
    pub fn is_ac_coupled(&self, carrier: ChargeCarrier) -> bool {
        self.sides[carrier]
            .as_ref()
            .is_some_and(|side| side.readout.is_some())
    }

    /// Sense-to-readout transfer kernel indexed by `(|row offset|, |column offset|)`.
    pub fn transfer_efficiencies(&self, carrier: ChargeCarrier) -> Option<&DMatrix<f64>> {
        self.sides[carrier]
            .as_ref()
            .and_then(|side| side.transfer_efficiencies.as_ref())
    }
}

/// Frame of electrodes lying on a carrier's collection surface.
///
/// `stereo_angle` rotates the measured axis about the sensor normal.
pub fn surface_frame(carrier: ChargeCarrier, thickness: f64, stereo_angle: f64) -> Isometry3<f64> {
    let z = match carrier {
        ChargeCarrier::Hole => thickness / 2.0,
        ChargeCarrier::Electron => -thickness / 2.0,
    };
    Isometry3::from_parts(
        Translation3::new(0.0, 0.0, -z),
        UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -stereo_angle),
    )
}

/// Builder for [`Sensor`].
#[derive(Debug)]
pub struct SensorBuilder {
    id: SensorId,
    name: String,
    thickness: f64,
    bulk: DopedSilicon,
    bias_voltage: f64,
    depletion_voltage: f64,
    local_to_global: Isometry3<f64>,
    b_field: Vector3<f64>,
    sense: Vec<Box<dyn SensorElectrodes>>,
    readout: Vec<(Box<dyn SensorElectrodes>, DMatrix<f64>)>,
}

impl SensorBuilder {
    fn new(id: SensorId, thickness: f64) -> Self {
        Self {
            id,
            name: format!("sensor{}", id.0),
            thickness,
            bulk: DopedSilicon::default(),
            bias_voltage: 110.0,
            depletion_voltage: 60.0,
            local_to_global: Isometry3::identity(),
            b_field: Vector3::zeros(),
            sense: Vec::new(),
            readout: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn with_bulk(mut self, bulk: DopedSilicon) -> Self {
        self.bulk = bulk;
        self
    }

    /// Bias and full-depletion voltages (V).
    #[must_use]
    pub fn with_voltages(mut self, bias: f64, depletion: f64) -> Self {
        self.bias_voltage = bias;
        self.depletion_voltage = depletion;
        self
    }

    /// Placement of the sensor in the global frame.
    #[must_use]
    pub fn with_placement(mut self, local_to_global: Isometry3<f64>) -> Self {
        self.local_to_global = local_to_global;
        self
    }

    /// Uniform magnetic field (T), global frame.
    #[must_use]
    pub fn with_magnetic_field(mut self, b_field: Vector3<f64>) -> Self {
        self.b_field = b_field;
        self
    }

    /// Adds collection electrodes for their carrier.
    #[must_use]
    pub fn with_sense_electrodes(mut self, electrodes: Box<dyn SensorElectrodes>) -> Self {
        self.sense.push(electrodes);
        self
    }

    /// Adds AC-coupled readout electrodes and their transfer kernel.
    #[must_use]
    pub fn with_readout_electrodes(
        mut self,
        electrodes: Box<dyn SensorElectrodes>,
        transfer_efficiencies: DMatrix<f64>,
    ) -> Self {
        self.readout.push((electrodes, transfer_efficiencies));
        self
    }

    /// Validates and assembles the sensor.
    pub fn build(self) -> Result<Sensor> {
        if self.thickness.is_nan() || self.thickness <= 0.0 {
            return Err(Error::Geometry(format!(
                "sensor {}: thickness must be positive, got {}",
                self.id, self.thickness
            )));
        }
        if self.depletion_voltage.is_nan() || self.depletion_voltage <= 0.0 {
            return Err(Error::Config(format!(
                "sensor {}: depletion voltage must be positive, got {}",
                self.id, self.depletion_voltage
            )));
        }
        if self.bias_voltage.is_nan() || self.bias_voltage <= self.depletion_voltage {
            return Err(Error::Config(format!(
                "sensor {}: bias voltage {} must exceed depletion voltage {}",
                self.id, self.bias_voltage, self.depletion_voltage
            )));
        }

        let mut sides: PerCarrier<Option<ElectrodeSide>> = PerCarrier::default();
        for sense in self.sense {
            let carrier = sense.carrier();
            if sides[carrier].is_some() {
                return Err(Error::Config(format!(
                    "sensor {}: {carrier} sense electrodes given twice",
                    self.id
                )));
            }
            sides[carrier] = Some(ElectrodeSide {
                sense,
                readout: None,
                transfer_efficiencies: None,
            });
        }

        for (readout, kernel) in self.readout {
            let carrier = readout.carrier();
            if kernel.nrows() == 0 || kernel.ncols() == 0 {
                return Err(Error::Config(format!(
                    "sensor {}: empty {carrier} transfer kernel",
                    self.id
                )));
            }
            let side = sides[carrier].as_mut().ok_or(Error::MissingElectrodes {
                sensor: self.id.0,
                carrier,
            })?;
            if side.readout.is_some() {
                return Err(Error::Config(format!(
                    "sensor {}: {carrier} readout electrodes given twice",
                    self.id
                )));
            }
            side.readout = Some(readout);
            side.transfer_efficiencies = Some(kernel);
        }

        Ok(Sensor {
            id: self.id,
            name: self.name,
            thickness: self.thickness,
            bulk: self.bulk,
            bias_voltage: self.bias_voltage,
            depletion_voltage: self.depletion_voltage,
            local_to_global: self.local_to_global,
            b_field: self.b_field,
            sides,
        })
    }
}
