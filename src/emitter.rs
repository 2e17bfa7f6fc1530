use nalgebra::{Complex, Point2, Vector3};
use serde::{Deserialize, Serialize};

use crate::antenna::Antenna;
use crate::geometry::Line;
use crate::settings::ConfigError;


/// A transmitter: position, carrier frequency, radiated power and antenna.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    pub position: Point2<f64>,
    /// Carrier frequency [Hz].
    pub frequency: f64,
    /// Effective isotropic radiated power [W].
    pub eirp: f64,
    pub antenna: Antenna,
}

impl Emitter {
    pub fn new(position: Point2<f64>, frequency: f64, eirp: f64, antenna: Antenna) -> Self {
        Self {
            position,
            frequency,
            eirp,
            antenna,
        }
    }

    /// Transmit power [W], assuming a lossless feed: P = EIRP / G_max.
    pub fn power(&self) -> f64 {
        self.eirp / self.antenna.gain_max()
    }

    pub fn rotation(&self) -> f64 {
        self.antenna.rotation
    }

    pub fn set_rotation(&mut self, angle: f64) {
        self.antenna.rotation = angle;
    }

    /// Azimuth of an outgoing ray relative to the antenna orientation.
    /// The ray is assumed to leave the emitter at its first point.
    pub fn outgoing_ray_angle(&self, ray: &Line) -> f64 {
        ray.angle() - self.rotation()
    }

    /// Directional gain for a departure direction.
    pub fn gain(&self, theta: f64, phi: f64) -> f64 {
        self.antenna.gain(theta, phi)
    }

    /// Complex vector effective height at the design frequency.
    pub fn effective_height(&self, theta: f64, phi: f64) -> Vector3<Complex<f64>> {
        self.antenna.effective_height(theta, phi, self.frequency)
    }

    /// Polarization as (parallel, orthogonal) components.
    pub fn polarization(&self) -> (Complex<f64>, Complex<f64>) {
        self.antenna.polarization()
    }

    /// Sanity checks applied before a run launches.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.frequency > 0.0) {
            return Err(ConfigError::InvalidFrequency(self.frequency));
        }
        if !(self.antenna.efficiency > 0.0 && self.antenna.efficiency <= 1.0) {
            return Err(ConfigError::InvalidEfficiency(self.antenna.efficiency));
        }
        Ok(())
    }
}
