use nalgebra::{Complex, Vector3};
use serde::{Deserialize, Serialize};

use crate::settings::LIGHT_SPEED;

#[cfg(test)]
mod tests {

    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn broadside_gain_is_the_maximum() {
        let antenna = Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0);
        let g_max = antenna.gain_max();
        assert!((g_max - 16.0 / (3.0 * std::f64::consts::PI)).abs() < 1e-12);

        for i in 1..90 {
            let theta = i as f64 * FRAC_PI_2 / 90.0;
            assert!(antenna.gain(theta, 0.0) <= g_max + 1e-12);
        }
    }

    #[test]
    fn axial_gain_is_zero() {
        let antenna = Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0);
        assert_eq!(antenna.gain(0.0, 0.0), 0.0);

        let horiz = Antenna::new(AntennaKind::HalfWaveDipoleHorizontal, 1.0);
        assert_eq!(horiz.gain(FRAC_PI_2, 0.0), 0.0);
    }

    #[test]
    fn efficiency_scales_gain_and_resistance() {
        let lossy = Antenna::new(AntennaKind::HalfWaveDipoleVertical, 0.5);
        let ideal = Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0);

        let g_lossy = lossy.gain(FRAC_PI_2, 0.0);
        let g_ideal = ideal.gain(FRAC_PI_2, 0.0);
        assert!((g_lossy - 0.5 * g_ideal).abs() < 1e-12);

        assert!((lossy.resistance() - 146.0).abs() < 1e-12);
        assert!((ideal.resistance() - 73.0).abs() < 1e-12);
    }

    #[test]
    fn vertical_effective_height_points_down_z() {
        let antenna = Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0);
        let he = antenna.effective_height(FRAC_PI_2, 0.0, 2.4e9);
        let lambda = LIGHT_SPEED / 2.4e9;

        assert_eq!(he.x, Complex::new(0.0, 0.0));
        assert_eq!(he.y, Complex::new(0.0, 0.0));
        assert!((he.z.re + lambda / std::f64::consts::PI).abs() < 1e-12);
        assert_eq!(he.z.im, 0.0);
    }

    #[test]
    fn horizontal_effective_height_follows_rotation() {
        let mut antenna = Antenna::new(AntennaKind::HalfWaveDipoleHorizontal, 1.0);
        antenna.rotation = 0.0;
        let he = antenna.effective_height(0.0, FRAC_PI_2, 2.4e9);
        let lambda = LIGHT_SPEED / 2.4e9;

        // Rotation 0: the in-plane vector is (-|he|, 0)
        assert!((he.x.re + lambda / std::f64::consts::PI).abs() < 1e-12);
        assert!(he.y.re.abs() < 1e-12);
        assert_eq!(he.z, Complex::new(0.0, 0.0));
    }

    #[test]
    fn polarizations_are_complementary() {
        let vert = Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0);
        let horiz = Antenna::new(AntennaKind::HalfWaveDipoleHorizontal, 1.0);

        assert_eq!(vert.polarization(), (Complex::new(0.0, 0.0), Complex::new(1.0, 0.0)));
        assert_eq!(horiz.polarization(), (Complex::new(1.0, 0.0), Complex::new(0.0, 0.0)));
    }
}

/// The supported antenna variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AntennaKind {
    HalfWaveDipoleVertical,
    HalfWaveDipoleHorizontal,
}

/// A half-wave dipole antenna.
///
/// The vertical variant radiates out of the simulation plane (z axis), the
/// horizontal variant lies in the plane and is steered by `rotation`.
/// `efficiency` is the radiation efficiency in (0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Antenna {
    pub kind: AntennaKind,
    pub efficiency: f64,
    /// Orientation of the antenna in the plane, radians.
    pub rotation: f64,
}

impl Antenna {
    pub fn new(kind: AntennaKind, efficiency: f64) -> Self {
        Self {
            kind,
            efficiency,
            // Default orientation points along +y
            rotation: std::f64::consts::FRAC_PI_2,
        }
    }

    /// The pattern angle the dipole formulas apply to: the vertical dipole
    /// is rotationally symmetric in phi, the horizontal one in theta.
    fn pattern_angle(&self, theta: f64, phi: f64) -> f64 {
        match self.kind {
            AntennaKind::HalfWaveDipoleVertical => theta,
            AntennaKind::HalfWaveDipoleHorizontal => phi,
        }
    }

    /// Total resistance [ohm]: the 73 ohm radiation resistance of the
    /// half-wave dipole divided by the efficiency.
    pub fn resistance(&self) -> f64 {
        73.0 / self.efficiency
    }

    /// Directional gain at the given incidence angles.
    pub fn gain(&self, theta: f64, phi: f64) -> f64 {
        let alpha = self.pattern_angle(theta, phi);

        // The pattern tends to 0 at alpha = 0; short-circuit the 0/0 form
        if alpha == 0.0 {
            return 0.0;
        }

        let pattern = (std::f64::consts::FRAC_PI_2 * alpha.cos()).cos() / alpha.sin();
        self.efficiency * 16.0 / (3.0 * std::f64::consts::PI) * pattern * pattern
    }

    /// Maximum gain over all directions, reached broadside to the dipole.
    pub fn gain_max(&self) -> f64 {
        self.efficiency * 16.0 / (3.0 * std::f64::consts::PI)
    }

    /// Complex vector effective height at the given incidence angles [m].
    ///
    /// `frequency` fixes the design wavelength of the dipole.
    pub fn effective_height(&self, theta: f64, phi: f64, frequency: f64) -> Vector3<Complex<f64>> {
        let alpha = self.pattern_angle(theta, phi);

        if alpha == 0.0 {
            return Vector3::zeros();
        }

        let lambda = LIGHT_SPEED / frequency;
        let sin_a = alpha.sin();
        let he = -lambda / std::f64::consts::PI * (std::f64::consts::FRAC_PI_2 * alpha.cos()).cos()
            / (sin_a * sin_a);

        match self.kind {
            AntennaKind::HalfWaveDipoleVertical => {
                Vector3::new(Complex::new(0.0, 0.0), Complex::new(0.0, 0.0), Complex::new(he, 0.0))
            }
            AntennaKind::HalfWaveDipoleHorizontal => Vector3::new(
                Complex::new(self.rotation.cos() * he, 0.0),
                Complex::new(-self.rotation.sin() * he, 0.0),
                Complex::new(0.0, 0.0),
            ),
        }
    }

    /// Polarization as (parallel, orthogonal) components.
    pub fn polarization(&self) -> (Complex<f64>, Complex<f64>) {
        match self.kind {
            AntennaKind::HalfWaveDipoleVertical => (Complex::new(0.0, 0.0), Complex::new(1.0, 0.0)),
            AntennaKind::HalfWaveDipoleHorizontal => {
                (Complex::new(1.0, 0.0), Complex::new(0.0, 0.0))
            }
        }
    }
}
