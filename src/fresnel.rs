//! Reflection and diffraction coefficients.
//!
//! Walls are lossless dielectrics described by a single relative
//! permittivity, so both polarization coefficients are real; they are kept
//! complex so successive interactions compose with the field vectors by
//! componentwise multiplication.

use nalgebra::{Complex, Vector3};

#[cfg(test)]
mod tests {

    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn reflection_magnitude_never_exceeds_one() {
        for eps in [1.5, 3.0, 5.0, 15.0, 80.0] {
            for i in 0..=90 {
                let theta_i = i as f64 * FRAC_PI_2 / 90.0;
                let gamma = reflection(theta_i, eps);
                assert!(gamma.z.norm() <= 1.0 + 1e-12, "orthogonal, eps {eps}, i {i}");
                assert!(gamma.x.norm() <= 1.0 + 1e-12, "parallel, eps {eps}, i {i}");
            }
        }
    }

    #[test]
    fn grazing_incidence_reflects_fully() {
        let gamma = reflection(FRAC_PI_2, 5.0);
        assert!((gamma.z.norm() - 1.0).abs() < 1e-9);
        assert!((gamma.x.norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn normal_incidence_matches_closed_form() {
        // At theta_i = 0 both polarizations reduce to (1 - sqrt(eps)) / (1 + sqrt(eps))
        let eps: f64 = 5.0;
        let expected = (1.0 - eps.sqrt()) / (1.0 + eps.sqrt());
        let gamma = reflection(0.0, eps);
        assert!((gamma.z.re - expected).abs() < 1e-12);
        assert!((gamma.x.re - expected).abs() < 1e-12);
    }

    #[test]
    fn parallel_coefficient_vanishes_at_brewster() {
        let eps: f64 = 5.0;
        let brewster = eps.sqrt().atan();
        let gamma = reflection(brewster, eps);
        assert!(gamma.x.norm() < 1e-9);
        // Orthogonal polarization does not share the null
        assert!(gamma.z.norm() > 0.1);
    }

    #[test]
    fn knife_edge_is_transparent_without_excess_path() {
        let coeff = knife_edge(0.0, 50.0);
        assert_eq!(coeff, Complex::new(1.0, 0.0));
        let coeff = knife_edge(-0.5, 50.0);
        assert_eq!(coeff, Complex::new(1.0, 0.0));
    }

    #[test]
    fn knife_edge_attenuates_with_excess_path() {
        let beta = 2.0 * std::f64::consts::PI / 0.125; // lambda = 12.5 cm
        let weak = knife_edge(0.01, beta);
        let strong = knife_edge(1.0, beta);

        assert!(weak.norm() < 1.0);
        assert!(strong.norm() < weak.norm());
        // Deep shadow: tens of dB down
        assert!(20.0 * strong.norm().log10() < -20.0);
    }
}

/// Reflection coefficient vector for a wall hit at incidence angle
/// `theta_i` (to the wall normal) with relative permittivity `eps_r`.
///
/// Components are (parallel, parallel, orthogonal): the in-plane field
/// components x and y see the parallel coefficient, the out-of-plane z
/// component the orthogonal one. Successive reflections compose by
/// componentwise multiplication.
pub fn reflection(theta_i: f64, eps_r: f64) -> Vector3<Complex<f64>> {
    let cos_i = theta_i.cos();
    let sin_i = theta_i.sin();
    let sqrt_eps = eps_r.sqrt();

    // sin^2/eps <= 1 for eps > 1, so the transmitted root stays real
    let root = (1.0 - sin_i * sin_i / eps_r).sqrt();

    let orthogonal = (cos_i - sqrt_eps * root) / (cos_i + sqrt_eps * root);
    let parallel = (cos_i - root / sqrt_eps) / (cos_i + root / sqrt_eps);

    Vector3::new(
        Complex::new(parallel, 0.0),
        Complex::new(parallel, 0.0),
        Complex::new(orthogonal, 0.0),
    )
}

/// Knife-edge diffraction coefficient for an excess path `delta_r` [m] at
/// propagation constant `beta` [1/m].
///
/// Uses the ITU approximation of the Fresnel integral magnitude; the same
/// scalar applies to all three field components.
pub fn knife_edge(delta_r: f64, beta: f64) -> Complex<f64> {
    if delta_r <= 0.0 {
        // Shorter than the direct path only through rounding; treat as LOS
        return Complex::new(1.0, 0.0);
    }

    let nu = (2.0 * beta * delta_r / std::f64::consts::PI).sqrt();

    let magnitude_db =
        -6.9 - 20.0 * (((nu - 0.1) * (nu - 0.1) + 1.0).sqrt() + nu - 0.1).log10();
    let magnitude = 10f64.powf(magnitude_db / 20.0);

    let phase = -std::f64::consts::FRAC_PI_4 - std::f64::consts::PI * nu * nu / 2.0;

    Complex::from_polar(magnitude, phase)
}
