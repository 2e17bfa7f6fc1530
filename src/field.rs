use nalgebra::{Complex, Vector3};

use crate::emitter::Emitter;
use crate::geometry::Line;
use crate::settings::LIGHT_SPEED;


/// Nominal electric field of a path at unfolded distance `distance`.
///
/// `emitter_ray` is the segment leaving the transmitter (fixes the TX
/// gain), `receiver_ray` the segment arriving at the receiver (fixes the
/// in-plane orientation of the field vector). `vertical_angle` is pi/2 for
/// in-plane paths and the elevation-dependent angle for the ground bounce.
pub fn nominal_field(
    emitter: &Emitter,
    emitter_ray: &Line,
    receiver_ray: &Line,
    distance: f64,
) -> Vector3<Complex<f64>> {
    nominal_field_at_angle(
        emitter,
        emitter_ray,
        receiver_ray,
        distance,
        std::f64::consts::FRAC_PI_2,
    )
}

/// [`nominal_field`] with an explicit vertical departure angle, used by the
/// ground bounce.
pub fn nominal_field_at_angle(
    emitter: &Emitter,
    emitter_ray: &Line,
    receiver_ray: &Line,
    distance: f64,
    vertical_angle: f64,
) -> Vector3<Complex<f64>> {
    let phi = emitter.outgoing_ray_angle(emitter_ray);
    let gain = emitter.gain(vertical_angle, phi);

    let omega = 2.0 * std::f64::consts::PI * emitter.frequency;
    let beta = omega / LIGHT_SPEED;

    // Spherical spreading with the free-space phase term
    let magnitude = (60.0 * gain * emitter.power()).sqrt() / distance;
    let e = Complex::from_polar(magnitude, -beta * distance);

    let (p_par, p_orth) = emitter.polarization();
    let n = receiver_ray.direction();

    Vector3::new(e * p_par * n.x, e * p_par * n.y, e * p_orth)
}

/// Componentwise product of a field vector and a coefficient vector.
pub fn apply_coefficients(
    field: Vector3<Complex<f64>>,
    coefficients: &Vector3<Complex<f64>>,
) -> Vector3<Complex<f64>> {
    field.component_mul(coefficients)
}

/// Complex dot product without conjugation, matching the coherent sum
/// convention of the receiver aggregator.
pub fn dot(a: &Vector3<Complex<f64>>, b: &Vector3<Complex<f64>>) -> Complex<f64> {
    a.x * b.x + a.y * b.y + a.z * b.z
}
