use std::sync::Arc;

use nalgebra::{Complex, Vector3};

use crate::emitter::Emitter;
use crate::geometry::Line;
use crate::settings::LIGHT_SPEED;

/// One geometric propagation path from a transmitter to a receiver.
///
/// `segments` is the polyline from the transmitter to the receiver: one
/// segment for line-of-sight and the ground bounce, reflection count + 1 for
/// specular paths, two for a corner diffraction. `field` is the total
/// complex electric field this path contributes at the receiver.
#[derive(Debug, Clone)]
pub struct RayPath {
    pub emitter: Arc<Emitter>,
    pub segments: Vec<Line>,
    pub field: Vector3<Complex<f64>>,
    /// Vertical arrival angle; pi/2 for in-plane paths, different only for
    /// the ground bounce.
    pub vertical_angle: f64,
    /// Total unfolded path length [m].
    pub distance: f64,
    pub is_line_of_sight: bool,
    pub is_ground_reflection: bool,
}

impl RayPath {
    /// Propagation delay [s].
    pub fn delay(&self) -> f64 {
        self.distance / LIGHT_SPEED
    }

    /// The segment arriving at the receiver.
    pub fn arrival_segment(&self) -> &Line {
        self.segments
            .last()
            .expect("a ray path always has at least one segment")
    }

    /// True when this path was produced by the same emitter instance.
    pub fn comes_from(&self, emitter: &Arc<Emitter>) -> bool {
        Arc::ptr_eq(&self.emitter, emitter)
    }
}
