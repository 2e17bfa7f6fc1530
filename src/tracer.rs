use std::sync::Arc;

use nalgebra::{Complex, Point2, Vector3};

use crate::emitter::Emitter;
use crate::field;
use crate::fresnel;
use crate::geometry::{self, Line};
use crate::raypath::RayPath;
use crate::receiver::Receiver;
use crate::settings::{Settings, LIGHT_SPEED};
use crate::walls::{Corner, Wall};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::antenna::{Antenna, AntennaKind};
    use crate::scene::Building;
    use crate::geometry::Rect;
    use crate::walls;
    use nalgebra::Vector2;

    fn emitter_at(x: f64, y: f64) -> Arc<Emitter> {
        Arc::new(Emitter::new(
            Point2::new(x, y),
            2.4e9,
            1.0,
            Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0),
        ))
    }

    fn receiver_at(x: f64, y: f64) -> Arc<Receiver> {
        Arc::new(Receiver::new(
            Point2::new(x, y),
            Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0),
        ))
    }

    fn settings_with(max_reflections: u32) -> Settings {
        Settings {
            max_reflections,
            min_valid_radius: 1.0,
            ..Settings::default()
        }
    }

    #[test]
    fn free_space_yields_los_and_ground() {
        let settings = settings_with(0);
        let tracer = Tracer::new(&[], &[], &settings);
        let emitter = emitter_at(0.0, 0.0);
        let receiver = receiver_at(30.0, 0.0);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        let paths = receiver.paths_snapshot();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().any(|p| p.is_line_of_sight));
        assert!(paths.iter().any(|p| p.is_ground_reflection));
    }

    #[test]
    fn obstructed_pair_has_no_los() {
        // Wall across the direct path
        let settings = settings_with(0);
        let wall = Wall::new(
            Line::new(Point2::new(15.0, -5.0), Point2::new(15.0, 5.0)),
            5.0,
        );
        let walls = [wall];
        let tracer = Tracer::new(&walls, &[], &settings);
        let emitter = emitter_at(0.0, 0.0);
        let receiver = receiver_at(30.0, 0.0);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        assert_eq!(receiver.path_count(), 0);
    }

    #[test]
    fn single_reflection_off_one_wall() {
        let settings = settings_with(1);
        let wall = Wall::new(
            Line::new(Point2::new(-20.0, 4.0), Point2::new(40.0, 4.0)),
            5.0,
        );
        let walls = [wall];
        let tracer = Tracer::new(&walls, &[], &settings);
        let emitter = emitter_at(0.0, 0.0);
        let receiver = receiver_at(20.0, 0.0);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        let paths = receiver.paths_snapshot();
        let reflected: Vec<_> = paths
            .iter()
            .filter(|p| !p.is_line_of_sight && !p.is_ground_reflection)
            .collect();
        assert_eq!(reflected.len(), 1);

        let path = reflected[0];
        assert_eq!(path.segments.len(), 2);
        // Image at (0, 8): unfolded length sqrt(20^2 + 8^2)
        let expected = (20.0f64 * 20.0 + 8.0 * 8.0).sqrt();
        assert!((path.distance - expected).abs() < 1e-9);

        // Bounce point at the midpoint of the wall section between them
        let bounce = path.segments[0].p2;
        assert!((bounce - Point2::new(10.0, 4.0)).norm() < 1e-9);
    }

    #[test]
    fn reflection_count_respects_depth_cap() {
        let settings = settings_with(2);
        let walls = [
            Wall::new(Line::new(Point2::new(-20.0, 3.0), Point2::new(40.0, 3.0)), 5.0),
            Wall::new(Line::new(Point2::new(-20.0, -3.0), Point2::new(40.0, -3.0)), 5.0),
        ];
        let tracer = Tracer::new(&walls, &[], &settings);
        let emitter = emitter_at(0.0, 0.0);
        let receiver = receiver_at(20.0, 0.0);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        for path in receiver.paths_snapshot() {
            if path.is_ground_reflection {
                continue;
            }
            assert!(path.segments.len() <= settings.max_reflections as usize + 1);
        }
    }

    #[test]
    fn pruning_radius_skips_far_pairs() {
        let settings = Settings {
            pruning_radius: 25.0,
            min_valid_radius: 1.0,
            ..Settings::default()
        };
        let tracer = Tracer::new(&[], &[], &settings);
        let emitter = emitter_at(0.0, 0.0);
        let receiver = receiver_at(30.0, 0.0);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        assert_eq!(receiver.path_count(), 0);
        assert!(!receiver.is_out_of_model());
    }

    #[test]
    fn near_field_marks_receiver_out_of_model() {
        let settings = settings_with(0);
        let tracer = Tracer::new(&[], &[], &settings);
        let emitter = emitter_at(0.0, 0.0);
        let receiver = receiver_at(0.5, 0.0);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        assert!(receiver.is_out_of_model());
        assert_eq!(receiver.path_count(), 0);
    }

    #[test]
    fn nlos_without_flag_produces_diffraction_only() {
        let settings = settings_with(3);
        let buildings = [Building::new(Rect::new(
            Point2::new(-5.0, -5.0),
            Vector2::new(10.0, 10.0),
        ))];
        let walls = walls::derive_walls_with_permittivity(&buildings, None, 5.0);
        let corners = walls::derive_corners(&walls);
        let tracer = Tracer::new(&walls, &corners, &settings);

        // Receiver inside the shadow-transition wedge of the top-left
        // corner: both legs clear the building, the other three corners
        // fail either the leg obstruction or the angle test
        let emitter = emitter_at(-20.0, 1.0);
        let receiver = receiver_at(6.0, 5.5);

        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        let paths = receiver.paths_snapshot();
        assert_eq!(paths.len(), 1);
        for path in &paths {
            assert!(!path.is_line_of_sight);
            assert!(!path.is_ground_reflection);
            assert_eq!(path.segments.len(), 2);
        }
    }

    #[test]
    fn diffraction_distance_is_the_two_leg_sum() {
        let settings = settings_with(0);
        let buildings = [Building::new(Rect::new(
            Point2::new(-5.0, -5.0),
            Vector2::new(10.0, 10.0),
        ))];
        let walls = walls::derive_walls_with_permittivity(&buildings, None, 5.0);
        let corners = walls::derive_corners(&walls);
        let tracer = Tracer::new(&walls, &corners, &settings);

        let emitter = emitter_at(-20.0, 1.0);
        let receiver = receiver_at(6.0, 5.5);
        tracer.trace_receiver(std::slice::from_ref(&emitter), &receiver);

        let paths = receiver.paths_snapshot();
        assert!(!paths.is_empty());
        for path in &paths {
            let legs: f64 = path.segments.iter().map(|s| s.length()).sum();
            assert!((path.distance - legs).abs() < 1e-9);
        }
    }
}

/// Path enumerator for one frozen geometry.
///
/// Holds only borrowed, read-only data, so one tracer can be shared across
/// worker threads for the duration of a run.
pub struct Tracer<'a> {
    walls: &'a [Wall],
    corners: &'a [Corner],
    settings: &'a Settings,
}

impl<'a> Tracer<'a> {
    pub fn new(walls: &'a [Wall], corners: &'a [Corner], settings: &'a Settings) -> Self {
        Self {
            walls,
            corners,
            settings,
        }
    }

    /// True iff `ray` has a bounded intersection with any wall other than
    /// the excluded origin and target walls. The exclusions suppress the
    /// spurious self-intersections at reflection endpoints.
    pub fn is_obstructed(
        &self,
        ray: &Line,
        origin_wall: Option<usize>,
        target_wall: Option<usize>,
    ) -> bool {
        self.walls.iter().enumerate().any(|(i, wall)| {
            if Some(i) == origin_wall || Some(i) == target_wall {
                return false;
            }
            ray.intersection(&wall.line).is_some()
        })
    }

    /// Enumerates every path for all (emitter, receiver) pairs of one
    /// receiver, appending the results to the receiver.
    pub fn trace_receiver(&self, emitters: &[Arc<Emitter>], receiver: &Receiver) {
        for emitter in emitters {
            self.trace_pair(emitter, receiver);
        }
    }

    fn trace_pair(&self, emitter: &Arc<Emitter>, receiver: &Receiver) {
        let distance = (receiver.position - emitter.position).norm();

        if distance > self.settings.pruning_radius {
            return;
        }
        if distance < self.settings.min_valid_radius {
            receiver.set_out_of_model(true);
            return;
        }

        // Direct path first: its existence gates the ground bounce, the
        // reflections and the diffraction fallback
        let los = self.line_of_sight(emitter, receiver);
        let has_los = los.is_some();

        if let Some(path) = los {
            receiver.append(path);
            if let Some(ground) = self.ground_reflection(emitter, receiver) {
                receiver.append(ground);
            }
        }

        if self.settings.max_reflections > 0
            && (has_los || self.settings.nlos_reflections_enabled)
        {
            let mut images = Vec::with_capacity(self.settings.max_reflections as usize);
            let mut sequence = Vec::with_capacity(self.settings.max_reflections as usize);
            self.recursive_reflection(emitter, receiver, &mut images, &mut sequence);
        }

        if !has_los {
            for corner in self.corners {
                if let Some(path) = self.diffraction(emitter, receiver, corner) {
                    receiver.append(path);
                }
            }
        }
    }

    fn line_of_sight(&self, emitter: &Arc<Emitter>, receiver: &Receiver) -> Option<RayPath> {
        let ray = Line::new(emitter.position, receiver.position);
        if ray.is_degenerate() || self.is_obstructed(&ray, None, None) {
            return None;
        }

        let field = field::nominal_field(emitter, &ray, &ray, ray.length());

        Some(RayPath {
            emitter: Arc::clone(emitter),
            segments: vec![ray],
            field,
            vertical_angle: std::f64::consts::FRAC_PI_2,
            distance: ray.length(),
            is_line_of_sight: true,
            is_ground_reflection: false,
        })
    }

    /// Single bounce off the ground plane, only meaningful when the direct
    /// path exists. Transmitter and receiver share the simulation height,
    /// so the bounce sits midway.
    fn ground_reflection(&self, emitter: &Arc<Emitter>, receiver: &Receiver) -> Option<RayPath> {
        let los = Line::new(emitter.position, receiver.position);
        let half = los.length() / 2.0;
        if half < crate::settings::GEOMETRY_EPSILON {
            return None;
        }

        let h = self.settings.simulation_height;
        let distance = 2.0 * (half * half + h * h).sqrt();

        // Arrival angle from below the horizontal plane
        let theta_arrival = std::f64::consts::FRAC_PI_2 + (h / half).atan();
        let theta_incidence = std::f64::consts::PI - theta_arrival;

        let gamma = fresnel::reflection(theta_incidence, self.settings.relative_permittivity);

        let field = field::apply_coefficients(
            field::nominal_field_at_angle(emitter, &los, &los, distance, theta_arrival),
            &gamma,
        );

        Some(RayPath {
            emitter: Arc::clone(emitter),
            // The in-plane projection doubles as the display polyline
            segments: vec![los],
            field,
            vertical_angle: theta_arrival,
            distance,
            is_line_of_sight: false,
            is_ground_reflection: true,
        })
    }

    /// Walks every wall sequence up to the depth cap, mirroring the source
    /// across one more wall per level and validating each candidate by
    /// back-projection from the receiver.
    fn recursive_reflection(
        &self,
        emitter: &Arc<Emitter>,
        receiver: &Receiver,
        images: &mut Vec<Point2<f64>>,
        sequence: &mut Vec<usize>,
    ) {
        for (index, wall) in self.walls.iter().enumerate() {
            // Reflecting twice in a row off the same wall is degenerate
            if sequence.last() == Some(&index) {
                continue;
            }

            let source = images.last().copied().unwrap_or(emitter.position);
            images.push(geometry::mirror(source, &wall.line));
            sequence.push(index);

            if let Some(path) = self.validate_reflection(emitter, receiver, images, sequence) {
                receiver.append(path);
            }

            if sequence.len() < self.settings.max_reflections as usize {
                self.recursive_reflection(emitter, receiver, images, sequence);
            }

            images.pop();
            sequence.pop();
        }
    }

    /// Back-projects the image chain from the receiver and checks every
    /// leg for bounded reflection points and obstructions. Returns the
    /// finished path when the whole chain is valid.
    fn validate_reflection(
        &self,
        emitter: &Arc<Emitter>,
        receiver: &Receiver,
        images: &[Point2<f64>],
        sequence: &[usize],
    ) -> Option<RayPath> {
        let k = sequence.len();
        let mut segments: Vec<Line> = Vec::with_capacity(k + 1);
        let mut coefficients = Vector3::new(
            Complex::new(1.0, 0.0),
            Complex::new(1.0, 0.0),
            Complex::new(1.0, 0.0),
        );

        let mut target = receiver.position;

        for i in (0..k).rev() {
            let wall = &self.walls[sequence[i]];
            let virtual_ray = Line::new(images[i], target);

            // The reflection point must lie on the wall segment
            let bounce = virtual_ray.intersection(&wall.line)?;
            if geometry::points_coincide(bounce, target) {
                return None;
            }

            let segment = Line::new(bounce, target);

            let theta_i = wall.line.normal_angle_to(&virtual_ray);
            let gamma = fresnel::reflection(theta_i, wall.permittivity);
            coefficients.component_mul_assign(&gamma);

            // The wall the segment ends on, excluded as the target
            let next_wall = if i + 1 < k { Some(sequence[i + 1]) } else { None };
            if self.is_obstructed(&segment, Some(sequence[i]), next_wall) {
                return None;
            }

            segments.push(segment);
            target = bounce;
        }

        let first_leg = Line::new(emitter.position, target);
        if first_leg.is_degenerate() {
            return None;
        }
        if self.is_obstructed(&first_leg, None, Some(sequence[0])) {
            return None;
        }
        segments.push(first_leg);

        // Unfolded length: straight line from the deepest image to the receiver
        let distance = (receiver.position - images[k - 1]).norm();

        // Emit transmitter-first
        segments.reverse();

        let emitter_ray = segments[0];
        let receiver_ray = segments[k];
        let field = field::apply_coefficients(
            field::nominal_field(emitter, &emitter_ray, &receiver_ray, distance),
            &coefficients,
        );

        Some(RayPath {
            emitter: Arc::clone(emitter),
            segments,
            field,
            vertical_angle: std::f64::consts::FRAC_PI_2,
            distance,
            is_line_of_sight: false,
            is_ground_reflection: false,
        })
    }

    /// Knife-edge diffraction around one corner, tried only when the
    /// direct path is blocked.
    fn diffraction(
        &self,
        emitter: &Arc<Emitter>,
        receiver: &Receiver,
        corner: &Corner,
    ) -> Option<RayPath> {
        let to_corner = Line::new(emitter.position, corner.position);
        let from_corner = Line::new(corner.position, receiver.position);
        if to_corner.is_degenerate() || from_corner.is_degenerate() {
            return None;
        }

        // The wall whose far endpoint sits closer to the transmitter is
        // the one adjacent to the incident leg
        let d0 = (corner.far_endpoints[0] - emitter.position).norm();
        let d1 = (corner.far_endpoints[1] - emitter.position).norm();
        let (incident_wall, departing_wall) = if d0 <= d1 {
            (corner.walls[0], corner.walls[1])
        } else {
            (corner.walls[1], corner.walls[0])
        };

        // Angle of each leg to its adjacent wall line; the complement of
        // the folded angle to the wall normal
        let a_incident =
            std::f64::consts::FRAC_PI_2 - self.walls[incident_wall].line.normal_angle_to(&to_corner);
        let a_departing = std::f64::consts::FRAC_PI_2
            - self.walls[departing_wall].line.normal_angle_to(&from_corner);

        // The sum test keeps the receiver inside the shadow-transition
        // wedge between the wall plane and the shadow boundary
        if a_incident + a_departing > std::f64::consts::FRAC_PI_2 {
            return None;
        }

        let excluded = (Some(corner.walls[0]), Some(corner.walls[1]));
        if self.is_obstructed(&to_corner, excluded.0, excluded.1)
            || self.is_obstructed(&from_corner, excluded.0, excluded.1)
        {
            return None;
        }

        let distance = to_corner.length() + from_corner.length();
        let direct = (receiver.position - emitter.position).norm();
        let excess = distance - direct;

        let omega = 2.0 * std::f64::consts::PI * emitter.frequency;
        let beta = omega / LIGHT_SPEED;
        let coefficient = fresnel::knife_edge(excess, beta);

        let field = field::nominal_field(emitter, &to_corner, &from_corner, distance)
            .map(|c| c * coefficient);

        Some(RayPath {
            emitter: Arc::clone(emitter),
            segments: vec![to_corner, from_corner],
            field,
            vertical_angle: std::f64::consts::FRAC_PI_2,
            distance,
            is_line_of_sight: false,
            is_ground_reflection: false,
        })
    }
}
