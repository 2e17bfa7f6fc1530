use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

use crate::settings::GEOMETRY_EPSILON;


/// Axis-aligned rectangle, origin at the corner with the smallest
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub origin: Point2<f64>,
    pub size: Vector2<f64>,
}

impl Rect {
    pub fn new(origin: Point2<f64>, size: Vector2<f64>) -> Self {
        Self { origin, size }
    }

    pub fn left(&self) -> f64 {
        self.origin.x
    }

    pub fn right(&self) -> f64 {
        self.origin.x + self.size.x
    }

    pub fn bottom(&self) -> f64 {
        self.origin.y
    }

    pub fn top(&self) -> f64 {
        self.origin.y + self.size.y
    }

    pub fn contains(&self, p: Point2<f64>) -> bool {
        p.x >= self.left() && p.x <= self.right() && p.y >= self.bottom() && p.y <= self.top()
    }
}

/// Directed line segment in meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Line {
    pub p1: Point2<f64>,
    pub p2: Point2<f64>,
}

impl Line {
    pub fn new(p1: Point2<f64>, p2: Point2<f64>) -> Self {
        Self { p1, p2 }
    }

    pub fn length(&self) -> f64 {
        (self.p2 - self.p1).norm()
    }

    /// Direction vector from p1 to p2, not normalized.
    pub fn delta(&self) -> Vector2<f64> {
        self.p2 - self.p1
    }

    /// Unit direction vector from p1 to p2.
    pub fn direction(&self) -> Vector2<f64> {
        self.delta().normalize()
    }

    /// Angle of the segment direction to the x axis, in radians.
    pub fn angle(&self) -> f64 {
        let d = self.delta();
        d.y.atan2(d.x)
    }

    pub fn is_degenerate(&self) -> bool {
        self.length() < GEOMETRY_EPSILON
    }

    /// Bounded segment-segment intersection. Returns the intersection point
    /// only when it lies on both segments (endpoints included).
    pub fn intersection(&self, other: &Line) -> Option<Point2<f64>> {
        let r = self.delta();
        let s = other.delta();
        let denom = r.x * s.y - r.y * s.x;

        if denom.abs() < 1e-15 {
            // Parallel or colinear segments never produce a usable single
            // reflection/obstruction point
            return None;
        }

        let qp = other.p1 - self.p1;
        let t = (qp.x * s.y - qp.y * s.x) / denom;
        let u = (qp.x * r.y - qp.y * r.x) / denom;

        if !(0.0..=1.0).contains(&t) || !(0.0..=1.0).contains(&u) {
            return None;
        }

        Some(self.p1 + r * t)
    }

    /// Angle between `ray` and the normal of this segment's carrying line,
    /// folded into [0, pi/2].
    pub fn normal_angle_to(&self, ray: &Line) -> f64 {
        let mut theta = (std::f64::consts::FRAC_PI_2 - (ray.angle() - self.angle())).abs()
            % std::f64::consts::PI;

        if theta > std::f64::consts::FRAC_PI_2 {
            theta = (theta - std::f64::consts::PI).abs();
        }

        theta
    }
}

/// Reflection of `source` across the line carrying `wall`.
///
/// Translates to the wall base, rotates the wall onto an axis, negates the
/// perpendicular coordinate, then maps back.
pub fn mirror(source: Point2<f64>, wall: &Line) -> Point2<f64> {
    let theta = wall.angle() - std::f64::consts::FRAC_PI_2;

    // Wall-local coordinates
    let x = source.x - wall.p1.x;
    let y = source.y - wall.p1.y;

    let (sin_t, cos_t) = theta.sin_cos();

    // Rotate so the wall lies along the local y axis; the image then sits at
    // the opposite perpendicular coordinate
    let x_p = x * cos_t + y * sin_t;
    let y_p = -x * sin_t + y * cos_t;

    // Rotate back with the perpendicular coordinate negated
    let rx = -x_p * cos_t - y_p * sin_t;
    let ry = -x_p * sin_t + y_p * cos_t;

    Point2::new(rx + wall.p1.x, ry + wall.p1.y)
}

/// True when two points coincide within the geometric tolerance.
pub fn points_coincide(a: Point2<f64>, b: Point2<f64>) -> bool {
    (a - b).norm() < GEOMETRY_EPSILON
}
