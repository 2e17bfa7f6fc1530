use geo_clipper::Clipper;
use geo_types::{Coord, LineString, MultiPolygon, Polygon};
use nalgebra::Point2;

use crate::geometry::{Line, Rect};
use crate::scene::Building;
use crate::settings::{CLIP_TOLERANCE, WALL_SNAP_EPSILON};

#[cfg(test)]
mod tests {

    use super::*;
    use nalgebra::Vector2;

    fn building(x: f64, y: f64, w: f64, h: f64) -> Building {
        Building::new(Rect::new(Point2::new(x, y), Vector2::new(w, h)))
    }

    #[test]
    fn single_building_yields_four_walls_and_corners() {
        let walls = derive_walls(&[building(0.0, 0.0, 10.0, 10.0)], None);
        assert_eq!(walls.len(), 4);

        let corners = derive_corners(&walls);
        assert_eq!(corners.len(), 4);

        for corner in &corners {
            let w1 = &walls[corner.walls[0]];
            let w2 = &walls[corner.walls[1]];
            let on = |w: &Wall| {
                (w.line.p1 - corner.position).norm() < 1e-9
                    || (w.line.p2 - corner.position).norm() < 1e-9
            };
            assert!(on(w1) && on(w2));
        }
    }

    #[test]
    fn shared_edge_between_merged_buildings_disappears() {
        // Two 10x10 buildings sharing the x = 10 edge merge into one 20x10
        // footprint with four outline walls
        let walls = derive_walls(
            &[building(0.0, 0.0, 10.0, 10.0), building(10.0, 0.0, 10.0, 10.0)],
            None,
        );

        for w in &walls {
            let vertical_at_10 =
                (w.line.p1.x - 10.0).abs() < 1e-6 && (w.line.p2.x - 10.0).abs() < 1e-6;
            assert!(!vertical_at_10, "interior wall survived the union");
        }

        let total: f64 = walls.iter().map(|w| w.line.length()).sum();
        assert!((total - 60.0).abs() < 1e-6);
    }

    #[test]
    fn disjoint_buildings_keep_their_own_outlines() {
        let walls = derive_walls(
            &[building(0.0, 0.0, 5.0, 5.0), building(20.0, 0.0, 5.0, 5.0)],
            None,
        );
        assert_eq!(walls.len(), 8);

        let corners = derive_corners(&walls);
        assert_eq!(corners.len(), 8);
    }

    #[test]
    fn area_boundary_walls_are_dropped() {
        let area = Rect::new(Point2::new(0.0, 0.0), Vector2::new(10.0, 10.0));
        // Building flush against the left edge of the simulation area
        let walls = derive_walls(&[building(0.0, 2.0, 4.0, 4.0)], Some(&area));
        assert_eq!(walls.len(), 3);

        for w in &walls {
            let on_left_edge = w.line.p1.x.abs() < 1e-6 && w.line.p2.x.abs() < 1e-6;
            assert!(!on_left_edge);
        }
    }

    #[test]
    fn corner_far_endpoints_are_opposite_the_corner() {
        let walls = derive_walls(&[building(0.0, 0.0, 10.0, 10.0)], None);
        let corners = derive_corners(&walls);

        for corner in &corners {
            for (wall_idx, far) in corner.walls.iter().zip(corner.far_endpoints.iter()) {
                let w = &walls[*wall_idx];
                assert!((far - corner.position).norm() > 1.0);
                assert!(
                    (w.line.p1 - *far).norm() < 1e-9 || (w.line.p2 - *far).norm() < 1e-9
                );
            }
        }
    }
}

/// A wall of the merged building footprint.
///
/// Derived state, rebuilt at the start of every run. Carries the single
/// process-wide relative permittivity of the wall material.
#[derive(Debug, Clone, PartialEq)]
pub struct Wall {
    pub line: Line,
    pub permittivity: f64,
}

impl Wall {
    pub fn new(line: Line, permittivity: f64) -> Self {
        Self { line, permittivity }
    }
}

/// A point where exactly two walls meet.
///
/// `walls` are indices into the wall list the corner was derived from;
/// `far_endpoints[i]` is the endpoint of `walls[i]` away from the corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Corner {
    pub position: Point2<f64>,
    pub walls: [usize; 2],
    pub far_endpoints: [Point2<f64>; 2],
}

impl Corner {
    /// Unit vectors from the corner toward the two far endpoints, i.e.
    /// along the adjacent walls into the building outline.
    pub fn wall_directions(&self) -> [nalgebra::Vector2<f64>; 2] {
        [
            (self.far_endpoints[0] - self.position).normalize(),
            (self.far_endpoints[1] - self.position).normalize(),
        ]
    }
}

fn rect_polygon(rect: &Rect) -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            Coord {
                x: rect.left(),
                y: rect.bottom(),
            },
            Coord {
                x: rect.right(),
                y: rect.bottom(),
            },
            Coord {
                x: rect.right(),
                y: rect.top(),
            },
            Coord {
                x: rect.left(),
                y: rect.top(),
            },
        ]),
        vec![],
    )
}

fn lies_on_area_boundary(line: &Line, area: &Rect) -> bool {
    let horizontal = (line.p1.y - line.p2.y).abs() < WALL_SNAP_EPSILON;
    let vertical = (line.p1.x - line.p2.x).abs() < WALL_SNAP_EPSILON;

    if horizontal {
        let y = line.p1.y;
        return (y - area.bottom()).abs() < WALL_SNAP_EPSILON
            || (y - area.top()).abs() < WALL_SNAP_EPSILON;
    }
    if vertical {
        let x = line.p1.x;
        return (x - area.left()).abs() < WALL_SNAP_EPSILON
            || (x - area.right()).abs() < WALL_SNAP_EPSILON;
    }

    false
}

fn ring_walls(ring: &LineString<f64>, permittivity: f64, out: &mut Vec<Wall>) {
    let points = &ring.0;
    if points.len() < 2 {
        return;
    }

    // Rings are closed, so consecutive pairs cover every edge exactly once
    for pair in points.windows(2) {
        let p1 = Point2::new(pair[0].x, pair[0].y);
        let p2 = Point2::new(pair[1].x, pair[1].y);
        let line = Line::new(p1, p2);
        if line.is_degenerate() {
            continue;
        }
        out.push(Wall::new(line, permittivity));
    }
}

/// Walls of the union of all building rectangles.
///
/// Shared edges between adjacent buildings vanish in the union, so no wall
/// ever lies inside the merged footprint. When `area` is given, walls lying
/// exactly on the area boundary are dropped.
pub fn derive_walls(buildings: &[Building], area: Option<&Rect>) -> Vec<Wall> {
    derive_walls_with_permittivity(buildings, area, crate::settings::Settings::default().relative_permittivity)
}

/// Same as [`derive_walls`] with an explicit wall permittivity.
pub fn derive_walls_with_permittivity(
    buildings: &[Building],
    area: Option<&Rect>,
    permittivity: f64,
) -> Vec<Wall> {
    let mut merged: Option<MultiPolygon<f64>> = None;

    for b in buildings {
        let poly = MultiPolygon::new(vec![rect_polygon(&b.rect)]);
        merged = Some(match merged {
            None => poly,
            Some(acc) => acc.union(&poly, CLIP_TOLERANCE),
        });
    }

    let mut walls = Vec::new();
    let Some(merged) = merged else {
        return walls;
    };

    for polygon in &merged.0 {
        ring_walls(polygon.exterior(), permittivity, &mut walls);
        // Courtyards enclosed by merged buildings bound the footprint too
        for interior in polygon.interiors() {
            ring_walls(interior, permittivity, &mut walls);
        }
    }

    if let Some(area) = area {
        walls.retain(|w| !lies_on_area_boundary(&w.line, area));
    }

    walls
}

/// Corners of the wall set: every point where exactly two walls share an
/// endpoint. Points touched by more than two walls are degenerate overlaps
/// and produce no corner.
pub fn derive_corners(walls: &[Wall]) -> Vec<Corner> {
    let mut corners = Vec::new();

    for i in 0..walls.len() {
        for j in (i + 1)..walls.len() {
            let Some(shared) = shared_endpoint(&walls[i], &walls[j]) else {
                continue;
            };

            let incident = walls
                .iter()
                .filter(|w| {
                    (w.line.p1 - shared).norm() < WALL_SNAP_EPSILON
                        || (w.line.p2 - shared).norm() < WALL_SNAP_EPSILON
                })
                .count();
            if incident != 2 {
                continue;
            }

            corners.push(Corner {
                position: shared,
                walls: [i, j],
                far_endpoints: [
                    far_endpoint(&walls[i], shared),
                    far_endpoint(&walls[j], shared),
                ],
            });
        }
    }

    corners
}

fn shared_endpoint(a: &Wall, b: &Wall) -> Option<Point2<f64>> {
    let ends_a = [a.line.p1, a.line.p2];
    let ends_b = [b.line.p1, b.line.p2];

    let mut shared = None;
    let mut count = 0;
    for pa in &ends_a {
        for pb in &ends_b {
            if (pa - pb).norm() < WALL_SNAP_EPSILON {
                shared = Some(*pa);
                count += 1;
            }
        }
    }

    // Exactly one shared endpoint; two means the walls coincide
    if count == 1 {
        shared
    } else {
        None
    }
}

fn far_endpoint(wall: &Wall, near: Point2<f64>) -> Point2<f64> {
    if (wall.line.p1 - near).norm() < WALL_SNAP_EPSILON {
        wall.line.p2
    } else {
        wall.line.p1
    }
}
