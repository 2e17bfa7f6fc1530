use std::sync::Arc;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::antenna::{Antenna, AntennaKind};
use crate::emitter::Emitter;
use crate::geometry::Rect;
use crate::receiver::Receiver;


/// An axis-aligned building footprint, owned by the scene and read-only
/// during a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub rect: Rect,
}

impl Building {
    pub fn new(rect: Rect) -> Self {
        Self { rect }
    }
}

/// The editable scene: persistent entities that survive across runs.
/// Walls, corners and path contributions are run-scoped and derived.
#[derive(Debug, Default)]
pub struct Scene {
    pub buildings: Vec<Building>,
    pub emitters: Vec<Arc<Emitter>>,
    pub receivers: Vec<Arc<Receiver>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_building(&mut self, building: Building) {
        self.buildings.push(building);
    }

    pub fn attach_emitter(&mut self, emitter: Emitter) -> Arc<Emitter> {
        let emitter = Arc::new(emitter);
        self.emitters.push(Arc::clone(&emitter));
        emitter
    }

    pub fn attach_receiver(&mut self, receiver: Receiver) -> Arc<Receiver> {
        let receiver = Arc::new(receiver);
        self.receivers.push(Arc::clone(&receiver));
        receiver
    }

    pub fn detach_emitter(&mut self, emitter: &Arc<Emitter>) {
        self.emitters.retain(|e| !Arc::ptr_eq(e, emitter));
    }

    /// Smallest rectangle containing every scene entity, padded by one
    /// meter, usable as a default simulation area.
    pub fn bounding_area(&self) -> Option<Rect> {
        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        let mut extend = |p: Point2<f64>| {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        };

        for b in &self.buildings {
            extend(b.rect.origin);
            extend(Point2::new(b.rect.right(), b.rect.top()));
        }
        for e in &self.emitters {
            extend(e.position);
        }
        for r in &self.receivers {
            extend(r.position);
        }

        if min.x > max.x {
            return None;
        }

        Some(Rect::new(
            Point2::new(min.x - 1.0, min.y - 1.0),
            nalgebra::Vector2::new(max.x - min.x + 2.0, max.y - min.y + 2.0),
        ))
    }
}

/// Converts a power in watts to dBm.
pub fn power_to_dbm(power_watts: f64) -> f64 {
    10.0 * (power_watts / 1e-3).log10()
}

/// Converts a power in dBm to watts.
pub fn dbm_to_power(power_dbm: f64) -> f64 {
    10f64.powf(power_dbm / 10.0) * 1e-3
}

/// Populates a rectangular area with one receiver per square meter,
/// centered in each cell, skipping positions inside a building.
pub fn grid_receivers(
    area: &Rect,
    antenna: AntennaKind,
    efficiency: f64,
    buildings: &[Building],
) -> Vec<Arc<Receiver>> {
    let cols = area.size.x.round() as usize;
    let rows = area.size.y.round() as usize;

    let mut receivers = Vec::with_capacity(cols * rows);

    for row in 0..rows {
        for col in 0..cols {
            let position = Point2::new(
                area.origin.x + col as f64 + 0.5,
                area.origin.y + row as f64 + 0.5,
            );

            if buildings.iter().any(|b| b.rect.contains(position)) {
                continue;
            }

            receivers.push(Arc::new(Receiver::new(
                position,
                Antenna::new(antenna, efficiency),
            )));
        }
    }

    receivers
}
