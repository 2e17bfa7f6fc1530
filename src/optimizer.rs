use std::sync::Arc;

use log::{debug, info};
use nalgebra::Point2;

use crate::antenna::{Antenna, AntennaKind};
use crate::emitter::Emitter;
use crate::engine::{SimulationEvent, SimulationHandler, SimulationRun};
use crate::geometry::{Line, Rect};
use crate::receiver::Receiver;
use crate::scene::Building;
use crate::settings::{ConfigError, Settings, CORNER_OFFSET_DISTANCE};
use crate::tracer::Tracer;
use crate::walls::{self, Corner, Wall};

#[cfg(test)]
mod tests {

    use super::*;
    use crate::scene;
    use nalgebra::Vector2;

    #[test]
    fn candidate_positions_sit_outside_the_building() {
        let buildings = [Building::new(Rect::new(
            Point2::new(0.0, 0.0),
            Vector2::new(10.0, 10.0),
        ))];
        let walls = walls::derive_walls(&buildings, None);
        let corners = walls::derive_corners(&walls);
        assert_eq!(corners.len(), 4);

        for corner in &corners {
            let pos = candidate_position(corner);
            assert!(!buildings[0].rect.contains(pos));
            assert!(((pos - corner.position).norm() - CORNER_OFFSET_DISTANCE).abs() < 1e-9);
        }
    }

    #[test]
    fn unobstructed_receivers_dominate_the_score() {
        let buildings = [Building::new(Rect::new(
            Point2::new(0.0, 0.0),
            Vector2::new(10.0, 10.0),
        ))];
        let walls = walls::derive_walls(&buildings, None);
        let settings = Settings::default();
        let tracer = Tracer::new(&walls, &[], &settings);

        let visible = Arc::new(Receiver::new(
            Point2::new(-5.0, -5.0),
            Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0),
        ));
        let hidden = Arc::new(Receiver::new(
            Point2::new(5.0, 15.0),
            Antenna::new(AntennaKind::HalfWaveDipoleVertical, 1.0),
        ));

        // Candidate near the bottom-left corner, outside the footprint
        let p = Point2::new(-1.4, -1.4);
        let score_visible = placement_score(&tracer, p, std::slice::from_ref(&visible));
        let score_hidden = placement_score(&tracer, p, std::slice::from_ref(&hidden));

        assert!(score_visible > 10.0 * score_hidden);
    }

    #[test]
    fn optimizer_covers_an_open_grid() {
        let buildings = vec![Building::new(Rect::new(
            Point2::new(20.0, 20.0),
            Vector2::new(10.0, 10.0),
        ))];
        let area = Rect::new(Point2::new(0.0, 0.0), Vector2::new(50.0, 50.0));
        let receivers = scene::grid_receivers(
            &area,
            AntennaKind::HalfWaveDipoleVertical,
            1.0,
            &buildings,
        );
        assert!(!receivers.is_empty());

        let settings = Settings {
            max_reflections: 1,
            ..Settings::default()
        };
        let template = EmitterTemplate {
            frequency: 2.4e9,
            eirp: 10.0,
            efficiency: 1.0,
            antenna: AntennaKind::HalfWaveDipoleVertical,
        };

        let mut optimizer = CoverageOptimizer::new(
            settings,
            buildings,
            area,
            receivers,
            template,
            0.9,
            0.0,
        );
        let outcome = optimizer.optimize().unwrap();

        assert!(outcome.coverage >= 0.9 || !outcome.feasible);
        // Four corners means at most four placements
        assert!(outcome.placed.len() <= 4);
    }
}

/// Template for the trial transmitters the optimizer places.
#[derive(Debug, Clone, Copy)]
pub struct EmitterTemplate {
    pub frequency: f64,
    pub eirp: f64,
    pub efficiency: f64,
    pub antenna: AntennaKind,
}

impl EmitterTemplate {
    fn instantiate(&self, position: Point2<f64>) -> Emitter {
        Emitter::new(
            position,
            self.frequency,
            self.eirp,
            Antenna::new(self.antenna, self.efficiency),
        )
    }
}

/// Result of a placement run.
#[derive(Debug)]
pub struct OptimizerOutcome {
    pub placed: Vec<Arc<Emitter>>,
    /// Covered fraction after the last kept placement.
    pub coverage: f64,
    pub iterations: usize,
    /// False when every remaining corner scored zero before the target
    /// coverage was reached.
    pub feasible: bool,
    /// True when a simulation run was cancelled under the optimizer.
    pub cancelled: bool,
}

/// Candidate transmitter position for a corner: offset outward from the
/// corner along the bisector of the two wall directions.
pub fn candidate_position(corner: &Corner) -> Point2<f64> {
    let [u1, u2] = corner.wall_directions();
    let bisector = (u1 + u2).normalize();
    corner.position - bisector * CORNER_OFFSET_DISTANCE
}

/// Score of a candidate position against the uncovered receivers:
/// sum of gamma / (1 + distance), gamma = 100 with a clear line to the
/// receiver, 1 otherwise.
pub fn placement_score(tracer: &Tracer, position: Point2<f64>, uncovered: &[Arc<Receiver>]) -> f64 {
    uncovered
        .iter()
        .map(|receiver| {
            let sight = Line::new(position, receiver.position);
            let gamma = if sight.is_degenerate() || !tracer.is_obstructed(&sight, None, None) {
                100.0
            } else {
                1.0
            };
            gamma / (1.0 + sight.length())
        })
        .sum()
}

/// Greedy transmitter placement: repeatedly trials the best-scoring corner
/// and keeps the transmitter only when it improves coverage.
pub struct CoverageOptimizer {
    handler: SimulationHandler,
    settings: Settings,
    buildings: Vec<Building>,
    area: Rect,
    receivers: Vec<Arc<Receiver>>,
    template: EmitterTemplate,
    /// Target covered fraction in (0, 1].
    coverage_target: f64,
    fade_margin: f64,
}

impl CoverageOptimizer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        buildings: Vec<Building>,
        area: Rect,
        receivers: Vec<Arc<Receiver>>,
        template: EmitterTemplate,
        coverage_target: f64,
        fade_margin: f64,
    ) -> Self {
        Self {
            handler: SimulationHandler::new(settings.clone()),
            settings,
            buildings,
            area,
            receivers,
            template,
            coverage_target,
            fade_margin,
        }
    }

    fn coverage(&self) -> f64 {
        if self.receivers.is_empty() {
            return 0.0;
        }
        let covered = self
            .receivers
            .iter()
            .filter(|r| r.is_covered(self.fade_margin, &self.settings))
            .count();
        covered as f64 / self.receivers.len() as f64
    }

    fn uncovered(&self) -> Vec<Arc<Receiver>> {
        self.receivers
            .iter()
            .filter(|r| !r.is_covered(self.fade_margin, &self.settings))
            .cloned()
            .collect()
    }

    /// Runs one incremental simulation for the trial emitter and waits for
    /// it to drain. Returns false when the run was cancelled.
    fn evaluate_candidate(&self, emitter: &Arc<Emitter>) -> Result<bool, ConfigError> {
        let events = self.handler.events();
        self.handler.start_simulation(SimulationRun {
            buildings: self.buildings.clone(),
            emitters: vec![Arc::clone(emitter)],
            receivers: self.receivers.clone(),
            area: Some(self.area),
            reset: false,
        })?;

        loop {
            match events.recv() {
                Ok(SimulationEvent::Finished) => return Ok(true),
                Ok(SimulationEvent::Cancelled) => return Ok(false),
                Ok(_) => {}
                Err(_) => return Ok(false),
            }
        }
    }

    pub fn optimize(&mut self) -> Result<OptimizerOutcome, ConfigError> {
        for receiver in &self.receivers {
            receiver.reset();
        }

        let walls: Vec<Wall> = walls::derive_walls_with_permittivity(
            &self.buildings,
            Some(&self.area),
            self.settings.relative_permittivity,
        );
        let corners = walls::derive_corners(&walls);
        let tracer = Tracer::new(&walls, &[], &self.settings);

        let mut available: Vec<&Corner> = corners.iter().collect();
        let mut placed: Vec<Arc<Emitter>> = Vec::new();
        let mut iterations = 0;

        let mut coverage = self.coverage();

        while coverage < self.coverage_target {
            let uncovered = self.uncovered();

            // Score every remaining corner against the uncovered set
            let mut best: Option<(usize, f64)> = None;
            for (i, corner) in available.iter().enumerate() {
                let score = placement_score(&tracer, candidate_position(corner), &uncovered);
                if score > best.map_or(0.0, |(_, s)| s) {
                    best = Some((i, score));
                }
            }

            let Some((best_index, best_score)) = best else {
                info!("optimizer: no corner scores above zero, infeasible");
                return Ok(OptimizerOutcome {
                    placed,
                    coverage,
                    iterations,
                    feasible: false,
                    cancelled: false,
                });
            };

            let corner = available.swap_remove(best_index);
            let position = candidate_position(corner);
            let trial = Arc::new(self.template.instantiate(position));
            iterations += 1;
            debug!(
                "optimizer iteration {}: corner at ({:.1}, {:.1}), score {:.3}",
                iterations, corner.position.x, corner.position.y, best_score
            );

            if !self.evaluate_candidate(&trial)? {
                info!("optimizer: run cancelled, stopping");
                return Ok(OptimizerOutcome {
                    placed,
                    coverage,
                    iterations,
                    feasible: false,
                    cancelled: true,
                });
            }

            let new_coverage = self.coverage();
            if new_coverage > coverage {
                info!(
                    "optimizer: kept transmitter at ({:.1}, {:.1}), coverage {:.3} -> {:.3}",
                    position.x, position.y, coverage, new_coverage
                );
                coverage = new_coverage;
                placed.push(trial);
            } else {
                debug!("optimizer: candidate did not improve coverage, discarded");
                for receiver in &self.receivers {
                    receiver.discard_source(&trial);
                }
            }

            if available.is_empty() && coverage < self.coverage_target {
                return Ok(OptimizerOutcome {
                    placed,
                    coverage,
                    iterations,
                    feasible: false,
                    cancelled: false,
                });
            }
        }

        Ok(OptimizerOutcome {
            placed,
            coverage,
            iterations,
            feasible: true,
            cancelled: false,
        })
    }

    /// Cancels an in-flight evaluation; the optimizer loop observes it at
    /// the next drain.
    pub fn cancel(&self) {
        self.handler.cancel_simulation();
    }
}
