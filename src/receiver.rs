use std::sync::Arc;

use nalgebra::{Complex, Point2};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::antenna::Antenna;
use crate::emitter::Emitter;
use crate::field;
use crate::raypath::RayPath;
use crate::settings::Settings;


/// Run-scoped receiver state behind the per-receiver lock.
#[derive(Debug, Default)]
struct ReceiverState {
    paths: Vec<RayPath>,
    cached_power: Option<f64>,
    out_of_model: bool,
}

/// A receiver: position, antenna, and the paths collected during a run.
///
/// The path list is append-only while a run is in flight; writes from
/// worker threads are serialized by the internal mutex, and the cached
/// received power is invalidated before any append commits.
#[derive(Debug)]
pub struct Receiver {
    pub position: Point2<f64>,
    pub antenna: Antenna,
    state: Mutex<ReceiverState>,
}

/// The persisted part of a receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverSpec {
    pub antenna: Antenna,
    pub position: Point2<f64>,
}

impl From<&Receiver> for ReceiverSpec {
    fn from(r: &Receiver) -> Self {
        Self {
            antenna: r.antenna,
            position: r.position,
        }
    }
}

impl From<&ReceiverSpec> for Receiver {
    fn from(spec: &ReceiverSpec) -> Self {
        Receiver::new(spec.position, spec.antenna)
    }
}

impl Receiver {
    pub fn new(position: Point2<f64>, antenna: Antenna) -> Self {
        Self {
            position,
            antenna,
            state: Mutex::new(ReceiverState::default()),
        }
    }

    pub fn rotation(&self) -> f64 {
        self.antenna.rotation
    }

    /// Azimuth of an incoming ray relative to the antenna orientation.
    /// The ray is assumed to arrive at the receiver at its second point.
    pub fn incident_ray_angle(&self, ray: &crate::geometry::Line) -> f64 {
        let d = ray.delta();
        // Reverse the direction: the angle is seen from the receiver
        (-d.y).atan2(-d.x) - self.rotation()
    }

    /// Discards all paths and caches; also clears the out-of-model flag.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.paths.clear();
        state.cached_power = None;
        state.out_of_model = false;
    }

    /// Appends one path contribution. Thread-safe; invalidates the cache.
    pub fn append(&self, path: RayPath) {
        let mut state = self.state.lock();
        state.cached_power = None;
        state.paths.push(path);
    }

    /// Removes every path sourced from `emitter`, in place.
    pub fn discard_source(&self, emitter: &Arc<Emitter>) {
        let mut state = self.state.lock();
        state.cached_power = None;
        state.paths.retain(|p| !p.comes_from(emitter));
    }

    pub fn set_out_of_model(&self, flag: bool) {
        self.state.lock().out_of_model = flag;
    }

    pub fn is_out_of_model(&self) -> bool {
        self.state.lock().out_of_model
    }

    pub fn path_count(&self) -> usize {
        self.state.lock().paths.len()
    }

    /// A copy of the current path list, for display layers.
    pub fn paths_snapshot(&self) -> Vec<RayPath> {
        self.state.lock().paths.clone()
    }

    /// Open-circuit voltage term of one path at this receiver.
    fn path_voltage(&self, path: &RayPath) -> Complex<f64> {
        let phi = self.incident_ray_angle(path.arrival_segment());
        let he = self
            .antenna
            .effective_height(path.vertical_angle, phi, path.emitter.frequency);
        field::dot(&he, &path.field)
    }

    /// Coherently summed received power [W], cached until the path list
    /// changes.
    pub fn received_power(&self) -> f64 {
        let mut state = self.state.lock();

        if let Some(power) = state.cached_power {
            return power;
        }

        let sum: Complex<f64> = state
            .paths
            .iter()
            .map(|p| self.path_voltage(p))
            .sum();

        let power = sum.norm_sqr() / (8.0 * self.antenna.resistance());
        state.cached_power = Some(power);
        power
    }

    /// Amplitude of a single path at the receiver terminals, used by the
    /// Rice factor.
    fn path_amplitude(&self, path: &RayPath) -> f64 {
        self.path_voltage(path).norm() / (8.0 * self.antenna.resistance()).sqrt()
    }

    /// User-end SNR [dB] for the configured noise floor.
    pub fn user_end_snr(&self, settings: &Settings) -> f64 {
        let power_dbm = crate::scene::power_to_dbm(self.received_power());
        power_dbm - settings.noise_floor_dbm()
    }

    /// True iff the number of distinct emitters contributing paths is one.
    fn has_single_source(paths: &[RayPath]) -> bool {
        let Some(first) = paths.first() else {
            return false;
        };
        paths.iter().all(|p| p.comes_from(&first.emitter))
    }

    /// RMS delay spread [s]: the largest pairwise delay difference.
    /// Defined only when exactly one emitter contributes.
    pub fn delay_spread(&self) -> Option<f64> {
        let state = self.state.lock();
        if !Self::has_single_source(&state.paths) {
            return None;
        }

        let delays = state.paths.iter().map(|p| p.delay());
        let min = delays.clone().fold(f64::INFINITY, f64::min);
        let max = delays.fold(f64::NEG_INFINITY, f64::max);
        Some(max - min)
    }

    /// Rice factor [dB]: LOS power over the total scattered power. Defined
    /// only when exactly one emitter contributes and a LOS path exists.
    pub fn rice_factor(&self) -> Option<f64> {
        let state = self.state.lock();
        if !Self::has_single_source(&state.paths) {
            return None;
        }

        let los = state.paths.iter().find(|p| p.is_line_of_sight)?;
        let a_los = self.path_amplitude(los);

        let scattered: f64 = state
            .paths
            .iter()
            .filter(|p| !p.is_line_of_sight)
            .map(|p| self.path_amplitude(p).powi(2))
            .sum();

        Some(10.0 * (a_los * a_los / scattered).log10())
    }

    /// Coverage flag: SNR minus the fade margin reaches the target, or the
    /// receiver sits in the near field where the model does not apply.
    pub fn is_covered(&self, fade_margin: f64, settings: &Settings) -> bool {
        if self.is_out_of_model() {
            return true;
        }
        self.user_end_snr(settings) - fade_margin >= settings.target_snr
    }
}
