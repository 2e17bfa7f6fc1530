use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver as EventReceiver, Sender};
use log::{debug, info};
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::emitter::Emitter;
use crate::geometry::Rect;
use crate::receiver::Receiver;
use crate::scene::Building;
use crate::settings::{ConfigError, Settings, BATCH_SIZE};
use crate::tracer::Tracer;
use crate::walls;


/// Events emitted over the run lifecycle. A run ends with exactly one of
/// `Finished` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimulationEvent {
    Started,
    /// Completed fraction in [0, 1], non-decreasing.
    Progress(f64),
    Finished,
    Cancelled,
}

/// Everything one run needs; geometry is frozen from here on.
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub buildings: Vec<Building>,
    pub emitters: Vec<Arc<Emitter>>,
    pub receivers: Vec<Arc<Receiver>>,
    /// Bounded simulation area; walls on its boundary are dropped.
    pub area: Option<Rect>,
    /// When false, previous contributions are kept (incremental mode,
    /// used by the optimizer with a singleton emitter list).
    pub reset: bool,
}

/// Progress accounting, guarded by one lock so the decrement and the
/// all-done check stay atomic together.
struct ProgressCounter {
    pending: usize,
    initial: usize,
}

struct HandlerState {
    running: AtomicBool,
    cancelling: AtomicBool,
    done: AtomicBool,
    progress: Mutex<ProgressCounter>,
}

/// Launches, tracks and cancels simulation runs.
///
/// The submitter never blocks: `start_simulation` validates, spawns a
/// worker that drives a rayon pool over receiver batches, and returns.
/// Completion is observed through the event channel.
pub struct SimulationHandler {
    settings: Settings,
    state: Arc<HandlerState>,
    events_in: Sender<SimulationEvent>,
    events_out: EventReceiver<SimulationEvent>,
}

impl SimulationHandler {
    pub fn new(settings: Settings) -> Self {
        let (events_in, events_out) = unbounded();
        Self {
            settings,
            state: Arc::new(HandlerState {
                running: AtomicBool::new(false),
                cancelling: AtomicBool::new(false),
                done: AtomicBool::new(false),
                progress: Mutex::new(ProgressCounter {
                    pending: 0,
                    initial: 0,
                }),
            }),
            events_in,
            events_out,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A receiving handle on the event stream. Clones share the same queue.
    pub fn events(&self) -> EventReceiver<SimulationEvent> {
        self.events_out.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    pub fn is_cancelling(&self) -> bool {
        self.state.cancelling.load(Ordering::Acquire)
    }

    pub fn is_done(&self) -> bool {
        self.state.done.load(Ordering::Acquire)
    }

    /// Requests cooperative cancellation: queued batches are skipped,
    /// in-flight batches finish, then the run drains and reports
    /// `Cancelled`.
    pub fn cancel_simulation(&self) {
        if self.is_running() {
            self.state.cancelling.store(true, Ordering::Release);
        }
    }

    /// Validates and launches a run. On a configuration error nothing is
    /// started and no event is emitted.
    pub fn start_simulation(&self, run: SimulationRun) -> Result<(), ConfigError> {
        self.settings.validate()?;
        if run.emitters.is_empty() {
            return Err(ConfigError::NoEmitters);
        }
        for emitter in &run.emitters {
            emitter.validate()?;
        }

        // Claim the handler; a drained previous run is required
        if self
            .state
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ConfigError::AlreadyRunning);
        }

        if run.reset {
            for receiver in &run.receivers {
                receiver.reset();
            }
        }

        let walls = walls::derive_walls_with_permittivity(
            &run.buildings,
            run.area.as_ref(),
            self.settings.relative_permittivity,
        );
        let corners = walls::derive_corners(&walls);
        info!(
            "starting run: {} walls, {} corners, {} emitters, {} receivers",
            walls.len(),
            corners.len(),
            run.emitters.len(),
            run.receivers.len()
        );

        let batches: Vec<Vec<Arc<Receiver>>> = run
            .receivers
            .chunks(BATCH_SIZE)
            .map(|c| c.to_vec())
            .collect();
        let unit_count = batches.len();
        debug!("partitioned into {} work units", unit_count);

        {
            let mut progress = self.state.progress.lock();
            progress.pending = unit_count;
            progress.initial = unit_count;
        }
        self.state.cancelling.store(false, Ordering::Release);
        self.state.done.store(false, Ordering::Release);

        let _ = self.events_in.send(SimulationEvent::Started);

        let state = Arc::clone(&self.state);
        let events = self.events_in.clone();
        let settings = self.settings.clone();
        let emitters = run.emitters;
        let receivers = run.receivers;

        std::thread::spawn(move || {
            let tracer = Tracer::new(&walls, &corners, &settings);

            batches.par_iter().for_each(|batch| {
                // Cancellation is observed at the batch boundary only
                if !state.cancelling.load(Ordering::Acquire) {
                    for receiver in batch {
                        tracer.trace_receiver(&emitters, receiver);
                    }
                }

                {
                    // Decrement and emit under the same lock so observers
                    // never see the fraction go backwards
                    let mut progress = state.progress.lock();
                    progress.pending -= 1;
                    let fraction = 1.0 - progress.pending as f64 / progress.initial as f64;
                    let _ = events.send(SimulationEvent::Progress(fraction));
                }
            });

            // Drained: either complete or cancelled, never both
            if state.cancelling.load(Ordering::Acquire) {
                // No partial results survive a cancelled run
                for receiver in &receivers {
                    receiver.reset();
                }
                state.cancelling.store(false, Ordering::Release);
                state.done.store(true, Ordering::Release);
                state.running.store(false, Ordering::Release);
                let _ = events.send(SimulationEvent::Cancelled);
                info!("run cancelled and drained");
            } else {
                state.done.store(true, Ordering::Release);
                state.running.store(false, Ordering::Release);
                let _ = events.send(SimulationEvent::Finished);
                info!("run finished");
            }
        });

        Ok(())
    }
}
