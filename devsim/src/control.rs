//! Run control.
//!
//! An [`ExecutionControl`] turns any [`Runnable`] processor into a
//! controllable run: it repeatedly asks the processor to execute its next
//! pulse until a [`StopPolicy`] is satisfied, and lets other threads pause,
//! resume, single-step or stop the run through a cloneable [`ControlHandle`].
//!
//! Control requests only take effect between pulses: a pulse that has started
//! always completes. While paused, the run thread blocks on a condition
//! variable rather than spinning.
//!
//! # Run status
//!
//! ```text
//!            run()                  pause()
//! Initial ─────────▶ Running ◀──────────────▶ Pausing ◀──┐
//!    │                  │                     │  ▲       │ steps
//!    │ stop()           │ stop()       next(n)│  │done   │ left
//!    ▼                  ▼                     ▼  │       │
//! Stopped ◀──────── Stopping ◀──────────── Stepping ─────┘
//! ```
//!
//! A run also ends, going through `Stopped`, when its stop policy is
//! satisfied, when the processor has no further pulse to execute, or when a
//! pulse fails. A stopped control cannot be restarted.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::time::{DisplayTime, MonotonicTime, Progress, StopPolicy};

/// The status of a run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// The run has not started yet.
    Initial,
    /// Pulses are being executed.
    Running,
    /// The run is suspended between two pulses.
    Pausing,
    /// The run is suspended but executes a limited number of pulses.
    Stepping,
    /// A stop was requested; the in-flight pulse is completing.
    Stopping,
    /// The run has terminated.
    Stopped,
}

/// A violation of the run control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// `run` was called while a run is in progress.
    #[error("the processor is already running")]
    AlreadyRunning,
    /// `run` was called after the run was stopped or had terminated.
    #[error("a stopped processor cannot restart")]
    CannotRestart,
    /// `next` was called while the run is not paused.
    #[error("steps can only be requested while paused")]
    NotPaused,
    /// `pause` was called before the run started.
    #[error("the run has not started")]
    NotStarted,
    /// `pause` was called after a stop.
    #[error("the run was stopped")]
    Stopped,
}

/// A processor that can be driven pulse by pulse.
pub trait Runnable {
    /// The error returned by a failed pulse.
    type Error: From<ControlError>;

    /// Executes one pulse.
    fn execute_next_step(&mut self) -> Result<(), Self::Error>;

    /// Returns the current progress of the processor.
    fn progress(&self) -> Progress;

    /// Checks whether no further pulse can take place.
    fn is_exhausted(&self) -> bool {
        self.progress().next_time == MonotonicTime::MAX
    }

    /// Checks whether the processor paces itself, in which case an
    /// artificial inter-pulse delay is not applied.
    fn is_fixed_pace(&self) -> bool {
        false
    }

    /// Releases resources once the run has terminated.
    fn cleanup(&mut self) {}
}

/// Options of a single run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Wall-clock delay between two pulses, overriding the delay currently
    /// set on the control if specified.
    pub delay: Option<Duration>,
    /// Whether the run starts paused.
    pub start_paused: bool,
}

impl RunOptions {
    /// Options of a run starting immediately without delay override.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the inter-pulse delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);

        self
    }

    /// Makes the run start paused.
    pub fn paused(mut self) -> Self {
        self.start_paused = true;

        self
    }
}

type StatusListener = Arc<dyn Fn(RunStatus) + Send + Sync>;

struct State {
    status: RunStatus,
    pending_steps: u64,
    delay: Duration,
}

struct Shared {
    state: Mutex<State>,
    gate: Condvar,
    listeners: Mutex<Vec<StatusListener>>,
}

/// A thread-safe handle to an [`ExecutionControl`].
///
/// All methods are non-blocking and take effect at the next pulse boundary.
#[derive(Clone)]
pub struct ControlHandle {
    shared: Arc<Shared>,
}

impl ControlHandle {
    fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    status: RunStatus::Initial,
                    pending_steps: 0,
                    delay: Duration::ZERO,
                }),
                gate: Condvar::new(),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> RunStatus {
        self.lock().status
    }

    /// Checks whether a run is in progress, paused or not.
    pub fn is_running(&self) -> bool {
        matches!(
            self.status(),
            RunStatus::Running | RunStatus::Pausing | RunStatus::Stepping
        )
    }

    /// Checks whether the run is paused, possibly executing requested steps.
    pub fn is_pausing(&self) -> bool {
        matches!(self.status(), RunStatus::Pausing | RunStatus::Stepping)
    }

    /// Checks whether a stop was requested or the run has terminated.
    pub fn is_stopping(&self) -> bool {
        matches!(self.status(), RunStatus::Stopping | RunStatus::Stopped)
    }

    /// Pauses a running run, or resumes a paused one.
    ///
    /// Resuming drops the steps requested with [`next()`](Self::next) that
    /// have not been executed yet.
    pub fn pause(&self) -> Result<(), ControlError> {
        self.update(|state| match state.status {
            RunStatus::Running => Ok(Some(RunStatus::Pausing)),
            RunStatus::Pausing | RunStatus::Stepping => {
                state.pending_steps = 0;
                Ok(Some(RunStatus::Running))
            }
            RunStatus::Initial => Err(ControlError::NotStarted),
            RunStatus::Stopping | RunStatus::Stopped => Err(ControlError::Stopped),
        })
    }

    /// Requests the run to stop after the in-flight pulse, if any.
    ///
    /// Stopping is irrevocable and also ends a paused run. Stopping a run
    /// that has not started prevents it from ever starting.
    pub fn stop(&self) {
        // Stopping never fails.
        let _ = self.update(|state| {
            state.pending_steps = 0;
            Ok(match state.status {
                RunStatus::Initial => Some(RunStatus::Stopped),
                RunStatus::Running | RunStatus::Pausing | RunStatus::Stepping => {
                    Some(RunStatus::Stopping)
                }
                RunStatus::Stopping | RunStatus::Stopped => None,
            })
        });
    }

    /// Executes up to `steps` additional pulses of a paused run, which then
    /// pauses again.
    pub fn next(&self, steps: u64) -> Result<(), ControlError> {
        self.update(|state| match state.status {
            RunStatus::Pausing | RunStatus::Stepping => {
                state.pending_steps += steps;
                if state.pending_steps > 0 && state.status == RunStatus::Pausing {
                    return Ok(Some(RunStatus::Stepping));
                }
                Ok(None)
            }
            _ => Err(ControlError::NotPaused),
        })
    }

    /// Sets the wall-clock delay between two pulses.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Returns the wall-clock delay between two pulses.
    pub fn delay(&self) -> Duration {
        self.lock().delay
    }

    /// Registers a listener called after each status change.
    ///
    /// Listeners are called from the thread that caused the change, without
    /// any internal lock held.
    pub fn on_status_change(&self, listener: impl Fn(RunStatus) + Send + Sync + 'static) {
        self.shared.listeners.lock().unwrap().push(Arc::new(listener));
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.shared.state.lock().unwrap()
    }

    /// Applies a state transition, then wakes up the run thread and calls the
    /// listeners if the status changed.
    fn update(
        &self,
        transition: impl FnOnce(&mut State) -> Result<Option<RunStatus>, ControlError>,
    ) -> Result<(), ControlError> {
        let changed = {
            let mut state = self.lock();
            let new_status = transition(&mut state)?;
            match new_status {
                Some(status) if status != state.status => {
                    state.status = status;
                    Some(status)
                }
                _ => None,
            }
        };
        self.shared.gate.notify_all();
        if let Some(status) = changed {
            self.notify(status);
        }

        Ok(())
    }

    fn notify(&self, status: RunStatus) {
        debug!(?status, "run status changed");
        let listeners = self.shared.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(status);
        }
    }
}

impl fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ControlHandle")
            .field("status", &state.status)
            .field("pending_steps", &state.pending_steps)
            .field("delay", &state.delay)
            .finish()
    }
}

/// The outcome of waiting at the pulse gate.
enum Gate {
    Proceed { stepping: bool },
    Stop,
}

/// The run loop of a [`Runnable`] processor.
///
/// Each `ExecutionControl` drives at most one run.
pub struct ExecutionControl<R> {
    handle: ControlHandle,
    stopped_listeners: Vec<Box<dyn FnMut(&R) + Send>>,
}

impl<R: Runnable> ExecutionControl<R> {
    /// Creates a control in the [`RunStatus::Initial`] status.
    pub fn new() -> Self {
        Self {
            handle: ControlHandle::new(),
            stopped_listeners: Vec::new(),
        }
    }

    /// Returns a handle to control the run from any thread.
    pub fn handle(&self) -> &ControlHandle {
        &self.handle
    }

    /// Registers a listener called with the processor when its run
    /// terminates.
    pub fn on_stopped(&mut self, listener: impl FnMut(&R) + Send + 'static) {
        self.stopped_listeners.push(Box::new(listener));
    }

    /// Runs the processor on the current thread until the stop policy is
    /// satisfied, the processor is exhausted, a pulse fails or a stop is
    /// requested.
    ///
    /// Once the run has terminated, the stopped listeners are called, the
    /// status becomes [`RunStatus::Stopped`] and the processor is asked to
    /// release its resources.
    pub fn run(
        &mut self,
        owner: &mut R,
        policy: &mut dyn StopPolicy,
        options: RunOptions,
    ) -> Result<(), R::Error> {
        let initial_status = if options.start_paused {
            RunStatus::Pausing
        } else {
            RunStatus::Running
        };
        self.handle.update(|state| match state.status {
            RunStatus::Initial => {
                if let Some(delay) = options.delay {
                    state.delay = delay;
                }
                Ok(Some(initial_status))
            }
            RunStatus::Running | RunStatus::Pausing | RunStatus::Stepping => {
                Err(ControlError::AlreadyRunning)
            }
            RunStatus::Stopping | RunStatus::Stopped => Err(ControlError::CannotRestart),
        })?;

        let start = owner.progress();
        info!(
            time = %DisplayTime(start.time),
            paused = options.start_paused,
            "run started"
        );

        let result = self.run_loop(owner, policy);

        for listener in &mut self.stopped_listeners {
            listener(owner);
        }
        let _ = self.handle.update(|_| Ok(Some(RunStatus::Stopped)));
        owner.cleanup();

        let end = owner.progress();
        info!(
            time = %DisplayTime(end.time),
            pulses = end.pulses - start.pulses,
            failed = result.is_err(),
            "run stopped"
        );

        result
    }

    fn run_loop(&self, owner: &mut R, policy: &mut dyn StopPolicy) -> Result<(), R::Error> {
        let fixed_pace = owner.is_fixed_pace();
        let mut delay_warned = false;

        loop {
            let stepping = match self.wait_at_gate() {
                Gate::Stop => return Ok(()),
                Gate::Proceed { stepping } => stepping,
            };
            if owner.is_exhausted() || policy.has_reached_end(&owner.progress()) {
                return Ok(());
            }

            owner.execute_next_step()?;

            if stepping {
                let _ = self.handle.update(|state| {
                    Ok((state.status == RunStatus::Stepping && state.pending_steps == 0)
                        .then_some(RunStatus::Pausing))
                });
                continue;
            }

            let delay = self.handle.delay();
            if delay.is_zero() {
                continue;
            }
            if fixed_pace {
                if !delay_warned {
                    warn!(
                        ?delay,
                        "inter-pulse delay ignored: the processor is fixed-pace"
                    );
                    delay_warned = true;
                }
                continue;
            }
            self.sleep(delay);
        }
    }

    /// Blocks while the run is paused and consumes one step if stepping.
    fn wait_at_gate(&self) -> Gate {
        let mut state = self.handle.lock();
        while state.status == RunStatus::Pausing {
            state = self.handle.shared.gate.wait(state).unwrap();
        }
        match state.status {
            RunStatus::Stepping => {
                state.pending_steps -= 1;
                Gate::Proceed { stepping: true }
            }
            RunStatus::Stopping | RunStatus::Stopped => Gate::Stop,
            _ => Gate::Proceed { stepping: false },
        }
    }

    /// Waits for the inter-pulse delay, returning early if the run leaves the
    /// running status.
    fn sleep(&self, delay: Duration) {
        let Some(deadline) = Instant::now().checked_add(delay) else {
            warn!(?delay, "inter-pulse delay cannot be represented and was skipped");
            return;
        };
        let mut state = self.handle.lock();
        while state.status == RunStatus::Running {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = self
                .handle
                .shared
                .gate
                .wait_timeout(state, deadline - now)
                .unwrap()
                .0;
        }
    }
}

impl<R: Runnable> Default for ExecutionControl<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ExecutionControl<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionControl")
            .field("handle", &self.handle)
            .field("stopped_listeners", &self.stopped_listeners.len())
            .finish()
    }
}
