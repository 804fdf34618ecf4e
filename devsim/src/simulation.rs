//! Simulation management.
//!
//! This module contains most notably the [`SimInit`] builder, the two
//! runnable processors [`RootCoordinator`] and [`FlatSequentialProcessor`],
//! the [`RunnableProcessor`] contract they share, and the [`SimulationError`]
//! type.
//!
//! # Simulation lifecycle
//!
//! The lifecycle of a simulation bench typically comprises the following
//! stages:
//!
//! 1. instantiation of atomic models and of the [`Coupled`] composites that
//!    own and connect them,
//! 2. instantiation of a [`SimInit`] builder from the top-level component and
//!    configuration of the event queues, pacing and observers,
//! 3. construction of a processor tree with [`SimInit::init()`] (hierarchical
//!    abstract simulator) or [`SimInit::init_flat()`] (flattened strategy),
//! 4. execution with [`RunnableProcessor::run()`] or one of its variants,
//!    possibly controlled from other threads through a [`ControlHandle`].
//!
//! A processor tree serves a single run: once stopped, a processor cannot be
//! restarted and a new one must be built.
//!
//! # Pulses
//!
//! Each pulse takes place at the time of the earliest scheduled internal
//! event and comprises two phases:
//!
//! 1. the imminent atomic model is isolated, using the [`Select`] strategy of
//!    each composite on the way down to break ties, and its output function
//!    is invoked; the produced values are copied along the couplings into
//!    the input buffers of the receivers,
//! 2. the imminent model undergoes its internal transition and every model
//!    that received values undergoes its external transition, in tree
//!    preorder.
//!
//! All outputs of a pulse are thus produced before any transition of the
//! same pulse is executed.
//!
//! Imminent models that were not selected keep their schedule and are
//! reconsidered at the next pulse, which takes place at the same simulation
//! time.
//!
//! [`Coupled`]: crate::model::Coupled
//! [`Select`]: crate::model::Select
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use devsim::model::{Atomic, Coupled, PortBuffer};
//! use devsim::simulation::{RunnableProcessor, SimInit};
//! use devsim::time::{MonotonicTime, StopAt};
//!
//! struct Clock;
//!
//! impl Atomic<&'static str> for Clock {
//!     fn ta(&self) -> Duration {
//!         Duration::from_secs(5)
//!     }
//!     fn delta_int(&mut self) {}
//!     fn delta_ext(&mut self, _: Duration, _: &PortBuffer<&'static str>) {}
//!     fn lambda(&self, outputs: &mut PortBuffer<&'static str>) {
//!         outputs.put("tick", "tick");
//!     }
//! }
//!
//! let mut bench = Coupled::new("bench");
//! let clock = bench.add_atomic("clock", Clock);
//! bench.add_eoc(clock, "tick", "tick").unwrap();
//!
//! let t0 = MonotonicTime::EPOCH;
//! let mut simu = SimInit::new(bench).init(t0).unwrap();
//! simu.run_until(StopAt::new(t0 + Duration::from_secs(12))).unwrap();
//!
//! // Pulses took place at t=0s, t=5s and t=10s.
//! assert_eq!(simu.pulse_count(), 3);
//! assert_eq!(simu.outputs().len(), 3);
//! assert_eq!(simu.next_time(), t0 + Duration::from_secs(15));
//! ```
mod coordinator;
mod flat;
mod processor;
mod root;
mod sim_init;
mod simulator;

use std::sync::Arc;
use std::time::Duration;

pub use flat::{
    CouplingForwarding, Destination, EventForwarding, FlatCore, FlatSequentialProcessor,
    FlatTopology, NodeId, Route,
};
pub use root::{RootCore, RootCoordinator};
pub use sim_init::SimInit;

use crate::control::{
    ControlError, ControlHandle, ExecutionControl, RunOptions, RunStatus, Runnable,
};
use crate::model::{ChildId, TopologyError};
use crate::time::{DisplayTime, MonotonicTime, NeverStop, StopPolicy};

/// An error that ends a run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SimulationError {
    /// The run control protocol was violated.
    #[error(transparent)]
    Control(#[from] ControlError),
    /// The component tree is invalid.
    #[error(transparent)]
    Topology(#[from] TopologyError),
    /// A tie-break strategy returned a sub-component that was not imminent.
    #[error("component `{component}` selected sub-component {selected}, which is not imminent")]
    InvalidSelection {
        /// Path of the composite.
        component: String,
        /// The invalid selection.
        selected: ChildId,
    },
    /// A composite was asked for outputs while none of its sub-components is
    /// scheduled.
    #[error("component `{component}` has no imminent sub-component")]
    EmptyImminentSet {
        /// Path of the composite.
        component: String,
    },
    /// A transition was requested at a time preceding the last event or
    /// exceeding the next internal event of a component.
    #[error(
        "component `{component}` cannot transition at t={}: last event at t={}, next internal event at t={}",
        DisplayTime::of(.time),
        DisplayTime::of(.tole),
        DisplayTime::of(.tonie)
    )]
    TimeOutOfRange {
        /// Path of the component.
        component: String,
        /// The requested time.
        time: MonotonicTime,
        /// Time of the last event.
        tole: MonotonicTime,
        /// Time of the next internal event.
        tonie: MonotonicTime,
    },
}

/// A value that left the top-level component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputEvent<T> {
    /// Simulation time of the pulse that produced the value.
    pub time: MonotonicTime,
    /// Output port of the top-level component.
    pub port: String,
    /// The value.
    pub value: T,
}

/// The kind of a transition undergone by an atomic model.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TransitionKind {
    /// Internal transition of an imminent model.
    Internal,
    /// External transition of a model that received values.
    External,
}

/// A record of a transition undergone by an atomic model.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Transition<'a> {
    /// Simulation time of the transition.
    pub time: MonotonicTime,
    /// Path of the model, such as `top/sub/leaf`.
    pub component: &'a str,
    /// Kind of transition.
    pub kind: TransitionKind,
}

pub(crate) type TransitionListener = Arc<dyn Fn(&Transition<'_>) + Send + Sync>;

/// The run contract of a processor driven by an [`ExecutionControl`].
///
/// Implementors only provide access to their pulse engine and to their
/// control; all other methods are provided. The control methods that take
/// `&self` can equally be called on a [`ControlHandle`] obtained with
/// [`handle()`](RunnableProcessor::handle) from any thread while the
/// processor runs.
pub trait RunnableProcessor {
    /// The pulse engine.
    type Engine: Runnable;

    /// Returns the pulse engine and its control, borrowed separately.
    fn parts(&mut self) -> (&mut Self::Engine, &mut ExecutionControl<Self::Engine>);

    /// Returns the control.
    fn control(&self) -> &ExecutionControl<Self::Engine>;

    /// Runs until the top-level component becomes passive or a stop is
    /// requested.
    fn run(&mut self) -> Result<(), <Self::Engine as Runnable>::Error> {
        self.run_with(&mut NeverStop, RunOptions::default())
    }

    /// Runs until the stop policy is satisfied, the top-level component
    /// becomes passive or a stop is requested.
    fn run_until(
        &mut self,
        mut policy: impl StopPolicy,
    ) -> Result<(), <Self::Engine as Runnable>::Error>
    where
        Self: Sized,
    {
        self.run_with(&mut policy, RunOptions::default())
    }

    /// Runs with an inter-pulse delay and an optional initial pause.
    fn run_with(
        &mut self,
        policy: &mut dyn StopPolicy,
        options: RunOptions,
    ) -> Result<(), <Self::Engine as Runnable>::Error> {
        let (engine, control) = self.parts();

        control.run(engine, policy, options)
    }

    /// Returns a handle to control the run from any thread.
    fn handle(&self) -> ControlHandle {
        self.control().handle().clone()
    }

    /// Executes up to `steps` pulses of a paused run.
    fn next(&self, steps: u64) -> Result<(), ControlError> {
        self.control().handle().next(steps)
    }

    /// Pauses a running run, or resumes a paused one.
    fn pause(&self) -> Result<(), ControlError> {
        self.control().handle().pause()
    }

    /// Requests the run to stop after the in-flight pulse.
    fn stop(&self) {
        self.control().handle().stop()
    }

    /// Sets the wall-clock delay between two pulses.
    fn set_delay(&self, delay: Duration) {
        self.control().handle().set_delay(delay)
    }

    /// Checks whether a run is in progress, paused or not.
    fn is_running(&self) -> bool {
        self.control().handle().is_running()
    }

    /// Checks whether the run is paused.
    fn is_pausing(&self) -> bool {
        self.control().handle().is_pausing()
    }

    /// Checks whether a stop was requested or the run has terminated.
    fn is_stopping(&self) -> bool {
        self.control().handle().is_stopping()
    }

    /// Returns the current run status.
    fn status(&self) -> RunStatus {
        self.control().handle().status()
    }
}

/// Collects the values posted on the output ports of the top-level
/// component during a pulse.
fn collect_outputs<T>(
    sink: &mut Vec<OutputEvent<T>>,
    time: MonotonicTime,
    outputs: crate::model::PortBuffer<T>,
) {
    for (port, values) in outputs {
        sink.extend(values.into_iter().map(|value| OutputEvent {
            time,
            port: port.clone(),
            value,
        }));
    }
}
