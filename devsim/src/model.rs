//! Model components.
//!
//! A simulation bench is a tree of components. The leaves are
//! [`Atomic`] models, which carry the state, the transition functions and the
//! output function. The inner nodes are [`Coupled`] composites, which own
//! sub-components and connect their ports with three coupling relations:
//!
//! * *external input couplings* (EIC) route values received on an input port
//!   of the composite to input ports of sub-components,
//! * *internal couplings* (IC) route values produced on an output port of a
//!   sub-component to input ports of its siblings,
//! * *external output couplings* (EOC) route values produced on an output
//!   port of a sub-component to an output port of the composite.
//!
//! When several sub-components of a composite are due at the same time, the
//! composite's [`Select`] strategy decides which one fires.
//!
//! # Atomic models
//!
//! An atomic model is a state machine observed through four functions:
//!
//! * [`ta()`](Atomic::ta), the time advance: how long the model remains in
//!   its current state in the absence of input; `Duration::MAX` makes the
//!   model passive; the initial state is left at the start time unless
//!   [`initial_ta()`](Atomic::initial_ta) says otherwise,
//! * [`lambda()`](Atomic::lambda), the output function, invoked right before
//!   an internal transition,
//! * [`delta_int()`](Atomic::delta_int), the internal transition, invoked
//!   when the time advance has elapsed,
//! * [`delta_ext()`](Atomic::delta_ext), the external transition, invoked
//!   when values arrive on input ports before the time advance has elapsed.
//!
//! #### Example
//!
//! A generator that emits an increasing counter every 2 seconds:
//!
//! ```
//! use std::time::Duration;
//!
//! use devsim::model::{Atomic, PortBuffer};
//!
//! #[derive(Default)]
//! pub struct Generator {
//!     count: u64,
//! }
//!
//! impl Atomic<u64> for Generator {
//!     fn ta(&self) -> Duration {
//!         Duration::from_secs(2)
//!     }
//!     fn delta_int(&mut self) {
//!         self.count += 1;
//!     }
//!     fn delta_ext(&mut self, _elapsed: Duration, _inputs: &PortBuffer<u64>) {}
//!     fn lambda(&self, outputs: &mut PortBuffer<u64>) {
//!         outputs.put("out", self.count);
//!     }
//! }
//! ```
//!
//! # Composite models
//!
//! ```
//! # use std::time::Duration;
//! # use devsim::model::{Atomic, PortBuffer};
//! # #[derive(Default)]
//! # pub struct Generator { count: u64 }
//! # impl Atomic<u64> for Generator {
//! #     fn ta(&self) -> Duration { Duration::from_secs(2) }
//! #     fn delta_int(&mut self) { self.count += 1; }
//! #     fn delta_ext(&mut self, _: Duration, _: &PortBuffer<u64>) {}
//! #     fn lambda(&self, outputs: &mut PortBuffer<u64>) { outputs.put("out", self.count); }
//! # }
//! use devsim::model::Coupled;
//!
//! let mut bench = Coupled::new("bench");
//! let fast = bench.add_atomic("fast", Generator::default());
//! let slow = bench.add_atomic("slow", Generator::default());
//! bench.add_eoc(fast, "out", "fast_out").unwrap();
//! bench.add_eoc(slow, "out", "slow_out").unwrap();
//!
//! // Let `slow` win ties.
//! bench.set_select(move |candidates: &[devsim::model::ChildId]| {
//!     if candidates.contains(&slow) { slow } else { candidates[0] }
//! });
//! ```
use std::fmt;
use std::time::Duration;

mod coupled;
mod ports;

pub use coupled::{
    ChildId, Coupled, Coupling, CouplingKind, Endpoint, FirstDeclared, Priority, Select,
    TopologyError,
};
pub(crate) use coupled::CoupledParts;
pub use ports::PortBuffer;

/// Trait to be implemented by leaf models.
///
/// The engine owns the port buffers of every model and clears them between
/// pulses; models only read their inputs in
/// [`delta_ext()`](Atomic::delta_ext) and write their outputs in
/// [`lambda()`](Atomic::lambda).
pub trait Atomic<T>: Send {
    /// Returns the time advance of the current state.
    ///
    /// A value that cannot be added to the current simulation time, such as
    /// `Duration::MAX`, makes the model passive.
    fn ta(&self) -> Duration;

    /// Returns the time advance of the initial state, counted from the start
    /// time of the simulation.
    ///
    /// The default of zero makes every model undergo an internal transition,
    /// preceded by a call to [`lambda()`](Atomic::lambda), at the start time.
    /// Models that should instead wait for their first time advance can
    /// return [`ta()`](Atomic::ta).
    fn initial_ta(&self) -> Duration {
        Duration::ZERO
    }

    /// Internal transition.
    fn delta_int(&mut self);

    /// External transition, with the time elapsed since the last transition
    /// and the values received during this pulse.
    fn delta_ext(&mut self, elapsed: Duration, inputs: &PortBuffer<T>);

    /// Output function, invoked once right before each internal transition.
    fn lambda(&self, outputs: &mut PortBuffer<T>);

    /// Releases resources held by the model once a run has terminated.
    fn cleanup(&mut self) {}
}

/// A node of the component tree.
pub enum Component<T> {
    /// A leaf model.
    Atomic {
        /// Name of the model, used in logs.
        name: String,
        /// The model.
        model: Box<dyn Atomic<T>>,
    },
    /// A composite model.
    Coupled(Coupled<T>),
}

impl<T> Component<T> {
    /// Wraps an atomic model.
    pub fn atomic(name: impl Into<String>, model: impl Atomic<T> + 'static) -> Self {
        Self::Atomic {
            name: name.into(),
            model: Box::new(model),
        }
    }

    /// Returns the name of the component.
    pub fn name(&self) -> &str {
        match self {
            Self::Atomic { name, .. } => name,
            Self::Coupled(coupled) => coupled.name(),
        }
    }

    /// Checks whether this is a leaf model.
    pub fn is_atomic(&self) -> bool {
        matches!(self, Self::Atomic { .. })
    }
}

impl<T> From<Coupled<T>> for Component<T> {
    fn from(coupled: Coupled<T>) -> Self {
        Self::Coupled(coupled)
    }
}

impl<T> fmt::Debug for Component<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic { name, .. } => f
                .debug_struct("Atomic")
                .field("name", name)
                .finish_non_exhaustive(),
            Self::Coupled(coupled) => coupled.fmt(f),
        }
    }
}
