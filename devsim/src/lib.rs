//! A discrete-event simulation engine for hierarchical component models.
//!
//! Devsim implements the *abstract simulator* protocol of the DEVS formalism:
//! a simulation bench is a tree of components whose leaves are atomic state
//! machines and whose inner nodes are composites wiring the ports of their
//! sub-components together. The engine advances simulation time pulse by
//! pulse, from one internal event to the next, and at each pulse:
//!
//! 1. isolates the one atomic model that must fire, breaking ties between
//!    simultaneous events with a deterministic, model-supplied strategy,
//! 2. collects the outputs of that model and routes them along the couplings
//!    to the input ports of the receivers,
//! 3. executes the internal transition of the firing model and the external
//!    transitions of the receivers.
//!
//! Runs are controlled by a small state machine that can be driven from other
//! threads: a run can be paused, resumed, single-stepped or stopped between
//! two pulses.
//!
//! # A practical overview
//!
//! Simulating a system typically involves three distinct activities:
//!
//! 1. the design of atomic models for each sub-system,
//! 2. the assembly of a simulation bench from these models, performed by
//!    nesting them in composites and coupling their ports,
//! 3. the execution of the simulation, bounded by a stop policy and possibly
//!    controlled from another thread.
//!
//! ## Authoring models
//!
//! Atomic models implement the [`Atomic`](model::Atomic) trait, which is
//! generic over the type `T` of the values exchanged through ports. The
//! engine owns the [`PortBuffer`](model::PortBuffer)s of every model: outputs
//! are written in [`lambda()`](model::Atomic::lambda) and inputs read in
//! [`delta_ext()`](model::Atomic::delta_ext).
//!
//! ```
//! use std::time::Duration;
//!
//! use devsim::model::{Atomic, PortBuffer};
//!
//! /// Doubles every value it receives, after a 1s processing delay.
//! #[derive(Default)]
//! pub struct Doubler {
//!     pending: Vec<f64>,
//! }
//!
//! impl Atomic<f64> for Doubler {
//!     fn ta(&self) -> Duration {
//!         if self.pending.is_empty() {
//!             Duration::MAX
//!         } else {
//!             Duration::from_secs(1)
//!         }
//!     }
//!     fn delta_int(&mut self) {
//!         self.pending.clear();
//!     }
//!     fn delta_ext(&mut self, _elapsed: Duration, inputs: &PortBuffer<f64>) {
//!         self.pending.extend(inputs.get("in"));
//!     }
//!     fn lambda(&self, outputs: &mut PortBuffer<f64>) {
//!         outputs.extend("out", self.pending.iter().map(|v| 2.0 * v));
//!     }
//! }
//! ```
//!
//! ## Assembling a bench
//!
//! Atomic models and nested composites are added to a
//! [`Coupled`](model::Coupled) component, which returns an identifier for
//! each of them. Identifiers are then used to declare the couplings. Invalid
//! couplings, such as an internal coupling from a component to itself, are
//! rejected as soon as they are declared.
//!
//! ```
//! # use std::time::Duration;
//! # use devsim::model::{Atomic, PortBuffer};
//! # #[derive(Default)]
//! # pub struct Doubler { pending: Vec<f64> }
//! # impl Atomic<f64> for Doubler {
//! #     fn ta(&self) -> Duration { if self.pending.is_empty() { Duration::MAX } else { Duration::from_secs(1) } }
//! #     fn delta_int(&mut self) { self.pending.clear(); }
//! #     fn delta_ext(&mut self, _: Duration, inputs: &PortBuffer<f64>) { self.pending.extend(inputs.get("in")); }
//! #     fn lambda(&self, outputs: &mut PortBuffer<f64>) { outputs.extend("out", self.pending.iter().map(|v| 2.0 * v)); }
//! # }
//! use devsim::model::Coupled;
//!
//! // A chain of two doublers.
//! let mut chain = Coupled::new("chain");
//! let first = chain.add_atomic("first", Doubler::default());
//! let second = chain.add_atomic("second", Doubler::default());
//! chain.add_eic("in", first, "in").unwrap();
//! chain.add_ic(first, "out", second, "in").unwrap();
//! chain.add_eoc(second, "out", "out").unwrap();
//!
//! assert!(chain.add_ic(first, "out", first, "in").is_err());
//! ```
//!
//! ## Running simulations
//!
//! A [`SimInit`](simulation::SimInit) builder turns the top-level component
//! into a runnable processor, either the hierarchical
//! [`RootCoordinator`](simulation::RootCoordinator) or the flattened
//! [`FlatSequentialProcessor`](simulation::FlatSequentialProcessor). Both
//! implement [`RunnableProcessor`](simulation::RunnableProcessor) and execute
//! the same transitions in the same order.
//!
//! ```
//! use std::time::Duration;
//!
//! use devsim::model::{Atomic, Coupled, PortBuffer};
//! use devsim::simulation::{RunnableProcessor, SimInit};
//! use devsim::time::{MonotonicTime, StopAt};
//!
//! /// Emits 1, 2, 3... every 2s, starting immediately.
//! #[derive(Default)]
//! struct Counter(u32);
//!
//! impl Atomic<u32> for Counter {
//!     fn ta(&self) -> Duration {
//!         Duration::from_secs(2)
//!     }
//!     fn delta_int(&mut self) {
//!         self.0 += 1;
//!     }
//!     fn delta_ext(&mut self, _: Duration, _: &PortBuffer<u32>) {}
//!     fn lambda(&self, outputs: &mut PortBuffer<u32>) {
//!         outputs.put("count", self.0 + 1);
//!     }
//! }
//!
//! let mut bench = Coupled::new("bench");
//! let counter = bench.add_atomic("counter", Counter::default());
//! bench.add_eoc(counter, "count", "count").unwrap();
//!
//! let t0 = MonotonicTime::EPOCH;
//! let mut simu = SimInit::new(bench).init_flat(t0).unwrap();
//!
//! // Pulses at t=0s, 2s, 4s and 6s.
//! simu.run_until(StopAt::new(t0 + Duration::from_secs(7))).unwrap();
//!
//! let counts: Vec<_> = simu.outputs().iter().map(|event| event.value).collect();
//! assert_eq!(counts, vec![1, 2, 3, 4]);
//! assert_eq!(simu.time(), t0 + Duration::from_secs(6));
//!
//! // A stopped processor cannot be restarted.
//! assert!(simu.run().is_err());
//! ```
//!
//! ## Controlling a run
//!
//! Runs execute on the calling thread. A
//! [`ControlHandle`](control::ControlHandle) obtained beforehand can pause,
//! resume, single-step or stop the run from any other thread; requests take
//! effect between pulses. See the [`control`] module for the run status
//! state machine.
//!
//! # Logging
//!
//! The engine emits [`tracing`] events: run start and end at the `INFO`
//! level, status changes at the `DEBUG` level, and pulses, selections and
//! transitions at the `TRACE` level. No subscriber is installed by the
//! library.
#![warn(missing_docs, missing_debug_implementations, unreachable_pub)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod control;
pub mod model;
pub mod queue;
pub mod simulation;
pub mod time;
pub(crate) mod util;
