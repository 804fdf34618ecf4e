use std::fmt;

use tracing::trace;

use crate::control::{ExecutionControl, Runnable};
use crate::time::{DisplayTime, MonotonicTime, Progress};

use super::processor::Processor;
use super::{collect_outputs, OutputEvent, RunnableProcessor, SimulationError};

/// The pulse engine of a [`RootCoordinator`].
///
/// A reference to the engine is passed to the listeners registered with
/// [`RootCoordinator::on_stopped()`].
pub struct RootCore<T> {
    top: Box<dyn Processor<T>>,
    tole: MonotonicTime,
    tonie: MonotonicTime,
    pulses: u64,
    outputs: Vec<OutputEvent<T>>,
    fixed_pace: bool,
}

impl<T> RootCore<T> {
    /// Time of the last pulse, or the start time if no pulse took place.
    pub fn time(&self) -> MonotonicTime {
        self.tole
    }

    /// Time of the next pulse, or [`MonotonicTime::MAX`] if the top-level
    /// component is passive.
    pub fn next_time(&self) -> MonotonicTime {
        self.tonie
    }

    /// Number of pulses executed so far.
    pub fn pulse_count(&self) -> u64 {
        self.pulses
    }

    /// Values that left the top-level component, in production order.
    pub fn outputs(&self) -> &[OutputEvent<T>] {
        &self.outputs
    }
}

impl<T> Runnable for RootCore<T> {
    type Error = SimulationError;

    fn execute_next_step(&mut self) -> Result<(), SimulationError> {
        let time = self.tonie;
        trace!(time = %DisplayTime(time), pulse = self.pulses, "pulse");

        self.top.get_outputs()?;
        collect_outputs(&mut self.outputs, time, self.top.take_outputs());
        self.tonie = self.top.do_remainder(time)?;
        self.tole = time;
        self.pulses += 1;

        Ok(())
    }

    fn progress(&self) -> Progress {
        Progress {
            time: self.tole,
            next_time: self.tonie,
            pulses: self.pulses,
        }
    }

    fn is_fixed_pace(&self) -> bool {
        self.fixed_pace
    }

    fn cleanup(&mut self) {
        self.top.cleanup();
    }
}

impl<T> fmt::Debug for RootCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCore")
            .field("top", &self.top.path())
            .field("time", &self.tole)
            .field("next_time", &self.tonie)
            .field("pulses", &self.pulses)
            .finish_non_exhaustive()
    }
}

/// The top-of-tree driver of a hierarchical processor tree.
///
/// A `RootCoordinator` is built with
/// [`SimInit::init()`](crate::simulation::SimInit::init) and executed with the
/// methods of [`RunnableProcessor`].
pub struct RootCoordinator<T> {
    core: RootCore<T>,
    control: ExecutionControl<RootCore<T>>,
}

impl<T> RootCoordinator<T> {
    /// Binds the top processor and seeds the clock from its initial
    /// schedule.
    pub(crate) fn new(
        mut top: Box<dyn Processor<T>>,
        start_time: MonotonicTime,
        fixed_pace: bool,
    ) -> Self {
        let tonie = top.init(start_time);

        Self {
            core: RootCore {
                top,
                tole: start_time,
                tonie,
                pulses: 0,
                outputs: Vec::new(),
                fixed_pace,
            },
            control: ExecutionControl::new(),
        }
    }

    /// Registers a listener called with the engine when the run terminates.
    pub fn on_stopped(&mut self, listener: impl FnMut(&RootCore<T>) + Send + 'static) {
        self.control.on_stopped(listener);
    }

    /// Time of the last pulse, or the start time if no pulse took place.
    pub fn time(&self) -> MonotonicTime {
        self.core.time()
    }

    /// Time of the next pulse, or [`MonotonicTime::MAX`] if the top-level
    /// component is passive.
    pub fn next_time(&self) -> MonotonicTime {
        self.core.next_time()
    }

    /// Number of pulses executed so far.
    pub fn pulse_count(&self) -> u64 {
        self.core.pulse_count()
    }

    /// Values that left the top-level component, in production order.
    pub fn outputs(&self) -> &[OutputEvent<T>] {
        self.core.outputs()
    }

    /// Removes and returns the values that left the top-level component.
    pub fn take_outputs(&mut self) -> Vec<OutputEvent<T>> {
        std::mem::take(&mut self.core.outputs)
    }
}

impl<T> RunnableProcessor for RootCoordinator<T> {
    type Engine = RootCore<T>;

    fn parts(&mut self) -> (&mut RootCore<T>, &mut ExecutionControl<RootCore<T>>) {
        (&mut self.core, &mut self.control)
    }

    fn control(&self) -> &ExecutionControl<RootCore<T>> {
        &self.control
    }
}

impl<T> fmt::Debug for RootCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootCoordinator")
            .field("core", &self.core)
            .field("control", &self.control)
            .finish()
    }
}
