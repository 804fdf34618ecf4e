use std::fmt;

use tracing::trace;

use crate::model::{Atomic, PortBuffer};
use crate::time::{next_event_time, DisplayTime, MonotonicTime};

use super::processor::Processor;
use super::{SimulationError, Transition, TransitionKind, TransitionListener};

/// The processor bound to an atomic component.
pub(crate) struct Simulator<T> {
    path: String,
    model: Box<dyn Atomic<T>>,
    inputs: PortBuffer<T>,
    outputs: PortBuffer<T>,
    tole: MonotonicTime,
    tonie: MonotonicTime,
    imminent: bool,
    transition_listener: Option<TransitionListener>,
}

impl<T> Simulator<T> {
    pub(crate) fn new(
        path: String,
        model: Box<dyn Atomic<T>>,
        transition_listener: Option<TransitionListener>,
    ) -> Self {
        Self {
            path,
            model,
            inputs: PortBuffer::new(),
            outputs: PortBuffer::new(),
            tole: MonotonicTime::EPOCH,
            tonie: MonotonicTime::MAX,
            imminent: false,
            transition_listener,
        }
    }
}

impl<T: Send> Processor<T> for Simulator<T> {
    fn path(&self) -> &str {
        &self.path
    }

    fn init(&mut self, time: MonotonicTime) -> MonotonicTime {
        self.tole = time;
        self.tonie = next_event_time(time, self.model.initial_ta());
        self.imminent = false;

        self.tonie
    }

    fn get_outputs(&mut self) -> Result<(), SimulationError> {
        self.model.lambda(&mut self.outputs);
        self.imminent = true;

        Ok(())
    }

    fn do_remainder(&mut self, time: MonotonicTime) -> Result<MonotonicTime, SimulationError> {
        if time < self.tole || time > self.tonie {
            return Err(SimulationError::TimeOutOfRange {
                component: self.path.clone(),
                time,
                tole: self.tole,
                tonie: self.tonie,
            });
        }

        // An imminent model only undergoes its internal transition, even if
        // it also received values during this pulse.
        let kind = if self.imminent {
            self.imminent = false;
            self.model.delta_int();
            TransitionKind::Internal
        } else {
            self.model.delta_ext(time.duration_since(self.tole), &self.inputs);
            TransitionKind::External
        };
        self.inputs.clear();
        self.tole = time;
        self.tonie = next_event_time(time, self.model.ta());

        trace!(
            component = %self.path,
            ?kind,
            time = %DisplayTime(time),
            tonie = %DisplayTime(self.tonie),
            "transition"
        );
        if let Some(listener) = &self.transition_listener {
            listener(&Transition {
                time,
                component: &self.path,
                kind,
            });
        }

        Ok(self.tonie)
    }

    fn tole(&self) -> MonotonicTime {
        self.tole
    }

    fn tonie(&self) -> MonotonicTime {
        self.tonie
    }

    fn inputs_mut(&mut self) -> &mut PortBuffer<T> {
        &mut self.inputs
    }

    fn take_outputs(&mut self) -> PortBuffer<T> {
        std::mem::take(&mut self.outputs)
    }

    fn cleanup(&mut self) {
        self.model.cleanup();
    }
}

impl<T> fmt::Debug for Simulator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("path", &self.path)
            .field("tole", &self.tole)
            .field("tonie", &self.tonie)
            .finish_non_exhaustive()
    }
}
