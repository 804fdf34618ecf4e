use std::collections::BTreeSet;
use std::fmt;

use tracing::trace;

use crate::model::{ChildId, CoupledParts, Coupling, Endpoint, PortBuffer, Select, TopologyError};
use crate::queue::{EventQueue, QueueHint};
use crate::time::{DisplayTime, MonotonicTime};

use super::processor::{self, BuildContext, Processor};
use super::SimulationError;

/// The processor bound to a composite component.
///
/// The coordinator owns one processor per sub-component and an event queue
/// holding, for each of them, exactly one entry keyed by the time of its next
/// internal event.
pub(crate) struct Coordinator<T> {
    path: String,
    children: Vec<Box<dyn Processor<T>>>,
    couplings: Vec<Coupling>,
    select: Box<dyn Select>,
    queue: Box<dyn EventQueue>,
    inputs: PortBuffer<T>,
    outputs: PortBuffer<T>,
    tole: MonotonicTime,
    tonie: MonotonicTime,
    /// Sub-components that fired or received values during the current
    /// pulse.
    influenced: BTreeSet<ChildId>,
}

impl<T: Clone + Send + 'static> Coordinator<T> {
    pub(crate) fn new(
        path: String,
        parts: CoupledParts<T>,
        context: &BuildContext,
    ) -> Result<Self, TopologyError> {
        let queue = context.queue_factory.create(QueueHint {
            component: &path,
            children: parts.children.len(),
        });
        let children = parts
            .children
            .into_iter()
            .map(|child| processor::build(child, Some(&path), context))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            path,
            children,
            couplings: parts.couplings,
            select: parts.select,
            queue,
            inputs: PortBuffer::new(),
            outputs: PortBuffer::new(),
            tole: MonotonicTime::EPOCH,
            tonie: MonotonicTime::MAX,
            influenced: BTreeSet::new(),
        })
    }
}

impl<T> Coordinator<T> {
    fn refresh_tonie(&mut self) {
        self.tonie = self.queue.min_time().unwrap_or(MonotonicTime::MAX);
    }

    /// Returns the time at which a sub-component is queued.
    #[cfg(test)]
    pub(crate) fn queued_time(&self, child: ChildId) -> Option<MonotonicTime> {
        self.queue.time_of(child)
    }

    #[cfg(test)]
    pub(crate) fn child(&self, child: ChildId) -> &dyn Processor<T> {
        &*self.children[child.0]
    }
}

impl<T: Clone + Send + 'static> Processor<T> for Coordinator<T> {
    fn path(&self) -> &str {
        &self.path
    }

    fn init(&mut self, time: MonotonicTime) -> MonotonicTime {
        for (idx, child) in self.children.iter_mut().enumerate() {
            let tonie = child.init(time);
            self.queue.requeue(ChildId(idx), tonie);
        }
        self.influenced.clear();
        self.tole = time;
        self.refresh_tonie();

        self.tonie
    }

    fn get_outputs(&mut self) -> Result<(), SimulationError> {
        let candidates = self.queue.dequeue_all();
        if candidates.is_empty() {
            return Err(SimulationError::EmptyImminentSet {
                component: self.path.clone(),
            });
        }

        let selected = self.select.select(&candidates);
        if candidates.binary_search(&selected).is_err() {
            return Err(SimulationError::InvalidSelection {
                component: self.path.clone(),
                selected,
            });
        }
        for &candidate in &candidates {
            if candidate != selected {
                self.queue.enqueue(candidate, self.tonie);
            }
        }
        trace!(
            component = %self.path,
            ?candidates,
            selected = %self.children[selected.0].path(),
            time = %DisplayTime(self.tonie),
            "selected imminent component"
        );

        let producer = &mut self.children[selected.0];
        producer.get_outputs()?;
        let produced = producer.take_outputs();

        for coupling in &self.couplings {
            let Endpoint::Child(source, source_port) = coupling.source() else {
                continue;
            };
            if *source != selected {
                continue;
            }
            match coupling.destination() {
                Endpoint::Child(destination, destination_port) => {
                    let copied = self.children[destination.0].inputs_mut().copy_from(
                        destination_port,
                        &produced,
                        source_port,
                    );
                    if copied != 0 {
                        self.influenced.insert(*destination);
                    }
                }
                Endpoint::Boundary(port) => {
                    self.outputs.copy_from(port, &produced, source_port);
                }
            }
        }
        self.influenced.insert(selected);

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

        for coupling in &self.couplings {
            let (Endpoint::Boundary(port), Endpoint::Child(destination, destination_port)) =
                (coupling.source(), coupling.destination())
            else {
                continue;
            };
            let copied = self.children[destination.0].inputs_mut().copy_from(
                destination_port,
                &self.inputs,
                port,
            );
            if copied != 0 {
                self.influenced.insert(*destination);
            }
        }
        self.inputs.clear();

        for child in std::mem::take(&mut self.influenced) {
            let tonie = self.children[child.0].do_remainder(time)?;
            self.queue.requeue(child, tonie);
        }
        self.tole = time;
        self.refresh_tonie();

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
        for child in &mut self.children {
            child.cleanup();
        }
    }
}

impl<T> fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("path", &self.path)
            .field("children", &self.children.len())
            .field("tole", &self.tole)
            .field("tonie", &self.tonie)
            .finish_non_exhaustive()
    }
}
