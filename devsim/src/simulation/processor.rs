use std::collections::HashSet;
use std::sync::Arc;

use crate::model::{Component, CoupledParts, PortBuffer, TopologyError};
use crate::queue::EventQueueFactory;
use crate::time::MonotonicTime;

use super::coordinator::Coordinator;
use super::simulator::Simulator;
use super::{SimulationError, TransitionListener};

/// The abstract simulator protocol, implemented by [`Simulator`] for atomic
/// components and by [`Coordinator`] for composites.
///
/// A pulse always calls [`get_outputs()`](Processor::get_outputs) on the
/// imminent processor before calling
/// [`do_remainder()`](Processor::do_remainder) on it and on the processors
/// that received values.
pub(crate) trait Processor<T>: Send {
    /// Path of the bound component.
    fn path(&self) -> &str;

    /// Sets the time of the last event and returns the time of the next
    /// internal event.
    fn init(&mut self, time: MonotonicTime) -> MonotonicTime;

    /// Produces the outputs of the imminent component.
    fn get_outputs(&mut self) -> Result<(), SimulationError>;

    /// Executes the transitions due at `time` and returns the time of the
    /// next internal event.
    fn do_remainder(&mut self, time: MonotonicTime) -> Result<MonotonicTime, SimulationError>;

    /// Time of the last event.
    fn tole(&self) -> MonotonicTime;

    /// Time of the next internal event.
    fn tonie(&self) -> MonotonicTime;

    /// Input buffer of the bound component.
    fn inputs_mut(&mut self) -> &mut PortBuffer<T>;

    /// Removes and returns the outputs produced by the last call to
    /// [`get_outputs()`](Processor::get_outputs).
    fn take_outputs(&mut self) -> PortBuffer<T>;

    /// Asks all atomic models to release their resources.
    fn cleanup(&mut self);
}

/// Settings shared by all processors of a tree.
pub(crate) struct BuildContext {
    pub(crate) queue_factory: Arc<dyn EventQueueFactory>,
    pub(crate) transition_listener: Option<TransitionListener>,
}

/// Recursively builds the processor bound to a component.
pub(crate) fn build<T: Clone + Send + 'static>(
    component: Component<T>,
    parent_path: Option<&str>,
    context: &BuildContext,
) -> Result<Box<dyn Processor<T>>, TopologyError> {
    let path = match parent_path {
        Some(parent_path) => format!("{parent_path}/{}", component.name()),
        None => component.name().to_owned(),
    };

    match component {
        Component::Atomic { model, .. } => Ok(Box::new(Simulator::new(
            path,
            model,
            context.transition_listener.clone(),
        ))),
        Component::Coupled(coupled) => {
            let parts = coupled.into_parts();
            check_unique_names(&parts)?;
            Ok(Box::new(Coordinator::new(path, parts, context)?))
        }
    }
}

/// Checks that the sub-components of a composite have distinct names, so
/// that component paths are unambiguous.
pub(crate) fn check_unique_names<T>(parts: &CoupledParts<T>) -> Result<(), TopologyError> {
    let mut names = HashSet::new();
    for child in &parts.children {
        if !names.insert(child.name()) {
            return Err(TopologyError::DuplicateName {
                component: parts.name.clone(),
                child: child.name().to_owned(),
            });
        }
    }

    Ok(())
}
