use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::model::Component;
use crate::queue::{EventQueueFactory, QueueKind};
use crate::time::{DisplayTime, MonotonicTime};

use super::flat::{CouplingForwarding, EventForwarding, FlatSequentialProcessor};
use super::processor::{self, BuildContext};
use super::root::RootCoordinator;
use super::{SimulationError, Transition};

/// Builder for a simulation processor.
pub struct SimInit<T> {
    component: Component<T>,
    context: BuildContext,
    forwarding: Box<dyn EventForwarding>,
    fixed_pace: bool,
}

impl<T: Clone + Send + 'static> SimInit<T> {
    /// Creates a builder for the specified top-level component, using
    /// [`HeapEventQueue`](crate::queue::HeapEventQueue)s and
    /// [`CouplingForwarding`].
    pub fn new(component: impl Into<Component<T>>) -> Self {
        Self {
            component: component.into(),
            context: BuildContext {
                queue_factory: Arc::new(QueueKind::default()),
                transition_listener: None,
            },
            forwarding: Box::new(CouplingForwarding::new()),
            fixed_pace: false,
        }
    }

    /// Selects one of the built-in event queue implementations.
    pub fn set_queue_kind(self, kind: QueueKind) -> Self {
        self.set_queue_factory(kind)
    }

    /// Sets the factory creating the event queue of each composite.
    pub fn set_queue_factory(mut self, factory: impl EventQueueFactory + 'static) -> Self {
        self.context.queue_factory = Arc::new(factory);

        self
    }

    /// Declares whether the processor paces itself.
    ///
    /// The inter-pulse delay of a fixed-pace processor is ignored.
    pub fn set_fixed_pace(mut self, fixed_pace: bool) -> Self {
        self.fixed_pace = fixed_pace;

        self
    }

    /// Sets the event forwarding strategy of the flattened processor.
    ///
    /// This setting has no effect on [`init()`](SimInit::init).
    pub fn set_forwarding(mut self, forwarding: impl EventForwarding + 'static) -> Self {
        self.forwarding = Box::new(forwarding);

        self
    }

    /// Registers a listener called after each transition of an atomic model.
    pub fn on_transition(
        mut self,
        listener: impl Fn(&Transition<'_>) + Send + Sync + 'static,
    ) -> Self {
        self.context.transition_listener = Some(Arc::new(listener));

        self
    }

    /// Builds a hierarchical processor tree initialized at the specified
    /// simulation time.
    pub fn init(self, start_time: MonotonicTime) -> Result<RootCoordinator<T>, SimulationError> {
        let top = processor::build(self.component, None, &self.context)?;
        let root = RootCoordinator::new(top, start_time, self.fixed_pace);
        debug!(
            start = %DisplayTime(start_time),
            next = %DisplayTime(root.next_time()),
            "hierarchical processor initialized"
        );

        Ok(root)
    }

    /// Builds a flattened processor initialized at the specified simulation
    /// time.
    pub fn init_flat(
        self,
        start_time: MonotonicTime,
    ) -> Result<FlatSequentialProcessor<T>, SimulationError> {
        let processor = FlatSequentialProcessor::new(
            self.component,
            start_time,
            &self.context,
            self.forwarding,
            self.fixed_pace,
        )?;
        debug!(
            start = %DisplayTime(start_time),
            next = %DisplayTime(processor.next_time()),
            components = processor.topology().len(),
            "flattened processor initialized"
        );

        Ok(processor)
    }
}

impl<T> fmt::Debug for SimInit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimInit")
            .field("component", &self.component)
            .field("fixed_pace", &self.fixed_pace)
            .finish_non_exhaustive()
    }
}
