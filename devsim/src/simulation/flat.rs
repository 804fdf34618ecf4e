//! Flattened sequential processor.
//!
//! Instead of a tree of coordinators walking the couplings at every nesting
//! level, the flattened processor keeps every component in a single arena
//! indexed by [`NodeId`] and runs the output and transition functions of
//! atomic models directly. Composites only retain their event queue and
//! tie-break strategy, while value propagation between atomic models is
//! delegated to an [`EventForwarding`] strategy prepared once from the
//! [`FlatTopology`].

use std::collections::BTreeSet;
use std::fmt;

use tracing::trace;

use crate::control::{ExecutionControl, Runnable};
use crate::model::{
    Atomic, ChildId, Component, CoupledParts, Coupling, PortBuffer, Select, TopologyError,
};
use crate::queue::{EventQueue, QueueHint};
use crate::time::{next_event_time, DisplayTime, MonotonicTime, Progress};

use super::processor::{check_unique_names, BuildContext};
use super::{
    collect_outputs, OutputEvent, RunnableProcessor, SimulationError, Transition, TransitionKind,
    TransitionListener,
};

mod forwarding;

pub use forwarding::{CouplingForwarding, Destination, EventForwarding, Route};

/// Identifier of a component in a flattened tree.
///
/// Identifiers are attributed in tree preorder: the top-level component is
/// [`NodeId::TOP`] and every component has a greater identifier than its
/// parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The top-level component.
    pub const TOP: NodeId = NodeId(0);

    /// Returns the preorder index of the component.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct TopologyNode {
    path: String,
    parent: Option<NodeId>,
    local_id: ChildId,
    children: Vec<NodeId>,
    couplings: Vec<Coupling>,
    is_atomic: bool,
}

/// The static structure of a flattened component tree.
#[derive(Clone, Debug, Default)]
pub struct FlatTopology {
    nodes: Vec<TopologyNode>,
}

impl FlatTopology {
    /// Returns the number of components.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Checks whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterates over all components in preorder.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Returns the path of a component, such as `top/sub/leaf`.
    pub fn path(&self, node: NodeId) -> &str {
        &self.nodes[node.0].path
    }

    /// Returns the enclosing composite, if any.
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    /// Returns the identifier of a component within its enclosing composite.
    pub fn local_id(&self, node: NodeId) -> ChildId {
        self.nodes[node.0].local_id
    }

    /// Returns the sub-components of a composite, in declaration order.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Returns the sub-component of a composite with the specified local
    /// identifier.
    pub fn child(&self, node: NodeId, child: ChildId) -> NodeId {
        self.nodes[node.0].children[child.0]
    }

    /// Returns the couplings of a composite.
    pub fn couplings(&self, node: NodeId) -> &[Coupling] {
        &self.nodes[node.0].couplings
    }

    /// Checks whether a component is atomic.
    pub fn is_atomic(&self, node: NodeId) -> bool {
        self.nodes[node.0].is_atomic
    }
}

struct AtomicState<T> {
    model: Box<dyn Atomic<T>>,
    inputs: PortBuffer<T>,
    outputs: PortBuffer<T>,
    tole: MonotonicTime,
    tonie: MonotonicTime,
}

impl<T> AtomicState<T> {
    fn transition(
        &mut self,
        path: &str,
        time: MonotonicTime,
        kind: TransitionKind,
        listener: Option<&TransitionListener>,
    ) -> Result<MonotonicTime, SimulationError> {
        if time < self.tole || time > self.tonie {
            return Err(SimulationError::TimeOutOfRange {
                component: path.to_owned(),
                time,
                tole: self.tole,
                tonie: self.tonie,
            });
        }
        match kind {
            TransitionKind::Internal => self.model.delta_int(),
            TransitionKind::External => self
                .model
                .delta_ext(time.duration_since(self.tole), &self.inputs),
        }
        self.inputs.clear();
        self.tole = time;
        self.tonie = next_event_time(time, self.model.ta());

        trace!(
            component = %path,
            ?kind,
            time = %DisplayTime(time),
            tonie = %DisplayTime(self.tonie),
            "transition"
        );
        if let Some(listener) = listener {
            listener(&Transition {
                time,
                component: path,
                kind,
            });
        }

        Ok(self.tonie)
    }
}

struct CoupledState {
    select: Box<dyn Select>,
    queue: Box<dyn EventQueue>,
}

enum NodeState<T> {
    Atomic(AtomicState<T>),
    Coupled(CoupledState),
}

/// The pulse engine of a [`FlatSequentialProcessor`].
///
/// A reference to the engine is passed to the listeners registered with
/// [`FlatSequentialProcessor::on_stopped()`].
pub struct FlatCore<T> {
    topology: FlatTopology,
    states: Vec<NodeState<T>>,
    forwarding: Box<dyn EventForwarding>,
    transition_listener: Option<TransitionListener>,
    tole: MonotonicTime,
    tonie: MonotonicTime,
    pulses: u64,
    outputs: Vec<OutputEvent<T>>,
    fixed_pace: bool,
}

impl<T> FlatCore<T> {
    /// Returns the structure of the flattened tree.
    pub fn topology(&self) -> &FlatTopology {
        &self.topology
    }

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

    fn node_tonie(&self, node: NodeId) -> MonotonicTime {
        match &self.states[node.0] {
            NodeState::Atomic(state) => state.tonie,
            NodeState::Coupled(state) => state.queue.min_time().unwrap_or(MonotonicTime::MAX),
        }
    }

    /// Moves a component to a new time in the queue of its parent, if any,
    /// and returns the parent.
    fn reschedule(&mut self, node: NodeId, tonie: MonotonicTime) -> Option<NodeId> {
        let parent = self.topology.parent(node)?;
        if let NodeState::Coupled(state) = &mut self.states[parent.0] {
            state.queue.requeue(self.topology.local_id(node), tonie);
        }

        Some(parent)
    }

    /// Initializes all components, children before parents.
    fn init(&mut self, time: MonotonicTime) {
        for idx in (0..self.topology.len()).rev() {
            let node = NodeId(idx);
            match &mut self.states[node.0] {
                NodeState::Atomic(state) => {
                    state.tole = time;
                    state.tonie = next_event_time(time, state.model.initial_ta());
                }
                NodeState::Coupled(_) => {}
            }
            let tonie = self.node_tonie(node);
            self.reschedule(node, tonie);
        }
        self.tole = time;
        self.tonie = self.node_tonie(NodeId::TOP);
    }
}

impl<T: Clone> Runnable for FlatCore<T> {
    type Error = SimulationError;

    fn execute_next_step(&mut self) -> Result<(), SimulationError> {
        let time = self.tonie;
        trace!(time = %DisplayTime(time), pulse = self.pulses, "pulse");

        // Isolate the imminent atomic model, selecting one candidate at each
        // level and leaving the other candidates scheduled at this time.
        let mut dirty = BTreeSet::new();
        let mut node = NodeId::TOP;
        let (imminent, produced) = loop {
            match &mut self.states[node.0] {
                NodeState::Atomic(state) => {
                    state.model.lambda(&mut state.outputs);
                    break (node, std::mem::take(&mut state.outputs));
                }
                NodeState::Coupled(state) => {
                    let candidates = state.queue.dequeue_all();
                    if candidates.is_empty() {
                        return Err(SimulationError::EmptyImminentSet {
                            component: self.topology.path(node).to_owned(),
                        });
                    }
                    let selected = state.select.select(&candidates);
                    if candidates.binary_search(&selected).is_err() {
                        return Err(SimulationError::InvalidSelection {
                            component: self.topology.path(node).to_owned(),
                            selected,
                        });
                    }
                    for &candidate in &candidates {
                        if candidate != selected {
                            state.queue.enqueue(candidate, time);
                        }
                    }
                    let child = self.topology.child(node, selected);
                    trace!(
                        component = %self.topology.path(node),
                        ?candidates,
                        selected = %self.topology.path(child),
                        time = %DisplayTime(time),
                        "selected imminent component"
                    );
                    dirty.insert(node);
                    node = child;
                }
            }
        };

        let mut influenced = BTreeSet::from([imminent]);
        if imminent == NodeId::TOP {
            collect_outputs(&mut self.outputs, time, produced);
        } else {
            for route in self.forwarding.routes(imminent) {
                let values = produced.get(&route.port);
                if values.is_empty() {
                    continue;
                }
                match &route.destination {
                    Destination::Input(target, target_port) => {
                        if let Some(NodeState::Atomic(state)) = self.states.get_mut(target.0) {
                            state.inputs.extend(target_port, values.iter().cloned());
                            influenced.insert(*target);
                        }
                    }
                    Destination::Output(output_port) => {
                        self.outputs.extend(values.iter().map(|value| OutputEvent {
                            time,
                            port: output_port.clone(),
                            value: value.clone(),
                        }));
                    }
                }
            }
        }

        // Preorder matches the order in which nested coordinators would
        // visit their sub-components.
        for node in influenced {
            let NodeState::Atomic(state) = &mut self.states[node.0] else {
                continue;
            };
            let kind = if node == imminent {
                TransitionKind::Internal
            } else {
                TransitionKind::External
            };
            let tonie = state.transition(
                self.topology.path(node),
                time,
                kind,
                self.transition_listener.as_ref(),
            )?;
            if let Some(parent) = self.reschedule(node, tonie) {
                dirty.insert(parent);
            }
        }

        // Children have greater identifiers than their parent, so the
        // deepest composites are rescheduled first.
        while let Some(node) = dirty.pop_last() {
            let tonie = self.node_tonie(node);
            if let Some(parent) = self.reschedule(node, tonie) {
                dirty.insert(parent);
            }
        }

        self.tole = time;
        self.tonie = self.node_tonie(NodeId::TOP);
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
        for state in &mut self.states {
            if let NodeState::Atomic(state) = state {
                state.model.cleanup();
            }
        }
    }
}

impl<T> fmt::Debug for FlatCore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatCore")
            .field("nodes", &self.topology.len())
            .field("time", &self.tole)
            .field("next_time", &self.tonie)
            .field("pulses", &self.pulses)
            .finish_non_exhaustive()
    }
}

/// Appends a component and its descendants to the arena in preorder.
fn flatten<T>(
    component: Component<T>,
    parent: Option<(NodeId, ChildId)>,
    context: &BuildContext,
    topology: &mut FlatTopology,
    states: &mut Vec<NodeState<T>>,
) -> Result<NodeId, TopologyError> {
    let node = NodeId(states.len());
    let path = match parent {
        Some((parent, _)) => format!("{}/{}", topology.path(parent), component.name()),
        None => component.name().to_owned(),
    };
    let (parent, local_id) = match parent {
        Some((parent, local_id)) => (Some(parent), local_id),
        None => (None, ChildId(0)),
    };

    match component {
        Component::Atomic { model, .. } => {
            topology.nodes.push(TopologyNode {
                path,
                parent,
                local_id,
                children: Vec::new(),
                couplings: Vec::new(),
                is_atomic: true,
            });
            states.push(NodeState::Atomic(AtomicState {
                model,
                inputs: PortBuffer::new(),
                outputs: PortBuffer::new(),
                tole: MonotonicTime::EPOCH,
                tonie: MonotonicTime::MAX,
            }));
        }
        Component::Coupled(coupled) => {
            let parts = coupled.into_parts();
            check_unique_names(&parts)?;
            let CoupledParts {
                children,
                couplings,
                select,
                ..
            } = parts;

            let queue = context.queue_factory.create(QueueHint {
                component: &path,
                children: children.len(),
            });
            topology.nodes.push(TopologyNode {
                path,
                parent,
                local_id,
                children: Vec::with_capacity(children.len()),
                couplings,
                is_atomic: false,
            });
            states.push(NodeState::Coupled(CoupledState { select, queue }));

            for (idx, child) in children.into_iter().enumerate() {
                let child = flatten(child, Some((node, ChildId(idx))), context, topology, states)?;
                topology.nodes[node.0].children.push(child);
            }
        }
    }

    Ok(node)
}

/// A processor running a flattened component tree.
///
/// A `FlatSequentialProcessor` is built with
/// [`SimInit::init_flat()`](crate::simulation::SimInit::init_flat) and
/// executed with the methods of [`RunnableProcessor`]. Given the same
/// component tree, it executes the same transitions in the same order as a
/// [`RootCoordinator`](crate::simulation::RootCoordinator).
pub struct FlatSequentialProcessor<T> {
    core: FlatCore<T>,
    control: ExecutionControl<FlatCore<T>>,
}

impl<T: Clone> FlatSequentialProcessor<T> {
    pub(crate) fn new(
        component: Component<T>,
        start_time: MonotonicTime,
        context: &BuildContext,
        mut forwarding: Box<dyn EventForwarding>,
        fixed_pace: bool,
    ) -> Result<Self, TopologyError> {
        let mut topology = FlatTopology::default();
        let mut states = Vec::new();
        flatten(component, None, context, &mut topology, &mut states)?;
        forwarding.prepare(&topology);

        let mut core = FlatCore {
            topology,
            states,
            forwarding,
            transition_listener: context.transition_listener.clone(),
            tole: start_time,
            tonie: MonotonicTime::MAX,
            pulses: 0,
            outputs: Vec::new(),
            fixed_pace,
        };
        core.init(start_time);

        Ok(Self {
            core,
            control: ExecutionControl::new(),
        })
    }
}

impl<T> FlatSequentialProcessor<T> {
    /// Registers a listener called with the engine when the run terminates.
    pub fn on_stopped(&mut self, listener: impl FnMut(&FlatCore<T>) + Send + 'static)
    where
        T: Clone,
    {
        self.control.on_stopped(listener);
    }

    /// Returns the structure of the flattened tree.
    pub fn topology(&self) -> &FlatTopology {
        self.core.topology()
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

impl<T: Clone> RunnableProcessor for FlatSequentialProcessor<T> {
    type Engine = FlatCore<T>;

    fn parts(&mut self) -> (&mut FlatCore<T>, &mut ExecutionControl<FlatCore<T>>) {
        (&mut self.core, &mut self.control)
    }

    fn control(&self) -> &ExecutionControl<FlatCore<T>> {
        &self.control
    }
}

impl<T> fmt::Debug for FlatSequentialProcessor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatSequentialProcessor")
            .field("core", &self.core)
            .field("control", &self.control)
            .finish()
    }
}
