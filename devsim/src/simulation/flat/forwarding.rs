use std::collections::{BTreeMap, HashMap};

use crate::model::Endpoint;

use super::{FlatTopology, NodeId};

/// Where a value produced by an atomic model ends up.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// An input port of an atomic model.
    Input(NodeId, String),
    /// An output port of the top-level component.
    Output(String),
}

/// A route followed by the values posted on an output port of an atomic
/// model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    /// The output port of the atomic model.
    pub port: String,
    /// Where the values of the port are delivered.
    pub destination: Destination,
}

impl Route {
    /// Creates a route.
    pub fn new(port: impl Into<String>, destination: Destination) -> Self {
        Self {
            port: port.into(),
            destination,
        }
    }
}

/// A strategy routing the values produced by atomic models of a flattened
/// tree.
///
/// The strategy is prepared once when the processor is built, and then
/// queried for the routes of every atomic model that fires. Routes are
/// followed in order, so values reaching the same destination port are
/// delivered in the order of the routes that carry them.
///
/// [`Destination::Input`] entries must designate atomic models; other
/// entries are ignored.
pub trait EventForwarding: Send {
    /// Precomputes routes for a topology.
    fn prepare(&mut self, topology: &FlatTopology);

    /// Returns the routes of the values posted by an atomic model.
    fn routes(&self, source: NodeId) -> &[Route];
}

/// The default [`EventForwarding`] strategy, which resolves the couplings of
/// all nesting levels into direct atomic-to-atomic routes.
///
/// Values posted on an output port climb the external output couplings up
/// to the composite where an internal coupling takes over, then descend the
/// external input couplings down to atomic models. Values reaching the
/// boundary of the top-level component become [`Destination::Output`]s.
///
/// Routes are ordered so that every destination port receives values in the
/// same order as with nested coordinators: couplings are followed in
/// declaration order at each level, and a composite dispatches its input
/// ports only once all of them are filled.
#[derive(Clone, Debug, Default)]
pub struct CouplingForwarding {
    routes: HashMap<NodeId, Vec<Route>>,
}

impl CouplingForwarding {
    /// Creates a strategy with no route.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventForwarding for CouplingForwarding {
    fn prepare(&mut self, topology: &FlatTopology) {
        self.routes.clear();

        for node in topology.nodes() {
            if topology.is_atomic(node) && topology.parent(node).is_some() {
                let routes = resolve_routes(topology, node);
                if !routes.is_empty() {
                    self.routes.insert(node, routes);
                }
            }
        }
    }

    fn routes(&self, source: NodeId) -> &[Route] {
        self.routes.get(&source).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Port buffer of a component, where each entry names the output port of
/// the source model whose values were copied there.
type Origins = BTreeMap<String, Vec<String>>;

/// Replays the couplings followed by the values of `source` across the
/// nesting levels.
fn resolve_routes(topology: &FlatTopology, source: NodeId) -> Vec<Route> {
    let mut routes = Vec::new();
    let Some(parent) = topology.parent(source) else {
        return routes;
    };
    let local_id = topology.local_id(source);
    let mut inputs: BTreeMap<NodeId, Origins> = BTreeMap::new();

    // Climb the external output couplings.
    let mut outputs = Origins::new();
    for coupling in topology.couplings(parent) {
        if let Endpoint::Child(child, port) = coupling.source() {
            if *child == local_id {
                outputs.insert(port.clone(), vec![port.clone()]);
            }
        }
    }
    let mut node = source;
    while let Some(parent) = topology.parent(node) {
        let local_id = topology.local_id(node);
        let mut parent_outputs = Origins::new();
        for coupling in topology.couplings(parent) {
            let origins = match coupling.source() {
                Endpoint::Child(child, port) if *child == local_id => match outputs.get(port) {
                    Some(origins) => origins,
                    None => continue,
                },
                _ => continue,
            };
            match coupling.destination() {
                Endpoint::Child(child, child_port) => inputs
                    .entry(topology.child(parent, *child))
                    .or_default()
                    .entry(child_port.clone())
                    .or_default()
                    .extend(origins.iter().cloned()),
                Endpoint::Boundary(output_port) => parent_outputs
                    .entry(output_port.clone())
                    .or_default()
                    .extend(origins.iter().cloned()),
            }
        }
        node = parent;
        outputs = parent_outputs;
    }

    // Descend the external input couplings, parents first.
    while let Some((node, origins)) = inputs.pop_first() {
        if topology.is_atomic(node) {
            for (port, ports) in origins {
                routes.extend(
                    ports
                        .into_iter()
                        .map(|origin| Route::new(origin, Destination::Input(node, port.clone()))),
                );
            }
            continue;
        }
        for coupling in topology.couplings(node) {
            let (Endpoint::Boundary(port), Endpoint::Child(child, child_port)) =
                (coupling.source(), coupling.destination())
            else {
                continue;
            };
            let Some(ports) = origins.get(port) else {
                continue;
            };
            inputs
                .entry(topology.child(node, *child))
                .or_default()
                .entry(child_port.clone())
                .or_default()
                .extend(ports.iter().cloned());
        }
    }

    // Top-level outputs are collected port by port.
    for (port, ports) in outputs {
        routes.extend(
            ports
                .into_iter()
                .map(|origin| Route::new(origin, Destination::Output(port.clone()))),
        );
    }

    routes
}
