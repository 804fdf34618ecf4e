//! Composite components and their couplings.

use std::fmt;

use super::{Atomic, Component};

/// Identifier of a sub-component within its enclosing composite.
///
/// Identifiers are attributed in declaration order, starting from 0.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChildId(pub(crate) usize);

impl ChildId {
    /// Returns the declaration index of the sub-component.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One end of a coupling.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A port on the boundary of the enclosing composite: an input port when
    /// used as a source, an output port when used as a destination.
    Boundary(String),
    /// A port of a sub-component: an output port when used as a source, an
    /// input port when used as a destination.
    Child(ChildId, String),
}

impl Endpoint {
    /// Returns the sub-component, if any.
    pub fn child(&self) -> Option<ChildId> {
        match self {
            Self::Boundary(_) => None,
            Self::Child(child, _) => Some(*child),
        }
    }

    /// Returns the port name.
    pub fn port(&self) -> &str {
        match self {
            Self::Boundary(port) | Self::Child(_, port) => port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boundary(port) => write!(f, "self.{port}"),
            Self::Child(child, port) => write!(f, "{child}.{port}"),
        }
    }
}

/// The three coupling relations of a composite.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CouplingKind {
    /// External input coupling (EIC): composite input to child input.
    ExternalInput,
    /// Internal coupling (IC): child output to sibling input.
    Internal,
    /// External output coupling (EOC): child output to composite output.
    ExternalOutput,
}

/// A static port-to-port connection within a composite.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Coupling {
    source: Endpoint,
    destination: Endpoint,
}

impl Coupling {
    /// Returns the source end.
    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    /// Returns the destination end.
    pub fn destination(&self) -> &Endpoint {
        &self.destination
    }

    /// Returns the relation this coupling belongs to.
    pub fn kind(&self) -> CouplingKind {
        match (&self.source, &self.destination) {
            (Endpoint::Boundary(_), _) => CouplingKind::ExternalInput,
            (Endpoint::Child(..), Endpoint::Child(..)) => CouplingKind::Internal,
            (Endpoint::Child(..), Endpoint::Boundary(_)) => CouplingKind::ExternalOutput,
        }
    }
}

impl fmt::Display for Coupling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

/// Tie-break among sub-components that are imminent at the same time.
///
/// The engine invokes the strategy exactly once per pulse of the composite,
/// with the imminent sub-components in ascending identifier order, and fires
/// only the one returned. The strategy must be deterministic and return one
/// of the candidates; any other value fails the run.
///
/// Closures of type `Fn(&[ChildId]) -> ChildId` implement this trait.
pub trait Select: Send + Sync {
    /// Chooses one of the non-empty set of candidates.
    fn select(&self, candidates: &[ChildId]) -> ChildId;
}

impl<F> Select for F
where
    F: Fn(&[ChildId]) -> ChildId + Send + Sync,
{
    fn select(&self, candidates: &[ChildId]) -> ChildId {
        self(candidates)
    }
}

/// Selects the candidate declared first.
///
/// This is the default tie-break of a [`Coupled`] component.
#[derive(Copy, Clone, Debug, Default)]
pub struct FirstDeclared;

impl Select for FirstDeclared {
    fn select(&self, candidates: &[ChildId]) -> ChildId {
        candidates[0]
    }
}

/// Selects the first candidate in a priority list, falling back to the
/// candidate declared first for sub-components absent from the list.
#[derive(Clone, Debug, Default)]
pub struct Priority {
    order: Vec<ChildId>,
}

impl Priority {
    /// Creates a priority list, highest priority first.
    pub fn new(order: impl IntoIterator<Item = ChildId>) -> Self {
        Self {
            order: order.into_iter().collect(),
        }
    }
}

impl Select for Priority {
    fn select(&self, candidates: &[ChildId]) -> ChildId {
        self.order
            .iter()
            .find(|child| candidates.contains(child))
            .copied()
            .unwrap_or(candidates[0])
    }
}

/// A composite component made of sub-components connected by couplings.
///
/// The topology is fixed once the composite is handed to
/// [`SimInit`](crate::simulation::SimInit). Couplings are validated as they
/// are declared.
pub struct Coupled<T> {
    name: String,
    children: Vec<Component<T>>,
    couplings: Vec<Coupling>,
    select: Box<dyn Select>,
}

impl<T> Coupled<T> {
    /// Creates an empty composite using the [`FirstDeclared`] tie-break.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            couplings: Vec::new(),
            select: Box::new(FirstDeclared),
        }
    }

    /// Returns the name of the composite.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an atomic sub-component.
    pub fn add_atomic(
        &mut self,
        name: impl Into<String>,
        model: impl Atomic<T> + 'static,
    ) -> ChildId {
        self.add_component(Component::atomic(name, model))
    }

    /// Adds a composite sub-component.
    pub fn add_coupled(&mut self, coupled: Coupled<T>) -> ChildId {
        self.add_component(Component::Coupled(coupled))
    }

    /// Adds a sub-component of any kind.
    pub fn add_component(&mut self, component: Component<T>) -> ChildId {
        self.children.push(component);

        ChildId(self.children.len() - 1)
    }

    /// Sets the tie-break strategy.
    pub fn set_select(&mut self, select: impl Select + 'static) {
        self.select = Box::new(select);
    }

    /// Connects an input port of the composite to an input port of a
    /// sub-component.
    pub fn add_eic(
        &mut self,
        port: &str,
        child: ChildId,
        child_port: &str,
    ) -> Result<(), TopologyError> {
        self.add_coupling(
            Endpoint::Boundary(port.to_owned()),
            Endpoint::Child(child, child_port.to_owned()),
        )
    }

    /// Connects an output port of a sub-component to an input port of a
    /// sibling.
    pub fn add_ic(
        &mut self,
        source: ChildId,
        source_port: &str,
        destination: ChildId,
        destination_port: &str,
    ) -> Result<(), TopologyError> {
        if source == destination {
            return Err(TopologyError::SelfCoupling {
                component: self.name.clone(),
                child: self.child_name(source).to_owned(),
            });
        }
        self.add_coupling(
            Endpoint::Child(source, source_port.to_owned()),
            Endpoint::Child(destination, destination_port.to_owned()),
        )
    }

    /// Connects an output port of a sub-component to an output port of the
    /// composite.
    pub fn add_eoc(
        &mut self,
        child: ChildId,
        child_port: &str,
        port: &str,
    ) -> Result<(), TopologyError> {
        self.add_coupling(
            Endpoint::Child(child, child_port.to_owned()),
            Endpoint::Boundary(port.to_owned()),
        )
    }

    /// Returns the sub-components in declaration order.
    pub fn children(&self) -> &[Component<T>] {
        &self.children
    }

    /// Returns all couplings in declaration order.
    pub fn couplings(&self) -> &[Coupling] {
        &self.couplings
    }

    /// Returns the external input couplings.
    pub fn eic(&self) -> impl Iterator<Item = &Coupling> {
        self.couplings_of(CouplingKind::ExternalInput)
    }

    /// Returns the internal couplings.
    pub fn ic(&self) -> impl Iterator<Item = &Coupling> {
        self.couplings_of(CouplingKind::Internal)
    }

    /// Returns the external output couplings.
    pub fn eoc(&self) -> impl Iterator<Item = &Coupling> {
        self.couplings_of(CouplingKind::ExternalOutput)
    }

    /// Splits the composite into its parts.
    pub(crate) fn into_parts(self) -> CoupledParts<T> {
        CoupledParts {
            name: self.name,
            children: self.children,
            couplings: self.couplings,
            select: self.select,
        }
    }

    fn couplings_of(&self, kind: CouplingKind) -> impl Iterator<Item = &Coupling> {
        self.couplings.iter().filter(move |c| c.kind() == kind)
    }

    fn child_name(&self, child: ChildId) -> &str {
        self.children
            .get(child.0)
            .map(Component::name)
            .unwrap_or("<unknown>")
    }

    fn add_coupling(
        &mut self,
        source: Endpoint,
        destination: Endpoint,
    ) -> Result<(), TopologyError> {
        for child in [source.child(), destination.child()].into_iter().flatten() {
            if child.0 >= self.children.len() {
                return Err(TopologyError::UnknownChild {
                    component: self.name.clone(),
                    child,
                });
            }
        }
        let coupling = Coupling {
            source,
            destination,
        };
        if self.couplings.contains(&coupling) {
            return Err(TopologyError::DuplicateCoupling {
                component: self.name.clone(),
                coupling: coupling.to_string(),
            });
        }
        self.couplings.push(coupling);

        Ok(())
    }
}

impl<T> fmt::Debug for Coupled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coupled")
            .field("name", &self.name)
            .field("children", &self.children.len())
            .field("couplings", &self.couplings)
            .finish_non_exhaustive()
    }
}

/// The owned parts of a composite, consumed when processors are built.
pub(crate) struct CoupledParts<T> {
    pub(crate) name: String,
    pub(crate) children: Vec<Component<T>>,
    pub(crate) couplings: Vec<Coupling>,
    pub(crate) select: Box<dyn Select>,
}

/// An invalid composite topology.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// An internal coupling connects a sub-component to itself.
    #[error("component `{component}` couples sub-component `{child}` to itself")]
    SelfCoupling {
        /// The enclosing composite.
        component: String,
        /// The offending sub-component.
        child: String,
    },
    /// A coupling references a sub-component that was not declared.
    #[error("component `{component}` has no sub-component {child}")]
    UnknownChild {
        /// The enclosing composite.
        component: String,
        /// The unknown identifier.
        child: ChildId,
    },
    /// Two sub-components of the same composite share a name.
    #[error("component `{component}` has several sub-components named `{child}`")]
    DuplicateName {
        /// The enclosing composite.
        component: String,
        /// The shared name.
        child: String,
    },
    /// The same coupling was declared twice.
    #[error("component `{component}` declares coupling `{coupling}` twice")]
    DuplicateCoupling {
        /// The enclosing composite.
        component: String,
        /// The duplicated coupling.
        coupling: String,
    },
}
