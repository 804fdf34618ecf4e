//! Port buffers.

use std::collections::BTreeMap;
use std::fmt;

/// Values posted on the named ports of a component during one pulse.
///
/// The engine owns one input and one output buffer per component. Output
/// buffers are filled by [`Atomic::lambda()`](crate::model::Atomic::lambda),
/// input buffers are read by
/// [`Atomic::delta_ext()`](crate::model::Atomic::delta_ext). Both are emptied
/// by the engine once the pulse that produced or consumed them is over.
///
/// Ports are iterated in lexicographic order and the values of a port in the
/// order they were posted, which keeps value propagation deterministic.
#[derive(Clone, PartialEq, Eq)]
pub struct PortBuffer<T> {
    ports: BTreeMap<String, Vec<T>>,
}

impl<T> PortBuffer<T> {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            ports: BTreeMap::new(),
        }
    }

    /// Posts a value on a port.
    pub fn put(&mut self, port: &str, value: T) {
        self.bag_mut(port).push(value);
    }

    /// Posts several values on a port.
    pub fn extend(&mut self, port: &str, values: impl IntoIterator<Item = T>) {
        self.bag_mut(port).extend(values);
    }

    /// Returns the values posted on a port, in posting order.
    pub fn get(&self, port: &str) -> &[T] {
        self.ports.get(port).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the first value posted on a port, if any.
    pub fn first(&self, port: &str) -> Option<&T> {
        self.get(port).first()
    }

    /// Checks whether no value was posted on any port.
    pub fn is_empty(&self) -> bool {
        self.ports.values().all(Vec::is_empty)
    }

    /// Returns the total number of posted values.
    pub fn len(&self) -> usize {
        self.ports.values().map(Vec::len).sum()
    }

    /// Iterates over the non-empty ports and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.ports
            .iter()
            .filter(|(_, values)| !values.is_empty())
            .map(|(port, values)| (port.as_str(), values.as_slice()))
    }

    /// Removes all values.
    pub fn clear(&mut self) {
        self.ports.clear();
    }

    fn bag_mut(&mut self, port: &str) -> &mut Vec<T> {
        if !self.ports.contains_key(port) {
            self.ports.insert(port.to_owned(), Vec::new());
        }
        // The key was just inserted if missing.
        self.ports.get_mut(port).unwrap()
    }
}

impl<T: Clone> PortBuffer<T> {
    /// Appends the values of `source_port` in `source` to `port`, returning
    /// the number of values copied.
    pub(crate) fn copy_from(
        &mut self,
        port: &str,
        source: &PortBuffer<T>,
        source_port: &str,
    ) -> usize {
        let values = source.get(source_port);
        if !values.is_empty() {
            self.extend(port, values.iter().cloned());
        }

        values.len()
    }
}

impl<T> IntoIterator for PortBuffer<T> {
    type Item = (String, Vec<T>);
    type IntoIter = std::iter::Filter<
        std::collections::btree_map::IntoIter<String, Vec<T>>,
        fn(&(String, Vec<T>)) -> bool,
    >;

    /// Consumes the buffer, yielding the non-empty ports and their values.
    fn into_iter(self) -> Self::IntoIter {
        fn is_posted<U>((_, values): &(String, Vec<U>)) -> bool {
            !values.is_empty()
        }

        self.ports
            .into_iter()
            .filter(is_posted::<T> as fn(&(String, Vec<T>)) -> bool)
    }
}

impl<T> Default for PortBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for PortBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
