//! Equivalence of the hierarchical and flattened processors.

use std::time::Duration;

use devsim::model::{Atomic, ChildId, Component, Coupled, PortBuffer, Priority};
use devsim::queue::QueueKind;
use devsim::simulation::{CouplingForwarding, SimInit};

use crate::bench::{at, run_flat, run_hierarchical, Periodic, Received, Relay, Sink};

/// A three-level bench with simultaneous events at every level.
fn nested_bench(received: &Received) -> Coupled<String> {
    let mut deep = Coupled::new("deep");
    let leaf = deep.add_atomic("leaf", Relay::new(1));
    deep.add_eic("in", leaf, "in").unwrap();
    deep.add_eoc(leaf, "out", "out").unwrap();

    let mut sub = Coupled::new("sub");
    let relay = sub.add_atomic("relay", Relay::new(2));
    let ticker = sub.add_atomic("ticker", Periodic::new("ticker", 3));
    let deep = sub.add_coupled(deep);
    sub.add_eic("in", relay, "in").unwrap();
    sub.add_ic(relay, "out", deep, "in").unwrap();
    sub.add_ic(ticker, "out", deep, "in").unwrap();
    sub.add_eoc(deep, "out", "out").unwrap();
    sub.add_eoc(ticker, "out", "tick").unwrap();
    sub.set_select(Priority::new([deep, ticker, relay]));

    let mut top = Coupled::new("top");
    let gen1 = top.add_atomic("gen1", Periodic::new("gen1", 2));
    let sub = top.add_coupled(sub);
    let gen2 = top.add_atomic("gen2", Periodic::new("gen2", 3));
    let sink = top.add_atomic("sink", Sink::new(received));
    top.add_ic(gen1, "out", sub, "in").unwrap();
    top.add_ic(gen2, "out", sub, "in").unwrap();
    top.add_ic(sub, "out", sink, "in").unwrap();
    top.add_eoc(sub, "tick", "ticks").unwrap();
    top.add_eoc(gen2, "out", "gen2").unwrap();
    top.set_select(|candidates: &[ChildId]| candidates[candidates.len() - 1]);

    top
}

#[test]
fn nested_bench_equivalence() {
    for queue_kind in [QueueKind::Heap, QueueKind::List] {
        let received_hier = Received::default();
        let hier = run_hierarchical(
            SimInit::new(nested_bench(&received_hier)).set_queue_kind(queue_kind),
            at(30),
        );

        let received_flat = Received::default();
        let flat = run_flat(
            SimInit::new(nested_bench(&received_flat)).set_queue_kind(queue_kind),
            at(30),
        );

        assert!(hier.pulses > 20);
        assert!(!hier.outputs.is_empty());
        assert!(!received_hier.lock().unwrap().is_empty());

        assert_eq!(flat, hier);
        assert_eq!(*received_flat.lock().unwrap(), *received_hier.lock().unwrap());
    }
}

/// Posts a value on two ports at the start time.
#[derive(Default)]
struct Burst {
    fired: bool,
}

impl Atomic<String> for Burst {
    fn ta(&self) -> Duration {
        if self.fired {
            Duration::MAX
        } else {
            Duration::ZERO
        }
    }
    fn delta_int(&mut self) {
        self.fired = true;
    }
    fn delta_ext(&mut self, _: Duration, _: &PortBuffer<String>) {}
    fn lambda(&self, outputs: &mut PortBuffer<String>) {
        outputs.put("x", "vx".to_owned());
        outputs.put("y", "vy".to_owned());
    }
}

/// Couples both ports of a `Burst` to the same input ports, against the
/// lexicographic order of the port names.
fn merging_bench(near: &Received, far: &Received) -> Coupled<String> {
    let mut sub = Coupled::new("sub");
    let inner = sub.add_atomic("inner", Sink::new(far));
    sub.add_eic("q", inner, "in").unwrap();
    sub.add_eic("p", inner, "in").unwrap();

    let mut top = Coupled::new("top");
    let burst = top.add_atomic("burst", Burst::default());
    let sink = top.add_atomic("sink", Sink::new(near));
    let sub = top.add_coupled(sub);
    top.add_ic(burst, "y", sink, "in").unwrap();
    top.add_ic(burst, "x", sink, "in").unwrap();
    top.add_ic(burst, "x", sub, "p").unwrap();
    top.add_ic(burst, "y", sub, "q").unwrap();
    top.add_eoc(burst, "y", "out").unwrap();
    top.add_eoc(burst, "x", "out").unwrap();

    top
}

#[test]
fn merged_ports_keep_coupling_order() {
    let expected = vec![(Duration::ZERO, vec!["vy".to_owned(), "vx".to_owned()])];

    let (near_hier, far_hier) = (Received::default(), Received::default());
    let hier = run_hierarchical(SimInit::new(merging_bench(&near_hier, &far_hier)), at(5));

    let (near_flat, far_flat) = (Received::default(), Received::default());
    let flat = run_flat(SimInit::new(merging_bench(&near_flat, &far_flat)), at(5));

    assert_eq!(*near_hier.lock().unwrap(), expected);
    assert_eq!(*far_hier.lock().unwrap(), expected);
    assert_eq!(
        hier.outputs
            .iter()
            .map(|event| event.value.as_str())
            .collect::<Vec<_>>(),
        vec!["vy", "vx"]
    );

    assert_eq!(flat, hier);
    assert_eq!(*near_flat.lock().unwrap(), expected);
    assert_eq!(*far_flat.lock().unwrap(), expected);
}

#[test]
fn atomic_top_equivalence() {
    let hier = run_hierarchical(
        SimInit::new(Component::atomic("gen", Periodic::new("gen", 4))),
        at(20),
    );
    let flat = run_flat(
        SimInit::new(Component::atomic("gen", Periodic::new("gen", 4))),
        at(20),
    );

    assert_eq!(hier.pulses, 6);
    assert_eq!(flat, hier);
}

#[test]
fn explicit_forwarding_equivalence() {
    let received_default = Received::default();
    let default = run_flat(SimInit::new(nested_bench(&received_default)), at(15));

    let received_explicit = Received::default();
    let explicit = run_flat(
        SimInit::new(nested_bench(&received_explicit)).set_forwarding(CouplingForwarding::new()),
        at(15),
    );

    assert_eq!(explicit, default);
}

#[test]
fn flattened_topology() {
    let received = Received::default();
    let simu = SimInit::new(nested_bench(&received))
        .init_flat(at(0))
        .unwrap();
    let topology = simu.topology();

    let paths: Vec<_> = topology.nodes().map(|node| topology.path(node)).collect();
    assert_eq!(
        paths,
        vec![
            "top",
            "top/gen1",
            "top/sub",
            "top/sub/relay",
            "top/sub/ticker",
            "top/sub/deep",
            "top/sub/deep/leaf",
            "top/gen2",
            "top/sink",
        ]
    );

    let atomic: Vec<_> = topology
        .nodes()
        .filter(|&node| topology.is_atomic(node))
        .map(|node| topology.path(node))
        .collect();
    assert_eq!(
        atomic,
        vec![
            "top/gen1",
            "top/sub/relay",
            "top/sub/ticker",
            "top/sub/deep/leaf",
            "top/gen2",
            "top/sink",
        ]
    );

    for node in topology.nodes() {
        match topology.parent(node) {
            None => assert_eq!(topology.path(node), "top"),
            Some(parent) => {
                assert!(parent < node);
                let local_id = topology.local_id(node);
                assert_eq!(topology.child(parent, local_id), node);
                assert!(topology.children(parent).contains(&node));
            }
        }
    }
}
