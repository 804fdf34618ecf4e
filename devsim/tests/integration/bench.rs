//! Models and helpers shared by the integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use devsim::model::{Atomic, PortBuffer};
use devsim::simulation::{OutputEvent, RunnableProcessor, SimInit, TransitionKind};
use devsim::time::{MonotonicTime, StopAt};

/// Transitions recorded as (time, path, kind) triples.
pub type Trace = Arc<Mutex<Vec<(MonotonicTime, String, TransitionKind)>>>;

/// Registers a transition listener recording into a new trace.
pub fn traced<T: Clone + Send + 'static>(init: SimInit<T>) -> (SimInit<T>, Trace) {
    let trace = Trace::default();
    let recorder = trace.clone();
    let init = init.on_transition(move |transition| {
        recorder.lock().unwrap().push((
            transition.time,
            transition.component.to_owned(),
            transition.kind,
        ));
    });

    (init, trace)
}

/// The observable outcome of a run.
#[derive(Debug, PartialEq)]
pub struct Summary {
    pub pulses: u64,
    pub time: MonotonicTime,
    pub next_time: MonotonicTime,
    pub outputs: Vec<OutputEvent<String>>,
    pub trace: Vec<(MonotonicTime, String, TransitionKind)>,
}

/// Runs a hierarchical processor from t=0 until `end`.
pub fn run_hierarchical(init: SimInit<String>, end: MonotonicTime) -> Summary {
    let (init, trace) = traced(init);
    let mut simu = init.init(at(0)).unwrap();
    simu.run_until(StopAt::new(end)).unwrap();

    let trace = trace.lock().unwrap().clone();
    Summary {
        pulses: simu.pulse_count(),
        time: simu.time(),
        next_time: simu.next_time(),
        outputs: simu.take_outputs(),
        trace,
    }
}

/// Runs a flattened processor from t=0 until `end`.
pub fn run_flat(init: SimInit<String>, end: MonotonicTime) -> Summary {
    let (init, trace) = traced(init);
    let mut simu = init.init_flat(at(0)).unwrap();
    simu.run_until(StopAt::new(end)).unwrap();

    let trace = trace.lock().unwrap().clone();
    Summary {
        pulses: simu.pulse_count(),
        time: simu.time(),
        next_time: simu.next_time(),
        outputs: simu.take_outputs(),
        trace,
    }
}

/// Returns the time `secs` seconds after the epoch.
pub fn at(secs: u64) -> MonotonicTime {
    MonotonicTime::EPOCH + Duration::from_secs(secs)
}

/// Fires with a constant period, posting `<name>:<count>` on `out`.
pub struct Periodic {
    name: &'static str,
    period: Duration,
    fired: u32,
    cleaned_up: Option<Arc<AtomicBool>>,
}

impl Periodic {
    pub fn new(name: &'static str, period_secs: u64) -> Self {
        Self {
            name,
            period: Duration::from_secs(period_secs),
            fired: 0,
            cleaned_up: None,
        }
    }

    /// Sets a flag raised when the model is asked to release its resources.
    pub fn with_cleanup_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cleaned_up = Some(flag);

        self
    }
}

impl Atomic<String> for Periodic {
    fn ta(&self) -> Duration {
        self.period
    }
    fn delta_int(&mut self) {
        self.fired += 1;
    }
    fn delta_ext(&mut self, _: Duration, _: &PortBuffer<String>) {}
    fn lambda(&self, outputs: &mut PortBuffer<String>) {
        outputs.put("out", format!("{}:{}", self.name, self.fired));
    }
    fn cleanup(&mut self) {
        if let Some(flag) = &self.cleaned_up {
            flag.store(true, Ordering::Relaxed);
        }
    }
}

/// Forwards the values received on `in` to `out` after a fixed delay.
pub struct Relay {
    delay: Duration,
    pending: Vec<String>,
}

impl Relay {
    pub fn new(delay_secs: u64) -> Self {
        Self {
            delay: Duration::from_secs(delay_secs),
            pending: Vec::new(),
        }
    }
}

impl Atomic<String> for Relay {
    fn ta(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::MAX
        } else {
            self.delay
        }
    }
    fn initial_ta(&self) -> Duration {
        self.ta()
    }
    fn delta_int(&mut self) {
        self.pending.clear();
    }
    fn delta_ext(&mut self, _: Duration, inputs: &PortBuffer<String>) {
        self.pending.extend(inputs.get("in").iter().cloned());
    }
    fn lambda(&self, outputs: &mut PortBuffer<String>) {
        outputs.extend("out", self.pending.iter().cloned());
    }
}

/// Values received by a [`Sink`], with the elapsed time reported by each
/// external transition.
pub type Received = Arc<Mutex<Vec<(Duration, Vec<String>)>>>;

/// A passive model recording everything it receives on `in`.
pub struct Sink {
    received: Received,
}

impl Sink {
    pub fn new(received: &Received) -> Self {
        Self {
            received: received.clone(),
        }
    }
}

impl Atomic<String> for Sink {
    fn ta(&self) -> Duration {
        Duration::MAX
    }
    fn initial_ta(&self) -> Duration {
        Duration::MAX
    }
    fn delta_int(&mut self) {}
    fn delta_ext(&mut self, elapsed: Duration, inputs: &PortBuffer<String>) {
        self.received
            .lock()
            .unwrap()
            .push((elapsed, inputs.get("in").to_vec()));
    }
    fn lambda(&self, _: &mut PortBuffer<String>) {}
}
