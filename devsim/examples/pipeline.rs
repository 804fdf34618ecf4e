//! Example: a job pipeline made of a generator, a server and a collector.
//!
//! This example demonstrates in particular:
//!
//! * the design of atomic models with passive and active phases,
//! * the nesting of a composite within another,
//! * tie-breaking between simultaneous events,
//! * the use of the flattened processor and of the `tracing` logs.
//!
//! ```text
//!                      ┌──────────────────────────────────────┐
//!                      │ plant                                │
//!  ┌───────────┐       │   ┌──────────┐       ┌───────────┐   │
//!  │           │ jobs  │   │          │ done  │           │   │ stats
//!  │ Generator ├──────►┼──►│  Server  ├──────►│ Collector ├──►┼──────►
//!  │           │       │   │          │       │           │   │
//!  └───────────┘       │   └──────────┘       └───────────┘   │
//!                      └──────────────────────────────────────┘
//! ```
//!
//! Run with `RUST_LOG=devsim=trace` to follow each pulse.
use std::collections::VecDeque;
use std::time::Duration;

use devsim::model::{Atomic, ChildId, Coupled, PortBuffer, Priority};
use devsim::simulation::{RunnableProcessor, SimInit, SimulationError};
use devsim::time::{MonotonicTime, StopAt};

/// Values exchanged by the models of the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// A job and the amount of work it requires [s].
    Job { id: u32, work: f64 },
    /// Number of completed jobs and mean time in system [s].
    Stats { completed: u32, mean_latency: f64 },
}

/// Emits jobs with a constant inter-arrival time and a cyclic workload.
pub struct Generator {
    period: Duration,
    workloads: Vec<f64>,
    next_id: u32,
}

impl Generator {
    /// Creates a generator.
    pub fn new(period: Duration, workloads: Vec<f64>) -> Self {
        Self {
            period,
            workloads,
            next_id: 0,
        }
    }
}

impl Atomic<Message> for Generator {
    fn ta(&self) -> Duration {
        self.period
    }
    fn delta_int(&mut self) {
        self.next_id += 1;
    }
    fn delta_ext(&mut self, _: Duration, _: &PortBuffer<Message>) {}
    fn lambda(&self, outputs: &mut PortBuffer<Message>) {
        let work = self.workloads[self.next_id as usize % self.workloads.len()];
        outputs.put(
            "jobs",
            Message::Job {
                id: self.next_id,
                work,
            },
        );
    }
}

/// A single-server FIFO queue.
#[derive(Default)]
pub struct Server {
    queue: VecDeque<(u32, f64)>,
    /// Remaining work of the job in service [s].
    remaining: f64,
}

impl Atomic<Message> for Server {
    fn ta(&self) -> Duration {
        if self.queue.is_empty() {
            Duration::MAX
        } else {
            Duration::from_secs_f64(self.remaining.max(0.0))
        }
    }
    fn initial_ta(&self) -> Duration {
        self.ta()
    }
    fn delta_int(&mut self) {
        self.queue.pop_front();
        self.remaining = self.queue.front().map_or(0.0, |&(_, work)| work);
    }
    fn delta_ext(&mut self, elapsed: Duration, inputs: &PortBuffer<Message>) {
        if !self.queue.is_empty() {
            self.remaining -= elapsed.as_secs_f64();
        }
        for message in inputs.get("jobs") {
            if let Message::Job { id, work } = message {
                if self.queue.is_empty() {
                    self.remaining = *work;
                }
                self.queue.push_back((*id, *work));
            }
        }
    }
    fn lambda(&self, outputs: &mut PortBuffer<Message>) {
        if let Some(&(id, work)) = self.queue.front() {
            outputs.put("done", Message::Job { id, work });
        }
    }
}

/// Tracks completed jobs and reports statistics on each completion.
pub struct Collector {
    period: Duration,
    now: Duration,
    completed: u32,
    total_latency: f64,
    report_pending: bool,
}

impl Collector {
    /// Creates a collector for jobs issued with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            now: Duration::ZERO,
            completed: 0,
            total_latency: 0.0,
            report_pending: false,
        }
    }
}

impl Atomic<Message> for Collector {
    fn ta(&self) -> Duration {
        if self.report_pending {
            Duration::ZERO
        } else {
            Duration::MAX
        }
    }
    fn initial_ta(&self) -> Duration {
        Duration::MAX
    }
    fn delta_int(&mut self) {
        self.report_pending = false;
    }
    fn delta_ext(&mut self, elapsed: Duration, inputs: &PortBuffer<Message>) {
        self.now += elapsed;
        for message in inputs.get("done") {
            if let Message::Job { id, .. } = message {
                let issued = self.period * *id;
                self.total_latency += (self.now - issued).as_secs_f64();
                self.completed += 1;
                self.report_pending = true;
            }
        }
    }
    fn lambda(&self, outputs: &mut PortBuffer<Message>) {
        outputs.put(
            "stats",
            Message::Stats {
                completed: self.completed,
                mean_latency: self.total_latency / f64::from(self.completed.max(1)),
            },
        );
    }
}

fn main() -> Result<(), SimulationError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // ---------------
    // Bench assembly.
    // ---------------

    let period = Duration::from_secs(2);

    let mut plant = Coupled::new("plant");
    let server = plant.add_atomic("server", Server::default());
    let collector = plant.add_atomic("collector", Collector::new(period));
    plant.add_eic("jobs", server, "jobs")?;
    plant.add_ic(server, "done", collector, "done")?;
    plant.add_eoc(collector, "stats", "stats")?;
    // Report completions before starting the next job.
    plant.set_select(Priority::new([collector, server]));

    let mut bench = Coupled::new("bench");
    let generator = bench.add_atomic("generator", Generator::new(period, vec![1.0, 3.0, 2.5]));
    let plant = bench.add_coupled(plant);
    bench.add_ic(generator, "jobs", plant, "jobs")?;
    bench.add_eoc(plant, "stats", "stats")?;
    // Let jobs arrive before completions at equal times.
    bench.set_select(|candidates: &[ChildId]| candidates[0]);

    let t0 = MonotonicTime::EPOCH;
    let mut simu = SimInit::new(bench).init_flat(t0)?;

    // ----------
    // Simulation.
    // ----------

    simu.run_until(StopAt::new(t0 + Duration::from_secs(60)))?;

    let last = simu.outputs().last().map(|event| event.value.clone());
    if let Some(Message::Stats {
        completed,
        mean_latency,
    }) = last
    {
        println!(
            "{} pulses, {} jobs completed, mean latency {:.2}s",
            simu.pulse_count(),
            completed,
            mean_latency
        );
        // Jobs are issued every 2s with an average workload of 2.17s: the
        // server falls behind.
        assert!(completed < 31);
        assert!(mean_latency > 1.0);
    }

    Ok(())
}
