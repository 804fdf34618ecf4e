//! Simulation time and stop policies.
//!
//! This module provides most notably:
//!
//! * [`MonotonicTime`]: the timestamp type used for all simulation clocks,
//!   re-exported from the [`tai_time`] crate; [`MonotonicTime::MAX`] stands
//!   for "never" and is the next-event time of passive components,
//! * [`StopPolicy`]: a trait for predicates deciding when a run has reached
//!   its end, implemented by [`StopAt`], [`StopAfterPulses`], [`NeverStop`]
//!   and by any `FnMut(&Progress) -> bool` closure.
//!
//! # Examples
//!
//! A policy ending the run once simulation time would go beyond 12s:
//!
//! ```
//! use std::time::Duration;
//!
//! use devsim::time::{MonotonicTime, Progress, StopAt, StopPolicy};
//!
//! let t0 = MonotonicTime::EPOCH;
//! let mut policy = StopAt::new(t0 + Duration::from_secs(12));
//!
//! let progress = Progress {
//!     time: t0 + Duration::from_secs(10),
//!     next_time: t0 + Duration::from_secs(15),
//!     pulses: 3,
//! };
//! assert!(policy.has_reached_end(&progress));
//! ```

use std::fmt;
use std::time::Duration;

pub use tai_time::MonotonicTime;

/// Returns the time of the next internal event for a component that
/// underwent its last event at `time` and advertises the time advance `ta`.
///
/// Time advances that cannot be represented, such as `Duration::MAX`, make
/// the component passive.
pub(crate) fn next_event_time(time: MonotonicTime, ta: Duration) -> MonotonicTime {
    time.checked_add(ta).unwrap_or(MonotonicTime::MAX)
}

/// Progress of a runnable processor, as observed between two pulses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Time of the last pulse, or the start time if none was executed.
    pub time: MonotonicTime,
    /// Time at which the next pulse would take place.
    pub next_time: MonotonicTime,
    /// Number of pulses executed so far.
    pub pulses: u64,
}

/// A predicate deciding whether a run has reached its termination condition.
///
/// The policy is polled once before every pulse.
pub trait StopPolicy: Send {
    /// Returns `true` if no further pulse should be executed.
    fn has_reached_end(&mut self, progress: &Progress) -> bool;
}

impl<F> StopPolicy for F
where
    F: FnMut(&Progress) -> bool + Send,
{
    fn has_reached_end(&mut self, progress: &Progress) -> bool {
        self(progress)
    }
}

/// Ends a run before the first pulse scheduled strictly after the end time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StopAt {
    end_time: MonotonicTime,
}

impl StopAt {
    /// Creates a policy that lets all pulses up to and including `end_time`
    /// execute.
    pub fn new(end_time: MonotonicTime) -> Self {
        Self { end_time }
    }

    /// Returns the end time.
    pub fn end_time(&self) -> MonotonicTime {
        self.end_time
    }
}

impl StopPolicy for StopAt {
    fn has_reached_end(&mut self, progress: &Progress) -> bool {
        progress.next_time > self.end_time
    }
}

/// Ends a run after a fixed number of pulses.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StopAfterPulses {
    pulses: u64,
}

impl StopAfterPulses {
    /// Creates a policy that lets `pulses` pulses execute.
    pub fn new(pulses: u64) -> Self {
        Self { pulses }
    }
}

impl StopPolicy for StopAfterPulses {
    fn has_reached_end(&mut self, progress: &Progress) -> bool {
        progress.pulses >= self.pulses
    }
}

/// A policy that never ends a run.
///
/// A run using this policy terminates only when the model becomes passive or
/// when it is stopped.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NeverStop;

impl StopPolicy for NeverStop {
    fn has_reached_end(&mut self, _: &Progress) -> bool {
        false
    }
}

/// Formats a simulation time, printing `inf` for [`MonotonicTime::MAX`].
pub(crate) struct DisplayTime(pub(crate) MonotonicTime);

impl DisplayTime {
    pub(crate) fn of(time: &MonotonicTime) -> Self {
        Self(*time)
    }
}

impl fmt::Display for DisplayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == MonotonicTime::MAX {
            return f.write_str("inf");
        }
        write!(f, "{}.{:09}", self.0.as_secs(), self.0.subsec_nanos())
    }
}
