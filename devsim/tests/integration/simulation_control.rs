//! Run control from other threads.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use devsim::control::{ControlError, RunOptions, RunStatus, Runnable};
use devsim::model::{ChildId, Coupled};
use devsim::simulation::{RunnableProcessor, SimInit, SimulationError, TransitionKind};
use devsim::time::{NeverStop, StopAfterPulses};

use crate::bench::{at, traced, Periodic, Trace};

/// A bench that never becomes passive.
fn endless_bench() -> SimInit<String> {
    let mut top = Coupled::new("top");
    top.add_atomic("clock", Periodic::new("clock", 1));

    SimInit::new(top)
}

/// Forwards all status changes to a channel.
fn status_channel(simu: &impl RunnableProcessor) -> mpsc::Receiver<RunStatus> {
    let (tx, rx) = mpsc::channel();
    simu.handle().on_status_change(move |status| {
        let _ = tx.send(status);
    });

    rx
}

/// Blocks until the given status is observed.
fn wait_for(rx: &mpsc::Receiver<RunStatus>, expected: RunStatus) {
    while rx.recv().unwrap() != expected {}
}

fn pulses<P: RunnableProcessor>(simu: &mut P) -> u64 {
    simu.parts().0.progress().pulses
}

#[test]
fn stop_from_another_thread() {
    let mut simu = endless_bench().init(at(0)).unwrap();
    let handle = simu.handle();
    let rx = status_channel(&simu);

    let stopper = thread::spawn(move || {
        wait_for(&rx, RunStatus::Running);
        thread::sleep(Duration::from_millis(50));
        handle.stop();
    });

    simu.run_with(
        &mut NeverStop,
        RunOptions::new().with_delay(Duration::from_millis(5)),
    )
    .unwrap();
    stopper.join().unwrap();

    let pulse_count = simu.pulse_count();
    assert!(pulse_count > 0);
    assert!(simu.is_stopping());
    assert!(!simu.is_running());

    // The run cannot be resumed and the state is left untouched.
    assert_eq!(
        simu.run(),
        Err(SimulationError::Control(ControlError::CannotRestart))
    );
    assert_eq!(simu.pulse_count(), pulse_count);
}

/// Starts a paused run, executes `steps` single steps, then stops it.
fn run_stepped<P>(mut simu: P, steps: u64) -> u64
where
    P: RunnableProcessor,
    P::Engine: Runnable<Error = SimulationError>,
{
    let handle = simu.handle();
    let rx = status_channel(&simu);

    let controller = thread::spawn(move || {
        wait_for(&rx, RunStatus::Pausing);
        handle.next(steps).unwrap();
        wait_for(&rx, RunStatus::Stepping);
        wait_for(&rx, RunStatus::Pausing);
        handle.stop();
    });

    simu.run_with(&mut NeverStop, RunOptions::new().paused()).unwrap();
    controller.join().unwrap();

    pulses(&mut simu)
}

#[test]
fn step_a_paused_run() {
    let simu = endless_bench().init(at(0)).unwrap();
    assert_eq!(run_stepped(simu, 3), 3);

    let simu = endless_bench().init_flat(at(0)).unwrap();
    assert_eq!(run_stepped(simu, 3), 3);
}

#[test]
fn stop_a_paused_run() {
    let mut simu = endless_bench().init(at(0)).unwrap();
    let handle = simu.handle();
    let rx = status_channel(&simu);

    let stopper = thread::spawn(move || {
        wait_for(&rx, RunStatus::Pausing);
        handle.stop();
    });

    simu.run_with(&mut NeverStop, RunOptions::new().paused()).unwrap();
    stopper.join().unwrap();

    assert_eq!(simu.pulse_count(), 0);
    assert_eq!(simu.handle().status(), RunStatus::Stopped);
}

#[test]
fn pause_resume_and_step() {
    let mut simu = endless_bench().init_flat(at(0)).unwrap();
    let handle = simu.handle();
    let rx = status_channel(&simu);
    let history = Arc::new(Mutex::new(Vec::new()));
    let recorder = history.clone();
    simu.handle()
        .on_status_change(move |status| recorder.lock().unwrap().push(status));

    let controller = thread::spawn(move || {
        wait_for(&rx, RunStatus::Running);
        assert_eq!(handle.next(1), Err(ControlError::NotPaused));

        handle.pause().unwrap();
        wait_for(&rx, RunStatus::Pausing);
        assert!(handle.is_pausing());
        handle.next(2).unwrap();
        wait_for(&rx, RunStatus::Pausing);

        handle.pause().unwrap();
        wait_for(&rx, RunStatus::Running);
        handle.stop();
        wait_for(&rx, RunStatus::Stopped);
        assert_eq!(handle.pause(), Err(ControlError::Stopped));
    });

    simu.run_with(
        &mut NeverStop,
        RunOptions::new().with_delay(Duration::from_millis(2)),
    )
    .unwrap();
    controller.join().unwrap();

    assert_eq!(
        *history.lock().unwrap(),
        vec![
            RunStatus::Running,
            RunStatus::Pausing,
            RunStatus::Stepping,
            RunStatus::Pausing,
            RunStatus::Running,
            RunStatus::Stopping,
            RunStatus::Stopped,
        ]
    );
}

/// Pauses a running simulation, resumes it, then stops it.
fn pause_and_resume<P>(mut simu: P, trace: &Trace) -> u64
where
    P: RunnableProcessor,
    P::Engine: Runnable<Error = SimulationError>,
{
    let handle = simu.handle();
    let rx = status_channel(&simu);
    let recorded = trace.clone();

    let controller = thread::spawn(move || {
        wait_for(&rx, RunStatus::Running);
        thread::sleep(Duration::from_millis(20));
        handle.pause().unwrap();
        wait_for(&rx, RunStatus::Pausing);

        // The in-flight pulse may still complete after the request.
        thread::sleep(Duration::from_millis(20));
        let paused_len = recorded.lock().unwrap().len();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(recorded.lock().unwrap().len(), paused_len);

        handle.pause().unwrap();
        wait_for(&rx, RunStatus::Running);
        thread::sleep(Duration::from_millis(20));
        handle.stop();
    });

    simu.run_with(
        &mut NeverStop,
        RunOptions::new().with_delay(Duration::from_millis(2)),
    )
    .unwrap();
    controller.join().unwrap();

    pulses(&mut simu)
}

#[test]
fn resuming_neither_skips_nor_repeats_pulses() {
    let (init, trace) = traced(endless_bench());
    let hierarchical = init.init(at(0)).unwrap();
    let hierarchical_pulses = pause_and_resume(hierarchical, &trace);

    let (init, flat_trace) = traced(endless_bench());
    let flat = init.init_flat(at(0)).unwrap();
    let flat_pulses = pause_and_resume(flat, &flat_trace);

    for (pulse_count, trace) in [(hierarchical_pulses, trace), (flat_pulses, flat_trace)] {
        let trace = trace.lock().unwrap();
        assert!(pulse_count > 2);
        assert_eq!(trace.len() as u64, pulse_count);
        for (secs, (time, component, kind)) in trace.iter().enumerate() {
            assert_eq!(*time, at(secs as u64));
            assert_eq!(component, "top/clock");
            assert_eq!(*kind, TransitionKind::Internal);
        }
    }
}

#[test]
fn control_requests_before_run() {
    let simu = endless_bench().init(at(0)).unwrap();

    assert_eq!(simu.handle().status(), RunStatus::Initial);
    assert_eq!(simu.pause(), Err(ControlError::NotStarted));
    assert_eq!(simu.next(1), Err(ControlError::NotPaused));
    assert!(!simu.is_running());
    assert!(!simu.is_stopping());
}

#[test]
fn stopped_listeners_and_cleanup() {
    let cleaned_up = Arc::new(AtomicBool::new(false));
    let reported = Arc::new(AtomicU64::new(0));

    let mut top = Coupled::new("top");
    top.add_atomic(
        "clock",
        Periodic::new("clock", 1).with_cleanup_flag(cleaned_up.clone()),
    );
    let mut simu = SimInit::new(top).init(at(0)).unwrap();
    let report = reported.clone();
    let released = cleaned_up.clone();
    simu.on_stopped(move |core| {
        // Models are released after the stopped listeners are called.
        assert!(!released.load(Ordering::Relaxed));
        report.store(core.pulse_count(), Ordering::Relaxed);
    });

    simu.run_until(StopAfterPulses::new(4)).unwrap();

    assert_eq!(reported.load(Ordering::Relaxed), 4);
    assert!(cleaned_up.load(Ordering::Relaxed));
    assert_eq!(simu.handle().status(), RunStatus::Stopped);
}

#[test]
fn failing_run_is_cleaned_up() {
    let cleaned_up = Arc::new(AtomicBool::new(false));

    // Borrow an identifier that has no counterpart in `top`.
    let mut other = Coupled::<String>::new("other");
    other.add_atomic("x", Periodic::new("x", 1));
    let foreign = other.add_atomic("y", Periodic::new("y", 1));

    let mut top = Coupled::new("top");
    top.add_atomic(
        "clock",
        Periodic::new("clock", 1).with_cleanup_flag(cleaned_up.clone()),
    );
    top.set_select(move |_: &[ChildId]| foreign);

    let mut simu = SimInit::new(top).init_flat(at(0)).unwrap();
    let stopped = Arc::new(AtomicBool::new(false));
    let flag = stopped.clone();
    simu.on_stopped(move |_| flag.store(true, Ordering::Relaxed));

    assert_eq!(
        simu.run(),
        Err(SimulationError::InvalidSelection {
            component: "top".to_owned(),
            selected: foreign,
        })
    );
    assert_eq!(simu.pulse_count(), 0);
    assert!(stopped.load(Ordering::Relaxed));
    assert!(cleaned_up.load(Ordering::Relaxed));
    assert_eq!(simu.handle().status(), RunStatus::Stopped);
}

#[test]
fn delay_paces_the_run() {
    let mut simu = endless_bench().init(at(0)).unwrap();

    let start = Instant::now();
    simu.run_with(
        &mut StopAfterPulses::new(3),
        RunOptions::new().with_delay(Duration::from_millis(20)),
    )
    .unwrap();

    assert_eq!(simu.pulse_count(), 3);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn fixed_pace_processor_ignores_delay() {
    let mut simu = endless_bench()
        .set_fixed_pace(true)
        .init_flat(at(0))
        .unwrap();
    simu.set_delay(Duration::from_secs(3600));

    let start = Instant::now();
    simu.run_with(&mut StopAfterPulses::new(5), RunOptions::new()).unwrap();

    assert_eq!(simu.pulse_count(), 5);
    assert!(start.elapsed() < Duration::from_secs(60));
}
