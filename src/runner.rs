//! Support for long-running, possibly non-terminating algorithms.
//!
//! The algorithms in this crate (Froidure-Pin enumeration, Knuth-Bendix
//! completion, pair-orbit congruence enumeration) may legitimately run
//! forever on infinite or undecidable instances. The [`Runner`] trait
//! gives them a common control surface: run to completion, run for a
//! bounded amount of wall-clock time, run until a caller-supplied
//! predicate holds, and cooperative cancellation from another thread.
//!
//! An implementation supplies a bounded unit of work ([`Runner::step`])
//! and a completion test ([`Runner::finished`]); the provided methods
//! loop the step and check the stopping conditions between steps. Kills
//! are wait-free: [`StopHandle::kill`] sets an atomic flag which the
//! next check-point observes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The state of a [`Runner`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum State {
    /// None of `run`, `run_for` or `run_until` has been invoked.
    NeverRun = 0,
    /// Running to completion via [`Runner::run`].
    RunningToFinish = 1,
    /// Running for a fixed amount of time via [`Runner::run_for`].
    RunningFor = 2,
    /// Running until a predicate holds via [`Runner::run_until`].
    RunningUntil = 3,
    /// A `run_for` stopped because its time budget elapsed.
    TimedOut = 4,
    /// A `run_until` stopped because the predicate returned `true`.
    StoppedByPredicate = 5,
    /// Not currently running; a run has returned.
    NotRunning = 6,
    /// Killed from another thread; the state never leaves `Dead`.
    Dead = 7,
}

impl State {
    fn from_u8(x: u8) -> Self {
        match x {
            0 => Self::NeverRun,
            1 => Self::RunningToFinish,
            2 => Self::RunningFor,
            3 => Self::RunningUntil,
            4 => Self::TimedOut,
            5 => Self::StoppedByPredicate,
            6 => Self::NotRunning,
            7 => Self::Dead,
            _ => unreachable!("invalid runner state"),
        }
    }
}

/// A handle permitting another thread to kill a running [`Runner`].
///
/// Obtained from [`Runner::stop_handle`]; cloning is cheap and all
/// clones refer to the same runner.
#[derive(Clone, Debug)]
pub struct StopHandle {
    state: Arc<AtomicU8>,
}

impl StopHandle {
    /// Kills the associated runner.
    ///
    /// Wait-free; the in-flight step is not interrupted but the next
    /// check-point will terminate the run, after which the state is
    /// [`State::Dead`] forever.
    pub fn kill(&self) {
        self.state.store(State::Dead as u8, Ordering::SeqCst);
    }

    /// Returns `true` if the associated runner has been killed.
    pub fn dead(&self) -> bool {
        self.state.load(Ordering::SeqCst) == State::Dead as u8
    }
}

/// The bookkeeping shared by every [`Runner`] implementation.
///
/// Holds the atomic state word, the timing data for `run_for`, and the
/// reporting cadence of the progress records described in the crate
/// documentation.
#[derive(Debug)]
pub struct RunnerCore {
    state: Arc<AtomicU8>,
    start_time: Option<Instant>,
    run_for: Option<Duration>,
    report_prefix: String,
    report_every: Duration,
    last_report: Option<Instant>,
}

impl Default for RunnerCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RunnerCore {
    /// Copies all fields except the kill channel: the clone gets a fresh
    /// state word with the same value, so killing one copy does not kill
    /// the other.
    fn clone(&self) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(self.state.load(Ordering::SeqCst))),
            start_time: self.start_time,
            run_for: self.run_for,
            report_prefix: self.report_prefix.clone(),
            report_every: self.report_every,
            last_report: self.last_report,
        }
    }
}

impl RunnerCore {
    /// Creates a core in the [`State::NeverRun`] state, reporting every
    /// second under an empty prefix.
    pub fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(State::NeverRun as u8)),
            start_time: None,
            run_for: None,
            report_prefix: String::new(),
            report_every: Duration::from_secs(1),
            last_report: None,
        }
    }

    /// The current state.
    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Sets the state, unless the runner is already dead: `Dead` is
    /// absorbing, so a transition racing with a kill loses.
    fn transition(&self, new: State) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                if cur == State::Dead as u8 {
                    None
                } else {
                    Some(new as u8)
                }
            });
    }

    /// Returns `true` if the runner was killed.
    pub fn dead(&self) -> bool {
        self.state() == State::Dead
    }

    /// Returns `true` if the time budget of an in-progress `run_for` has
    /// elapsed, or the last run stopped because it did.
    pub fn timed_out(&self) -> bool {
        match self.state() {
            State::RunningFor => match (self.start_time, self.run_for) {
                (Some(start), Some(budget)) => start.elapsed() >= budget,
                _ => false,
            },
            s => s == State::TimedOut,
        }
    }

    /// Returns `true` if the runner was stopped early: killed, timed out
    /// or stopped by predicate.
    pub fn stopped(&self) -> bool {
        self.dead() || self.timed_out() || self.state() == State::StoppedByPredicate
    }

    /// The instant the current or last run started, if any run started.
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time
    }

    /// Sets the prefix of the progress records of this runner.
    pub fn set_report_prefix(&mut self, prefix: &str) {
        self.report_prefix = prefix.to_owned();
    }

    /// The prefix of the progress records of this runner.
    pub fn report_prefix(&self) -> &str {
        &self.report_prefix
    }

    /// Sets the minimum interval between progress records.
    pub fn set_report_every(&mut self, interval: Duration) {
        self.report_every = interval;
    }

    /// Returns `true` when a progress record is due, and restarts the
    /// report interval. Implementations call this at their check-points
    /// and emit one newline-terminated record when it returns `true`.
    pub fn should_report(&mut self) -> bool {
        let now = Instant::now();
        match self.last_report {
            Some(last) if now.duration_since(last) < self.report_every => false,
            _ => {
                self.last_report = Some(now);
                true
            }
        }
    }
}

/// A long-running algorithm with bounded execution and cooperative
/// cancellation.
///
/// Implementations provide [`step`](Self::step), [`finished`](Self::finished)
/// and access to their [`RunnerCore`]; the driving loops are provided.
pub trait Runner {
    /// The shared runner bookkeeping.
    fn core(&self) -> &RunnerCore;

    /// The shared runner bookkeeping, mutably.
    fn core_mut(&mut self) -> &mut RunnerCore;

    /// Performs one bounded unit of work.
    ///
    /// A unit should be small enough that the stopping conditions are
    /// checked with reasonable granularity, and large enough that the
    /// checks do not dominate; long inner loops should additionally poll
    /// `self.core().dead()`.
    fn step(&mut self);

    /// Returns `true` if the problem this runner was constructed for has
    /// been completely solved, so that no further [`step`](Self::step)
    /// is required.
    fn finished(&self) -> bool;

    /// Returns `true` if this runner can make no further progress
    /// without finishing, for example because a resource limit in its
    /// settings was reached. The driving loops stop on a stalled
    /// runner; the default is never to stall.
    fn stalled(&self) -> bool {
        false
    }

    /// Runs until [`finished`](Self::finished) or killed.
    fn run(&mut self) {
        self.core().transition(State::RunningToFinish);
        self.core_mut().start_time = Some(Instant::now());
        self.core_mut().run_for = None;
        while !self.finished() && !self.stalled() && !self.core().dead() {
            self.step();
        }
        self.core()
            .transition(if self.core().dead() { State::Dead } else { State::NotRunning });
    }

    /// Runs until [`finished`](Self::finished), killed, or the given
    /// amount of wall-clock time has elapsed.
    fn run_for(&mut self, budget: Duration) {
        self.core().transition(State::RunningFor);
        self.core_mut().start_time = Some(Instant::now());
        self.core_mut().run_for = Some(budget);
        while !self.finished() && !self.stalled() && !self.core().dead() && !self.core().timed_out()
        {
            self.step();
        }
        let timed_out = self.core().timed_out() && !self.finished();
        self.core().transition(if self.core().dead() {
            State::Dead
        } else if timed_out {
            State::TimedOut
        } else {
            State::NotRunning
        });
        self.core_mut().run_for = None;
    }

    /// Runs until [`finished`](Self::finished), killed, or the given
    /// nullary predicate returns `true`.
    ///
    /// The predicate is borrowed for the duration of the call only; it
    /// is polled between units of work and never stored.
    fn run_until(&mut self, pred: &mut dyn FnMut() -> bool) {
        self.core().transition(State::RunningUntil);
        self.core_mut().start_time = Some(Instant::now());
        let mut stopped_by_predicate = false;
        while !self.finished() && !self.stalled() && !self.core().dead() {
            if pred() {
                stopped_by_predicate = true;
                break;
            }
            self.step();
        }
        self.core().transition(if self.core().dead() {
            State::Dead
        } else if stopped_by_predicate {
            State::StoppedByPredicate
        } else {
            State::NotRunning
        });
    }

    /// Kills this runner; see [`StopHandle::kill`].
    fn kill(&self) {
        self.stop_handle().kill();
    }

    /// Returns a handle through which another thread can kill this
    /// runner.
    fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Arc::clone(&self.core().state),
        }
    }

    /// The current state.
    fn current_state(&self) -> State {
        self.core().state()
    }

    /// Returns `true` if any of `run`, `run_for` or `run_until` has been
    /// invoked.
    fn started(&self) -> bool {
        self.current_state() != State::NeverRun
    }

    /// Returns `true` if currently inside one of the run loops.
    fn running(&self) -> bool {
        matches!(
            self.current_state(),
            State::RunningToFinish | State::RunningFor | State::RunningUntil
        )
    }

    /// Returns `true` if the last run stopped early; see
    /// [`RunnerCore::stopped`].
    fn stopped(&self) -> bool {
        self.core().stopped()
    }

    /// Returns `true` if this runner was killed.
    fn dead(&self) -> bool {
        self.core().dead()
    }

    /// Returns `true` if a `run_for` ran out of time; see
    /// [`RunnerCore::timed_out`].
    fn timed_out(&self) -> bool {
        self.core().timed_out()
    }

    /// The prefix under which this runner emits its progress records.
    fn report_prefix(&self) -> &str {
        self.core().report_prefix()
    }

    /// Sets the minimum interval between progress records of this
    /// runner.
    fn report_every(&mut self, interval: Duration) {
        self.core_mut().set_report_every(interval);
    }
}

impl<R: Runner + ?Sized> Runner for Box<R> {
    fn core(&self) -> &RunnerCore {
        (**self).core()
    }

    fn core_mut(&mut self) -> &mut RunnerCore {
        (**self).core_mut()
    }

    fn step(&mut self) {
        (**self).step()
    }

    fn finished(&self) -> bool {
        (**self).finished()
    }

    fn stalled(&self) -> bool {
        (**self).stalled()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Counts up to a target in increments of one per step, sleeping a
    /// little so that time-bounded runs can be observed.
    pub(crate) struct Counter {
        core: RunnerCore,
        pub count: u64,
        pub target: u64,
        pub step_delay: Duration,
    }

    impl Counter {
        pub(crate) fn new(target: u64, step_delay: Duration) -> Self {
            Self {
                core: RunnerCore::new(),
                count: 0,
                target,
                step_delay,
            }
        }
    }

    impl Runner for Counter {
        fn core(&self) -> &RunnerCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut RunnerCore {
            &mut self.core
        }

        fn step(&mut self) {
            std::thread::sleep(self.step_delay);
            self.count += 1;
        }

        fn finished(&self) -> bool {
            self.count >= self.target
        }
    }

    #[test]
    fn run_to_finish() {
        let mut c = Counter::new(10, Duration::from_millis(0));
        assert_eq!(c.current_state(), State::NeverRun);
        assert!(!c.started());
        c.run();
        assert!(c.finished());
        assert_eq!(c.count, 10);
        assert_eq!(c.current_state(), State::NotRunning);
        assert!(!c.stopped());
    }

    #[test]
    fn run_for_times_out() {
        let mut c = Counter::new(u64::MAX, Duration::from_millis(1));
        c.run_for(Duration::from_millis(20));
        assert!(!c.finished());
        assert_eq!(c.current_state(), State::TimedOut);
        assert!(c.timed_out());
        assert!(c.stopped());
    }

    #[test]
    fn run_until_predicate() {
        let mut c = Counter::new(u64::MAX, Duration::from_millis(0));
        let mut calls = 0u64;
        c.run_until(&mut || {
            calls += 1;
            calls > 5
        });
        assert_eq!(c.current_state(), State::StoppedByPredicate);
        assert!(c.stopped());
    }

    #[test]
    fn kill_is_absorbing() {
        let mut c = Counter::new(u64::MAX, Duration::from_millis(0));
        let handle = c.stop_handle();
        handle.kill();
        c.run();
        assert!(c.dead());
        assert_eq!(c.current_state(), State::Dead);
        // no transition leaves Dead
        c.run();
        assert_eq!(c.current_state(), State::Dead);
    }

    #[test]
    fn finished_run_is_idempotent() {
        let mut c = Counter::new(3, Duration::from_millis(0));
        c.run();
        let count = c.count;
        c.run();
        assert_eq!(c.count, count);
        assert_eq!(c.current_state(), State::NotRunning);
    }
}
