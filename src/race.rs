//! Running several algorithms on the same problem in parallel.
//!
//! A [`Race`] holds a collection of [`Runner`]s that attack the same
//! logical problem by different means, and runs them on worker threads
//! until the first of them finishes. The winner is adopted and the
//! losers are killed and joined before [`Race::run`] returns, so results
//! are only ever read from a runner that is no longer shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use log::{debug, trace};

use crate::runner::{Runner, StopHandle};

/// A competitive race between runners attacking the same problem.
pub struct Race<R> {
    runners: Vec<R>,
    max_threads: usize,
    winner: Option<usize>,
}

impl<R> Default for Race<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Race<R> {
    /// Creates an empty race using up to one worker thread per available
    /// CPU.
    pub fn new() -> Self {
        Self {
            runners: Vec::new(),
            max_threads: num_cpus::get(),
            winner: None,
        }
    }

    /// Sets the maximum number of worker threads used by [`run`](Race::run).
    pub fn set_max_threads(&mut self, n: usize) {
        assert!(n > 0, "a race requires at least one thread");
        self.max_threads = n;
    }

    /// Adds a runner to the race. Runners inserted earlier win ties.
    pub fn add_runner(&mut self, runner: R) {
        assert!(self.winner.is_none(), "the race has already been run");
        self.runners.push(runner);
    }

    /// The number of runners in the race.
    pub fn number_of_runners(&self) -> usize {
        self.runners.len()
    }

    /// The runners of this race, in insertion order.
    pub fn runners(&self) -> &[R] {
        &self.runners
    }

    /// The runners of this race, mutably.
    pub fn runners_mut(&mut self) -> &mut [R] {
        &mut self.runners
    }

    /// The index of the first runner satisfying `pred`, if any.
    pub fn find_runner<P: FnMut(&R) -> bool>(&self, pred: P) -> Option<usize> {
        self.runners.iter().position(pred)
    }

    /// The index of the winning runner, if the race has been decided.
    pub fn winner_index(&self) -> Option<usize> {
        self.winner
    }

    /// The winning runner, if the race has been decided.
    pub fn winner(&self) -> Option<&R> {
        self.winner.map(|i| &self.runners[i])
    }

    /// The winning runner, mutably, if the race has been decided.
    pub fn winner_mut(&mut self) -> Option<&mut R> {
        self.winner.map(move |i| &mut self.runners[i])
    }
}

impl<R: Runner + Send> Race<R> {
    /// Kills every runner in the race.
    pub fn kill_all(&self) {
        for runner in &self.runners {
            runner.kill();
        }
    }

    /// Runs the race to completion: every runner is driven by
    /// [`Runner::run`] until the first one finishes, at which point all
    /// others are killed and joined.
    ///
    /// Returns the index of the winner, or `None` if no runner finished
    /// (for example because the whole race was killed). Running a
    /// decided race again returns the recorded winner.
    pub fn run(&mut self) -> Option<usize> {
        self.run_inner(None::<&(dyn Fn() -> bool + Sync)>)
    }

    /// Like [`run`](Race::run), but each worker drives its runner with
    /// [`Runner::run_until`] on the shared predicate, so the race also
    /// stops (without a winner) once the predicate holds.
    pub fn run_until<F: Fn() -> bool + Sync>(&mut self, pred: F) -> Option<usize> {
        self.run_inner(Some(&pred))
    }

    fn run_inner(&mut self, pred: Option<&(dyn Fn() -> bool + Sync)>) -> Option<usize> {
        if self.winner.is_some() {
            return self.winner;
        }
        if let Some(i) = self.runners.iter().position(|r| r.finished()) {
            self.winner = Some(i);
            return self.winner;
        }
        if self.runners.is_empty() {
            return None;
        }

        let handles: Vec<StopHandle> = self.runners.iter().map(Runner::stop_handle).collect();
        let workers = self.runners.len().min(self.max_threads);
        debug!(
            "racing {} runners on {} threads",
            self.runners.len(),
            workers
        );

        let decided = AtomicBool::new(false);
        let (tx, rx) = crossbeam_channel::unbounded::<usize>();

        let mut buckets: Vec<Vec<(usize, &mut R)>> = (0..workers).map(|_| Vec::new()).collect();
        for (i, runner) in self.runners.iter_mut().enumerate() {
            buckets[i % workers].push((i, runner));
        }

        let winner = thread::scope(|s| {
            for bucket in buckets {
                let tx = tx.clone();
                let decided = &decided;
                s.spawn(move || {
                    for (index, runner) in bucket {
                        if decided.load(Ordering::SeqCst) {
                            break;
                        }
                        match pred {
                            None => runner.run(),
                            Some(p) => runner.run_until(&mut || p()),
                        }
                        if runner.finished() {
                            // a send can only fail after the race has been
                            // decided and the receiver dropped
                            let _ = tx.send(index);
                            break;
                        }
                        trace!("race runner {} stopped without finishing", index);
                    }
                });
            }
            drop(tx);

            let mut winner = rx.recv().ok();
            decided.store(true, Ordering::SeqCst);
            // runners that finished in the same instant are already in
            // the channel; ties go to the earliest inserted
            while let Ok(index) = rx.try_recv() {
                if index < winner.unwrap_or(usize::MAX) {
                    winner = Some(index);
                }
            }
            if let Some(index) = winner {
                for (i, handle) in handles.iter().enumerate() {
                    if i != index {
                        handle.kill();
                    }
                }
            }
            winner
            // leaving the scope joins every worker
        });

        if let Some(index) = winner {
            debug!("race won by runner {}", index);
        }
        self.winner = winner;
        winner
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::runner::tests::Counter;
    use crate::runner::State;

    #[test]
    fn first_to_finish_wins() {
        let mut race = Race::new();
        // A finishes after roughly 100ms, B would need roughly 500
        race.add_runner(Counter::new(10, Duration::from_millis(10)));
        race.add_runner(Counter::new(50, Duration::from_millis(10)));
        let winner = race.run();
        assert_eq!(winner, Some(0));
        assert_eq!(race.winner_index(), Some(0));
        assert!(race.winner().unwrap().finished());
        assert_eq!(race.runners()[1].current_state(), State::Dead);
    }

    #[test]
    fn rerun_returns_recorded_winner() {
        let mut race = Race::new();
        race.add_runner(Counter::new(1, Duration::from_millis(0)));
        assert_eq!(race.run(), Some(0));
        assert_eq!(race.run(), Some(0));
    }

    #[test]
    fn run_until_can_stop_without_winner() {
        let mut race = Race::new();
        race.add_runner(Counter::new(u64::MAX, Duration::from_millis(1)));
        let winner = race.run_until(|| true);
        assert_eq!(winner, None);
        assert_eq!(race.winner_index(), None);
    }

    #[test]
    fn more_runners_than_threads() {
        let mut race = Race::new();
        race.set_max_threads(2);
        for target in [40, 30, 20, 3] {
            race.add_runner(Counter::new(target, Duration::from_millis(1)));
        }
        let winner = race.run();
        assert!(winner.is_some());
        assert!(race.winner().unwrap().finished());
    }
}
