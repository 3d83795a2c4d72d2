//! Loss-run state machine.
//!
//! Folds an ordered stream of `(timestamp, is_loss)` observations into closed
//! loss runs. A run is bounded by the last good observation before the first
//! loss and by the first good observation after the last loss:
//!
//! ```text
//! (t0, good) (t1, lost) (t2, lost) (t3, good)  =>  t0 => t3 [2 packet(s) lost]
//! ```
//!
//! A run still open when the stream ends is never emitted; callers that know
//! the expected total (the live tracker) reconcile it themselves.

use std::fmt;

/// A maximal span of consecutive lost or out-of-order probes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LossRun<T> {
    /// Timestamp of the last good probe before the run
    pub start: T,
    /// Timestamp of the first good probe after the run
    pub end: T,
    /// Number of probes lost in the run
    pub count: u64,
}

impl<T: fmt::Display> fmt::Display for LossRun<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 1 {
            write!(f, "{}", self.end)
        } else {
            write!(f, "{} => {} [{} packet(s) lost]", self.start, self.end, self.count)
        }
    }
}

/// Incremental loss-run tracker
#[derive(Debug, Clone)]
pub struct LossTracker<T> {
    last_had_loss: bool,
    last_timestamp: Option<T>,
    run: Option<LossRun<T>>,
}

impl<T> Default for LossTracker<T> {
    fn default() -> Self {
        Self {
            last_had_loss: false,
            last_timestamp: None,
            run: None,
        }
    }
}

impl<T: Clone> LossTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one observation; returns the run it closed, if any
    pub fn observe(&mut self, timestamp: T, is_loss: bool) -> Option<LossRun<T>> {
        let closed = match (self.last_had_loss, is_loss) {
            (false, false) => None,
            (false, true) => {
                // No earlier good line: the run starts at the loss itself
                let start = self
                    .last_timestamp
                    .clone()
                    .unwrap_or_else(|| timestamp.clone());
                self.run = Some(LossRun {
                    start: start.clone(),
                    end: start,
                    count: 1,
                });
                self.last_had_loss = true;
                None
            }
            (true, true) => {
                if let Some(run) = self.run.as_mut() {
                    run.count += 1;
                }
                None
            }
            (true, false) => {
                self.last_had_loss = false;
                self.run.take().map(|mut run| {
                    run.end = timestamp.clone();
                    run
                })
            }
        };

        self.last_timestamp = Some(timestamp);
        closed
    }

    /// The run opened but not yet closed by a good observation
    pub fn open_run(&self) -> Option<&LossRun<T>> {
        if self.last_had_loss {
            self.run.as_ref()
        } else {
            None
        }
    }
}

/// Lazily yields the closed runs of an observation stream
pub struct LossRuns<T, I> {
    observations: I,
    tracker: LossTracker<T>,
}

impl<T, I> LossRuns<T, I> {
    /// Run still open after the stream has been exhausted
    pub fn open_run(&self) -> Option<&LossRun<T>>
    where
        T: Clone,
    {
        self.tracker.open_run()
    }
}

impl<T, I> Iterator for LossRuns<T, I>
where
    T: Clone,
    I: Iterator<Item = (T, bool)>,
{
    type Item = LossRun<T>;

    fn next(&mut self) -> Option<Self::Item> {
        for (timestamp, is_loss) in self.observations.by_ref() {
            if let Some(run) = self.tracker.observe(timestamp, is_loss) {
                return Some(run);
            }
        }
        None
    }
}

/// Adapt an observation stream into its closed loss runs
pub fn loss_runs<T, I>(observations: I) -> LossRuns<T, I::IntoIter>
where
    T: Clone,
    I: IntoIterator<Item = (T, bool)>,
{
    LossRuns {
        observations: observations.into_iter(),
        tracker: LossTracker::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_bounded_by_good_probes() {
        let runs: Vec<_> = loss_runs([(0, false), (1, true), (2, true), (3, false)]).collect();
        assert_eq!(
            runs,
            vec![LossRun {
                start: 0,
                end: 3,
                count: 2
            }]
        );
    }

    #[test]
    fn test_single_loss() {
        let runs: Vec<_> = loss_runs([(10, false), (11, true), (12, false)]).collect();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].count, 1);
        assert_eq!(runs[0].start, 10);
        assert_eq!(runs[0].end, 12);
        // Single losses render with only the closing timestamp
        assert_eq!(runs[0].to_string(), "12");
    }

    #[test]
    fn test_multi_loss_rendering() {
        let run = LossRun {
            start: "a",
            end: "b",
            count: 3,
        };
        assert_eq!(run.to_string(), "a => b [3 packet(s) lost]");
    }

    #[test]
    fn test_no_loss() {
        let mut runs = loss_runs([(0, false), (1, false), (2, false)]);
        assert!(runs.next().is_none());
        assert!(runs.open_run().is_none());
    }

    #[test]
    fn test_trailing_run_not_emitted() {
        let mut runs = loss_runs([(0, false), (1, false), (2, true), (3, true)]);
        assert!(runs.next().is_none());

        let open = runs.open_run().expect("run left open");
        assert_eq!(open.start, 1);
        assert_eq!(open.count, 2);
    }

    #[test]
    fn test_multiple_runs_in_order() {
        let observations = [
            (0, false),
            (1, true),
            (2, false),
            (3, false),
            (4, true),
            (5, true),
            (6, true),
            (7, false),
        ];
        let runs: Vec<_> = loss_runs(observations).collect();
        assert_eq!(runs.len(), 2);
        assert_eq!((runs[0].start, runs[0].end, runs[0].count), (0, 2, 1));
        assert_eq!((runs[1].start, runs[1].end, runs[1].count), (3, 7, 3));
    }

    #[test]
    fn test_leading_loss_starts_at_itself() {
        let mut tracker = LossTracker::new();
        assert!(tracker.observe(5, true).is_none());
        let run = tracker.observe(6, false).expect("closed");
        assert_eq!(run.start, 5);
        assert_eq!(run.end, 6);
    }

    #[test]
    fn test_state_resets_after_close() {
        let mut tracker = LossTracker::new();
        tracker.observe(0, false);
        tracker.observe(1, true);
        assert!(tracker.open_run().is_some());
        tracker.observe(2, false);
        assert!(tracker.open_run().is_none());
        assert!(tracker.observe(3, false).is_none());
    }
}
