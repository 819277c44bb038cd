//! Cooperative two-tier task scheduler.
//!
//! [`Scheduler`] runs two classes of work inside discrete `tick()` calls:
//!
//! * **Priority tasks** — must run as close to their `next_run` as possible.
//!   Batch timing correctness depends on them.
//! * **Background tasks** — best-effort housekeeping, run only in the slack
//!   before the next priority deadline and starved indefinitely under
//!   priority pressure.  Correctness must never depend on them.
//!
//! There is no preemption and no locking: the caller sleeps between ticks
//! for the duration `tick()` returns, and every shared structure is touched
//! only from inside a tick.  The single-threaded tick boundary is the entire
//! concurrency discipline.
//!
//! # Guard interval
//! Background tasks stop running [`GUARD_MS`] before the next priority
//! deadline so a long housekeeping pass can never push a priority task past
//! its deadline.
//!
//! # Example
//! ```rust,ignore
//! let mut sched = Scheduler::new(priority_tasks, background_tasks);
//! loop {
//!     let sleep_ms = sched.tick(&clock)?;
//!     std::thread::sleep(Duration::from_millis(sleep_ms));
//! }
//! ```

pub mod error;

pub use error::SchedulerError;

use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, trace};

use crate::collections::MinHeap;

// ── Constants ─────────────────────────────────────────────────────────────────

/// Slack reserved before the next priority deadline: once the current time
/// is within this window, no further background task is started.
pub const GUARD_MS: u64 = 200;

/// Horizon assumed when the priority queue is empty.
const IDLE_LOOKAHEAD_MS: u64 = 1_000;

// ── Clock ─────────────────────────────────────────────────────────────────────

/// Source of the current time in milliseconds.
///
/// The scheduler re-reads the clock while draining background work, so the
/// guard interval holds even when an individual task runs long.  Tests drive
/// a manual clock; production uses [`SystemClock`].
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

// ── Task types ────────────────────────────────────────────────────────────────

/// A hard-deadline task.  Its function receives the invocation time and
/// returns the absolute time of its next run, which must not lie in the
/// past.
pub struct PriorityTask {
    pub name: String,
    run: Box<dyn FnMut(u64) -> u64>,
    next_run: u64,
}

impl PriorityTask {
    pub fn new(name: impl Into<String>, next_run: u64, run: impl FnMut(u64) -> u64 + 'static) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
            next_run,
        }
    }
}

/// A best-effort task.  Its function may return a replacement interval;
/// otherwise the existing interval is kept.  `next_run` is always derived
/// from the invocation time, so background tasks drift rather than catch up.
pub struct BackgroundTask {
    pub name: String,
    run: Box<dyn FnMut(u64) -> Option<u64>>,
    next_run: u64,
    interval: u64,
}

impl BackgroundTask {
    pub fn new(
        name: impl Into<String>,
        next_run: u64,
        interval: u64,
        run: impl FnMut(u64) -> Option<u64> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            run: Box::new(run),
            next_run,
            interval,
        }
    }
}

fn by_next_run_priority(a: &PriorityTask, b: &PriorityTask) -> Ordering {
    a.next_run.cmp(&b.next_run)
}

fn by_next_run_background(a: &BackgroundTask, b: &BackgroundTask) -> Ordering {
    a.next_run.cmp(&b.next_run)
}

type PriorityQueue = MinHeap<PriorityTask, fn(&PriorityTask, &PriorityTask) -> Ordering>;
type BackgroundQueue = MinHeap<BackgroundTask, fn(&BackgroundTask, &BackgroundTask) -> Ordering>;

// ── Scheduler ─────────────────────────────────────────────────────────────────

/// Two-tier cooperative scheduler over two `next_run`-ordered heaps.
pub struct Scheduler {
    priority: PriorityQueue,
    background: BackgroundQueue,
}

impl Scheduler {
    /// Build a scheduler from explicit task lists (composition-root style:
    /// components contribute their tasks as plain vectors, nothing registers
    /// itself implicitly).
    pub fn new(priority: Vec<PriorityTask>, background: Vec<BackgroundTask>) -> Self {
        let mut pq: PriorityQueue = MinHeap::new(by_next_run_priority);
        for t in priority {
            pq.push(t);
        }
        let mut bq: BackgroundQueue = MinHeap::new(by_next_run_background);
        for t in background {
            bq.push(t);
        }
        Self {
            priority: pq,
            background: bq,
        }
    }

    /// Number of priority tasks currently registered.
    pub fn priority_count(&self) -> usize {
        self.priority.len()
    }

    /// Number of background tasks currently registered.
    pub fn background_count(&self) -> usize {
        self.background.len()
    }

    /// Run one tick: drain due priority work, then background work inside
    /// the remaining slack, and return the milliseconds the caller should
    /// sleep before the next tick (always ≥ 1).
    ///
    /// # Errors
    /// [`SchedulerError::DeadlineRegression`] when a priority task returns a
    /// `next_run` in the past.  Fatal: the driver must abort rather than
    /// mask a broken timing computation.
    pub fn tick(&mut self, clock: &dyn Clock) -> Result<u64, SchedulerError> {
        // 1. Priority tier: run everything that is due, re-reading the clock
        //    so a long task does not hide newly due work.
        loop {
            let now = clock.now_ms();
            match self.priority.peek() {
                Some(t) if t.next_run <= now => {}
                _ => break,
            }
            let mut task = match self.priority.pop() {
                Some(t) => t,
                None => break,
            };
            let invoked_at = clock.now_ms();
            trace!(task = %task.name, invoked_at, "priority task run");
            let returned = (task.run)(invoked_at);
            if returned < invoked_at {
                return Err(SchedulerError::DeadlineRegression {
                    task: task.name,
                    returned,
                    invoked_at,
                });
            }
            task.next_run = returned;
            self.priority.push(task);
        }

        // 2. Slack horizon for the background tier.
        let next_priority = self
            .priority
            .peek()
            .map(|t| t.next_run)
            .unwrap_or_else(|| clock.now_ms() + IDLE_LOOKAHEAD_MS);
        let cutoff = next_priority.saturating_sub(GUARD_MS);

        // 3. Background tier: best-effort, only while the guard holds.
        loop {
            let now = clock.now_ms();
            if now >= cutoff {
                break;
            }
            match self.background.peek() {
                Some(t) if t.next_run <= now => {}
                _ => break,
            }
            let mut task = match self.background.pop() {
                Some(t) => t,
                None => break,
            };
            trace!(task = %task.name, now, "background task run");
            if let Some(new_interval) = (task.run)(now) {
                debug!(
                    task = %task.name,
                    old_interval = task.interval,
                    new_interval,
                    "background task changed its interval"
                );
                task.interval = new_interval;
            }
            task.next_run = now.saturating_add(task.interval);
            self.background.push(task);
        }

        Ok(next_priority.saturating_sub(clock.now_ms()).max(1))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    /// Manually advanced clock for deterministic tick tests.
    #[derive(Clone, Default)]
    struct TestClock(Rc<Cell<u64>>);

    impl TestClock {
        fn set(&self, t: u64) {
            self.0.set(t);
        }
        fn advance(&self, d: u64) {
            self.0.set(self.0.get() + d);
        }
    }

    impl Clock for TestClock {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    // ── Priority tier ─────────────────────────────────────────────────────────

    #[test]
    fn priority_tasks_run_in_deadline_order() {
        let clock = TestClock::default();
        clock.set(1_000);
        let log: Rc<RefCell<Vec<(String, u64)>>> = Rc::new(RefCell::new(Vec::new()));

        let mk = |name: &'static str, first: u64, log: Rc<RefCell<Vec<(String, u64)>>>| {
            PriorityTask::new(name, first, move |now| {
                log.borrow_mut().push((name.to_string(), now));
                now + 10_000
            })
        };
        let mut sched = Scheduler::new(
            vec![
                mk("late", 900, log.clone()),
                mk("early", 500, log.clone()),
                mk("future", 5_000, log.clone()),
            ],
            vec![],
        );

        sched.tick(&clock).unwrap();

        let names: Vec<String> = log.borrow().iter().map(|(n, _)| n.clone()).collect();
        // Both overdue tasks ran, earliest deadline first; the future one did not
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn returned_sleep_points_at_next_priority_deadline() {
        let clock = TestClock::default();
        clock.set(1_000);
        let mut sched = Scheduler::new(
            vec![PriorityTask::new("t", 4_000, |now| now + 4_000)],
            vec![],
        );
        let sleep = sched.tick(&clock).unwrap();
        assert_eq!(sleep, 3_000);
    }

    #[test]
    fn empty_priority_queue_sleeps_one_idle_lookahead() {
        let clock = TestClock::default();
        clock.set(2_000);
        let mut sched = Scheduler::new(vec![], vec![]);
        let sleep = sched.tick(&clock).unwrap();
        assert_eq!(sleep, IDLE_LOOKAHEAD_MS);
    }

    #[test]
    fn sleep_is_at_least_one_ms() {
        // A background task burns enough clock to overshoot the next priority
        // deadline entirely; the returned sleep must clamp to 1, not 0.
        let clock = TestClock::default();
        clock.set(1_000);
        let c2 = clock.clone();
        let mut sched = Scheduler::new(
            vec![PriorityTask::new("p", 2_000, |now| now + 1_000)],
            vec![BackgroundTask::new("burner", 0, 10_000, move |_| {
                c2.advance(1_500);
                None
            })],
        );
        let sleep = sched.tick(&clock).unwrap();
        assert_eq!(sleep, 1);
    }

    #[test]
    fn deadline_regression_is_fatal() {
        let clock = TestClock::default();
        clock.set(10_000);
        let mut sched = Scheduler::new(
            vec![PriorityTask::new("broken", 0, |now| now - 1)],
            vec![],
        );
        let err = sched.tick(&clock).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::DeadlineRegression {
                task: "broken".to_string(),
                returned: 9_999,
                invoked_at: 10_000,
            }
        );
    }

    #[test]
    fn priority_task_never_invoked_before_its_next_run() {
        // Monotonicity: across many ticks, fn is only called once next_run ≤ now
        let clock = TestClock::default();
        clock.set(0);
        let violations = Rc::new(Cell::new(0u32));
        let v2 = violations.clone();
        let next_expected = Rc::new(Cell::new(100u64));
        let ne2 = next_expected.clone();
        let mut sched = Scheduler::new(
            vec![PriorityTask::new("periodic", 100, move |now| {
                if now < ne2.get() {
                    v2.set(v2.get() + 1);
                }
                let next = now + 250;
                ne2.set(next);
                next
            })],
            vec![],
        );
        for step in 0..50 {
            clock.set(step * 97); // deliberately misaligned with the 250ms period
            sched.tick(&clock).unwrap();
        }
        assert_eq!(violations.get(), 0);
    }

    // ── Background tier ───────────────────────────────────────────────────────

    #[test]
    fn background_runs_in_slack_time() {
        let clock = TestClock::default();
        clock.set(1_000);
        let ran = Rc::new(Cell::new(0u32));
        let r2 = ran.clone();
        let mut sched = Scheduler::new(
            // Next priority deadline far away → plenty of slack
            vec![PriorityTask::new("p", 60_000, |now| now + 60_000)],
            vec![BackgroundTask::new("b", 0, 5_000, move |_| {
                r2.set(r2.get() + 1);
                None
            })],
        );
        sched.tick(&clock).unwrap();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn background_starved_inside_guard_interval() {
        let clock = TestClock::default();
        clock.set(1_000);
        let ran = Rc::new(Cell::new(0u32));
        let r2 = ran.clone();
        let mut sched = Scheduler::new(
            // Priority deadline 100ms out — inside the 200ms guard
            vec![PriorityTask::new("p", 1_100, |now| now + 100)],
            vec![BackgroundTask::new("b", 0, 10, move |_| {
                r2.set(r2.get() + 1);
                None
            })],
        );
        // Many ticks with the priority task always imminent: background never runs
        for _ in 0..20 {
            sched.tick(&clock).unwrap();
            clock.advance(100);
        }
        assert_eq!(ran.get(), 0, "background must starve under priority pressure");
    }

    #[test]
    fn background_interval_can_be_replaced() {
        let clock = TestClock::default();
        clock.set(0);
        let runs = Rc::new(RefCell::new(Vec::new()));
        let r2 = runs.clone();
        let mut sched = Scheduler::new(
            vec![],
            vec![BackgroundTask::new("b", 0, 100, move |now| {
                r2.borrow_mut().push(now);
                Some(300) // slow down after the first run
            })],
        );
        sched.tick(&clock).unwrap();
        clock.set(100);
        sched.tick(&clock).unwrap(); // 100 < 0+300 → not due yet
        clock.set(300);
        sched.tick(&clock).unwrap(); // due again at 300
        assert_eq!(*runs.borrow(), vec![0, 300]);
    }

    #[test]
    fn long_background_task_does_not_break_guard() {
        // cutoff = 1400 − 200 = 1200.  The first background task burns 250ms
        // of clock, landing past the cutoff, so the second one is skipped.
        let clock = TestClock::default();
        clock.set(1_000);
        let slow_ran = Rc::new(Cell::new(0u32));
        let second_ran = Rc::new(Cell::new(0u32));
        let (s2, n2) = (slow_ran.clone(), second_ran.clone());
        let c2 = clock.clone();
        let mut sched = Scheduler::new(
            vec![PriorityTask::new("p", 1_400, |now| now + 1_000)],
            vec![
                BackgroundTask::new("slow", 0, 10_000, move |_| {
                    s2.set(s2.get() + 1);
                    c2.advance(250); // simulated long run
                    None
                }),
                BackgroundTask::new("second", 1, 10_000, move |_| {
                    n2.set(n2.get() + 1);
                    None
                }),
            ],
        );
        sched.tick(&clock).unwrap();
        assert_eq!(slow_ran.get(), 1);
        assert_eq!(second_ran.get(), 0, "guard must stop the second task");
    }
}
