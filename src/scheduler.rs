//! Deferred task scheduling
//!
//! The surface never runs timers itself. It posts typed [`Task`]s to a
//! [`Scheduler`], and the owner of the event loop hands them back through
//! `ControlSurface::run_task` once their delay elapsed. Every task carries
//! enough state (sequence numbers, generations) to detect that it was
//! superseded and to no-op in that case.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

use crate::control::ControlId;

/// Work deferred to a later tick of the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Coalesced hardware refresh
    Flush,
    /// Check whether a button is still held for the same press
    LongPress { control: ControlId, press_seq: u64 },
    /// End of the command selector settle window
    CommandSettled { generation: u64 },
    /// Disarm an armed learn that captured nothing
    LearnExpired { generation: u64 },
}

/// Host-provided scheduler (`scheduleTask(callback, delayMs)`)
pub trait Scheduler: Send + Sync {
    /// Post a task to run on the event-loop thread after `delay`
    fn schedule(&self, task: Task, delay: Duration);
}

/// Scheduler backed by tokio timers
///
/// Each task sleeps on its own tokio task, then is forwarded to the
/// event-loop channel.
#[derive(Clone)]
pub struct TokioScheduler {
    task_tx: mpsc::UnboundedSender<Task>,
}

impl TokioScheduler {
    pub fn new(task_tx: mpsc::UnboundedSender<Task>) -> Self {
        Self { task_tx }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task, delay: Duration) {
        let tx = self.task_tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            // Receiver gone means the loop shut down
            let _ = tx.send(task);
        });
    }
}

/// A scheduled entry with its virtual due time
#[derive(Debug, Clone, Copy)]
struct Pending {
    due: Duration,
    task: Task,
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    pending: Vec<Pending>,
}

/// Deterministic scheduler driven by virtual time
///
/// Clones share the same queue, so a test can keep one handle while the
/// surface owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance virtual time and take every task that became due, in due order
    pub fn advance(&self, by: Duration) -> Vec<Task> {
        let mut state = self.state.lock();
        state.now += by;
        let now = state.now;

        let mut due: Vec<Pending> = Vec::new();
        state.pending.retain(|p| {
            if p.due <= now {
                due.push(*p);
                false
            } else {
                true
            }
        });
        // Stable sort keeps posting order for equal due times
        due.sort_by_key(|p| p.due);
        due.into_iter().map(|p| p.task).collect()
    }

    /// Number of tasks still waiting
    pub fn pending(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Count waiting tasks matching a predicate
    pub fn count(&self, predicate: impl Fn(&Task) -> bool) -> usize {
        self.state.lock().pending.iter().filter(|p| predicate(&p.task)).count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, task: Task, delay: Duration) {
        let mut state = self.state.lock();
        let due = state.now + delay;
        trace!(?task, ?delay, "Scheduled task");
        state.pending.push(Pending { due, task });
    }
}
