//! The consume loop: one worker draining the job queue in FIFO order.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::task::Task;

use super::{EngineState, RUNNING, STOPPED, UNSTARTED};

/// A queued unit of work: the task plus an optional completion sender for a
/// producer blocked in `wait_for`.
pub(super) struct Job {
    pub(super) task: Box<dyn Task>,
    pub(super) done: Option<oneshot::Sender<anyhow::Result<()>>>,
}

/// State shared between all `Engine` clones and the worker.
pub(super) struct Inner {
    pub(super) name: String,
    /// Producer side of the job queue. Kept alive for the engine's whole
    /// lifetime, so the worker's `recv` never observes a closed channel
    /// while running.
    pub(super) jobs: mpsc::UnboundedSender<Job>,
    /// Consumer side, taken exactly once by whichever context wins the
    /// worker role (or by `stop` if none ever does).
    pub(super) receiver: Mutex<Option<UnboundedReceiver<Job>>>,
    pub(super) state: AtomicU8,
    pub(super) propagate: AtomicBool,
    /// Wakes the worker out of an empty-queue sleep on shutdown.
    pub(super) shutdown: Notify,
}

impl Inner {
    pub(super) fn current_state(&self) -> EngineState {
        match self.state.load(Ordering::Acquire) {
            UNSTARTED => EngineState::Unstarted,
            RUNNING => EngineState::Running,
            _ => EngineState::Stopped,
        }
    }

    /// Attempt the `Unstarted → Running` transition. The winner gets the
    /// queue's receiver and with it the exclusive right to consume; every
    /// other caller gets `None`.
    pub(super) fn try_claim_worker(&self) -> Option<UnboundedReceiver<Job>> {
        if self
            .state
            .compare_exchange(UNSTARTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.take_receiver()
    }

    pub(super) fn take_receiver(&self) -> Option<UnboundedReceiver<Job>> {
        self.receiver
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    pub(super) fn enqueue(&self, job: Job) -> Result<()> {
        if self.current_state() == EngineState::Stopped {
            return Err(Error::Stopped);
        }
        // The channel is closed when the worker exits, so a submit racing
        // stop surfaces `Stopped` instead of stranding the job.
        self.jobs.send(job).map_err(|_| Error::Stopped)
    }

    /// The worker consume loop. Runs until `stop` or, with propagation
    /// enabled, until a task failure. On exit the queue is closed and
    /// drained so blocked waiters unblock.
    pub(super) async fn run(&self, mut rx: UnboundedReceiver<Job>) -> Result<()> {
        info!(name = %self.name, "worker started");
        let result = self.consume(&mut rx).await;
        Self::drain(rx);
        match &result {
            Ok(()) => info!(name = %self.name, "worker stopped"),
            Err(e) => error!(name = %self.name, "worker terminated: {e}"),
        }
        result
    }

    async fn consume(&self, rx: &mut UnboundedReceiver<Job>) -> Result<()> {
        while self.current_state() == EngineState::Running {
            let job = tokio::select! {
                // Shutdown wake while sleeping on an empty queue: re-check
                // the loop condition rather than terminating outright.
                _ = self.shutdown.notified() => continue,
                job = rx.recv() => match job {
                    Some(job) => job,
                    // Unreachable while `jobs` is alive; exit defensively.
                    None => break,
                },
            };
            self.execute(job)?;
        }
        Ok(())
    }

    /// Run one job and signal its completion.
    ///
    /// Errors only when failure propagation is enabled and the task failed;
    /// that error terminates the consume loop.
    fn execute(&self, job: Job) -> Result<()> {
        let Job { mut task, done } = job;
        let outcome = task.execute();
        let fatal = match &outcome {
            Ok(()) => None,
            Err(cause) => {
                error!(name = %self.name, "task failed: {cause:#}");
                if self.propagate.load(Ordering::Relaxed) {
                    // Mark the engine stopped before signalling completion,
                    // so the unblocked waiter observes the terminal state.
                    self.state.store(STOPPED, Ordering::Release);
                    Some(anyhow::anyhow!("{cause:#}"))
                } else {
                    None
                }
            }
        };
        // Completion is signalled unconditionally, success or failure, so a
        // blocked waiter always unblocks.
        if let Some(tx) = done {
            let _ = tx.send(outcome);
        }
        match fatal {
            Some(cause) => Err(Error::Task(cause)),
            None => Ok(()),
        }
    }

    /// Close the queue and discard everything still in it. Dropping a job
    /// drops its completion sender, unblocking its waiter with an error.
    pub(super) fn drain(mut rx: UnboundedReceiver<Job>) {
        rx.close();
        while rx.try_recv().is_ok() {}
    }
}
