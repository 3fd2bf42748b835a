//! The queue/worker engine: serial execution of submitted tasks.
//!
//! An [`Engine`] owns an unbounded FIFO queue of jobs and exactly one worker.
//! Producers on any task can [`submit`](Engine::submit) (fire-and-forget),
//! [`wait_for`](Engine::wait_for) (block until that job has run), or
//! [`wait_for_value`](Engine::wait_for_value) (block and collect a typed
//! result). The worker dequeues in submission order and runs one job at a
//! time.

mod worker;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::task::{Compute, Task};

use worker::{Inner, Job};

/// Configuration for an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Name used in log output to identify this engine's worker.
    pub name: String,
    /// Spawn the worker immediately on construction. When `false`, some
    /// caller must later claim the worker role via
    /// [`Engine::handle_events`].
    pub autostart: bool,
    /// Initial failure-propagation policy. See
    /// [`Engine::enable_failure_propagation`].
    pub propagate_failures: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "soloq-worker".to_string(),
            autostart: true,
            propagate_failures: false,
        }
    }
}

/// Lifecycle state of an engine.
///
/// Transitions are monotonic: `Unstarted → Running → Stopped`, each taken at
/// most once. The worker role is claimed by the single context that wins the
/// `Unstarted → Running` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No worker has been assigned yet. Jobs may already be enqueued.
    Unstarted,
    /// A worker owns the consume loop.
    Running,
    /// `stop` was called, or a propagated task failure terminated the
    /// worker. Terminal.
    Stopped,
}

const UNSTARTED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// A single-worker serial task queue.
///
/// Cheap to clone; all clones share the same queue and worker.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    /// Create an engine and start its worker immediately.
    ///
    /// Must be called within a tokio runtime: the worker runs on a spawned
    /// task.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(EngineConfig {
            name: name.into(),
            ..Default::default()
        })
    }

    /// Create an engine from explicit configuration.
    ///
    /// With `autostart: false` no worker task is spawned; jobs queue up
    /// until a caller claims the worker role via
    /// [`Engine::handle_events`].
    pub fn with_config(config: EngineConfig) -> Self {
        let (jobs, rx) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Arc::new(Inner {
                name: config.name,
                jobs,
                receiver: std::sync::Mutex::new(Some(rx)),
                state: AtomicU8::new(UNSTARTED),
                propagate: AtomicBool::new(config.propagate_failures),
                shutdown: Notify::new(),
            }),
        };
        if config.autostart {
            engine.spawn_worker();
        }
        engine
    }

    fn spawn_worker(&self) {
        if let Some(rx) = self.inner.try_claim_worker() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                // run() logs its own exit; a propagated failure is already
                // surfaced to the waiter, nothing more to do with it here.
                let _ = inner.run(rx).await;
            });
        }
    }

    /// Enqueue a task and return immediately.
    ///
    /// Never blocks. The task runs on the worker in FIFO order relative to
    /// other submissions. Errors with [`Error::Stopped`] if the engine has
    /// been stopped; the task is then discarded.
    pub fn submit<T: Task + 'static>(&self, task: T) -> Result<()> {
        self.inner.enqueue(Job {
            task: Box::new(task),
            done: None,
        })
    }

    /// Enqueue a task and block until the worker has finished running it.
    ///
    /// Returns `Ok(())` once the task has executed successfully,
    /// [`Error::Task`] if its `execute` failed, and [`Error::Stopped`] if
    /// the worker terminated before the task could run. Dropping the
    /// returned future abandons the wait but not the work: the task stays
    /// queued and still executes.
    pub async fn wait_for<T: Task + 'static>(&self, task: T) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.inner.enqueue(Job {
            task: Box::new(task),
            done: Some(tx),
        })?;
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(Error::Task(cause)),
            Err(_) => Err(Error::Stopped),
        }
    }

    /// Run a computation on the worker and block until its value is ready.
    ///
    /// The computation is wrapped in a plain task that ships the value back
    /// through a single-use channel; error semantics are those of
    /// [`wait_for`](Engine::wait_for).
    pub async fn wait_for_value<C>(&self, mut compute: C) -> Result<C::Output>
    where
        C: Compute + 'static,
        C::Output: 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut slot = Some(tx);
        self.wait_for(move || -> anyhow::Result<()> {
            let value = compute.execute()?;
            if let Some(tx) = slot.take() {
                // The waiter may have been cancelled; the value is then
                // simply discarded.
                let _ = tx.send(value);
            }
            Ok(())
        })
        .await?;
        rx.await.map_err(|_| Error::Stopped)
    }

    /// Request shutdown. Idempotent, fire-and-forget.
    ///
    /// The worker finishes the job it is currently executing, then exits.
    /// Jobs still queued at that point never run; waiters blocked on them
    /// unblock with [`Error::Stopped`].
    pub fn stop(&self) {
        let prev = self.inner.state.swap(STOPPED, Ordering::AcqRel);
        if prev == STOPPED {
            return;
        }
        info!(name = %self.inner.name, "stop requested");
        self.inner.shutdown.notify_one();
        if prev == UNSTARTED {
            // No worker was ever assigned, so nobody else will drain the
            // queue and unblock pre-enqueued waiters.
            if let Some(rx) = self.inner.take_receiver() {
                Inner::drain(rx);
            }
        }
    }

    /// Claim the worker role for the calling task and run the consume loop.
    ///
    /// Returns only after [`stop`](Engine::stop) is invoked from elsewhere
    /// (with `Ok(())`), or after a task failure is propagated (with that
    /// failure). If a worker already exists this is a silent no-op.
    pub async fn handle_events(&self) -> Result<()> {
        match self.inner.try_claim_worker() {
            Some(rx) => self.inner.run(rx).await,
            None => {
                debug!(name = %self.inner.name, "handle_events: worker role unavailable");
                Ok(())
            }
        }
    }

    /// Make task failures fatal: the next failing task terminates the
    /// worker permanently (queued and future jobs are stranded).
    ///
    /// The flag is read by the worker at failure time; a toggle racing an
    /// in-flight failure resolves last-writer-wins.
    pub fn enable_failure_propagation(&self) {
        self.inner.propagate.store(true, Ordering::Relaxed);
    }

    /// Contain task failures (the default): log and continue with the next
    /// job.
    pub fn disable_failure_propagation(&self) {
        self.inner.propagate.store(false, Ordering::Relaxed);
    }

    /// Current lifecycle state, for diagnostics.
    pub fn state(&self) -> EngineState {
        self.inner.current_state()
    }

    /// The engine's name, as it appears in log output.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish()
    }
}
