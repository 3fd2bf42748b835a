//! Error types for soloq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The engine stopped before the task could run. Returned by `submit`
    /// against a stopped engine, and by waiters whose queued job was
    /// discarded when the worker exited.
    #[error("engine stopped before the task could run")]
    Stopped,

    /// The awaited task's `execute` returned an error.
    #[error("task failed: {0:#}")]
    Task(anyhow::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
