//! Units of work.
//!
//! A task is something the worker runs exactly once. Two capability
//! variants: [`Task`] executes for its side effects only, [`Compute`]
//! additionally produces a typed value for the producer that waited on it.
//! Both are blanket-implemented for closures, which is how most call sites
//! construct them.

use anyhow::Result;

/// A unit of deferred executable logic.
///
/// `execute` is called at most once per submission, on the engine's single
/// worker, in FIFO order relative to other submissions. It may fail; what
/// happens then is decided by the engine's failure-propagation policy.
pub trait Task: Send {
    fn execute(&mut self) -> Result<()>;
}

impl<F> Task for F
where
    F: FnMut() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        self()
    }
}

/// A unit of work that produces a typed value.
///
/// Used with [`Engine::wait_for_value`](crate::Engine::wait_for_value),
/// which runs the computation on the worker and hands the value back to the
/// waiting producer.
pub trait Compute: Send {
    type Output: Send;

    fn execute(&mut self) -> Result<Self::Output>;
}

impl<T, F> Compute for F
where
    T: Send,
    F: FnMut() -> Result<T> + Send,
{
    type Output = T;

    fn execute(&mut self) -> Result<T> {
        self()
    }
}
