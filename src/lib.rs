//! # soloq
//!
//! Single-worker serial task queue. Any number of producers submit units of
//! work; exactly one dedicated worker executes them one at a time, in FIFO
//! order. Producers can fire-and-forget ([`Engine::submit`]), block until
//! their specific task has run ([`Engine::wait_for`]), or block and collect
//! a typed result ([`Engine::wait_for_value`]).

pub mod engine;
pub mod error;
pub mod task;
pub mod telemetry;

pub use engine::{Engine, EngineConfig, EngineState};
pub use error::{Error, Result};
pub use task::{Compute, Task};
