//! Deterministic fiber runtime.
//!
//! The runtime is the scheduling substrate the local-state mechanism relies
//! on. It supplies three primitives:
//!
//! - **Step threading**: each fiber's ambient store is threaded linearly
//!   through its own steps (see [`Cx`](crate::Cx)); no two steps of one
//!   fiber ever run concurrently.
//! - **Fork**: a child fiber starts from a value-snapshot of the parent's
//!   store taken at the fork instant, then the copies evolve independently.
//! - **Guaranteed finalization**: a cancelled or panicking fiber's future is
//!   dropped before its outcome resolves, so scope-restore guards run on
//!   every exit path.

pub mod config;
pub mod fiber;
pub mod runtime;
pub mod scheduler;

pub(crate) use fiber::spawn_into;
pub(crate) use scheduler::Shared;

pub use config::RuntimeConfig;
pub use fiber::FiberHandle;
pub use runtime::{yield_now, Runtime, YieldNow};
