//! Fiberlocal: fiber-local state propagation for structured concurrency.
//!
//! # Overview
//!
//! A [`FiberLocal<A>`] is a mutable, per-fiber variable. Its value is visible
//! to reads and writes issued by the owning fiber and to any fiber forked
//! from it (as an independent copy), but never shared back to the parent or
//! to sibling fibers. The mechanism is built from two pieces:
//!
//! - [`LocalStore`]: an immutable, structurally-shared mapping from variable
//!   identity to value, carried as ambient state threaded through every step
//!   a fiber executes. Snapshotting it at a fork instant is O(1).
//! - [`FiberLocal`]: a typed handle that knows its own identity and a
//!   default value, with every operation implemented as a single
//!   "read store, produce new store plus result" step.
//!
//! # Core Guarantees
//!
//! - **Fork isolation**: a child starts from a value-copy of the parent's
//!   store taken at the fork instant; afterwards no write on either side is
//!   ever visible to the other, including across nested forks.
//! - **No backflow**: joining a fiber returns its result value only; local
//!   state never merges back into the joiner.
//! - **Scoped restore**: [`FiberLocal::scope`] overrides a variable for the
//!   lifetime of an RAII guard and restores the previously active state on
//!   every exit path — normal completion, unwind, or cancellation.
//! - **Step atomicity**: no two steps of one fiber run concurrently, so
//!   [`FiberLocal::update`] and [`FiberLocal::modify`] are atomic without
//!   locking on the fiber's own path.
//!
//! # Module Structure
//!
//! - [`types`]: identifiers, cancellation reasons, fiber outcomes
//! - [`store`]: the persistent local-state store
//! - [`local`]: the variable handle, scope guard, and lens view
//! - [`cx`]: the per-fiber capability context
//! - [`runtime`]: deterministic cooperative scheduler glue
//! - [`error`]: typed errors for runtime entry points
//! - [`tracing_compat`]: feature-gated structured logging
//!
//! # Example
//!
//! ```
//! use fiberlocal::{FiberLocal, Outcome, Runtime};
//!
//! let mut runtime = Runtime::with_seed(42);
//! let trace_id = FiberLocal::new(0u64);
//!
//! let local = trace_id.clone();
//! let parent = runtime.run(move |cx| async move {
//!     local.set(&cx, 42);
//!     // The child sees 42 from the fork instant, then diverges freely.
//!     let child = cx
//!         .fork({
//!             let local = local.clone();
//!             move |cx| async move { local.get_and_set(&cx, 7) }
//!         })
//!         .unwrap();
//!     assert_eq!(child.join().await, Outcome::Ok(42));
//!     // The child's write never flowed back.
//!     local.get(&cx)
//! });
//! assert_eq!(parent.unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_inception)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod cx;
pub mod error;
pub mod local;
pub mod runtime;
pub mod store;
pub mod tracing_compat;
pub mod types;
pub mod util;

pub use cx::Cx;
pub use error::{Error, ErrorKind, Result};
pub use local::{FiberLocal, FiberLocalLens, ScopeGuard};
pub use runtime::{yield_now, FiberHandle, Runtime, RuntimeConfig};
pub use store::LocalStore;
pub use types::{CancelKind, CancelReason, FiberId, LocalId, Outcome, PanicPayload};
