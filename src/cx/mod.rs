//! Fiber context module.
//!
//! The [`Cx`] type is the capability token a fiber uses to touch its ambient
//! local state, fork children, and observe cancellation. Handle operations on
//! a [`FiberLocal`](crate::FiberLocal) all take a `&Cx` and resolve against
//! that fiber's store.

pub mod cx;

pub use cx::Cx;
