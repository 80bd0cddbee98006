//! Three-valued outcome type with severity lattice.
//!
//! The outcome type represents the result of a fiber:
//!
//! - `Ok(T)`: completed with a value
//! - `Cancelled(CancelReason)`: the fiber was cancelled
//! - `Panicked(PanicPayload)`: the fiber panicked
//!
//! These form a severity lattice: `Ok < Cancelled < Panicked`. When
//! aggregating outcomes (e.g. from several joined fibers), the worst wins.
//! Application-level errors ride inside `T` as ordinary `Result` values.

use super::cancel::CancelReason;
use core::fmt;

/// Payload from a caught panic.
///
/// This wraps the panic value for safe transport across fiber boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The three-valued outcome of a fiber.
///
/// Forms a severity lattice where worse outcomes dominate:
/// `Ok < Cancelled < Panicked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The fiber completed with a value.
    Ok(T),
    /// The fiber was cancelled.
    Cancelled(CancelReason),
    /// The fiber panicked.
    Panicked(PanicPayload),
}

impl<T> Outcome<T> {
    /// Returns the severity level of this outcome (0 = Ok, 2 = Panicked).
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Ok(_) => 0,
            Self::Cancelled(_) => 1,
            Self::Panicked(_) => 2,
        }
    }

    /// Returns true if this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this outcome is `Panicked`.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns the success value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Maps the success value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Ok(v) => Outcome::Ok(f(v)),
            Self::Cancelled(r) => Outcome::Cancelled(r),
            Self::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Converts this outcome to a standard `Result`, with cancellation and
    /// panic mapped to [`Error`](crate::error::Error).
    ///
    /// # Errors
    ///
    /// Returns an error for `Cancelled` and `Panicked` outcomes.
    pub fn into_result(self) -> crate::error::Result<T> {
        use crate::error::{Error, ErrorKind};
        match self {
            Self::Ok(v) => Ok(v),
            Self::Cancelled(r) => {
                Err(Error::new(ErrorKind::Cancelled).with_detail(r.to_string()))
            }
            Self::Panicked(p) => {
                Err(Error::new(ErrorKind::FiberPanicked).with_detail(p.message().to_string()))
            }
        }
    }

    /// Combines two outcomes, keeping the value of `self` and the worst
    /// severity of the pair.
    #[must_use]
    pub fn join_severity(self, other: Outcome<()>) -> Outcome<T> {
        if other.severity() > self.severity() {
            match other {
                Outcome::Ok(()) => unreachable!("Ok never outranks another outcome"),
                Outcome::Cancelled(r) => Outcome::Cancelled(r),
                Outcome::Panicked(p) => Outcome::Panicked(p),
            }
        } else {
            self
        }
    }
}

impl<T: fmt::Display> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(v) => write!(f, "ok: {v}"),
            Self::Cancelled(r) => write!(f, "cancelled: {r}"),
            Self::Panicked(p) => write!(f, "{p}"),
        }
    }
}
