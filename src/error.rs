//! Error types and error handling strategy.
//!
//! The local-state mechanism itself has no failure modes: every store
//! operation is total. Errors surface only from the surrounding runtime —
//! a fiber that was cancelled or panicked, a stalled scheduler, or an
//! operation that requires a runtime which has already shut down.
//!
//! Errors are explicit and typed (no stringly-typed errors); the optional
//! detail string is supplemental context, never the discriminant.

use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The fiber was cancelled before completing.
    Cancelled,
    /// The fiber panicked.
    FiberPanicked,
    /// The runtime stopped making progress before the fiber completed.
    ///
    /// Either the step budget was exhausted or every remaining fiber is
    /// waiting on a wakeup that can no longer arrive.
    Stalled,
    /// The runtime behind a handle is gone.
    RuntimeShutdown,
}

impl ErrorKind {
    /// Returns a static description of this error kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "fiber was cancelled",
            Self::FiberPanicked => "fiber panicked",
            Self::Stalled => "runtime stalled before fiber completion",
            Self::RuntimeShutdown => "runtime has shut down",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a runtime operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    detail: Option<String>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind, detail: None }
    }

    /// Attaches supplemental detail to this error.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the supplemental detail, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for Error {}

/// Result alias using this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
