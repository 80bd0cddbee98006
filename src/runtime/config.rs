//! Configuration for the deterministic runtime.

/// Configuration for a [`Runtime`](crate::Runtime).
///
/// The seed fully determines scheduling: two runtimes with the same seed and
/// the same spawned work execute the same interleaving.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Random seed for deterministic scheduling decisions.
    pub seed: u64,
    /// Maximum number of steps before `run_until_quiescent` gives up.
    ///
    /// `None` disables the bound.
    pub max_steps: Option<u64>,
}

impl RuntimeConfig {
    /// Creates a configuration with the given seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            max_steps: Some(1_000_000),
        }
    }

    /// Sets the maximum number of steps.
    #[must_use]
    pub const fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Disables the step limit.
    #[must_use]
    pub const fn unbounded_steps(mut self) -> Self {
        self.max_steps = None;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new(0)
    }
}
