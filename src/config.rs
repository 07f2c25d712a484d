use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::bdd::Bdd;
use crate::error::{Error, Result};

/// How successor states are computed during the fixpoint.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum TransitionMode {
    /// Substitute the next-state functions into the iterate (vector compose).
    #[default]
    Functional,
    /// Build one transition relation over primed latch variables and take the
    /// relational product with the iterate.
    Relational,
}

#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Maximum number of live diagram nodes.
    pub node_limit: usize,
    /// Maximum number of predecessor steps, unbounded if `None`.
    pub max_iterations: Option<usize>,
    pub transition: TransitionMode,
    /// Stop as soon as an initial state is known to be losing.
    pub early_termination: bool,
    /// Fraction of `node_limit` above which garbage is collected between
    /// iterations.
    pub gc_threshold: f64,
    /// Polled between iterations; setting it aborts the solve.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            node_limit: Bdd::DEFAULT_NODE_LIMIT,
            max_iterations: None,
            transition: TransitionMode::default(),
            early_termination: true,
            gc_threshold: 0.5,
            cancel: None,
        }
    }
}

impl SolverConfig {
    pub fn with_node_limit(mut self, node_limit: usize) -> Self {
        self.node_limit = node_limit;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_transition(mut self, transition: TransitionMode) -> Self {
        self.transition = transition;
        self
    }

    pub fn with_early_termination(mut self, early_termination: bool) -> Self {
        self.early_termination = early_termination;
        self
    }

    pub fn with_gc_threshold(mut self, gc_threshold: f64) -> Self {
        self.gc_threshold = gc_threshold;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Rejects settings no solve can run with.
    pub fn validate(&self) -> Result<()> {
        if self.node_limit == 0 || self.node_limit > Bdd::MAX_NODE_LIMIT {
            return Err(Error::InvalidConfig(format!(
                "node limit must be between 1 and {}, got {}",
                Bdd::MAX_NODE_LIMIT,
                self.node_limit
            )));
        }
        if self.gc_threshold.is_nan() || self.gc_threshold < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "garbage collection threshold must be non-negative, got {}",
                self.gc_threshold
            )));
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}
