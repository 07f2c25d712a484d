//! Error taxonomy of a solve.
//!
//! A solve ends either with a verdict or with one of the [`Error`] kinds
//! below. Only [`Error::Model`] says something definite about the input; all
//! other kinds are inconclusive and must never be read as a verdict.

use thiserror::Error;

use crate::aiger::Literal;

/// Structural problem in the input circuit, detected while compiling it into
/// decision diagrams.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ModelError {
    #[error("literal {literal} used by {context} is not defined by any input, latch or AND gate")]
    UndefinedLiteral { literal: Literal, context: String },

    #[error("literal {literal} exceeds the maximum variable index {max_var}")]
    LiteralOutOfRange { literal: Literal, max_var: u32 },

    #[error("combinational cycle through AND gate {gate}")]
    CombinationalCycle { gate: Literal },

    #[error("variable of literal {literal} is defined more than once")]
    DuplicateDefinition { literal: Literal },

    #[error("{what} must be a positive (even) literal, got {literal}")]
    NegatedDefinition { what: &'static str, literal: Literal },

    #[error("expected exactly one output (the error signal), found {count}")]
    OutputCount { count: usize },

    #[error("invalid reset value {reset} for latch {latch}")]
    InvalidReset { latch: Literal, reset: Literal },

    #[error("inconsistent variable tagging: {0}")]
    InconsistentTagging(String),
}

/// Reason a solve did not produce a verdict.
#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed circuit: {0}")]
    Model(#[from] ModelError),

    #[error("invalid solver configuration: {0}")]
    InvalidConfig(String),

    #[error("node table exhausted: the limit of {limit} nodes was reached")]
    ResourceExhausted { limit: usize },

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("fixpoint did not converge within {limit} iterations")]
    IterationLimit { limit: usize },

    #[error("solving cancelled after {iteration} iterations")]
    Cancelled { iteration: usize },
}

impl Error {
    /// Whether this outcome says nothing about realizability.
    pub fn is_inconclusive(&self) -> bool {
        !matches!(self, Error::Model(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
