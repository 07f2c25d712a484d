//! # aig-synth: safety games over AIGER circuits
//!
//! **`aig-synth`** decides whether a safety specification, given as a
//! sequential circuit in the extended AIGER format of the reactive synthesis
//! competition, is realizable, and if so synthesizes a controller circuit.
//!
//! Inputs whose symbol starts with `controllable_` are chosen by the
//! controller, all other inputs by the environment. The single output is the
//! error signal: the controller wins if it can keep the output low forever.
//!
//! Everything is computed with Binary Decision Diagrams. All diagrams live in
//! one [`Bdd`][crate::bdd::Bdd] manager and are addressed through lightweight
//! [`Ref`][crate::reference::Ref] handles; equal functions get equal handles.
//!
//! ## Basic Usage
//!
//! ```rust
//! use aig_synth::circuit::Circuit;
//! use aig_synth::config::SolverConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // A latch x and a controllable increment: x' = x ∨ inc, error = x ∧ inc.
//! let circuit = Circuit::parse(
//!     "aag 5 2 1 1 2\n2\n4\n6 11\n8\n8 6 4\n10 7 5\ni0 env\ni1 controllable_inc\n",
//! )?;
//!
//! let controller = aig_synth::synthesize(&circuit, SolverConfig::default())?;
//! let controller = controller.expect("the game is realizable");
//! assert!(controller.inputs.iter().all(|i| !i.controllable));
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Components
//!
//! - **[`bdd`]**: the decision diagram manager and its algorithms.
//! - **[`aiger`]** and **[`circuit`]**: reading, writing and simulating circuits.
//! - **[`game`]**: compilation of a circuit into a symbolic safety game.
//! - **[`solver`]**: the fixpoint computing the winning region.
//! - **[`strategy`]**: controller extraction and its circuit encoding.

pub mod aiger;
pub mod bdd;
pub mod cache;
pub mod circuit;
pub mod config;
pub mod error;
pub mod game;
pub mod paths;
pub mod reference;
pub mod sat;
pub mod solver;
pub mod strategy;
pub mod table;
pub mod types;
pub mod utils;

use crate::circuit::Circuit;
use crate::config::SolverConfig;
use crate::error::Result;
use crate::solver::{SafetySolver, Verdict};
use crate::strategy::Strategy;

/// Decides realizability without extracting a strategy.
pub fn check_realizability(circuit: &Circuit, config: SolverConfig) -> Result<bool> {
    let solver = SafetySolver::new(circuit, config)?;
    let (verdict, _) = solver.solve()?;
    Ok(verdict.is_realizable())
}

/// Solves the game and returns the controller circuit, or `None` if the
/// specification is unrealizable.
pub fn synthesize(circuit: &Circuit, config: SolverConfig) -> Result<Option<Circuit>> {
    let solver = SafetySolver::new(circuit, config)?;
    match solver.solve()?.0 {
        Verdict::Unrealizable { .. } => Ok(None),
        Verdict::Realizable { winning } => {
            let strategy = Strategy::extract(&solver, winning)?;
            strategy.to_circuit(&solver, circuit).map(Some)
        }
    }
}
