//! Backward fixpoint over the uncontrollable predecessor operator.
//!
//! The losing region is the least fixpoint of
//!
//! ```text
//! L₀     = ∃ i_u. ∀ i_c. Error(s, i)
//! Lₖ₊₁   = Lₖ ∨ UPre(Lₖ)
//! UPre(L) = ∃ i_u. ∀ i_c. Error(s, i) ∨ L(Next(s, i))
//! ```
//!
//! The controller picks its inputs after seeing the environment's, so the
//! universal quantifier over controllable inputs is innermost. The game is
//! realizable iff no initial state is losing.

use std::rc::Rc;

use log::{debug, info};

use crate::bdd::Bdd;
use crate::circuit::Circuit;
use crate::config::SolverConfig;
use crate::error::{Error, Result};
use crate::game::Game;
use crate::reference::Ref;
use crate::types::VarRole;

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SolveStats {
    /// Number of predecessor steps computed.
    pub iterations: usize,
    pub peak_nodes: usize,
    pub final_nodes: usize,
    /// Garbage collections run between iterations.
    pub gc_runs: usize,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Verdict {
    /// `winning` is the complement of the converged losing region.
    Realizable { winning: Ref },
    /// `losing` contains an initial state. It is the full losing region
    /// unless the fixpoint was cut short by early termination.
    Unrealizable { losing: Ref },
}

impl Verdict {
    pub fn is_realizable(&self) -> bool {
        matches!(self, Verdict::Realizable { .. })
    }
}

#[derive(Debug)]
pub struct SafetySolver {
    game: Game,
    config: SolverConfig,
}

impl SafetySolver {
    pub fn new(circuit: &Circuit, config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let bdd = Rc::new(Bdd::new(config.node_limit));
        let game = Game::build(bdd, circuit, config.transition)?;
        Ok(Self { game, config })
    }

    pub fn game(&self) -> &Game {
        &self.game
    }
    pub fn bdd(&self) -> &Bdd {
        self.game.bdd()
    }
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// `Error(s, i) ∨ L(Next(s, i))`: inputs and states that are an error
    /// now or lead into `losing`.
    pub fn bad(&self, losing: Ref) -> Result<Ref> {
        let bdd = self.bdd();
        let successor = self.game.successor_in(losing)?;
        bdd.apply_or(self.game.error(), successor)
    }

    /// States from which the environment can force the play into `losing` or
    /// into an error in one step.
    pub fn upre(&self, losing: Ref) -> Result<Ref> {
        let bad = self.bad(losing)?;
        self.force(bad)
    }

    /// `∃ i_u. ∀ i_c. f`
    fn force(&self, f: Ref) -> Result<Ref> {
        let bdd = self.bdd();
        let forced = bdd.forall(f, &self.game.controllable_vars())?;
        bdd.exists(forced, &self.game.uncontrollable_vars())
    }

    /// States where the environment can force the error immediately.
    pub fn error_states(&self) -> Result<Ref> {
        self.force(self.game.error())
    }

    fn check_state_support(&self, f: Ref, what: &str) -> Result<()> {
        for var in self.bdd().support(f) {
            if self.game.role(var) != Some(VarRole::Latch) {
                return Err(Error::Invariant(format!(
                    "{} depends on x{} ({:?}), not a present-state variable",
                    what,
                    var,
                    self.game.role(var)
                )));
            }
        }
        Ok(())
    }

    fn intersects_initial(&self, states: Ref) -> bool {
        !self.bdd().is_implies(self.game.initial(), -states)
    }

    /// Runs the fixpoint to convergence (or until an initial state is known to
    /// be losing, with early termination).
    ///
    /// The region in the verdict stays referenced for the lifetime of the
    /// solver.
    pub fn solve(&self) -> Result<(Verdict, SolveStats)> {
        let mut stats = SolveStats::default();

        let mut losing = self.error_states()?;
        self.check_state_support(losing, "L0")?;
        self.bdd().reference(losing);
        stats.peak_nodes = self.bdd().num_nodes();

        loop {
            info!(
                "iteration {}: losing region of size {} with {} states",
                stats.iterations,
                self.bdd().size(losing),
                self.game.count_states(losing)
            );

            if self.config.early_termination && self.intersects_initial(losing) {
                info!("an initial state is losing after {} iterations", stats.iterations);
                break;
            }
            if let Some(limit) = self.config.max_iterations {
                if stats.iterations >= limit {
                    self.bdd().dereference(losing);
                    return Err(Error::IterationLimit { limit });
                }
            }

            let next = self.bdd().apply_or(losing, self.upre(losing)?)?;
            stats.iterations += 1;
            stats.peak_nodes = stats.peak_nodes.max(self.bdd().num_nodes());
            self.check_state_support(next, &format!("L{}", stats.iterations))?;

            if !self.bdd().is_implies(losing, next) {
                return Err(Error::Invariant(format!(
                    "iterate {} is not a superset of its predecessor",
                    stats.iterations
                )));
            }
            if next == losing {
                debug!("converged after {} iterations", stats.iterations);
                break;
            }
            if self.config.is_cancelled() {
                self.bdd().dereference(losing);
                return Err(Error::Cancelled {
                    iteration: stats.iterations,
                });
            }

            self.bdd().reference(next);
            self.bdd().dereference(losing);
            losing = next;
            if self.maybe_collect_garbage() {
                stats.gc_runs += 1;
            }
        }

        stats.final_nodes = self.bdd().num_nodes();

        let verdict = if self.intersects_initial(losing) {
            Verdict::Unrealizable { losing }
        } else {
            Verdict::Realizable { winning: -losing }
        };
        info!(
            "{} after {} iterations (peak {} nodes)",
            if verdict.is_realizable() {
                "realizable"
            } else {
                "unrealizable"
            },
            stats.iterations,
            stats.peak_nodes
        );
        if let Verdict::Unrealizable { losing } = verdict {
            if let Some(cube) = self.bdd().paths(self.bdd().apply_and(self.game.initial(), losing)?).next() {
                let cube = cube.iter().map(|l| l.to_dimacs()).collect::<Vec<_>>();
                debug!("losing initial states include the cube {:?}", cube);
            }
        }
        Ok((verdict, stats))
    }

    fn maybe_collect_garbage(&self) -> bool {
        let bdd = self.bdd();
        let threshold = (bdd.node_limit() as f64 * self.config.gc_threshold) as usize;
        if bdd.num_nodes() <= threshold {
            return false;
        }
        let dropped = bdd.collect_garbage(&[]);
        debug!("garbage collection reclaimed {} nodes", dropped);
        true
    }
}
