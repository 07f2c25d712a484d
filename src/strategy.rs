//! Extraction of controller functions from the winning region.
//!
//! With `W` the winning region, the good relation is
//! `Good(s, i) = W(s) ∧ ¬Error(s, i) ∧ W(Next(s, i))`. Controllable inputs
//! `c₁..cₙ` are fixed one at a time, in declaration order:
//!
//! ```text
//! G₁     = ∃ cₖ₊₁..cₙ. Goodₖ|cₖ=1
//! care   = ∃ cₖ..cₙ. Goodₖ
//! fₖ     = smaller of constrain(G₁, care) and G₁
//! Goodₖ₊₁ = Goodₖ[cₖ := fₖ]
//! ```
//!
//! Both candidates for `fₖ` agree with `G₁` on the care set, where setting
//! `cₖ` to `G₁` keeps some completion of the remaining inputs good.

use std::collections::HashMap;

use log::{debug, info};

use crate::aiger::Literal;
use crate::bdd::Bdd;
use crate::circuit::{AndGate, Circuit};
use crate::error::{Error, Result};
use crate::reference::Ref;
use crate::solver::SafetySolver;
use crate::types::VarRole;

/// Controller functions, one per controllable input, over present-state and
/// uncontrollable-input variables.
#[derive(Debug, Clone)]
pub struct Strategy {
    functions: Vec<(Literal, Ref)>,
}

impl Strategy {
    pub fn extract(solver: &SafetySolver, winning: Ref) -> Result<Self> {
        let bdd = solver.bdd();
        let game = solver.game();

        if !bdd.is_implies(game.initial(), winning) {
            return Err(Error::Invariant(
                "strategy requested from a region that misses initial states".to_string(),
            ));
        }

        let bad = solver.bad(-winning)?;
        let mut good = bdd.apply_and(winning, -bad)?;

        let controllable = game.controllable();
        let mut functions = Vec::with_capacity(controllable.len());
        for (k, input) in controllable.iter().enumerate() {
            let later: Vec<u32> = controllable[k + 1..].iter().map(|i| i.var).collect();
            let remaining: Vec<u32> = controllable[k..].iter().map(|i| i.var).collect();

            let positive = bdd.exists(bdd.restrict(good, input.var, true)?, &later)?;
            let care = bdd.exists(good, &remaining)?;
            let constrained = bdd.constrain(positive, care)?;
            let f = if bdd.size(constrained) <= bdd.size(positive) {
                constrained
            } else {
                positive
            };
            debug!(
                "controllable {}: function of size {} (unconstrained {})",
                input.literal,
                bdd.size(f),
                bdd.size(positive)
            );

            good = bdd.compose_many(good, &HashMap::from([(input.var, f)]))?;
            functions.push((input.literal, f));
        }

        if !bdd.is_implies(winning, good) {
            return Err(Error::Invariant(
                "synthesized functions leave the winning region".to_string(),
            ));
        }
        for &(literal, f) in &functions {
            for var in bdd.support(f) {
                match game.role(var) {
                    Some(VarRole::Latch | VarRole::Uncontrollable) => {}
                    role => {
                        return Err(Error::Invariant(format!(
                            "function of {} depends on x{} ({:?})",
                            literal, var, role
                        )))
                    }
                }
            }
        }

        info!(
            "strategy: {} functions, {} nodes in total",
            functions.len(),
            bdd.descendants(functions.iter().map(|&(_, f)| f)).len()
        );
        Ok(Self { functions })
    }

    /// Controllable input literals with their functions, in declaration order.
    pub fn functions(&self) -> &[(Literal, Ref)] {
        &self.functions
    }

    pub fn function(&self, input: Literal) -> Option<Ref> {
        self.functions
            .iter()
            .find(|&&(literal, _)| literal == input)
            .map(|&(_, f)| f)
    }

    /// Turns `circuit` into a closed-loop controller circuit: controllable
    /// inputs become AND gates computing their functions, everything else is
    /// kept as is.
    pub fn to_circuit(&self, solver: &SafetySolver, circuit: &Circuit) -> Result<Circuit> {
        let game = solver.game();
        let mut literals = HashMap::new();
        for var in game.state_vars().into_iter().chain(game.uncontrollable_vars()) {
            let literal = game
                .literal(var)
                .ok_or_else(|| Error::Invariant(format!("x{} has no circuit literal", var)))?;
            literals.insert(var, literal);
        }
        let mut encoder = Encoder::new(solver.bdd(), literals, circuit.max_var + 1);

        let mut defined = Vec::with_capacity(self.functions.len());
        for &(input, f) in &self.functions {
            let literal = encoder.encode(f)?;
            defined.push(AndGate {
                output: input,
                left: literal,
                right: Literal::TRUE,
            });
        }

        let mut result = circuit.clone();
        result.inputs.retain(|i| !i.controllable);
        result.ands.extend(encoder.gates);
        result.ands.extend(defined);
        result.max_var = encoder.next_var - 1;
        debug!(
            "controller circuit: {} AND gates ({} new)",
            result.ands.len(),
            result.ands.len() - circuit.ands.len()
        );
        Ok(result)
    }
}

/// Encodes diagrams as multiplexer trees of AND gates, sharing the gates of
/// common subdiagrams.
struct Encoder<'a> {
    bdd: &'a Bdd,
    /// Circuit literal of each diagram variable.
    literals: HashMap<u32, Literal>,
    /// Circuit literal of each encoded (regular) node.
    nodes: HashMap<u32, Literal>,
    gates: Vec<AndGate>,
    next_var: u32,
}

impl<'a> Encoder<'a> {
    fn new(bdd: &'a Bdd, literals: HashMap<u32, Literal>, next_var: u32) -> Self {
        Self {
            bdd,
            literals,
            nodes: HashMap::new(),
            gates: Vec::new(),
            next_var,
        }
    }

    fn and(&mut self, left: Literal, right: Literal) -> Literal {
        if left == Literal::FALSE || right == Literal::FALSE || left == !right {
            return Literal::FALSE;
        }
        if left == Literal::TRUE || left == right {
            return right;
        }
        if right == Literal::TRUE {
            return left;
        }
        let output = Literal::from_variable(self.next_var, false);
        self.next_var += 1;
        self.gates.push(AndGate { output, left, right });
        output
    }

    fn encode(&mut self, f: Ref) -> Result<Literal> {
        if self.bdd.is_zero(f) {
            return Ok(Literal::FALSE);
        }
        if self.bdd.is_one(f) {
            return Ok(Literal::TRUE);
        }

        let index = f.index();
        let literal = match self.nodes.get(&index) {
            Some(&literal) => literal,
            None => {
                let var = self.bdd.variable(index);
                let x = *self
                    .literals
                    .get(&var)
                    .ok_or_else(|| Error::Invariant(format!("x{} has no circuit literal", var)))?;
                let high = self.encode(self.bdd.high(index))?;
                let low = self.encode(self.bdd.low(index))?;

                // ite(x, high, low) = ¬(¬(x ∧ high) ∧ ¬(¬x ∧ low))
                let then = self.and(x, high);
                let otherwise = self.and(!x, low);
                let literal = !self.and(!then, !otherwise);
                self.nodes.insert(index, literal);
                literal
            }
        };
        Ok(if f.is_negated() { !literal } else { literal })
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::config::{SolverConfig, TransitionMode};
    use crate::solver::Verdict;

    // x' = x ∨ inc, err = x ∧ inc
    const COUNTER: &str =
        "aag 5 2 1 1 2\n2\n4\n6 11\n8\n8 6 4\n10 7 5\ni0 env\ni1 controllable_inc\nl0 x\no0 err\n";

    fn winning(solver: &SafetySolver) -> Ref {
        match solver.solve().unwrap().0 {
            Verdict::Realizable { winning } => winning,
            other => panic!("expected a realizable game, got {:?}", other),
        }
    }

    #[test]
    fn test_counter_strategy_is_not_latch() -> Result<()> {
        for mode in [TransitionMode::Functional, TransitionMode::Relational] {
            let circuit = Circuit::parse(COUNTER).unwrap();
            let solver = SafetySolver::new(&circuit, SolverConfig::default().with_transition(mode))?;
            let strategy = Strategy::extract(&solver, winning(&solver))?;

            let x = solver.bdd().mk_var(1)?;
            assert_eq!(strategy.function(Literal::new(4)), Some(-x));
        }
        Ok(())
    }

    #[test]
    fn test_counter_controller_circuit() -> Result<()> {
        let circuit = Circuit::parse(COUNTER).unwrap();
        let solver = SafetySolver::new(&circuit, SolverConfig::default())?;
        let strategy = Strategy::extract(&solver, winning(&solver))?;
        let controller = strategy.to_circuit(&solver, &circuit)?;
        println!("{}", controller.to_aag_string());

        assert_eq!(controller.inputs.len(), 1);
        assert_eq!(controller.latches, circuit.latches);
        assert_eq!(controller.outputs, circuit.outputs);
        controller.validate()?;

        for x in [false, true] {
            for env in [false, true] {
                let step = controller.simulate_step(&[x], &[env])?;
                // The controller increments exactly when x = 0.
                assert_eq!(step.outputs, vec![false]);
                assert_eq!(step.next_latches, vec![true]);
            }
        }
        Ok(())
    }

    #[test]
    fn test_encoder_shares_nodes() -> Result<()> {
        let bdd = Bdd::default();
        let f = bdd.apply_xor(bdd.mk_var(1)?, bdd.mk_var(2)?)?;
        let literals = HashMap::from([(1, Literal::new(2)), (2, Literal::new(4))]);
        let mut encoder = Encoder::new(&bdd, literals, 3);

        // A single-variable node folds into the variable literal itself.
        assert_eq!(encoder.encode(bdd.mk_var(2)?)?, Literal::new(4));
        assert!(encoder.gates.is_empty());

        let literal = encoder.encode(f)?;
        assert_eq!(encoder.gates.len(), 3);
        assert_eq!(encoder.encode(-f)?, !literal);
        assert_eq!(encoder.gates.len(), 3);
        Ok(())
    }
}
