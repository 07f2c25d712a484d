//! Symbolic encoding of a safety game.
//!
//! A [`Game`] compiles a [`Circuit`] into decision diagrams: one variable per
//! latch (plus a primed copy in relational mode) and per input, the
//! next-state function of every latch, the error function and the set of
//! initial states.
//!
//! Variable order: for each latch its current-state variable (immediately
//! followed by its primed copy in relational mode), then the uncontrollable
//! inputs, then the controllable inputs, each group in declaration order.
//!
//! In relational mode a latch whose next state is an input, unnegated, gets no
//! primed copy: the input variable itself stands for the latch in the next
//! state, and the relation has no conjunct for it.

use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, info};
use num_bigint::BigUint;

use crate::aiger::Literal;
use crate::bdd::Bdd;
use crate::circuit::Circuit;
use crate::config::TransitionMode;
use crate::error::{Error, ModelError, Result};
use crate::reference::Ref;
use crate::types::VarRole;

/// Diagram variables of one latch.
#[derive(Debug, Clone)]
pub struct StateVar {
    pub latch: Literal,
    pub present: u32,
    /// Primed copy, only allocated in relational mode.
    pub next: Option<u32>,
    /// Input variable the latch stores, in relational mode when the latch
    /// takes no primed copy.
    pub copy_of: Option<u32>,
    /// Next-state function over present-state and input variables.
    pub function: Ref,
    pub reset: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct InputVar {
    pub literal: Literal,
    pub var: u32,
}

#[derive(Debug)]
pub struct Game {
    bdd: Rc<Bdd>,
    mode: TransitionMode,
    latches: Vec<StateVar>,
    uncontrollable: Vec<InputVar>,
    controllable: Vec<InputVar>,
    roles: HashMap<u32, VarRole>,
    error: Ref,
    initial: Ref,
    /// `T(s, i, s') = ∧ (s'_j ↔ next_j(s, i))`, relational mode only.
    transition: Option<Ref>,
    /// `s_j ↦ next_j(s, i)`, for vector compose.
    substitution: HashMap<u32, Ref>,
}

impl Game {
    pub fn build(bdd: Rc<Bdd>, circuit: &Circuit, mode: TransitionMode) -> Result<Self> {
        circuit.validate()?;
        if circuit.outputs.len() != 1 {
            return Err(ModelError::OutputCount {
                count: circuit.outputs.len(),
            }
            .into());
        }

        let mut roles = HashMap::new();
        let mut next_id = 1u32;
        let mut alloc = |role: VarRole| {
            let id = next_id;
            next_id += 1;
            roles.insert(id, role);
            id
        };

        let copies_input = |next: Literal| {
            !next.is_negated() && circuit.inputs.iter().any(|i| i.literal == next)
        };

        // Diagram variable allocation.
        let mut latch_vars = Vec::with_capacity(circuit.latches.len());
        for latch in &circuit.latches {
            let present = alloc(VarRole::Latch);
            let next = match mode {
                TransitionMode::Functional => None,
                TransitionMode::Relational if copies_input(latch.next) => None,
                TransitionMode::Relational => Some(alloc(VarRole::NextLatch)),
            };
            latch_vars.push((present, next));
        }
        let uncontrollable = circuit
            .uncontrollable_inputs()
            .map(|input| InputVar {
                literal: input.literal,
                var: alloc(VarRole::Uncontrollable),
            })
            .collect::<Vec<_>>();
        let controllable = circuit
            .controllable_inputs()
            .map(|input| InputVar {
                literal: input.literal,
                var: alloc(VarRole::Controllable),
            })
            .collect::<Vec<_>>();

        // Diagrams of the circuit signals, by AIGER variable.
        let mut signals: HashMap<u32, Ref> = HashMap::new();
        signals.insert(0, bdd.zero());
        for (latch, &(present, _)) in circuit.latches.iter().zip(&latch_vars) {
            signals.insert(latch.literal.variable(), bdd.mk_var(present)?);
        }
        for input in uncontrollable.iter().chain(&controllable) {
            signals.insert(input.literal.variable(), bdd.mk_var(input.var)?);
        }

        let gates = circuit.topological_gates(circuit.roots())?;
        debug!("compiling {} AND gates", gates.len());
        for gate in gates {
            let left = signal(&signals, gate.left)?;
            let right = signal(&signals, gate.right)?;
            signals.insert(gate.output.variable(), bdd.apply_and(left, right)?);
        }

        let error = signal(&signals, circuit.outputs[0].literal)?;

        let input_vars = uncontrollable
            .iter()
            .chain(&controllable)
            .map(|i| (i.literal, i.var))
            .collect::<HashMap<_, _>>();

        let mut latches = Vec::with_capacity(circuit.latches.len());
        for (latch, (present, next)) in circuit.latches.iter().zip(latch_vars) {
            let copy_of = match (mode, next) {
                (TransitionMode::Relational, None) => input_vars.get(&latch.next).copied(),
                _ => None,
            };
            latches.push(StateVar {
                latch: latch.literal,
                present,
                next,
                copy_of,
                function: signal(&signals, latch.next)?,
                reset: latch.reset,
            });
        }
        let copies = latches.iter().filter(|l| l.copy_of.is_some()).count();
        if copies > 0 {
            debug!("{} latches copy an input and take no primed variable", copies);
        }

        let initial = bdd.mk_cube(latches.iter().filter_map(|l| {
            l.reset
                .map(|value| if value { l.present as i32 } else { -(l.present as i32) })
        }))?;

        let substitution = latches
            .iter()
            .map(|l| (l.present, l.function))
            .collect::<HashMap<_, _>>();

        let transition = match mode {
            TransitionMode::Functional => None,
            TransitionMode::Relational => {
                let mut relation = bdd.one();
                for l in latches.iter().rev() {
                    let next = match (l.next, l.copy_of) {
                        (Some(next), _) => next,
                        (None, Some(_)) => continue,
                        (None, None) => {
                            return Err(Error::Invariant(format!(
                                "latch {} has no primed variable",
                                l.latch
                            )))
                        }
                    };
                    let constraint = bdd.apply_eq(bdd.mk_var(next)?, l.function)?;
                    relation = bdd.apply_and(relation, constraint)?;
                }
                Some(relation)
            }
        };

        for f in [error, initial]
            .into_iter()
            .chain(transition)
            .chain(latches.iter().map(|l| l.function))
        {
            bdd.reference(f);
        }

        info!(
            "game: {} latches, {} uncontrollable and {} controllable inputs, error of size {}",
            latches.len(),
            uncontrollable.len(),
            controllable.len(),
            bdd.size(error)
        );
        if let Some(t) = transition {
            info!("transition relation of size {}", bdd.size(t));
        }

        Ok(Self {
            bdd,
            mode,
            latches,
            uncontrollable,
            controllable,
            roles,
            error,
            initial,
            transition,
            substitution,
        })
    }

    pub fn bdd(&self) -> &Bdd {
        &self.bdd
    }
    pub fn mode(&self) -> TransitionMode {
        self.mode
    }
    pub fn latches(&self) -> &[StateVar] {
        &self.latches
    }
    pub fn uncontrollable(&self) -> &[InputVar] {
        &self.uncontrollable
    }
    pub fn controllable(&self) -> &[InputVar] {
        &self.controllable
    }
    /// Error function over present-state and input variables.
    pub fn error(&self) -> Ref {
        self.error
    }
    /// Initial states; uninitialised latches are left free.
    pub fn initial(&self) -> Ref {
        self.initial
    }
    pub fn transition(&self) -> Option<Ref> {
        self.transition
    }

    pub fn role(&self, var: u32) -> Option<VarRole> {
        self.roles.get(&var).copied()
    }

    pub fn state_vars(&self) -> Vec<u32> {
        self.latches.iter().map(|l| l.present).collect()
    }
    pub fn next_vars(&self) -> Vec<u32> {
        self.latches.iter().filter_map(|l| l.next).collect()
    }
    pub fn uncontrollable_vars(&self) -> Vec<u32> {
        self.uncontrollable.iter().map(|i| i.var).collect()
    }
    pub fn controllable_vars(&self) -> Vec<u32> {
        self.controllable.iter().map(|i| i.var).collect()
    }

    /// AIGER literal of a present-state or input variable.
    pub fn literal(&self, var: u32) -> Option<Literal> {
        self.latches
            .iter()
            .find(|l| l.present == var)
            .map(|l| l.latch)
            .or_else(|| {
                self.uncontrollable
                    .iter()
                    .chain(&self.controllable)
                    .find(|i| i.var == var)
                    .map(|i| i.literal)
            })
    }

    /// `states(Next(s, i))`: the inputs and states from which one step leads
    /// into `states`.
    pub fn successor_in(&self, states: Ref) -> Result<Ref> {
        match self.transition {
            None => self.bdd.compose_many(states, &self.substitution),
            Some(transition) => {
                let renaming = self
                    .latches
                    .iter()
                    .filter_map(|l| l.next.or(l.copy_of).map(|next| (l.present, next)))
                    .collect::<HashMap<_, _>>();
                let primed = self.bdd.rename(states, &renaming)?;
                self.bdd.and_exists(transition, primed, &self.next_vars())
            }
        }
    }

    /// Number of valuations of the latches in `states`.
    pub fn count_states(&self, states: Ref) -> BigUint {
        self.bdd.sat_count(states, self.latches.len())
    }
}

fn signal(signals: &HashMap<u32, Ref>, literal: Literal) -> Result<Ref> {
    let f = signals.get(&literal.variable()).copied().ok_or_else(|| {
        Error::Invariant(format!("literal {} was not compiled", literal))
    })?;
    Ok(if literal.is_negated() { -f } else { f })
}
