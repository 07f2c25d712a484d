#![allow(dead_code)]

use std::collections::HashSet;

use aig_synth::aiger::Literal;
use aig_synth::circuit::{AndGate, Circuit, Input, Latch, Output};

/// Incremental construction of small test circuits.
#[derive(Default)]
pub struct Builder {
    circuit: Circuit,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh(&mut self) -> Literal {
        self.circuit.max_var += 1;
        Literal::from_variable(self.circuit.max_var, false)
    }

    pub fn input(&mut self, name: &str) -> Literal {
        let literal = self.fresh();
        self.circuit.inputs.push(Input {
            literal,
            name: Some(name.to_string()),
            controllable: name.starts_with("controllable_"),
        });
        literal
    }

    /// A latch whose next-state literal is set later with [`Builder::set_next`].
    pub fn latch(&mut self, name: &str, reset: Option<bool>) -> Literal {
        let literal = self.fresh();
        self.circuit.latches.push(Latch {
            literal,
            next: Literal::FALSE,
            reset,
            name: Some(name.to_string()),
        });
        literal
    }

    pub fn set_next(&mut self, latch: Literal, next: Literal) {
        for l in &mut self.circuit.latches {
            if l.literal == latch {
                l.next = next;
            }
        }
    }

    pub fn and(&mut self, left: Literal, right: Literal) -> Literal {
        let output = self.fresh();
        self.circuit.ands.push(AndGate { output, left, right });
        output
    }

    pub fn or(&mut self, left: Literal, right: Literal) -> Literal {
        !self.and(!left, !right)
    }

    pub fn xor(&mut self, left: Literal, right: Literal) -> Literal {
        let both = self.and(left, right);
        let neither = self.and(!left, !right);
        self.and(!both, !neither)
    }

    pub fn finish(mut self, error: Literal) -> Circuit {
        self.circuit.outputs.push(Output {
            literal: error,
            name: Some("error".to_string()),
        });
        self.circuit
    }
}

fn all_valuations(n: usize) -> impl Iterator<Item = Vec<bool>> {
    (0..1u64 << n).map(move |bits| (0..n).map(|i| (bits >> i) & 1 == 1).collect())
}

/// Explores every state reachable by `controller` under every environment
/// behaviour and asserts that its output never rises.
pub fn assert_controller_safe(controller: &Circuit) {
    assert!(
        controller.inputs.iter().all(|i| !i.controllable),
        "controller still has controllable inputs"
    );

    let mut frontier: Vec<Vec<bool>> = Vec::new();
    for values in all_valuations(controller.latches.len()) {
        let initial = controller
            .latches
            .iter()
            .zip(&values)
            .all(|(l, &v)| l.reset.map_or(true, |r| r == v));
        if initial {
            frontier.push(values);
        }
    }

    let mut seen: HashSet<Vec<bool>> = frontier.iter().cloned().collect();
    while let Some(state) = frontier.pop() {
        for inputs in all_valuations(controller.inputs.len()) {
            let step = controller.simulate_step(&state, &inputs).unwrap();
            assert!(
                step.outputs.iter().all(|&o| !o),
                "error raised in state {:?} under inputs {:?}",
                state,
                inputs
            );
            if seen.insert(step.next_latches.clone()) {
                frontier.push(step.next_latches);
            }
        }
    }
}
