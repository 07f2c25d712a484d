//! In-memory sequential circuit: inputs, latches, outputs and AND gates.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use log::debug;

use crate::aiger::{Literal, ParseError, Reader, Record, SymbolKind};
use crate::error::ModelError;

/// Symbol prefix marking an input as chosen by the controller.
pub const CONTROLLABLE_PREFIX: &str = "controllable_";

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Input {
    pub literal: Literal,
    pub name: Option<String>,
    pub controllable: bool,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Latch {
    pub literal: Literal,
    pub next: Literal,
    /// Initial value, `None` if the latch starts uninitialised.
    pub reset: Option<bool>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Output {
    pub literal: Literal,
    pub name: Option<String>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AndGate {
    pub output: Literal,
    pub left: Literal,
    pub right: Literal,
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct Circuit {
    pub max_var: u32,
    pub inputs: Vec<Input>,
    pub latches: Vec<Latch>,
    pub outputs: Vec<Output>,
    pub ands: Vec<AndGate>,
    pub comments: Vec<String>,
}

/// Values of one simulated clock step.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Step {
    pub outputs: Vec<bool>,
    pub next_latches: Vec<bool>,
}

impl Circuit {
    pub fn from_reader(reader: &Reader) -> Result<Self, ParseError> {
        let header = reader.header();
        let max_var = u32::try_from(header.m).map_err(|_| ParseError::Syntax {
            line: 1,
            message: format!("maximum variable index {} is too large", header.m),
        })?;
        let mut circuit = Circuit {
            max_var,
            ..Default::default()
        };

        for record in reader.records() {
            match record? {
                Record::Input(literal) => circuit.inputs.push(Input {
                    literal,
                    name: None,
                    controllable: false,
                }),
                Record::Latch {
                    output,
                    input,
                    reset,
                } => {
                    let reset = if reset == Literal::FALSE {
                        Some(false)
                    } else if reset == Literal::TRUE {
                        Some(true)
                    } else if reset == output {
                        None
                    } else {
                        return Err(ModelError::InvalidReset {
                            latch: output,
                            reset,
                        }
                        .into());
                    };
                    circuit.latches.push(Latch {
                        literal: output,
                        next: input,
                        reset,
                        name: None,
                    });
                }
                Record::Output(literal) => circuit.outputs.push(Output {
                    literal,
                    name: None,
                }),
                Record::AndGate {
                    output,
                    inputs: [left, right],
                } => circuit.ands.push(AndGate {
                    output,
                    left,
                    right,
                }),
                Record::Symbol {
                    kind,
                    position,
                    name,
                } => circuit.set_symbol(kind, position, name)?,
                Record::Comment(comment) => circuit.comments.push(comment),
            }
        }

        debug!(
            "circuit: {} inputs ({} controllable), {} latches, {} outputs, {} AND gates",
            circuit.inputs.len(),
            circuit.controllable_inputs().count(),
            circuit.latches.len(),
            circuit.outputs.len(),
            circuit.ands.len()
        );
        Ok(circuit)
    }

    fn set_symbol(&mut self, kind: SymbolKind, position: usize, name: String) -> Result<(), ModelError> {
        let tagged = name.starts_with(CONTROLLABLE_PREFIX);
        match kind {
            SymbolKind::Input => {
                let input = &mut self.inputs[position];
                input.controllable = tagged;
                input.name = Some(name);
            }
            SymbolKind::Latch | SymbolKind::Output if tagged => {
                return Err(ModelError::InconsistentTagging(format!(
                    "only inputs can be controllable, got {:?} symbol '{}'",
                    kind, name
                )))
            }
            SymbolKind::Latch => self.latches[position].name = Some(name),
            SymbolKind::Output => self.outputs[position].name = Some(name),
        }
        Ok(())
    }

    pub fn read(reader: impl Read) -> Result<Self, ParseError> {
        Self::from_reader(&Reader::from_reader(reader)?)
    }

    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Self::read(text.as_bytes())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        Self::read(std::fs::File::open(path)?)
    }

    pub fn controllable_inputs(&self) -> impl Iterator<Item = &Input> {
        self.inputs.iter().filter(|i| i.controllable)
    }

    pub fn uncontrollable_inputs(&self) -> impl Iterator<Item = &Input> {
        self.inputs.iter().filter(|i| !i.controllable)
    }

    /// Checks literal ranges and that every variable is defined at most once,
    /// by a positive literal.
    pub fn validate(&self) -> Result<(), ModelError> {
        let mut defined = HashSet::new();
        let mut define = |literal: Literal, what: &'static str| {
            if literal.variable() > self.max_var {
                return Err(ModelError::LiteralOutOfRange {
                    literal,
                    max_var: self.max_var,
                });
            }
            if literal.is_negated() {
                return Err(ModelError::NegatedDefinition { what, literal });
            }
            if literal.is_constant() || !defined.insert(literal.variable()) {
                return Err(ModelError::DuplicateDefinition { literal });
            }
            Ok(())
        };
        for input in &self.inputs {
            define(input.literal, "input")?;
        }
        for latch in &self.latches {
            define(latch.literal, "latch")?;
        }
        for gate in &self.ands {
            define(gate.output, "AND gate output")?;
        }

        let used = self
            .latches
            .iter()
            .map(|l| l.next)
            .chain(self.outputs.iter().map(|o| o.literal))
            .chain(self.ands.iter().flat_map(|g| [g.left, g.right]));
        for literal in used {
            if literal.variable() > self.max_var {
                return Err(ModelError::LiteralOutOfRange {
                    literal,
                    max_var: self.max_var,
                });
            }
        }
        Ok(())
    }

    /// AND gates in the cone of influence of `roots`, children before parents.
    ///
    /// The traversal uses an explicit stack with grey/black marking, so deep
    /// circuits do not overflow the call stack and combinational cycles are
    /// reported.
    pub fn topological_gates(
        &self,
        roots: impl IntoIterator<Item = (Literal, String)>,
    ) -> Result<Vec<AndGate>, ModelError> {
        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Mark {
            Grey,
            Black,
        }

        let gates: HashMap<u32, &AndGate> =
            self.ands.iter().map(|g| (g.output.variable(), g)).collect();
        let leaves: HashSet<u32> = self
            .inputs
            .iter()
            .map(|i| i.literal.variable())
            .chain(self.latches.iter().map(|l| l.literal.variable()))
            .chain([0])
            .collect();

        let mut marks: HashMap<u32, Mark> = HashMap::new();
        let mut order = Vec::new();

        for (root, context) in roots {
            let mut stack = vec![(root.variable(), false)];
            while let Some((var, expanded)) = stack.pop() {
                if leaves.contains(&var) {
                    continue;
                }
                let Some(gate) = gates.get(&var) else {
                    return Err(ModelError::UndefinedLiteral {
                        literal: Literal::from_variable(var, false),
                        context: context.clone(),
                    });
                };
                if expanded {
                    marks.insert(var, Mark::Black);
                    order.push(**gate);
                    continue;
                }
                match marks.get(&var) {
                    Some(Mark::Black) => continue,
                    Some(Mark::Grey) => {
                        return Err(ModelError::CombinationalCycle { gate: gate.output })
                    }
                    None => {}
                }
                marks.insert(var, Mark::Grey);
                stack.push((var, true));
                for child in [gate.right, gate.left] {
                    match marks.get(&child.variable()) {
                        Some(Mark::Grey) => {
                            return Err(ModelError::CombinationalCycle { gate: gate.output })
                        }
                        Some(Mark::Black) => {}
                        None => stack.push((child.variable(), false)),
                    }
                }
            }
        }

        Ok(order)
    }

    /// Evaluates one clock step. `latch_values` and `input_values` follow the
    /// declaration order of [`Circuit::latches`] and [`Circuit::inputs`].
    pub fn simulate_step(&self, latch_values: &[bool], input_values: &[bool]) -> Result<Step, ModelError> {
        let mut values: HashMap<u32, bool> = HashMap::from([(0, false)]);
        for (input, &value) in self.inputs.iter().zip(input_values) {
            values.insert(input.literal.variable(), value);
        }
        for (latch, &value) in self.latches.iter().zip(latch_values) {
            values.insert(latch.literal.variable(), value);
        }

        let roots = self.roots();
        for gate in self.topological_gates(roots)? {
            let value = eval(&values, gate.left) && eval(&values, gate.right);
            values.insert(gate.output.variable(), value);
        }

        Ok(Step {
            outputs: self.outputs.iter().map(|o| eval(&values, o.literal)).collect(),
            next_latches: self.latches.iter().map(|l| eval(&values, l.next)).collect(),
        })
    }

    /// Latch next-state literals and outputs, named for diagnostics.
    pub(crate) fn roots(&self) -> Vec<(Literal, String)> {
        let latches = self
            .latches
            .iter()
            .map(|l| (l.next, format!("the next-state function of latch {}", l.literal)));
        let outputs = self
            .outputs
            .iter()
            .enumerate()
            .map(|(i, o)| (o.literal, format!("output {}", i)));
        latches.chain(outputs).collect()
    }

    /// Writes the circuit in ASCII AIGER format.
    pub fn write_aag(&self, out: &mut impl Write) -> std::io::Result<()> {
        writeln!(
            out,
            "aag {} {} {} {} {}",
            self.max_var,
            self.inputs.len(),
            self.latches.len(),
            self.outputs.len(),
            self.ands.len()
        )?;
        for input in &self.inputs {
            writeln!(out, "{}", input.literal)?;
        }
        for latch in &self.latches {
            match latch.reset {
                Some(false) => writeln!(out, "{} {}", latch.literal, latch.next)?,
                Some(true) => writeln!(out, "{} {} 1", latch.literal, latch.next)?,
                None => writeln!(out, "{} {} {}", latch.literal, latch.next, latch.literal)?,
            }
        }
        for output in &self.outputs {
            writeln!(out, "{}", output.literal)?;
        }
        for gate in &self.ands {
            writeln!(out, "{} {} {}", gate.output, gate.left, gate.right)?;
        }
        for (i, input) in self.inputs.iter().enumerate() {
            if let Some(name) = &input.name {
                writeln!(out, "i{} {}", i, name)?;
            }
        }
        for (i, latch) in self.latches.iter().enumerate() {
            if let Some(name) = &latch.name {
                writeln!(out, "l{} {}", i, name)?;
            }
        }
        for (i, output) in self.outputs.iter().enumerate() {
            if let Some(name) = &output.name {
                writeln!(out, "o{} {}", i, name)?;
            }
        }
        if !self.comments.is_empty() {
            writeln!(out, "c")?;
            for comment in &self.comments {
                writeln!(out, "{}", comment)?;
            }
        }
        Ok(())
    }

    pub fn to_aag_string(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_aag(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn eval(values: &HashMap<u32, bool>, literal: Literal) -> bool {
    let value = values.get(&literal.variable()).copied().unwrap_or(false);
    value != literal.is_negated()
}
