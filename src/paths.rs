//! Iterator over the paths of a diagram that end in the one terminal.
//!
//! Each path is a cube: a conjunction of literals, ordered by the variable
//! order, under which the function is true. Variables skipped by a path are
//! free. The disjunction of all paths is the function itself, and distinct
//! paths are disjoint.
//!
//! ```
//! use aig_synth::bdd::Bdd;
//!
//! # fn main() -> aig_synth::error::Result<()> {
//! let bdd = Bdd::default();
//! let x = bdd.mk_var(1)?;
//! let y = bdd.mk_var(2)?;
//!
//! let f = bdd.apply_xor(x, y)?;
//! let paths: Vec<_> = bdd.paths(f).collect();
//! assert_eq!(paths.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! The number of paths can be exponential in the number of variables.

use crate::bdd::Bdd;
use crate::reference::Ref;
use crate::types::{Lit, Var};

impl Bdd {
    /// Returns an iterator over all paths to the one terminal of `f`.
    pub fn paths(&self, f: Ref) -> BddPaths<'_> {
        BddPaths::new(self, f)
    }

    /// Returns an iterator over all paths to the zero terminal of `f`.
    pub fn paths_to_false(&self, f: Ref) -> BddPaths<'_> {
        BddPaths::new(self, -f)
    }
}

#[derive(Debug, Clone, Copy)]
enum Branch {
    High,
    Low,
}

#[derive(Debug)]
struct StackFrame {
    node: Ref,
    /// Which branch to explore next (None if both explored)
    next_branch: Option<Branch>,
}

/// Depth-first path enumerator created by [`Bdd::paths()`].
///
/// The current path is kept in one vector that grows and shrinks with the
/// traversal; a fresh vector is only allocated for a yielded path.
pub struct BddPaths<'a> {
    bdd: &'a Bdd,
    stack: Vec<StackFrame>,
    current_path: Vec<Lit>,
}

impl<'a> BddPaths<'a> {
    pub fn new(bdd: &'a Bdd, f: Ref) -> Self {
        BddPaths {
            bdd,
            stack: vec![StackFrame {
                node: f,
                next_branch: Some(Branch::High),
            }],
            current_path: Vec::new(),
        }
    }

    fn backtrack(&mut self) {
        self.stack.pop();
        // Pop the literal that led us here (unless we're at root)
        if !self.stack.is_empty() {
            self.current_path.pop();
        }
    }
}

impl Iterator for BddPaths<'_> {
    type Item = Vec<Lit>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let frame = self.stack.last_mut()?;
            let node = frame.node;

            if self.bdd.is_one(node) {
                let result = self.current_path.clone();
                self.backtrack();
                return Some(result);
            }

            if self.bdd.is_zero(node) {
                self.backtrack();
                continue;
            }

            let var = Var::new(self.bdd.variable(node.index()));

            match frame.next_branch {
                Some(Branch::High) => {
                    frame.next_branch = Some(Branch::Low);
                    self.current_path.push(var.pos());
                    self.stack.push(StackFrame {
                        node: self.bdd.high_node(node),
                        next_branch: Some(Branch::High),
                    });
                }
                Some(Branch::Low) => {
                    frame.next_branch = None;
                    self.current_path.push(var.neg());
                    self.stack.push(StackFrame {
                        node: self.bdd.low_node(node),
                        next_branch: Some(Branch::High),
                    });
                }
                None => self.backtrack(),
            }
        }
    }
}
