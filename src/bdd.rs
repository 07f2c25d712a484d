//! The decision diagram manager.
//!
//! All diagrams live in one [`Bdd`] manager: a hash-consed node table plus a
//! computed table. Nodes are addressed through [`Ref`] handles with
//! complement edges, so negation is free and `f == g` is an O(1) equivalence
//! check. The variable order is the numeric order of variable identifiers and
//! never changes.
//!
//! Every operation that may create nodes returns a [`Result`]: when the node
//! table reaches its configured limit the operation fails with
//! [`Error::ResourceExhausted`] instead of returning a partial diagram.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt::Debug;

use log::{debug, trace};

use crate::cache::{Cache, OpKey};
use crate::error::{Error, Result};
use crate::reference::Ref;
use crate::table::{Table, TableFull};
use crate::utils::{pairing3, MyHash};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Node {
    variable: u32,
    low: Ref,
    high: Ref,
}

#[allow(clippy::derivable_impls)]
impl Default for Node {
    fn default() -> Self {
        Self {
            variable: 0,
            low: Ref::positive(0),
            high: Ref::positive(0),
        }
    }
}

impl MyHash for Node {
    fn hash(&self) -> u64 {
        pairing3(
            self.variable as u64,
            self.low.raw() as u64,
            self.high.raw() as u64,
        )
    }
}

impl From<TableFull> for Error {
    fn from(full: TableFull) -> Self {
        Error::ResourceExhausted { limit: full.limit }
    }
}

/// Binary Boolean connectives accepted by [`Bdd::apply`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BoolOp {
    And,
    Or,
    Xor,
    Implies,
    Iff,
}

pub struct Bdd {
    storage: RefCell<Table<Node>>,
    cache: RefCell<Cache<OpKey, Ref>>,
    /// External reference counts, keyed by node index.
    roots: RefCell<HashMap<u32, usize>>,
    zero: Ref,
    one: Ref,
}

impl Bdd {
    /// Default maximum number of nodes.
    pub const DEFAULT_NODE_LIMIT: usize = 1 << 22;
    /// Largest node limit addressable by a [`Ref`].
    pub const MAX_NODE_LIMIT: usize = (u32::MAX >> 1) as usize - 1;

    /// Create a manager whose node table holds at most `node_limit` nodes
    /// (the terminal included).
    ///
    /// # Panics
    ///
    /// Panics if `node_limit` is zero or above [`Bdd::MAX_NODE_LIMIT`].
    pub fn new(node_limit: usize) -> Self {
        let mut storage = Table::new(node_limit);

        // Allocate the terminal node:
        let one = match storage.alloc() {
            Ok(index) => index,
            Err(_) => unreachable!("a fresh table always has room for the terminal"),
        };
        assert_eq!(one, 1); // Make sure the terminal node is (1).
        let one = Ref::positive(one as u32);
        let zero = -one;

        Self {
            storage: RefCell::new(storage),
            cache: RefCell::new(Cache::new(Self::cache_bits(node_limit))),
            roots: RefCell::new(HashMap::new()),
            zero,
            one,
        }
    }
}

impl Default for Bdd {
    fn default() -> Self {
        Bdd::new(Self::DEFAULT_NODE_LIMIT)
    }
}

impl Debug for Bdd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let storage = self.storage.borrow();
        f.debug_struct("Bdd")
            .field("limit", &storage.limit())
            .field("size", &storage.size())
            .field("real_size", &storage.real_size())
            .field("roots", &self.roots.borrow().len())
            .finish()
    }
}

impl Bdd {
    pub fn zero(&self) -> Ref {
        self.zero
    }
    pub fn one(&self) -> Ref {
        self.one
    }
    pub fn terminal(&self, value: bool) -> Ref {
        if value {
            self.one
        } else {
            self.zero
        }
    }

    /// Number of live nodes in the table, the terminal included.
    pub fn num_nodes(&self) -> usize {
        self.storage.borrow().real_size()
    }
    pub fn node_limit(&self) -> usize {
        self.storage.borrow().limit()
    }
    /// Computed-table size for a node budget: a quarter of the budget,
    /// between `2^8` and `2^18` slots.
    fn cache_bits(node_limit: usize) -> u32 {
        (usize::BITS - node_limit.leading_zeros())
            .saturating_sub(2)
            .clamp(8, 18)
    }
    pub fn cache_capacity(&self) -> usize {
        self.cache.borrow().capacity()
    }
    pub fn cache_hits(&self) -> usize {
        self.cache.borrow().hits()
    }
    pub fn cache_misses(&self) -> usize {
        self.cache.borrow().misses()
    }

    pub fn variable(&self, index: u32) -> u32 {
        self.storage.borrow().value(index as usize).variable
    }
    pub fn low(&self, index: u32) -> Ref {
        self.storage.borrow().value(index as usize).low
    }
    pub fn high(&self, index: u32) -> Ref {
        self.storage.borrow().value(index as usize).high
    }

    pub fn low_node(&self, node: Ref) -> Ref {
        let low = self.low(node.index());
        if node.is_negated() {
            -low
        } else {
            low
        }
    }
    pub fn high_node(&self, node: Ref) -> Ref {
        let high = self.high(node.index());
        if node.is_negated() {
            -high
        } else {
            high
        }
    }

    pub fn is_zero(&self, node: Ref) -> bool {
        node == self.zero
    }
    pub fn is_one(&self, node: Ref) -> bool {
        node == self.one
    }
    pub fn is_terminal(&self, node: Ref) -> bool {
        self.is_zero(node) || self.is_one(node)
    }

    /// Variable tested at the root of `node`, or 0 for the terminals.
    fn top_variable(&self, node: Ref) -> u32 {
        if self.is_terminal(node) {
            0
        } else {
            self.variable(node.index())
        }
    }

    pub fn mk_node(&self, v: u32, low: Ref, high: Ref) -> Result<Ref> {
        trace!("mk(v = {}, low = {}, high = {})", v, low, high);

        assert_ne!(v, 0, "Variable index should not be zero");

        // Handle canonicity
        if high.is_negated() {
            trace!("mk: restoring canonicity");
            return Ok(-self.mk_node(v, -low, -high)?);
        }

        // Handle duplicates
        if low == high {
            trace!("mk: duplicates {} == {}", low, high);
            return Ok(low);
        }

        let i = self.storage.borrow_mut().put(Node {
            variable: v,
            low,
            high,
        })?;
        Ok(Ref::positive(i as u32))
    }

    pub fn mk_var(&self, v: u32) -> Result<Ref> {
        assert_ne!(v, 0, "Variable index should not be zero");
        self.mk_node(v, self.zero, self.one)
    }

    /// Conjunction of the given DIMACS-style literals.
    pub fn mk_cube(&self, literals: impl IntoIterator<Item = i32>) -> Result<Ref> {
        let mut literals = literals.into_iter().collect::<Vec<_>>();
        literals.sort_by_key(|&v| (v.abs(), v));
        literals.dedup();
        debug!("cube(literals = {:?})", literals);
        if literals.windows(2).any(|w| w[0] == -w[1]) {
            return Ok(self.zero);
        }
        literals.reverse();
        let mut current = self.one;
        for lit in literals {
            assert_ne!(lit, 0, "Variable index should not be zero");
            current = if lit < 0 {
                self.mk_node(lit.unsigned_abs(), current, self.zero)?
            } else {
                self.mk_node(lit as u32, self.zero, current)?
            };
        }
        Ok(current)
    }

    /// Positive cube over a set of variables, the canonical key of that set.
    fn mk_var_set(&self, vars: &[u32]) -> Result<Ref> {
        self.mk_cube(vars.iter().map(|&v| v as i32))
    }

    pub fn top_cofactors(&self, node: Ref, v: u32) -> (Ref, Ref) {
        assert_ne!(v, 0, "Variable index should not be zero");

        let i = node.index();
        if self.is_terminal(node) || v < self.variable(i) {
            return (node, node);
        }
        assert_eq!(v, self.variable(i));
        if node.is_negated() {
            (-self.low(i), -self.high(i))
        } else {
            (self.low(i), self.high(i))
        }
    }

    /// Apply the ITE operation to the arguments.
    ///
    /// ```text
    /// ITE(x, y, z) = (x ∧ y) ∨ (¬x ∧ z)
    /// ```
    pub fn apply_ite(&self, f: Ref, g: Ref, h: Ref) -> Result<Ref> {
        trace!("apply_ite(f = {}, g = {}, h = {})", f, g, h);

        // Base cases:
        //   ite(1,G,H) => G
        //   ite(0,G,H) => H
        if self.is_one(f) {
            return Ok(g);
        }
        if self.is_zero(f) {
            return Ok(h);
        }

        // From now on, F is known not to be a constant
        assert!(!self.is_terminal(f));

        // More base cases:
        //   ite(F,G,G) => G
        //   ite(F,1,0) => F
        //   ite(F,0,1) => ~F
        //   ite(F,1,~F) => 1
        //   ite(F,F,1) => 1
        //   ite(F,~F,0) => 0
        //   ite(F,0,F) => F
        if g == h {
            return Ok(g);
        }
        if self.is_one(g) && self.is_zero(h) {
            return Ok(f);
        }
        if self.is_zero(g) && self.is_one(h) {
            return Ok(-f);
        }
        if self.is_one(g) && h == -f {
            return Ok(self.one);
        }
        if g == f && self.is_one(h) {
            return Ok(self.one);
        }
        if g == -f && self.is_zero(h) {
            return Ok(self.zero);
        }
        if self.is_zero(g) && h == f {
            return Ok(f);
        }

        // Standard triples:
        //   ite(F,F,H) => ite(F,1,H)
        //   ite(F,G,F) => ite(F,G,0)
        //   ite(F,~F,H) => ite(F,0,H)
        //   ite(F,G,~F) => ite(F,G,1)
        if g == f {
            return self.apply_ite(f, self.one, h);
        }
        if h == f {
            return self.apply_ite(f, g, self.zero);
        }
        if g == -f {
            return self.apply_ite(f, self.zero, h);
        }
        if h == -f {
            return self.apply_ite(f, g, self.one);
        }

        let i = self.top_variable(f);
        let j = self.top_variable(g);
        let k = self.top_variable(h);
        assert_ne!(i, 0);

        // Equivalent pairs:
        //   ite(F,1,H) == ite(H,1,F) == F ∨ H
        //   ite(F,G,0) == ite(G,F,0) == F ∧ G
        //   ite(F,G,1) == ite(~G,~F,1) == F -> G
        //   ite(F,0,H) == ite(~H,0,~F) == ~F ∧ H
        //   ite(F,G,~G) == ite(G,F,~F)
        // (choose the one with the lowest variable)
        if self.is_one(g) && k != 0 && k < i {
            return self.apply_ite(h, self.one, f);
        }
        if self.is_zero(h) && j != 0 && j < i {
            return self.apply_ite(g, f, self.zero);
        }
        if self.is_one(h) && j != 0 && j < i {
            return self.apply_ite(-g, -f, self.one);
        }
        if self.is_zero(g) && k != 0 && k < i {
            return self.apply_ite(-h, self.zero, -f);
        }
        if g == -h && j != 0 && j < i {
            return self.apply_ite(g, f, -f);
        }

        // Make sure the first two pointers (f and g) are regular (not negated)
        let (mut f, mut g, mut h) = (f, g, h);

        // ite(~F,G,H) => ite(F,H,G)
        if f.is_negated() {
            f = -f;
            std::mem::swap(&mut g, &mut h);
        }
        assert!(!f.is_negated());

        // ite(F,~G,H) => ~ite(F,G,~H)
        let mut n = false;
        if g.is_negated() {
            n = true;
            g = -g;
            h = -h;
        }
        assert!(!g.is_negated());

        let (f, g, h) = (f, g, h); // make immutable

        let key = OpKey::Ite(f, g, h);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            trace!("cache: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
            return Ok(if n { -res } else { res });
        }

        // Determine the top variable:
        let mut m = self.top_variable(f);
        for x in [self.top_variable(g), self.top_variable(h)] {
            if x != 0 {
                m = m.min(x);
            }
        }
        assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let e = self.apply_ite(f0, g0, h0)?;
        let t = self.apply_ite(f1, g1, h1)?;

        let res = self.mk_node(m, e, t)?;
        trace!("computed: apply_ite(f = {}, g = {}, h = {}) -> {}", f, g, h, res);
        self.cache.borrow_mut().insert(key, res);

        Ok(if n { -res } else { res })
    }

    fn maybe_constant(&self, node: Ref) -> Option<bool> {
        if self.is_zero(node) {
            Some(false)
        } else if self.is_one(node) {
            Some(true)
        } else {
            None
        }
    }

    /// Decides whether `ITE(f, g, h)` is a constant without building it.
    pub fn ite_constant(&self, f: Ref, g: Ref, h: Ref) -> Option<bool> {
        trace!("ite_constant(f = {}, g = {}, h = {})", f, g, h);

        if self.is_one(f) {
            return self.maybe_constant(g);
        }
        if self.is_zero(f) {
            return self.maybe_constant(h);
        }
        if g == h {
            return self.maybe_constant(g);
        }
        if (self.is_one(g) && self.is_zero(h)) || (self.is_zero(g) && self.is_one(h)) {
            return None;
        }
        if (self.is_one(g) && h == -f) || (g == f && self.is_one(h)) {
            return Some(true);
        }
        if g == -f && self.is_zero(h) {
            return Some(false);
        }
        if self.is_zero(g) && h == f {
            return None;
        }

        let mut m = self.top_variable(f);
        for x in [self.top_variable(g), self.top_variable(h)] {
            if x != 0 {
                m = m.min(x);
            }
        }
        assert_ne!(m, 0);

        let (f0, f1) = self.top_cofactors(f, m);
        let (g0, g1) = self.top_cofactors(g, m);
        let (h0, h1) = self.top_cofactors(h, m);

        let t = self.ite_constant(f1, g1, h1)?;
        let e = self.ite_constant(f0, g0, h0)?;
        if t == e {
            Some(t)
        } else {
            None
        }
    }

    /// Checks `f ⊆ g` without allocating nodes.
    pub fn is_implies(&self, f: Ref, g: Ref) -> bool {
        self.ite_constant(f, g, self.one) == Some(true)
    }

    pub fn apply_not(&self, f: Ref) -> Ref {
        -f
    }

    pub fn apply_and(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.apply_ite(u, v, self.zero)
    }

    pub fn apply_or(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.apply_ite(u, self.one, v)
    }

    pub fn apply_xor(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.apply_ite(u, -v, v)
    }

    pub fn apply_eq(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.apply_ite(u, v, -v)
    }

    pub fn apply_imply(&self, u: Ref, v: Ref) -> Result<Ref> {
        self.apply_ite(u, v, self.one)
    }

    pub fn apply(&self, op: BoolOp, u: Ref, v: Ref) -> Result<Ref> {
        match op {
            BoolOp::And => self.apply_and(u, v),
            BoolOp::Or => self.apply_or(u, v),
            BoolOp::Xor => self.apply_xor(u, v),
            BoolOp::Implies => self.apply_imply(u, v),
            BoolOp::Iff => self.apply_eq(u, v),
        }
    }

    pub fn apply_and_many(&self, nodes: impl IntoIterator<Item = Ref>) -> Result<Ref> {
        let mut res = self.one;
        for node in nodes.into_iter() {
            res = self.apply_and(res, node)?;
        }
        Ok(res)
    }

    // f|v<-b
    pub fn restrict(&self, f: Ref, v: u32, b: bool) -> Result<Ref> {
        let mut cache = HashMap::new();
        self.restrict_(f, v, b, &mut cache)
    }

    fn restrict_(&self, f: Ref, v: u32, b: bool, cache: &mut HashMap<Ref, Ref>) -> Result<Ref> {
        assert_ne!(v, 0, "Variable index should not be zero");

        if self.is_terminal(f) {
            return Ok(f);
        }

        let i = self.variable(f.index());

        if v < i {
            // 'f' does not depend on 'v'
            return Ok(f);
        }

        if v == i {
            return Ok(if b {
                self.high_node(f)
            } else {
                self.low_node(f)
            });
        }

        if let Some(&res) = cache.get(&f) {
            return Ok(res);
        }

        let low = self.restrict_(self.low_node(f), v, b, cache)?;
        let high = self.restrict_(self.high_node(f), v, b, cache)?;
        let res = self.mk_node(i, low, high)?;
        cache.insert(f, res);
        Ok(res)
    }

    /// Simultaneous substitution `f[v := g_v]` for every `(v, g_v)` in
    /// `substitution` (vector compose).
    pub fn compose_many(&self, f: Ref, substitution: &HashMap<u32, Ref>) -> Result<Ref> {
        let Some(&max_var) = substitution.keys().max() else {
            return Ok(f);
        };
        let mut cache = HashMap::new();
        self.compose_many_(f, substitution, max_var, &mut cache)
    }

    fn compose_many_(
        &self,
        f: Ref,
        substitution: &HashMap<u32, Ref>,
        max_var: u32,
        cache: &mut HashMap<Ref, Ref>,
    ) -> Result<Ref> {
        if self.is_terminal(f) {
            return Ok(f);
        }
        if f.is_negated() {
            return Ok(-self.compose_many_(-f, substitution, max_var, cache)?);
        }

        let v = self.variable(f.index());
        if v > max_var {
            // Nothing below is substituted.
            return Ok(f);
        }

        if let Some(&res) = cache.get(&f) {
            return Ok(res);
        }

        let low = self.compose_many_(self.low_node(f), substitution, max_var, cache)?;
        let high = self.compose_many_(self.high_node(f), substitution, max_var, cache)?;
        let cond = match substitution.get(&v) {
            Some(&g) => g,
            None => self.mk_var(v)?,
        };
        let res = self.apply_ite(cond, high, low)?;
        cache.insert(f, res);
        Ok(res)
    }

    /// Renames variables according to `mapping` (`v ↦ mapping[v]`).
    pub fn rename(&self, f: Ref, mapping: &HashMap<u32, u32>) -> Result<Ref> {
        let mut substitution = HashMap::with_capacity(mapping.len());
        for (&from, &to) in mapping {
            substitution.insert(from, self.mk_var(to)?);
        }
        self.compose_many(f, &substitution)
    }

    /// Generalized cofactor (Coudert-Madre constrain) of `f` with respect to
    /// the care set `g`: the result agrees with `f` wherever `g` holds.
    pub fn constrain(&self, f: Ref, g: Ref) -> Result<Ref> {
        trace!("constrain(f = {}, g = {})", f, g);

        if self.is_zero(g) {
            return Ok(self.zero);
        }
        if self.is_one(g) || self.is_terminal(f) {
            return Ok(f);
        }
        if f == g {
            return Ok(self.one);
        }
        if f == -g {
            return Ok(self.zero);
        }

        let key = OpKey::Constrain(f, g);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return Ok(res);
        }

        let i = self.variable(f.index());
        let j = self.variable(g.index());
        let v = i.min(j);

        let (f0, f1) = self.top_cofactors(f, v);
        let (g0, g1) = self.top_cofactors(g, v);

        let res = if self.is_zero(g1) {
            self.constrain(f0, g0)?
        } else if self.is_zero(g0) {
            self.constrain(f1, g1)?
        } else {
            let low = self.constrain(f0, g0)?;
            let high = self.constrain(f1, g1)?;
            self.mk_node(v, low, high)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    /// Existential quantification `∃ vars. f`.
    ///
    /// The whole variable set is eliminated in one traversal. The traversal
    /// uses an explicit work stack, so deep diagrams do not grow the call
    /// stack, and is memoised on `(node, cube of remaining variables)`.
    pub fn exists(&self, f: Ref, vars: &[u32]) -> Result<Ref> {
        let cube = self.mk_var_set(vars)?;
        self.exists_cube(f, cube)
    }

    /// Universal quantification `∀ vars. f = ¬∃ vars. ¬f`.
    pub fn forall(&self, f: Ref, vars: &[u32]) -> Result<Ref> {
        Ok(-self.exists(-f, vars)?)
    }

    fn exists_cube(&self, f: Ref, cube: Ref) -> Result<Ref> {
        enum Task {
            Visit(Ref, Ref),
            Combine {
                f: Ref,
                cube: Ref,
                var: u32,
                quantified: bool,
            },
        }

        let mut tasks = vec![Task::Visit(f, cube)];
        let mut results: Vec<Ref> = Vec::new();

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(f, mut cube) => {
                    if self.is_terminal(f) {
                        results.push(f);
                        continue;
                    }
                    let v = self.variable(f.index());
                    while !self.is_one(cube) && self.variable(cube.index()) < v {
                        cube = self.high_node(cube);
                    }
                    if self.is_one(cube) {
                        results.push(f);
                        continue;
                    }
                    if let Some(res) = self.cache.borrow_mut().get(&OpKey::Exists(f, cube)) {
                        results.push(res);
                        continue;
                    }
                    let quantified = self.variable(cube.index()) == v;
                    let rest = if quantified { self.high_node(cube) } else { cube };
                    tasks.push(Task::Combine {
                        f,
                        cube,
                        var: v,
                        quantified,
                    });
                    tasks.push(Task::Visit(self.high_node(f), rest));
                    tasks.push(Task::Visit(self.low_node(f), rest));
                }
                Task::Combine {
                    f,
                    cube,
                    var,
                    quantified,
                } => {
                    let (Some(high), Some(low)) = (results.pop(), results.pop()) else {
                        return Err(Error::Invariant(
                            "quantification work stack underflow".to_string(),
                        ));
                    };
                    let res = if quantified {
                        self.apply_or(low, high)?
                    } else {
                        self.mk_node(var, low, high)?
                    };
                    self.cache.borrow_mut().insert(OpKey::Exists(f, cube), res);
                    results.push(res);
                }
            }
        }

        match results.as_slice() {
            [res] => Ok(*res),
            _ => Err(Error::Invariant(format!(
                "quantification finished with {} results",
                results.len()
            ))),
        }
    }

    /// Relational product `∃ vars. (f ∧ g)`, without building `f ∧ g`.
    pub fn and_exists(&self, f: Ref, g: Ref, vars: &[u32]) -> Result<Ref> {
        let cube = self.mk_var_set(vars)?;
        self.and_exists_(f, g, cube)
    }

    fn and_exists_(&self, f: Ref, g: Ref, cube: Ref) -> Result<Ref> {
        if self.is_zero(f) || self.is_zero(g) || f == -g {
            return Ok(self.zero);
        }
        if self.is_one(f) && self.is_one(g) {
            return Ok(self.one);
        }
        if self.is_one(f) || f == g {
            return self.exists_cube(g, cube);
        }
        if self.is_one(g) {
            return self.exists_cube(f, cube);
        }
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        // Conjunction is commutative, normalize the key.
        let (f, g) = if f <= g { (f, g) } else { (g, f) };

        let top = self.variable(f.index()).min(self.variable(g.index()));
        let mut cube = cube;
        while !self.is_one(cube) && self.variable(cube.index()) < top {
            cube = self.high_node(cube);
        }
        if self.is_one(cube) {
            return self.apply_and(f, g);
        }

        let key = OpKey::AndExists(f, g, cube);
        if let Some(res) = self.cache.borrow_mut().get(&key) {
            return Ok(res);
        }

        let (f0, f1) = self.top_cofactors(f, top);
        let (g0, g1) = self.top_cofactors(g, top);

        let res = if self.variable(cube.index()) == top {
            let rest = self.high_node(cube);
            let low = self.and_exists_(f0, g0, rest)?;
            if self.is_one(low) {
                low
            } else {
                let high = self.and_exists_(f1, g1, rest)?;
                self.apply_or(low, high)?
            }
        } else {
            let low = self.and_exists_(f0, g0, cube)?;
            let high = self.and_exists_(f1, g1, cube)?;
            self.mk_node(top, low, high)?
        };

        self.cache.borrow_mut().insert(key, res);
        Ok(res)
    }

    /// Evaluates `f` under a total assignment of its variables.
    pub fn evaluate(&self, f: Ref, assignment: impl Fn(u32) -> bool) -> bool {
        let mut node = f;
        while !self.is_terminal(node) {
            let v = self.variable(node.index());
            node = if assignment(v) {
                self.high_node(node)
            } else {
                self.low_node(node)
            };
        }
        self.is_one(node)
    }

    /// Indices of all nodes reachable from `nodes`, the terminal included.
    pub fn descendants(&self, nodes: impl IntoIterator<Item = Ref>) -> HashSet<u32> {
        let mut visited = HashSet::new();
        visited.insert(self.one.index());
        let mut queue = VecDeque::from_iter(nodes);

        while let Some(node) = queue.pop_front() {
            let i = node.index();
            if visited.insert(i) {
                queue.push_back(self.low(i));
                queue.push_back(self.high(i));
            }
        }

        visited
    }

    /// Number of nodes of `f`, the terminal included.
    pub fn size(&self, f: Ref) -> u64 {
        self.descendants([f]).len() as u64
    }

    /// Variables `f` depends on, in order.
    pub fn support(&self, f: Ref) -> BTreeSet<u32> {
        self.descendants([f])
            .into_iter()
            .filter(|&i| i != self.one.index())
            .map(|i| self.variable(i))
            .collect()
    }

    /// Increments the external reference count of `f`.
    ///
    /// Nodes reachable from a referenced node survive [`Bdd::collect_garbage`].
    pub fn reference(&self, f: Ref) {
        if !self.is_terminal(f) {
            *self.roots.borrow_mut().entry(f.index()).or_insert(0) += 1;
        }
    }

    /// Releases one external reference to `f`.
    pub fn dereference(&self, f: Ref) {
        if self.is_terminal(f) {
            return;
        }
        let mut roots = self.roots.borrow_mut();
        match roots.get_mut(&f.index()) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                roots.remove(&f.index());
            }
            None => debug!("dereference of unreferenced node {}", f),
        }
    }

    /// Reclaims every node that is not reachable from a referenced node or
    /// from `extra_roots`. Returns the number of reclaimed nodes.
    ///
    /// Handles to reclaimed nodes become dangling, so callers must reference
    /// everything they keep across a collection.
    pub fn collect_garbage(&self, extra_roots: &[Ref]) -> usize {
        self.cache.borrow_mut().clear();

        let roots: Vec<Ref> = self
            .roots
            .borrow()
            .keys()
            .map(|&i| Ref::positive(i))
            .chain(extra_roots.iter().copied())
            .collect();
        let alive = self.descendants(roots);

        let dropped = self
            .storage
            .borrow_mut()
            .retain(|i, _| alive.contains(&(i as u32)));
        debug!(
            "collect_garbage: dropped {} nodes, {} alive",
            dropped,
            self.num_nodes()
        );
        dropped
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_var() -> Result<()> {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1)?;

        assert_eq!(bdd.variable(x.index()), 1);
        assert_eq!(bdd.high_node(x), bdd.one());
        assert_eq!(bdd.low_node(x), bdd.zero());
        Ok(())
    }

    #[test]
    fn test_not_var() -> Result<()> {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1)?;
        let not_x = -x;

        assert_eq!(bdd.variable(not_x.index()), 1);
        assert_eq!(bdd.high_node(not_x), bdd.zero());
        assert_eq!(bdd.low_node(not_x), bdd.one());
        Ok(())
    }

    #[test]
    fn test_terminal() {
        let bdd = Bdd::default();

        assert!(bdd.is_terminal(bdd.zero()));
        assert!(bdd.is_zero(bdd.zero()));
        assert!(!bdd.is_one(bdd.zero()));
        assert!(bdd.is_one(bdd.terminal(true)));
        assert!(bdd.is_zero(bdd.terminal(false)));
        assert_eq!(bdd.zero(), -bdd.one());
    }

    #[test]
    fn test_cube() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let x3 = bdd.mk_var(3)?;

        let f = bdd.apply_and(bdd.apply_and(x1, x2)?, x3)?;
        assert_eq!(f, bdd.mk_cube([1, 2, 3])?);

        let f = bdd.apply_and(bdd.apply_and(x1, -x2)?, -x3)?;
        assert_eq!(f, bdd.mk_cube([1, -2, -3])?);

        // Repeated literals collapse, opposite ones contradict.
        assert_eq!(bdd.mk_cube([3, 1, 3])?, bdd.apply_and(x1, x3)?);
        assert_eq!(bdd.mk_cube([2, 1, -2])?, bdd.zero());
        assert_eq!(bdd.mk_cube([])?, bdd.one());
        Ok(())
    }

    #[test]
    fn test_commutativity_is_canonical() -> Result<()> {
        let bdd = Bdd::default();

        let a = bdd.mk_var(1)?;
        let b = bdd.mk_var(2)?;

        assert_eq!(bdd.apply_and(a, b)?, bdd.apply_and(b, a)?);
        assert_eq!(bdd.apply_or(a, b)?, bdd.apply_or(b, a)?);
        assert_eq!(bdd.apply_xor(a, b)?, bdd.apply_xor(b, a)?);
        Ok(())
    }

    #[test]
    fn test_de_morgan() -> Result<()> {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1)?;
        let y = bdd.mk_var(2)?;

        assert_eq!(-bdd.apply_and(x, y)?, bdd.apply_or(-x, -y)?);
        assert_eq!(-bdd.apply_or(x, y)?, bdd.apply_and(-x, -y)?);
        Ok(())
    }

    #[test]
    fn test_xor_itself() -> Result<()> {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1)?;
        let y = bdd.mk_var(2)?;
        let f = bdd.apply_and(x, y)?;

        assert_eq!(bdd.apply_xor(f, f)?, bdd.zero());
        assert_eq!(bdd.apply_xor(f, -f)?, bdd.one());
        Ok(())
    }

    #[test]
    fn test_apply_ops() -> Result<()> {
        let bdd = Bdd::default();

        let x = bdd.mk_var(1)?;
        let y = bdd.mk_var(2)?;

        assert_eq!(bdd.apply(BoolOp::Implies, x, y)?, bdd.apply_or(-x, y)?);
        assert_eq!(bdd.apply(BoolOp::Iff, x, y)?, -bdd.apply_xor(x, y)?);
        assert_eq!(bdd.apply(BoolOp::And, x, -x)?, bdd.zero());
        assert_eq!(bdd.apply(BoolOp::Or, x, -x)?, bdd.one());
        Ok(())
    }

    #[test]
    fn test_apply_ite() -> Result<()> {
        let bdd = Bdd::default();

        // Terminal cases
        let g = bdd.mk_var(2)?;
        let h = bdd.mk_var(3)?;
        assert_eq!(bdd.apply_ite(bdd.one(), g, h)?, g);
        assert_eq!(bdd.apply_ite(bdd.zero(), g, h)?, h);

        // Functions
        let f = bdd.mk_node(4, bdd.one(), h)?;
        assert_eq!(bdd.apply_ite(f, f, h)?, bdd.apply_or(f, h)?);
        assert_eq!(bdd.apply_ite(f, g, f)?, bdd.apply_and(f, g)?);
        assert_eq!(bdd.apply_ite(f, -g, bdd.one())?, -bdd.apply_and(f, g)?);
        assert_eq!(bdd.apply_ite(f, bdd.zero(), -h)?, -bdd.apply_or(f, h)?);

        // General case
        let f = bdd.mk_var(6)?;
        let g = bdd.mk_var(7)?;
        let h = bdd.mk_var(8)?;
        let result = bdd.mk_node(6, -g, -h)?;
        assert_eq!(bdd.apply_ite(-f, -g, -h)?, result);
        Ok(())
    }

    #[test]
    fn test_restrict() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let x3 = bdd.mk_var(3)?;

        let f = bdd.apply_or(bdd.apply_eq(x1, x2)?, x3)?;
        let f_x2_zero = bdd.restrict(f, 2, false)?; // f|x2<-0
        assert_eq!(f_x2_zero, bdd.apply_or(-x1, x3)?);

        let f_x2_one = bdd.restrict(f, 2, true)?; // f|x2<-1
        assert_eq!(f_x2_one, bdd.apply_or(x1, x3)?);
        Ok(())
    }

    #[test]
    fn test_compose_many() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let x3 = bdd.mk_var(3)?;

        // f = x1 ∧ x3, substitute x1 := x2 ∨ x3, x3 := ¬x2 simultaneously
        let f = bdd.apply_and(x1, x3)?;
        let substitution = HashMap::from([(1, bdd.apply_or(x2, x3)?), (3, -x2)]);
        let g = bdd.compose_many(f, &substitution)?;
        // (x2 ∨ x3) ∧ ¬x2 = x3 ∧ ¬x2
        assert_eq!(g, bdd.apply_and(x3, -x2)?);

        // Swapping variables is a rename.
        let h = bdd.rename(bdd.apply_and(x1, -x2)?, &HashMap::from([(1, 2), (2, 1)]))?;
        assert_eq!(h, bdd.apply_and(x2, -x1)?);
        Ok(())
    }

    #[test]
    fn test_exists_forall() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let x3 = bdd.mk_var(3)?;

        // f = (x1 ∧ x2) ∨ (¬x1 ∧ x3)
        let f = bdd.apply_ite(x1, x2, x3)?;

        assert_eq!(bdd.exists(f, &[1])?, bdd.apply_or(x2, x3)?);
        assert_eq!(bdd.forall(f, &[1])?, bdd.apply_and(x2, x3)?);
        assert_eq!(bdd.exists(f, &[1, 2, 3])?, bdd.one());
        assert_eq!(bdd.forall(f, &[1, 2, 3])?, bdd.zero());
        assert_eq!(bdd.exists(f, &[])?, f);

        // Quantifying a variable the function does not depend on is a no-op.
        assert_eq!(bdd.exists(x2, &[1, 3])?, x2);
        Ok(())
    }

    #[test]
    fn test_exists_eliminates_all_variables() -> Result<()> {
        let bdd = Bdd::default();

        let mut f = bdd.zero();
        for i in 1..=6 {
            let x = bdd.mk_var(i)?;
            let y = bdd.mk_var(i + 6)?;
            f = bdd.apply_xor(f, bdd.apply_and(x, y)?)?;
        }
        let g = bdd.exists(f, &[2, 4, 6, 8, 10, 12])?;
        let support = bdd.support(g);
        for v in [2, 4, 6, 8, 10, 12] {
            assert!(!support.contains(&v), "x{} survived quantification", v);
        }
        Ok(())
    }

    #[test]
    fn test_and_exists_matches_exists_of_and() -> Result<()> {
        let bdd = Bdd::default();

        let x: Vec<Ref> = (1..=5).map(|i| bdd.mk_var(i)).collect::<Result<_>>()?;
        let f = bdd.apply_or(bdd.apply_and(x[0], x[2])?, bdd.apply_xor(x[1], x[4])?)?;
        let g = bdd.apply_eq(x[2], bdd.apply_or(x[3], -x[0])?)?;

        for vars in [vec![], vec![1], vec![3], vec![2, 4], vec![1, 2, 3, 4, 5]] {
            let expected = bdd.exists(bdd.apply_and(f, g)?, &vars)?;
            assert_eq!(bdd.and_exists(f, g, &vars)?, expected, "vars = {:?}", vars);
        }
        Ok(())
    }

    #[test]
    fn test_constrain() -> Result<()> {
        let bdd = Bdd::default();

        // f = x1*x3 + ~x1*(x2^x3)
        // g = x1*x2 + ~x2*~x3
        // f|g = x1*x2*x3
        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let x3 = bdd.mk_var(3)?;

        let f = bdd.apply_or(
            bdd.apply_and(x1, x3)?,
            bdd.apply_and(-x1, bdd.apply_xor(x2, x3)?)?,
        )?;
        let g = bdd.apply_or(bdd.apply_and(x1, x2)?, bdd.apply_and(-x2, -x3)?)?;

        assert_eq!(bdd.constrain(f, g)?, bdd.mk_cube([1, 2, 3])?);
        assert_eq!(bdd.constrain(f, bdd.one())?, f);
        assert_eq!(bdd.constrain(f, f)?, bdd.one());
        Ok(())
    }

    #[test]
    fn test_is_implies() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let f = bdd.apply_and(x1, x2)?;

        assert!(bdd.is_implies(f, x1));
        assert!(bdd.is_implies(f, x2));
        assert!(!bdd.is_implies(f, -x1));
        assert!(bdd.is_implies(f, bdd.apply_or(x1, x2)?));
        assert!(bdd.is_implies(bdd.zero(), x1));
        assert!(!bdd.is_implies(x1, x2));
        assert!(!bdd.is_implies(bdd.apply_xor(x1, x2)?, x1));
        Ok(())
    }

    #[test]
    fn test_evaluate() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let f = bdd.apply_xor(x1, x2)?;

        assert!(bdd.evaluate(f, |v| v == 1));
        assert!(bdd.evaluate(f, |v| v == 2));
        assert!(!bdd.evaluate(f, |_| true));
        assert!(bdd.evaluate(-f, |_| false));
        Ok(())
    }

    #[test]
    fn test_support_and_size() -> Result<()> {
        let bdd = Bdd::default();

        let f = bdd.mk_cube([1, -3, 5])?;
        assert_eq!(bdd.support(f), BTreeSet::from([1, 3, 5]));
        assert_eq!(bdd.size(f), 4);
        assert!(bdd.support(bdd.one()).is_empty());
        Ok(())
    }

    #[test]
    fn test_resource_exhaustion() {
        let bdd = Bdd::new(4);

        let res = (1..=10).try_fold(bdd.zero(), |acc, i| {
            let x = bdd.mk_var(i)?;
            bdd.apply_xor(acc, x)
        });
        assert!(matches!(res, Err(Error::ResourceExhausted { limit: 4 })));
    }

    #[test]
    fn test_computed_table_is_bounded() -> Result<()> {
        assert_eq!(Bdd::new(4).cache_capacity(), 1 << 8);
        assert_eq!(Bdd::new(1 << 12).cache_capacity(), 1 << 11);
        assert_eq!(Bdd::default().cache_capacity(), 1 << 18);

        // Evictions never change results.
        let bdd = Bdd::new(1 << 10);
        let x: Vec<Ref> = (1..=12).map(|i| bdd.mk_var(i)).collect::<Result<_>>()?;
        let mut parity = bdd.zero();
        for &v in &x {
            parity = bdd.apply_xor(parity, v)?;
        }
        for (i, &v) in x.iter().enumerate() {
            let rest = bdd.exists(parity, &[i as u32 + 1])?;
            assert_eq!(rest, bdd.one());
            assert_eq!(bdd.apply_xor(parity, v)?, bdd.apply_xor(v, parity)?);
        }
        assert_eq!(bdd.cache_capacity(), 1 << 9);
        Ok(())
    }

    #[test]
    fn test_collect_garbage() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        let keep = bdd.apply_and(x1, x2)?;
        let _garbage = bdd.apply_xor(bdd.mk_var(3)?, bdd.mk_var(4)?)?;

        bdd.reference(keep);
        let before = bdd.num_nodes();
        let dropped = bdd.collect_garbage(&[]);
        assert!(dropped > 0);
        assert_eq!(bdd.num_nodes(), before - dropped);

        // The kept function is intact and still canonical.
        let x1 = bdd.mk_var(1)?;
        let x2 = bdd.mk_var(2)?;
        assert_eq!(bdd.apply_and(x2, x1)?, keep);

        bdd.dereference(keep);
        bdd.collect_garbage(&[]);
        assert_eq!(bdd.num_nodes(), 1);
        Ok(())
    }
}
