use std::collections::HashMap;

use num_bigint::BigUint;

use crate::bdd::Bdd;
use crate::reference::Ref;
use crate::types::{Lit, Var};

impl Bdd {
    /// Returns one satisfying assignment for the BDD, if any exists.
    ///
    /// The assignment is returned as a vector of literals along one path,
    /// variables off the path are left free.
    /// Use `lit.is_positive()` to check if the variable is true,
    /// or `lit.to_dimacs()` to get a signed integer representation.
    ///
    /// Returns `None` if the BDD represents the constant false function.
    pub fn one_sat(&self, node: Ref) -> Option<Vec<Lit>> {
        if self.is_zero(node) {
            return None;
        }

        let mut path = Vec::new();
        let mut current = node;

        // Walk down the BDD, always picking a satisfying branch
        while !self.is_one(current) {
            let var = Var::new(self.variable(current.index()));
            let high = self.high_node(current);
            let low = self.low_node(current);

            // Prefer high branch if satisfiable, otherwise take low
            if !self.is_zero(high) {
                path.push(var.pos());
                current = high;
            } else {
                path.push(var.neg());
                current = low;
            }
        }

        Some(path)
    }

    /// Number of satisfying assignments of `node` over a space of `num_vars`
    /// variables. The support of `node` must be among those variables.
    pub fn sat_count(&self, node: Ref, num_vars: usize) -> BigUint {
        let mut cache = HashMap::new();
        let max = BigUint::from(2u32).pow(num_vars as u32);
        self.sat_count_(node, &max, &mut cache)
    }

    fn sat_count_(&self, node: Ref, max: &BigUint, cache: &mut HashMap<Ref, BigUint>) -> BigUint {
        if self.is_zero(node) {
            return BigUint::ZERO;
        } else if self.is_one(node) {
            return max.clone();
        }

        if let Some(count) = cache.get(&node) {
            return count.clone();
        }

        let low = self.low(node.index());
        let high = self.high(node.index());

        let count_low = self.sat_count_(low, max, cache);
        let count_high = self.sat_count_(high, max, cache);

        let count: BigUint = (count_low + count_high) >> 1;
        let count = if node.is_negated() { max - count } else { count };

        cache.insert(node, count.clone());
        count
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;
    use crate::error::Result;

    fn dimacs(model: Option<Vec<Lit>>) -> Option<Vec<i32>> {
        model.map(|lits| lits.iter().map(|l| l.to_dimacs()).collect())
    }

    #[test]
    fn test_one_sat() -> Result<()> {
        let bdd = Bdd::default();

        let f = bdd.mk_cube([1, -2, -3])?;
        println!("f = {} of size {}", f, bdd.size(f));
        let model = dimacs(bdd.one_sat(f));
        println!("model = {:?}", model);
        assert_eq!(model, Some(vec![1, -2, -3]));

        let g = bdd.apply_and(f, -bdd.mk_cube(model.unwrap_or_default())?)?;
        println!("g = {} of size {}", g, bdd.size(g));
        assert_eq!(bdd.one_sat(g), None);
        Ok(())
    }

    #[test]
    fn test_one_sat_many() -> Result<()> {
        let bdd = Bdd::default();

        let mut all_cubes = Vec::new();

        for &s1 in &[1, -1] {
            for &s2 in &[1, -1] {
                for &s3 in &[1, -1] {
                    all_cubes.push([s1, 2 * s2, 3 * s3]);
                }
            }
        }

        for cube in all_cubes {
            println!("Testing cube: {:?}", cube);

            let f = bdd.mk_cube(cube)?;
            assert_eq!(dimacs(bdd.one_sat(f)), Some(cube.to_vec()));

            let g = bdd.apply_and(f, -bdd.mk_cube(cube)?)?;
            assert_eq!(bdd.one_sat(g), None);
        }
        Ok(())
    }

    #[test]
    fn test_sat_count_terminal() {
        let bdd = Bdd::default();

        assert_eq!(bdd.sat_count(bdd.zero(), 1), BigUint::from(0u32));
        assert_eq!(bdd.sat_count(bdd.zero(), 3), BigUint::from(0u32));

        assert_eq!(bdd.sat_count(bdd.one(), 1), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(bdd.one(), 2), BigUint::from(4u32));
        assert_eq!(bdd.sat_count(bdd.one(), 3), BigUint::from(8u32));
    }

    #[test]
    fn test_sat_count_var() -> Result<()> {
        let bdd = Bdd::default();

        let x1 = bdd.mk_var(1)?;
        assert_eq!(bdd.sat_count(x1, 1), BigUint::from(1u32));
        assert_eq!(bdd.sat_count(x1, 3), BigUint::from(4u32));

        let x2 = bdd.mk_var(2)?;
        assert_eq!(bdd.sat_count(x2, 2), BigUint::from(2u32));
        assert_eq!(bdd.sat_count(-x2, 3), BigUint::from(4u32));
        Ok(())
    }

    #[test]
    fn test_sat_count_clause() -> Result<()> {
        let bdd = Bdd::default();

        let f = bdd.apply_or(bdd.mk_var(1)?, bdd.mk_var(2)?)?;
        println!("f = {} of size {}", f, bdd.size(f));

        assert_eq!(bdd.sat_count(f, 2), BigUint::from(3u32));
        assert_eq!(bdd.sat_count(f, 3), BigUint::from(6u32));
        assert_eq!(bdd.sat_count(-f, 4), BigUint::from(4u32));
        Ok(())
    }
}
