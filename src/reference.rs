use std::fmt::{Display, Formatter};
use std::ops::Neg;

/// A handle to a diagram node, possibly complemented.
///
/// The least significant bit is the negation flag, the remaining bits hold the
/// index of the node in the node table. Two handles are equal if and only if
/// they denote the same Boolean function.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Ref(u32);

impl Ref {
    pub const fn new(index: u32, negated: bool) -> Self {
        Self((index << 1) | negated as u32)
    }

    pub const fn positive(index: u32) -> Self {
        Self::new(index, false)
    }

    pub const fn negative(index: u32) -> Self {
        Self::new(index, true)
    }

    /// Index of the referenced node in the table.
    pub const fn index(self) -> u32 {
        self.0 >> 1
    }

    pub const fn is_negated(self) -> bool {
        self.0 & 1 != 0
    }

    /// The non-complemented version of this handle.
    pub const fn regular(self) -> Self {
        Self(self.0 & !1)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl Neg for Ref {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(self.0 ^ 1)
    }
}

impl Display for Ref {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}@{}",
            if self.is_negated() { "~" } else { "" },
            self.index()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_polarity() {
        let pos = Ref::positive(42);
        let neg = Ref::negative(42);

        assert_eq!(pos.index(), 42);
        assert_eq!(neg.index(), 42);
        assert!(!pos.is_negated());
        assert!(neg.is_negated());
        assert_ne!(pos, neg);
        assert_eq!(-pos, neg);
        assert_eq!(-(-pos), pos);
        assert_eq!(neg.regular(), pos);
    }

    #[test]
    fn test_ref_display() {
        assert_eq!(Ref::positive(7).to_string(), "@7");
        assert_eq!(Ref::negative(7).to_string(), "~@7");
    }
}
