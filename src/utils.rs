/// Szudzik's [elegant pairing][szudzik], wrapping on overflow.
///
/// [szudzik]: http://szudzik.com/ElegantPairing.pdf
fn pairing2(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

pub fn pairing3(a: u64, b: u64, c: u64) -> u64 {
    pairing2(pairing2(a, b), c)
}

/// Bucket hash of values stored in a [`Table`][crate::table::Table].
pub trait MyHash {
    fn hash(&self) -> u64;
}
