//! Compact bitset representation for taxon sets.
//!
//! # Overview
//! A bitset is an efficient way to represent one side of a split.
//! Each bit position corresponds to a taxon id. Taxa are numbered from 1, so
//! bit 0 is never set by the split code.
//!
//! # Example
//! For taxa [A, B, C, D] numbered [1, 2, 3, 4]:
//! - Side {A, C} → bitset `0b01010` (bits 1 and 3 set)
//! - Side {B, C, D} → bitset `0b11100` (bits 2, 3, 4 set)

/// A compact bitset for representing which taxa belong to a split side.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily many taxa.
/// Each u64 word holds 64 taxon ids. Two bitsets compare equal only if they
/// were allocated with the same number of words, which holds for all sides
/// created through [`Bitset::for_taxa`] with the same `ntax`.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Creates a new bitset with all bits set to 0.
    ///
    /// # Parameters
    /// - `words`: Number of u64 words needed.
    ///
    /// # Example
    /// ```
    /// # use splitnet::bitset::Bitset;
    /// let bs = Bitset::zeros(2);
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Creates an empty bitset able to hold taxa `1..=ntax`.
    ///
    /// ```
    /// # use splitnet::bitset::Bitset;
    /// // 64 taxa need bits 1..=64, so two words
    /// assert_eq!(Bitset::for_taxa(64).0.len(), 2);
    /// assert_eq!(Bitset::for_taxa(63).0.len(), 1);
    /// ```
    pub fn for_taxa(ntax: usize) -> Self {
        Self::zeros((ntax + 1).div_ceil(64))
    }

    /// Creates a bitset holding exactly the given taxa.
    pub fn from_taxa(ntax: usize, taxa: &[usize]) -> Self {
        let mut bs = Self::for_taxa(ntax);
        for &t in taxa {
            bs.set(t);
        }
        bs
    }

    /// Sets the bit at the given index to 1.
    ///
    /// # Example
    /// ```
    /// # use splitnet::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(5);
    /// assert_eq!(bs.0[0], 0b00100001);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // Equivalent to idx / 64
        let bit = idx & 63; // Equivalent to idx % 64
        self.0[word] |= 1u64 << bit;
    }

    #[inline]
    pub fn clear(&mut self, idx: usize) {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0[word] &= !(1u64 << bit);
    }

    /// Returns whether the bit at `idx` is set. Indices past the last word
    /// are reported as unset.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        let word = idx >> 6;
        let bit = idx & 63;
        self.0.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// # Example
    /// ```
    /// # use splitnet::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    ///
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    ///
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Intersection as a new bitset.
    pub fn and(&self, other: &Bitset) -> Bitset {
        Bitset(self.0.iter().zip(&other.0).map(|(a, b)| a & b).collect())
    }

    /// Counts the number of set bits (population count).
    ///
    /// # Example
    /// ```
    /// # use splitnet::bitset::Bitset;
    /// let mut bs = Bitset::zeros(1);
    /// bs.set(0);
    /// bs.set(2);
    /// bs.set(5);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&w| w == 0)
    }

    /// `self ⊆ other`
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a & !b == 0)
    }

    /// `self ∩ other ≠ ∅`
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Complement relative to taxa `1..=ntax`.
    ///
    /// Flips bits 1 through `ntax`, bit 0 and bits past `ntax` stay 0.
    ///
    /// # Example
    /// ```
    /// # use splitnet::bitset::Bitset;
    /// let side = Bitset::from_taxa(4, &[1, 2]);
    /// assert_eq!(side.complement(4), Bitset::from_taxa(4, &[3, 4]));
    /// ```
    pub fn complement(&self, ntax: usize) -> Bitset {
        let mut result = Bitset::for_taxa(ntax);
        for t in 1..=ntax {
            if !self.contains(t) {
                result.set(t);
            }
        }
        result
    }

    /// Smallest set index, if any.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Iterates the set bit indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(w, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let tz = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some((w << 6) + tz)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::zeros(1);
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.0[0], 0b0101);
        bs.clear(0);
        assert_eq!(bs.0[0], 0b0100);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
        assert!(!bs.contains(1000));
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::zeros(1);
        bs1.set(0);
        bs1.set(1);

        let mut bs2 = Bitset::zeros(1);
        bs2.set(2);
        bs2.set(3);

        bs1.or_assign(&bs2);
        assert_eq!(bs1.0[0], 0b1111);
    }

    #[test]
    fn test_subset_and_intersection() {
        let a = Bitset::from_taxa(6, &[2, 3]);
        let b = Bitset::from_taxa(6, &[2, 3, 4]);
        let c = Bitset::from_taxa(6, &[5, 6]);
        assert!(a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.and(&b), a);
        assert!(a.and(&c).is_empty());
    }

    /// Complement of the side {B, C} of a 5-taxon split
    ///
    /// Taxa: A=1, B=2, C=3, D=4, E=5
    /// - {B, C} → `0b001100`
    /// - {A, D, E} → `0b110010`
    #[test]
    fn test_complement() {
        let bc = Bitset::from_taxa(5, &[2, 3]);
        assert_eq!(bc.0[0], 0b001100);
        let rest = bc.complement(5);
        assert_eq!(rest.0[0], 0b110010);
        assert_eq!(rest.complement(5), bc);
    }

    #[test]
    fn test_iter_across_words() {
        let mut bs = Bitset::for_taxa(130);
        for t in [1, 63, 64, 65, 127, 130] {
            bs.set(t);
        }
        assert_eq!(bs.iter().collect::<Vec<_>>(), vec![1, 63, 64, 65, 127, 130]);
        assert_eq!(bs.first(), Some(1));
        assert_eq!(bs.count_ones(), 6);
    }
}
