//! Splits, split systems and compatibility predicates.
//!
//! A split is a bipartition of the taxa `{1..ntax}`. We only store one side of
//! each split, always the side that does NOT contain taxon 1, so that a split
//! and its complement have identical representations.
//!
//! ```text
//! taxa 1..5, split {1,4,5} | {2,3}
//! stored part: {2,3} → 0b001100
//! ```

use crate::bitset::Bitset;
use crate::error::{Result, SplitNetError};

/// A weighted bipartition of the taxon set.
#[derive(Clone, Debug, PartialEq)]
pub struct Split {
    /// Canonical side: the part not containing taxon 1.
    part: Bitset,
    ntax: usize,
    weight: f64,
    confidence: Option<f64>,
}

impl Split {
    /// Builds a split from either of its sides.
    ///
    /// # Errors
    /// Fails with [`SplitNetError::InvalidInput`] if the side names a taxon
    /// outside `1..=ntax`, is empty or is the full taxon set, or if the weight
    /// is negative or not finite.
    pub fn new(ntax: usize, side: Bitset, weight: f64) -> Result<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(SplitNetError::InvalidInput(format!(
                "split weight must be finite and non-negative, got {weight}"
            )));
        }
        if let Some(t) = side.iter().find(|&t| t == 0 || t > ntax) {
            return Err(SplitNetError::InvalidInput(format!(
                "taxon {t} not contained in taxa 1..={ntax}"
            )));
        }
        let mut side = side;
        side.0.resize((ntax + 1).div_ceil(64), 0);
        let part = if side.contains(1) { side.complement(ntax) } else { side };
        let size = part.count_ones();
        if size == 0 || size == ntax {
            return Err(SplitNetError::InvalidInput(
                "a split side must be a proper non-empty subset of the taxa".into(),
            ));
        }
        Ok(Split {
            part,
            ntax,
            weight,
            confidence: None,
        })
    }

    /// Builds a split from a list of taxa on one side.
    pub fn from_taxa(ntax: usize, side: &[usize], weight: f64) -> Result<Self> {
        if let Some(&t) = side.iter().find(|&&t| t == 0 || t > ntax) {
            return Err(SplitNetError::InvalidInput(format!(
                "taxon {t} not contained in taxa 1..={ntax}"
            )));
        }
        Self::new(ntax, Bitset::from_taxa(ntax, side), weight)
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// The side not containing taxon 1.
    pub fn part(&self) -> &Bitset {
        &self.part
    }

    /// The side not containing taxon `t`.
    pub fn part_not_containing(&self, t: usize) -> Bitset {
        if self.part.contains(t) {
            self.part.complement(self.ntax)
        } else {
            self.part.clone()
        }
    }

    pub fn ntax(&self) -> usize {
        self.ntax
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight.max(0.0);
    }

    pub fn confidence(&self) -> Option<f64> {
        self.confidence
    }

    /// Size of the smaller side.
    pub fn size(&self) -> usize {
        let k = self.part.count_ones();
        k.min(self.ntax - k)
    }

    pub fn is_trivial(&self) -> bool {
        self.size() == 1
    }

    /// Whether `i` and `j` lie on different sides.
    pub fn separates(&self, i: usize, j: usize) -> bool {
        self.part.contains(i) != self.part.contains(j)
    }

    /// Same bipartition, ignoring weights.
    pub fn same_bipartition(&self, other: &Split) -> bool {
        self.ntax == other.ntax && self.part == other.part
    }
}

/// Two splits are compatible iff one of the four side intersections is empty.
///
/// Both stored parts avoid taxon 1, so the intersection of the two
/// complements is never empty and the test reduces to disjointness or nesting.
pub fn are_compatible(a: &Split, b: &Split) -> bool {
    let (pa, pb) = (a.part(), b.part());
    !pa.intersects(pb) || pa.is_subset_of(pb) || pb.is_subset_of(pa)
}

/// Weak compatibility of three splits.
///
/// The three splits are weakly compatible unless four taxa realise one of the
/// two forbidden patterns
/// `A1∩A2∩A3, A1∩B2∩B3, B1∩A2∩B3, B1∩B2∩A3` or its mirror image
/// `B1∩B2∩B3, B1∩A2∩A3, A1∩B2∩A3, A1∩A2∩B3`.
pub fn are_weakly_compatible(s1: &Split, s2: &Split, s3: &Split) -> bool {
    let ntax = s1.ntax();
    let (a1, a2, a3) = (s1.part(), s2.part(), s3.part());
    let (b1, b2, b3) = (a1.complement(ntax), a2.complement(ntax), a3.complement(ntax));
    let meets = |x: &Bitset, y: &Bitset, z: &Bitset| x.and(y).intersects(z);

    let even = meets(a1, a2, a3) && meets(a1, &b2, &b3) && meets(&b1, a2, &b3) && meets(&b1, &b2, a3);
    let odd = meets(&b1, &b2, &b3) && meets(&b1, a2, a3) && meets(a1, &b2, a3) && meets(a1, a2, &b3);
    !(even || odd)
}

/// Rotates a 1-based circular ordering so that position 1 holds taxon 1.
///
/// ```
/// # use splitnet::split::normalize_cycle;
/// assert_eq!(normalize_cycle(&[0, 3, 4, 1, 2]), vec![0, 1, 2, 3, 4]);
/// ```
pub fn normalize_cycle(cycle: &[usize]) -> Vec<usize> {
    let n = cycle.len().saturating_sub(1);
    let start = (1..=n).find(|&i| cycle[i] == 1).unwrap_or(1);
    let mut result = vec![0; cycle.len()];
    for (k, slot) in result.iter_mut().enumerate().skip(1) {
        *slot = cycle[(start + k - 2) % n + 1];
    }
    result
}

/// A list of splits on a common taxon set, optionally with a circular ordering.
#[derive(Clone, Debug, Default)]
pub struct SplitSystem {
    ntax: usize,
    splits: Vec<Split>,
    cycle: Option<Vec<usize>>,
}

impl SplitSystem {
    pub fn new(ntax: usize) -> Self {
        SplitSystem {
            ntax,
            splits: Vec::new(),
            cycle: None,
        }
    }

    pub fn from_splits(ntax: usize, splits: Vec<Split>) -> Result<Self> {
        let mut system = SplitSystem::new(ntax);
        for split in splits {
            system.push(split)?;
        }
        Ok(system)
    }

    /// Attaches a circular ordering (1-based, index 0 unused).
    ///
    /// # Errors
    /// The ordering must have length `ntax + 1` and be a permutation of `1..=ntax`.
    pub fn with_cycle(mut self, cycle: Vec<usize>) -> Result<Self> {
        if cycle.len() != self.ntax + 1 {
            return Err(SplitNetError::InvalidInput(format!(
                "circular ordering must have length {}, got {}",
                self.ntax + 1,
                cycle.len()
            )));
        }
        let mut seen = vec![false; self.ntax + 1];
        for &t in &cycle[1..] {
            if t == 0 || t > self.ntax || seen[t] {
                return Err(SplitNetError::InvalidInput(format!(
                    "circular ordering is not a permutation of 1..={} (offending entry {t})",
                    self.ntax
                )));
            }
            seen[t] = true;
        }
        self.cycle = Some(cycle);
        Ok(self)
    }

    pub fn push(&mut self, split: Split) -> Result<()> {
        if split.ntax() != self.ntax {
            return Err(SplitNetError::InvalidInput(format!(
                "split on {} taxa added to a system on {} taxa",
                split.ntax(),
                self.ntax
            )));
        }
        self.splits.push(split);
        Ok(())
    }

    pub fn ntax(&self) -> usize {
        self.ntax
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    pub fn get(&self, id: usize) -> &Split {
        &self.splits[id]
    }

    pub fn splits(&self) -> &[Split] {
        &self.splits
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Split> {
        self.splits.iter()
    }

    pub fn cycle(&self) -> Option<&[usize]> {
        self.cycle.as_deref()
    }

    /// Whether the split's side not containing taxon 1 is an interval of the
    /// (normalised) circular ordering. Always false without an ordering.
    pub fn is_circular(&self, split: &Split) -> bool {
        match &self.cycle {
            Some(cycle) => is_interval(&normalize_cycle(cycle), split.part()),
            None => false,
        }
    }

    pub fn into_splits(self) -> Vec<Split> {
        self.splits
    }
}

/// Whether `part` occupies consecutive positions of a normalised cycle.
pub(crate) fn is_interval(cycle: &[usize], part: &Bitset) -> bool {
    let positions: Vec<usize> = (1..cycle.len()).filter(|&i| part.contains(cycle[i])).collect();
    match (positions.first(), positions.last()) {
        (Some(&lo), Some(&hi)) => hi - lo + 1 == positions.len(),
        _ => false,
    }
}
