//! Pairwise comparison of two aligned sequences.
//!
//! # Overview
//! [`PairwiseCompare`] walks both sequences site by site and accumulates a
//! `(k+2) × (k+2)` matrix `F` of weighted state co-occurrences, where `k` is
//! the number of alphabet states. Row/column `k` counts gaps and `k+1` counts
//! missing data.
//!
//! Ambiguity codes spread a site's weight fractionally:
//! ```text
//! A vs R(=A|G)          → F[A][A] += ½, F[A][G] += ½
//! R vs R                → F[A][A] += ½, F[G][G] += ½   (agreement)
//! R vs Y(=C|T)          → ¼ to each of AC, AT, GC, GT
//! ```
//! Under [`AmbiguityPolicy::Ignore`] no spreading happens and ambiguity codes
//! are rejected as unknown symbols.
//!
//! From `F` we derive the uncorrected p-distance and the maximum-likelihood
//! branch length under a [`SubstitutionModel`].

use crate::alphabet::{Alphabet, AmbiguityPolicy, Symbol};
use crate::error::{Result, SplitNetError};
use crate::model::SubstitutionModel;

const GOLDEN: f64 = 0.381_966_011_250_105_1; // (3 - √5) / 2
const SEARCH_TOLERANCE: f64 = 1e-9;
const SATURATION_MARGIN: f64 = 1e-6;

/// Per-site weights, site mask and ambiguity handling for a comparison.
#[derive(Clone, Debug, Default)]
pub struct CompareOptions {
    weights: Option<Vec<f64>>,
    mask: Option<Vec<bool>>,
    policy: AmbiguityPolicy,
}

impl CompareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Only sites whose mask entry is `true` are compared.
    pub fn with_mask(mut self, mask: Vec<bool>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> AmbiguityPolicy {
        self.policy
    }

    fn check(&self, len: usize) -> Result<()> {
        if let Some(w) = &self.weights {
            if w.len() != len {
                return Err(SplitNetError::InvalidInput(format!(
                    "{} site weights for {len} sites",
                    w.len()
                )));
            }
            if w.iter().any(|&x| !x.is_finite() || x < 0.0) {
                return Err(SplitNetError::InvalidInput(
                    "site weights must be finite and non-negative".into(),
                ));
            }
        }
        if let Some(m) = &self.mask {
            if m.len() != len {
                return Err(SplitNetError::InvalidInput(format!(
                    "site mask of length {} for {len} sites",
                    m.len()
                )));
            }
        }
        Ok(())
    }
}

/// Co-occurrence statistics of one sequence pair.
#[derive(Clone, Debug)]
pub struct PairwiseCompare {
    n_states: usize,
    counts: Vec<Vec<f64>>,
    active_sites: f64,
    non_missing_sites: f64,
    index_a: usize,
    index_b: usize,
}

impl PairwiseCompare {
    /// Compares `seq_a` and `seq_b`. `index_a`/`index_b` are the sequences'
    /// taxon indices, used only in error reports.
    ///
    /// # Errors
    /// - [`SplitNetError::InvalidInput`] for unequal lengths or malformed options.
    /// - [`SplitNetError::InvalidCharacter`] for a symbol outside the alphabet.
    pub fn new(
        alphabet: &Alphabet,
        seq_a: &[u8],
        seq_b: &[u8],
        index_a: usize,
        index_b: usize,
        options: &CompareOptions,
    ) -> Result<Self> {
        if seq_a.len() != seq_b.len() {
            return Err(SplitNetError::InvalidInput(format!(
                "sequences {index_a} and {index_b} have different lengths ({} vs {})",
                seq_a.len(),
                seq_b.len()
            )));
        }
        options.check(seq_a.len())?;

        let k = alphabet.n_states();
        let mut cmp = PairwiseCompare {
            n_states: k,
            counts: vec![vec![0.0; k + 2]; k + 2],
            active_sites: 0.0,
            non_missing_sites: 0.0,
            index_a,
            index_b,
        };

        for (site, (&ca, &cb)) in seq_a.iter().zip(seq_b).enumerate() {
            if options.mask.as_ref().is_some_and(|m| !m[site]) {
                continue;
            }
            let weight = options.weights.as_ref().map_or(1.0, |w| w[site]);
            let sa = classify(alphabet, ca, site, index_a, options.policy)?;
            let sb = classify(alphabet, cb, site, index_b, options.policy)?;
            cmp.add_site(sa, sb, weight);
        }
        Ok(cmp)
    }

    fn add_site(&mut self, a: Symbol<'_>, b: Symbol<'_>, weight: f64) {
        let k = self.n_states;
        self.active_sites += weight;
        if !matches!(a, Symbol::Gap | Symbol::Missing) && !matches!(b, Symbol::Gap | Symbol::Missing) {
            self.non_missing_sites += weight;
        }

        let single = |s: Symbol<'_>| -> Vec<usize> {
            match s {
                Symbol::State(i) => vec![i],
                Symbol::Ambiguous(set) => set.to_vec(),
                Symbol::Gap => vec![k],
                Symbol::Missing => vec![k + 1],
            }
        };
        let (xs, ys) = (single(a), single(b));
        if xs == ys {
            let share = weight / xs.len() as f64;
            for &i in &xs {
                self.counts[i][i] += share;
            }
        } else {
            let share = weight / (xs.len() * ys.len()) as f64;
            for &i in &xs {
                for &j in &ys {
                    self.counts[i][j] += share;
                }
            }
        }
    }

    /// Summed weight of all compared sites.
    pub fn active_site_count(&self) -> f64 {
        self.active_sites
    }

    /// Summed weight of sites where neither sequence has a gap or missing data.
    pub fn non_missing_site_count(&self) -> f64 {
        self.non_missing_sites
    }

    /// State block of `F`, normalised to sum 1.
    ///
    /// `None` when no site is free of gaps and missing data.
    pub fn frequency_matrix(&self) -> Option<Vec<Vec<f64>>> {
        if self.non_missing_sites <= 0.0 {
            return None;
        }
        let k = self.n_states;
        let total: f64 = self.counts[..k].iter().map(|row| row[..k].iter().sum::<f64>()).sum();
        if total <= 0.0 {
            return None;
        }
        Some(
            self.counts[..k]
                .iter()
                .map(|row| row[..k].iter().map(|x| x / total).collect())
                .collect(),
        )
    }

    /// Full `F` including gap and missing rows, divided by the active site count.
    pub fn extended_frequency_matrix(&self) -> Vec<Vec<f64>> {
        let scale = if self.active_sites > 0.0 { 1.0 / self.active_sites } else { 0.0 };
        self.counts
            .iter()
            .map(|row| row.iter().map(|x| x * scale).collect())
            .collect()
    }

    /// Fraction of differing sites among the comparable ones.
    pub fn p_distance(&self) -> Option<f64> {
        let f = self.frequency_matrix()?;
        let same: f64 = (0..self.n_states).map(|i| f[i][i]).sum();
        Some((1.0 - same).max(0.0))
    }

    /// Log-likelihood `Σ F_ij ln(π_i P_ij(t))` of the normalised frequencies.
    pub fn log_likelihood(
        &self,
        freq: &[Vec<f64>],
        model: &dyn SubstitutionModel,
        t: f64,
    ) -> f64 {
        let pi = model.frequencies();
        let p = model.transition_matrix(t);
        let mut ll = 0.0;
        for (i, row) in freq.iter().enumerate() {
            for (j, &f) in row.iter().enumerate() {
                if f > 0.0 {
                    ll += f * (pi[i] * p[i][j]).max(f64::MIN_POSITIVE).ln();
                }
            }
        }
        ll
    }

    /// Maximum-likelihood distance under `model`, scaled by `model.rate()`.
    ///
    /// Golden-section search over `[1e-8, 2]`, then over `[2, 10]` when the
    /// first optimum sits on the upper bound.
    ///
    /// # Errors
    /// - [`SplitNetError::UndefinedDistance`] when no site is comparable.
    /// - [`SplitNetError::SaturatedDistance`] when the optimum reaches 10.
    /// - [`SplitNetError::InvalidInput`] when the model's state count differs
    ///   from the alphabet's.
    pub fn ml_distance(&self, model: &dyn SubstitutionModel) -> Result<f64> {
        if model.n_states() != self.n_states {
            return Err(SplitNetError::InvalidInput(format!(
                "model has {} states, alphabet has {}",
                model.n_states(),
                self.n_states
            )));
        }
        let freq = self.frequency_matrix().ok_or(SplitNetError::UndefinedDistance {
            a: self.index_a,
            b: self.index_b,
        })?;
        let objective = |t: f64| self.log_likelihood(&freq, model, t);

        for (lo, hi) in [(1e-8, 2.0), (2.0, 10.0)] {
            let t = golden_section_max(&objective, lo, hi);
            if hi - t > SATURATION_MARGIN {
                return Ok(t * model.rate());
            }
            log::trace!(
                "ML distance between {} and {} saturates at {hi}",
                self.index_a,
                self.index_b
            );
        }
        Err(SplitNetError::SaturatedDistance {
            a: self.index_a,
            b: self.index_b,
        })
    }
}

fn classify<'a>(
    alphabet: &'a Alphabet,
    symbol: u8,
    site: usize,
    sequence: usize,
    policy: AmbiguityPolicy,
) -> Result<Symbol<'a>> {
    alphabet
        .classify(symbol, policy)
        .ok_or(SplitNetError::InvalidCharacter {
            site: site + 1,
            sequence,
            symbol: symbol as char,
        })
}

/// Maximises a unimodal function on `[lo, hi]`.
fn golden_section_max(f: &dyn Fn(f64) -> f64, mut lo: f64, mut hi: f64) -> f64 {
    let mut x1 = lo + GOLDEN * (hi - lo);
    let mut x2 = hi - GOLDEN * (hi - lo);
    let (mut f1, mut f2) = (f(x1), f(x2));
    while hi - lo > SEARCH_TOLERANCE {
        if f1 < f2 {
            lo = x1;
            x1 = x2;
            f1 = f2;
            x2 = hi - GOLDEN * (hi - lo);
            f2 = f(x2);
        } else {
            hi = x2;
            x2 = x1;
            f2 = f1;
            x1 = lo + GOLDEN * (hi - lo);
            f1 = f(x1);
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReversibleModel;

    fn compare(a: &str, b: &str, options: &CompareOptions) -> Result<PairwiseCompare> {
        PairwiseCompare::new(&Alphabet::dna(), a.as_bytes(), b.as_bytes(), 1, 2, options)
    }

    fn total(m: &[Vec<f64>]) -> f64 {
        m.iter().flatten().sum()
    }

    #[test]
    fn test_frequency_matrix_sums_to_one() {
        let cmp = compare("ACGTACGTRA-?", "ACGAACTTGY-A", &CompareOptions::new()).unwrap();
        assert_eq!(cmp.active_site_count(), 12.0);
        // the two sites with '-' or '?' are excluded
        assert_eq!(cmp.non_missing_site_count(), 10.0);
        let f = cmp.frequency_matrix().unwrap();
        assert!((total(&f) - 1.0).abs() < 1e-9);
        let ext = cmp.extended_frequency_matrix();
        assert!((total(&ext) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_ambiguity_weights() {
        let cmp = compare("R", "R", &CompareOptions::new()).unwrap();
        let f = cmp.extended_frequency_matrix();
        assert_eq!(f[0][0], 0.5);
        assert_eq!(f[2][2], 0.5);
        assert_eq!(f[0][2], 0.0);

        let cmp = compare("R", "Y", &CompareOptions::new()).unwrap();
        let f = cmp.extended_frequency_matrix();
        for (i, j) in [(0, 1), (0, 3), (2, 1), (2, 3)] {
            assert_eq!(f[i][j], 0.25);
        }

        let cmp = compare("A", "R", &CompareOptions::new()).unwrap();
        let f = cmp.extended_frequency_matrix();
        assert_eq!(f[0][0], 0.5);
        assert_eq!(f[0][2], 0.5);
    }

    #[test]
    fn test_ignore_policy_rejects_ambiguity() {
        let options = CompareOptions::new().with_policy(AmbiguityPolicy::Ignore);
        let err = compare("AAR", "AAA", &options).unwrap_err();
        match err {
            SplitNetError::InvalidCharacter { site, sequence, symbol } => {
                assert_eq!((site, sequence, symbol), (3, 1, 'R'));
            }
            other => panic!("unexpected error {other}"),
        }
        assert!(compare("AA-", "AA?", &options).is_ok());
    }

    #[test]
    fn test_invalid_input() {
        assert!(matches!(
            compare("ACG", "AC", &CompareOptions::new()),
            Err(SplitNetError::InvalidInput(_))
        ));
        assert!(matches!(
            compare("ACX", "ACG", &CompareOptions::new()),
            Err(SplitNetError::InvalidCharacter { site: 3, .. })
        ));
        let bad_weights = CompareOptions::new().with_weights(vec![1.0]);
        assert!(compare("AC", "AC", &bad_weights).is_err());
    }

    #[test]
    fn test_weights_and_mask() {
        let options = CompareOptions::new()
            .with_weights(vec![3.0, 1.0, 1.0])
            .with_mask(vec![true, true, false]);
        let cmp = compare("AAC", "ACG", &options).unwrap();
        assert_eq!(cmp.active_site_count(), 4.0);
        assert_eq!(cmp.p_distance(), Some(0.25));
    }

    #[test]
    fn test_no_comparable_sites() {
        let cmp = compare("--?", "AC-", &CompareOptions::new()).unwrap();
        assert_eq!(cmp.non_missing_site_count(), 0.0);
        assert!(cmp.frequency_matrix().is_none());
        assert!(matches!(
            cmp.ml_distance(&ReversibleModel::jc69()),
            Err(SplitNetError::UndefinedDistance { a: 1, b: 2 })
        ));
    }

    #[test]
    fn test_jc69_ml_distance_matches_closed_form() {
        // 20 sites, 4 differences → p = 0.2
        let a = "ACGTACGTACGTACGTACGT";
        let b = "ACGTACGTACGTACGTCATG";
        let cmp = compare(a, b, &CompareOptions::new()).unwrap();
        let p = cmp.p_distance().unwrap();
        assert!((p - 0.2).abs() < 1e-12);
        let expected = -0.75 * (1.0 - 4.0 * p / 3.0).ln();
        let d = cmp.ml_distance(&ReversibleModel::jc69()).unwrap();
        assert!((d - expected).abs() < 1e-5, "{d} vs {expected}");

        let scaled = cmp.ml_distance(&ReversibleModel::jc69().with_rate(2.0)).unwrap();
        assert!((scaled - 2.0 * expected).abs() < 1e-5);
    }

    #[test]
    fn test_identical_sequences_have_tiny_distance() {
        let cmp = compare("ACGTTGCA", "ACGTTGCA", &CompareOptions::new()).unwrap();
        let d = cmp.ml_distance(&ReversibleModel::jc69()).unwrap();
        assert!(d < 1e-6);
    }

    #[test]
    fn test_saturated_distance() {
        let cmp = compare("AAAAAAAA", "CCCCCCCC", &CompareOptions::new()).unwrap();
        assert!(matches!(
            cmp.ml_distance(&ReversibleModel::jc69()),
            Err(SplitNetError::SaturatedDistance { a: 1, b: 2 })
        ));
    }
}
