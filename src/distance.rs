//! Pairwise distance matrices from aligned sequences.
//!
//! Every pair is independent, so the matrix is filled with a rayon parallel
//! map over the upper triangle. Pairs whose distance cannot be estimated
//! (saturated or without comparable sites) get twice the largest defined
//! distance, and a warning is logged.

use crate::alphabet::Alphabet;
use crate::compare::{CompareOptions, PairwiseCompare};
use crate::error::{Result, SplitNetError};
use crate::model::ReversibleModel;
use crate::progress::ProgressListener;
use rayon::prelude::*;

/// How a pair of sequences is turned into a distance.
#[derive(Clone, Debug)]
pub enum DistanceMethod {
    /// Proportion of differing comparable sites.
    Uncorrected,
    /// Maximum-likelihood branch length under a substitution model.
    MaximumLikelihood(ReversibleModel),
}

/// Symmetric distance matrix over taxa `1..=n`.
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceMatrix {
    n: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(n: usize) -> Self {
        DistanceMatrix {
            n,
            values: vec![0.0; n * n],
        }
    }

    /// Builds a matrix from 0-based rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n = rows.len();
        let mut m = DistanceMatrix::new(n);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n {
                return Err(SplitNetError::InvalidInput(format!(
                    "distance row {} has {} entries, expected {n}",
                    i + 1,
                    row.len()
                )));
            }
            for (j, &d) in row.iter().enumerate() {
                if (d - rows[j][i]).abs() > 1e-12 {
                    return Err(SplitNetError::InvalidInput(format!(
                        "distance matrix not symmetric at ({}, {})",
                        i + 1,
                        j + 1
                    )));
                }
                m.values[i * n + j] = d;
            }
        }
        Ok(m)
    }

    pub fn ntax(&self) -> usize {
        self.n
    }

    /// Distance between taxa `a` and `b` (1-based).
    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.values[(a - 1) * self.n + (b - 1)]
    }

    /// Sets both `(a, b)` and `(b, a)` (1-based).
    pub fn set(&mut self, a: usize, b: usize, d: f64) {
        self.values[(a - 1) * self.n + (b - 1)] = d;
        self.values[(b - 1) * self.n + (a - 1)] = d;
    }

    /// 0-based rows, e.g. for writing.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.values.chunks(self.n.max(1)).take(self.n).map(<[f64]>::to_vec).collect()
    }

    /// Upper triangle in lexicographic pair order along `cycle`
    /// (1-based, index 0 unused), the layout expected by [`crate::circular`].
    pub fn to_pair_vector(&self, cycle: &[usize]) -> Vec<f64> {
        let n = self.n;
        let mut out = Vec::with_capacity(crate::circular::npairs(n));
        for i in 1..=n {
            for j in i + 1..=n {
                out.push(self.get(cycle[i], cycle[j]));
            }
        }
        out
    }
}

/// Computes all pairwise distances between `rows`.
///
/// # Errors
/// Invalid characters and malformed options propagate. Undefined and
/// saturated pairs do not fail; they are filled in as described above.
pub fn distance_matrix(
    alphabet: &Alphabet,
    rows: &[Vec<u8>],
    method: &DistanceMethod,
    options: &CompareOptions,
    progress: &(dyn ProgressListener + Sync),
) -> Result<DistanceMatrix> {
    let n = rows.len();
    if let Some(first) = rows.first() {
        if let Some(bad) = rows.iter().position(|r| r.len() != first.len()) {
            return Err(SplitNetError::InvalidInput(format!(
                "sequence {} has length {}, expected {}",
                bad + 1,
                rows[bad].len(),
                first.len()
            )));
        }
    }
    progress.set_maximum((n * n.saturating_sub(1) / 2) as u64);
    progress.set_progress(0);

    let pairs: Vec<(usize, usize, Option<f64>)> = (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| {
            progress.check_for_cancel()?;
            let cmp = PairwiseCompare::new(alphabet, &rows[i], &rows[j], i + 1, j + 1, options)?;
            let d = match method {
                DistanceMethod::Uncorrected => cmp.p_distance(),
                DistanceMethod::MaximumLikelihood(model) => match cmp.ml_distance(model) {
                    Ok(d) => Some(d),
                    Err(SplitNetError::SaturatedDistance { .. } | SplitNetError::UndefinedDistance { .. }) => {
                        None
                    }
                    Err(e) => return Err(e),
                },
            };
            progress.increment();
            Ok((i, j, d))
        })
        .collect::<Result<Vec<_>>>()?;

    let max_defined = pairs
        .iter()
        .filter_map(|&(_, _, d)| d)
        .fold(0.0f64, f64::max);
    let fallback = if max_defined > 0.0 { 2.0 * max_defined } else { 1.0 };
    let undefined = pairs.iter().filter(|(_, _, d)| d.is_none()).count();
    if undefined > 0 {
        log::warn!("{undefined} undefined distance(s) set to {fallback:.6} (twice the maximum defined distance)");
    }

    let mut matrix = DistanceMatrix::new(n);
    for (i, j, d) in pairs {
        matrix.set(i + 1, j + 1, d.unwrap_or(fallback));
    }
    Ok(matrix)
}

/// Shorthand for maximum-likelihood distances under `model`.
pub fn ml_distance_matrix(
    alphabet: &Alphabet,
    rows: &[Vec<u8>],
    model: &ReversibleModel,
    options: &CompareOptions,
    progress: &(dyn ProgressListener + Sync),
) -> Result<DistanceMatrix> {
    log::debug!("ML distances under {} for {} sequences", model.name(), rows.len());
    distance_matrix(
        alphabet,
        rows,
        &DistanceMethod::MaximumLikelihood(model.clone()),
        options,
        progress,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, NoProgress};

    fn rows(seqs: &[&str]) -> Vec<Vec<u8>> {
        seqs.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn test_uncorrected_matrix() {
        let data = rows(&["AAAA", "AAAC", "AACC"]);
        let m = distance_matrix(
            &Alphabet::dna(),
            &data,
            &DistanceMethod::Uncorrected,
            &CompareOptions::new(),
            &NoProgress,
        )
        .unwrap();
        assert_eq!(m.get(1, 2), 0.25);
        assert_eq!(m.get(2, 1), 0.25);
        assert_eq!(m.get(1, 3), 0.5);
        assert_eq!(m.get(3, 3), 0.0);
        assert_eq!(m.to_pair_vector(&[0, 1, 2, 3]), vec![0.25, 0.5, 0.25]);
    }

    #[test]
    fn test_saturated_pairs_get_twice_the_max() {
        let data = rows(&["ACGTACGTAC", "ACGTACGTAA", "CATGCATGCA"]);
        let model = ReversibleModel::jc69();
        let m = ml_distance_matrix(&Alphabet::dna(), &data, &model, &CompareOptions::new(), &NoProgress)
            .unwrap();
        let d12 = m.get(1, 2);
        assert!(d12 > 0.0);
        // sequence 3 differs from the others at more than three quarters of the sites
        assert!((m.get(1, 3) - 2.0 * d12).abs() < 1e-12);
        assert!((m.get(2, 3) - 2.0 * d12).abs() < 1e-12);
    }

    #[test]
    fn test_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let err = distance_matrix(
            &Alphabet::dna(),
            &rows(&["AC", "AG"]),
            &DistanceMethod::Uncorrected,
            &CompareOptions::new(),
            &token,
        )
        .unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn test_progress_counts_pairs() {
        let token = CancelToken::new();
        distance_matrix(
            &Alphabet::dna(),
            &rows(&["AC", "AG", "AT", "CC"]),
            &DistanceMethod::Uncorrected,
            &CompareOptions::new(),
            &token,
        )
        .unwrap();
        assert_eq!(token.maximum(), 6);
        assert_eq!(token.progress(), 6);
    }

    #[test]
    fn test_from_rows_rejects_asymmetry() {
        assert!(DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![2.0, 0.0]]).is_err());
        let m = DistanceMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        assert_eq!(m.to_rows(), vec![vec![0.0, 1.0], vec![1.0, 0.0]]);
    }
}
