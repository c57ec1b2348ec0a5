//! Time-reversible substitution models.
//!
//! # Overview
//! A reversible rate matrix `Q` with stationary frequencies `π` becomes
//! symmetric after the similarity transform `B = diag(√π) Q diag(1/√π)`.
//! `B` is decomposed once with Jacobi rotations, after which every transition
//! matrix is cheap:
//!
//! ```text
//! P(t) = exp(Qt) = diag(1/√π) U exp(Λt) Uᵗ diag(√π)
//! ```
//!
//! Rate matrices are normalised to one expected substitution per unit time,
//! so branch lengths read as substitutions per site.

use crate::error::{Result, SplitNetError};

/// Eigen-decomposition of the symmetrised rate matrix.
#[derive(Clone, Debug)]
pub struct EigenDecomposition {
    /// Eigenvalues `Λ`.
    pub values: Vec<f64>,
    /// Orthonormal eigenvectors, `vectors[i][k]` is component `i` of vector `k`.
    pub vectors: Vec<Vec<f64>>,
    sqrt_pi: Vec<f64>,
    inv_sqrt_pi: Vec<f64>,
}

impl EigenDecomposition {
    /// Decomposes a reversible rate matrix with the given stationary frequencies.
    pub fn from_rate_matrix(q: &[Vec<f64>], freqs: &[f64]) -> Self {
        let n = freqs.len();
        let sqrt_pi: Vec<f64> = freqs.iter().map(|f| f.sqrt()).collect();
        let inv_sqrt_pi: Vec<f64> = sqrt_pi.iter().map(|s| 1.0 / s).collect();
        let mut b = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                b[i][j] = sqrt_pi[i] * q[i][j] * inv_sqrt_pi[j];
            }
        }
        // symmetrise away rounding noise before the Jacobi sweeps
        for i in 0..n {
            for j in i + 1..n {
                let m = 0.5 * (b[i][j] + b[j][i]);
                b[i][j] = m;
                b[j][i] = m;
            }
        }
        let (values, vectors) = jacobi_eigen(b);
        EigenDecomposition {
            values,
            vectors,
            sqrt_pi,
            inv_sqrt_pi,
        }
    }

    /// `P(t)`, negative round-off clamped to zero.
    pub fn transition_matrix(&self, t: f64) -> Vec<Vec<f64>> {
        let n = self.values.len();
        let decay: Vec<f64> = self.values.iter().map(|l| (l * t).exp()).collect();
        let mut p = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                let sum: f64 = (0..n)
                    .map(|k| self.vectors[i][k] * decay[k] * self.vectors[j][k])
                    .sum();
                p[i][j] = (self.inv_sqrt_pi[i] * sum * self.sqrt_pi[j]).max(0.0);
            }
        }
        p
    }
}

/// Jacobi eigenvalue iteration for a real symmetric matrix.
///
/// Rotates away the largest off-diagonal element until all fall below 1e-15
/// or 200 sweeps have run.
fn jacobi_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect();

    for _ in 0..200 {
        let mut max_val = 0.0f64;
        let (mut p, mut q) = (0, 1);
        for i in 0..n {
            for j in i + 1..n {
                if a[i][j].abs() > max_val {
                    max_val = a[i][j].abs();
                    p = i;
                    q = j;
                }
            }
        }
        if max_val < 1e-15 {
            break;
        }

        let theta = if (a[p][p] - a[q][q]).abs() < 1e-30 {
            std::f64::consts::FRAC_PI_4
        } else {
            0.5 * (2.0 * a[p][q] / (a[p][p] - a[q][q])).atan()
        };
        let (s, c) = theta.sin_cos();

        for row in a.iter_mut() {
            let (x, y) = (row[p], row[q]);
            row[p] = c * x + s * y;
            row[q] = -s * x + c * y;
        }
        for j in 0..n {
            let (x, y) = (a[p][j], a[q][j]);
            a[p][j] = c * x + s * y;
            a[q][j] = -s * x + c * y;
        }
        a[p][q] = 0.0;
        a[q][p] = 0.0;

        for row in v.iter_mut() {
            let (x, y) = (row[p], row[q]);
            row[p] = c * x + s * y;
            row[q] = -s * x + c * y;
        }
    }

    let values = (0..n).map(|i| a[i][i]).collect();
    (values, v)
}

/// Continuous-time Markov substitution model.
pub trait SubstitutionModel {
    fn n_states(&self) -> usize;

    /// Stationary frequencies `π`.
    fn frequencies(&self) -> &[f64];

    /// Scale applied to estimated branch lengths.
    fn rate(&self) -> f64 {
        1.0
    }

    fn eigen(&self) -> &EigenDecomposition;

    fn transition_matrix(&self, t: f64) -> Vec<Vec<f64>> {
        self.eigen().transition_matrix(t)
    }
}

/// A general time-reversible model defined by exchangeabilities and `π`.
#[derive(Clone, Debug)]
pub struct ReversibleModel {
    name: &'static str,
    freqs: Vec<f64>,
    rate_matrix: Vec<Vec<f64>>,
    rate: f64,
    eigen: EigenDecomposition,
}

impl ReversibleModel {
    /// Builds a model from a symmetric exchangeability matrix.
    ///
    /// # Errors
    /// Frequencies must be positive and the matrix square, symmetric and
    /// non-negative off the diagonal.
    pub fn from_exchangeabilities(
        name: &'static str,
        exchangeabilities: &[Vec<f64>],
        freqs: &[f64],
    ) -> Result<Self> {
        let n = freqs.len();
        if n < 2 {
            return Err(SplitNetError::InvalidInput("a model needs at least two states".into()));
        }
        if freqs.iter().any(|&f| !f.is_finite() || f <= 0.0) {
            return Err(SplitNetError::InvalidInput(
                "base frequencies must be positive".into(),
            ));
        }
        if exchangeabilities.len() != n || exchangeabilities.iter().any(|row| row.len() != n) {
            return Err(SplitNetError::InvalidInput(format!(
                "exchangeability matrix must be {n}x{n}"
            )));
        }
        for i in 0..n {
            for j in 0..n {
                let s = exchangeabilities[i][j];
                if i != j && (s < 0.0 || !s.is_finite() || (s - exchangeabilities[j][i]).abs() > 1e-12) {
                    return Err(SplitNetError::InvalidInput(
                        "exchangeabilities must be symmetric and non-negative".into(),
                    ));
                }
            }
        }
        let total: f64 = freqs.iter().sum();
        let freqs: Vec<f64> = freqs.iter().map(|f| f / total).collect();

        let mut q = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                if i != j {
                    q[i][j] = exchangeabilities[i][j] * freqs[j];
                }
            }
            q[i][i] = -(0..n).filter(|&j| j != i).map(|j| q[i][j]).sum::<f64>();
        }
        let mu: f64 = (0..n).map(|i| -freqs[i] * q[i][i]).sum();
        if mu <= 0.0 {
            return Err(SplitNetError::InvalidInput("rate matrix has no substitutions".into()));
        }
        for row in q.iter_mut() {
            for x in row.iter_mut() {
                *x /= mu;
            }
        }

        let eigen = EigenDecomposition::from_rate_matrix(&q, &freqs);
        Ok(ReversibleModel {
            name,
            freqs,
            rate_matrix: q,
            rate: 1.0,
            eigen,
        })
    }

    /// GTR on `ACGT`, rates in the order AC, AG, AT, CG, CT, GT.
    pub fn gtr(rates: [f64; 6], freqs: [f64; 4]) -> Result<Self> {
        let [ac, ag, at, cg, ct, gt] = rates;
        let s = vec![
            vec![0.0, ac, ag, at],
            vec![ac, 0.0, cg, ct],
            vec![ag, cg, 0.0, gt],
            vec![at, ct, gt, 0.0],
        ];
        Self::from_exchangeabilities("GTR", &s, &freqs)
    }

    pub fn jc69() -> Self {
        Self::named("JC69", [1.0; 6], [0.25; 4])
    }

    pub fn k2p(kappa: f64) -> Result<Self> {
        Self::checked_kappa(kappa)?;
        Ok(Self::named("K2P", [1.0, kappa, 1.0, 1.0, kappa, 1.0], [0.25; 4]))
    }

    pub fn f81(freqs: [f64; 4]) -> Result<Self> {
        Ok(Self::gtr([1.0; 6], freqs)?.renamed("F81"))
    }

    pub fn hky85(kappa: f64, freqs: [f64; 4]) -> Result<Self> {
        Self::checked_kappa(kappa)?;
        Ok(Self::gtr([1.0, kappa, 1.0, 1.0, kappa, 1.0], freqs)?.renamed("HKY85"))
    }

    /// Multiplies estimated distances by `rate`.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Normalised rate matrix `Q`.
    pub fn rate_matrix(&self) -> &[Vec<f64>] {
        &self.rate_matrix
    }

    fn checked_kappa(kappa: f64) -> Result<()> {
        if kappa.is_finite() && kappa > 0.0 {
            Ok(())
        } else {
            Err(SplitNetError::InvalidInput(format!(
                "transition/transversion ratio must be positive, got {kappa}"
            )))
        }
    }

    // Only for parameter sets that are valid by construction.
    fn named(name: &'static str, rates: [f64; 6], freqs: [f64; 4]) -> Self {
        match Self::gtr(rates, freqs) {
            Ok(model) => model.renamed(name),
            Err(e) => unreachable!("built-in model {name} rejected: {e}"),
        }
    }

    fn renamed(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl SubstitutionModel for ReversibleModel {
    fn n_states(&self) -> usize {
        self.freqs.len()
    }

    fn frequencies(&self) -> &[f64] {
        &self.freqs
    }

    fn rate(&self) -> f64 {
        self.rate
    }

    fn eigen(&self) -> &EigenDecomposition {
        &self.eigen
    }
}
