//! Matrix-free linear algebra for full circular split systems.
//!
//! # Layout
//! Taxa are numbered `0..n` in circular order. Vectors of length `n(n-1)/2`
//! are indexed by pairs `(i, j)`, `i < j`, in lexicographic order:
//! `(0,1), (0,2), .., (0,n-1), (1,2), ..`.
//!
//! The same pair index doubles as a split index: pair `(k, l)` names the split
//! whose side is the interval `{k, .., l-1}` of the ordering. Every interval
//! not containing taxon `n-1` appears exactly once, which covers all
//! `n(n-1)/2` circular splits.
//!
//! The design matrix `A` has `A[(i,j),(k,l)] = 1` iff split `(k,l)` separates
//! `i` and `j`. Applying it naively costs O(n⁴); the recurrences below cost
//! O(n²) and never materialise `A`.
//!
//! # Recurrence
//! For `j >= i + 2`, inclusion–exclusion over the four intervals
//! `{i+1..j-1}` sits inside gives
//! ```text
//! (Ax)(i,j) = (Ax)(i,j-1) + (Ax)(i+1,j) - (Ax)(i+1,j-1) - 2 x(i+1,j)
//! ```
//! with `(Ax)(i,i) = 0`. Solving that identity for `x` yields the closed form
//! used by [`solve`].

/// Number of taxon pairs for `n` taxa.
#[inline]
pub fn npairs(n: usize) -> usize {
    n * n.saturating_sub(1) / 2
}

/// Position of pair `(i, j)`, `i < j < n`, in the lexicographic pair order.
#[inline]
pub fn pair_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    i * (2 * n - i - 1) / 2 + (j - i - 1)
}

/// Entry `(i, j)` of a pair vector, symmetric, zero on the diagonal.
#[inline]
fn entry(n: usize, v: &[f64], i: usize, j: usize) -> f64 {
    match i.cmp(&j) {
        std::cmp::Ordering::Less => v[pair_index(n, i, j)],
        std::cmp::Ordering::Greater => v[pair_index(n, j, i)],
        std::cmp::Ordering::Equal => 0.0,
    }
}

/// Computes `y = A x`.
pub fn forward_map(n: usize, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; npairs(n)];
    forward_map_into(n, x, &mut y);
    y
}

/// Computes `y = A x` into a caller-owned buffer.
pub fn forward_map_into(n: usize, x: &[f64], y: &mut [f64]) {
    debug_assert!(n >= 2);
    debug_assert_eq!(x.len(), npairs(n));
    debug_assert_eq!(y.len(), npairs(n));

    // Adjacent pairs: splits ending at i plus splits starting at i+1.
    for i in 0..n - 1 {
        let mut sum = 0.0;
        for k in 0..=i {
            sum += x[pair_index(n, k, i + 1)];
        }
        for l in i + 2..n {
            sum += x[pair_index(n, i + 1, l)];
        }
        y[pair_index(n, i, i + 1)] = sum;
    }

    // Pairs two apart: the middle term of the recurrence vanishes.
    for i in 0..n.saturating_sub(2) {
        y[pair_index(n, i, i + 2)] = y[pair_index(n, i, i + 1)] + y[pair_index(n, i + 1, i + 2)]
            - 2.0 * x[pair_index(n, i + 1, i + 2)];
    }

    for gap in 3..n {
        for i in 0..n - gap {
            let j = i + gap;
            y[pair_index(n, i, j)] = y[pair_index(n, i, j - 1)] + y[pair_index(n, i + 1, j)]
                - y[pair_index(n, i + 1, j - 1)]
                - 2.0 * x[pair_index(n, i + 1, j)];
        }
    }
}

/// Computes `p = Aᵗ x`.
pub fn transpose_map(n: usize, x: &[f64]) -> Vec<f64> {
    let mut p = vec![0.0; npairs(n)];
    transpose_map_into(n, x, &mut p);
    p
}

/// Computes `p = Aᵗ x` into a caller-owned buffer.
///
/// `p(k,l)` sums `x` over all pairs with exactly one member in `{k..l-1}`.
/// Singletons are row sums; longer intervals follow the dual recurrence
/// `p(k,l) = p(k,l-1) + p(k+1,l) - p(k+1,l-1) - 2 x(k,l-1)`.
pub fn transpose_map_into(n: usize, x: &[f64], p: &mut [f64]) {
    debug_assert!(n >= 2);
    debug_assert_eq!(x.len(), npairs(n));
    debug_assert_eq!(p.len(), npairs(n));

    for k in 0..n - 1 {
        let mut sum = 0.0;
        for j in 0..n {
            if j != k {
                sum += entry(n, x, k, j);
            }
        }
        p[pair_index(n, k, k + 1)] = sum;
    }

    for k in 0..n.saturating_sub(2) {
        p[pair_index(n, k, k + 2)] = p[pair_index(n, k, k + 1)] + p[pair_index(n, k + 1, k + 2)]
            - 2.0 * x[pair_index(n, k, k + 1)];
    }

    for len in 3..n {
        for k in 0..n - len {
            let l = k + len;
            p[pair_index(n, k, l)] = p[pair_index(n, k, l - 1)] + p[pair_index(n, k + 1, l)]
                - p[pair_index(n, k + 1, l - 1)]
                - 2.0 * x[pair_index(n, k, l - 1)];
        }
    }
}

/// Computes `x = A⁻¹ y` in closed form.
///
/// ```text
/// x(k,l) = ½ (y(k-1,l-1) + y(k,l) - y(k,l-1) - y(k-1,l))
/// ```
/// with indices taken modulo `n` and `y(i,i) = 0`.
pub fn solve(n: usize, y: &[f64]) -> Vec<f64> {
    let mut x = vec![0.0; npairs(n)];
    solve_into(n, y, &mut x);
    x
}

/// Computes `x = A⁻¹ y` into a caller-owned buffer.
pub fn solve_into(n: usize, y: &[f64], x: &mut [f64]) {
    debug_assert!(n >= 2);
    debug_assert_eq!(y.len(), npairs(n));
    debug_assert_eq!(x.len(), npairs(n));

    for k in 0..n - 1 {
        let km = (k + n - 1) % n;
        for l in k + 1..n {
            x[pair_index(n, k, l)] = 0.5
                * (entry(n, y, km, l - 1) + entry(n, y, k, l)
                    - entry(n, y, k, l - 1)
                    - entry(n, y, km, l));
        }
    }
}

/// Computes `y = (A⁻¹)ᵗ x`.
pub fn inverse_transpose_solve(n: usize, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; npairs(n)];
    inverse_transpose_solve_into(n, x, &mut y);
    y
}

/// Computes `y = (A⁻¹)ᵗ x` into a caller-owned buffer.
///
/// Row `(k,l)` of `A⁻¹` has at most four non-zero entries (the ones read by
/// [`solve`]); each input entry is scattered into those four output slots.
pub fn inverse_transpose_solve_into(n: usize, x: &[f64], y: &mut [f64]) {
    debug_assert!(n >= 2);
    debug_assert_eq!(x.len(), npairs(n));
    debug_assert_eq!(y.len(), npairs(n));

    y.iter_mut().for_each(|v| *v = 0.0);
    let mut scatter = |i: usize, j: usize, value: f64| {
        if i != j {
            y[pair_index(n, i.min(j), i.max(j))] += value;
        }
    };
    for k in 0..n - 1 {
        let km = (k + n - 1) % n;
        for l in k + 1..n {
            let half = 0.5 * x[pair_index(n, k, l)];
            scatter(km, l - 1, half);
            scatter(k, l, half);
            scatter(k, l - 1, -half);
            scatter(km, l, -half);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use proptest::prelude::*;

    /// Dense design matrix, rows = taxon pairs, columns = splits.
    fn dense(n: usize) -> Vec<Vec<f64>> {
        let pairs: Vec<(usize, usize)> = (0..n).tuple_combinations().collect();
        pairs
            .iter()
            .map(|&(i, j)| {
                pairs
                    .iter()
                    .map(|&(k, l)| {
                        let in_i = k <= i && i < l;
                        let in_j = k <= j && j < l;
                        if in_i != in_j { 1.0 } else { 0.0 }
                    })
                    .collect()
            })
            .collect()
    }

    fn mat_vec(m: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
        m.iter().map(|row| row.iter().zip(v).map(|(a, b)| a * b).sum()).collect()
    }

    fn transpose(m: &[Vec<f64>]) -> Vec<Vec<f64>> {
        (0..m[0].len()).map(|c| m.iter().map(|row| row[c]).collect()).collect()
    }

    fn dot(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (k, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() <= tol * (1.0 + y.abs()), "entry {k}: {x} vs {y}");
        }
    }

    fn sample(n: usize) -> Vec<f64> {
        (0..npairs(n)).map(|k| ((k * 7 + 3) % 11) as f64 - 4.5).collect()
    }

    #[test]
    fn test_pair_index_is_lexicographic() {
        for n in 2..8 {
            for (pos, (i, j)) in (0..n).tuple_combinations().enumerate() {
                assert_eq!(pair_index(n, i, j), pos);
            }
        }
    }

    #[test]
    fn test_matches_dense_matrix() {
        for n in 2..9 {
            let a = dense(n);
            let x = sample(n);
            assert_close(&forward_map(n, &x), &mat_vec(&a, &x), 1e-12);
            assert_close(&transpose_map(n, &x), &mat_vec(&transpose(&a), &x), 1e-12);
        }
    }

    #[test]
    fn test_inverse_transpose_against_dense() {
        for n in 2..8 {
            // row r of (A⁻¹)ᵗ is column r of A⁻¹, i.e. solve(e_r)
            let m = npairs(n);
            let inv_cols: Vec<Vec<f64>> = (0..m)
                .map(|c| {
                    let mut e = vec![0.0; m];
                    e[c] = 1.0;
                    solve(n, &e)
                })
                .collect();
            let x = sample(n);
            let expected: Vec<f64> = inv_cols.iter().map(|col| dot(col, &x)).collect();
            assert_close(&inverse_transpose_solve(n, &x), &expected, 1e-12);
        }
    }

    #[test]
    fn test_four_taxa_tree_weights() {
        // d(1,2)=1 d(1,3)=2 d(1,4)=2 d(2,3)=2 d(2,4)=2 d(3,4)=1
        let d = vec![1.0, 2.0, 2.0, 2.0, 2.0, 1.0];
        let w = solve(4, &d);
        // split (k,l) = {k..l-1}: (0,1)={0} (0,2)={0,1} (0,3)={0,1,2}
        //                         (1,2)={1} (1,3)={1,2} (2,3)={2}
        assert_close(&w, &[0.5, 1.0, 0.5, 0.5, 0.0, 0.5], 1e-12);
        assert_close(&forward_map(4, &w), &d, 1e-12);
    }

    #[test]
    fn test_two_taxa() {
        assert_eq!(forward_map(2, &[3.0]), vec![3.0]);
        assert_eq!(transpose_map(2, &[3.0]), vec![3.0]);
        assert_eq!(solve(2, &[3.0]), vec![3.0]);
        assert_eq!(inverse_transpose_solve(2, &[3.0]), vec![3.0]);
    }

    fn sized_vectors() -> impl Strategy<Value = (usize, Vec<f64>, Vec<f64>)> {
        (2usize..=50).prop_flat_map(|n| {
            let m = npairs(n);
            (
                Just(n),
                prop::collection::vec(-10.0f64..10.0, m),
                prop::collection::vec(-10.0f64..10.0, m),
            )
        })
    }

    proptest! {
        #[test]
        fn forward_and_transpose_are_adjoint((n, x, y) in sized_vectors()) {
            let lhs = dot(&forward_map(n, &x), &y);
            let rhs = dot(&x, &transpose_map(n, &y));
            let scale = 1.0 + lhs.abs().max(rhs.abs());
            prop_assert!((lhs - rhs).abs() <= 1e-9 * scale, "{} vs {}", lhs, rhs);
        }

        #[test]
        fn solve_inverts_forward_map((n, x, _y) in sized_vectors()) {
            let back = solve(n, &forward_map(n, &x));
            for (a, b) in back.iter().zip(&x) {
                prop_assert!((a - b).abs() <= 1e-7, "{} vs {}", a, b);
            }
        }

        #[test]
        fn inverse_transpose_inverts_transpose((n, x, _y) in sized_vectors()) {
            let back = inverse_transpose_solve(n, &transpose_map(n, &x));
            for (a, b) in back.iter().zip(&x) {
                prop_assert!((a - b).abs() <= 1e-7, "{} vs {}", a, b);
            }
        }
    }
}
