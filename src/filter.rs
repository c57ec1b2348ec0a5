//! Split filters that select a subset satisfying a compatibility constraint.
//!
//! # Overview
//! - [`greedy_compatible`]: heaviest first, keep a split if it is compatible
//!   with everything kept so far. The result is a tree.
//! - [`greedy_weakly_compatible`]: same, with the three-way weak
//!   compatibility predicate.
//! - [`DimensionFilter`]: bounds the size of incompatible cliques, which is
//!   the dimension of the boxes the splits produce in a split network.
//!
//! All filters return the surviving splits in their input order.

use crate::error::Result;
use crate::progress::ProgressListener;
use crate::split::{Split, are_compatible, are_weakly_compatible};

/// Split indices ordered by decreasing weight, ties in input order.
fn by_decreasing_weight(splits: &[Split]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..splits.len()).collect();
    order.sort_by(|&a, &b| splits[b].weight().total_cmp(&splits[a].weight()));
    order
}

fn in_input_order(splits: &[Split], mut keep: Vec<usize>) -> Vec<Split> {
    keep.sort_unstable();
    keep.into_iter().map(|i| splits[i].clone()).collect()
}

/// Greedily builds a maximal pairwise-compatible subset.
pub fn greedy_compatible(splits: &[Split], progress: &dyn ProgressListener) -> Result<Vec<Split>> {
    progress.set_maximum(splits.len() as u64);
    progress.set_progress(0);
    let mut accepted: Vec<usize> = Vec::new();
    for i in by_decreasing_weight(splits) {
        if accepted.iter().all(|&a| are_compatible(&splits[a], &splits[i])) {
            accepted.push(i);
        }
        progress.increment();
        progress.check_for_cancel()?;
    }
    log::debug!("greedy compatible: kept {} of {} splits", accepted.len(), splits.len());
    Ok(in_input_order(splits, accepted))
}

/// Greedily builds a maximal weakly compatible subset.
///
/// A candidate is accepted when it forms a weakly compatible triple with
/// every pair of already accepted splits.
pub fn greedy_weakly_compatible(
    splits: &[Split],
    progress: &dyn ProgressListener,
) -> Result<Vec<Split>> {
    progress.set_maximum(splits.len() as u64);
    progress.set_progress(0);
    let mut accepted: Vec<usize> = Vec::new();
    for i in by_decreasing_weight(splits) {
        let candidate = &splits[i];
        let ok = accepted.iter().enumerate().all(|(pos, &a)| {
            accepted[pos + 1..]
                .iter()
                .all(|&b| are_weakly_compatible(&splits[a], &splits[b], candidate))
        });
        if ok {
            accepted.push(i);
        }
        progress.increment();
        progress.check_for_cancel()?;
    }
    log::debug!(
        "greedy weakly compatible: kept {} of {} splits",
        accepted.len(),
        splits.len()
    );
    Ok(in_input_order(splits, accepted))
}

/// Removes splits until no `max_dimension + 2` of them are pairwise
/// incompatible, so cliques of up to `max_dimension + 1` splits survive.
///
/// # Algorithm
/// Nodes of the incompatibility graph are splits, edges join incompatible
/// pairs, node weights are `round(weight * 10000)`. Repeat until the working
/// graph is empty:
/// 1. drop every node that provably lies in no forbidden clique (it survives);
/// 2. delete the node with the lowest score, own weight minus the weights of
///    its incompatible neighbours (it is filtered out).
///
/// Step 1 is an exact clique search for `max_dimension <= 5`. Above that it
/// is a degree relaxation: a node of degree below `max_dimension + 1` cannot
/// be in a forbidden clique, nor can one of degree exactly `max_dimension + 1`
/// whose neighbourhood is not itself a clique (that check only up to degree 10).
#[derive(Clone, Copy, Debug)]
pub struct DimensionFilter {
    pub max_dimension: usize,
}

impl Default for DimensionFilter {
    fn default() -> Self {
        DimensionFilter { max_dimension: 4 }
    }
}

const EXACT_SEARCH_LIMIT: usize = 5;
const NEIGHBOURHOOD_CHECK_LIMIT: usize = 10;

/// Incompatibility graph restricted to a shrinking working set.
struct IncompatibilityGraph {
    adjacent: Vec<Vec<bool>>,
    weight: Vec<i64>,
    alive: Vec<bool>,
}

impl IncompatibilityGraph {
    fn new(splits: &[Split]) -> Self {
        let m = splits.len();
        let mut adjacent = vec![vec![false; m]; m];
        for i in 0..m {
            for j in i + 1..m {
                if !are_compatible(&splits[i], &splits[j]) {
                    adjacent[i][j] = true;
                    adjacent[j][i] = true;
                }
            }
        }
        let weight = splits.iter().map(|s| (s.weight() * 10000.0).round() as i64).collect();
        IncompatibilityGraph {
            adjacent,
            weight,
            alive: vec![true; m],
        }
    }

    fn alive_nodes(&self) -> Vec<usize> {
        (0..self.alive.len()).filter(|&v| self.alive[v]).collect()
    }

    fn is_empty(&self) -> bool {
        !self.alive.iter().any(|&a| a)
    }

    fn neighbours(&self, v: usize) -> Vec<usize> {
        (0..self.alive.len())
            .filter(|&u| self.alive[u] && self.adjacent[v][u])
            .collect()
    }

    fn is_clique(&self, nodes: &[usize]) -> bool {
        nodes
            .iter()
            .enumerate()
            .all(|(k, &a)| nodes[k + 1..].iter().all(|&b| self.adjacent[a][b]))
    }

    /// Extends `clique` by `need` more nodes from `candidates`, depth first.
    fn extend_clique(&self, clique: &mut Vec<usize>, candidates: &[usize], need: usize) -> bool {
        if need == 0 {
            return true;
        }
        for (k, &u) in candidates.iter().enumerate() {
            if candidates.len() - k < need {
                break;
            }
            let next: Vec<usize> = candidates[k + 1..]
                .iter()
                .copied()
                .filter(|&w| self.adjacent[u][w])
                .collect();
            clique.push(u);
            if self.extend_clique(clique, &next, need - 1) {
                return true;
            }
            clique.pop();
        }
        false
    }

    /// Exact pass: keeps nodes found in a clique of `size`, discards the rest.
    fn strip_exact(&mut self, size: usize) -> usize {
        let nodes = self.alive_nodes();
        let mut keep = vec![false; self.alive.len()];
        let mut discard = Vec::new();
        for &v in &nodes {
            if keep[v] {
                continue;
            }
            let mut clique = vec![v];
            let candidates = self.neighbours(v);
            if self.extend_clique(&mut clique, &candidates, size - 1) {
                for u in clique {
                    keep[u] = true;
                }
            } else {
                discard.push(v);
            }
        }
        for &v in &discard {
            self.alive[v] = false;
        }
        discard.len()
    }

    /// Degree relaxation for clique `size`, repeated until stable.
    fn strip_relaxed(&mut self, size: usize) -> usize {
        let threshold = size - 1;
        let mut stripped = 0;
        loop {
            let mut changed = false;
            for v in self.alive_nodes() {
                let nbrs = self.neighbours(v);
                let strip = nbrs.len() < threshold
                    || (nbrs.len() == threshold
                        && threshold <= NEIGHBOURHOOD_CHECK_LIMIT
                        && !self.is_clique(&nbrs));
                if strip {
                    self.alive[v] = false;
                    stripped += 1;
                    changed = true;
                }
            }
            if !changed {
                return stripped;
            }
        }
    }

    /// Lowest-scoring live node, first in input order on ties.
    fn worst_node(&self) -> Option<usize> {
        self.alive_nodes().into_iter().min_by_key(|&v| {
            let penalty: i64 = self.neighbours(v).iter().map(|&u| self.weight[u]).sum();
            self.weight[v] - penalty
        })
    }
}

impl DimensionFilter {
    pub fn new(max_dimension: usize) -> Self {
        DimensionFilter { max_dimension }
    }

    /// Returns the splits that survive, in input order.
    pub fn apply(&self, splits: &[Split], progress: &dyn ProgressListener) -> Result<Vec<Split>> {
        if splits.is_empty() {
            return Ok(Vec::new());
        }
        let forbidden = self.max_dimension + 2;
        let mut graph = IncompatibilityGraph::new(splits);
        let mut deleted = vec![false; splits.len()];
        progress.set_maximum(splits.len() as u64);
        progress.set_progress(0);

        let mut removed = 0u64;
        loop {
            let stripped = if self.max_dimension <= EXACT_SEARCH_LIMIT {
                graph.strip_exact(forbidden)
            } else {
                graph.strip_relaxed(forbidden)
            };
            removed += stripped as u64;
            progress.set_progress(removed);
            if graph.is_empty() {
                break;
            }
            if let Some(worst) = graph.worst_node() {
                log::trace!("dimension filter: deleting split {}", worst + 1);
                graph.alive[worst] = false;
                deleted[worst] = true;
                removed += 1;
                progress.set_progress(removed);
            }
            progress.check_for_cancel()?;
        }

        let keep: Vec<usize> = (0..splits.len()).filter(|&i| !deleted[i]).collect();
        log::debug!(
            "dimension filter (max dimension {}): kept {} of {} splits",
            self.max_dimension,
            keep.len(),
            splits.len()
        );
        Ok(in_input_order(splits, keep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{CancelToken, NoProgress};
    use proptest::prelude::*;

    fn split(ntax: usize, side: &[usize], weight: f64) -> Split {
        Split::from_taxa(ntax, side, weight).unwrap()
    }

    /// `k` pairwise incompatible splits on `2k` taxa: the half-circles
    /// starting at positions `0..k`.
    fn planted_clique(k: usize, weights: impl Fn(usize) -> f64) -> Vec<Split> {
        let n = 2 * k;
        (0..k)
            .map(|s| {
                let side: Vec<usize> = (0..k).map(|t| (s + t) % n + 1).collect();
                split(n, &side, weights(s))
            })
            .collect()
    }

    fn trivial_splits(n: usize) -> Vec<Split> {
        (1..=n).map(|t| split(n, &[t], 0.5)).collect()
    }

    fn largest_incompatible_clique(splits: &[Split]) -> usize {
        fn grow(splits: &[Split], clique: &mut Vec<usize>, from: usize) -> usize {
            let mut best = clique.len();
            for c in from..splits.len() {
                if clique.iter().all(|&a| !are_compatible(&splits[a], &splits[c])) {
                    clique.push(c);
                    best = best.max(grow(splits, clique, c + 1));
                    clique.pop();
                }
            }
            best
        }
        grow(splits, &mut Vec::new(), 0)
    }

    #[test]
    fn test_planted_clique_is_pairwise_incompatible() {
        let clique = planted_clique(5, |_| 1.0);
        assert_eq!(largest_incompatible_clique(&clique), 5);
    }

    #[test]
    fn test_empty_input() {
        assert!(greedy_compatible(&[], &NoProgress).unwrap().is_empty());
        assert!(greedy_weakly_compatible(&[], &NoProgress).unwrap().is_empty());
        assert!(DimensionFilter::new(2).apply(&[], &NoProgress).unwrap().is_empty());
    }

    #[test]
    fn test_greedy_compatible_prefers_heavy_splits() {
        let splits = vec![
            split(5, &[2, 3], 1.0),
            split(5, &[3, 4], 2.0),
            split(5, &[4, 5], 0.5),
            split(5, &[2], 0.1),
        ];
        let kept = greedy_compatible(&splits, &NoProgress).unwrap();
        assert_eq!(kept, vec![splits[1].clone(), splits[3].clone()]);
    }

    #[test]
    fn test_greedy_weakly_compatible_rejects_third_quartet() {
        let splits = vec![
            split(4, &[1, 2], 1.0),
            split(4, &[1, 3], 3.0),
            split(4, &[1, 4], 2.0),
        ];
        let kept = greedy_weakly_compatible(&splits, &NoProgress).unwrap();
        assert_eq!(kept, vec![splits[1].clone(), splits[2].clone()]);
        // circular splits pass unchanged
        let circular = vec![split(6, &[2, 3], 1.0), split(6, &[3, 4], 1.0), split(6, &[4, 5], 1.0)];
        assert_eq!(greedy_weakly_compatible(&circular, &NoProgress).unwrap(), circular);
    }

    #[test]
    fn test_dimension_filter_drops_lightest_of_triangle() {
        let splits = planted_clique(3, |s| (s + 1) as f64);
        let kept = DimensionFilter::new(1).apply(&splits, &NoProgress).unwrap();
        assert_eq!(kept, vec![splits[1].clone(), splits[2].clone()]);
    }

    #[test]
    fn test_dimension_filter_keeps_clique_of_max_dimension_plus_one() {
        let splits = vec![
            split(6, &[1, 2, 3], 1.0),
            split(6, &[2, 3, 4], 2.0),
            split(6, &[3, 4, 5], 3.0),
        ];
        assert_eq!(largest_incompatible_clique(&splits), 3);
        let kept = DimensionFilter::new(2).apply(&splits, &NoProgress).unwrap();
        assert_eq!(kept, splits);
        for k in 2..=5 {
            let clique = planted_clique(k, |s| 1.0 + s as f64);
            let kept = DimensionFilter::new(k - 1).apply(&clique, &NoProgress).unwrap();
            assert_eq!(kept, clique);
        }
    }

    #[test]
    fn test_dimension_filter_exact_bound() {
        let mut splits = planted_clique(5, |s| 1.0 + s as f64 * 0.1);
        splits.extend(trivial_splits(10));
        for max_dimension in 1..=5 {
            let kept = DimensionFilter::new(max_dimension).apply(&splits, &NoProgress).unwrap();
            assert!(largest_incompatible_clique(&kept) <= max_dimension + 1);
            // compatible trivial splits are never touched
            assert!(kept.iter().filter(|s| s.is_trivial()).count() == 10);
            assert_eq!(kept.len(), 10 + (max_dimension + 1).min(5));
        }
    }

    #[test]
    fn test_dimension_filter_relaxed_bound() {
        let mut splits = planted_clique(9, |s| 2.0 + s as f64);
        splits.extend(trivial_splits(18));
        let kept = DimensionFilter::new(6).apply(&splits, &NoProgress).unwrap();
        assert!(largest_incompatible_clique(&kept) <= 7);
        assert_eq!(kept.iter().filter(|s| !s.is_trivial()).count(), 7);
        // the heaviest clique members survive
        let heavy = &planted_clique(9, |s| 2.0 + s as f64)[2..];
        for s in heavy {
            assert!(kept.contains(s));
        }
    }

    #[test]
    fn test_dimension_filter_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let err = DimensionFilter::new(1)
            .apply(&planted_clique(4, |_| 1.0), &token)
            .unwrap_err();
        assert!(err.is_canceled());
    }

    fn random_splits() -> impl Strategy<Value = Vec<Split>> {
        prop::collection::vec((1u8..63, 0u32..20), 0..20).prop_map(|raw| {
            raw.into_iter()
                .filter_map(|(mask, w)| {
                    let side: Vec<usize> = (0..6).filter(|b| mask & (1 << b) != 0).map(|b| b + 1).collect();
                    Split::from_taxa(6, &side, w as f64 * 0.25).ok()
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn greedy_compatible_is_idempotent(splits in random_splits()) {
            let once = greedy_compatible(&splits, &NoProgress).unwrap();
            let twice = greedy_compatible(&once, &NoProgress).unwrap();
            prop_assert_eq!(&once, &twice);
            prop_assert!(largest_incompatible_clique(&once) <= 1);
        }

        #[test]
        fn greedy_weakly_compatible_is_idempotent(splits in random_splits()) {
            let once = greedy_weakly_compatible(&splits, &NoProgress).unwrap();
            let twice = greedy_weakly_compatible(&once, &NoProgress).unwrap();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn dimension_filter_respects_bound(splits in random_splits(), max_dimension in 1usize..4) {
            let kept = DimensionFilter::new(max_dimension).apply(&splits, &NoProgress).unwrap();
            prop_assert!(largest_incompatible_clique(&kept) <= max_dimension + 1);
        }
    }
}
