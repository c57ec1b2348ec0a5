//! Median-joining networks.
//!
//! # Overview
//! Median joining grows a set of haplotypes, the observed sequences plus
//! inferred "median" sequences, until it is closed under the
//! operations below, then returns the minimum spanning network on that set.
//!
//! 1. **Build MSN**: the union of all minimum spanning trees, computed by
//!    processing distance classes in increasing order. A pair is a *feasible
//!    link* if its endpoints were not already joined by strictly shorter
//!    links (shorter by more than `epsilon`).
//! 2. **Prune**: drop inferred sequences with at most two feasible links.
//! 3. **Grow**: for every two feasible links sharing a node, compute the
//!    quasi-medians of the three sequences and add those whose connection
//!    cost is within `epsilon` of the cheapest.
//!
//! The loop stops when neither pruning nor growing changes the set. A final
//! pass with `epsilon = 0` produces the returned network.

use crate::error::{Result, SplitNetError};
use crate::graph::Graph;
use crate::progress::ProgressListener;
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

/// Alphabets with this many symbols or more make quasi-median enumeration
/// explode.
const MAX_SYMBOLS: usize = 8;

/// A node of the network: a sequence and the input taxa carrying it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Haplotype {
    pub sequence: Vec<u8>,
    /// 1-based input indices; empty for inferred medians.
    pub taxa: Vec<usize>,
}

impl Haplotype {
    pub fn is_median(&self) -> bool {
        self.taxa.is_empty()
    }
}

/// Nodes are haplotypes, edges carry the weighted Hamming distance.
pub type MedianJoiningNetwork = Graph<Haplotype, f64>;

/// Whether the data has few enough distinct symbols for median joining.
pub fn is_applicable(rows: &[Vec<u8>]) -> bool {
    let symbols: BTreeSet<u8> = rows.iter().flatten().copied().collect();
    symbols.len() < MAX_SYMBOLS
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MedianJoining {
    /// Tolerance for feasible links and median acceptance (in distance units).
    pub epsilon: f64,
}

/// Union-find over `0..n`.
struct Components {
    parent: Vec<usize>,
    count: usize,
}

impl Components {
    fn new(n: usize) -> Self {
        Components {
            parent: (0..n).collect(),
            count: n,
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[rb] = ra;
            self.count -= 1;
        }
    }
}

/// Working set of one run.
struct State<'a> {
    weights: Option<&'a [f64]>,
    inputs: BTreeSet<Vec<u8>>,
    sequences: BTreeSet<Vec<u8>>,
    /// Medians ever added; a pruned median is not added again.
    tried: BTreeSet<Vec<u8>>,
}

/// Feasible links over the current sequence list (indices into it).
struct Msn {
    nodes: Vec<Vec<u8>>,
    links: Vec<(usize, usize, f64)>,
}

impl Msn {
    fn degrees(&self) -> Vec<usize> {
        let mut deg = vec![0; self.nodes.len()];
        for &(i, j, _) in &self.links {
            deg[i] += 1;
            deg[j] += 1;
        }
        deg
    }

    fn neighbours(&self) -> Vec<Vec<usize>> {
        let mut nbrs = vec![Vec::new(); self.nodes.len()];
        for &(i, j, _) in &self.links {
            nbrs[i].push(j);
            nbrs[j].push(i);
        }
        nbrs
    }
}

impl State<'_> {
    fn distance(&self, a: &[u8], b: &[u8]) -> f64 {
        match self.weights {
            Some(w) => a
                .iter()
                .zip(b)
                .zip(w)
                .filter(|((x, y), _)| x != y)
                .map(|(_, &wk)| wk)
                .sum(),
            None => a.iter().zip(b).filter(|(x, y)| x != y).count() as f64,
        }
    }

    /// Minimum spanning network with feasible links up to `epsilon`.
    fn build_msn(&self, epsilon: f64) -> Msn {
        let nodes: Vec<Vec<u8>> = self.sequences.iter().cloned().collect();
        let n = nodes.len();
        let mut pairs: Vec<(f64, usize, usize)> = (0..n)
            .tuple_combinations()
            .map(|(i, j)| (self.distance(&nodes[i], &nodes[j]), i, j))
            .collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

        let mut msn = Components::new(n);
        let mut threshold = Components::new(n);
        let mut links = Vec::new();
        let mut max_value = f64::INFINITY;
        let mut below = 0;
        let mut start = 0;
        while start < pairs.len() {
            let value = pairs[start].0;
            if value > max_value {
                break;
            }
            let mut end = start;
            while end < pairs.len() && pairs[end].0 == value {
                end += 1;
            }
            // join everything strictly shorter than value - epsilon
            while below < pairs.len() && pairs[below].0 < value - epsilon {
                let (_, i, j) = pairs[below];
                threshold.union(i, j);
                below += 1;
            }
            let mut feasible = Vec::new();
            for &(d, i, j) in &pairs[start..end] {
                if threshold.find(i) != threshold.find(j) {
                    links.push((i, j, d));
                    feasible.push((i, j));
                }
            }
            for (i, j) in feasible {
                msn.union(i, j);
            }
            if msn.count == 1 && max_value.is_infinite() {
                max_value = value + epsilon;
            }
            start = end;
        }
        Msn { nodes, links }
    }

    /// Removes inferred sequences with feasible degree at most two.
    fn prune(&mut self, msn: &Msn) -> bool {
        let degrees = msn.degrees();
        let mut changed = false;
        for (seq, &deg) in msn.nodes.iter().zip(&degrees) {
            if deg <= 2 && !self.inputs.contains(seq) {
                self.sequences.remove(seq);
                changed = true;
            }
        }
        changed
    }

    /// Adds the cheapest new quasi-medians of linked triples.
    fn grow(&mut self, msn: &Msn, epsilon: f64, progress: &dyn ProgressListener) -> Result<bool> {
        let neighbours = msn.neighbours();
        let mut candidates: BTreeMap<Vec<u8>, f64> = BTreeMap::new();
        for (v, nbrs) in neighbours.iter().enumerate() {
            for (a, &u) in nbrs.iter().enumerate() {
                for &w in &nbrs[a + 1..] {
                    let (x, y, z) = (&msn.nodes[u], &msn.nodes[v], &msn.nodes[w]);
                    for median in quasi_medians(x, y, z) {
                        if self.sequences.contains(&median) || self.tried.contains(&median) {
                            continue;
                        }
                        let cost = self.distance(x, &median)
                            + self.distance(y, &median)
                            + self.distance(z, &median);
                        candidates
                            .entry(median)
                            .and_modify(|c| *c = c.min(cost))
                            .or_insert(cost);
                    }
                }
            }
            progress.check_for_cancel()?;
        }
        let Some(min_cost) = candidates.values().copied().reduce(f64::min) else {
            return Ok(false);
        };
        let mut added = 0;
        for (median, cost) in candidates {
            if cost <= min_cost + epsilon {
                self.tried.insert(median.clone());
                self.sequences.insert(median);
                added += 1;
            }
        }
        log::trace!("median joining: added {added} median(s) at cost {min_cost}");
        Ok(added > 0)
    }
}

/// All quasi-medians of three equal-length sequences.
///
/// Where two or three sequences agree the median takes the majority symbol;
/// where all three differ each of the three symbols is tried.
pub fn quasi_medians(x: &[u8], y: &[u8], z: &[u8]) -> Vec<Vec<u8>> {
    let mut base = Vec::with_capacity(x.len());
    let mut free = Vec::new();
    for k in 0..x.len() {
        let (a, b, c) = (x[k], y[k], z[k]);
        if a == b || a == c {
            base.push(a);
        } else if b == c {
            base.push(b);
        } else {
            base.push(a);
            free.push(k);
        }
    }
    if free.is_empty() {
        return vec![base];
    }
    let mut result = Vec::new();
    let mut choice = vec![0usize; free.len()];
    loop {
        let mut median = base.clone();
        for (&k, &c) in free.iter().zip(&choice) {
            median[k] = [x[k], y[k], z[k]][c];
        }
        result.push(median);
        // odometer over {x, y, z} at each free position
        let mut pos = 0;
        loop {
            if pos == choice.len() {
                return result;
            }
            choice[pos] += 1;
            if choice[pos] < 3 {
                break;
            }
            choice[pos] = 0;
            pos += 1;
        }
    }
}

impl MedianJoining {
    pub fn new(epsilon: f64) -> Self {
        MedianJoining { epsilon }
    }

    /// Computes the median-joining network of `rows`.
    ///
    /// `weights` gives one non-negative weight per column (all 1 if `None`).
    /// Each prune/grow round is reported to `progress` as one increment.
    ///
    /// # Errors
    /// [`SplitNetError::InvalidInput`] for empty input, ragged rows, bad
    /// weights or a negative epsilon; [`SplitNetError::Canceled`] via
    /// `progress`.
    pub fn apply(
        &self,
        rows: &[Vec<u8>],
        weights: Option<&[f64]>,
        progress: &dyn ProgressListener,
    ) -> Result<MedianJoiningNetwork> {
        validate(rows, weights, self.epsilon)?;
        let inputs: BTreeSet<Vec<u8>> = rows.iter().cloned().collect();
        let mut state = State {
            weights,
            sequences: inputs.clone(),
            inputs,
            tried: BTreeSet::new(),
        };
        log::debug!(
            "median joining: {} sequences, {} distinct, epsilon {}",
            rows.len(),
            state.inputs.len(),
            self.epsilon
        );

        // the number of rounds is not known up front: no maximum, one increment per round
        let mut iteration = 0u64;
        loop {
            progress.check_for_cancel()?;
            iteration += 1;
            progress.increment();
            let msn = state.build_msn(self.epsilon);
            if state.prune(&msn) {
                continue;
            }
            if !state.grow(&msn, self.epsilon, progress)? {
                break;
            }
        }

        let msn = loop {
            progress.check_for_cancel()?;
            let msn = state.build_msn(0.0);
            if !state.prune(&msn) {
                break msn;
            }
        };
        log::debug!(
            "median joining: converged after {iteration} iteration(s) with {} node(s), {} link(s)",
            msn.nodes.len(),
            msn.links.len()
        );
        Ok(into_network(msn, rows))
    }
}

fn validate(rows: &[Vec<u8>], weights: Option<&[f64]>, epsilon: f64) -> Result<()> {
    let first = rows
        .first()
        .ok_or_else(|| SplitNetError::InvalidInput("median joining needs at least one sequence".into()))?;
    if let Some(bad) = rows.iter().position(|r| r.len() != first.len()) {
        return Err(SplitNetError::InvalidInput(format!(
            "sequence {} has length {}, expected {}",
            bad + 1,
            rows[bad].len(),
            first.len()
        )));
    }
    if let Some(w) = weights {
        if w.len() != first.len() {
            return Err(SplitNetError::InvalidInput(format!(
                "{} character weights for {} characters",
                w.len(),
                first.len()
            )));
        }
        if w.iter().any(|&x| !x.is_finite() || x < 0.0) {
            return Err(SplitNetError::InvalidInput(
                "character weights must be finite and non-negative".into(),
            ));
        }
    }
    if !epsilon.is_finite() || epsilon < 0.0 {
        return Err(SplitNetError::InvalidInput(format!(
            "epsilon must be non-negative, got {epsilon}"
        )));
    }
    Ok(())
}

fn into_network(msn: Msn, rows: &[Vec<u8>]) -> MedianJoiningNetwork {
    let mut graph = MedianJoiningNetwork::new();
    let ids: Vec<_> = msn
        .nodes
        .into_iter()
        .map(|sequence| {
            let taxa = rows
                .iter()
                .enumerate()
                .filter(|(_, r)| **r == sequence)
                .map(|(i, _)| i + 1)
                .collect();
            graph.add_node(Haplotype { sequence, taxa })
        })
        .collect();
    for (i, j, d) in msn.links {
        graph.add_edge(ids[i], ids[j], d);
    }
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeId;
    use crate::progress::{CancelToken, NoProgress};

    fn rows(seqs: &[&str]) -> Vec<Vec<u8>> {
        seqs.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn sequences(net: &MedianJoiningNetwork) -> Vec<String> {
        net.node_ids()
            .map(|v| String::from_utf8_lossy(&net.node(v).sequence).into_owned())
            .collect()
    }

    fn find(net: &MedianJoiningNetwork, seq: &str) -> Option<NodeId> {
        net.node_ids().find(|&v| net.node(v).sequence == seq.as_bytes())
    }

    #[test]
    fn test_quasi_medians() {
        assert_eq!(quasi_medians(b"AAC", b"ACA", b"CAA"), vec![b"AAA".to_vec()]);
        let all = quasi_medians(b"AC", b"CG", b"GT");
        assert_eq!(all.len(), 9);
        assert!(all.contains(&b"GC".to_vec()));
    }

    #[test]
    fn test_triangle_gains_central_median() {
        let data = rows(&["AAC", "ACA", "CAA"]);
        let net = MedianJoining::default().apply(&data, None, &NoProgress).unwrap();
        assert_eq!(net.node_count(), 4);
        assert_eq!(net.edge_count(), 3);
        let center = find(&net, "AAA").unwrap();
        assert!(net.node(center).is_median());
        assert_eq!(net.degree(center), 3);
        for &e in net.adjacent(center) {
            assert_eq!(*net.edge(e), 1.0);
        }
    }

    #[test]
    fn test_square_keeps_all_shortest_links() {
        let data = rows(&["AA", "AC", "CA", "CC"]);
        let net = MedianJoining::default().apply(&data, None, &NoProgress).unwrap();
        assert_eq!(net.node_count(), 4);
        assert_eq!(net.edge_count(), 4);
        assert!(net.node_ids().all(|v| net.degree(v) == 2));
    }

    #[test]
    fn test_binary_alignment_gains_one_median() {
        let data = rows(&["11000", "10100", "10010", "00001"]);
        let net = MedianJoining::default().apply(&data, None, &NoProgress).unwrap();
        assert_eq!(net.node_count(), 5);
        assert_eq!(net.edge_count(), 4);
        let center = find(&net, "10000").unwrap();
        assert!(net.node(center).is_median());
        assert_eq!(net.degree(center), 4);
        let mut lengths: Vec<f64> = net.edge_ids().map(|e| *net.edge(e)).collect();
        lengths.sort_by(f64::total_cmp);
        assert_eq!(lengths, vec![1.0, 1.0, 1.0, 2.0]);
    }

    #[test]
    fn test_epsilon_admits_more_medians() {
        let data = rows(&["0011", "0111", "1000", "1110"]);

        let strict = MedianJoining::new(0.0).apply(&data, None, &NoProgress).unwrap();
        assert_eq!(strict.node_count(), 4);
        assert_eq!(strict.edge_count(), 3);
        assert!(strict.node_ids().all(|v| !strict.node(v).is_median()));

        let relaxed = MedianJoining::new(1.0).apply(&data, None, &NoProgress).unwrap();
        assert_eq!(relaxed.node_count(), 5);
        assert_eq!(relaxed.edge_count(), 5);
        let medians: Vec<String> = relaxed
            .node_ids()
            .filter(|&v| relaxed.node(v).is_median())
            .map(|v| String::from_utf8_lossy(&relaxed.node(v).sequence).into_owned())
            .collect();
        assert_eq!(medians, vec!["1010"]);
        let m = find(&relaxed, "1010").unwrap();
        assert_eq!(relaxed.degree(m), 3);
    }

    #[test]
    fn test_identical_rows_share_a_node() {
        let data = rows(&["AAC", "AAC", "ACA"]);
        let net = MedianJoining::default().apply(&data, None, &NoProgress).unwrap();
        assert_eq!(net.node_count(), 2);
        assert_eq!(net.edge_count(), 1);
        let v = find(&net, "AAC").unwrap();
        assert_eq!(net.node(v).taxa, vec![1, 2]);
    }

    #[test]
    fn test_weighted_distances() {
        let data = rows(&["AA", "CA"]);
        let net = MedianJoining::default()
            .apply(&data, Some(&[2.5, 1.0][..]), &NoProgress)
            .unwrap();
        let e = net.edge_ids().next().unwrap();
        assert_eq!(*net.edge(e), 2.5);
    }

    #[test]
    fn test_output_contains_inputs_and_no_redundant_medians() {
        let data = rows(&[
            "ACGTACGTAA",
            "ACGTACGTCC",
            "ACGAACGTAC",
            "TCGTACGAAA",
            "ACCTACGTCA",
            "TCGAACGTAA",
        ]);
        for epsilon in [0.0, 1.0] {
            let net = MedianJoining::new(epsilon).apply(&data, None, &NoProgress).unwrap();
            let seqs = sequences(&net);
            for row in &data {
                assert!(seqs.contains(&String::from_utf8_lossy(row).into_owned()));
            }
            for v in net.node_ids() {
                if net.node(v).is_median() {
                    assert!(net.degree(v) > 2, "median {:?} has degree {}", seqs[v.0], net.degree(v));
                }
            }
            // connected
            let mut seen = vec![false; net.node_count()];
            let mut stack = vec![NodeId(0)];
            seen[0] = true;
            while let Some(v) = stack.pop() {
                for &e in net.adjacent(v) {
                    let w = net.opposite(v, e);
                    if !seen[w.0] {
                        seen[w.0] = true;
                        stack.push(w);
                    }
                }
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    #[test]
    fn test_deterministic() {
        let data = rows(&["ACGT", "AGGT", "ACTT", "TCGA", "ACGA"]);
        let a = MedianJoining::new(1.0).apply(&data, None, &NoProgress).unwrap();
        let b = MedianJoining::new(1.0).apply(&data, None, &NoProgress).unwrap();
        assert_eq!(sequences(&a), sequences(&b));
        assert_eq!(a.edge_count(), b.edge_count());
    }

    #[test]
    fn test_invalid_input() {
        let mj = MedianJoining::default();
        assert!(mj.apply(&[], None, &NoProgress).is_err());
        assert!(mj.apply(&rows(&["AC", "A"]), None, &NoProgress).is_err());
        assert!(mj.apply(&rows(&["AC", "AG"]), Some(&[1.0][..]), &NoProgress).is_err());
        assert!(mj.apply(&rows(&["AC", "AG"]), Some(&[1.0, -1.0][..]), &NoProgress).is_err());
        assert!(MedianJoining::new(-1.0).apply(&rows(&["AC"]), None, &NoProgress).is_err());
    }

    #[test]
    fn test_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let err = MedianJoining::default()
            .apply(&rows(&["AAC", "ACA", "CAA"]), None, &token)
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn test_reports_rounds_without_maximum() {
        let token = CancelToken::new();
        MedianJoining::default()
            .apply(&rows(&["AAC", "ACA", "CAA"]), None, &token)
            .unwrap();
        // one round adds AAA, the next finds nothing new
        assert_eq!(token.progress(), 2);
        assert_eq!(token.maximum(), 0);
    }

    #[test]
    fn test_is_applicable() {
        assert!(is_applicable(&rows(&["ACGT-", "ACGTN"])));
        assert!(!is_applicable(&rows(&["ABCDEFGH"])));
    }
}
