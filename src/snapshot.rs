//! Split systems from phylogenetic trees.
//!
//! # Overview
//! Every edge of a tree cuts the leaves into two groups, so a tree is a
//! compatible split system. It is also circular: the left-to-right leaf order
//! of any drawing puts every split side on an interval. A [`TreeSnapshot`]
//! holds those splits, weighted by branch length, together with that order,
//! ready for the equal-angle layout.
//!
//! # Taxon numbering
//! Leaves are sorted by name and numbered from 1, so the same labels map to
//! the same taxon ids regardless of how the tree was written.
//!
//! ```text
//!           root
//!          /    \
//!      node1     node2          names: A=1 B=2 C=3 D=4 E=5
//!      /   \     /   \          splits: {1,2}|{3,4,5}  (node1 and node2
//!     A     B   C    node3               share one bipartition)
//!                    /   \              {4,5}|{1,2,3}  (node3)
//!                   D     E             plus the five trivial splits
//! ```

use crate::bitset::Bitset;
use crate::error::{Result, SplitNetError};
use crate::split::{Split, SplitSystem};
use phylotree::tree::Tree as PhyloTree;
use std::collections::HashMap;

/// The splits of one tree plus the taxon labels behind the ids.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    /// `names[t - 1]` is the label of taxon `t`.
    pub names: Vec<String>,

    /// All splits (trivial ones included) with the DFS leaf order as cycle.
    pub splits: SplitSystem,
}

impl TreeSnapshot {
    /// Parses a Newick string and extracts its splits.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let tree = PhyloTree::from_newick(newick)
            .map_err(|e| SplitNetError::Parse(format!("invalid Newick tree: {e}")))?;
        Self::from_tree(&tree)
    }

    /// Extracts the splits of `tree`.
    ///
    /// # Algorithm
    /// 1. Sort leaf names, assign taxon ids `1..=n`
    /// 2. DFS from the root: leaf order becomes the cycle, and each node's
    ///    bitset is the OR of its children
    /// 3. Every non-root edge yields a split weighted by its length (missing
    ///    lengths count as 0); edges giving the same bipartition, such as the
    ///    two root edges of a rooted tree, are merged by adding lengths
    ///
    /// # Errors
    /// Fails on unnamed or duplicate leaves, on trees with fewer than two
    /// leaves, or when the tree structure cannot be traversed.
    pub fn from_tree(tree: &PhyloTree) -> Result<Self> {
        let mut leaves: Vec<(usize, String)> = Vec::new();
        for leaf_id in tree.get_leaves() {
            let node = tree.get(&leaf_id).map_err(tree_error)?;
            let name = node
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .ok_or_else(|| SplitNetError::Parse(format!("leaf {leaf_id} has no name")))?;
            leaves.push((leaf_id, name));
        }
        leaves.sort_by(|a, b| a.1.cmp(&b.1));
        if let Some(w) = leaves.windows(2).find(|w| w[0].1 == w[1].1) {
            return Err(SplitNetError::InvalidInput(format!("duplicate leaf name '{}'", w[0].1)));
        }
        let ntax = leaves.len();
        if ntax < 2 {
            return Err(SplitNetError::InvalidInput(format!(
                "a tree needs at least two leaves, got {ntax}"
            )));
        }

        let taxon_of: HashMap<usize, usize> = leaves
            .iter()
            .enumerate()
            .map(|(idx, &(node_id, _))| (node_id, idx + 1))
            .collect();

        let root_id = tree.get_root().map_err(tree_error)?;
        let mut cycle = vec![0];
        let mut cache: HashMap<usize, Bitset> = HashMap::new();
        Self::compute_bitsets(root_id, tree, &taxon_of, ntax, &mut cycle, &mut cache)?;

        let splits = Self::collect_splits(tree, root_id, ntax, &cycle, &cache)?;
        log::debug!("tree with {ntax} leaves gives {} splits", splits.len());

        Ok(TreeSnapshot {
            names: leaves.into_iter().map(|(_, name)| name).collect(),
            splits,
        })
    }

    /// Post-order bitsets; leaves are appended to `cycle` as they are met.
    fn compute_bitsets(
        node_id: usize,
        tree: &PhyloTree,
        taxon_of: &HashMap<usize, usize>,
        ntax: usize,
        cycle: &mut Vec<usize>,
        cache: &mut HashMap<usize, Bitset>,
    ) -> Result<Bitset> {
        let node = tree.get(&node_id).map_err(tree_error)?;
        let mut bitset = Bitset::for_taxa(ntax);
        if node.children.is_empty() {
            let t = *taxon_of
                .get(&node_id)
                .ok_or_else(|| SplitNetError::IllegalState(format!("leaf {node_id} not numbered")))?;
            bitset.set(t);
            cycle.push(t);
        } else {
            for &child_id in &node.children {
                let child = Self::compute_bitsets(child_id, tree, taxon_of, ntax, cycle, cache)?;
                bitset.or_assign(&child);
            }
        }
        cache.insert(node_id, bitset.clone());
        Ok(bitset)
    }

    /// One split per distinct bipartition, in order of first appearance along
    /// the cycle.
    fn collect_splits(
        tree: &PhyloTree,
        root_id: usize,
        ntax: usize,
        cycle: &[usize],
        cache: &HashMap<usize, Bitset>,
    ) -> Result<SplitSystem> {
        let mut edges: Vec<(&usize, &Bitset)> = cache.iter().filter(|&(&id, _)| id != root_id).collect();
        // HashMap order is arbitrary; sort by node id for reproducible output
        edges.sort_by_key(|&(&id, _)| id);

        let mut index: HashMap<Bitset, usize> = HashMap::new();
        let mut splits: Vec<Split> = Vec::new();
        for (&node_id, side) in edges {
            let size = side.count_ones();
            if size == 0 || size == ntax {
                continue;
            }
            let length = tree.get(&node_id).map_err(tree_error)?.parent_edge.unwrap_or(0.0);
            let split = Split::new(ntax, side.clone(), length.max(0.0))?;
            match index.get(split.part()) {
                Some(&k) => {
                    let merged = splits[k].weight() + split.weight();
                    splits[k].set_weight(merged);
                }
                None => {
                    index.insert(split.part().clone(), splits.len());
                    splits.push(split);
                }
            }
        }
        SplitSystem::from_splits(ntax, splits)?.with_cycle(cycle.to_vec())
    }

    pub fn ntax(&self) -> usize {
        self.names.len()
    }
}

fn tree_error(e: impl std::fmt::Display) -> SplitNetError {
    SplitNetError::Parse(format!("malformed tree: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::are_compatible;

    #[test]
    fn test_rooted_tree_splits() {
        let snap = TreeSnapshot::from_newick("((A:1,B:2):0.5,(C:1,(D:1,E:1):3):0.25);").unwrap();
        assert_eq!(snap.names, vec!["A", "B", "C", "D", "E"]);
        assert_eq!(snap.ntax(), 5);
        // five trivial splits, {A,B} (root edges merged) and {D,E}
        assert_eq!(snap.splits.len(), 7);

        let ab = snap
            .splits
            .iter()
            .find(|s| s.part() == &Bitset::from_taxa(5, &[3, 4, 5]))
            .unwrap();
        assert!((ab.weight() - 0.75).abs() < 1e-12);
        let de = snap
            .splits
            .iter()
            .find(|s| s.part() == &Bitset::from_taxa(5, &[4, 5]))
            .unwrap();
        assert_eq!(de.weight(), 3.0);
        let b = snap.splits.iter().find(|s| s.part() == &Bitset::from_taxa(5, &[2])).unwrap();
        assert_eq!(b.weight(), 2.0);
    }

    #[test]
    fn test_tree_splits_are_compatible_and_circular() {
        let snap = TreeSnapshot::from_newick("((D:1,(B:1,E:1):1):1,(A:1,C:1):1,F:1);").unwrap();
        let splits = snap.splits.splits();
        for (i, a) in splits.iter().enumerate() {
            for b in &splits[i + 1..] {
                assert!(are_compatible(a, b));
            }
            assert!(snap.splits.is_circular(a));
        }
    }

    #[test]
    fn test_cycle_follows_leaf_order() {
        let snap = TreeSnapshot::from_newick("((C:1,A:1):1,(B:1,D:1):1);").unwrap();
        assert_eq!(snap.splits.cycle(), Some(&[0, 3, 1, 2, 4][..]));
    }

    #[test]
    fn test_rejects_bad_trees() {
        assert!(TreeSnapshot::from_newick("((A:1,A:1):1,B:1);").is_err());
        assert!(TreeSnapshot::from_newick("((A:1,:1):1,B:1);").is_err());
        assert!(TreeSnapshot::from_newick("(A:1);").is_err());
    }
}
