//! Equal-angle layout of circular split networks.
//!
//! # Overview
//! Starting from a star on the taxa (in circular order), every circular split
//! is inserted by "wrapping": we walk the outer boundary of the current planar
//! network from the first to the last taxon of the split's side, and copy the
//! walked nodes so that a band of parallel edges, one per copied node,
//! separates the side from the rest.
//!
//! ```text
//!  star           wrap {2,3}          wrap {3,4}
//!   2  3            2  3                2   3
//!    \/              \/                 |   |
//!  1-C-4        1-C--A  4          1-C--A---A'
//!                  \___/               |    |
//!                                      4-C'-+
//! ```
//!
//! Each split then gets one angle, the bisector of the arc its side occupies
//! on the circle of taxa, and node coordinates follow by walking outwards from
//! taxon 1.
//!
//! # Conventions
//! - Taxon at circular position `k` (1-based) sits at `360·k/n` degrees
//!   before the final rotation; the rotation puts taxon 1 at 180° so the edge
//!   leaving taxon 1 points at 0°.
//! - Every node's adjacency list is its counter-clockwise rotation.
//! - Split ids are indices into the input [`SplitSystem`].

use crate::bitset::Bitset;
use crate::error::{Result, SplitNetError};
use crate::graph::{EdgeId, Graph, NodeId};
use crate::progress::ProgressListener;
use crate::split::{SplitSystem, is_interval, normalize_cycle};
use std::collections::{HashMap, HashSet};

/// Which split an edge represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeSplit {
    Split(usize),
    /// Placeholder leaf edge for a taxon without a trivial split. Never
    /// present in a returned network.
    Temporary,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkNode {
    pub taxa: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NetworkEdge {
    pub split: EdgeSplit,
    pub weight: f64,
    /// Drawing direction in degrees, `[0, 360)`.
    pub angle: f64,
}

impl NetworkEdge {
    /// Id of the represented split (`None` only for temporary edges).
    pub fn split_id(&self) -> Option<usize> {
        match self.split {
            EdgeSplit::Split(id) => Some(id),
            EdgeSplit::Temporary => None,
        }
    }
}

pub type SplitNetwork = Graph<NetworkNode, NetworkEdge>;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Output of [`EqualAngle::apply`].
#[derive(Clone, Debug)]
pub struct EqualAngleResult {
    /// Compacted network: node ids are `0..node_count`.
    pub network: SplitNetwork,
    /// Coordinates indexed by node id.
    pub points: Vec<Point>,
    /// Splits represented in the network, ascending ids.
    pub used_splits: Vec<usize>,
    /// Non-circular or duplicate splits that were left out.
    pub skipped_splits: Vec<usize>,
}

impl EqualAngleResult {
    pub fn point(&self, v: NodeId) -> Point {
        self.points[v.0]
    }

    /// Node holding taxon `t`.
    pub fn taxon_node(&self, t: usize) -> Option<NodeId> {
        self.network
            .node_ids()
            .find(|&v| self.network.node(v).taxa.contains(&t))
    }
}

/// Equal-angle algorithm configuration.
#[derive(Clone, Copy, Debug)]
pub struct EqualAngle {
    /// Scale edges by split weight; otherwise every edge has unit length.
    pub use_weights: bool,
}

impl Default for EqualAngle {
    fn default() -> Self {
        EqualAngle { use_weights: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EdgeClass {
    /// On the side being wrapped.
    Inner,
    /// Separates taxa on both sides of the wrapped split.
    Crossing,
    Outside,
}

/// One node of the boundary path walked while wrapping a split.
struct PathStep {
    node: NodeId,
    /// Crossing edge from the previous step.
    entry: Option<EdgeId>,
    /// Inner edges to move onto the copy, in rotation order.
    inner: Vec<EdgeId>,
    /// Crossing edge to the next step.
    exit: Option<EdgeId>,
}

struct Builder<'a> {
    splits: &'a SplitSystem,
    cycle: Vec<usize>,
    position: Vec<usize>,
    graph: SplitNetwork,
    taxon_node: Vec<NodeId>,
    leaf_edge_taxon: HashMap<EdgeId, usize>,
}

impl EqualAngle {
    pub fn new(use_weights: bool) -> Self {
        EqualAngle { use_weights }
    }

    /// Builds and lays out the split network.
    ///
    /// # Errors
    /// - [`SplitNetError::InvalidInput`] if the system has no circular ordering.
    /// - [`SplitNetError::IllegalState`] if wrapping meets a corrupted network.
    /// - [`SplitNetError::Canceled`] via `progress`.
    pub fn apply(&self, splits: &SplitSystem, progress: &dyn ProgressListener) -> Result<EqualAngleResult> {
        let cycle = splits.cycle().ok_or_else(|| {
            SplitNetError::InvalidInput("equal-angle layout needs a circular ordering".into())
        })?;
        let ntax = splits.ntax();
        if ntax == 0 {
            return Err(SplitNetError::InvalidInput("no taxa".into()));
        }
        let cycle = normalize_cycle(cycle);
        let mut position = vec![0; ntax + 1];
        for (k, &t) in cycle.iter().enumerate().skip(1) {
            position[t] = k;
        }

        progress.set_maximum(splits.len() as u64);
        progress.set_progress(0);

        let mut builder = Builder {
            splits,
            cycle,
            position,
            graph: SplitNetwork::new(),
            taxon_node: Vec::new(),
            leaf_edge_taxon: HashMap::new(),
        };
        let mut skipped = Vec::new();
        let mut seen: HashSet<&Bitset> = HashSet::new();
        let mut nontrivial = Vec::new();
        let mut trivial: Vec<Option<usize>> = vec![None; ntax + 1];

        for (id, split) in splits.iter().enumerate() {
            if !seen.insert(split.part()) {
                log::debug!("equal angle: split {} duplicates an earlier split, skipped", id + 1);
                skipped.push(id);
            } else if split.is_trivial() {
                trivial[singleton_taxon(split.part())] = Some(id);
            } else {
                nontrivial.push(id);
            }
        }

        builder.build_star(&trivial);

        nontrivial.sort_by_key(|&id| splits.get(id).part().count_ones());
        for id in nontrivial {
            let part = splits.get(id).part();
            if is_interval(&builder.cycle, part) {
                builder.wrap(id)?;
            } else {
                log::debug!("equal angle: split {} is not circular, skipped", id + 1);
                skipped.push(id);
            }
            progress.increment();
            progress.check_for_cancel()?;
        }
        builder.remove_temporary_edges();
        builder.assign_angles();
        let points = builder.assign_coordinates(self.use_weights)?;

        let mut network = builder.graph;
        let (node_map, _) = network.compact();
        let mut compact_points = vec![Point::default(); network.node_count()];
        for (old, new) in node_map.iter().enumerate() {
            if let Some(new) = new {
                compact_points[new.0] = points[old];
            }
        }
        let mut used: Vec<usize> = network
            .edge_ids()
            .filter_map(|e| network.edge(e).split_id())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        used.sort_unstable();
        skipped.sort_unstable();
        log::debug!(
            "equal angle: {} nodes, {} edges, {} splits used, {} skipped",
            network.node_count(),
            network.edge_count(),
            used.len(),
            skipped.len()
        );
        Ok(EqualAngleResult {
            network,
            points: compact_points,
            used_splits: used,
            skipped_splits: skipped,
        })
    }
}

/// The single taxon on the small side of a trivial split.
fn singleton_taxon(part: &Bitset) -> usize {
    match (part.count_ones(), part.first()) {
        (1, Some(t)) => t,
        // the small side is {1}
        _ => 1,
    }
}

impl Builder<'_> {
    fn ntax(&self) -> usize {
        self.splits.ntax()
    }

    /// Hub node with one leaf per taxon, in circular order.
    fn build_star(&mut self, trivial: &[Option<usize>]) {
        let n = self.ntax();
        let hub = self.graph.add_node(NetworkNode::default());
        self.taxon_node = vec![hub; n + 1];
        for k in 1..=n {
            let t = self.cycle[k];
            let leaf = self.graph.add_node(NetworkNode { taxa: vec![t] });
            let (split, weight) = match trivial[t] {
                Some(id) => (EdgeSplit::Split(id), self.splits.get(id).weight()),
                None => (EdgeSplit::Temporary, 0.0),
            };
            let e = self.graph.add_edge(
                hub,
                leaf,
                NetworkEdge {
                    split,
                    weight,
                    angle: 0.0,
                },
            );
            self.taxon_node[t] = leaf;
            self.leaf_edge_taxon.insert(e, t);
        }
    }

    fn classify(&self, e: EdgeId, side: &Bitset) -> EdgeClass {
        if let Some(&t) = self.leaf_edge_taxon.get(&e) {
            return if side.contains(t) { EdgeClass::Inner } else { EdgeClass::Outside };
        }
        let other = match self.graph.edge(e).split {
            EdgeSplit::Split(id) => self.splits.get(id).part(),
            EdgeSplit::Temporary => return EdgeClass::Outside,
        };
        if other.is_subset_of(side) {
            EdgeClass::Inner
        } else if !other.intersects(side) || side.is_subset_of(other) {
            EdgeClass::Outside
        } else {
            EdgeClass::Crossing
        }
    }

    /// Inserts the circular split `id` by duplicating the boundary path
    /// between its first and last taxon.
    fn wrap(&mut self, id: usize) -> Result<()> {
        let split = self.splits.get(id);
        let side = split.part().clone();
        let first = (1..=self.ntax())
            .map(|k| self.cycle[k])
            .find(|&t| side.contains(t))
            .ok_or_else(|| SplitNetError::IllegalState(format!("split {} has an empty side", id + 1)))?;

        let (start, entry) = self.find_path_start(first, &side)?;
        let path = self.walk_boundary(start, entry, &side)?;
        log::trace!("wrapping split {} along {} node(s)", id + 1, path.len());

        let edge_data = NetworkEdge {
            split: EdgeSplit::Split(id),
            weight: split.weight(),
            angle: 0.0,
        };
        let copies: Vec<NodeId> = path
            .iter()
            .map(|_| self.graph.add_node(NetworkNode::default()))
            .collect();
        let bands: Vec<EdgeId> = path
            .iter()
            .zip(&copies)
            .map(|(step, &copy)| self.graph.add_edge(step.node, copy, edge_data.clone()))
            .collect();
        // duplicates of the crossing edges, joining consecutive copies
        let mut duplicates = Vec::with_capacity(path.len().saturating_sub(1));
        for (i, step) in path.iter().enumerate() {
            if let Some(exit) = step.exit {
                let data = self.graph.edge(exit).clone();
                duplicates.push(self.graph.add_edge(copies[i], copies[i + 1], data));
            }
        }

        for (i, step) in path.iter().enumerate() {
            let mut rotation: Vec<EdgeId> = self
                .graph
                .adjacent(step.node)
                .iter()
                .copied()
                .filter(|&e| e != bands[i])
                .collect();
            let anchor = step.entry.or(step.inner.first().copied()).ok_or_else(|| {
                SplitNetError::IllegalState("boundary path starts without an inner edge".into())
            })?;
            let at = rotation.iter().position(|&e| e == anchor).ok_or_else(|| {
                SplitNetError::IllegalState("edge missing from node rotation".into())
            })?;
            rotation.rotate_left(at);
            let keep_front = usize::from(step.entry.is_some());
            let mut original = rotation[..keep_front].to_vec();
            original.push(bands[i]);
            original.extend_from_slice(&rotation[keep_front + step.inner.len()..]);
            self.graph.set_rotation(step.node, original);

            let mut copy_rotation = vec![bands[i]];
            if i > 0 {
                copy_rotation.push(duplicates[i - 1]);
            }
            copy_rotation.extend_from_slice(&step.inner);
            if step.exit.is_some() {
                copy_rotation.push(duplicates[i]);
            }
            self.graph.set_rotation(copies[i], copy_rotation);

            for &e in &step.inner {
                self.graph.set_endpoint(e, step.node, copies[i]);
            }
        }
        Ok(())
    }

    /// Walks inwards from the leaf of `first`, always turning clockwise onto
    /// inner edges, to the node where the boundary leaves the side.
    fn find_path_start(&self, first: usize, side: &Bitset) -> Result<(NodeId, EdgeId)> {
        let leaf = self.taxon_node[first];
        let mut e = self.graph.adjacent(leaf).first().copied().ok_or_else(|| {
            SplitNetError::IllegalState(format!("taxon {first} has no leaf edge"))
        })?;
        let mut u = self.graph.opposite(leaf, e);
        for _ in 0..=self.graph.edge_count() {
            if self.graph.degree(u) < 2 {
                return Err(SplitNetError::IllegalState(
                    "boundary walk ran into a leaf".into(),
                ));
            }
            let pred = self.graph.prev_adjacent_cyclic(u, e).ok_or_else(|| {
                SplitNetError::IllegalState("edge missing from node rotation".into())
            })?;
            if self.classify(pred, side) != EdgeClass::Inner {
                return Ok((u, e));
            }
            e = pred;
            u = self.graph.opposite(u, e);
        }
        Err(SplitNetError::IllegalState(
            "boundary walk does not leave the split side".into(),
        ))
    }

    /// Collects the boundary path: at each node the run of inner edges after
    /// the entry, then the crossing edge leading on, until an outside edge.
    fn walk_boundary(&self, start: NodeId, first_inner: EdgeId, side: &Bitset) -> Result<Vec<PathStep>> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut node = start;
        let mut entry = first_inner;
        let mut entry_is_crossing = false;
        loop {
            if !visited.insert(node) {
                return Err(SplitNetError::IllegalState(format!(
                    "boundary walk revisits node {node}"
                )));
            }
            let mut inner = Vec::new();
            if !entry_is_crossing {
                inner.push(entry);
            }
            let mut current = entry;
            let exit = loop {
                current = self.graph.next_adjacent_cyclic(node, current).ok_or_else(|| {
                    SplitNetError::IllegalState("edge missing from node rotation".into())
                })?;
                if current == entry {
                    return Err(SplitNetError::IllegalState(format!(
                        "boundary walk circles node {node}"
                    )));
                }
                match self.classify(current, side) {
                    EdgeClass::Inner => inner.push(current),
                    EdgeClass::Crossing => break Some(current),
                    EdgeClass::Outside => break None,
                }
            };
            path.push(PathStep {
                node,
                entry: entry_is_crossing.then_some(entry),
                inner,
                exit,
            });
            match exit {
                Some(x) => {
                    node = self.graph.opposite(node, x);
                    entry = x;
                    entry_is_crossing = true;
                }
                None => return Ok(path),
            }
        }
    }

    /// Folds every placeholder leaf into its neighbour.
    fn remove_temporary_edges(&mut self) {
        let temporary: Vec<EdgeId> = self
            .graph
            .edge_ids()
            .filter(|&e| self.graph.edge(e).split == EdgeSplit::Temporary)
            .collect();
        for e in temporary {
            let Some(&t) = self.leaf_edge_taxon.get(&e) else {
                continue;
            };
            let leaf = self.taxon_node[t];
            let target = self.graph.opposite(leaf, e);
            if let Some(node) = self.graph.remove_node(leaf) {
                self.graph.node_mut(target).taxa.extend(node.taxa);
            }
            self.taxon_node[t] = target;
            self.leaf_edge_taxon.remove(&e);
        }
    }

    /// Angle of the taxon at circular position `k`.
    fn taxon_angle(&self, k: usize) -> f64 {
        360.0 * k as f64 / self.ntax() as f64
    }

    /// Bisector of the arc covered by the side not containing taxon 1.
    fn split_angle(&self, side: &Bitset) -> f64 {
        let n = self.ntax();
        let (mut lo, mut hi) = (n, 1);
        for t in side.iter() {
            lo = lo.min(self.position[t]);
            hi = hi.max(self.position[t]);
        }
        let start = 0.5 * (self.taxon_angle(lo - 1) + self.taxon_angle(lo));
        let end = if hi == n {
            0.5 * (self.taxon_angle(hi) + self.taxon_angle(1)) + 180.0
        } else {
            0.5 * (self.taxon_angle(hi) + self.taxon_angle(hi + 1))
        };
        (0.5 * (start + end)).rem_euclid(360.0)
    }

    /// Sets every edge's angle, rotated so taxon 1 sits at 180°.
    fn assign_angles(&mut self) {
        let rotation = 180.0 - self.taxon_angle(1);
        let mut cache: HashMap<usize, f64> = HashMap::new();
        let edges: Vec<EdgeId> = self.graph.edge_ids().collect();
        for e in edges {
            let Some(id) = self.graph.edge(e).split_id() else {
                continue;
            };
            let angle = *cache
                .entry(id)
                .or_insert_with(|| (self.split_angle(self.splits.get(id).part()) + rotation).rem_euclid(360.0));
            self.graph.edge_mut(e).angle = angle;
        }
    }

    /// Places taxon 1's node at the origin and every other node by a
    /// depth-first walk that crosses each split at most once per path.
    fn assign_coordinates(&self, use_weights: bool) -> Result<Vec<Point>> {
        let mut points = vec![Point::default(); self.graph.node_ids().map(|v| v.0 + 1).max().unwrap_or(0)];
        let root = self.taxon_node[1];
        let mut visited = HashSet::from([root]);
        let mut stack: Vec<(NodeId, HashSet<usize>)> = vec![(root, HashSet::new())];
        while let Some((v, crossed)) = stack.pop() {
            let here = points[v.0];
            for &e in self.graph.adjacent(v) {
                let edge = self.graph.edge(e);
                let Some(id) = edge.split_id() else {
                    return Err(SplitNetError::IllegalState("temporary edge left in network".into()));
                };
                let w = self.graph.opposite(v, e);
                if crossed.contains(&id) || visited.contains(&w) {
                    continue;
                }
                let len = if use_weights { edge.weight } else { 1.0 };
                let rad = edge.angle.to_radians();
                points[w.0] = Point {
                    x: here.x + len * rad.cos(),
                    y: here.y + len * rad.sin(),
                };
                visited.insert(w);
                let mut next = crossed.clone();
                next.insert(id);
                stack.push((w, next));
            }
        }
        if visited.len() != self.graph.node_count() {
            return Err(SplitNetError::IllegalState(format!(
                "{} of {} nodes reachable from taxon 1",
                visited.len(),
                self.graph.node_count()
            )));
        }
        Ok(points)
    }
}
