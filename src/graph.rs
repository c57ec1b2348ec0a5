//! Arena-backed undirected multigraph.
//!
//! # Overview
//! Nodes and edges live in two `Vec`s and are addressed by small integer
//! handles. Removing an element leaves a hole (`None`), so handles stay valid
//! until [`Graph::compact`] renumbers everything.
//!
//! Every node keeps its incident edges in an ordered list. For planar split
//! networks this order is the counter-clockwise rotation around the node, and
//! [`Graph::next_adjacent_cyclic`] / [`Graph::prev_adjacent_cyclic`] walk it.
//! Edges store their two endpoints, so `opposite` and `endpoints` are O(1).
//!
//! Handles are plain indices. Accessors panic on a handle of a removed or
//! unknown element, like slice indexing; check with [`Graph::contains_node`]
//! or [`Graph::contains_edge`] first when a handle may be stale.

use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct NodeSlot<N> {
    data: N,
    adjacent: Vec<EdgeId>,
}

#[derive(Clone, Debug)]
struct EdgeSlot<E> {
    source: NodeId,
    target: NodeId,
    data: E,
}

/// Undirected multigraph with payload `N` on nodes and `E` on edges.
#[derive(Clone, Debug)]
pub struct Graph<N, E> {
    nodes: Vec<Option<NodeSlot<N>>>,
    edges: Vec<Option<EdgeSlot<E>>>,
    node_count: usize,
    edge_count: usize,
}

impl<N, E> Default for Graph<N, E> {
    fn default() -> Self {
        Graph {
            nodes: Vec::new(),
            edges: Vec::new(),
            node_count: 0,
            edge_count: 0,
        }
    }
}

impl<N, E> Graph<N, E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn add_node(&mut self, data: N) -> NodeId {
        self.nodes.push(Some(NodeSlot {
            data,
            adjacent: Vec::new(),
        }));
        self.node_count += 1;
        NodeId(self.nodes.len() - 1)
    }

    /// Adds an edge and appends it to the end of both endpoints' rotations.
    ///
    /// # Panics
    /// If `source` or `target` is not a node of the graph.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, data: E) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(EdgeSlot { source, target, data }));
        self.edge_count += 1;
        self.slot_mut(source).adjacent.push(id);
        if source != target {
            self.slot_mut(target).adjacent.push(id);
        }
        id
    }

    /// Removes an edge and detaches it from both endpoints.
    pub fn remove_edge(&mut self, e: EdgeId) -> Option<E> {
        let slot = self.edges.get_mut(e.0)?.take()?;
        self.edge_count -= 1;
        for v in [slot.source, slot.target] {
            if let Some(Some(node)) = self.nodes.get_mut(v.0) {
                node.adjacent.retain(|&f| f != e);
            }
        }
        Some(slot.data)
    }

    /// Removes a node together with all incident edges.
    pub fn remove_node(&mut self, v: NodeId) -> Option<N> {
        let incident = self.nodes.get(v.0)?.as_ref()?.adjacent.clone();
        for e in incident {
            self.remove_edge(e);
        }
        let slot = self.nodes[v.0].take()?;
        self.node_count -= 1;
        Some(slot.data)
    }

    pub fn contains_node(&self, v: NodeId) -> bool {
        matches!(self.nodes.get(v.0), Some(Some(_)))
    }

    pub fn contains_edge(&self, e: EdgeId) -> bool {
        matches!(self.edges.get(e.0), Some(Some(_)))
    }

    /// Payload of node `v`.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn node(&self, v: NodeId) -> &N {
        &self.slot(v).data
    }

    /// Mutable payload of node `v`.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn node_mut(&mut self, v: NodeId) -> &mut N {
        &mut self.slot_mut(v).data
    }

    /// Payload of edge `e`.
    ///
    /// # Panics
    /// If `e` is not an edge of the graph.
    pub fn edge(&self, e: EdgeId) -> &E {
        &self.edge_slot(e).data
    }

    /// Mutable payload of edge `e`.
    ///
    /// # Panics
    /// If `e` is not an edge of the graph.
    pub fn edge_mut(&mut self, e: EdgeId) -> &mut E {
        &mut self.edge_slot_mut(e).data
    }

    /// Incident edges in rotation order.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn adjacent(&self, v: NodeId) -> &[EdgeId] {
        &self.slot(v).adjacent
    }

    /// Number of incident edges, loops counted once.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn degree(&self, v: NodeId) -> usize {
        self.slot(v).adjacent.len()
    }

    /// Replaces the rotation of `v`. The caller keeps the edge endpoints
    /// consistent with the new list.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn set_rotation(&mut self, v: NodeId, rotation: Vec<EdgeId>) {
        self.slot_mut(v).adjacent = rotation;
    }

    /// Source and target of `e`.
    ///
    /// # Panics
    /// If `e` is not an edge of the graph.
    pub fn endpoints(&self, e: EdgeId) -> (NodeId, NodeId) {
        let slot = self.edge_slot(e);
        (slot.source, slot.target)
    }

    /// The endpoint of `e` that is not `v`.
    ///
    /// # Panics
    /// If `e` is not an edge of the graph.
    pub fn opposite(&self, v: NodeId, e: EdgeId) -> NodeId {
        let slot = self.edge_slot(e);
        if slot.source == v { slot.target } else { slot.source }
    }

    /// Moves the `from` end of `e` to `to`. Rotations are left to the caller.
    ///
    /// # Panics
    /// If `e` is not an edge of the graph.
    pub fn set_endpoint(&mut self, e: EdgeId, from: NodeId, to: NodeId) {
        let slot = self.edge_slot_mut(e);
        if slot.source == from {
            slot.source = to;
        } else if slot.target == from {
            slot.target = to;
        }
    }

    /// Successor of `e` in the rotation of `v`, wrapping around.
    ///
    /// Returns `None` if `e` is not incident to `v`.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn next_adjacent_cyclic(&self, v: NodeId, e: EdgeId) -> Option<EdgeId> {
        let adj = self.adjacent(v);
        let pos = adj.iter().position(|&f| f == e)?;
        Some(adj[(pos + 1) % adj.len()])
    }

    /// Predecessor of `e` in the rotation of `v`, wrapping around.
    ///
    /// Returns `None` if `e` is not incident to `v`.
    ///
    /// # Panics
    /// If `v` is not a node of the graph.
    pub fn prev_adjacent_cyclic(&self, v: NodeId, e: EdgeId) -> Option<EdgeId> {
        let adj = self.adjacent(v);
        let pos = adj.iter().position(|&f| f == e)?;
        Some(adj[(pos + adj.len() - 1) % adj.len()])
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| NodeId(i))
    }

    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| EdgeId(i))
    }

    /// Renumbers nodes and edges densely, preserving relative order.
    ///
    /// Returns the old → new maps (`None` for removed elements).
    pub fn compact(&mut self) -> (Vec<Option<NodeId>>, Vec<Option<EdgeId>>) {
        let mut node_map = vec![None; self.nodes.len()];
        let mut next = 0;
        for (old, slot) in self.nodes.iter().enumerate() {
            if slot.is_some() {
                node_map[old] = Some(NodeId(next));
                next += 1;
            }
        }
        let mut edge_map = vec![None; self.edges.len()];
        next = 0;
        for (old, slot) in self.edges.iter().enumerate() {
            if slot.is_some() {
                edge_map[old] = Some(EdgeId(next));
                next += 1;
            }
        }

        let nodes = std::mem::take(&mut self.nodes);
        self.nodes = nodes
            .into_iter()
            .flatten()
            .map(|mut slot| {
                slot.adjacent = slot.adjacent.iter().filter_map(|e| edge_map[e.0]).collect();
                Some(slot)
            })
            .collect();
        let edges = std::mem::take(&mut self.edges);
        self.edges = edges
            .into_iter()
            .flatten()
            .filter_map(|slot| {
                let source = node_map[slot.source.0]?;
                let target = node_map[slot.target.0]?;
                Some(Some(EdgeSlot {
                    source,
                    target,
                    data: slot.data,
                }))
            })
            .collect();
        (node_map, edge_map)
    }

    fn slot(&self, v: NodeId) -> &NodeSlot<N> {
        match self.nodes.get(v.0) {
            Some(Some(slot)) => slot,
            _ => panic!("node {v} is not in the graph"),
        }
    }

    fn slot_mut(&mut self, v: NodeId) -> &mut NodeSlot<N> {
        match self.nodes.get_mut(v.0) {
            Some(Some(slot)) => slot,
            _ => panic!("node {v} is not in the graph"),
        }
    }

    fn edge_slot(&self, e: EdgeId) -> &EdgeSlot<E> {
        match self.edges.get(e.0) {
            Some(Some(slot)) => slot,
            _ => panic!("edge {e} is not in the graph"),
        }
    }

    fn edge_slot_mut(&mut self, e: EdgeId) -> &mut EdgeSlot<E> {
        match self.edges.get_mut(e.0) {
            Some(Some(slot)) => slot,
            _ => panic!("edge {e} is not in the graph"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> (Graph<&'static str, u32>, Vec<NodeId>, Vec<EdgeId>) {
        let mut g = Graph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        let ab = g.add_edge(a, b, 1);
        let bc = g.add_edge(b, c, 2);
        (g, vec![a, b, c], vec![ab, bc])
    }

    #[test]
    fn test_add_and_query() {
        let (g, v, e) = path();
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.degree(v[1]), 2);
        assert_eq!(g.opposite(v[1], e[0]), v[0]);
        assert_eq!(g.opposite(v[0], e[0]), v[1]);
        assert_eq!(g.endpoints(e[1]), (v[1], v[2]));
        assert_eq!(*g.edge(e[1]), 2);
        assert_eq!(*g.node(v[2]), "c");
    }

    #[test]
    fn test_rotation_walk() {
        let mut g: Graph<(), ()> = Graph::new();
        let hub = g.add_node(());
        let spokes: Vec<EdgeId> = (0..4)
            .map(|_| {
                let leaf = g.add_node(());
                g.add_edge(hub, leaf, ())
            })
            .collect();
        assert_eq!(g.next_adjacent_cyclic(hub, spokes[3]), Some(spokes[0]));
        assert_eq!(g.prev_adjacent_cyclic(hub, spokes[0]), Some(spokes[3]));
        assert_eq!(g.next_adjacent_cyclic(hub, spokes[1]), Some(spokes[2]));

        g.set_rotation(hub, vec![spokes[2], spokes[0], spokes[3], spokes[1]]);
        assert_eq!(g.next_adjacent_cyclic(hub, spokes[0]), Some(spokes[3]));
        assert_eq!(g.next_adjacent_cyclic(hub, spokes[1]), Some(spokes[2]));
    }

    #[test]
    fn test_remove_node_drops_incident_edges() {
        let (mut g, v, e) = path();
        assert_eq!(g.remove_node(v[1]), Some("b"));
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.edge_count(), 0);
        assert!(!g.contains_edge(e[0]));
        assert_eq!(g.degree(v[0]), 0);
        assert_eq!(g.remove_node(v[1]), None);
    }

    #[test]
    #[should_panic(expected = "node v1 is not in the graph")]
    fn test_stale_node_handle_panics() {
        let (mut g, nodes, _) = path();
        g.remove_node(nodes[1]);
        assert!(!g.contains_node(nodes[1]));
        g.node(nodes[1]);
    }

    #[test]
    #[should_panic(expected = "edge e0 is not in the graph")]
    fn test_stale_edge_handle_panics() {
        let (mut g, _, edges) = path();
        g.remove_edge(edges[0]);
        g.endpoints(edges[0]);
    }

    #[test]
    fn test_set_endpoint() {
        let (mut g, v, e) = path();
        let d = g.add_node("d");
        g.set_endpoint(e[1], v[1], d);
        let mut rot = g.adjacent(v[1]).to_vec();
        rot.retain(|&f| f != e[1]);
        g.set_rotation(v[1], rot);
        g.set_rotation(d, vec![e[1]]);
        assert_eq!(g.endpoints(e[1]), (d, v[2]));
        assert_eq!(g.degree(v[1]), 1);
        assert_eq!(g.opposite(v[2], e[1]), d);
    }

    #[test]
    fn test_compact() {
        let (mut g, v, _) = path();
        g.remove_node(v[0]);
        let (node_map, edge_map) = g.compact();
        assert_eq!(node_map, vec![None, Some(NodeId(0)), Some(NodeId(1))]);
        assert_eq!(edge_map, vec![None, Some(EdgeId(0))]);
        assert_eq!(g.node_ids().collect::<Vec<_>>(), vec![NodeId(0), NodeId(1)]);
        assert_eq!(g.endpoints(EdgeId(0)), (NodeId(0), NodeId(1)));
        assert_eq!(g.adjacent(NodeId(0)), &[EdgeId(0)]);
        assert_eq!(*g.edge(EdgeId(0)), 2);
    }
}
