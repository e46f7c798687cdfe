// Copyright 2025-2026 the purgatory developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.
//
// See the LICENSE-APACHE or LICENSE-MIT files at the top-level directory
// of this distribution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::GraphError;
use crate::{EPSILON, EdgeId, EdgeKind, EdgeSet, NodeId, NodeSet};

// Gives every graph in the process a distinct id, so that handles minted by
// one graph can be recognized (and rejected) by every other graph.
static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

pub(crate) struct NodeData {
    pub(crate) uid: String,
    pub(crate) deleted: bool,
    pub(crate) keep: bool,

    // The frozen topology. These sets include members regardless of their
    // deleted state.
    pub(crate) incoming_edges: Vec<EdgeId>,
    pub(crate) outgoing_edges: Vec<EdgeId>,
    pub(crate) incoming_nodes: NodeSet,
    pub(crate) outgoing_nodes: NodeSet,
    // Which flavor the outgoing edges are: `None` until the first outgoing
    // edge is registered, then `Some(true)` for or-edges. Mixing flavors is
    // rejected at construction.
    pub(crate) outgoing_or_edges: Option<bool>,

    // Live projections of the sets above, materialized lazily and maintained
    // in place by edge deletion. The touched flags record which of them have
    // to be reset by `Graph::unmark_deleted`.
    pub(crate) incoming_edges_live: Option<EdgeSet>,
    pub(crate) incoming_nodes_live: Option<NodeSet>,
    pub(crate) incoming_touched: bool,
    pub(crate) outgoing_edges_live: Option<EdgeSet>,
    pub(crate) outgoing_nodes_live: Option<NodeSet>,
    pub(crate) outgoing_touched: bool,

    // Recursive-reachability caches. The incoming direction has a single
    // cache slot; the outgoing direction has the full three tiers (the latest
    // result, a static flag, and a default result that is valid whenever the
    // graph is in its pristine state). See `Graph::outgoing_nodes_recursive`.
    pub(crate) incoming_recursive: Option<std::rc::Rc<NodeSet>>,
    pub(crate) incoming_recursive_level: u64,
    pub(crate) incoming_built_at: u64,
    pub(crate) incoming_invalidated_at: u64,
    pub(crate) outgoing_recursive: Option<std::rc::Rc<NodeSet>>,
    pub(crate) outgoing_recursive_static: bool,
    pub(crate) outgoing_default: Option<std::rc::Rc<NodeSet>>,
    pub(crate) outgoing_default_level: u64,
    pub(crate) outgoing_recursive_level: u64,
    pub(crate) outgoing_built_at: u64,
    pub(crate) outgoing_invalidated_at: u64,

    // Cycle caches.
    pub(crate) in_cycle_static: Option<bool>,
    pub(crate) cycle_nodes_static: Option<std::rc::Rc<NodeSet>>,
    pub(crate) cycle_nodes_cache: Option<std::rc::Rc<NodeSet>>,
    pub(crate) cycle_cache_built_at: u64,
}

impl NodeData {
    fn new(uid: String, keep: bool) -> NodeData {
        NodeData {
            uid,
            deleted: false,
            keep,
            incoming_edges: Vec::new(),
            outgoing_edges: Vec::new(),
            incoming_nodes: NodeSet::new(),
            outgoing_nodes: NodeSet::new(),
            outgoing_or_edges: None,
            incoming_edges_live: None,
            incoming_nodes_live: None,
            incoming_touched: false,
            outgoing_edges_live: None,
            outgoing_nodes_live: None,
            outgoing_touched: false,
            incoming_recursive: None,
            incoming_recursive_level: 0,
            incoming_built_at: 0,
            incoming_invalidated_at: 0,
            outgoing_recursive: None,
            outgoing_recursive_static: false,
            outgoing_default: None,
            outgoing_default_level: 0,
            outgoing_recursive_level: 0,
            outgoing_built_at: 0,
            outgoing_invalidated_at: 0,
            in_cycle_static: None,
            cycle_nodes_static: None,
            cycle_nodes_cache: None,
            cycle_cache_built_at: 0,
        }
    }
}

pub(crate) struct EdgeData {
    pub(crate) uid: String,
    pub(crate) kind: EdgeKind,
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
    pub(crate) deleted: bool,
}

/// A directed graph with nodes and probability-carrying edges.
///
/// The topology of a `Graph` is frozen: it can only be put together through a
/// [`GraphBuilder`]. Afterwards the only mutation is marking members as
/// deleted and resetting those marks with [`Graph::unmark_deleted`].
///
/// The query methods take `&mut self` because they materialize and validate
/// caches in place; this is also what makes the single-threaded contract of
/// the engine explicit.
pub struct Graph {
    pub(crate) id: u32,
    pub(crate) nodes: Vec<NodeData>,
    pub(crate) edges: Vec<EdgeData>,
    pub(crate) node_ids: HashMap<String, NodeId>,
    pub(crate) edge_ids: HashMap<String, EdgeId>,
    pub(crate) deleted_nodes: NodeSet,
    pub(crate) deleted_edges: EdgeSet,
    // Cache epochs, one per direction. Bumped whenever a live-projection
    // mutation may invalidate recursive caches; the caches compare their own
    // levels against these for O(1) validity checks.
    pub(crate) incoming_cache_level: u64,
    pub(crate) outgoing_cache_level: u64,
}

/// Assembles the nodes and edges of a [`Graph`] and freezes them.
///
/// The builder is consumed by [`GraphBuilder::finish`], which validates that
/// no edge has a zero probability and hands out the frozen graph. There is no
/// way to grow a graph after that.
pub struct GraphBuilder {
    graph: Graph,
}

impl GraphBuilder {
    pub fn new() -> GraphBuilder {
        GraphBuilder {
            graph: Graph {
                id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
                nodes: Vec::new(),
                edges: Vec::new(),
                node_ids: HashMap::new(),
                edge_ids: HashMap::new(),
                deleted_nodes: NodeSet::new(),
                deleted_edges: EdgeSet::new(),
                incoming_cache_level: 0,
                outgoing_cache_level: 0,
            },
        }
    }

    fn insert_node(&mut self, uid: String, keep: bool) -> Result<NodeId, GraphError> {
        if self.graph.node_ids.contains_key(&uid) {
            return Err(GraphError::MemberAlreadyRegistered(uid));
        }
        let id = NodeId::new(self.graph.id, self.graph.nodes.len());
        self.graph.node_ids.insert(uid.clone(), id);
        self.graph.nodes.push(NodeData::new(uid, keep));
        Ok(id)
    }

    /// Adds a node. Fails if the uid is already registered.
    pub fn add_node(&mut self, uid: impl Into<String>) -> Result<NodeId, GraphError> {
        self.insert_node(uid.into(), false)
    }

    /// Adds a *keep* node: a node that must stay a leaf (no incoming edges)
    /// and can never be marked as deleted, not even through a delete cascade.
    pub fn add_keep_node(&mut self, uid: impl Into<String>) -> Result<NodeId, GraphError> {
        self.insert_node(uid.into(), true)
    }

    /// Adds a node unless one with the same uid is already registered.
    ///
    /// Returns the handle of the node with this uid and whether it already
    /// existed (dedup).
    pub fn add_node_dedup(&mut self, uid: impl Into<String>) -> (NodeId, bool) {
        let uid = uid.into();
        match self.graph.node_ids.get(&uid) {
            Some(&id) => (id, true),
            None => {
                let id = NodeId::new(self.graph.id, self.graph.nodes.len());
                self.graph.node_ids.insert(uid.clone(), id);
                self.graph.nodes.push(NodeData::new(uid, false));
                (id, false)
            }
        }
    }

    /// Looks up an already-registered node by uid.
    pub fn node_by_uid(&self, uid: &str) -> Option<NodeId> {
        self.graph.node_ids.get(uid).copied()
    }

    /// Adds a directed edge with the default `"<from> --> <to>"` uid.
    pub fn add_edge(
        &mut self,
        kind: EdgeKind,
        from: NodeId,
        to: NodeId,
    ) -> Result<EdgeId, GraphError> {
        self.graph.check_node(from)?;
        self.graph.check_node(to)?;
        let uid = format!(
            "{} --> {}",
            self.graph.nodes[from.idx()].uid,
            self.graph.nodes[to.idx()].uid
        );
        self.add_edge_with_uid(kind, from, to, uid)
    }

    /// Adds a directed edge with a caller-supplied uid.
    ///
    /// The uid should be derived from the endpoints plus whatever
    /// discriminator distinguishes parallel edges (for dependency edges this
    /// is the dependency type and raw string).
    pub fn add_edge_with_uid(
        &mut self,
        kind: EdgeKind,
        from: NodeId,
        to: NodeId,
        uid: impl Into<String>,
    ) -> Result<EdgeId, GraphError> {
        let uid = uid.into();
        self.graph.check_node(from)?;
        self.graph.check_node(to)?;
        if self.graph.nodes[to.idx()].keep {
            return Err(GraphError::KeepNodeMustBeLeaf(
                self.graph.nodes[to.idx()].uid.clone(),
            ));
        }
        if self.graph.edge_ids.contains_key(&uid) {
            return Err(GraphError::MemberAlreadyRegistered(uid));
        }

        // The outgoing edges of a node must all be of the same flavor.
        let or = kind == EdgeKind::Or;
        match self.graph.nodes[from.idx()].outgoing_or_edges {
            None => self.graph.nodes[from.idx()].outgoing_or_edges = Some(or),
            Some(true) if !or => return Err(GraphError::NotAnOrEdge(uid)),
            Some(false) if or => return Err(GraphError::NotAnEdge(uid)),
            Some(_) => {}
        }

        let id = EdgeId::new(self.graph.id, self.graph.edges.len());
        self.graph.edge_ids.insert(uid.clone(), id);
        self.graph.edges.push(EdgeData {
            uid,
            kind,
            from,
            to,
            deleted: false,
        });
        self.graph.nodes[from.idx()].outgoing_edges.push(id);
        self.graph.nodes[from.idx()].outgoing_nodes.insert(to);
        self.graph.nodes[to.idx()].incoming_edges.push(id);
        self.graph.nodes[to.idx()].incoming_nodes.insert(from);
        Ok(id)
    }

    /// Validates the graph and freezes it.
    pub fn finish(self) -> Result<Graph, GraphError> {
        let graph = self.graph;
        for edge in &graph.edges {
            // At freeze time nothing is deleted, so an or-edge's probability
            // is one over the number of its from-node's outgoing edges.
            let probability = match edge.kind {
                EdgeKind::Mandatory => 1.0,
                EdgeKind::Or => 1.0 / graph.nodes[edge.from.idx()].outgoing_edges.len() as f64,
            };
            if probability.abs() < EPSILON {
                return Err(GraphError::EdgeWithZeroProbability(edge.uid.clone()));
            }
        }
        Ok(graph)
    }
}

impl Default for GraphBuilder {
    fn default() -> GraphBuilder {
        GraphBuilder::new()
    }
}

impl Graph {
    /// Returns the nodes of the graph, excluding the ones marked as deleted.
    pub fn nodes(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(|i| NodeId::new(self.id, i))
            .filter(|n| !self.nodes[n.idx()].deleted)
            .collect()
    }

    /// Returns the edges of the graph, excluding the ones marked as deleted.
    pub fn edges(&self) -> Vec<EdgeId> {
        (0..self.edges.len())
            .map(|i| EdgeId::new(self.id, i))
            .filter(|e| !self.edges[e.idx()].deleted)
            .collect()
    }

    /// Returns the set of nodes marked as deleted.
    pub fn deleted_nodes(&self) -> &NodeSet {
        &self.deleted_nodes
    }

    /// Returns the set of edges marked as deleted.
    pub fn deleted_edges(&self) -> &EdgeSet {
        &self.deleted_edges
    }

    /// Looks up a node by uid.
    pub fn node_by_uid(&self, uid: &str) -> Option<NodeId> {
        self.node_ids.get(uid).copied()
    }

    /// Looks up an edge by uid.
    pub fn edge_by_uid(&self, uid: &str) -> Option<EdgeId> {
        self.edge_ids.get(uid).copied()
    }

    /// Returns the uid of a node.
    ///
    /// # Panics
    /// Panics if the handle was minted by another graph.
    pub fn node_uid(&self, n: NodeId) -> &str {
        &self.node_data(n).uid
    }

    /// Returns the uid of an edge.
    ///
    /// # Panics
    /// Panics if the handle was minted by another graph.
    pub fn edge_uid(&self, e: EdgeId) -> &str {
        &self.edge_data(e).uid
    }

    /// Returns the flavor of an edge.
    pub fn edge_kind(&self, e: EdgeId) -> EdgeKind {
        self.edge_data(e).kind
    }

    /// Returns the source and destination nodes of an edge.
    pub fn edge_endpoints(&self, e: EdgeId) -> (NodeId, NodeId) {
        let d = self.edge_data(e);
        (d.from, d.to)
    }

    /// Returns true if the node has been marked as deleted.
    pub fn is_node_deleted(&self, n: NodeId) -> bool {
        self.node_data(n).deleted
    }

    /// Returns true if the edge has been marked as deleted.
    pub fn is_edge_deleted(&self, e: EdgeId) -> bool {
        self.edge_data(e).deleted
    }

    pub(crate) fn check_node(&self, n: NodeId) -> Result<(), GraphError> {
        if n.graph() == self.id {
            Ok(())
        } else {
            Err(GraphError::NotMemberOfGraph(format!(
                "node #{} of graph #{}",
                n.idx(),
                n.graph()
            )))
        }
    }

    pub(crate) fn check_edge(&self, e: EdgeId) -> Result<(), GraphError> {
        if e.graph() == self.id {
            Ok(())
        } else {
            Err(GraphError::NotMemberOfGraph(format!(
                "edge #{} of graph #{}",
                e.idx(),
                e.graph()
            )))
        }
    }

    pub(crate) fn node_data(&self, n: NodeId) -> &NodeData {
        debug_assert_eq!(n.graph(), self.id);
        &self.nodes[n.idx()]
    }

    pub(crate) fn edge_data(&self, e: EdgeId) -> &EdgeData {
        debug_assert_eq!(e.graph(), self.id);
        &self.edges[e.idx()]
    }

    pub(crate) fn node_deleted_error(&self, n: NodeId) -> GraphError {
        GraphError::DeletedMemberInUse(self.nodes[n.idx()].uid.clone())
    }

    /// Returns the leafs of the graph.
    ///
    /// The graph can contain leaf nodes and leaf cycles. Leaf nodes are nodes
    /// without incoming edges. Leaf cycles are cycles without incoming edges
    /// other than the ones needed to form the cycle.
    ///
    /// The return value is a list of node sets: a single node for a leaf
    /// node, multiple nodes for a leaf cycle.
    pub fn leafs(&mut self) -> Result<Vec<NodeSet>, GraphError> {
        let all: Vec<NodeId> = (0..self.nodes.len())
            .map(|i| NodeId::new(self.id, i))
            .collect();
        let mut stage1: NodeSet = all.iter().copied().collect();
        let mut stage2 = NodeSet::new();
        let mut stage3 = NodeSet::new();
        let mut leafs = Vec::new();

        // Stage 1 - identify single leaf nodes. A leaf node has no incoming
        // edges, so it also can't be in a cycle.
        for &n in &all {
            if !stage1.remove(&n) {
                continue;
            }
            if self.nodes[n.idx()].deleted {
                continue;
            }
            if !self.live_incoming_edges(n).is_empty() {
                // Not a leaf node, but potentially part of a leaf cycle.
                stage2.insert(n);
                continue;
            }
            leafs.push(std::iter::once(n).collect());

            // Nothing below a leaf node can be a leaf node or leaf cycle.
            let onrs = self.outgoing_nodes_recursive(n)?;
            for m in onrs.iter() {
                stage1.remove(m);
                stage2.remove(m);
            }
        }

        // Stage 2 - determine which nodes could be part of a leaf cycle.
        loop {
            let n = match stage2.iter().next() {
                Some(&n) => n,
                None => break,
            };
            stage2.remove(&n);

            let onrs = self.outgoing_nodes_recursive(n)?;
            if self.in_cycle(n)? {
                // One node is enough to track the whole cycle; nothing below
                // the cycle can be a leaf node or leaf cycle.
                for m in onrs.iter() {
                    stage2.remove(m);
                    stage3.remove(m);
                }
                stage3.insert(n);
            } else {
                // Neither this node nor anything below it can be a leaf.
                for m in onrs.iter() {
                    stage2.remove(m);
                    stage3.remove(m);
                }
            }
        }

        // Stage 3 - all surviving candidates represent leaf cycles.
        let stage3: Vec<NodeId> = stage3.into_iter().collect();
        for n in stage3 {
            leafs.push((*self.cycle_nodes(n)?).clone());
        }
        Ok(leafs)
    }

    /// Returns the leafs of the graph in a single flattened set.
    pub fn leafs_flat(&mut self) -> Result<NodeSet, GraphError> {
        let mut flat = NodeSet::new();
        for leaf in self.leafs()? {
            flat.extend(leaf);
        }
        Ok(flat)
    }

    /// Marks the given nodes as deleted.
    pub fn mark_members_deleted(&mut self, members: &[NodeId]) -> Result<(), GraphError> {
        for &m in members {
            self.check_node(m)?;
            self.mark_node_deleted(m)?;
        }
        Ok(())
    }

    /// Marks the given nodes and everything they obsolete as deleted.
    ///
    /// A node is obsolete if all of its incoming nodes have been marked as
    /// deleted. Cycles are treated as a single member: a cycle is obsolete if
    /// all incoming nodes external to the cycle have been marked as deleted.
    ///
    /// Example:
    ///
    /// ```text
    /// n1 --\
    /// n2 --> n4 --\
    /// n3 ---------> n5
    /// ```
    ///
    /// Marking n1 and n2 as deleted also marks n4 as deleted, as n4 was only
    /// needed by n1 and n2. n5 survives because n3 still needs it.
    pub fn mark_members_including_obsolete_deleted(
        &mut self,
        members: &[NodeId],
    ) -> Result<(), GraphError> {
        for &m in members {
            self.check_node(m)?;
        }

        let mut to_process: NodeSet = members.iter().copied().collect();
        let mut prev_deleted = self.deleted_nodes.clone();
        while !to_process.is_empty() {
            for &m in &to_process {
                self.mark_node_deleted(m)?;
            }

            // The nodes marked as deleted in this round; the cascade can have
            // deleted more than the processed set itself.
            let all_deleted = self.deleted_nodes.clone();
            let round_deleted: Vec<NodeId> =
                all_deleted.difference(&prev_deleted).copied().collect();
            prev_deleted = all_deleted.clone();

            // Everything directly below this round's deletions is an
            // obsolescence candidate. The raw sets are used as the round's
            // nodes are already marked as deleted.
            let mut candidates = NodeSet::new();
            for &n in &round_deleted {
                candidates.extend(self.nodes[n.idx()].outgoing_nodes.iter().copied());
            }

            to_process = NodeSet::new();
            let mut worklist: Vec<NodeId> = candidates.iter().copied().collect();
            while let Some(n) = worklist.pop() {
                if !candidates.remove(&n) {
                    continue; // Handled as part of a cycle.
                }
                if self.nodes[n.idx()].deleted {
                    continue;
                }
                if self.in_cycle(n)? {
                    // Process the whole cycle as a single member.
                    let cycle = self.cycle_nodes(n)?;
                    for m in cycle.iter() {
                        candidates.remove(m);
                    }
                    let incoming = self.incoming_cycle_nodes(n)?;
                    if incoming.iter().any(|m| !all_deleted.contains(m)) {
                        continue; // Cycle is still needed.
                    }
                    to_process.extend(cycle.iter().copied());
                } else {
                    let needed = self.nodes[n.idx()]
                        .incoming_nodes
                        .iter()
                        .any(|m| !all_deleted.contains(m));
                    if needed {
                        continue; // Node is still needed.
                    }
                    to_process.insert(n);
                }
            }
        }
        Ok(())
    }

    /// Unmarks all graph members as deleted, returning the graph to its
    /// pristine post-freeze state.
    ///
    /// Static caches survive this; default and dynamic caches are forced to
    /// revalidate against the bumped cache levels.
    pub fn unmark_deleted(&mut self) {
        // Signal the recursive-reachability caches that their results might
        // be invalid and need to be rechecked.
        self.incoming_cache_level += 1;
        let graph_in_cl = self.incoming_cache_level;
        self.outgoing_cache_level += 1;
        let graph_out_cl = self.outgoing_cache_level;

        let deleted_nodes = std::mem::take(&mut self.deleted_nodes);
        for n in deleted_nodes {
            self.nodes[n.idx()].deleted = false;
        }

        let deleted_edges = std::mem::take(&mut self.deleted_edges);
        for e in deleted_edges {
            self.edges[e.idx()].deleted = false;
            let (from, to) = (self.edges[e.idx()].from, self.edges[e.idx()].to);

            // If the live projections of the endpoints have been touched,
            // throw them away so they are rebuilt lazily, and mark the
            // recursive caches as potentially invalid.
            let td = &mut self.nodes[to.idx()];
            if td.incoming_touched {
                td.incoming_touched = false;
                td.incoming_edges_live = None;
                td.incoming_nodes_live = None;
                td.incoming_invalidated_at = graph_in_cl;
            }
            let fd = &mut self.nodes[from.idx()];
            if fd.outgoing_touched {
                fd.outgoing_touched = false;
                fd.outgoing_edges_live = None;
                fd.outgoing_nodes_live = None;
                fd.outgoing_invalidated_at = graph_out_cl;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::error::GraphError;
    use crate::tests::{arb_graph, brute_closure, graph};
    use crate::{EdgeKind, Graph, GraphBuilder, NodeId, NodeSet};

    fn set(ids: &[NodeId]) -> NodeSet {
        ids.iter().copied().collect()
    }

    fn sorted_leafs(g: &mut Graph) -> Vec<Vec<String>> {
        let mut leafs: Vec<Vec<String>> = g
            .leafs()
            .unwrap()
            .into_iter()
            .map(|leaf| {
                let mut uids: Vec<String> =
                    leaf.iter().map(|&n| g.node_uid(n).to_owned()).collect();
                uids.sort();
                uids
            })
            .collect();
        leafs.sort();
        leafs
    }

    #[test]
    fn duplicate_node_uid_is_rejected() {
        let mut builder = GraphBuilder::new();
        builder.add_node("test").unwrap();
        assert!(matches!(
            builder.add_node("test"),
            Err(GraphError::MemberAlreadyRegistered(_))
        ));
    }

    #[test]
    fn duplicate_edge_uid_is_rejected() {
        let mut builder = GraphBuilder::new();
        let n1 = builder.add_node("n1").unwrap();
        let n2 = builder.add_node("n2").unwrap();
        builder.add_edge(EdgeKind::Mandatory, n1, n2).unwrap();
        assert!(matches!(
            builder.add_edge(EdgeKind::Mandatory, n1, n2),
            Err(GraphError::MemberAlreadyRegistered(_))
        ));
    }

    #[test]
    fn add_node_dedup() {
        let mut builder = GraphBuilder::new();
        let (n1, dup) = builder.add_node_dedup("test");
        assert!(!dup);
        let (n2, dup) = builder.add_node_dedup("test");
        assert!(dup);
        assert_eq!(n1, n2);
    }

    #[test]
    fn mixed_outgoing_edge_flavors_are_rejected() {
        let mut builder = GraphBuilder::new();
        let n1 = builder.add_node("n1").unwrap();
        let n2 = builder.add_node("n2").unwrap();
        let n3 = builder.add_node("n3").unwrap();

        builder.add_edge(EdgeKind::Or, n1, n2).unwrap();
        assert!(matches!(
            builder.add_edge(EdgeKind::Mandatory, n1, n3),
            Err(GraphError::NotAnOrEdge(_))
        ));

        builder.add_edge(EdgeKind::Mandatory, n2, n3).unwrap();
        assert!(matches!(
            builder.add_edge(EdgeKind::Or, n2, n1),
            Err(GraphError::NotAnEdge(_))
        ));
    }

    #[test]
    fn foreign_nodes_are_rejected() {
        let mut other = GraphBuilder::new();
        let foreign = other.add_node("foreign").unwrap();

        let mut builder = GraphBuilder::new();
        let n1 = builder.add_node("n1").unwrap();
        assert!(matches!(
            builder.add_edge(EdgeKind::Mandatory, n1, foreign),
            Err(GraphError::NotMemberOfGraph(_))
        ));

        let (mut g, _) = graph("0-1");
        assert!(matches!(
            g.mark_members_deleted(&[foreign]),
            Err(GraphError::NotMemberOfGraph(_))
        ));
        assert!(matches!(
            g.mark_members_including_obsolete_deleted(&[foreign]),
            Err(GraphError::NotMemberOfGraph(_))
        ));
    }

    #[test]
    fn keep_nodes_must_stay_leafs() {
        let mut builder = GraphBuilder::new();
        let keep = builder.add_keep_node("!!KEEP!!").unwrap();
        let n1 = builder.add_node("n1").unwrap();
        builder.add_edge(EdgeKind::Mandatory, keep, n1).unwrap();
        assert!(matches!(
            builder.add_edge(EdgeKind::Mandatory, n1, keep),
            Err(GraphError::KeepNodeMustBeLeaf(_))
        ));
    }

    #[test]
    fn keep_nodes_can_not_be_marked_deleted() {
        let mut builder = GraphBuilder::new();
        let keep = builder.add_keep_node("!!KEEP!!").unwrap();
        let n1 = builder.add_node("n1").unwrap();
        let n2 = builder.add_node("n2").unwrap();
        builder.add_edge(EdgeKind::Mandatory, keep, n2).unwrap();
        builder.add_edge(EdgeKind::Mandatory, n1, n2).unwrap();
        let mut g = builder.finish().unwrap();

        // Directly.
        assert!(matches!(
            g.mark_node_deleted(keep),
            Err(GraphError::KeepNodeCanNotBeMarkedDeleted(_))
        ));
        // Indirectly, through the delete cascade.
        assert!(matches!(
            g.mark_node_deleted(n2),
            Err(GraphError::KeepNodeCanNotBeMarkedDeleted(_))
        ));
        assert!(!g.is_node_deleted(keep));

        // Nodes that don't need to be kept can still be marked as deleted.
        g.mark_node_deleted(n1).unwrap();
        assert!(g.is_node_deleted(n1));
    }

    // n0 -> n1 -> n2 -> n0 entangled with n2 <-> n3 <-> n4: one cycle that
    // spans all five nodes and is the only leaf.
    #[test]
    fn entangled_cycles_are_one_leaf() {
        let (mut g, ids) = graph("0-1, 1-2, 2-0, 2-3, 3-2, 3-4, 4-3");
        assert_eq!(
            sorted_leafs(&mut g),
            vec![vec!["n0", "n1", "n2", "n3", "n4"]]
        );

        // Deleting any member deletes every member.
        g.mark_node_deleted(ids[3]).unwrap();
        assert!(g.nodes().is_empty());
        assert!(g.edges().is_empty());
    }

    #[test]
    fn leafs_of_a_diamond() {
        let (mut g, _) = graph("0-1, 0-2, 1-3, 2-3");
        assert_eq!(sorted_leafs(&mut g), vec![vec!["n0"]]);
    }

    #[test]
    fn leafs_with_deleted_members() {
        let (mut g, ids) = graph("0-2, 1-2, 2-3");
        assert_eq!(sorted_leafs(&mut g), vec![vec!["n0"], vec!["n1"]]);

        g.mark_node_deleted(ids[0]).unwrap();
        assert_eq!(sorted_leafs(&mut g), vec![vec!["n1"]]);
    }

    #[test]
    fn leaf_cycle_with_external_incoming_edges_is_not_a_leaf() {
        // The n2 <-> n3 cycle hangs below the leaf node n0.
        let (mut g, _) = graph("0-1, 1-2, 2-3, 3-2");
        assert_eq!(sorted_leafs(&mut g), vec![vec!["n0"]]);
    }

    // The obsolete example:
    //
    // n0 --\
    // n1 --> n3 --\
    // n2 ---------> n4
    #[test]
    fn obsolete_nodes_are_deleted_with_their_reasons() {
        let (mut g, ids) = graph("0-3, 1-3, 2-4, 3-4");
        g.mark_members_including_obsolete_deleted(&[ids[0], ids[1]])
            .unwrap();
        assert_eq!(g.deleted_nodes(), &set(&[ids[0], ids[1], ids[3]]));
        assert!(!g.is_node_deleted(ids[2]));
        assert!(!g.is_node_deleted(ids[4]));
    }

    #[test]
    fn obsolete_cycles_are_deleted_as_one_member() {
        // A cycle held up only by n0, with n3 below it.
        let (mut g, ids) = graph("0-1, 1-2, 2-1, 2-3");
        g.mark_members_including_obsolete_deleted(&[ids[0]]).unwrap();
        assert_eq!(g.deleted_nodes(), &set(&[ids[0], ids[1], ids[2], ids[3]]));
    }

    #[test]
    fn cycles_with_live_external_incoming_edges_survive() {
        let (mut g, ids) = graph("0-1, 1-2, 2-1, 4-1");
        g.mark_members_including_obsolete_deleted(&[ids[0]]).unwrap();
        assert_eq!(g.deleted_nodes(), &set(&[ids[0]]));
    }

    #[test]
    fn unmark_deleted_restores_the_pristine_state() {
        let (mut g, ids) = graph("0-1, 1|2, 1|3, 2-4, 3-4");
        let all_nodes = g.nodes();
        let all_edges = g.edges();

        g.mark_members_including_obsolete_deleted(&[ids[0]]).unwrap();
        assert!(!g.deleted_nodes().is_empty());

        g.unmark_deleted();
        assert!(g.deleted_nodes().is_empty());
        assert!(g.deleted_edges().is_empty());
        assert_eq!(g.nodes(), all_nodes);
        assert_eq!(g.edges(), all_edges);

        // The live views match the raw views again.
        for &n in &ids {
            assert_eq!(&g.incoming_nodes(n).unwrap(), g.incoming_nodes_raw(n));
            assert_eq!(&g.outgoing_nodes(n).unwrap(), g.outgoing_nodes_raw(n));
        }

        // Unmarking twice is fine.
        g.unmark_deleted();
        assert!(g.deleted_nodes().is_empty());
    }

    proptest! {
        // A node is in its incoming closure exactly if it is in its outgoing
        // closure: both mean "part of a cycle".
        #[test]
        fn cycle_symmetry_proptest(ref arb in arb_graph()) {
            let (mut g, ids) = arb.build();
            for &n in &ids {
                let i = g.incoming_nodes_recursive(n).unwrap().contains(&n);
                let o = g.outgoing_nodes_recursive(n).unwrap().contains(&n);
                prop_assert_eq!(i, o);
                prop_assert_eq!(g.in_cycle(n).unwrap(), o);
            }
        }

        // The cached reachability always matches a from-scratch traversal of
        // the live adjacency, across deletions and resets.
        #[test]
        fn closures_match_brute_force_proptest(
            ref arb in arb_graph(),
            delete in proptest::collection::vec(0usize..12, 0..4),
        ) {
            let (mut g, ids) = arb.build();
            for &n in &ids {
                let cached = g.outgoing_nodes_recursive(n).unwrap();
                let brute = brute_closure(&mut g, n, true);
                prop_assert_eq!(&*cached, &brute);
            }
            for i in delete {
                let n = ids[i % ids.len()];
                if !g.is_node_deleted(n) {
                    g.mark_node_deleted(n).unwrap();
                }
            }
            for &n in &ids {
                if g.is_node_deleted(n) {
                    continue;
                }
                let cached = g.outgoing_nodes_recursive(n).unwrap();
                let brute = brute_closure(&mut g, n, true);
                prop_assert_eq!(&*cached, &brute);
                let cached = g.incoming_nodes_recursive(n).unwrap();
                let brute = brute_closure(&mut g, n, false);
                prop_assert_eq!(&*cached, &brute);
            }
            g.unmark_deleted();
            for &n in &ids {
                let cached = g.outgoing_nodes_recursive(n).unwrap();
                let brute = brute_closure(&mut g, n, true);
                prop_assert_eq!(&*cached, &brute);
            }
        }

        // Purging one leaf can never delete anything another leaf's purge
        // would also delete.
        #[test]
        fn leaf_purges_are_pairwise_disjoint(ref arb in arb_graph()) {
            let (mut g, _) = arb.build();
            let leafs = g.leafs().unwrap();
            let mut purges = Vec::new();
            for leaf in leafs {
                let members: Vec<NodeId> = leaf.into_iter().collect();
                g.mark_members_including_obsolete_deleted(&members).unwrap();
                purges.push(g.deleted_nodes().clone());
                g.unmark_deleted();
            }
            for (i, a) in purges.iter().enumerate() {
                for b in purges.iter().skip(i + 1) {
                    prop_assert!(a.is_disjoint(b));
                }
            }
        }

        // After an obsolete-inclusive purge no surviving node (or cycle) can
        // have all of its supporters deleted.
        #[test]
        fn no_residual_obsolete_nodes(
            ref arb in arb_graph(),
            purge in proptest::collection::vec(0usize..12, 1..4),
        ) {
            let (mut g, ids) = arb.build();
            let members: Vec<NodeId> = purge
                .into_iter()
                .map(|i| ids[i % ids.len()])
                .collect::<NodeSet>()
                .into_iter()
                .collect();
            g.mark_members_including_obsolete_deleted(&members).unwrap();
            for &n in &ids {
                if g.is_node_deleted(n) || g.incoming_nodes_raw(n).is_empty() {
                    continue;
                }
                let all_deleted = g
                    .incoming_nodes_raw(n)
                    .iter()
                    .all(|m| g.is_node_deleted(*m));
                prop_assert!(!all_deleted);
            }
        }

        // A mark/unmark round trip restores every live view to its raw view.
        #[test]
        fn unmark_round_trip_proptest(
            ref arb in arb_graph(),
            delete in proptest::collection::vec(0usize..12, 0..6),
        ) {
            let (mut g, ids) = arb.build();
            for i in delete {
                let n = ids[i % ids.len()];
                if !g.is_node_deleted(n) {
                    g.mark_node_deleted(n).unwrap();
                }
            }
            g.unmark_deleted();
            prop_assert!(g.deleted_nodes().is_empty());
            prop_assert!(g.deleted_edges().is_empty());
            for &n in &ids {
                let incoming = g.incoming_nodes(n).unwrap();
                prop_assert_eq!(&incoming, g.incoming_nodes_raw(n));
                let outgoing = g.outgoing_nodes(n).unwrap();
                prop_assert_eq!(&outgoing, g.outgoing_nodes_raw(n));
            }
        }
    }
}
