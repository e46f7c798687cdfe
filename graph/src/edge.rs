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

//! Edge probabilities and the cascading delete that encodes the hierarchy.

use crate::error::GraphError;
use crate::graph::Graph;
use crate::{EPSILON, EdgeId, EdgeKind, NodeId};

impl Graph {
    /// Returns the probability of an edge.
    ///
    /// A mandatory edge always has probability 1.0. An or-edge has
    /// probability `1 / n` where `n` is the number of live outgoing edges of
    /// its from-node: each or-sibling is equally likely to be the one that
    /// satisfies the hierarchy.
    pub fn edge_probability(&mut self, e: EdgeId) -> Result<f64, GraphError> {
        self.check_edge(e)?;
        let d = &self.edges[e.idx()];
        if d.deleted {
            return Err(GraphError::DeletedMemberInUse(d.uid.clone()));
        }
        match d.kind {
            EdgeKind::Mandatory => Ok(1.0),
            EdgeKind::Or => {
                let from = d.from;
                // Division by zero is impossible: while this edge is live it
                // is itself in the live outgoing set.
                let siblings = self.live_outgoing_edges(from).len();
                Ok(1.0 / siblings as f64)
            }
        }
    }

    /// Marks the edge as deleted. This can also affect its from-node.
    ///
    /// The graph represents a hierarchy: the nodes above an edge are only
    /// held up by it. Deleting an edge with probability 1.0 therefore deletes
    /// its from-node as well, while deleting one of several live or-siblings
    /// leaves the from-node standing.
    ///
    /// Marking an already-deleted edge is a no-op.
    pub fn mark_edge_deleted(&mut self, e: EdgeId) -> Result<(), GraphError> {
        self.check_edge(e)?;
        if self.edges[e.idx()].deleted {
            return Ok(()); // Stop recursion.
        }

        // The probability has to be taken before the edge is marked: it is
        // defined by the live or-sibling count this edge still belongs to.
        let probability = self.edge_probability(e)?;
        let (from, to) = {
            let d = &self.edges[e.idx()];
            (d.from, d.to)
        };

        self.edges[e.idx()].deleted = true;
        self.deleted_edges.insert(e);

        // Update the incoming live projection of the to-node and flag it for
        // reset on `unmark_deleted`.
        {
            let td = &mut self.nodes[to.idx()];
            match &mut td.incoming_edges_live {
                Some(set) => {
                    set.remove(&e);
                }
                None => {
                    td.incoming_edges_live =
                        Some(td.incoming_edges.iter().copied().filter(|x| *x != e).collect());
                }
            }
            match &mut td.incoming_nodes_live {
                Some(set) => {
                    set.remove(&from);
                }
                None => {
                    let mut set = td.incoming_nodes.clone();
                    set.remove(&from);
                    td.incoming_nodes_live = Some(set);
                }
            }
            td.incoming_touched = true;
        }
        self.incoming_cache_level += 1;
        self.nodes[from.idx()].incoming_invalidated_at = self.incoming_cache_level;

        // The outgoing caches only change when an or-edge with live siblings
        // goes away. An edge with probability 1.0 takes its from-node (and
        // everything above) with it, so nothing that survives looks different
        // from below.
        if probability < 1.0 {
            let fd = &mut self.nodes[from.idx()];
            match &mut fd.outgoing_edges_live {
                Some(set) => {
                    set.remove(&e);
                }
                None => {
                    fd.outgoing_edges_live =
                        Some(fd.outgoing_edges.iter().copied().filter(|x| *x != e).collect());
                }
            }
            match &mut fd.outgoing_nodes_live {
                Some(set) => {
                    set.remove(&to);
                }
                None => {
                    let mut set = fd.outgoing_nodes.clone();
                    set.remove(&to);
                    fd.outgoing_nodes_live = Some(set);
                }
            }
            fd.outgoing_touched = true;
            self.outgoing_cache_level += 1;
            self.nodes[from.idx()].outgoing_invalidated_at = self.outgoing_cache_level;
        }

        // The hierarchy is violated if this was the last edge holding the
        // from-node up.
        if (probability - 1.0).abs() < EPSILON {
            self.mark_node_deleted(from)?;
        }
        Ok(())
    }

    /// Marks the node and all of its incoming and outgoing edges as deleted.
    ///
    /// Marking an already-deleted node is a no-op. Keep nodes can't be marked
    /// as deleted at all.
    pub fn mark_node_deleted(&mut self, n: NodeId) -> Result<(), GraphError> {
        self.check_node(n)?;
        if self.nodes[n.idx()].deleted {
            return Ok(()); // Stop recursion.
        }
        if self.nodes[n.idx()].keep {
            return Err(GraphError::KeepNodeCanNotBeMarkedDeleted(
                self.nodes[n.idx()].uid.clone(),
            ));
        }

        // Snapshot the live edge sets up front: edges can't exist without
        // their nodes, and deleting them can recursively shrink these very
        // sets. The node's own deleted flag is only set afterwards, which is
        // what terminates the recursion cleanly.
        let incoming: Vec<EdgeId> = self.live_incoming_edges(n).into_iter().collect();
        let outgoing: Vec<EdgeId> = self.live_outgoing_edges(n).into_iter().collect();
        for e in incoming {
            self.mark_edge_deleted(e)?;
        }
        for e in outgoing {
            self.mark_edge_deleted(e)?;
        }

        self.nodes[n.idx()].deleted = true;
        self.deleted_nodes.insert(n);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::GraphError;
    use crate::tests::graph;
    use crate::{EPSILON, NodeSet};

    fn assert_probability(p: f64, expected: f64) {
        assert!((p - expected).abs() < EPSILON, "{} != {}", p, expected);
    }

    #[test]
    fn mandatory_edge_probability() {
        let (mut g, _) = graph("0-1");
        let e = g.edge_by_uid("n0 --> n1").unwrap();
        assert_probability(g.edge_probability(e).unwrap(), 1.0);
    }

    #[test]
    fn or_edge_probabilities() {
        let (mut g, _) = graph("0|1, 0|2, 0|3");
        for to in 1..=3 {
            let e = g.edge_by_uid(&format!("n0 --> n{}", to)).unwrap();
            assert_probability(g.edge_probability(e).unwrap(), 1.0 / 3.0);
        }
    }

    #[test]
    fn surviving_or_edge_probability_is_one() {
        let (mut g, _) = graph("0|1, 0|2, 0|3");
        let e1 = g.edge_by_uid("n0 --> n1").unwrap();
        let e2 = g.edge_by_uid("n0 --> n2").unwrap();
        let e3 = g.edge_by_uid("n0 --> n3").unwrap();

        g.mark_edge_deleted(e1).unwrap();
        assert_probability(g.edge_probability(e2).unwrap(), 0.5);

        g.mark_edge_deleted(e2).unwrap();
        assert_probability(g.edge_probability(e3).unwrap(), 1.0);

        // The or-siblings still had alternatives when they were deleted, so
        // the from-node must still be alive.
        assert!(!g.is_node_deleted(g.node_by_uid("n0").unwrap()));
    }

    #[test]
    fn deleted_edge_probability_fails() {
        let (mut g, _) = graph("0-1");
        let e = g.edge_by_uid("n0 --> n1").unwrap();
        g.mark_edge_deleted(e).unwrap();
        assert!(matches!(
            g.edge_probability(e),
            Err(GraphError::DeletedMemberInUse(_))
        ));
    }

    #[test]
    fn deleting_a_mandatory_edge_deletes_the_node_above() {
        let (mut g, ids) = graph("0-1, 1-2");
        let e = g.edge_by_uid("n1 --> n2").unwrap();
        g.mark_edge_deleted(e).unwrap();

        // n1 was only held up by the deleted edge, and n0 by n1.
        assert!(g.is_node_deleted(ids[0]));
        assert!(g.is_node_deleted(ids[1]));
        assert!(!g.is_node_deleted(ids[2]));
        assert!(g.is_edge_deleted(g.edge_by_uid("n0 --> n1").unwrap()));
    }

    #[test]
    fn deleting_an_or_edge_with_live_siblings_spares_the_node() {
        let (mut g, ids) = graph("0|1, 0|2");
        let e = g.edge_by_uid("n0 --> n1").unwrap();
        g.mark_edge_deleted(e).unwrap();
        assert!(!g.is_node_deleted(ids[0]));

        // Deleting the last live sibling takes the node with it.
        let e = g.edge_by_uid("n0 --> n2").unwrap();
        g.mark_edge_deleted(e).unwrap();
        assert!(g.is_node_deleted(ids[0]));
    }

    #[test]
    fn deleting_a_node_deletes_its_edges() {
        let (mut g, ids) = graph("0-1, 1-2");
        g.mark_node_deleted(ids[1]).unwrap();
        assert!(g.is_edge_deleted(g.edge_by_uid("n0 --> n1").unwrap()));
        assert!(g.is_edge_deleted(g.edge_by_uid("n1 --> n2").unwrap()));
        assert!(g.is_node_deleted(ids[0]));
        assert!(g.is_node_deleted(ids[1]));
        // Nodes below survive; only their incoming edge is gone.
        assert!(!g.is_node_deleted(ids[2]));
    }

    #[test]
    fn mark_deleted_is_idempotent() {
        let (mut g, ids) = graph("0-1");
        g.mark_node_deleted(ids[0]).unwrap();
        let nodes = g.deleted_nodes().clone();
        let edges = g.deleted_edges().clone();
        g.mark_node_deleted(ids[0]).unwrap();
        g.mark_edge_deleted(g.edge_by_uid("n0 --> n1").unwrap()).unwrap();
        assert_eq!(&nodes, g.deleted_nodes());
        assert_eq!(&edges, g.deleted_edges());
    }

    #[test]
    fn deleting_a_two_cycle_terminates() {
        let (mut g, ids) = graph("0-1, 1-0");
        g.mark_node_deleted(ids[0]).unwrap();
        assert!(g.is_node_deleted(ids[0]));
        assert!(g.is_node_deleted(ids[1]));
        assert_eq!(g.edges().len(), 0);
    }

    #[test]
    fn breaking_an_or_cycle_layers_the_graph() {
        // n0 -> n1, and n1 holds alternatives back to n0 and on to n2.
        let (mut g, ids) = graph("0-1, 1|2, 1|0");
        let back = g.edge_by_uid("n1 --> n0").unwrap();
        g.mark_edge_deleted(back).unwrap();

        // The cycle is broken and the surviving alternative carries the full
        // probability.
        let on = g.edge_by_uid("n1 --> n2").unwrap();
        assert_probability(g.edge_probability(on).unwrap(), 1.0);
        assert!(!g.in_cycle(ids[0]).unwrap());

        // Peeling leafs off now dissects the graph into singleton layers.
        for expected in [ids[0], ids[1], ids[2]] {
            let mut layer = NodeSet::new();
            layer.insert(expected);
            assert_eq!(g.leafs_flat().unwrap(), layer);
            g.mark_node_deleted(expected).unwrap();
        }
        assert!(g.nodes().is_empty());
    }
}
