//! A directed graph with probabilities that models a hierarchy.
//!
//! Nodes and edges are built once, through a [`GraphBuilder`], and the
//! topology is frozen from then on.  The only mutation a frozen [`Graph`]
//! supports is marking members as *deleted* (and resetting those marks),
//! which is how package-removal semantics are modeled: deleting an edge whose
//! probability is 1.0 deletes the node above it, deleting a node deletes all
//! of its edges, and so on up the hierarchy.
//!
//! Edges come in two flavors.  A plain [`EdgeKind::Mandatory`] edge always
//! has probability 1.0.  An [`EdgeKind::Or`] edge shares its node's outgoing
//! slot with its sibling or-edges and has probability `1 / live siblings`;
//! the hierarchy is satisfied as long as any one of the siblings survives.
//! The two flavors can't be mixed within one node's outgoing edges.

use std::collections::HashSet;

mod edge;
pub mod error;
mod graph;
mod node;

pub use crate::{
    error::GraphError,
    graph::{Graph, GraphBuilder},
};

/// A sufficiently small epsilon to compare edge probabilities.
///
/// Note that this is not the machine epsilon as rounding errors can easily
/// exceed the machine epsilon.
pub const EPSILON: f64 = 1e-5;

/// The two flavors of a directed edge.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EdgeKind {
    /// A plain edge.  Its probability is always 1.0 and deleting it deletes
    /// the node it originates from.
    Mandatory,
    /// An edge in an or-relationship with the other outgoing edges of its
    /// node.  One can think of the or-relationship as a single edge with one
    /// from-node but multiple to-nodes.
    Or,
}

/// A handle to a node of a [`Graph`].
///
/// Handles are dense indices minted by the [`GraphBuilder`] and double as the
/// interned form of the node's uid: comparing two handles is an integer
/// compare.  A handle also records which graph minted it, so using it with
/// another graph fails with [`GraphError::NotMemberOfGraph`] instead of
/// silently aliasing.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId {
    graph: u32,
    idx: u32,
}

impl NodeId {
    pub(crate) fn new(graph: u32, idx: usize) -> NodeId {
        NodeId {
            graph,
            idx: idx as u32,
        }
    }

    pub(crate) fn graph(self) -> u32 {
        self.graph
    }

    pub(crate) fn idx(self) -> usize {
        self.idx as usize
    }
}

/// A handle to an edge of a [`Graph`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EdgeId {
    graph: u32,
    idx: u32,
}

impl EdgeId {
    pub(crate) fn new(graph: u32, idx: usize) -> EdgeId {
        EdgeId {
            graph,
            idx: idx as u32,
        }
    }

    pub(crate) fn graph(self) -> u32 {
        self.graph
    }

    pub(crate) fn idx(self) -> usize {
        self.idx as usize
    }
}

/// A set of node handles, as returned by the adjacency and reachability
/// queries.
pub type NodeSet = HashSet<NodeId>;

/// A set of edge handles.
pub type EdgeSet = HashSet<EdgeId>;
