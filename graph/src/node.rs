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

//! Per-node queries: live adjacency projections, recursive reachability with
//! its tiered caches, and cycle membership.

use std::cmp::Reverse;
use std::rc::Rc;

use itertools::Itertools;

use crate::error::GraphError;
use crate::graph::Graph;
use crate::{EdgeId, EdgeSet, NodeId, NodeSet};

/// How reusable a cached recursive-reachability result is.
///
/// A *static* result is invariant under any deleted pattern: nothing on any
/// path below the node is an or-edge, so deletions either leave the closure
/// alone or delete the node itself. A *default* result is the result for the
/// pristine graph; it is valid as long as no node contributing to it has had
/// its live projection touched. A *dynamic* result is simply the most recent
/// result, revalidated through the built-at/invalidated-at levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum CacheTier {
    Static,
    Default,
    Dynamic,
}

impl Graph {
    pub(crate) fn live_incoming_edges(&mut self, n: NodeId) -> EdgeSet {
        let d = &mut self.nodes[n.idx()];
        match &d.incoming_edges_live {
            Some(s) => s.clone(),
            None => {
                let s: EdgeSet = d.incoming_edges.iter().copied().collect();
                d.incoming_edges_live = Some(s.clone());
                s
            }
        }
    }

    pub(crate) fn live_incoming_nodes(&mut self, n: NodeId) -> NodeSet {
        let d = &mut self.nodes[n.idx()];
        match &d.incoming_nodes_live {
            Some(s) => s.clone(),
            None => {
                let s = d.incoming_nodes.clone();
                d.incoming_nodes_live = Some(s.clone());
                s
            }
        }
    }

    pub(crate) fn live_outgoing_edges(&mut self, n: NodeId) -> EdgeSet {
        let d = &mut self.nodes[n.idx()];
        match &d.outgoing_edges_live {
            Some(s) => s.clone(),
            None => {
                let s: EdgeSet = d.outgoing_edges.iter().copied().collect();
                d.outgoing_edges_live = Some(s.clone());
                s
            }
        }
    }

    pub(crate) fn live_outgoing_nodes(&mut self, n: NodeId) -> NodeSet {
        let d = &mut self.nodes[n.idx()];
        match &d.outgoing_nodes_live {
            Some(s) => s.clone(),
            None => {
                let s = d.outgoing_nodes.clone();
                d.outgoing_nodes_live = Some(s.clone());
                s
            }
        }
    }

    fn check_live(&self, n: NodeId) -> Result<(), GraphError> {
        self.check_node(n)?;
        if self.nodes[n.idx()].deleted {
            return Err(self.node_deleted_error(n));
        }
        Ok(())
    }

    /// Returns the directly incoming edges, excluding deleted ones.
    pub fn incoming_edges(&mut self, n: NodeId) -> Result<EdgeSet, GraphError> {
        self.check_live(n)?;
        Ok(self.live_incoming_edges(n))
    }

    /// Returns the directly incoming nodes, excluding deleted ones.
    pub fn incoming_nodes(&mut self, n: NodeId) -> Result<NodeSet, GraphError> {
        self.check_live(n)?;
        Ok(self.live_incoming_nodes(n))
    }

    /// Returns the directly outgoing edges, excluding deleted ones.
    pub fn outgoing_edges(&mut self, n: NodeId) -> Result<EdgeSet, GraphError> {
        self.check_live(n)?;
        Ok(self.live_outgoing_edges(n))
    }

    /// Returns the directly outgoing nodes, excluding deleted ones.
    pub fn outgoing_nodes(&mut self, n: NodeId) -> Result<NodeSet, GraphError> {
        self.check_live(n)?;
        Ok(self.live_outgoing_nodes(n))
    }

    /// Returns the directly incoming edges of the frozen topology, including
    /// deleted ones.
    pub fn incoming_edges_raw(&self, n: NodeId) -> &[EdgeId] {
        &self.node_data(n).incoming_edges
    }

    /// Returns the directly incoming nodes of the frozen topology, including
    /// deleted ones.
    pub fn incoming_nodes_raw(&self, n: NodeId) -> &NodeSet {
        &self.node_data(n).incoming_nodes
    }

    /// Returns the directly outgoing edges of the frozen topology, including
    /// deleted ones.
    pub fn outgoing_edges_raw(&self, n: NodeId) -> &[EdgeId] {
        &self.node_data(n).outgoing_edges
    }

    /// Returns the directly outgoing nodes of the frozen topology, including
    /// deleted ones.
    pub fn outgoing_nodes_raw(&self, n: NodeId) -> &NodeSet {
        &self.node_data(n).outgoing_nodes
    }

    /// Returns the valid cached result for the outgoing closure of `n`, if
    /// any, together with its tier.
    fn outgoing_recursive_cached(
        &mut self,
        n: NodeId,
        graph_cl: u64,
    ) -> Option<(Rc<NodeSet>, CacheTier)> {
        let (cache, is_static, default, default_level, dynamic_level, self_built) = {
            let d = &self.nodes[n.idx()];
            (
                d.outgoing_recursive.clone(),
                d.outgoing_recursive_static,
                d.outgoing_default.clone(),
                d.outgoing_default_level,
                d.outgoing_recursive_level,
                d.outgoing_built_at,
            )
        };
        let cache = cache?;

        // A static result can be reused indefinitely.
        if is_static {
            return Some((cache, CacheTier::Static));
        }
        if let Some(ref default) = default {
            if default_level == graph_cl {
                return Some((default.clone(), CacheTier::Default));
            }
        }
        if dynamic_level == graph_cl {
            return Some((cache, CacheTier::Dynamic));
        }

        let outgoing = self.live_outgoing_nodes(n);

        // The default result is still valid if no live projection of this
        // node or of any node contributing to the result has been touched.
        if let Some(default) = default {
            let untouched = !self.nodes[n.idx()].outgoing_touched
                && outgoing.iter().all(|m| !self.nodes[m.idx()].outgoing_touched)
                && default.iter().all(|m| !self.nodes[m.idx()].outgoing_touched);
            if untouched {
                self.nodes[n.idx()].outgoing_default_level = graph_cl;
                return Some((default, CacheTier::Default));
            }
        }

        // The dynamic result is still valid if the cached result of every
        // contributing node is neither invalidated nor newer than ours.
        for m in std::iter::once(n)
            .chain(outgoing.iter().copied())
            .chain(cache.iter().copied())
        {
            let md = &self.nodes[m.idx()];
            if md.outgoing_recursive_static {
                // Static below; nothing under it can invalidate us.
                continue;
            }
            if md.outgoing_invalidated_at > md.outgoing_built_at
                || md.outgoing_built_at > self_built
            {
                return None;
            }
        }

        // Still valid. Update the local level to avoid reiterating this
        // check on the next probe.
        self.nodes[n.idx()].outgoing_recursive_level = graph_cl;
        Some((cache, CacheTier::Dynamic))
    }

    /// Computes the outgoing closure of `n`, caches it on the node and
    /// returns it together with the tier it was cached at.
    fn determine_outgoing_recursive(
        &mut self,
        n: NodeId,
        graph_cl: u64,
    ) -> (Rc<NodeSet>, CacheTier) {
        let mut to_visit = vec![n];
        let mut visited = NodeSet::new();
        let mut result = NodeSet::new();
        let mut is_static = true;
        let mut is_default = true;

        while let Some(node) = to_visit.pop() {
            if !visited.insert(node) {
                continue;
            }
            // Or-edges can break the closure apart, so their presence makes
            // the result non-static; a touched live projection means the
            // result differs from the pristine one.
            if is_static && self.nodes[node.idx()].outgoing_or_edges == Some(true) {
                is_static = false;
            }
            if is_default && self.nodes[node.idx()].outgoing_touched {
                is_default = false;
            }

            for child in self.live_outgoing_nodes(node) {
                result.insert(child);
                if visited.contains(&child) {
                    continue;
                }
                match self.outgoing_recursive_cached(child, graph_cl) {
                    None => to_visit.push(child),
                    Some((set, tier)) => {
                        if tier != CacheTier::Static {
                            is_static = false;
                        }
                        if tier == CacheTier::Dynamic {
                            is_default = false;
                        }
                        for m in set.iter() {
                            result.insert(*m);
                            visited.insert(*m);
                        }
                    }
                }
            }
        }

        let result = Rc::new(result);
        let d = &mut self.nodes[n.idx()];
        d.outgoing_recursive = Some(result.clone());
        d.outgoing_recursive_static = is_static;
        if is_static {
            return (result, CacheTier::Static);
        }
        if is_default {
            d.outgoing_default = Some(result.clone());
            d.outgoing_default_level = graph_cl;
            return (result, CacheTier::Default);
        }
        d.outgoing_recursive_level = graph_cl;
        d.outgoing_built_at = graph_cl;
        (result, CacheTier::Dynamic)
    }

    pub(crate) fn outgoing_nodes_recursive_with_tier(
        &mut self,
        n: NodeId,
    ) -> (Rc<NodeSet>, CacheTier) {
        let graph_cl = self.outgoing_cache_level;

        // Stage 1 - identify the nodes below `n` whose closure isn't cached,
        // together with their distance from `n`.
        let mut to_visit = vec![(n, 0u64)];
        let mut visited = NodeSet::new();
        let mut missing = Vec::new();
        let mut last = None;
        while let Some((node, distance)) = to_visit.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(hit) = self.outgoing_recursive_cached(node, graph_cl) {
                // The node and everything below it are covered by the cache.
                last = Some(hit);
                continue;
            }
            missing.push((node, distance));
            for child in self.live_outgoing_nodes(node) {
                to_visit.push((child, distance + 1));
            }
        }

        // Stage 2 - compute the missing closures deepest-first so that each
        // node can reuse the results just cached below it. `n` itself is the
        // only node at distance 0 and therefore comes last.
        for (node, _) in missing
            .into_iter()
            .sorted_by_key(|&(node, distance)| (Reverse(distance), node))
        {
            last = Some(self.determine_outgoing_recursive(node, graph_cl));
        }

        // The unwrap is ok here: `n` either had a valid cache (stage 1 sets
        // `last`) or was recorded as missing and recomputed in stage 2.
        last.unwrap()
    }

    /// Returns the set of all directly and indirectly outgoing nodes,
    /// excluding deleted ones.
    ///
    /// If the set includes `n` itself then `n` is part of a cycle.
    ///
    /// This direction has the superior caching (three tiers, invalidated far
    /// less often than the incoming one) and should be preferred over
    /// [`Graph::incoming_nodes_recursive`] where either works.
    pub fn outgoing_nodes_recursive(&mut self, n: NodeId) -> Result<Rc<NodeSet>, GraphError> {
        self.check_live(n)?;
        Ok(self.outgoing_nodes_recursive_with_tier(n).0)
    }

    /// Returns the valid cached result for the incoming closure of `n`, if
    /// any.
    fn incoming_recursive_cached(&mut self, n: NodeId, graph_cl: u64) -> Option<Rc<NodeSet>> {
        let (cache, level) = {
            let d = &self.nodes[n.idx()];
            (d.incoming_recursive.clone(), d.incoming_recursive_level)
        };
        let cache = cache?;
        if level == graph_cl {
            return Some(cache);
        }

        // Check whether the cached result of this node and of every node that
        // contributed to it is still valid.
        for m in cache.iter().copied().chain(std::iter::once(n)) {
            let md = &self.nodes[m.idx()];
            if md.incoming_invalidated_at > md.incoming_built_at {
                return None;
            }
        }

        self.nodes[n.idx()].incoming_recursive_level = graph_cl;
        Some(cache)
    }

    fn determine_incoming_recursive(&mut self, n: NodeId, graph_cl: u64) -> Rc<NodeSet> {
        let mut to_visit = vec![n];
        let mut visited = NodeSet::new();
        let mut result = NodeSet::new();
        while let Some(node) = to_visit.pop() {
            if !visited.insert(node) {
                continue;
            }
            for child in self.live_incoming_nodes(node) {
                result.insert(child);
                if visited.contains(&child) {
                    continue;
                }
                match self.incoming_recursive_cached(child, graph_cl) {
                    None => to_visit.push(child),
                    Some(set) => {
                        for m in set.iter() {
                            result.insert(*m);
                            visited.insert(*m);
                        }
                    }
                }
            }
        }

        let result = Rc::new(result);
        let d = &mut self.nodes[n.idx()];
        d.incoming_recursive = Some(result.clone());
        d.incoming_recursive_level = graph_cl;
        d.incoming_built_at = graph_cl;
        result
    }

    /// Returns the set of all directly and indirectly incoming nodes,
    /// excluding deleted ones.
    ///
    /// If the set includes `n` itself then `n` is part of a cycle.
    pub fn incoming_nodes_recursive(&mut self, n: NodeId) -> Result<Rc<NodeSet>, GraphError> {
        self.check_live(n)?;
        let graph_cl = self.incoming_cache_level;

        let mut to_visit = vec![(n, 0u64)];
        let mut visited = NodeSet::new();
        let mut missing = Vec::new();
        let mut last = None;
        while let Some((node, distance)) = to_visit.pop() {
            if !visited.insert(node) {
                continue;
            }
            if let Some(hit) = self.incoming_recursive_cached(node, graph_cl) {
                last = Some(hit);
                continue;
            }
            missing.push((node, distance));
            for child in self.live_incoming_nodes(node) {
                to_visit.push((child, distance + 1));
            }
        }

        for (node, _) in missing
            .into_iter()
            .sorted_by_key(|&(node, distance)| (Reverse(distance), node))
        {
            last = Some(self.determine_incoming_recursive(node, graph_cl));
        }

        // The unwrap is ok here: `n` either had a valid cache or was just
        // recomputed.
        Ok(last.unwrap())
    }

    /// Returns true if this node is part of a cycle.
    pub fn in_cycle(&mut self, n: NodeId) -> Result<bool, GraphError> {
        self.check_node(n)?;
        // A previously determined state-independent result short-circuits
        // everything else.
        if let Some(is_static) = self.nodes[n.idx()].in_cycle_static {
            return Ok(is_static);
        }

        let incoming = self.incoming_nodes(n)?;
        if incoming.is_empty() {
            // A leaf node can't be in a cycle.
            return Ok(false);
        }
        let outgoing = self.outgoing_nodes(n)?;
        let shared: Vec<NodeId> = outgoing.intersection(&incoming).copied().collect();
        if !shared.is_empty() {
            // The node forms a direct two-cycle with every shared node. The
            // result is even static if no or-edge is involved that could
            // break the cycle apart.
            if self.nodes[n.idx()].outgoing_or_edges != Some(true) {
                let is_static = shared
                    .iter()
                    .all(|m| self.nodes[m.idx()].outgoing_or_edges != Some(true));
                if is_static {
                    self.nodes[n.idx()].in_cycle_static = Some(true);
                    for &m in &shared {
                        self.nodes[m.idx()].in_cycle_static = Some(true);
                    }
                }
            }
            return Ok(true);
        }

        // No more simple tests possible; fall back to the recursive outgoing
        // nodes set (the incoming one would give the same answer, but with
        // worse caching).
        let (onrs, tier) = self.outgoing_nodes_recursive_with_tier(n);
        let in_cycle = onrs.contains(&n);
        if tier == CacheTier::Static {
            self.nodes[n.idx()].in_cycle_static = Some(in_cycle);
        } else if tier == CacheTier::Default && !in_cycle {
            // If the node isn't part of a cycle in the pristine graph then it
            // never will be.
            self.nodes[n.idx()].in_cycle_static = Some(false);
        }
        Ok(in_cycle)
    }

    /// Returns the set of nodes in the cycle this node is part of, or the
    /// empty set if it isn't part of one.
    pub fn cycle_nodes(&mut self, n: NodeId) -> Result<Rc<NodeSet>, GraphError> {
        self.check_node(n)?;
        if let Some(cycle) = self.nodes[n.idx()].cycle_nodes_static.clone() {
            return Ok(cycle);
        }
        let graph_cl = self.outgoing_cache_level;
        if let Some(cycle) = self.nodes[n.idx()].cycle_nodes_cache.clone() {
            if self.nodes[n.idx()].cycle_cache_built_at == graph_cl {
                return Ok(cycle);
            }
        }
        if self.nodes[n.idx()].deleted {
            return Err(self.node_deleted_error(n));
        }

        let (onrs, tier) = self.outgoing_nodes_recursive_with_tier(n);
        if !onrs.contains(&n) {
            return Ok(Rc::new(NodeSet::new())); // Not in a cycle.
        }

        // The cycle nodes are the nodes in both the incoming and outgoing
        // recursive sets. The incoming recursive set is typically not cached
        // and expensive, so instead walk the incoming nodes restricted to the
        // outgoing recursive set: that visits exactly the cycle.
        let mut to_visit = vec![n];
        let mut visited = NodeSet::new();
        let mut cycle = NodeSet::new();
        while let Some(node) = to_visit.pop() {
            if !visited.insert(node) {
                continue;
            }
            for m in self.incoming_nodes(node)? {
                if onrs.contains(&m) && cycle.insert(m) && !visited.contains(&m) {
                    to_visit.push(m);
                }
            }
        }
        let cycle = Rc::new(cycle);

        // The cycle is static if no member could lose an outgoing or-edge
        // that the cycle runs through.
        let is_static = tier == CacheTier::Static
            || cycle
                .iter()
                .all(|m| self.nodes[m.idx()].outgoing_or_edges != Some(true));
        if is_static {
            for m in cycle.iter() {
                self.nodes[m.idx()].in_cycle_static = Some(true);
                self.nodes[m.idx()].cycle_nodes_static = Some(cycle.clone());
            }
        }

        let d = &mut self.nodes[n.idx()];
        d.cycle_nodes_cache = Some(cycle.clone());
        d.cycle_cache_built_at = graph_cl;
        Ok(cycle)
    }

    /// Returns the incoming nodes of the cycle this node is part of, not
    /// including the cycle nodes themselves. Empty if the node isn't part of
    /// a cycle.
    pub fn incoming_cycle_nodes(&mut self, n: NodeId) -> Result<NodeSet, GraphError> {
        let cycle = self.cycle_nodes(n)?;
        let mut incoming = NodeSet::new();
        for m in cycle.iter() {
            incoming.extend(self.incoming_nodes(*m)?);
        }
        for m in cycle.iter() {
            incoming.remove(m);
        }
        Ok(incoming)
    }
}
