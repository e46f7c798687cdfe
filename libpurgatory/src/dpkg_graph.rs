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

//! The dpkg status database as a dependency graph.
//!
//! The graph is massively simplified compared to a full Apt graph. It only
//! contains what is relevant for purgatory, which is a representation of the
//! installed packages and the data needed to remove them:
//!
//! * Only installed packages, which allows collapsing a package and its
//!   installed version into a single *package node*.
//! * Only the PreDepends, Depends and Recommends dependency types.
//! * One *target versions node* per distinct set of installed packages that
//!   satisfies a dependency; dependencies that resolve to the same set share
//!   their node.
//!
//! A mandatory *dependency edge* connects a package node to the target
//! versions node of each of its dependencies; a *target edge* (an or-edge)
//! connects a target versions node to each package node that satisfies it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use purgatory_graph::{EdgeId, EdgeKind, Graph, GraphBuilder, NodeId};

use crate::error::Error;
use crate::status::{DEPENDENCY_TYPES, Dependency, Package, PackageCache};

// All keep nodes share this uid, which is an invalid package name according
// to the Debian policy manual, so it can never collide with a package node.
const KEEP_UID: &str = "!!KEEP!!";

/// Returns the graph uid of the package node for a package.
///
/// Fails if the package isn't installed: only installed packages become
/// nodes.
fn package_node_uid(pkg: &Package) -> Result<&str, Error> {
    if !pkg.installed || pkg.version.is_none() {
        return Err(Error::PackageNotInstalled(pkg.name.clone()));
    }
    Ok(&pkg.name)
}

/// Returns the graph uid of the target versions node for a dependency:
/// `"<p1|p2|…>"` over the sorted names of the installed packages satisfying
/// it.
///
/// Fails if no installed package satisfies the dependency.
fn target_versions_node_uid(dep: &Dependency) -> Result<String, Error> {
    if dep.installed_target_versions.is_empty() {
        return Err(Error::DependencyNotInstalled(dep.rawstr.clone()));
    }
    let names: BTreeSet<&str> = dep
        .installed_target_versions
        .iter()
        .map(|t| t.package.as_str())
        .collect();
    Ok(format!("<{}>", itertools::join(names, "|")))
}

/// Returns the graph uid of the dependency edge from a package node to the
/// target versions node of one of its dependencies.
///
/// Fails if the dependency type isn't supported. If this is ever relaxed the
/// edge flavor needs to be rethought: all three supported types are satisfied
/// by exactly one target versions node, which is what justifies a mandatory
/// edge with probability 1.0.
fn dependency_edge_uid(from_uid: &str, dep: &Dependency) -> Result<String, Error> {
    if !DEPENDENCY_TYPES.contains(&dep.rawtype.as_str()) {
        return Err(Error::UnsupportedDependencyType(
            dep.rawstr.clone(),
            dep.rawtype.clone(),
        ));
    }
    Ok(format!("{} --{}--> {}", from_uid, dep.rawtype, dep.rawstr))
}

/// A frozen graph of the installed packages of a dpkg status database.
pub struct DpkgGraph {
    graph: Graph,
    package_nodes: BTreeMap<String, NodeId>,
    target_versions_nodes: BTreeMap<String, NodeId>,
    dependency_edges: BTreeMap<String, EdgeId>,
    target_edges: BTreeMap<String, EdgeId>,
    versions: HashMap<NodeId, String>,
    keep_node: Option<NodeId>,
}

impl DpkgGraph {
    /// Builds the graph for a dpkg status database file.
    ///
    /// With `ignore_recommends` all dependencies of type Recommends are left
    /// out of the graph. The packages named in `keep` are protected: they get
    /// an incoming edge from a keep node that can never be deleted.
    pub fn from_status_db(
        dpkg_db: &Path,
        ignore_recommends: bool,
        keep: &[String],
    ) -> Result<DpkgGraph, Error> {
        let cache = PackageCache::open(dpkg_db)?;
        DpkgGraph::new(&cache, ignore_recommends, keep)
    }

    /// Builds the graph for an already-loaded package cache.
    pub fn new(
        cache: &PackageCache,
        ignore_recommends: bool,
        keep: &[String],
    ) -> Result<DpkgGraph, Error> {
        if cache.installed().next().is_none() {
            return Err(Error::EmptyPackageCache);
        }

        log::debug!("Initializing dpkg graph ...");
        let mut init = DpkgGraphInit::new();
        init.phase1(cache, ignore_recommends)?;
        init.phase2()?;
        init.keep(keep)?;
        let graph = init.finish()?;

        log::debug!("dpkg graph contains:");
        log::debug!("  Package nodes: {}", graph.package_nodes.len());
        log::debug!(
            "  Target versions nodes: {}",
            graph.target_versions_nodes.len()
        );
        log::debug!("  Dependency edges: {}", graph.dependency_edges.len());
        log::debug!("  Target edges: {}", graph.target_edges.len());
        Ok(graph)
    }

    /// Returns the underlying graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Returns the underlying graph for queries and deletion marking.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Returns the package node for an installed package name.
    pub fn package_node(&self, name: &str) -> Option<NodeId> {
        self.package_nodes.get(name).copied()
    }

    /// Returns the keep node, if any packages are kept.
    pub fn keep_node(&self) -> Option<NodeId> {
        self.keep_node
    }

    /// Returns the installed version of a package node.
    pub fn version(&self, node: NodeId) -> Option<&str> {
        self.versions.get(&node).map(|v| v.as_str())
    }

    /// Returns the package nodes (name to node), excluding deleted ones.
    pub fn package_nodes(&self) -> BTreeMap<&str, NodeId> {
        self.package_nodes
            .iter()
            .filter(|&(_, &n)| !self.graph.is_node_deleted(n))
            .map(|(name, &n)| (name.as_str(), n))
            .collect()
    }

    /// Returns the target versions nodes (uid to node), excluding deleted
    /// ones.
    pub fn target_versions_nodes(&self) -> BTreeMap<&str, NodeId> {
        self.target_versions_nodes
            .iter()
            .filter(|&(_, &n)| !self.graph.is_node_deleted(n))
            .map(|(uid, &n)| (uid.as_str(), n))
            .collect()
    }

    /// Returns the dependency edges (uid to edge), excluding deleted ones.
    pub fn dependency_edges(&self) -> BTreeMap<&str, EdgeId> {
        self.dependency_edges
            .iter()
            .filter(|&(_, &e)| !self.graph.is_edge_deleted(e))
            .map(|(uid, &e)| (uid.as_str(), e))
            .collect()
    }

    /// Returns the target edges (uid to edge), excluding deleted ones.
    pub fn target_edges(&self) -> BTreeMap<&str, EdgeId> {
        self.target_edges
            .iter()
            .filter(|&(_, &e)| !self.graph.is_edge_deleted(e))
            .map(|(uid, &e)| (uid.as_str(), e))
            .collect()
    }

    /// Returns the leaf packages: sets of package names that nothing else
    /// depends on.
    ///
    /// Most leafs consist of a single package. Leaf cycles consist of
    /// several packages plus the target versions nodes gluing them together;
    /// only the package names are reported.
    pub fn leafs(&mut self) -> Result<Vec<BTreeSet<String>>, Error> {
        let mut leafs = Vec::new();
        for leaf in self.graph.leafs()? {
            let names: BTreeSet<String> = leaf
                .iter()
                .filter(|&&n| self.versions.contains_key(&n))
                .map(|&n| self.graph.node_uid(n).to_owned())
                .collect();
            if !names.is_empty() {
                leafs.push(names);
            }
        }
        Ok(leafs)
    }

    /// Returns the names of the package nodes currently marked as deleted,
    /// sorted.
    pub fn deleted_package_names(&self) -> Vec<String> {
        self.package_nodes
            .iter()
            .filter(|&(_, &n)| self.graph.is_node_deleted(n))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Unmarks all graph members as deleted.
    pub fn unmark_deleted(&mut self) {
        self.graph.unmark_deleted();
    }
}

// The construction state of a DpkgGraph: the graph builder plus the member
// registries, filled in two phases and frozen at the end.
struct DpkgGraphInit {
    builder: GraphBuilder,
    package_nodes: BTreeMap<String, NodeId>,
    target_versions_nodes: BTreeMap<String, NodeId>,
    dependency_edges: BTreeMap<String, EdgeId>,
    target_edges: BTreeMap<String, EdgeId>,
    versions: HashMap<NodeId, String>,
    keep_node: Option<NodeId>,
    // The installed target packages per target versions node uid; phase 2
    // lays one target edge per entry.
    target_versions: BTreeMap<String, BTreeSet<String>>,
}

impl DpkgGraphInit {
    fn new() -> DpkgGraphInit {
        DpkgGraphInit {
            builder: GraphBuilder::new(),
            package_nodes: BTreeMap::new(),
            target_versions_nodes: BTreeMap::new(),
            dependency_edges: BTreeMap::new(),
            target_edges: BTreeMap::new(),
            versions: HashMap::new(),
            keep_node: None,
            target_versions: BTreeMap::new(),
        }
    }

    /// Phase 1 adds the package nodes, the target versions nodes and the
    /// dependency edges between them.
    fn phase1(&mut self, cache: &PackageCache, ignore_recommends: bool) -> Result<(), Error> {
        let rawtypes: &[&str] = if ignore_recommends {
            &["PreDepends", "Depends"]
        } else {
            &DEPENDENCY_TYPES
        };

        for pkg in cache.installed() {
            let uid = package_node_uid(pkg)?;
            let package_node = self.builder.add_node(uid)?;
            self.package_nodes.insert(pkg.name.clone(), package_node);
            if let Some(version) = &pkg.version {
                self.versions.insert(package_node, version.clone());
            }

            for dep in pkg.dependencies(rawtypes) {
                let tvn_uid = match target_versions_node_uid(dep) {
                    Err(Error::DependencyNotInstalled(_)) if dep.rawtype == "Recommends" => {
                        // Recommended packages don't need to be installed.
                        continue;
                    }
                    result => result?,
                };
                let (target_node, dup) = self.builder.add_node_dedup(tvn_uid.clone());
                if !dup {
                    self.target_versions_nodes
                        .insert(tvn_uid.clone(), target_node);
                    self.target_versions.insert(
                        tvn_uid.clone(),
                        dep.installed_target_versions
                            .iter()
                            .map(|t| t.package.clone())
                            .collect(),
                    );
                }

                let edge_uid = dependency_edge_uid(&pkg.name, dep)?;
                let edge = self.builder.add_edge_with_uid(
                    EdgeKind::Mandatory,
                    package_node,
                    target_node,
                    edge_uid.clone(),
                )?;
                self.dependency_edges.insert(edge_uid, edge);
            }
        }
        Ok(())
    }

    /// Phase 2 adds a target edge from each target versions node to each
    /// package node providing an installed target version. The package nodes
    /// all exist by now.
    fn phase2(&mut self) -> Result<(), Error> {
        let target_versions = std::mem::take(&mut self.target_versions);
        for (tvn_uid, targets) in &target_versions {
            let target_node = self.target_versions_nodes[tvn_uid];
            for name in targets {
                let package_node = self
                    .package_nodes
                    .get(name)
                    .copied()
                    .ok_or_else(|| Error::PackageNotInstalled(name.clone()))?;
                let edge = self
                    .builder
                    .add_edge(EdgeKind::Or, target_node, package_node)?;
                self.target_edges
                    .insert(format!("{} --> {}", tvn_uid, name), edge);
            }
        }
        Ok(())
    }

    /// Adds the keep node and one mandatory edge per package to keep, so that
    /// none of them can ever become a leaf or obsolete.
    fn keep(&mut self, keep: &[String]) -> Result<(), Error> {
        if keep.is_empty() {
            return Ok(());
        }
        let keep_node = self.builder.add_keep_node(KEEP_UID)?;
        self.keep_node = Some(keep_node);
        for name in keep {
            let package_node = self
                .package_nodes
                .get(name)
                .copied()
                .ok_or_else(|| Error::PackageNotInstalled(name.clone()))?;
            self.builder
                .add_edge(EdgeKind::Mandatory, keep_node, package_node)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<DpkgGraph, Error> {
        Ok(DpkgGraph {
            graph: self.builder.finish()?,
            package_nodes: self.package_nodes,
            target_versions_nodes: self.target_versions_nodes,
            dependency_edges: self.dependency_edges,
            target_edges: self.target_edges,
            versions: self.versions,
            keep_node: self.keep_node,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::TargetVersion;

    fn dependency(rawtype: &str, rawstr: &str, targets: &[&str]) -> Dependency {
        Dependency {
            rawtype: rawtype.to_owned(),
            rawstr: rawstr.to_owned(),
            installed_target_versions: targets
                .iter()
                .map(|t| TargetVersion {
                    package: (*t).to_owned(),
                    version: "1.0-1".to_owned(),
                })
                .collect(),
        }
    }

    #[test]
    fn target_versions_node_uids_are_sorted_and_deduplicated() {
        let dep = dependency("Depends", "editor", &["vim-tiny", "nano", "nano"]);
        assert_eq!(target_versions_node_uid(&dep).unwrap(), "<nano|vim-tiny>");
    }

    #[test]
    fn uninstalled_dependencies_have_no_node() {
        let dep = dependency("Depends", "ghost", &[]);
        assert!(matches!(
            target_versions_node_uid(&dep),
            Err(Error::DependencyNotInstalled(_))
        ));
    }

    #[test]
    fn dependency_edge_uids_carry_type_and_raw_string() {
        let dep = dependency("PreDepends", "libc6 (>= 2.34)", &["libc6"]);
        assert_eq!(
            dependency_edge_uid("apt", &dep).unwrap(),
            "apt --PreDepends--> libc6 (>= 2.34)"
        );
    }

    #[test]
    fn unsupported_dependency_types_are_rejected() {
        let dep = dependency("Suggests", "wget", &["wget"]);
        assert!(matches!(
            dependency_edge_uid("apt", &dep),
            Err(Error::UnsupportedDependencyType(_, _))
        ));
    }

    #[test]
    fn package_nodes_require_installed_packages() {
        let cache = PackageCache::parse(
            "Package: gone\nStatus: deinstall ok config-files\nVersion: 1.0-1\n",
        )
        .unwrap();
        let pkg = cache.package("gone").unwrap();
        assert!(matches!(
            package_node_uid(pkg),
            Err(Error::PackageNotInstalled(_))
        ));
    }

    #[test]
    fn empty_package_cache_fails() {
        let cache = PackageCache::parse("").unwrap();
        assert!(matches!(
            DpkgGraph::new(&cache, false, &[]),
            Err(Error::EmptyPackageCache)
        ));
    }
}
