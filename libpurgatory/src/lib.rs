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

#![deny(missing_docs)]

//! A library that models the installed packages of a dpkg status database as
//! a dependency graph.
//!
//! Purgatory answers two questions about a Debian system: which installed
//! packages does nothing else depend on (the *leafs* of the dependency
//! graph), and which packages become obsolete when a given set of packages is
//! purged. Both are queries over the graph engine in the `purgatory_graph`
//! crate; this crate supplies the domain layer that maps dpkg concepts onto
//! it, plus the reader for the status database itself.

mod dpkg_graph;
mod error;
pub mod status;

pub use crate::{
    dpkg_graph::DpkgGraph,
    error::Error,
    status::{Dependency, Package, PackageCache, TargetVersion},
};
