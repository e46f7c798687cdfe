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

#![allow(missing_docs)]

use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("The dpkg status database doesn't contain any installed packages")]
    EmptyPackageCache,
    #[error(transparent)]
    Graph(#[from] purgatory_graph::GraphError),
    #[error("I/O error: {}. Details: {}", .0, .1)]
    Io(io::Error, String),
    #[error("The dpkg status database is invalid: {0}")]
    InvalidStatusDb(String),
    #[error("The dependency '{0}' was expected to be installed but it currently isn't installed")]
    DependencyNotInstalled(String),
    #[error("The package '{0}' was expected to be installed but it currently isn't installed")]
    PackageNotInstalled(String),
    #[error("The dependency '{0}' has the unsupported type '{1}'")]
    UnsupportedDependencyType(String, String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e, "".to_owned())
    }
}

impl From<(io::Error, String)> for Error {
    fn from((e, msg): (io::Error, String)) -> Error {
        Error::Io(e, msg)
    }
}
