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

//! Reading the dpkg status database.
//!
//! The status database is a sequence of RFC-822 style stanzas separated by
//! blank lines, one per package dpkg knows about. Only the handful of fields
//! purgatory cares about are kept: the package identity, its installation
//! state, what it provides and what it depends on.
//!
//! Dependencies are resolved against the installed packages while the
//! database is loaded: every dependency group records which installed
//! packages can satisfy it, either directly by name or through `Provides`.
//! Version constraints are not interpreted beyond that.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::Error;

/// The dependency fields purgatory follows, in the `rawtype` spelling used by
/// the dependency descriptors (note: no hyphen in `PreDepends`).
pub const DEPENDENCY_TYPES: [&str; 3] = ["PreDepends", "Depends", "Recommends"];

/// An installed package that can satisfy a dependency.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TargetVersion {
    /// The name of the providing package.
    pub package: String,
    /// The installed version of the providing package.
    pub version: String,
}

/// One comma-group of a dependency field of an installed package.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Dependency {
    /// The dependency type: `PreDepends`, `Depends` or `Recommends`.
    pub rawtype: String,
    /// The group verbatim as it appeared in the status database, e.g.
    /// `"nano | vim-tiny"` or `"libc6 (>= 2.34)"`.
    pub rawstr: String,
    /// The installed packages that satisfy any alternative of this group.
    /// Empty if the dependency isn't installed at all.
    pub installed_target_versions: Vec<TargetVersion>,
}

/// A package stanza of the status database.
#[derive(Clone, Debug)]
pub struct Package {
    /// The package name.
    pub name: String,
    /// The version recorded in the stanza, if any.
    pub version: Option<String>,
    /// Whether the package is installed. Stanzas in other states (e.g.
    /// `deinstall ok config-files`) are retained but never become graph
    /// nodes.
    pub installed: bool,
    /// The names this package provides.
    pub provides: Vec<String>,
    dependencies: Vec<Dependency>,
}

impl Package {
    /// Returns the dependency descriptors of the given types.
    pub fn dependencies(&self, rawtypes: &[&str]) -> impl Iterator<Item = &Dependency> {
        let rawtypes: Vec<String> = rawtypes.iter().map(|s| (*s).to_owned()).collect();
        self.dependencies
            .iter()
            .filter(move |dep| rawtypes.contains(&dep.rawtype))
    }
}

/// The parsed and resolved view of a dpkg status database.
pub struct PackageCache {
    packages: BTreeMap<String, Package>,
}

impl PackageCache {
    /// Reads and resolves a dpkg status database file.
    pub fn open(path: &Path) -> Result<PackageCache, Error> {
        log::debug!("Reading dpkg status database {:?} ...", path);
        let content = std::fs::read_to_string(path)
            .map_err(|e| (e, format!("Failed to read the dpkg status database {:?}", path)))?;
        PackageCache::parse(&content)
    }

    /// Parses and resolves a dpkg status database from memory.
    pub fn parse(content: &str) -> Result<PackageCache, Error> {
        let stanzas = parse_stanzas(content)?;

        // Index the installed packages and what they provide before
        // resolving any dependency against them.
        let mut versions = BTreeMap::new();
        let mut providers: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for stanza in &stanzas {
            if !stanza.installed {
                continue;
            }
            versions.insert(stanza.name.as_str(), stanza.version.as_str());
            for name in &stanza.provides {
                providers.entry(name.as_str()).or_default().push(&stanza.name);
            }
        }

        let mut packages = BTreeMap::new();
        for stanza in &stanzas {
            let dependencies = if stanza.installed {
                stanza
                    .dependency_fields
                    .iter()
                    .flat_map(|(rawtype, value)| {
                        resolve_dependency_field(rawtype, value, &versions, &providers)
                    })
                    .collect()
            } else {
                Vec::new()
            };
            packages.insert(
                stanza.name.clone(),
                Package {
                    name: stanza.name.clone(),
                    version: if stanza.version.is_empty() {
                        None
                    } else {
                        Some(stanza.version.clone())
                    },
                    installed: stanza.installed,
                    provides: stanza.provides.clone(),
                    dependencies,
                },
            );
        }
        log::debug!(
            "{} packages in the dpkg status database, {} of them installed",
            packages.len(),
            packages.values().filter(|p| p.installed).count()
        );
        Ok(PackageCache { packages })
    }

    /// Looks up a package stanza by name, installed or not.
    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Returns the installed packages, ordered by name.
    pub fn installed(&self) -> impl Iterator<Item = &Package> {
        self.packages.values().filter(|p| p.installed)
    }
}

struct Stanza {
    name: String,
    version: String,
    installed: bool,
    provides: Vec<String>,
    // (rawtype, field value) pairs, e.g. ("PreDepends", "libc6 (>= 2.34)").
    dependency_fields: Vec<(&'static str, String)>,
}

fn parse_stanzas(content: &str) -> Result<Vec<Stanza>, Error> {
    let mut stanzas = Vec::new();
    // Fields can continue over several lines; continuation lines start with
    // a space or tab. Fold them into one (key, value) list per stanza.
    let mut fields: Vec<(String, String)> = Vec::new();
    for line in content.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if !fields.is_empty() {
                stanzas.push(stanza_from_fields(std::mem::take(&mut fields))?);
            }
        } else if line.starts_with([' ', '\t']) {
            match fields.last_mut() {
                Some((_, value)) => {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                None => {
                    return Err(Error::InvalidStatusDb(format!(
                        "continuation line outside of a stanza: {:?}",
                        line
                    )));
                }
            }
        } else {
            match line.split_once(':') {
                Some((key, value)) => fields.push((key.trim().to_owned(), value.trim().to_owned())),
                None => {
                    return Err(Error::InvalidStatusDb(format!(
                        "line without a field separator: {:?}",
                        line
                    )));
                }
            }
        }
    }
    Ok(stanzas)
}

fn stanza_from_fields(fields: Vec<(String, String)>) -> Result<Stanza, Error> {
    let mut name = None;
    let mut version = None;
    let mut status = None;
    let mut provides = Vec::new();
    let mut dependency_fields = Vec::new();
    for (key, value) in fields {
        match key.as_str() {
            "Package" => name = Some(value),
            "Version" => version = Some(value),
            "Status" => status = Some(value),
            "Provides" => {
                provides = value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(dependency_target_name)
                    .collect();
            }
            "Pre-Depends" => dependency_fields.push(("PreDepends", value)),
            "Depends" => dependency_fields.push(("Depends", value)),
            "Recommends" => dependency_fields.push(("Recommends", value)),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| Error::InvalidStatusDb("stanza without a Package field".into()))?;
    // The third word of the Status field is the package state; everything
    // other than "installed" (config-files, half-installed, ...) is treated
    // as not installed.
    let installed = status
        .as_deref()
        .and_then(|s| s.split_whitespace().nth(2))
        .is_some_and(|state| state == "installed");
    if installed && version.is_none() {
        return Err(Error::InvalidStatusDb(format!(
            "installed package '{}' without a Version field",
            name
        )));
    }
    Ok(Stanza {
        name,
        version: version.unwrap_or_default(),
        installed,
        provides,
        dependency_fields,
    })
}

/// Extracts the package name from one dependency alternative, dropping the
/// version constraint and any architecture qualifier: `"libc6:any (>= 2.34)"`
/// becomes `"libc6"`.
fn dependency_target_name(alternative: &str) -> String {
    let name = alternative
        .trim()
        .split([' ', '\t', '('])
        .next()
        .unwrap_or_default();
    match name.split_once(':') {
        Some((name, _arch)) => name.to_owned(),
        None => name.to_owned(),
    }
}

fn resolve_dependency_field(
    rawtype: &str,
    value: &str,
    versions: &BTreeMap<&str, &str>,
    providers: &BTreeMap<&str, Vec<&str>>,
) -> Vec<Dependency> {
    let mut dependencies = Vec::new();
    for group in value.split(',') {
        let rawstr = group.trim();
        if rawstr.is_empty() {
            continue;
        }

        // Any installed alternative of the group satisfies it, either under
        // its own name or by providing the wanted name.
        let mut targets = BTreeMap::new();
        for alternative in rawstr.split('|') {
            let wanted = dependency_target_name(alternative);
            if let Some(version) = versions.get(wanted.as_str()) {
                targets.insert(wanted.clone(), (*version).to_owned());
            }
            for provider in providers.get(wanted.as_str()).into_iter().flatten() {
                if let Some(version) = versions.get(provider) {
                    targets.insert((*provider).to_owned(), (*version).to_owned());
                }
            }
        }

        dependencies.push(Dependency {
            rawtype: rawtype.to_owned(),
            rawstr: rawstr.to_owned(),
            installed_target_versions: targets
                .into_iter()
                .map(|(package, version)| TargetVersion { package, version })
                .collect(),
        });
    }
    dependencies
}
