use anyhow::{Context, Result};
use libpurgatory::DpkgGraph;

use crate::Opts;

pub fn run(opts: &Opts, packages: &[String], keep: &[String]) -> Result<()> {
    let mut graph = DpkgGraph::from_status_db(
        &opts.dpkg_status_database,
        opts.ignore_recommends,
        keep,
    )
    .context("Failed to build the dpkg graph")?;

    let mut packages = packages.to_vec();
    packages.sort();
    let mut to_purge = Vec::new();
    for name in &packages {
        match graph.package_node(name) {
            Some(node) => to_purge.push(node),
            None => log::info!(
                "The package '{}' is not installed and hence doesn't need to be marked for \
                 removal.",
                name
            ),
        }
    }

    log::debug!(
        "Marking the packages to purge and the packages obsoleted by this operation for \
         removal ..."
    );
    graph
        .graph_mut()
        .mark_members_including_obsolete_deleted(&to_purge)
        .context("Failed to mark the packages for removal")?;

    let deleted = graph.deleted_package_names();
    log::debug!("{} packages marked for removal.", deleted.len());

    println!(
        "Run this apt command to purge the requested packages and all packages that would be \
         obsoleted by this operation:"
    );
    let mut cmd = format!("apt purge {}", deleted.join(" "));
    if !nix::unistd::geteuid().is_root() {
        cmd = format!("sudo {}", cmd);
    }
    println!("{}", cmd);
    Ok(())
}
