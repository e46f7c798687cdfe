use anyhow::{Context, Result};
use libpurgatory::DpkgGraph;

use crate::Opts;

pub fn run(opts: &Opts) -> Result<()> {
    let mut graph = DpkgGraph::from_status_db(
        &opts.dpkg_status_database,
        opts.ignore_recommends,
        &[],
    )
    .context("Failed to build the dpkg graph")?;

    log::debug!("Determining leafs of the dpkg graph ...");
    let leafs = graph.leafs()?;
    log::debug!("  Leafs: {}", leafs.len());

    // Leaf cycles can be arbitrarily complex, so the relationship between
    // their packages isn't rendered; each leaf becomes one line of sorted
    // package names.
    let mut lines: Vec<String> = leafs
        .into_iter()
        .map(|leaf| leaf.into_iter().collect::<Vec<String>>().join(" "))
        .collect();
    lines.sort();
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}
