use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flexi_logger::Logger;

mod leafs;
mod purge;

#[derive(Parser)]
#[command(name = "purgatory", version, about = "Identifies Debian packages that can be safely purged from a system")]
struct Opts {
    /// verbose output / debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// the dpkg status database file to use
    #[arg(
        short,
        long,
        global = true,
        value_name = "dpkg status db",
        default_value = "/var/lib/dpkg/status"
    )]
    dpkg_status_database: PathBuf,

    /// ignore recommends relationships between packages; typically allows to
    /// purge more packages but might result in unusual or undesirable
    /// configurations; use with great care
    #[arg(short, long, global = true)]
    ignore_recommends: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// list the leaf packages; leaf packages are easily purgable because no
    /// other packages depend on them
    Leafs,
    /// purges the specified packages and packages that will be obsoleted by
    /// this operation
    Purge {
        /// package to purge
        #[arg(value_name = "package", required = true)]
        packages: Vec<String>,

        /// keep this package installed: refuse to purge it and never treat
        /// it as obsolete
        #[arg(short, long, value_name = "package")]
        keep: Vec<String>,
    },
}

fn main() {
    let opts = Opts::parse();

    let spec = if opts.verbose { "debug" } else { "warn" };
    // The handle has to stay alive to the end, dropping it shuts down the
    // logger.
    let _logger = Logger::try_with_env_or_str(spec)
        .and_then(|logger| logger.start())
        .unwrap_or_else(|e| panic!("Logger initialization failed with {}", e));

    let result = match &opts.command {
        Command::Leafs => leafs::run(&opts),
        Command::Purge { packages, keep } => purge::run(&opts, packages, keep),
    };

    if let Err(e) = result {
        println!("Error: {}", e);
        for cause in e.chain().skip(1) {
            println!("\tcaused by: {}", cause);
        }
        std::process::exit(1);
    }
}
