//! Renew consolidated SAN certificates for the configured sites.

use clap::Parser;

mod cli;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    let (args, unrecognised) = cli::split_unrecognised(std::env::args());
    Cli::parse_from(args).run(&unrecognised)
}
