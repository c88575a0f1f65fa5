//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more test scenarios
    Run {
        /// YAML scenario files
        #[arg(required = true)]
        scenarios: Vec<PathBuf>,

        /// Constant-table configuration file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print observed state and match diffs
        #[arg(long, short)]
        verbose: bool,
    },

    /// Parse a console route dump and print it as JSON
    #[command(name = "parse-rib")]
    ParseRib {
        /// Dump file; stdin when omitted
        file: Option<PathBuf>,
    },

    /// Print the kernel forwarding table as JSON
    Fib {
        /// Read the IPv6 table instead of IPv4
        #[arg(long)]
        ipv6: bool,
    },
}
