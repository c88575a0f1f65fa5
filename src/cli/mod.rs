//! CLI command handling
//!
//! Dispatches CLI commands and formats output.

use std::io::Read;
use std::path::PathBuf;

use colored::Colorize;

use crate::commands::Commands;
use crate::common::{Config, Error, Result};
use crate::rib;
use crate::system;
use crate::testing;
use crate::zserv::AddressFamily;

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            scenarios,
            config,
            verbose,
        } => run(scenarios, config, verbose).await,

        Commands::ParseRib { file } => {
            let dump = match file {
                Some(path) => std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read '{}': {}", path.display(), e))
                })?,
                None => {
                    let mut dump = String::new();
                    std::io::stdin().read_to_string(&mut dump)?;
                    dump
                }
            };

            let parsed = rib::parser::parse(&dump)?;
            println!("{}", serde_json::to_string_pretty(&parsed)?);
            Ok(())
        }

        Commands::Fib { ipv6 } => {
            let family = if ipv6 {
                AddressFamily::Ipv6
            } else {
                AddressFamily::Ipv4
            };
            let table = system::fib(family).await?;
            println!("{}", serde_json::to_string_pretty(&table)?);
            Ok(())
        }
    }
}

async fn run(scenarios: Vec<PathBuf>, config: Option<PathBuf>, verbose: bool) -> Result<()> {
    let config = Config::load(config.as_deref())?;

    let mut results = Vec::new();
    for path in &scenarios {
        results.push(testing::run_scenario(path, &config, verbose).await?);
    }

    let total = results.len();
    let failed: Vec<_> = results.iter().filter(|result| !result.passed).collect();

    if total > 1 {
        println!("{}", "Summary:".cyan());
        for result in &results {
            let mark = if result.passed {
                "✓".green()
            } else {
                "✗".red()
            };
            println!(
                "  {} {} ({}/{} steps)",
                mark, result.name, result.steps_run, result.steps_total
            );
        }
    }

    if failed.is_empty() {
        Ok(())
    } else {
        Err(Error::ScenarioFailures {
            failed: failed.len(),
            total,
        })
    }
}
