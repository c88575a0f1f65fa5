//! ribcheck - route validation harness for zserv-speaking routing daemons

use clap::Parser;
use ribcheck::{cli, commands::Commands, common::logging};

#[derive(Parser)]
#[command(name = "ribcheck", about = "Route injection and table validation for routing daemons")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    logging::init();

    let cli = Cli::parse();

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
