use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use strata::cli::{Cli, Commands};
use strata::server;
use strata_core::prelude::{init_tracing, load};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    init_tracing();
    info!("starting strata");

    let cli = Cli::parse();
    let config = load();

    let result = match cli.command.unwrap_or(Commands::Live) {
        Commands::Live => server::run_live(config).await,
        Commands::Repair => server::run_repair(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("startup failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
