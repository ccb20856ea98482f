use clap::{Parser, Subcommand};

/// Real-account trading middleware: market-data fan-out, bar archive,
/// order gateway.
#[derive(Parser)]
#[clap(name = "strata", version = "0.1.0", about = "strata trading middleware")]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the live middleware (default).
    Live,

    /// Reconcile the bar archive against venue history, then exit.
    Repair,
}
