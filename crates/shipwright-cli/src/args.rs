use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Command-line interface of the shipwright cluster installer
///
/// Installs, expands and reconfigures clusters by running a persisted
/// operation plan. Plans can be inspected, and individual phases executed or
/// rolled back by hand when an automatic run stops on a failure.
#[derive(Parser)]
#[command(version, about, name = "shipwright")]
pub struct Args {
    /// Path to the SQLite database file. Defaults to
    /// $XDG_DATA_HOME/shipwright/shipwright.db
    #[arg(long, global = true)]
    pub database_file: Option<PathBuf>,

    /// Operation to act on. Defaults to the most recent operation
    #[arg(long, global = true)]
    pub operation_id: Option<String>,

    /// Configuration file of the operation, needed to execute phases
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// User to log into the nodes as
    #[arg(long, global = true)]
    pub ssh_user: Option<String>,

    /// Disable colored output and use plain text
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install a new cluster from the configuration file
    Install,
    /// Join a node to a running cluster
    Expand,
    /// Move a single-node cluster to a new advertise address
    Reconfigure,
    /// List operations
    #[command(aliases = ["ls", "list"])]
    Operations,
    /// Inspect and drive the operation plan
    #[command(alias = "p")]
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Show the latest progress entry of the operation
    Progress,
    /// Run preflight checks on this host
    Check {
        #[command(subcommand)]
        command: CheckCommands,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Show the plan with the state of every phase
    #[command(alias = "s")]
    Show,
    /// Execute a phase, or every phase under a composite phase
    #[command(alias = "e")]
    Execute(PhaseArgs),
    /// Roll back a phase, or every phase under a composite phase
    #[command(alias = "r")]
    Rollback(PhaseArgs),
    /// Run every phase that has not completed yet
    Resume,
    /// Mark the operation completed without running the remaining phases
    Complete,
}

/// A phase selected on the command line
#[derive(ClapArgs)]
pub struct PhaseArgs {
    /// ID of the phase, e.g. /masters/node-1/planet
    #[arg(long)]
    pub phase: String,

    /// Run the phase even if it has already completed
    #[arg(long)]
    pub force: bool,
}

#[derive(Subcommand)]
pub enum CheckCommands {
    /// Benchmark a directory with fio and check it is fast enough for etcd
    Disk {
        /// Directory to benchmark
        #[arg(long)]
        path: PathBuf,
    },
}
