//! Command-line surface (§6 A3).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cosimtrace", about = "Reconstructs distributed traces from simbricks co-simulation log streams")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full pipeline against a directory of live log files.
    Run(RunArgs),
    /// Parse and validate a config file, then exit.
    ValidateConfig(ValidateConfigArgs),
    /// Replay a recorded event capture through the spanning/tracing pipeline.
    Replay(ReplayArgs),
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long = "host-client")]
    pub host_client: PathBuf,
    #[arg(long = "host-server")]
    pub host_server: PathBuf,
    #[arg(long = "nic-client")]
    pub nic_client: PathBuf,
    #[arg(long = "nic-server")]
    pub nic_server: PathBuf,
    #[arg(long)]
    pub network: PathBuf,
    #[arg(long = "otlp-endpoint", default_value = "http://localhost:4317")]
    pub otlp_endpoint: String,
}

#[derive(Parser, Debug)]
pub struct ValidateConfigArgs {
    #[arg(long)]
    pub config: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ReplayArgs {
    #[arg(long)]
    pub config: PathBuf,
    /// A single newline-delimited-JSON capture carrying events from every
    /// parser, used to exercise the pipeline without five live simulators.
    #[arg(long)]
    pub capture: PathBuf,
}
