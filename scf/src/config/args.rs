//! Command-line argument parsing

use clap::Parser;

/// CDIIS self-consistent field solver driven by a YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Override maximum SCF iterations
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Override DIIS history capacity
    #[arg(long)]
    pub diis_capacity: Option<usize>,

    /// Override convergence threshold on the commutator norm
    #[arg(long)]
    pub convergence_threshold: Option<f64>,

    /// Abort the SCF loop after this many seconds
    #[arg(long)]
    pub time_limit_seconds: Option<f64>,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write the energy breakdown, orbitals and density as JSON
    #[arg(short, long)]
    pub results: Option<String>,

    /// Log DIIS and grid details
    #[arg(short, long)]
    pub verbose: bool,
}
