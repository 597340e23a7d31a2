mod report;
mod runner;
mod workspace;

pub use runner::run_scf;
pub use workspace::CalculationWorkspace;

use self::report::report_summary;
use crate::config::{Args, Config};
use crate::io::{load_integrals, setup_output, write_results};
use clap::Parser;
use color_eyre::eyre::{bail, Result, WrapErr};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct ScfApplication {
    args: Args,
    config: Config,
}

impl ScfApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        setup_output(self.args.output.as_ref(), self.args.verbose)?;
        info!("Configuration read from: {}", self.args.config_file);

        let base_dir = config_dir(&self.args.config_file);
        let integrals_path = base_dir.join(&self.config.integrals);
        info!("Loading integrals from: {}", integrals_path.display());
        let integrals = load_integrals(&integrals_path)?;
        info!("Basis dimension: {}", integrals.nbasis());

        let workspace = CalculationWorkspace::build(integrals, &self.config)?;
        let solution = run_scf(&workspace, &self.args, &self.config, &base_dir)?;
        report_summary(&solution);

        if let Some(path) = &self.args.results {
            write_results(Path::new(path), &solution)?;
            info!("Results written to: {}", path);
        }

        if !solution.converged() {
            bail!(
                "SCF did not converge within {} iterations (error norm {:.3e})",
                solution.iterations,
                solution.error_norm
            );
        }
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config_content = fs::read_to_string(&args.config_file)
        .wrap_err_with(|| format!("Unable to read configuration file: {}", args.config_file))?;

    let config = serde_yml::from_str::<Config>(&config_content)
        .wrap_err("Failed to parse configuration file")?
        .with_defaults();

    Ok(config)
}

/// Relative paths in the configuration are resolved against its directory.
fn config_dir(config_file: &str) -> PathBuf {
    Path::new(config_file)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}
