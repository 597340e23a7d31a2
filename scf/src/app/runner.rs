use crate::app::workspace::CalculationWorkspace;
use crate::config::{Args, Config, GuessKind};
use crate::io::load_density;
use cdiis_scf::{InitialGuess, ScfError, ScfSolution, ScfSolver};
use color_eyre::eyre::{eyre, Result};
use std::path::Path;
use tracing::{info, warn};

/// Runs the SCF loop. An exhausted iteration budget is not an error here: the
/// unconverged iterate comes back so that it can still be reported.
pub fn run_scf(
    workspace: &CalculationWorkspace,
    args: &Args,
    config: &Config,
    base_dir: &Path,
) -> Result<ScfSolution> {
    let params = config.scf_params.resolve(args);
    info!(
        "SCF parameters: threshold {:e}, max iterations {}, DIIS capacity {} ({:?} eviction)",
        params.convergence_threshold,
        params.max_iterations,
        params.diis.capacity,
        params.diis.eviction
    );

    let solver = ScfSolver::new(
        &workspace.hamiltonian,
        &workspace.overlap,
        workspace.occupation.as_ref(),
        params,
    )?;
    let guess = resolve_guess(config, base_dir)?;

    info!("\nStarting SCF cycle...\n");
    match solver.solve(guess) {
        Ok(solution) => Ok(solution),
        Err(ScfError::Convergence(last)) => {
            warn!(
                "SCF did not converge: error norm {:.3e} after {} iterations",
                last.error_norm, last.iterations
            );
            Ok(*last)
        }
        Err(err) => Err(err.into()),
    }
}

fn resolve_guess(config: &Config, base_dir: &Path) -> Result<InitialGuess> {
    match config.guess_kind() {
        GuessKind::CoreHamiltonian => Ok(InitialGuess::CoreHamiltonian),
        GuessKind::Density => {
            let file = config
                .initial_guess
                .density_file
                .as_ref()
                .ok_or_else(|| eyre!("initial_guess.kind = density needs a density_file"))?;
            let path = base_dir.join(file);
            info!("Reading initial density from: {}", path.display());
            Ok(InitialGuess::Density(load_density(&path)?))
        }
    }
}
