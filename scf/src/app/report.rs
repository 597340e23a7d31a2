use cdiis_scf::ScfSolution;
use tracing::info;

pub fn report_summary(solution: &ScfSolution) {
    if solution.converged() {
        info!("\nSCF calculation finished.");
    } else {
        info!("\nSCF calculation stopped before convergence.");
    }
    info!(
        "  Iterations: {}, final |FDS-SDF| = {:.3e}",
        solution.iterations, solution.error_norm
    );

    info!("\nEnergy contributions:");
    for (name, value) in solution.energy.iter() {
        info!("  {:<10} {:>18.10} au", name, value);
    }

    let orbitals = &solution.orbitals;
    info!("\nFinal Energy Levels:");
    for (i, (energy, occ)) in orbitals
        .energies()
        .iter()
        .zip(orbitals.occupations().iter())
        .enumerate()
    {
        info!("  Level {}: {:.8} au  (occupation {:.4})", i + 1, energy, occ);
    }
    if let (Some(homo), Some(lumo)) = (orbitals.homo_energy(), orbitals.lumo_energy()) {
        info!("  HOMO-LUMO gap: {:.8} au", lumo - homo);
    }

    info!("\nTotal Energy: {:.10} au", solution.total_energy());
}
