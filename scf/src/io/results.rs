//! JSON summary of a finished (or abandoned) SCF run.

use super::integrals::matrix_to_rows;
use cdiis_scf::{EnergyBreakdown, IterationRecord, ScfSolution, ScfStatus};
use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Serialize)]
struct ResultsDocument<'a> {
    status: ScfStatus,
    converged: bool,
    iterations: usize,
    error_norm: f64,
    energy: &'a EnergyBreakdown,
    orbital_energies: Vec<f64>,
    occupations: Vec<f64>,
    homo_energy: Option<f64>,
    lumo_energy: Option<f64>,
    density: Vec<Vec<f64>>,
    history: &'a [IterationRecord],
}

impl<'a> ResultsDocument<'a> {
    fn new(solution: &'a ScfSolution) -> Self {
        let orbitals = &solution.orbitals;
        ResultsDocument {
            status: solution.status,
            converged: solution.converged(),
            iterations: solution.iterations,
            error_norm: solution.error_norm,
            energy: &solution.energy,
            orbital_energies: orbitals.energies().iter().copied().collect(),
            occupations: orbitals.occupations().iter().copied().collect(),
            homo_energy: orbitals.homo_energy(),
            lumo_energy: orbitals.lumo_energy(),
            density: matrix_to_rows(&solution.density),
            history: &solution.history,
        }
    }
}

pub fn write_results(path: &Path, solution: &ScfSolution) -> Result<()> {
    let file = File::create(path)
        .wrap_err_with(|| format!("Could not create results file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &ResultsDocument::new(solution))
        .wrap_err("Failed to serialize SCF results")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
