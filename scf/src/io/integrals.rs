//! Loading externally computed integrals, grids and densities from JSON.

use cdiis_scf::{GridPoint, TabulatedGrid, TwoElectronIntegrals};
use color_eyre::eyre::{bail, eyre, Result, WrapErr};
use nalgebra::{DMatrix, DVector, Matrix3xX, Vector3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// On-disk layout of the integrals file.
#[derive(Debug, Deserialize, Serialize)]
pub struct IntegralsFile {
    pub overlap: Vec<Vec<f64>>,
    pub kinetic: Vec<Vec<f64>>,
    pub nuclear_attraction: Vec<Vec<f64>>,
    /// Symmetry-unique quartets `[i, j, k, l, (ij|kl)]`.
    #[serde(default)]
    pub electron_repulsion: Vec<(usize, usize, usize, usize, f64)>,
    #[serde(default)]
    pub nuclear_repulsion: f64,
    pub grid: Option<GridFile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GridFile {
    pub points: Vec<GridPointFile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GridPointFile {
    pub position: [f64; 3],
    pub weight: f64,
    pub values: Vec<f64>,
    /// One `[dx, dy, dz]` per basis function.
    pub gradients: Option<Vec<[f64; 3]>>,
}

/// Integrals in solver form.
#[derive(Debug)]
pub struct LoadedIntegrals {
    pub overlap: DMatrix<f64>,
    pub kinetic: DMatrix<f64>,
    pub nuclear_attraction: DMatrix<f64>,
    pub electron_repulsion: TwoElectronIntegrals,
    pub nuclear_repulsion: f64,
    pub grid: Option<TabulatedGrid>,
}

impl LoadedIntegrals {
    pub fn nbasis(&self) -> usize {
        self.overlap.nrows()
    }
}

/// Square matrix from a list of rows.
pub fn matrix_from_rows(label: &str, rows: &[Vec<f64>]) -> Result<DMatrix<f64>> {
    let n = rows.len();
    if let Some(bad) = rows.iter().position(|row| row.len() != n) {
        bail!(
            "{} must be square: row {} has {} entries, expected {}",
            label,
            bad,
            rows[bad].len(),
            n
        );
    }
    Ok(DMatrix::from_fn(n, n, |i, j| rows[i][j]))
}

pub fn matrix_to_rows(matrix: &DMatrix<f64>) -> Vec<Vec<f64>> {
    matrix
        .row_iter()
        .map(|row| row.iter().copied().collect())
        .collect()
}

fn convert_grid(nbasis: usize, grid: GridFile) -> Result<TabulatedGrid> {
    let points = grid
        .points
        .into_iter()
        .map(|p| GridPoint {
            position: Vector3::from(p.position),
            weight: p.weight,
            basis_values: DVector::from_vec(p.values),
            basis_gradients: p.gradients.map(|g| {
                Matrix3xX::from_iterator(g.len(), g.iter().flat_map(|d| d.iter().copied()))
            }),
        })
        .collect();
    Ok(TabulatedGrid::new(nbasis, points)?)
}

impl IntegralsFile {
    pub fn into_integrals(self) -> Result<LoadedIntegrals> {
        let overlap = matrix_from_rows("overlap", &self.overlap)?;
        let n = overlap.nrows();
        if n == 0 {
            bail!("integrals file has an empty overlap matrix");
        }
        let kinetic = matrix_from_rows("kinetic", &self.kinetic)?;
        let nuclear_attraction = matrix_from_rows("nuclear_attraction", &self.nuclear_attraction)?;
        for (label, m) in [("kinetic", &kinetic), ("nuclear_attraction", &nuclear_attraction)] {
            if m.nrows() != n {
                bail!("{} is {}x{} but the overlap is {}x{}", label, m.nrows(), m.ncols(), n, n);
            }
        }
        let electron_repulsion = TwoElectronIntegrals::from_unique(n, &self.electron_repulsion)?;
        let grid = self.grid.map(|g| convert_grid(n, g)).transpose()?;

        Ok(LoadedIntegrals {
            overlap,
            kinetic,
            nuclear_attraction,
            electron_repulsion,
            nuclear_repulsion: self.nuclear_repulsion,
            grid,
        })
    }
}

pub fn load_integrals(path: &Path) -> Result<LoadedIntegrals> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Unable to read integrals file: {}", path.display()))?;
    let file: IntegralsFile = serde_json::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse integrals file: {}", path.display()))?;
    file.into_integrals()
        .wrap_err_with(|| format!("Invalid integrals in {}", path.display()))
}

/// A density matrix stored as a JSON list of rows.
pub fn load_density(path: &Path) -> Result<DMatrix<f64>> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("Unable to read density file: {}", path.display()))?;
    let rows: Vec<Vec<f64>> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("Failed to parse density file: {}", path.display()))?;
    matrix_from_rows("density", &rows).map_err(|e| eyre!("{}: {}", path.display(), e))
}
