//! Density-matrix energy terms: fixed one-body operators and the two-electron
//! Hartree and exchange contributions.

extern crate nalgebra as na;

use super::eri::TwoElectronIntegrals;
use super::{EnergyTerm, TermContribution};
use crate::error::{check_square, Result, ScfError};
use na::DMatrix;
use std::sync::Arc;

/// `E = tr(D M)` for a fixed symmetric operator `M` (kinetic, nuclear attraction, ...).
#[derive(Debug, Clone)]
pub struct OneBodyTerm {
    name: String,
    matrix: DMatrix<f64>,
}

impl OneBodyTerm {
    pub fn new(name: impl Into<String>, matrix: DMatrix<f64>) -> Result<Self> {
        let name = name.into();
        check_square(&name, &matrix, matrix.nrows())?;
        if matrix.iter().any(|x| !x.is_finite()) {
            return Err(ScfError::input(format!("{} contains non-finite entries", name)));
        }
        let scale = matrix.amax().max(1.0);
        if (&matrix - matrix.transpose()).amax() > 1e-10 * scale {
            return Err(ScfError::configuration(format!("{} is not symmetric", name)));
        }
        Ok(OneBodyTerm { name, matrix })
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}

impl EnergyTerm for OneBodyTerm {
    fn name(&self) -> &str {
        &self.name
    }

    fn nbasis(&self) -> usize {
        self.matrix.nrows()
    }

    fn compute_energy(&self, density: &DMatrix<f64>) -> Result<f64> {
        Ok(density.dot(&self.matrix))
    }

    fn compute_fock(&self, _density: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        Ok(self.matrix.clone())
    }

    fn core_matrix(&self) -> Option<&DMatrix<f64>> {
        Some(&self.matrix)
    }
}

/// Classical electron repulsion, `E = ½ tr(D J)` with Fock contribution `J`.
#[derive(Debug, Clone)]
pub struct DirectTerm {
    name: String,
    eri: Arc<TwoElectronIntegrals>,
}

impl DirectTerm {
    pub fn new(name: impl Into<String>, eri: Arc<TwoElectronIntegrals>) -> Self {
        DirectTerm {
            name: name.into(),
            eri,
        }
    }
}

impl EnergyTerm for DirectTerm {
    fn name(&self) -> &str {
        &self.name
    }

    fn nbasis(&self) -> usize {
        self.eri.nbasis()
    }

    fn compute_energy(&self, density: &DMatrix<f64>) -> Result<f64> {
        Ok(0.5 * density.dot(&self.eri.coulomb(density)))
    }

    fn compute_fock(&self, density: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        Ok(self.eri.coulomb(density))
    }

    fn compute(&self, density: &DMatrix<f64>) -> Result<TermContribution> {
        let j = self.eri.coulomb(density);
        Ok(TermContribution {
            energy: 0.5 * density.dot(&j),
            fock: j,
        })
    }
}

/// Scaled exact exchange for a closed-shell total density:
/// Fock contribution `-½ f K`, energy `-¼ f tr(D K)`.
#[derive(Debug, Clone)]
pub struct ExchangeTerm {
    name: String,
    eri: Arc<TwoElectronIntegrals>,
    fraction: f64,
}

impl ExchangeTerm {
    pub fn new(name: impl Into<String>, eri: Arc<TwoElectronIntegrals>, fraction: f64) -> Self {
        ExchangeTerm {
            name: name.into(),
            eri,
            fraction,
        }
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }
}

impl EnergyTerm for ExchangeTerm {
    fn name(&self) -> &str {
        &self.name
    }

    fn nbasis(&self) -> usize {
        self.eri.nbasis()
    }

    fn compute_energy(&self, density: &DMatrix<f64>) -> Result<f64> {
        Ok(-0.25 * self.fraction * density.dot(&self.eri.exchange(density)))
    }

    fn compute_fock(&self, density: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        Ok(self.eri.exchange(density) * (-0.5 * self.fraction))
    }

    fn compute(&self, density: &DMatrix<f64>) -> Result<TermContribution> {
        let k = self.eri.exchange(density);
        Ok(TermContribution {
            energy: -0.25 * self.fraction * density.dot(&k),
            fock: k * (-0.5 * self.fraction),
        })
    }
}
