//! Orbital state: coefficients, energies and occupations, plus the generalized
//! eigensolver that produces them from a Fock matrix.

extern crate nalgebra as na;

use crate::error::{check_square, Result, ScfError};
use crate::occupation::OccupationModel;
use na::{DMatrix, DVector};
use serde::Serialize;
use std::cmp::Ordering;

/// Orbitals whose energies differ by less than this are treated as degenerate.
const DEGENERACY_TOLERANCE: f64 = 1e-8;

/// Cholesky factor of the overlap matrix, `S = L Lᵀ`.
///
/// Building it is the positive-definiteness check: a basis without a valid
/// orthogonalization can not be used for any SCF step.
#[derive(Debug, Clone)]
pub struct OverlapMetric {
    overlap: DMatrix<f64>,
    lower_inv: DMatrix<f64>,
}

impl OverlapMetric {
    pub fn new(overlap: &DMatrix<f64>) -> Result<Self> {
        let n = overlap.nrows();
        if n == 0 {
            return Err(ScfError::configuration("basis dimension must be positive"));
        }
        check_square("overlap matrix", overlap, n)?;

        let asymmetry = (overlap - overlap.transpose()).amax();
        if asymmetry > 1e-8 * overlap.amax().max(1.0) {
            return Err(ScfError::configuration(format!(
                "overlap matrix is not symmetric (max deviation {:.3e})",
                asymmetry
            )));
        }

        let cholesky = overlap.clone().cholesky().ok_or_else(|| {
            ScfError::numerical("overlap matrix is not positive definite (Cholesky failed)")
        })?;
        let lower = cholesky.l();

        let pivots = lower.diagonal();
        let smallest = pivots.iter().fold(f64::INFINITY, |acc, &p| acc.min(p * p));
        let largest = pivots.iter().fold(0.0_f64, |acc, &p| acc.max(p * p));
        if !(smallest > 1e-14 * largest) {
            return Err(ScfError::numerical(format!(
                "overlap matrix is numerically singular (pivot ratio {:.3e})",
                smallest / largest
            )));
        }

        let lower_inv = lower
            .solve_lower_triangular(&DMatrix::identity(n, n))
            .ok_or_else(|| ScfError::numerical("could not invert the Cholesky factor of S"))?;

        Ok(OverlapMetric {
            overlap: overlap.clone(),
            lower_inv,
        })
    }

    pub fn nbasis(&self) -> usize {
        self.overlap.nrows()
    }

    pub fn overlap(&self) -> &DMatrix<f64> {
        &self.overlap
    }

    /// Solves `F C = S C diag(e)`; eigenpairs come back in ascending order.
    pub fn diagonalize(&self, fock: &DMatrix<f64>) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let n = self.nbasis();
        check_square("Fock matrix", fock, n)?;

        let transformed = &self.lower_inv * fock * self.lower_inv.transpose();
        let symmetric = (&transformed + transformed.transpose()) * 0.5;
        let eig = symmetric.symmetric_eigen();
        if eig.eigenvalues.iter().any(|e| !e.is_finite()) {
            return Err(ScfError::numerical("non-finite orbital energies"));
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| match eig.eigenvalues[a].total_cmp(&eig.eigenvalues[b]) {
            Ordering::Equal => a.cmp(&b),
            other => other,
        });
        let energies = DVector::from_fn(n, |i, _| eig.eigenvalues[order[i]]);
        let rotated = eig.eigenvectors.select_columns(&order);
        let coeffs = self.lower_inv.transpose() * rotated;

        Ok((energies, align_eigenvectors(coeffs)))
    }
}

/// Flips each column so that its entry with the largest magnitude is positive.
/// On equal magnitudes the lowest row wins, which keeps the choice reproducible.
pub fn align_eigenvectors(mut eigvecs: DMatrix<f64>) -> DMatrix<f64> {
    for mut col in eigvecs.column_iter_mut() {
        let mut pivot = 0.0_f64;
        for &value in col.iter() {
            if value.abs() > pivot.abs() {
                pivot = value;
            }
        }
        if pivot < 0.0 {
            col.neg_mut();
        }
    }
    eigvecs
}

#[derive(Debug, Clone, Serialize)]
pub struct OrbitalState {
    coeffs: DMatrix<f64>,
    energies: DVector<f64>,
    occupations: DVector<f64>,
}

impl OrbitalState {
    /// Assembles a state from its parts; occupations are taken as given.
    pub fn new(
        coeffs: DMatrix<f64>,
        energies: DVector<f64>,
        occupations: DVector<f64>,
    ) -> Result<Self> {
        let n = coeffs.nrows();
        check_square("orbital coefficients", &coeffs, n)?;
        if energies.len() != n || occupations.len() != n {
            return Err(ScfError::configuration(format!(
                "orbital state of dimension {} got {} energies and {} occupations",
                n,
                energies.len(),
                occupations.len()
            )));
        }
        if occupations.iter().any(|&o| !(0.0..=2.0).contains(&o)) {
            return Err(ScfError::configuration(
                "orbital occupations must lie in [0, 2]",
            ));
        }
        Ok(OrbitalState {
            coeffs,
            energies,
            occupations,
        })
    }

    /// Orbitals of a Fock matrix without any reference density (e.g. core guess).
    pub fn from_fock(
        fock: &DMatrix<f64>,
        metric: &OverlapMetric,
        occ_model: &dyn OccupationModel,
    ) -> Result<Self> {
        let (energies, coeffs) = metric.diagonalize(fock)?;
        let occupations = occ_model.assign(&energies)?;
        Ok(OrbitalState {
            coeffs,
            energies,
            occupations,
        })
    }

    /// Orbitals of a Fock matrix; within degenerate levels the orbitals are
    /// rotated so that they diagonalize `density`, most occupied first.
    pub fn from_fock_and_density(
        fock: &DMatrix<f64>,
        density: &DMatrix<f64>,
        metric: &OverlapMetric,
        occ_model: &dyn OccupationModel,
    ) -> Result<Self> {
        check_square("density matrix", density, metric.nbasis())?;
        let (energies, mut coeffs) = metric.diagonalize(fock)?;
        rotate_degenerate_blocks(&mut coeffs, &energies, density, metric.overlap());
        let occupations = occ_model.assign(&energies)?;
        Ok(OrbitalState {
            coeffs,
            energies,
            occupations,
        })
    }

    /// `D = C diag(occ) Cᵀ`.
    pub fn to_density(&self) -> DMatrix<f64> {
        let mut weighted = self.coeffs.clone();
        for (mut col, &occ) in weighted.column_iter_mut().zip(self.occupations.iter()) {
            col *= occ;
        }
        let density = weighted * self.coeffs.transpose();
        (&density + density.transpose()) * 0.5
    }

    pub fn nbasis(&self) -> usize {
        self.coeffs.nrows()
    }

    pub fn coeffs(&self) -> &DMatrix<f64> {
        &self.coeffs
    }

    pub fn energies(&self) -> &DVector<f64> {
        &self.energies
    }

    pub fn occupations(&self) -> &DVector<f64> {
        &self.occupations
    }

    pub fn nelectrons(&self) -> f64 {
        self.occupations.sum()
    }

    /// Energy of the highest orbital with non-zero occupation.
    pub fn homo_energy(&self) -> Option<f64> {
        (0..self.energies.len())
            .rev()
            .find(|&i| self.occupations[i] > 0.0)
            .map(|i| self.energies[i])
    }

    /// Energy of the lowest orbital that is not fully occupied.
    pub fn lumo_energy(&self) -> Option<f64> {
        (0..self.energies.len())
            .find(|&i| self.occupations[i] < 2.0)
            .map(|i| self.energies[i])
    }
}

fn rotate_degenerate_blocks(
    coeffs: &mut DMatrix<f64>,
    energies: &DVector<f64>,
    density: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
) {
    let n = energies.len();
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && energies[end] - energies[start] < DEGENERACY_TOLERANCE {
            end += 1;
        }
        let width = end - start;
        if width > 1 {
            let block = coeffs.columns(start, width).into_owned();
            let sc = overlap * &block;
            let projected = sc.transpose() * density * &sc;
            let eig = ((&projected + projected.transpose()) * 0.5).symmetric_eigen();

            let mut order: Vec<usize> = (0..width).collect();
            order.sort_by(|&a, &b| match eig.eigenvalues[b].total_cmp(&eig.eigenvalues[a]) {
                Ordering::Equal => a.cmp(&b),
                other => other,
            });
            let rotation = eig.eigenvectors.select_columns(&order);
            let rotated = align_eigenvectors(block * rotation);
            coeffs.columns_mut(start, width).copy_from(&rotated);
        }
        start = end;
    }
}
