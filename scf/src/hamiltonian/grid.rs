//! Numerical integration of density functionals on a quadrature grid.

extern crate nalgebra as na;

use super::xc::{DensityPoint, FunctionalFamily, XcFunctional, XcPoint};
use super::{EnergyTerm, TermContribution};
use crate::error::{check_square, Result, ScfError};
use na::{DMatrix, DVector, Matrix3xX, Vector3};
use rayon::prelude::*;
use std::borrow::Cow;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

/// Points integrated sequentially by one task before results are reduced.
const CHUNK_SIZE: usize = 512;

/// One quadrature point with the basis functions tabulated on it.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub position: Vector3<f64>,
    pub weight: f64,
    /// `φ_i(r)` for every basis function.
    pub basis_values: DVector<f64>,
    /// `∇φ_i(r)` as the columns of a `3×n` matrix. Required for gradient-dependent functionals.
    pub basis_gradients: Option<Matrix3xX<f64>>,
}

/// Read access to a molecular integration grid.
pub trait IntegrationGrid: Send + Sync {
    fn nbasis(&self) -> usize;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point `index`; grids that generate points lazily hand back owned values.
    fn point(&self, index: usize) -> Result<Cow<'_, GridPoint>>;
}

/// A grid stored as a list of tabulated points.
#[derive(Debug, Clone)]
pub struct TabulatedGrid {
    nbasis: usize,
    points: Vec<GridPoint>,
}

impl TabulatedGrid {
    pub fn new(nbasis: usize, points: Vec<GridPoint>) -> Result<Self> {
        for (index, point) in points.iter().enumerate() {
            validate_point(point, index, nbasis, false)?;
        }
        Ok(TabulatedGrid { nbasis, points })
    }

    pub fn points(&self) -> &[GridPoint] {
        &self.points
    }

    pub fn total_weight(&self) -> f64 {
        self.points.iter().map(|p| p.weight).sum()
    }
}

impl IntegrationGrid for TabulatedGrid {
    fn nbasis(&self) -> usize {
        self.nbasis
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn point(&self, index: usize) -> Result<Cow<'_, GridPoint>> {
        self.points
            .get(index)
            .map(Cow::Borrowed)
            .ok_or_else(|| ScfError::input(format!("grid point {} out of range", index)))
    }
}

fn validate_point(point: &GridPoint, index: usize, nbasis: usize, need_gradients: bool) -> Result<()> {
    if !point.weight.is_finite() || point.weight < 0.0 {
        return Err(ScfError::input(format!(
            "grid point {} has invalid quadrature weight {}",
            index, point.weight
        )));
    }
    if point.basis_values.len() != nbasis {
        return Err(ScfError::input(format!(
            "grid point {} tabulates {} basis functions, expected {}",
            index,
            point.basis_values.len(),
            nbasis
        )));
    }
    if point.basis_values.iter().any(|v| !v.is_finite()) {
        return Err(ScfError::input(format!(
            "grid point {} has non-finite basis values",
            index
        )));
    }
    match &point.basis_gradients {
        Some(gradients) => {
            if gradients.ncols() != nbasis {
                return Err(ScfError::input(format!(
                    "grid point {} tabulates {} basis gradients, expected {}",
                    index,
                    gradients.ncols(),
                    nbasis
                )));
            }
            if gradients.iter().any(|v| !v.is_finite()) {
                return Err(ScfError::input(format!(
                    "grid point {} has non-finite basis gradients",
                    index
                )));
            }
        }
        None if need_gradients => {
            return Err(ScfError::input(format!(
                "grid point {} lacks basis gradients required by a gradient-dependent functional",
                index
            )));
        }
        None => {}
    }
    Ok(())
}

/// A group of functionals sharing one grid and one density evaluation per point.
///
/// The energy is `Σ_p w_p Σ_f e_f(ρ_p, σ_p, τ_p)`; the Fock contribution is its
/// derivative with respect to the density matrix.
pub struct GridGroupTerm {
    name: String,
    grid: Arc<dyn IntegrationGrid>,
    functionals: Vec<Arc<dyn XcFunctional>>,
    family: FunctionalFamily,
    density_cutoff: f64,
}

impl GridGroupTerm {
    pub fn new(
        name: impl Into<String>,
        grid: Arc<dyn IntegrationGrid>,
        functionals: Vec<Arc<dyn XcFunctional>>,
    ) -> Result<Self> {
        let name = name.into();
        let family = functionals
            .iter()
            .map(|f| f.family())
            .max()
            .ok_or_else(|| ScfError::configuration(format!("{} has no functionals", name)))?;
        Ok(GridGroupTerm {
            name,
            grid,
            functionals,
            family,
            density_cutoff: 1e-14,
        })
    }

    /// Points with a density below `cutoff` contribute nothing.
    pub fn with_density_cutoff(mut self, cutoff: f64) -> Self {
        self.density_cutoff = cutoff;
        self
    }

    pub fn family(&self) -> FunctionalFamily {
        self.family
    }

    pub fn functional_names(&self) -> Vec<&str> {
        self.functionals.iter().map(|f| f.name()).collect()
    }

    fn integrate(&self, density: &DMatrix<f64>, with_fock: bool) -> Result<TermContribution> {
        let n = self.grid.nbasis();
        check_square("density matrix", density, n)?;
        let npoints = self.grid.len();
        let nchunks = (npoints + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let fock_dim = if with_fock { n } else { 0 };

        let result = (0..nchunks)
            .into_par_iter()
            .map(|c| {
                let range = c * CHUNK_SIZE..((c + 1) * CHUNK_SIZE).min(npoints);
                self.integrate_chunk(range, density, with_fock)
            })
            .try_reduce(
                || TermContribution {
                    energy: 0.0,
                    fock: DMatrix::zeros(fock_dim, fock_dim),
                },
                |mut a, b| {
                    a.energy += b.energy;
                    a.fock += b.fock;
                    Ok(a)
                },
            )?;

        debug!(
            "{}: integrated {} points, energy {:.10}",
            self.name, npoints, result.energy
        );
        Ok(result)
    }

    fn integrate_chunk(
        &self,
        range: Range<usize>,
        density: &DMatrix<f64>,
        with_fock: bool,
    ) -> Result<TermContribution> {
        let n = self.grid.nbasis();
        let need_gradients = self.family >= FunctionalFamily::Gga;
        let need_tau = self.family >= FunctionalFamily::MetaGga;

        let mut energy = 0.0;
        let fock_dim = if with_fock { n } else { 0 };
        let mut fock = DMatrix::zeros(fock_dim, fock_dim);

        for index in range {
            let point = self.grid.point(index)?;
            validate_point(&point, index, n, need_gradients)?;
            let phi = &point.basis_values;
            let d_phi = density * phi;
            let rho = phi.dot(&d_phi);
            if !rho.is_finite() {
                return Err(ScfError::numerical(format!(
                    "non-finite density at grid point {}",
                    index
                )));
            }
            if rho < self.density_cutoff {
                continue;
            }

            let mut local = DensityPoint::lda(rho);
            if let (true, Some(dphi)) = (need_gradients, &point.basis_gradients) {
                local.grad = (dphi * &d_phi) * 2.0;
                local.sigma = local.grad.norm_squared();
                if need_tau {
                    let d_dphi = dphi * density;
                    let tau: f64 = (0..3).map(|a| d_dphi.row(a).dot(&dphi.row(a))).sum();
                    local.tau = (0.5 * tau).max(0.0);
                }
            }

            let mut xc = XcPoint::default();
            for functional in &self.functionals {
                let out = functional.evaluate(&local);
                if !out.is_finite() {
                    return Err(ScfError::numerical(format!(
                        "functional {} returned non-finite output at grid point {} (rho = {:e})",
                        functional.name(),
                        index,
                        rho
                    )));
                }
                xc += out;
            }

            let w = point.weight;
            energy += w * xc.energy;
            if !with_fock {
                continue;
            }

            fock.ger(w * xc.v_rho, phi, phi, 1.0);
            if let (true, Some(dphi)) = (need_gradients, &point.basis_gradients) {
                if xc.v_sigma != 0.0 {
                    // ∇ρ·∇φ_i for every basis function
                    let g_phi = dphi.transpose() * local.grad;
                    fock.ger(2.0 * w * xc.v_sigma, &g_phi, phi, 1.0);
                    fock.ger(2.0 * w * xc.v_sigma, phi, &g_phi, 1.0);
                }
                if need_tau && xc.v_tau != 0.0 {
                    for a in 0..3 {
                        let component = dphi.row(a).transpose();
                        fock.ger(0.5 * w * xc.v_tau, &component, &component, 1.0);
                    }
                }
            }
        }

        Ok(TermContribution { energy, fock })
    }
}

impl EnergyTerm for GridGroupTerm {
    fn name(&self) -> &str {
        &self.name
    }

    fn nbasis(&self) -> usize {
        self.grid.nbasis()
    }

    fn compute_energy(&self, density: &DMatrix<f64>) -> Result<f64> {
        Ok(self.integrate(density, false)?.energy)
    }

    fn compute_fock(&self, density: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        Ok(self.integrate(density, true)?.fock)
    }

    fn compute(&self, density: &DMatrix<f64>) -> Result<TermContribution> {
        self.integrate(density, true)
    }
}
