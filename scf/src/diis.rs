//! Commutator DIIS (Direct Inversion in the Iterative Subspace)
//!
//! DIIS accelerates SCF convergence by extrapolating the Fock matrix as a
//! linear combination of previous Fock matrices, weighted to minimize the
//! norm of the combined error vector.
//!
//! # Algorithm
//!
//! The error matrix of an iterate is the commutator `E = FDS - SDF`.
//! With `B_ij = <E_i|E_j>` the coefficients solve
//!
//! ```text
//! | B   -1 | |c|   | 0|
//! | -1ᵀ  0 | |λ| = |-1|
//! ```
//!
//! which minimizes `||Σ c_i E_i||²` subject to `Σ c_i = 1`, and the
//! extrapolated Fock matrix is `F_DIIS = Σ c_i F_i`.

extern crate nalgebra as na;

use crate::error::{Result, ScfError};
use na::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Which stored triple is dropped when a full history receives a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// First in, first out.
    #[default]
    Oldest,
    /// Drop the entry with the largest error norm (the oldest one on ties).
    LargestError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiisParams {
    /// Maximum number of stored (F, D, e) triples.
    pub capacity: usize,
    pub eviction: EvictionPolicy,
    /// Largest accepted condition number of the normalized error overlap.
    pub condition_limit: f64,
}

impl Default for DiisParams {
    fn default() -> Self {
        DiisParams {
            capacity: 20,
            eviction: EvictionPolicy::Oldest,
            condition_limit: 1e12,
        }
    }
}

impl DiisParams {
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(ScfError::configuration("DIIS capacity must be at least 1"));
        }
        if !(self.condition_limit > 1.0) {
            return Err(ScfError::configuration(format!(
                "DIIS condition limit must exceed 1, got {}",
                self.condition_limit
            )));
        }
        Ok(())
    }
}

/// DIIS error matrix: `FDS - SDF`.
pub fn commutator_error(
    fock: &DMatrix<f64>,
    density: &DMatrix<f64>,
    overlap: &DMatrix<f64>,
) -> DMatrix<f64> {
    let fds = fock * density * overlap;
    let sdf = overlap * density * fock;
    fds - sdf
}

#[derive(Debug, Clone)]
pub struct DiisEntry {
    fock: DMatrix<f64>,
    density: DMatrix<f64>,
    error: DMatrix<f64>,
    error_norm: f64,
}

impl DiisEntry {
    pub fn fock(&self) -> &DMatrix<f64> {
        &self.fock
    }

    pub fn density(&self) -> &DMatrix<f64> {
        &self.density
    }

    pub fn error(&self) -> &DMatrix<f64> {
        &self.error
    }

    pub fn error_norm(&self) -> f64 {
        self.error_norm
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Fewer than two stored triples.
    TooFewEntries,
    /// Every candidate subspace had a singular or ill-conditioned error overlap.
    IllConditioned,
}

/// Result of one extrapolation.
#[derive(Debug, Clone)]
pub struct DiisExtrapolation {
    pub fock: DMatrix<f64>,
    /// Coefficients over the `subspace` most recent entries, oldest first.
    pub coefficients: DVector<f64>,
    pub subspace: usize,
    /// Condition number of the normalized error overlap that was solved.
    pub condition: Option<f64>,
    /// Set when the most recent Fock matrix was returned unmodified.
    pub fallback: Option<FallbackReason>,
}

impl DiisExtrapolation {
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn max_abs_coefficient(&self) -> f64 {
        self.coefficients.amax()
    }
}

/// Bounded history of (Fock, density, error) triples in insertion order.
#[derive(Debug, Clone)]
pub struct DiisHistory {
    params: DiisParams,
    entries: VecDeque<DiisEntry>,
}

impl DiisHistory {
    pub fn new(params: DiisParams) -> Result<Self> {
        params.validate()?;
        Ok(DiisHistory {
            entries: VecDeque::with_capacity(params.capacity),
            params,
        })
    }

    /// History with the given capacity and default policy.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        DiisHistory::new(DiisParams {
            capacity,
            ..DiisParams::default()
        })
    }

    pub fn params(&self) -> &DiisParams {
        &self.params
    }

    pub fn capacity(&self) -> usize {
        self.params.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiisEntry> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&DiisEntry> {
        self.entries.back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Appends a triple, evicting one entry first if the history is full.
    pub fn push(
        &mut self,
        fock: DMatrix<f64>,
        density: DMatrix<f64>,
        error: DMatrix<f64>,
    ) -> Result<()> {
        let shape = fock.shape();
        if density.shape() != shape || error.shape() != shape {
            return Err(ScfError::configuration(format!(
                "DIIS triple has mismatched shapes {:?}, {:?}, {:?}",
                shape,
                density.shape(),
                error.shape()
            )));
        }
        if let Some(first) = self.entries.front() {
            if first.fock.shape() != shape {
                return Err(ScfError::configuration(format!(
                    "DIIS history holds {:?} matrices, got {:?}",
                    first.fock.shape(),
                    shape
                )));
            }
        }

        if self.entries.len() >= self.params.capacity {
            self.evict();
        }

        let error_norm = error.norm();
        self.entries.push_back(DiisEntry {
            fock,
            density,
            error,
            error_norm,
        });
        Ok(())
    }

    fn evict(&mut self) {
        match self.params.eviction {
            EvictionPolicy::Oldest => {
                self.entries.pop_front();
            }
            EvictionPolicy::LargestError => {
                let mut worst = 0;
                for (idx, entry) in self.entries.iter().enumerate() {
                    if entry.error_norm > self.entries[worst].error_norm {
                        worst = idx;
                    }
                }
                debug!(
                    "DIIS evicting entry {} with error norm {:.3e}",
                    worst, self.entries[worst].error_norm
                );
                self.entries.remove(worst);
            }
        }
    }

    /// Error overlap matrix `B_ij = tr(e_iᵀ e_j)` over all stored entries.
    pub fn error_overlap(&self) -> DMatrix<f64> {
        let n = self.entries.len();
        let mut b = DMatrix::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let value = self.entries[i].error.dot(&self.entries[j].error);
                b[(i, j)] = value;
                b[(j, i)] = value;
            }
        }
        b
    }

    /// Extrapolated Fock matrix; `None` only for an empty history.
    ///
    /// The full history is tried first. If its error overlap is singular or
    /// ill-conditioned, progressively shorter windows of the most recent
    /// entries are tried down to two. When no window is usable the most recent
    /// Fock matrix is returned unmodified.
    pub fn extrapolate(&self) -> Option<DiisExtrapolation> {
        let latest = self.entries.back()?;
        let m = self.entries.len();
        if m < 2 {
            return Some(self.fallback(latest, FallbackReason::TooFewEntries));
        }

        let b_full = self.error_overlap();
        for size in (2..=m).rev() {
            let start = m - size;
            let b = b_full.view((start, start), (size, size)).into_owned();
            let Some((coefficients, condition)) = solve_subspace(&b, self.params.condition_limit)
            else {
                debug!("DIIS subspace of size {} rejected", size);
                continue;
            };

            let mut fock = DMatrix::zeros(latest.fock.nrows(), latest.fock.ncols());
            for (coeff, entry) in coefficients.iter().zip(self.entries.range(start..)) {
                fock += &entry.fock * *coeff;
            }
            debug!(
                "DIIS extrapolation with {} vectors (condition {:.3e})",
                size, condition
            );
            return Some(DiisExtrapolation {
                fock,
                coefficients,
                subspace: size,
                condition: Some(condition),
                fallback: None,
            });
        }

        Some(self.fallback(latest, FallbackReason::IllConditioned))
    }

    fn fallback(&self, latest: &DiisEntry, reason: FallbackReason) -> DiisExtrapolation {
        DiisExtrapolation {
            fock: latest.fock.clone(),
            coefficients: DVector::from_element(1, 1.0),
            subspace: 1,
            condition: None,
            fallback: Some(reason),
        }
    }
}

/// Solves the augmented DIIS system for one window of the error overlap.
fn solve_subspace(b: &DMatrix<f64>, condition_limit: f64) -> Option<(DVector<f64>, f64)> {
    let n = b.nrows();
    let scale = b.diagonal().max();
    if !(scale > 0.0) || !scale.is_finite() {
        return None;
    }
    let normalized = b / scale;

    let eigenvalues = normalized.clone().symmetric_eigen().eigenvalues;
    let largest = eigenvalues.max();
    let smallest = eigenvalues.min();
    if !(smallest > 0.0) || largest / smallest > condition_limit {
        return None;
    }
    let condition = largest / smallest;

    let mut augmented = DMatrix::zeros(n + 1, n + 1);
    augmented.view_mut((0, 0), (n, n)).copy_from(&normalized);
    for i in 0..n {
        augmented[(i, n)] = -1.0;
        augmented[(n, i)] = -1.0;
    }
    let mut rhs = DVector::zeros(n + 1);
    rhs[n] = -1.0;

    let solution = augmented.lu().solve(&rhs)?;
    let coefficients = solution.rows(0, n).into_owned();
    if coefficients.iter().any(|c| !c.is_finite()) || (coefficients.sum() - 1.0).abs() > 1e-10 {
        return None;
    }
    Some((coefficients, condition))
}
