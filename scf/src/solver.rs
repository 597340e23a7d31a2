//! Self-consistent field driver with CDIIS acceleration.
//!
//! Each cycle evaluates the Hamiltonian at the current density, measures the
//! commutator error, stores the triple in the DIIS history and, unless the
//! error is below the threshold, diagonalizes the extrapolated Fock matrix to
//! obtain the next density.

extern crate nalgebra as na;

use crate::diis::{commutator_error, DiisHistory, DiisParams, FallbackReason};
use crate::error::{check_square, Result, ScfError};
use crate::hamiltonian::{EffectiveHamiltonian, EnergyBreakdown};
use crate::occupation::OccupationModel;
use crate::orbitals::{OrbitalState, OverlapMetric};
use na::DMatrix;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScfParams {
    /// Threshold on the Frobenius norm of `FDS - SDF`.
    pub convergence_threshold: f64,
    pub max_iterations: usize,
    pub diis: DiisParams,
    /// Extrapolations with a larger coefficient magnitude are damped.
    pub coefficient_limit: f64,
    /// Weight of the new Fock matrix when damping.
    pub damping: f64,
    pub time_limit: Option<Duration>,
}

impl Default for ScfParams {
    fn default() -> Self {
        ScfParams {
            convergence_threshold: 1e-6,
            max_iterations: 128,
            diis: DiisParams::default(),
            coefficient_limit: 1e4,
            damping: 0.5,
            time_limit: None,
        }
    }
}

impl ScfParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.convergence_threshold > 0.0) || !self.convergence_threshold.is_finite() {
            return Err(ScfError::configuration(format!(
                "convergence threshold must be positive, got {}",
                self.convergence_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(ScfError::configuration("max_iterations must be at least 1"));
        }
        if !(self.coefficient_limit > 0.0) {
            return Err(ScfError::configuration(format!(
                "DIIS coefficient limit must be positive, got {}",
                self.coefficient_limit
            )));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(ScfError::configuration(format!(
                "damping factor must lie in (0, 1], got {}",
                self.damping
            )));
        }
        self.diis.validate()
    }
}

/// Where the first density comes from.
#[derive(Debug, Clone)]
pub enum InitialGuess {
    /// Diagonalize the sum of the density-independent terms.
    CoreHamiltonian,
    /// A caller-supplied density matrix.
    Density(DMatrix<f64>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScfStatus {
    Initializing,
    Iterating,
    Converged,
    Failed,
}

/// Diagnostics of one SCF cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub energy: f64,
    pub energy_change: Option<f64>,
    pub error_norm: f64,
    /// Number of DIIS vectors mixed into the next Fock matrix (0 once converged).
    pub diis_subspace: usize,
    pub fallback: Option<FallbackReason>,
    pub damped: bool,
}

/// Outcome of a solve. For a failed solve this is the last evaluated iterate.
#[derive(Debug, Clone, Serialize)]
pub struct ScfSolution {
    pub status: ScfStatus,
    pub iterations: usize,
    pub energy: EnergyBreakdown,
    pub error_norm: f64,
    pub density: DMatrix<f64>,
    pub fock: DMatrix<f64>,
    pub orbitals: OrbitalState,
    pub history: Vec<IterationRecord>,
}

impl ScfSolution {
    pub fn converged(&self) -> bool {
        self.status == ScfStatus::Converged
    }

    pub fn total_energy(&self) -> f64 {
        self.energy.total()
    }
}

/// The quantities evaluated at one density.
struct Iterate {
    density: DMatrix<f64>,
    energy: EnergyBreakdown,
    fock: DMatrix<f64>,
    error_norm: f64,
}

pub struct ScfSolver<'a> {
    hamiltonian: &'a EffectiveHamiltonian,
    metric: OverlapMetric,
    occupation: &'a dyn OccupationModel,
    params: ScfParams,
}

impl<'a> ScfSolver<'a> {
    /// Validates the problem up front: parameters, overlap metric, matching
    /// dimensions and the electron count.
    pub fn new(
        hamiltonian: &'a EffectiveHamiltonian,
        overlap: &DMatrix<f64>,
        occupation: &'a dyn OccupationModel,
        params: ScfParams,
    ) -> Result<Self> {
        params.validate()?;
        check_square("overlap matrix", overlap, hamiltonian.nbasis())?;
        let metric = OverlapMetric::new(overlap)?;
        let nelectrons = occupation.nelectrons();
        if !(nelectrons > 0.0) {
            return Err(ScfError::configuration(format!(
                "electron count must be positive, got {}",
                nelectrons
            )));
        }
        occupation.check_capacity(metric.nbasis())?;

        info!(
            "SCF setup: {} basis functions, {} electrons, threshold {:e}, DIIS capacity {}",
            metric.nbasis(),
            nelectrons,
            params.convergence_threshold,
            params.diis.capacity
        );
        Ok(ScfSolver {
            hamiltonian,
            metric,
            occupation,
            params,
        })
    }

    pub fn params(&self) -> &ScfParams {
        &self.params
    }

    pub fn metric(&self) -> &OverlapMetric {
        &self.metric
    }

    pub fn solve(&self, guess: InitialGuess) -> Result<ScfSolution> {
        self.solve_with_observer(guess, |_| ControlFlow::Continue(()))
    }

    /// Runs the SCF loop, reporting every cycle to `observer`. Returning
    /// `ControlFlow::Break` stops the loop and fails with the last iterate.
    pub fn solve_with_observer<O>(&self, guess: InitialGuess, mut observer: O) -> Result<ScfSolution>
    where
        O: FnMut(&IterationRecord) -> ControlFlow<()>,
    {
        let started = Instant::now();
        let mut status = ScfStatus::Initializing;
        let mut density = self.initial_density(guess)?;

        status = self.transition(status, ScfStatus::Iterating);
        let mut diis = DiisHistory::new(self.params.diis.clone())?;
        let mut records: Vec<IterationRecord> = Vec::new();
        let mut previous_energy: Option<f64> = None;
        let mut previous_fock: Option<DMatrix<f64>> = None;

        for iteration in 1..=self.params.max_iterations {
            let (energy, fock) = self.hamiltonian.compute(&density)?;
            let error = commutator_error(&fock, &density, self.metric.overlap());
            let error_norm = error.norm();
            if !error_norm.is_finite() {
                return Err(ScfError::numerical(format!(
                    "commutator error norm is {} in cycle {}",
                    error_norm, iteration
                )));
            }
            diis.push(fock.clone(), density.clone(), error)?;

            let total = energy.total();
            let converged = error_norm < self.params.convergence_threshold;
            let mut record = IterationRecord {
                iteration,
                energy: total,
                energy_change: previous_energy.map(|e| total - e),
                error_norm,
                diis_subspace: 0,
                fallback: None,
                damped: false,
            };

            let mut next_density = None;
            if !converged && iteration < self.params.max_iterations {
                let step = diis
                    .extrapolate()
                    .ok_or_else(|| ScfError::numerical("DIIS history is empty after push"))?;
                record.diis_subspace = step.subspace;
                record.fallback = step.fallback;

                let extrapolated = !step.is_fallback();
                let largest = step.coefficients.amax();
                let mut next_fock = step.fock;
                if extrapolated && largest > self.params.coefficient_limit {
                    let alpha = self.params.damping;
                    let reference = previous_fock.as_ref().unwrap_or(&fock);
                    warn!(
                        "DIIS coefficient magnitude {:.3e} exceeds {:.3e}, damping with alpha = {}",
                        largest, self.params.coefficient_limit, alpha
                    );
                    next_fock = &fock * alpha + reference * (1.0 - alpha);
                    record.damped = true;
                }
                if let Some(reason) = step.fallback {
                    debug!("DIIS fell back to the latest Fock matrix: {:?}", reason);
                }

                let orbitals = OrbitalState::from_fock_and_density(
                    &next_fock,
                    &density,
                    &self.metric,
                    self.occupation,
                )?;
                next_density = Some(orbitals.to_density());
                previous_fock = Some(next_fock);
            }

            info!(
                "Cycle {}: E = {:.12} au, dE = {:.3e} au, |FDS-SDF| = {:.3e}, DIIS vectors {}",
                iteration,
                total,
                record.energy_change.unwrap_or(0.0),
                error_norm,
                record.diis_subspace
            );
            let flow = observer(&record);
            records.push(record);

            let current = Iterate {
                density,
                energy,
                fock,
                error_norm,
            };

            if converged {
                status = self.transition(status, ScfStatus::Converged);
                info!("SCF converged in {} cycles.", iteration);
                info!("Final energy: {:.12} au", total);
                return self.finish(status, iteration, current, records);
            }
            if flow.is_break() {
                warn!("SCF stopped by the caller after {} cycles", iteration);
                return self.fail(status, iteration, current, records);
            }
            if let Some(limit) = self.params.time_limit {
                if started.elapsed() >= limit {
                    warn!(
                        "SCF exceeded its time limit of {:.1} s after {} cycles",
                        limit.as_secs_f64(),
                        iteration
                    );
                    return self.fail(status, iteration, current, records);
                }
            }

            match next_density {
                Some(next) => density = next,
                None => {
                    warn!(
                        "SCF did not converge within {} cycles",
                        self.params.max_iterations
                    );
                    return self.fail(status, iteration, current, records);
                }
            }
            previous_energy = Some(total);
        }

        // max_iterations >= 1 and the last cycle always returns
        Err(ScfError::configuration("max_iterations must be at least 1"))
    }

    fn transition(&self, from: ScfStatus, to: ScfStatus) -> ScfStatus {
        debug!("SCF state {:?} -> {:?}", from, to);
        to
    }

    fn initial_density(&self, guess: InitialGuess) -> Result<DMatrix<f64>> {
        match guess {
            InitialGuess::CoreHamiltonian => {
                let core = self.hamiltonian.core_hamiltonian().ok_or_else(|| {
                    ScfError::configuration(
                        "core-Hamiltonian guess needs at least one density-independent term",
                    )
                })?;
                info!("Initial guess: core Hamiltonian");
                let orbitals = OrbitalState::from_fock(&core, &self.metric, self.occupation)?;
                Ok(orbitals.to_density())
            }
            InitialGuess::Density(density) => {
                let n = self.metric.nbasis();
                check_square("initial density", &density, n)?;
                if density.iter().any(|x| !x.is_finite()) {
                    return Err(ScfError::configuration("initial density has non-finite entries"));
                }
                let asymmetry = (&density - density.transpose()).amax();
                if asymmetry > 1e-8 * density.amax().max(1.0) {
                    return Err(ScfError::configuration(format!(
                        "initial density is not symmetric (max deviation {:.3e})",
                        asymmetry
                    )));
                }
                let count = (&density * self.metric.overlap()).trace();
                let expected = self.occupation.nelectrons();
                if (count - expected).abs() > 1e-6 * expected.max(1.0) {
                    return Err(ScfError::configuration(format!(
                        "initial density holds {:.8} electrons, expected {}",
                        count, expected
                    )));
                }
                info!("Initial guess: supplied density ({:.6} electrons)", count);
                Ok((&density + density.transpose()) * 0.5)
            }
        }
    }

    fn finish(
        &self,
        status: ScfStatus,
        iterations: usize,
        current: Iterate,
        history: Vec<IterationRecord>,
    ) -> Result<ScfSolution> {
        let orbitals = OrbitalState::from_fock_and_density(
            &current.fock,
            &current.density,
            &self.metric,
            self.occupation,
        )?;
        Ok(ScfSolution {
            status,
            iterations,
            energy: current.energy,
            error_norm: current.error_norm,
            density: current.density,
            fock: current.fock,
            orbitals,
            history,
        })
    }

    fn fail(
        &self,
        status: ScfStatus,
        iterations: usize,
        current: Iterate,
        history: Vec<IterationRecord>,
    ) -> Result<ScfSolution> {
        let status = self.transition(status, ScfStatus::Failed);
        let solution = self.finish(status, iterations, current, history)?;
        Err(ScfError::Convergence(Box::new(solution)))
    }
}
