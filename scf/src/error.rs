//! Error taxonomy for the SCF library
//!
//! Configuration and input problems abort before (or as soon as) they are
//! detected, numerical breakdowns in the diagonalization abort the solve, and
//! an exhausted iteration budget hands the last iterate back to the caller.

use crate::solver::ScfSolution;

#[derive(Debug, thiserror::Error)]
pub enum ScfError {
    /// Invalid electron count, mismatched dimensions, bad solver parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Non-positive-definite overlap, non-finite energies or Fock entries.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Iteration budget exhausted; carries the last (unconverged) iterate.
    #[error(
        "SCF did not converge after {} iterations (error norm {:.3e}, energy {:.10})",
        .0.iterations,
        .0.error_norm,
        .0.energy.total()
    )]
    Convergence(Box<ScfSolution>),

    /// Malformed grid or functional data coming from an external collaborator.
    #[error("input error: {0}")]
    Input(String),
}

impl ScfError {
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        ScfError::Configuration(msg.into())
    }

    pub(crate) fn numerical(msg: impl Into<String>) -> Self {
        ScfError::Numerical(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        ScfError::Input(msg.into())
    }

    /// The unconverged iterate, if this is a convergence failure.
    pub fn unconverged(&self) -> Option<&ScfSolution> {
        match self {
            ScfError::Convergence(solution) => Some(solution),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ScfError>;

/// Fails with a configuration error unless `matrix` is `n×n`.
pub(crate) fn check_square(
    label: &str,
    matrix: &nalgebra::DMatrix<f64>,
    n: usize,
) -> Result<()> {
    if matrix.nrows() != n || matrix.ncols() != n {
        return Err(ScfError::configuration(format!(
            "{} has shape {}x{}, expected {}x{}",
            label,
            matrix.nrows(),
            matrix.ncols(),
            n,
            n
        )));
    }
    Ok(())
}
