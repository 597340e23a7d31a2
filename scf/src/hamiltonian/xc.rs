//! Exchange-correlation functional oracles.
//!
//! A functional is a pure pointwise map from the local density (and, for
//! higher rungs, its gradient and kinetic-energy density) to an energy
//! density per volume and its partial derivatives. All quantities refer to the
//! total (spin-summed) density of a closed-shell system.

extern crate nalgebra as na;

use crate::error::{Result, ScfError};
use na::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Ingredients a functional needs, ordered by rung.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalFamily {
    /// Density only.
    Lda,
    /// Density and its gradient.
    Gga,
    /// Density, gradient and kinetic-energy density.
    MetaGga,
}

/// Local density ingredients at one grid point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityPoint {
    pub rho: f64,
    pub grad: Vector3<f64>,
    /// `|∇ρ|²`
    pub sigma: f64,
    /// `½ Σ_i n_i |∇ψ_i|²`
    pub tau: f64,
}

impl DensityPoint {
    pub fn lda(rho: f64) -> Self {
        DensityPoint {
            rho,
            grad: Vector3::zeros(),
            sigma: 0.0,
            tau: 0.0,
        }
    }
}

/// Energy density per volume and its partial derivatives.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct XcPoint {
    pub energy: f64,
    pub v_rho: f64,
    pub v_sigma: f64,
    pub v_tau: f64,
}

impl XcPoint {
    pub fn is_finite(&self) -> bool {
        self.energy.is_finite()
            && self.v_rho.is_finite()
            && self.v_sigma.is_finite()
            && self.v_tau.is_finite()
    }
}

impl std::ops::AddAssign for XcPoint {
    fn add_assign(&mut self, rhs: XcPoint) {
        self.energy += rhs.energy;
        self.v_rho += rhs.v_rho;
        self.v_sigma += rhs.v_sigma;
        self.v_tau += rhs.v_tau;
    }
}

pub trait XcFunctional: Send + Sync {
    fn name(&self) -> &str;
    fn family(&self) -> FunctionalFamily;
    fn evaluate(&self, point: &DensityPoint) -> XcPoint;
}

/// Slater exchange prefactor, `c_x = -(3/4)(3/π)^(1/3)`.
#[inline]
fn c_x() -> f64 {
    -0.75 * (3.0 / PI).powf(1.0 / 3.0)
}

/// Local-density approximation exchange (Slater exchange), unpolarized.
///
/// Energy density:  e_x(ρ) = c_x ρ^(4/3)
/// Potential:       v_x(ρ) = (4/3) c_x ρ^(1/3) = -(3/π)^(1/3) ρ^(1/3)
#[derive(Clone, Copy, Debug, Default)]
pub struct SlaterExchange;

impl XcFunctional for SlaterExchange {
    fn name(&self) -> &str {
        "lda_x"
    }

    fn family(&self) -> FunctionalFamily {
        FunctionalFamily::Lda
    }

    fn evaluate(&self, point: &DensityPoint) -> XcPoint {
        let rho = point.rho;
        if rho <= 0.0 {
            return XcPoint::default();
        }
        let rho13 = rho.cbrt();
        XcPoint {
            energy: c_x() * rho * rho13,
            v_rho: (4.0 / 3.0) * c_x() * rho13,
            ..XcPoint::default()
        }
    }
}

/// PBE exchange (GGA), unpolarized.
///
/// e_x = c_x ρ^(4/3) F_x(s),  F_x(s) = 1 + κ - κ / (1 + μ s² / κ)
///
/// with the reduced gradient `s² = σ / (c² ρ^(8/3))`, `c = 2 (3π²)^(1/3)`.
#[derive(Clone, Copy, Debug)]
pub struct PbeExchange {
    kappa: f64,
    mu: f64,
}

impl Default for PbeExchange {
    fn default() -> Self {
        PbeExchange {
            kappa: 0.804,
            mu: 0.219_514_972_764_517_1,
        }
    }
}

impl XcFunctional for PbeExchange {
    fn name(&self) -> &str {
        "gga_x_pbe"
    }

    fn family(&self) -> FunctionalFamily {
        FunctionalFamily::Gga
    }

    fn evaluate(&self, point: &DensityPoint) -> XcPoint {
        let rho = point.rho;
        if rho <= 0.0 {
            return XcPoint::default();
        }
        let sigma = point.sigma.max(0.0);

        let rho13 = rho.cbrt();
        let rho43 = rho * rho13;
        let e_lda = c_x() * rho43;
        let de_lda_drho = (4.0 / 3.0) * c_x() * rho13;

        let c = 2.0 * (3.0 * PI * PI).powf(1.0 / 3.0);
        let ds2_dsigma = 1.0 / (c * c * rho43 * rho43);
        let s2 = sigma * ds2_dsigma;

        let t = 1.0 + self.mu * s2 / self.kappa;
        let fx = 1.0 + self.kappa - self.kappa / t;
        let dfx_ds2 = self.mu / (t * t);

        XcPoint {
            energy: e_lda * fx,
            v_rho: de_lda_drho * fx + e_lda * dfx_ds2 * (-(8.0 / 3.0) * s2 / rho),
            v_sigma: e_lda * dfx_ds2 * ds2_dsigma,
            v_tau: 0.0,
        }
    }
}

/// Built-in functionals by their configuration name.
pub fn functional_by_name(name: &str) -> Result<Arc<dyn XcFunctional>> {
    match name.to_lowercase().as_str() {
        "lda_x" | "slater" => Ok(Arc::new(SlaterExchange)),
        "gga_x_pbe" | "pbe_x" => Ok(Arc::new(PbeExchange::default())),
        other => Err(ScfError::configuration(format!(
            "unknown exchange-correlation functional '{}' (built-in: lda_x, gga_x_pbe)",
            other
        ))),
    }
}
