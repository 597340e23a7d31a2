//! Occupation models: how electrons are distributed over orbitals ordered by energy.

extern crate nalgebra as na;

use crate::error::{Result, ScfError};
use na::DVector;
use std::cmp::Ordering;

/// Boltzmann constant in Hartree per Kelvin.
pub const K_BOLTZMANN: f64 = 3.166_811_563_455_6e-6;

/// Assigns occupations (each in `[0, 2]`, restricted formalism) to orbitals.
pub trait OccupationModel: Send + Sync {
    /// Total number of electrons placed by this model.
    fn nelectrons(&self) -> f64;

    /// Occupation vector for the given orbital energies (same order as `energies`).
    fn assign(&self, energies: &DVector<f64>) -> Result<DVector<f64>>;

    /// Checks that the model can place its electrons in `nbasis` orbitals.
    fn check_capacity(&self, nbasis: usize) -> Result<()> {
        let capacity = 2.0 * nbasis as f64;
        if self.nelectrons() > capacity {
            return Err(ScfError::configuration(format!(
                "{} electrons do not fit in {} orbitals",
                self.nelectrons(),
                nbasis
            )));
        }
        Ok(())
    }
}

/// Orbital indices ordered by ascending energy; equal energies keep index order.
fn ascending_order(energies: &DVector<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..energies.len()).collect();
    order.sort_by(|&a, &b| match energies[a].total_cmp(&energies[b]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });
    order
}

/// Aufbau filling: lowest orbitals first, ties resolved by orbital index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AufbauOccModel {
    nalpha: usize,
    nbeta: usize,
}

impl AufbauOccModel {
    /// Restricted open-shell split: orbitals below `min(nalpha, nbeta)` get 2,
    /// the remaining ones up to `max(nalpha, nbeta)` get 1.
    pub fn new(nalpha: usize, nbeta: usize) -> Self {
        AufbauOccModel { nalpha, nbeta }
    }

    /// Closed-shell model for an even electron count.
    pub fn closed_shell(nelectrons: usize) -> Result<Self> {
        if nelectrons % 2 != 0 {
            return Err(ScfError::configuration(format!(
                "closed-shell occupation needs an even electron count, got {}",
                nelectrons
            )));
        }
        Ok(AufbauOccModel::new(nelectrons / 2, nelectrons / 2))
    }

    pub fn nalpha(&self) -> usize {
        self.nalpha
    }

    pub fn nbeta(&self) -> usize {
        self.nbeta
    }
}

impl OccupationModel for AufbauOccModel {
    fn nelectrons(&self) -> f64 {
        (self.nalpha + self.nbeta) as f64
    }

    fn assign(&self, energies: &DVector<f64>) -> Result<DVector<f64>> {
        let n = energies.len();
        if self.nalpha.max(self.nbeta) > n {
            return Err(ScfError::configuration(format!(
                "cannot place {} alpha / {} beta electrons in {} orbitals",
                self.nalpha, self.nbeta, n
            )));
        }

        let mut occupations = DVector::zeros(n);
        for (rank, &orbital) in ascending_order(energies).iter().enumerate() {
            let alpha = if rank < self.nalpha { 1.0 } else { 0.0 };
            let beta = if rank < self.nbeta { 1.0 } else { 0.0 };
            occupations[orbital] = alpha + beta;
        }
        Ok(occupations)
    }
}

/// Fermi-Dirac smearing with a chemical potential fixed by the electron count.
///
/// The occupation of orbital `a` is `2 / (exp((e_a - mu) / kT) + 1)`. At zero
/// temperature this reduces to closed-shell Aufbau filling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FermiOccModel {
    nelectrons: usize,
    temperature: f64,
}

impl FermiOccModel {
    /// `temperature` in Kelvin.
    pub fn new(nelectrons: usize, temperature: f64) -> Result<Self> {
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(ScfError::configuration(format!(
                "Fermi temperature must be a non-negative number, got {}",
                temperature
            )));
        }
        Ok(FermiOccModel {
            nelectrons,
            temperature,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn occupation(energy: f64, mu: f64, kt: f64) -> f64 {
        2.0 / (((energy - mu) / kt).exp() + 1.0)
    }

    /// Chemical potential found by bisection on the monotone electron count.
    pub fn chemical_potential(&self, energies: &DVector<f64>) -> f64 {
        let kt = K_BOLTZMANN * self.temperature;
        let target = self.nelectrons as f64;
        let count = |mu: f64| -> f64 {
            energies
                .iter()
                .map(|&e| Self::occupation(e, mu, kt))
                .sum::<f64>()
        };

        let mut lo = energies.min() - 1.0;
        let mut hi = energies.max() + 1.0;
        while count(lo) > target {
            lo -= (hi - lo).max(1.0);
        }
        while count(hi) < target {
            hi += (hi - lo).max(1.0);
        }

        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            let excess = count(mid) - target;
            if excess.abs() < 1e-13 || hi - lo < f64::EPSILON * mid.abs().max(1.0) {
                return mid;
            }
            if excess > 0.0 {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

impl OccupationModel for FermiOccModel {
    fn nelectrons(&self) -> f64 {
        self.nelectrons as f64
    }

    fn assign(&self, energies: &DVector<f64>) -> Result<DVector<f64>> {
        let n = energies.len();
        if self.nelectrons > 2 * n {
            return Err(ScfError::configuration(format!(
                "cannot place {} electrons in {} orbitals",
                self.nelectrons, n
            )));
        }
        if self.temperature == 0.0 || self.nelectrons == 0 || self.nelectrons == 2 * n {
            let npair = self.nelectrons / 2;
            return AufbauOccModel::new(npair + self.nelectrons % 2, npair).assign(energies);
        }

        let kt = K_BOLTZMANN * self.temperature;
        let mu = self.chemical_potential(energies);
        Ok(energies.map(|e| Self::occupation(e, mu, kt)))
    }
}
