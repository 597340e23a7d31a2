//! Effective Hamiltonian: an ordered collection of energy terms, each mapping a
//! density matrix to an energy and a Fock contribution.

extern crate nalgebra as na;

pub mod eri;
pub mod grid;
pub mod terms;
pub mod xc;


use crate::error::{check_square, Result, ScfError};
use na::DMatrix;
use rayon::prelude::*;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

pub use eri::TwoElectronIntegrals;
pub use grid::{GridGroupTerm, GridPoint, IntegrationGrid, TabulatedGrid};
pub use terms::{DirectTerm, ExchangeTerm, OneBodyTerm};
pub use xc::{
    functional_by_name, DensityPoint, FunctionalFamily, PbeExchange, SlaterExchange,
    XcFunctional, XcPoint,
};

/// Energy and Fock contribution of one term at one density.
#[derive(Debug, Clone)]
pub struct TermContribution {
    pub energy: f64,
    pub fock: DMatrix<f64>,
}

pub trait EnergyTerm: Send + Sync {
    /// Label used in energy breakdowns; unique within a Hamiltonian.
    fn name(&self) -> &str;

    fn nbasis(&self) -> usize;

    fn compute_energy(&self, density: &DMatrix<f64>) -> Result<f64>;

    /// Derivative of the term's energy with respect to the density matrix.
    fn compute_fock(&self, density: &DMatrix<f64>) -> Result<DMatrix<f64>>;

    /// Energy and Fock contribution together. Terms that share work between the
    /// two override this.
    fn compute(&self, density: &DMatrix<f64>) -> Result<TermContribution> {
        Ok(TermContribution {
            energy: self.compute_energy(density)?,
            fock: self.compute_fock(density)?,
        })
    }

    /// The fixed operator of a density-independent term, used for core guesses.
    fn core_matrix(&self) -> Option<&DMatrix<f64>> {
        None
    }
}

/// Named energy contributions in insertion order, plus their sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnergyBreakdown {
    terms: Vec<(String, f64)>,
    total: f64,
}

impl EnergyBreakdown {
    fn push(&mut self, name: &str, value: f64) {
        self.terms.push((name.to_string(), value));
        self.total += value;
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.terms
            .iter()
            .find(|(term, _)| term == name)
            .map(|(_, value)| *value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.terms.iter().map(|(name, value)| (name.as_str(), *value))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Serialize for EnergyBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.terms.len() + 1))?;
        for (name, value) in &self.terms {
            map.serialize_entry(name, value)?;
        }
        map.serialize_entry("total", &self.total)?;
        map.end()
    }
}

pub struct EffectiveHamiltonian {
    nbasis: usize,
    terms: Vec<Box<dyn EnergyTerm>>,
    external: Vec<(String, f64)>,
}

impl std::fmt::Debug for EffectiveHamiltonian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectiveHamiltonian")
            .field("nbasis", &self.nbasis)
            .field("terms", &self.term_names())
            .field("external", &self.external)
            .finish()
    }
}

impl EffectiveHamiltonian {
    pub fn new(nbasis: usize) -> Result<Self> {
        if nbasis == 0 {
            return Err(ScfError::configuration("basis must contain at least one function"));
        }
        Ok(EffectiveHamiltonian {
            nbasis,
            terms: Vec::new(),
            external: Vec::new(),
        })
    }

    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() || name == "total" {
            return Err(ScfError::configuration(format!(
                "'{}' is not a valid energy term name",
                name
            )));
        }
        let taken = self.terms.iter().any(|t| t.name() == name)
            || self.external.iter().any(|(n, _)| n == name);
        if taken {
            return Err(ScfError::configuration(format!(
                "energy term '{}' added twice",
                name
            )));
        }
        Ok(())
    }

    pub fn add_term(&mut self, term: impl EnergyTerm + 'static) -> Result<()> {
        self.add_boxed(Box::new(term))
    }

    pub fn add_boxed(&mut self, term: Box<dyn EnergyTerm>) -> Result<()> {
        self.check_name(term.name())?;
        if term.nbasis() != self.nbasis {
            return Err(ScfError::configuration(format!(
                "energy term '{}' has {} basis functions, Hamiltonian has {}",
                term.name(),
                term.nbasis(),
                self.nbasis
            )));
        }
        self.terms.push(term);
        Ok(())
    }

    /// A density-independent energy such as nuclear repulsion.
    pub fn add_external(&mut self, name: impl Into<String>, value: f64) -> Result<()> {
        let name = name.into();
        self.check_name(&name)?;
        if !value.is_finite() {
            return Err(ScfError::configuration(format!(
                "external energy '{}' is not finite",
                name
            )));
        }
        self.external.push((name, value));
        Ok(())
    }

    pub fn term_names(&self) -> Vec<&str> {
        self.terms
            .iter()
            .map(|t| t.name())
            .chain(self.external.iter().map(|(n, _)| n.as_str()))
            .collect()
    }

    /// Sum of the density-independent operators, if any term provides one.
    pub fn core_hamiltonian(&self) -> Option<DMatrix<f64>> {
        self.terms
            .iter()
            .filter_map(|t| t.core_matrix())
            .fold(None, |acc: Option<DMatrix<f64>>, m| match acc {
                Some(sum) => Some(sum + m),
                None => Some(m.clone()),
            })
    }

    fn check_energy(name: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(ScfError::numerical(format!(
                "energy term '{}' evaluated to {}",
                name, value
            )));
        }
        Ok(())
    }

    fn finish_breakdown(&self, mut breakdown: EnergyBreakdown) -> EnergyBreakdown {
        for (name, value) in &self.external {
            breakdown.push(name, *value);
        }
        breakdown
    }

    pub fn compute_energy(&self, density: &DMatrix<f64>) -> Result<EnergyBreakdown> {
        check_square("density matrix", density, self.nbasis)?;
        let energies: Vec<Result<f64>> = self
            .terms
            .par_iter()
            .map(|t| t.compute_energy(density))
            .collect();

        let mut breakdown = EnergyBreakdown::default();
        for (term, energy) in self.terms.iter().zip(energies) {
            let energy = energy?;
            Self::check_energy(term.name(), energy)?;
            breakdown.push(term.name(), energy);
        }
        Ok(self.finish_breakdown(breakdown))
    }

    pub fn compute_fock(&self, density: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        Ok(self.compute(density)?.1)
    }

    /// Energy breakdown and total Fock matrix at `density`. Terms are evaluated
    /// in parallel and summed in insertion order.
    pub fn compute(&self, density: &DMatrix<f64>) -> Result<(EnergyBreakdown, DMatrix<f64>)> {
        check_square("density matrix", density, self.nbasis)?;
        let contributions: Vec<Result<TermContribution>> =
            self.terms.par_iter().map(|t| t.compute(density)).collect();

        let mut breakdown = EnergyBreakdown::default();
        let mut fock = DMatrix::zeros(self.nbasis, self.nbasis);
        for (term, contribution) in self.terms.iter().zip(contributions) {
            let contribution = contribution?;
            Self::check_energy(term.name(), contribution.energy)?;
            check_square(term.name(), &contribution.fock, self.nbasis)?;
            if contribution.fock.iter().any(|x| !x.is_finite()) {
                return Err(ScfError::numerical(format!(
                    "energy term '{}' produced non-finite Fock entries",
                    term.name()
                )));
            }
            breakdown.push(term.name(), contribution.energy);
            fock += contribution.fock;
        }

        let fock = (&fock + fock.transpose()) * 0.5;
        Ok((self.finish_breakdown(breakdown), fock))
    }
}
