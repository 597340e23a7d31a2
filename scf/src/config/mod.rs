//! Configuration management for SCF runs
//!
//! This module holds the YAML configuration structures, their defaults, and
//! the translation into solver parameters.

mod args;

pub use args::Args;

use cdiis_scf::{DiisParams, EvictionPolicy, ScfParams as SolverParams};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Path to the JSON file with the integrals (relative to the config file).
    pub integrals: String,
    pub electrons: ElectronConfig,
    /// Fermi smearing temperature in Kelvin; Aufbau filling when absent or zero.
    pub fermi_temperature: Option<f64>,
    #[serde(default)]
    pub scf_params: ScfParams,
    #[serde(default)]
    pub initial_guess: GuessConfig,
    #[serde(default)]
    pub hamiltonian: HamiltonianConfig,
}

/// Either a total electron count or an explicit alpha/beta split
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ElectronConfig {
    pub count: Option<usize>,
    pub alpha: Option<usize>,
    pub beta: Option<usize>,
}

/// SCF-specific parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScfParams {
    pub convergence_threshold: Option<f64>,
    pub max_iterations: Option<usize>,
    pub diis_capacity: Option<usize>,
    pub diis_eviction: Option<EvictionPolicy>,
    pub diis_condition_limit: Option<f64>,
    pub damping: Option<f64>,
    pub coefficient_limit: Option<f64>,
    pub time_limit_seconds: Option<f64>,
}

impl Default for ScfParams {
    fn default() -> Self {
        let solver = SolverParams::default();
        ScfParams {
            convergence_threshold: Some(solver.convergence_threshold),
            max_iterations: Some(solver.max_iterations),
            diis_capacity: Some(solver.diis.capacity),
            diis_eviction: Some(solver.diis.eviction),
            diis_condition_limit: Some(solver.diis.condition_limit),
            damping: Some(solver.damping),
            coefficient_limit: Some(solver.coefficient_limit),
            time_limit_seconds: None,
        }
    }
}

impl ScfParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.convergence_threshold.is_none() {
            self.convergence_threshold = defaults.convergence_threshold;
        }
        if self.max_iterations.is_none() {
            self.max_iterations = defaults.max_iterations;
        }
        if self.diis_capacity.is_none() {
            self.diis_capacity = defaults.diis_capacity;
        }
        if self.diis_eviction.is_none() {
            self.diis_eviction = defaults.diis_eviction;
        }
        if self.diis_condition_limit.is_none() {
            self.diis_condition_limit = defaults.diis_condition_limit;
        }
        if self.damping.is_none() {
            self.damping = defaults.damping;
        }
        if self.coefficient_limit.is_none() {
            self.coefficient_limit = defaults.coefficient_limit;
        }
        self
    }

    /// Solver parameters after applying command-line overrides.
    pub fn resolve(&self, args: &Args) -> SolverParams {
        let solver = SolverParams::default();
        SolverParams {
            convergence_threshold: args
                .convergence_threshold
                .or(self.convergence_threshold)
                .unwrap_or(solver.convergence_threshold),
            max_iterations: args
                .max_iterations
                .or(self.max_iterations)
                .unwrap_or(solver.max_iterations),
            diis: DiisParams {
                capacity: args
                    .diis_capacity
                    .or(self.diis_capacity)
                    .unwrap_or(solver.diis.capacity),
                eviction: self.diis_eviction.unwrap_or(solver.diis.eviction),
                condition_limit: self
                    .diis_condition_limit
                    .unwrap_or(solver.diis.condition_limit),
            },
            coefficient_limit: self.coefficient_limit.unwrap_or(solver.coefficient_limit),
            damping: self.damping.unwrap_or(solver.damping),
            time_limit: args
                .time_limit_seconds
                .or(self.time_limit_seconds)
                .filter(|s| s.is_finite() && *s >= 0.0)
                .map(Duration::from_secs_f64),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GuessKind {
    #[default]
    CoreHamiltonian,
    Density,
}

/// Initial-guess strategy
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GuessConfig {
    pub kind: Option<GuessKind>,
    /// JSON file holding the starting density as a list of rows.
    pub density_file: Option<String>,
}

/// Which two-electron and density-functional terms to assemble
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HamiltonianConfig {
    /// Scale of the exact-exchange term; 0 drops it.
    pub exchange_fraction: Option<f64>,
    /// Built-in functionals integrated on the grid of the integrals file.
    pub functionals: Option<Vec<String>>,
    pub density_cutoff: Option<f64>,
}

impl Default for HamiltonianConfig {
    fn default() -> Self {
        HamiltonianConfig {
            exchange_fraction: Some(1.0),
            functionals: Some(Vec::new()),
            density_cutoff: Some(1e-14),
        }
    }
}

impl HamiltonianConfig {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.exchange_fraction.is_none() {
            self.exchange_fraction = defaults.exchange_fraction;
        }
        if self.functionals.is_none() {
            self.functionals = defaults.functionals;
        }
        if self.density_cutoff.is_none() {
            self.density_cutoff = defaults.density_cutoff;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.scf_params = self.scf_params.with_defaults();
        self.hamiltonian = self.hamiltonian.with_defaults();
        if self.initial_guess.kind.is_none() {
            self.initial_guess.kind = Some(GuessKind::default());
        }
        self
    }

    pub fn guess_kind(&self) -> GuessKind {
        self.initial_guess.kind.unwrap_or_default()
    }

    pub fn functionals(&self) -> &[String] {
        self.hamiltonian.functionals.as_deref().unwrap_or(&[])
    }
}
