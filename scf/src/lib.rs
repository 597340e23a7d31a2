//! Restricted self-consistent field solver with commutator-DIIS acceleration.
//!
//! The Hamiltonian is assembled from independent energy terms (one-body
//! operators, two-electron Coulomb and exchange, grid-integrated density
//! functionals), and the solver iterates density matrices until the
//! commutator `FDS - SDF` vanishes.

pub mod diis;
pub mod error;
pub mod hamiltonian;
pub mod occupation;
pub mod orbitals;
pub mod solver;

pub use diis::{
    commutator_error, DiisExtrapolation, DiisHistory, DiisParams, EvictionPolicy, FallbackReason,
};
pub use error::{Result, ScfError};
pub use hamiltonian::{
    DirectTerm, EffectiveHamiltonian, EnergyBreakdown, EnergyTerm, ExchangeTerm, GridGroupTerm,
    GridPoint, IntegrationGrid, OneBodyTerm, TabulatedGrid, TwoElectronIntegrals,
};
pub use occupation::{AufbauOccModel, FermiOccModel, OccupationModel};
pub use orbitals::{OrbitalState, OverlapMetric};
pub use solver::{
    InitialGuess, IterationRecord, ScfParams, ScfSolution, ScfSolver, ScfStatus,
};
