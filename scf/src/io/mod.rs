//! Input/Output operations
//!
//! This module handles logging setup, loading of integrals and densities, and
//! writing of results.

mod integrals;
mod output;
mod results;

pub use integrals::{load_density, load_integrals, LoadedIntegrals};
pub use output::setup_output;
pub use results::write_results;
