use crate::config::{Config, ElectronConfig};
use crate::io::LoadedIntegrals;
use cdiis_scf::hamiltonian::functional_by_name;
use cdiis_scf::{
    AufbauOccModel, DirectTerm, EffectiveHamiltonian, ExchangeTerm, FermiOccModel,
    GridGroupTerm, OccupationModel, OneBodyTerm,
};
use color_eyre::eyre::{bail, Result, WrapErr};
use nalgebra::DMatrix;
use std::sync::Arc;
use tracing::info;

/// Everything needed to start the SCF loop.
pub struct CalculationWorkspace {
    pub overlap: DMatrix<f64>,
    pub hamiltonian: EffectiveHamiltonian,
    pub occupation: Box<dyn OccupationModel>,
}

impl CalculationWorkspace {
    pub fn build(integrals: LoadedIntegrals, config: &Config) -> Result<Self> {
        let hamiltonian = build_hamiltonian(integrals.nbasis(), &integrals, config)?;
        let occupation = build_occupation(&config.electrons, config.fermi_temperature)?;
        info!(
            "Hamiltonian terms: {}",
            hamiltonian.term_names().join(", ")
        );
        Ok(Self {
            overlap: integrals.overlap,
            hamiltonian,
            occupation,
        })
    }
}

fn build_hamiltonian(
    nbasis: usize,
    integrals: &LoadedIntegrals,
    config: &Config,
) -> Result<EffectiveHamiltonian> {
    let mut ham = EffectiveHamiltonian::new(nbasis)?;
    ham.add_term(OneBodyTerm::new("kin", integrals.kinetic.clone())?)?;
    ham.add_term(OneBodyTerm::new("ne", integrals.nuclear_attraction.clone())?)?;

    let eri = Arc::new(integrals.electron_repulsion.clone());
    ham.add_term(DirectTerm::new("hartree", eri.clone()))?;

    let fraction = config.hamiltonian.exchange_fraction.unwrap_or(1.0);
    if fraction != 0.0 {
        ham.add_term(ExchangeTerm::new("x_hf", eri, fraction))?;
    }

    let names = config.functionals();
    if !names.is_empty() {
        let Some(grid) = integrals.grid.clone() else {
            bail!(
                "functionals {:?} requested but the integrals file has no grid",
                names
            );
        };
        let functionals = names
            .iter()
            .map(|name| functional_by_name(name))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "Integrating {} on {} grid points",
            names.join(" + "),
            cdiis_scf::IntegrationGrid::len(&grid)
        );
        let cutoff = config.hamiltonian.density_cutoff.unwrap_or(1e-14);
        let term = GridGroupTerm::new("grid_group", Arc::new(grid), functionals)?
            .with_density_cutoff(cutoff);
        ham.add_term(term)?;
    }

    ham.add_external("nn", integrals.nuclear_repulsion)
        .wrap_err("Invalid nuclear repulsion energy")?;
    Ok(ham)
}

pub fn build_occupation(
    electrons: &ElectronConfig,
    fermi_temperature: Option<f64>,
) -> Result<Box<dyn OccupationModel>> {
    match (electrons.count, electrons.alpha, electrons.beta) {
        (None, Some(alpha), Some(beta)) => {
            info!("Occupation: {} alpha, {} beta electrons", alpha, beta);
            Ok(Box::new(AufbauOccModel::new(alpha, beta)))
        }
        (Some(count), None, None) => match fermi_temperature {
            Some(t) if t > 0.0 => {
                info!("Occupation: {} electrons, Fermi smearing at {} K", count, t);
                Ok(Box::new(FermiOccModel::new(count, t)?))
            }
            _ if count % 2 == 0 => {
                info!("Occupation: {} electrons, closed shell", count);
                Ok(Box::new(AufbauOccModel::closed_shell(count)?))
            }
            _ => {
                info!("Occupation: {} electrons, one unpaired", count);
                Ok(Box::new(AufbauOccModel::new(count / 2 + 1, count / 2)))
            }
        },
        _ => bail!("electrons must give either `count` or both `alpha` and `beta`"),
    }
}
