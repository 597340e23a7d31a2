mod common;

use cdiis_scf::hamiltonian::functional_by_name;
use cdiis_scf::{
    AufbauOccModel, DirectTerm, EffectiveHamiltonian, EnergyTerm, EvictionPolicy, FallbackReason,
    GridGroupTerm, InitialGuess, OneBodyTerm, ScfError, ScfParams, ScfSolution, ScfSolver,
    TabulatedGrid, TwoElectronIntegrals,
};
use common::{h2_631g, h2_sto3g, h4_chain_sto3g, heh_plus_sto3g, integrated_electrons, Molecule};
use nalgebra::DMatrix;
use serde::Deserialize;
use std::sync::Arc;

fn tight_params() -> ScfParams {
    ScfParams {
        convergence_threshold: 1e-9,
        ..ScfParams::default()
    }
}

fn run_hf(molecule: &Molecule, params: ScfParams) -> ScfSolution {
    let (ham, overlap) = molecule.hamiltonian(1.0);
    let occ = AufbauOccModel::closed_shell(molecule.nelectrons).unwrap();
    let solver = ScfSolver::new(&ham, &overlap, &occ, params).unwrap();
    solver.solve(InitialGuess::CoreHamiltonian).unwrap()
}

fn electron_count(solution: &ScfSolution, overlap: &DMatrix<f64>) -> f64 {
    (&solution.density * overlap).trace()
}

#[test]
fn test_integrals_reproduce_h2_sto3g_tables() {
    let ints = h2_sto3g(1.4).integrals();
    assert!((ints.overlap[(0, 0)] - 0.9999999908898001).abs() < 1e-10);
    assert!((ints.overlap[(0, 1)] - 0.6593182001283433).abs() < 1e-10);
    assert!((ints.kinetic[(0, 0)] - 0.7600318766425666).abs() < 1e-10);
    assert!((ints.kinetic[(0, 1)] - 0.2364546538255248).abs() < 1e-10);
    assert!((ints.nuclear[(0, 0)] + 1.880440875342253).abs() < 1e-10);
    assert!((ints.nuclear[(0, 1)] + 1.1948346094841071).abs() < 1e-10);
    assert!((ints.eri.get(0, 0, 0, 0) - 0.774605929806268).abs() < 1e-10);
    assert!((ints.eri.get(1, 0, 0, 0) - 0.4441076499401413).abs() < 1e-10);
    assert!((ints.eri.get(1, 0, 1, 0) - 0.2970285348649528).abs() < 1e-10);
    assert!((ints.eri.get(1, 1, 0, 0) - 0.5696759152240213).abs() < 1e-10);
    ints.eri.check_symmetry(1e-14).unwrap();
}

#[test]
fn test_h2_sto3g_hartree_fock() {
    let molecule = h2_sto3g(1.4);
    let (_, overlap) = molecule.hamiltonian(1.0);
    let solution = run_hf(&molecule, tight_params());

    assert!(solution.converged());
    assert!((solution.total_energy() - -1.116714318713524).abs() < 1e-6);
    assert!((electron_count(&solution, &overlap) - 2.0).abs() < 1e-8);

    let eps = solution.orbitals.energies();
    assert!((eps[0] - -0.5782029780416768).abs() < 1e-5);
    assert!((eps[1] - 0.6702677440587834).abs() < 1e-5);
    assert!((solution.energy.get("kin").unwrap() - 1.2010794920359653).abs() < 1e-5);
    assert!((solution.energy.get("nn").unwrap() - 1.0 / 1.4).abs() < 1e-12);
}

#[test]
fn test_heh_plus_sto3g_hartree_fock() {
    let molecule = heh_plus_sto3g(1.4632);
    let solution = run_hf(&molecule, tight_params());

    assert!(solution.converged());
    assert!((solution.total_energy() - -2.8418364993).abs() < 1e-6);
    assert!((solution.energy.get("nn").unwrap() - 1.3668671405).abs() < 1e-9);
    let eps = solution.orbitals.energies();
    assert!((eps[0] - -1.632803).abs() < 1e-5);
    assert!((eps[1] - -0.172484).abs() < 1e-5);
    assert_eq!(solution.orbitals.homo_energy(), Some(eps[0]));
}

#[test]
fn test_h2_split_valence_hartree_fock() {
    let molecule = h2_631g(1.4);
    let (_, overlap) = molecule.hamiltonian(1.0);
    let solution = run_hf(&molecule, tight_params());

    assert!(solution.converged());
    assert!((solution.total_energy() - -1.1267427045).abs() < 1e-6);
    assert!((electron_count(&solution, &overlap) - 2.0).abs() < 1e-8);
}

#[test]
fn test_h4_chain_uses_diis_subspace() {
    let molecule = h4_chain_sto3g(1.8);
    let (_, overlap) = molecule.hamiltonian(1.0);
    let solution = run_hf(&molecule, tight_params());

    assert!(solution.converged());
    assert!((solution.total_energy() - -2.1134289151).abs() < 1e-6);
    assert!((solution.energy.get("nn").unwrap() - 2.4074074074).abs() < 1e-9);
    assert!((electron_count(&solution, &overlap) - 4.0).abs() < 1e-8);

    assert_eq!(solution.history[0].fallback, Some(FallbackReason::TooFewEntries));
    assert!(solution.history.iter().any(|r| r.diis_subspace >= 2));
    assert_eq!(solution.history.len(), solution.iterations);
}

#[test]
fn test_eviction_policies_reach_same_minimum() {
    let molecule = h4_chain_sto3g(1.8);
    let mut params = tight_params();
    params.diis.capacity = 3;
    let fifo = run_hf(&molecule, params.clone());

    params.diis.eviction = EvictionPolicy::LargestError;
    let largest = run_hf(&molecule, params);

    assert!(fifo.converged() && largest.converged());
    assert!((fifo.total_energy() - largest.total_energy()).abs() < 1e-7);
}

#[test]
fn test_large_coefficients_trigger_damping() {
    let molecule = h4_chain_sto3g(1.8);
    let params = ScfParams {
        coefficient_limit: 0.5,
        ..tight_params()
    };
    let solution = run_hf(&molecule, params);

    assert!(solution.converged());
    assert!((solution.total_energy() - -2.1134289151).abs() < 1e-6);
    assert!(solution.history.iter().any(|r| r.damped));
    for record in solution.history.iter().filter(|r| r.damped) {
        assert!(record.fallback.is_none());
        assert!(record.diis_subspace >= 2);
    }
}

#[test]
fn test_restart_from_converged_density_is_immediate() {
    let molecule = h4_chain_sto3g(1.8);
    let (ham, overlap) = molecule.hamiltonian(1.0);
    let occ = AufbauOccModel::closed_shell(4).unwrap();
    let solver = ScfSolver::new(&ham, &overlap, &occ, tight_params()).unwrap();
    let first = solver.solve(InitialGuess::CoreHamiltonian).unwrap();

    let restart = solver
        .solve(InitialGuess::Density(first.density.clone()))
        .unwrap();
    assert_eq!(restart.iterations, 1);
    assert!((restart.total_energy() - first.total_energy()).abs() < 1e-10);
    assert!((&restart.density - &first.density).amax() < 1e-12);
}

#[test]
fn test_exhausted_budget_returns_last_iterate() {
    let molecule = h4_chain_sto3g(1.8);
    let (ham, overlap) = molecule.hamiltonian(1.0);
    let occ = AufbauOccModel::closed_shell(4).unwrap();
    let params = ScfParams {
        convergence_threshold: 1e-12,
        max_iterations: 2,
        ..ScfParams::default()
    };
    let solver = ScfSolver::new(&ham, &overlap, &occ, params).unwrap();

    match solver.solve(InitialGuess::CoreHamiltonian) {
        Err(ScfError::Convergence(last)) => {
            assert!(!last.converged());
            assert_eq!(last.iterations, 2);
            assert_eq!(last.history.len(), 2);
            assert!(last.error_norm > 1e-12);
            assert!(last.total_energy().is_finite());
            assert_eq!(
                last.energy.iter().map(|(name, _)| name).collect::<Vec<_>>(),
                ["kin", "ne", "hartree", "x_hf", "nn"]
            );
            assert!((electron_count(&last, &overlap) - 4.0).abs() < 1e-8);
        }
        other => panic!("expected a convergence failure, got {:?}", other.map(|s| s.status)),
    }
}

fn kohn_sham(
    molecule: &Molecule,
    functional: &str,
) -> (EffectiveHamiltonian, DMatrix<f64>, Arc<TabulatedGrid>) {
    let ints = molecule.integrals();
    let grid = Arc::new(molecule.grid(50));
    let xc = GridGroupTerm::new(
        "grid_group",
        grid.clone(),
        vec![functional_by_name(functional).unwrap()],
    )
    .unwrap();

    let mut ham = EffectiveHamiltonian::new(molecule.nbasis()).unwrap();
    ham.add_term(OneBodyTerm::new("kin", ints.kinetic).unwrap()).unwrap();
    ham.add_term(OneBodyTerm::new("ne", ints.nuclear).unwrap()).unwrap();
    ham.add_term(DirectTerm::new("hartree", ints.eri)).unwrap();
    ham.add_term(xc).unwrap();
    ham.add_external("nn", ints.nuclear_repulsion).unwrap();
    (ham, ints.overlap, grid)
}

#[test]
fn test_grid_integrates_electron_count() {
    let molecule = h2_sto3g(1.4);
    let hf = run_hf(&molecule, tight_params());
    let grid = molecule.grid(50);
    assert!((integrated_electrons(&grid, &hf.density) - 2.0).abs() < 1e-2);
}

#[test]
fn test_local_exchange_kohn_sham() {
    let molecule = h2_sto3g(1.4);
    let (ham, overlap, grid) = kohn_sham(&molecule, "lda_x");
    let occ = AufbauOccModel::closed_shell(2).unwrap();
    let solver = ScfSolver::new(&ham, &overlap, &occ, tight_params()).unwrap();
    let solution = solver.solve(InitialGuess::CoreHamiltonian).unwrap();

    assert!(solution.converged());
    assert!(solution.total_energy().is_finite());
    assert!(solution.energy.get("grid_group").unwrap() < 0.0);
    assert!((electron_count(&solution, &overlap) - 2.0).abs() < 1e-8);
    assert!((integrated_electrons(&grid, &solution.density) - 2.0).abs() < 1e-2);
}

#[test]
fn test_gradient_exchange_lowers_local_exchange() {
    let molecule = h4_chain_sto3g(1.8);
    let (ham, overlap, grid) = kohn_sham(&molecule, "gga_x_pbe");
    let occ = AufbauOccModel::closed_shell(4).unwrap();
    let solver = ScfSolver::new(&ham, &overlap, &occ, tight_params()).unwrap();
    let solution = solver.solve(InitialGuess::CoreHamiltonian).unwrap();
    assert!(solution.converged());

    // The PBE enhancement factor is at least one at every point.
    let lda = GridGroupTerm::new("lda", grid, vec![functional_by_name("lda_x").unwrap()]).unwrap();
    let e_lda = lda.compute_energy(&solution.density).unwrap();
    let e_pbe = solution.energy.get("grid_group").unwrap();
    assert!(e_pbe < e_lda);
    assert!(e_lda < 0.0);
}

/// Integrals dumped by an external code, with the energy it reported.
#[derive(Deserialize)]
struct ReferenceFixture {
    overlap: Vec<Vec<f64>>,
    kinetic: Vec<Vec<f64>>,
    nuclear_attraction: Vec<Vec<f64>>,
    electron_repulsion: Vec<(usize, usize, usize, usize, f64)>,
    nuclear_repulsion: f64,
    nelectrons: usize,
    reference_energy: f64,
    /// Ascending orbital energies, when the external code reported them.
    #[serde(default)]
    orbital_energies: Option<Vec<f64>>,
}

fn square(rows: &[Vec<f64>]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), rows.len(), |i, j| rows[i][j])
}

/// Point `CDIIS_REFERENCE_FIXTURE` at a JSON dump (e.g. water in a
/// polarized basis) to check against an external Hartree-Fock energy.
#[test]
#[ignore]
fn test_external_reference_fixture() {
    let Ok(path) = std::env::var("CDIIS_REFERENCE_FIXTURE") else {
        eprintln!("CDIIS_REFERENCE_FIXTURE not set, skipping");
        return;
    };
    let content = std::fs::read_to_string(&path).unwrap();
    let fixture: ReferenceFixture = serde_json::from_str(&content).unwrap();

    let overlap = square(&fixture.overlap);
    let n = overlap.nrows();
    let eri = Arc::new(TwoElectronIntegrals::from_unique(n, &fixture.electron_repulsion).unwrap());
    let mut ham = EffectiveHamiltonian::new(n).unwrap();
    ham.add_term(OneBodyTerm::new("kin", square(&fixture.kinetic)).unwrap()).unwrap();
    ham.add_term(OneBodyTerm::new("ne", square(&fixture.nuclear_attraction)).unwrap())
        .unwrap();
    ham.add_term(DirectTerm::new("hartree", eri.clone())).unwrap();
    ham.add_term(cdiis_scf::ExchangeTerm::new("x_hf", eri, 1.0)).unwrap();
    ham.add_external("nn", fixture.nuclear_repulsion).unwrap();

    let occ = AufbauOccModel::closed_shell(fixture.nelectrons).unwrap();
    let solver = ScfSolver::new(&ham, &overlap, &occ, tight_params()).unwrap();
    let solution = solver.solve(InitialGuess::CoreHamiltonian).unwrap();
    assert!((solution.total_energy() - fixture.reference_energy).abs() < 1e-6);

    if let Some(expected) = fixture.orbital_energies {
        let eps = solution.orbitals.energies();
        let (first, last) = (expected[0], expected[expected.len() - 1]);
        assert_eq!(eps.len(), expected.len());
        assert!((eps[0] - first).abs() < 1e-6);
        assert!((eps[eps.len() - 1] - last).abs() < 1e-6);
    }
}
