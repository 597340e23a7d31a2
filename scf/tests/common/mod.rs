//! Shared fixtures: analytic integrals over contracted s-type Gaussians and a
//! Becke-partitioned molecular grid tabulating those functions.

#![allow(dead_code)]

use cdiis_scf::{
    DirectTerm, EffectiveHamiltonian, ExchangeTerm, GridPoint, OneBodyTerm, TabulatedGrid,
    TwoElectronIntegrals,
};
use nalgebra::{DMatrix, DVector, Matrix3xX, Vector3};
use std::f64::consts::PI;
use std::sync::Arc;

const STO3G_COEFFS: [f64; 3] = [0.15432897, 0.53532814, 0.44463454];
const H_STO3G_EXPS: [f64; 3] = [3.42525091, 0.62391373, 0.16885540];
const HE_STO3G_EXPS: [f64; 3] = [6.36242139, 1.15892300, 0.31364979];

/// Contracted s function; coefficients include primitive normalization.
#[derive(Clone, Debug)]
pub struct Shell {
    pub center: Vector3<f64>,
    pub primitives: Vec<(f64, f64)>,
}

impl Shell {
    pub fn new(center: Vector3<f64>, exponents: &[f64], coefficients: &[f64]) -> Self {
        let primitives = exponents
            .iter()
            .zip(coefficients)
            .map(|(&a, &c)| (a, c * (2.0 * a / PI).powf(0.75)))
            .collect();
        Shell { center, primitives }
    }

    pub fn value(&self, r: &Vector3<f64>) -> f64 {
        let d2 = (r - self.center).norm_squared();
        self.primitives
            .iter()
            .map(|&(a, c)| c * (-a * d2).exp())
            .sum()
    }

    pub fn gradient(&self, r: &Vector3<f64>) -> Vector3<f64> {
        let d = r - self.center;
        let d2 = d.norm_squared();
        self.primitives
            .iter()
            .map(|&(a, c)| d * (-2.0 * a * c * (-a * d2).exp()))
            .sum()
    }
}

/// F_0(t) = ½ √(π/t) erf(√t)
fn boys_f0(t: f64) -> f64 {
    if t < 1e-12 {
        1.0 - t / 3.0
    } else {
        0.5 * (PI / t).sqrt() * libm::erf(t.sqrt())
    }
}

#[derive(Clone, Debug)]
pub struct Molecule {
    pub nuclei: Vec<(Vector3<f64>, f64)>,
    pub shells: Vec<Shell>,
    pub nelectrons: usize,
}

/// Analytic one- and two-electron integrals of a [`Molecule`].
pub struct Integrals {
    pub overlap: DMatrix<f64>,
    pub kinetic: DMatrix<f64>,
    pub nuclear: DMatrix<f64>,
    pub eri: Arc<TwoElectronIntegrals>,
    pub nuclear_repulsion: f64,
}

impl Molecule {
    pub fn nbasis(&self) -> usize {
        self.shells.len()
    }

    pub fn nuclear_repulsion(&self) -> f64 {
        let mut e = 0.0;
        for (i, (ri, zi)) in self.nuclei.iter().enumerate() {
            for (rj, zj) in &self.nuclei[..i] {
                e += zi * zj / (ri - rj).norm();
            }
        }
        e
    }

    fn pair_integral<F>(&self, f: F) -> DMatrix<f64>
    where
        F: Fn(f64, f64, &Vector3<f64>, &Vector3<f64>) -> f64,
    {
        let n = self.nbasis();
        DMatrix::from_fn(n, n, |i, j| {
            let (si, sj) = (&self.shells[i], &self.shells[j]);
            let mut acc = 0.0;
            for &(a, ca) in &si.primitives {
                for &(b, cb) in &sj.primitives {
                    acc += ca * cb * f(a, b, &si.center, &sj.center);
                }
            }
            acc
        })
    }

    pub fn integrals(&self) -> Integrals {
        let overlap = self.pair_integral(|a, b, ra, rb| {
            let p = a + b;
            let mu = a * b / p;
            (PI / p).powf(1.5) * (-mu * (ra - rb).norm_squared()).exp()
        });
        let kinetic = self.pair_integral(|a, b, ra, rb| {
            let p = a + b;
            let mu = a * b / p;
            let r2 = (ra - rb).norm_squared();
            mu * (3.0 - 2.0 * mu * r2) * (PI / p).powf(1.5) * (-mu * r2).exp()
        });
        let nuclear = self.pair_integral(|a, b, ra, rb| {
            let p = a + b;
            let mu = a * b / p;
            let centre = (ra * a + rb * b) / p;
            let pre = 2.0 * PI / p * (-mu * (ra - rb).norm_squared()).exp();
            self.nuclei
                .iter()
                .map(|(rc, z)| -z * pre * boys_f0(p * (centre - rc).norm_squared()))
                .sum()
        });

        let shells = &self.shells;
        let eri = TwoElectronIntegrals::from_fn(self.nbasis(), |i, j, k, l| {
            let mut acc = 0.0;
            for &(a, ca) in &shells[i].primitives {
                for &(b, cb) in &shells[j].primitives {
                    let p = a + b;
                    let rab = (shells[i].center - shells[j].center).norm_squared();
                    let pc = (shells[i].center * a + shells[j].center * b) / p;
                    for &(c, cc) in &shells[k].primitives {
                        for &(d, cd) in &shells[l].primitives {
                            let q = c + d;
                            let rcd = (shells[k].center - shells[l].center).norm_squared();
                            let qc = (shells[k].center * c + shells[l].center * d) / q;
                            let pre = 2.0 * PI.powf(2.5) / (p * q * (p + q).sqrt());
                            let damp = (-a * b / p * rab - c * d / q * rcd).exp();
                            acc += ca * cb * cc * cd * pre * damp
                                * boys_f0(p * q / (p + q) * (pc - qc).norm_squared());
                        }
                    }
                }
            }
            acc
        });

        Integrals {
            overlap,
            kinetic,
            nuclear,
            eri: Arc::new(eri),
            nuclear_repulsion: self.nuclear_repulsion(),
        }
    }

    /// Hamiltonian with one-body terms, Hartree, scaled exact exchange and
    /// nuclear repulsion; returns it with the overlap matrix.
    pub fn hamiltonian(&self, exchange_fraction: f64) -> (EffectiveHamiltonian, DMatrix<f64>) {
        let ints = self.integrals();
        let mut ham = EffectiveHamiltonian::new(self.nbasis()).unwrap();
        ham.add_term(OneBodyTerm::new("kin", ints.kinetic).unwrap()).unwrap();
        ham.add_term(OneBodyTerm::new("ne", ints.nuclear).unwrap()).unwrap();
        ham.add_term(DirectTerm::new("hartree", ints.eri.clone())).unwrap();
        if exchange_fraction != 0.0 {
            ham.add_term(ExchangeTerm::new("x_hf", ints.eri, exchange_fraction))
                .unwrap();
        }
        ham.add_external("nn", ints.nuclear_repulsion).unwrap();
        (ham, ints.overlap)
    }

    /// Atom-centred grid tabulating every shell and its gradient.
    pub fn grid(&self, radial_points: usize) -> TabulatedGrid {
        let centers: Vec<Vector3<f64>> = self.nuclei.iter().map(|(r, _)| *r).collect();
        let points = becke_grid(&centers, radial_points)
            .into_iter()
            .map(|(r, w)| {
                let values = DVector::from_iterator(
                    self.nbasis(),
                    self.shells.iter().map(|s| s.value(&r)),
                );
                let mut gradients = Matrix3xX::zeros(self.nbasis());
                for (i, shell) in self.shells.iter().enumerate() {
                    gradients.set_column(i, &shell.gradient(&r));
                }
                GridPoint {
                    position: r,
                    weight: w,
                    basis_values: values,
                    basis_gradients: Some(gradients),
                }
            })
            .collect();
        TabulatedGrid::new(self.nbasis(), points).unwrap()
    }
}

fn z_axis(z: f64) -> Vector3<f64> {
    Vector3::new(0.0, 0.0, z)
}

pub fn h2_sto3g(bond: f64) -> Molecule {
    let nuclei = vec![(z_axis(0.0), 1.0), (z_axis(bond), 1.0)];
    let shells = nuclei
        .iter()
        .map(|(r, _)| Shell::new(*r, &H_STO3G_EXPS, &STO3G_COEFFS))
        .collect();
    Molecule {
        nuclei,
        shells,
        nelectrons: 2,
    }
}

pub fn heh_plus_sto3g(bond: f64) -> Molecule {
    let he = z_axis(0.0);
    let h = z_axis(bond);
    Molecule {
        nuclei: vec![(he, 2.0), (h, 1.0)],
        shells: vec![
            Shell::new(he, &HE_STO3G_EXPS, &STO3G_COEFFS),
            Shell::new(h, &H_STO3G_EXPS, &STO3G_COEFFS),
        ],
        nelectrons: 2,
    }
}

pub fn h4_chain_sto3g(spacing: f64) -> Molecule {
    let nuclei: Vec<_> = (0..4).map(|i| (z_axis(i as f64 * spacing), 1.0)).collect();
    let shells = nuclei
        .iter()
        .map(|(r, _)| Shell::new(*r, &H_STO3G_EXPS, &STO3G_COEFFS))
        .collect();
    Molecule {
        nuclei,
        shells,
        nelectrons: 4,
    }
}

pub fn h2_631g(bond: f64) -> Molecule {
    let nuclei = vec![(z_axis(0.0), 1.0), (z_axis(bond), 1.0)];
    let mut shells = Vec::new();
    for (r, _) in &nuclei {
        shells.push(Shell::new(
            *r,
            &[18.7311370, 2.8253937, 0.6401217],
            &[0.03349460, 0.23472695, 0.81375733],
        ));
        shells.push(Shell::new(*r, &[0.1612778], &[1.0]));
    }
    Molecule {
        nuclei,
        shells,
        nelectrons: 2,
    }
}

// ---------------------------------------------------------------------------
// Grid helpers
// ---------------------------------------------------------------------------

/// 26-point Lebedev rule (exact through degree 7); weights sum to 4π.
fn lebedev_26() -> Vec<(Vector3<f64>, f64)> {
    let mut rule = Vec::with_capacity(26);
    let four_pi = 4.0 * PI;
    for axis in 0..3 {
        for sign in [1.0, -1.0] {
            let mut v = Vector3::zeros();
            v[axis] = sign;
            rule.push((v, four_pi / 21.0));
        }
    }
    let h = 1.0 / 2.0_f64.sqrt();
    for (a, b) in [(0, 1), (0, 2), (1, 2)] {
        for (sa, sb) in [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)] {
            let mut v = Vector3::zeros();
            v[a] = sa * h;
            v[b] = sb * h;
            rule.push((v, four_pi * 4.0 / 105.0));
        }
    }
    let c = 1.0 / 3.0_f64.sqrt();
    for sx in [1.0, -1.0] {
        for sy in [1.0, -1.0] {
            for sz in [1.0, -1.0] {
                rule.push((Vector3::new(sx * c, sy * c, sz * c), four_pi * 9.0 / 280.0));
            }
        }
    }
    rule
}

/// Becke's radial map `r = (1 + x) / (1 - x)` applied to Gauss–Legendre
/// nodes, combined with the angular rule and Becke partition weights.
fn becke_grid(centers: &[Vector3<f64>], radial_points: usize) -> Vec<(Vector3<f64>, f64)> {
    let (nodes, weights) = gauss_legendre(radial_points);
    let angular = lebedev_26();
    let mut points = Vec::new();
    for (a, center) in centers.iter().enumerate() {
        for (&x, &wx) in nodes.iter().zip(&weights) {
            let r = (1.0 + x) / (1.0 - x);
            let dr = 2.0 / ((1.0 - x) * (1.0 - x));
            let wr = wx * dr * r * r;
            for &(dir, wang) in &angular {
                let p = center + dir * r;
                let w = wr * wang * becke_weight(a, &p, centers);
                if w.is_finite() && w > 0.0 {
                    points.push((p, w));
                }
            }
        }
    }
    points
}

fn becke_weight(a: usize, r: &Vector3<f64>, centers: &[Vector3<f64>]) -> f64 {
    let n = centers.len();
    if n == 1 {
        return 1.0;
    }
    let mut cell = vec![1.0_f64; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let ri = (r - centers[i]).norm();
            let rj = (r - centers[j]).norm();
            let mut mu = (ri - rj) / (centers[i] - centers[j]).norm();
            for _ in 0..3 {
                mu = 1.5 * mu - 0.5 * mu * mu * mu;
            }
            cell[i] *= 0.5 * (1.0 - mu);
        }
    }
    let total: f64 = cell.iter().sum();
    if total > 0.0 {
        cell[a] / total
    } else {
        0.0
    }
}

/// Gauss–Legendre nodes and weights on [-1, 1].
fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut x = vec![0.0; n];
    let mut w = vec![0.0; n];
    let nn = n as f64;
    for i in 0..(n + 1) / 2 {
        let mut z = (PI * (i as f64 + 0.75) / (nn + 0.5)).cos();
        loop {
            let (mut p1, mut p2) = (1.0, 0.0);
            for j in 1..=n {
                let p3 = p2;
                p2 = p1;
                p1 = ((2.0 * j as f64 - 1.0) * z * p2 - (j as f64 - 1.0) * p3) / j as f64;
            }
            let pp = nn * (z * p1 - p2) / (z * z - 1.0);
            let z_old = z;
            z -= p1 / pp;
            if (z - z_old).abs() < 1e-14 {
                x[i] = -z;
                x[n - 1 - i] = z;
                w[i] = 2.0 / ((1.0 - z * z) * pp * pp);
                w[n - 1 - i] = w[i];
                break;
            }
        }
    }
    (x, w)
}

/// `∫ ρ` on a grid for a given density matrix.
pub fn integrated_electrons(grid: &TabulatedGrid, density: &DMatrix<f64>) -> f64 {
    grid.points()
        .iter()
        .map(|p| p.weight * p.basis_values.dot(&(density * &p.basis_values)))
        .sum()
}
