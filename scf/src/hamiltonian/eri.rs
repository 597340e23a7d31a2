//! Dense storage of two-electron repulsion integrals `(ij|kl)` in chemists'
//! notation, with the Coulomb and exchange contractions used by the
//! two-electron energy terms.

extern crate nalgebra as na;

use crate::error::{Result, ScfError};
use na::DMatrix;
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct TwoElectronIntegrals {
    nbasis: usize,
    data: Vec<f64>,
}

/// The eight index permutations sharing the value of `(ij|kl)` for real orbitals.
fn permutations(i: usize, j: usize, k: usize, l: usize) -> [(usize, usize, usize, usize); 8] {
    [
        (i, j, k, l),
        (j, i, k, l),
        (i, j, l, k),
        (j, i, l, k),
        (k, l, i, j),
        (l, k, i, j),
        (k, l, j, i),
        (l, k, j, i),
    ]
}

impl TwoElectronIntegrals {
    fn zeros(nbasis: usize) -> Self {
        TwoElectronIntegrals {
            nbasis,
            data: vec![0.0; nbasis.pow(4)],
        }
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize, l: usize) -> usize {
        let n = self.nbasis;
        ((i * n + j) * n + k) * n + l
    }

    fn set_symmetric(&mut self, i: usize, j: usize, k: usize, l: usize, value: f64) {
        for (a, b, c, d) in permutations(i, j, k, l) {
            let idx = self.index(a, b, c, d);
            self.data[idx] = value;
        }
    }

    /// Builds the tensor from a generator evaluated once per symmetry-unique quartet.
    pub fn from_fn<F>(nbasis: usize, mut eri: F) -> Self
    where
        F: FnMut(usize, usize, usize, usize) -> f64,
    {
        let mut tensor = Self::zeros(nbasis);
        for i in 0..nbasis {
            for j in 0..=i {
                let ij = i * (i + 1) / 2 + j;
                for k in 0..nbasis {
                    for l in 0..=k {
                        let kl = k * (k + 1) / 2 + l;
                        if kl > ij {
                            continue;
                        }
                        let value = eri(i, j, k, l);
                        tensor.set_symmetric(i, j, k, l, value);
                    }
                }
            }
        }
        tensor
    }

    /// Expands a list of `(i, j, k, l, value)` quartets by permutational symmetry.
    /// Quartets not listed are zero.
    pub fn from_unique(nbasis: usize, quartets: &[(usize, usize, usize, usize, f64)]) -> Result<Self> {
        let mut tensor = Self::zeros(nbasis);
        for &(i, j, k, l, value) in quartets {
            if i >= nbasis || j >= nbasis || k >= nbasis || l >= nbasis {
                return Err(ScfError::input(format!(
                    "two-electron integral index ({}, {}, {}, {}) out of range for {} basis functions",
                    i, j, k, l, nbasis
                )));
            }
            if !value.is_finite() {
                return Err(ScfError::input(format!(
                    "non-finite two-electron integral ({}{}|{}{})",
                    i, j, k, l
                )));
            }
            tensor.set_symmetric(i, j, k, l, value);
        }
        Ok(tensor)
    }

    /// Wraps a full `n⁴` tensor (row-major over `i, j, k, l`), checking its symmetry.
    pub fn from_dense(nbasis: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != nbasis.pow(4) {
            return Err(ScfError::input(format!(
                "expected {} two-electron integrals for {} basis functions, got {}",
                nbasis.pow(4),
                nbasis,
                data.len()
            )));
        }
        let tensor = TwoElectronIntegrals { nbasis, data };
        tensor.check_symmetry(1e-10)?;
        Ok(tensor)
    }

    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    pub fn get(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        self.data[self.index(i, j, k, l)]
    }

    /// Verifies finiteness and the eightfold permutational symmetry.
    pub fn check_symmetry(&self, tolerance: f64) -> Result<()> {
        let n = self.nbasis;
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    for l in 0..n {
                        let value = self.get(i, j, k, l);
                        if !value.is_finite() {
                            return Err(ScfError::input(format!(
                                "non-finite two-electron integral ({}{}|{}{})",
                                i, j, k, l
                            )));
                        }
                        for (a, b, c, d) in permutations(i, j, k, l) {
                            let other = self.get(a, b, c, d);
                            if (value - other).abs() > tolerance * value.abs().max(1.0) {
                                return Err(ScfError::input(format!(
                                    "two-electron integrals break permutational symmetry: ({}{}|{}{}) = {} but ({}{}|{}{}) = {}",
                                    i, j, k, l, value, a, b, c, d, other
                                )));
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Coulomb matrix `J_ij = Σ_kl (ij|kl) D_kl`.
    pub fn coulomb(&self, density: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.nbasis;
        let n2 = n * n;
        // (ij|kl) is symmetric in k,l so the column-major slice of a symmetric
        // density lines up with the row-major kl block.
        let dsym = (density + density.transpose()) * 0.5;
        let d = dsym.as_slice();
        let values: Vec<f64> = (0..n2)
            .into_par_iter()
            .map(|ij| {
                self.data[ij * n2..(ij + 1) * n2]
                    .iter()
                    .zip(d)
                    .map(|(eri, dkl)| eri * dkl)
                    .sum()
            })
            .collect();
        DMatrix::from_row_slice(n, n, &values)
    }

    /// Exchange matrix `K_ij = Σ_kl (ik|jl) D_kl`.
    pub fn exchange(&self, density: &DMatrix<f64>) -> DMatrix<f64> {
        let n = self.nbasis;
        let values: Vec<f64> = (0..n * n)
            .into_par_iter()
            .map(|ij| {
                let (i, j) = (ij / n, ij % n);
                let mut acc = 0.0;
                for k in 0..n {
                    for l in 0..n {
                        acc += self.get(i, k, j, l) * density[(k, l)];
                    }
                }
                acc
            })
            .collect();
        DMatrix::from_row_slice(n, n, &values)
    }
}
