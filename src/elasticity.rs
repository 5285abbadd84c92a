use crate::stress_strain::{index, rotate_tensor4, Tensor2, Tensor4};
use serde::Deserialize;
use std::collections::HashMap;

/// Elastic constants of a cubic crystal in the lattice frame (Voigt notation).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CubicElasticity {
    pub c11: f64,
    pub c12: f64,
    pub c44: f64,
}

impl Default for CubicElasticity {
    fn default() -> Self {
        // nickel base superalloy at room temperature, MPa
        Self {
            c11: 252000.0,
            c12: 161000.0,
            c44: 131000.0,
        }
    }
}

impl CubicElasticity {
    pub fn from_map(parameters: &HashMap<String, f64>) -> Self {
        let default = Self::default();
        Self {
            c11: *parameters.get("C11").unwrap_or(&default.c11),
            c12: *parameters.get("C12").unwrap_or(&default.c12),
            c44: *parameters.get("C44").unwrap_or(&default.c44),
        }
    }

    /// Full elasticity tensor `C_ijkl` in the lattice frame.
    pub fn lattice_tensor(&self) -> Tensor4 {
        let mut c = Tensor4::zeros();
        for i in 0..3 {
            for j in 0..3 {
                if i == j {
                    c[(index(i, i), index(j, j))] = self.c11;
                } else {
                    c[(index(i, i), index(j, j))] = self.c12;
                    c[(index(i, j), index(i, j))] = self.c44;
                    c[(index(i, j), index(j, i))] = self.c44;
                }
            }
        }
        c
    }

    /// Elasticity tensor in the sample frame for a crystal with orientation
    /// `crystal_rotation` (lattice to sample).
    pub fn rotated_tensor(&self, crystal_rotation: &Tensor2) -> Tensor4 {
        rotate_tensor4(&self.lattice_tensor(), crystal_rotation)
    }
}
