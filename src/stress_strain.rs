//! Tensor kernels for finite-strain kinematics.
//!
//! Second order tensors are plain `3x3` matrices. Fourth order tensors are
//! stored as `9x9` matrices where the row index is `3i+j` and the column index
//! is `3k+l`, so that `A_ijkl B_kl` is an ordinary matrix-vector product on
//! the flattened tensor and `A_ijmn B_mnkl` is a matrix product.
use nalgebra::{SMatrix, SVector, SymmetricEigen};

pub type Tensor2 = SMatrix<f64, 3, 3>;
pub type Tensor4 = SMatrix<f64, 9, 9>;

#[inline]
pub const fn index(i: usize, j: usize) -> usize {
    3 * i + j
}

pub fn flatten(tensor: &Tensor2) -> SVector<f64, 9> {
    SVector::<f64, 9>::from_fn(|a, _| tensor[(a / 3, a % 3)])
}

pub fn unflatten(vector: &SVector<f64, 9>) -> Tensor2 {
    Tensor2::from_fn(|i, j| vector[index(i, j)])
}

/// `A_ijkl B_kl`
pub fn double_contract(a: &Tensor4, b: &Tensor2) -> Tensor2 {
    unflatten(&(a * flatten(b)))
}

/// `A_ij B_kl`
pub fn outer(a: &Tensor2, b: &Tensor2) -> Tensor4 {
    flatten(a) * flatten(b).transpose()
}

/// Green-Lagrange strain `(F^T F - I)/2`.
pub fn green_lagrange(f: &Tensor2) -> Tensor2 {
    0.5 * (f.transpose() * f - Tensor2::identity())
}

/// Rotation part `R` of the polar decomposition `F = R U`. Returns `None` if
/// `F^T F` is not positive definite.
pub fn polar_rotation(f: &Tensor2) -> Option<Tensor2> {
    let eigen = SymmetricEigen::new(f.transpose() * f);
    if eigen.eigenvalues.iter().any(|&lambda| lambda <= 0.0) {
        return None;
    }
    let inv_sqrt = eigen.eigenvalues.map(|lambda| 1.0 / lambda.sqrt());
    let u_inv =
        eigen.eigenvectors * Tensor2::from_diagonal(&inv_sqrt) * eigen.eigenvectors.transpose();
    Some(f * u_inv)
}

/// `R_ip R_jq R_kr R_ls C_pqrs`
pub fn rotate_tensor4(c: &Tensor4, r: &Tensor2) -> Tensor4 {
    // rotate one index pair at a time: Q_(ij)(pq) = R_ip R_jq
    let mut q = Tensor4::zeros();
    for i in 0..3 {
        for j in 0..3 {
            for p in 0..3 {
                for s in 0..3 {
                    q[(index(i, j), index(p, s))] = r[(i, p)] * r[(j, s)];
                }
            }
        }
    }
    q * c * q.transpose()
}

pub fn tensor_to_mandel(tensor: &Tensor2) -> SVector<f64, 6> {
    const SQRT: f64 = std::f64::consts::SQRT_2;
    SVector::<f64, 6>::new(
        tensor.m11,
        tensor.m22,
        tensor.m33,
        SQRT * tensor.m23,
        SQRT * tensor.m13,
        SQRT * tensor.m12,
    )
}

/// Rotation about the z axis by `angle` (radians).
pub fn rotation_z(angle: f64) -> Tensor2 {
    let (s, c) = angle.sin_cos();
    Tensor2::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Crystal rotation (lattice to sample frame) from Bunge Euler angles given in
/// degrees.
pub fn bunge_rotation(euler_angles: &[f64; 3]) -> Tensor2 {
    let [phi1, phi, phi2] = euler_angles.map(f64::to_radians);
    let (sp1, cp1) = phi1.sin_cos();
    let (sp, cp) = phi.sin_cos();
    let (sp2, cp2) = phi2.sin_cos();
    // sample to lattice
    let g = Tensor2::new(
        cp1 * cp2 - sp1 * sp2 * cp,
        sp1 * cp2 + cp1 * sp2 * cp,
        sp2 * sp,
        -cp1 * sp2 - sp1 * cp2 * cp,
        -sp1 * sp2 + cp1 * cp2 * cp,
        cp2 * sp,
        sp1 * sp,
        -cp1 * sp,
        cp,
    );
    g.transpose()
}
