use crate::error::{ConstitutiveError, Result};
use crate::interfaces::{EigenstrainProvider, PointInput};
use crate::parameters::ResidualEigenstrainParameters;
use crate::slip_band::dimensionless_radius;
use crate::stress_strain::Tensor2;
use std::f64::consts::PI;

/// Thermal expansion left in the part by the build. The temperature change of
/// the increment is weighted by a radial profile that vanishes on the outer
/// surface of the specimen, unless the eigenstrain is uniform.
#[derive(Debug, Clone)]
pub struct ResidualEigenstrain {
    expansion: Tensor2,
    uniform: bool,
    deformation_gradient: Tensor2,
    deformation_gradient_inverse: Tensor2,
    deformation_gradient_old: Tensor2,
}

impl ResidualEigenstrain {
    /// `crystal_rotation` maps the lattice to the sample frame.
    pub fn new(parameters: &ResidualEigenstrainParameters, crystal_rotation: &Tensor2) -> Self {
        let alpha = Tensor2::from_fn(|i, j| parameters.thermal_expansion_coefficients[i][j]);
        Self {
            expansion: crystal_rotation * alpha * crystal_rotation.transpose(),
            uniform: parameters.uniform,
            deformation_gradient: Tensor2::identity(),
            deformation_gradient_inverse: Tensor2::identity(),
            deformation_gradient_old: Tensor2::identity(),
        }
    }

    pub fn profile(&self, input: &PointInput) -> f64 {
        if self.uniform {
            return 1.0;
        }
        let radius = dimensionless_radius(&input.coordinates);
        if radius == 0.0 {
            1.0
        } else {
            ((PI * radius).cos() + 1.0) / 2.0
        }
    }
}

impl EigenstrainProvider for ResidualEigenstrain {
    fn compute_qp_properties(&mut self, input: &PointInput, fraction: f64) -> Result<()> {
        let change = match (input.temperature, input.temperature_old) {
            (Some(t), Some(t_old)) => t - t_old,
            _ => 0.0,
        };
        let theta = self.profile(input) * change * fraction;
        let stretch = Tensor2::identity() - self.expansion * theta;
        let inverse_stretch = stretch
            .try_inverse()
            .ok_or(ConstitutiveError::SingularTensor("thermal eigenstrain stretch"))?;
        self.deformation_gradient = inverse_stretch * self.deformation_gradient_old;
        self.deformation_gradient_inverse = self
            .deformation_gradient
            .try_inverse()
            .ok_or(ConstitutiveError::SingularTensor("eigenstrain deformation gradient"))?;
        Ok(())
    }

    fn deformation_gradient(&self) -> Tensor2 {
        self.deformation_gradient
    }

    fn deformation_gradient_inverse(&self) -> Tensor2 {
        self.deformation_gradient_inverse
    }

    fn commit(&mut self) {
        self.deformation_gradient_old = self.deformation_gradient;
    }
}
