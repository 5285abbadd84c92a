//! Implicit stress update of one material point.
//!
//! The second Piola-Kirchhoff stress in the intermediate configuration is the
//! primary unknown. For a given deformation gradient the residual
//! `S - C : (E_e - E_th)` is driven to zero by Newton iterations; the plastic
//! velocity gradient follows from the slip rates of all registered models.
//! Internal variables are then integrated explicitly and the stress is solved
//! again until the internal variables settle. Any recoverable failure restarts
//! the increment with twice as many substeps.
use crate::dislocation::DislocationModel;
use crate::eigenstrain::ResidualEigenstrain;
use crate::elasticity::CubicElasticity;
use crate::error::{Attempt, ConstitutiveError, RecoverableFailure, Result};
use crate::interfaces::{
    tensor_values, CrystalPlasticityModel, EigenstrainProvider, PointInput, QDim,
    SubstepContext, Q,
};
use crate::microstructure::PhaseStrengthening;
use crate::parameters::{
    LineSearchMethod, MaterialConfig, SolverParameters, TangentModuliType,
};
use crate::stress_strain::{
    bunge_rotation, double_contract, flatten, green_lagrange, index, polar_rotation,
    tensor_to_mandel, unflatten, Tensor2, Tensor4,
};
use serde::Serialize;
use tracing::{debug, error, warn};

/// Work done by one call to [`CrystalPlasticityStress::update_stress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UpdateStats {
    /// substeps of the accepted attempt
    pub substeps: usize,
    /// Newton corrections over all attempts
    pub newton_iterations: usize,
    /// state variable sweeps over all attempts
    pub state_iterations: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StressUpdate {
    pub cauchy_stress: Tensor2,
    /// `d(cauchy)/dF` in the 9x9 layout of [`Tensor4`]
    pub tangent: Tensor4,
    pub stats: UpdateStats,
}

/// Thermal eigenstrain of the matrix at `temperature`.
///
/// With liquid expansion disabled the strain is switched off above the
/// liquidus and ramped linearly between liquidus and solidus.
pub fn thermal_eigenstrain(solver: &SolverParameters, temperature: Option<f64>) -> Tensor2 {
    let Some(t) = temperature else {
        return Tensor2::zeros();
    };
    let dt = t - solver.reference_temperature;
    let exponent = solver.dcte_dt * dt * dt / 3.0 + 2.0 / 3.0 * solver.thermal_expansion * dt;
    let full = Tensor2::identity() * (0.5 * (exponent.exp() - 1.0));
    if solver.liquid_thermal_expansion || t <= solver.melting_temperature_low {
        full
    } else if t > solver.melting_temperature_high {
        Tensor2::zeros()
    } else {
        full * (solver.melting_temperature_high - t)
            / (solver.melting_temperature_high - solver.melting_temperature_low)
    }
}

/// `d(E_e)/d(F_e)` for `E_e = (F_e^T F_e - I)/2`
fn elastic_strain_derivative(fe: &Tensor2) -> Tensor4 {
    let mut derivative = Tensor4::zeros();
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                derivative[(index(i, j), index(k, i))] += 0.5 * fe[(k, j)];
                derivative[(index(i, j), index(k, j))] += 0.5 * fe[(k, i)];
            }
        }
    }
    derivative
}

/// Finite strain crystal plasticity at one material point.
#[derive(Debug)]
pub struct CrystalPlasticityStress {
    solver: SolverParameters,
    elasticity: Tensor4,
    crystal_rotation: Tensor2,
    models: Vec<Box<dyn CrystalPlasticityModel>>,
    eigenstrains: Vec<Box<dyn EigenstrainProvider>>,

    pk2_old: Tensor2,
    plastic_deformation_gradient_old: Tensor2,

    pk2: Tensor2,
    plastic_deformation_gradient: Tensor2,
    elastic_deformation_gradient: Tensor2,
    eigenstrain_deformation_gradient: Tensor2,
    cauchy_stress: Tensor2,
    total_lagrangian_strain: Tensor2,
    updated_rotation: Tensor2,

    // substep work variables
    deformation_gradient: Tensor2,
    inverse_eigenstrain_deformation_gradient: Tensor2,
    inverse_plastic_deformation_gradient: Tensor2,
    inverse_plastic_deformation_gradient_old: Tensor2,
    residual: Tensor2,
    jacobian: Tensor4,
}

impl CrystalPlasticityStress {
    /// `crystal_rotation` maps the lattice to the sample frame.
    pub fn new(
        elasticity: &CubicElasticity,
        solver: SolverParameters,
        crystal_rotation: Tensor2,
        models: Vec<Box<dyn CrystalPlasticityModel>>,
        eigenstrains: Vec<Box<dyn EigenstrainProvider>>,
    ) -> Result<Self> {
        solver.validate()?;
        if models.is_empty() {
            return Err(ConstitutiveError::InvalidParameter {
                name: "models".to_string(),
                reason: "at least one crystal plasticity model is required".to_string(),
            });
        }
        let identity = Tensor2::identity();
        Ok(Self {
            solver,
            elasticity: elasticity.rotated_tensor(&crystal_rotation),
            crystal_rotation,
            models,
            eigenstrains,
            pk2_old: Tensor2::zeros(),
            plastic_deformation_gradient_old: identity,
            pk2: Tensor2::zeros(),
            plastic_deformation_gradient: identity,
            elastic_deformation_gradient: identity,
            eigenstrain_deformation_gradient: identity,
            cauchy_stress: Tensor2::zeros(),
            total_lagrangian_strain: Tensor2::zeros(),
            updated_rotation: crystal_rotation,
            deformation_gradient: identity,
            inverse_eigenstrain_deformation_gradient: identity,
            inverse_plastic_deformation_gradient: identity,
            inverse_plastic_deformation_gradient_old: identity,
            residual: Tensor2::zeros(),
            jacobian: Tensor4::identity(),
        })
    }

    /// Dislocation model plus the optional residual eigenstrain described by
    /// `config`. The phase strengthening follows from the configured
    /// microstructure and solutes.
    pub fn from_config(config: &MaterialConfig) -> Result<Self> {
        let strengthening = PhaseStrengthening::new(
            config.microstructure.as_ref(),
            config.solutes.as_ref(),
            &config.dislocation,
        );
        Self::from_config_with_strengthening(config, strengthening)
    }

    pub fn from_config_with_strengthening(
        config: &MaterialConfig,
        strengthening: PhaseStrengthening,
    ) -> Result<Self> {
        config.validate()?;
        let rotation = bunge_rotation(&config.euler_angles);
        let model = DislocationModel::new(config.dislocation.clone(), strengthening)?;
        let eigenstrains: Vec<Box<dyn EigenstrainProvider>> = match &config.residual_eigenstrain {
            Some(parameters) => vec![Box::new(ResidualEigenstrain::new(parameters, &rotation))],
            None => Vec::new(),
        };
        Self::new(
            &config.elasticity,
            config.solver.clone(),
            rotation,
            vec![Box::new(model)],
            eigenstrains,
        )
    }

    /// Starts from a prescribed plastic deformation, e.g. from a preceding
    /// process simulation.
    pub fn with_initial_plastic_deformation_gradient(mut self, fp: Tensor2) -> Result<Self> {
        if fp.determinant() <= 0.0 {
            return Err(ConstitutiveError::InvalidParameter {
                name: "plastic_deformation_gradient".to_string(),
                reason: "must have a positive determinant".to_string(),
            });
        }
        self.plastic_deformation_gradient_old = fp;
        self.plastic_deformation_gradient = fp;
        Ok(self)
    }

    pub fn solver_parameters(&self) -> &SolverParameters {
        &self.solver
    }

    /// Rotated elasticity tensor.
    pub fn elasticity_tensor(&self) -> &Tensor4 {
        &self.elasticity
    }

    pub fn crystal_rotation(&self) -> &Tensor2 {
        &self.crystal_rotation
    }

    pub fn models(&self) -> &[Box<dyn CrystalPlasticityModel>] {
        &self.models
    }

    pub fn n_slip_systems(&self) -> usize {
        self.models.iter().map(|m| m.n_slip_systems()).sum()
    }

    pub fn pk2(&self) -> &Tensor2 {
        &self.pk2
    }

    pub fn cauchy_stress(&self) -> &Tensor2 {
        &self.cauchy_stress
    }

    pub fn elastic_deformation_gradient(&self) -> &Tensor2 {
        &self.elastic_deformation_gradient
    }

    pub fn plastic_deformation_gradient(&self) -> &Tensor2 {
        &self.plastic_deformation_gradient
    }

    pub fn eigenstrain_deformation_gradient(&self) -> &Tensor2 {
        &self.eigenstrain_deformation_gradient
    }

    pub fn update_stress(&mut self, input: &PointInput) -> Result<StressUpdate> {
        self.integrate(input).map_err(|e| {
            error!(point = input.point, time = input.time, "{}", e);
            e
        })
    }

    /// Accepts the last update as the start of the next global increment.
    pub fn commit(&mut self) {
        self.pk2_old = self.pk2;
        self.plastic_deformation_gradient_old = self.plastic_deformation_gradient;
        for model in self.models.iter_mut() {
            model.commit();
        }
        for eigenstrain in self.eigenstrains.iter_mut() {
            eigenstrain.commit();
        }
    }

    /// Values of a named quantity after the last update. Per system
    /// quantities of several models are concatenated.
    pub fn field(&self, q: Q) -> Option<Vec<f64>> {
        let tensor = match q {
            Q::CauchyStress => Some(&self.cauchy_stress),
            Q::Pk2Stress => Some(&self.pk2),
            Q::ElasticDeformationGradient => Some(&self.elastic_deformation_gradient),
            Q::PlasticDeformationGradient => Some(&self.plastic_deformation_gradient),
            Q::EigenstrainDeformationGradient => Some(&self.eigenstrain_deformation_gradient),
            Q::TotalLagrangianStrain => Some(&self.total_lagrangian_strain),
            Q::UpdatedRotation => Some(&self.updated_rotation),
            _ => None,
        };
        if let Some(tensor) = tensor {
            return Some(tensor_values(tensor));
        }
        if q == Q::MandelStress {
            return Some(tensor_to_mandel(&self.cauchy_stress).as_slice().to_vec());
        }
        match q.dim() {
            QDim::SlipSystems | QDim::SlipSystemVectors => {
                let mut values = Vec::with_capacity(q.size(self.n_slip_systems()));
                for model in &self.models {
                    values.extend(model.field(q)?);
                }
                Some(values)
            }
            _ => self.models.iter().find_map(|m| m.field(q)),
        }
    }

    fn integrate(&mut self, input: &PointInput) -> Result<StressUpdate> {
        let mut deformation_gradient_old = input.deformation_gradient_old;
        if deformation_gradient_old.determinant() == 0.0 {
            deformation_gradient_old = Tensor2::identity();
        }
        let increment = input.deformation_gradient - deformation_gradient_old;

        for model in self.models.iter_mut() {
            model.calculate_flow_direction(&self.crystal_rotation);
        }

        let mut stats = UpdateStats::default();
        let mut num_substep = 1;
        let mut attempts = 1;
        loop {
            self.pre_solve(input)?;
            let outcome = self.solve_substeps(
                input,
                &deformation_gradient_old,
                &increment,
                num_substep,
                &mut stats,
            )?;
            let Err(reason) = outcome else {
                break;
            };
            if self.solver.print_convergence_messages {
                warn!(
                    point = input.point,
                    substeps = num_substep,
                    "{}; increasing the number of substeps",
                    reason
                );
            }
            attempts += 1;
            if attempts > self.solver.maximum_substep_iteration {
                return Err(ConstitutiveError::SubstepExhausted {
                    point: input.point,
                    time: input.time,
                    substeps: num_substep,
                    reason,
                });
            }
            num_substep *= 2;
            debug!(point = input.point, substeps = num_substep, "refining substeps");
        }
        stats.substeps = num_substep;
        self.post_solve(input, stats)
    }

    fn pre_solve(&mut self, input: &PointInput) -> Result<()> {
        for model in self.models.iter_mut() {
            model.set_initial_constitutive_variable_values(input);
        }
        self.pk2 = self.pk2_old;
        self.plastic_deformation_gradient = self.plastic_deformation_gradient_old;
        self.inverse_plastic_deformation_gradient_old = self
            .plastic_deformation_gradient_old
            .try_inverse()
            .ok_or(ConstitutiveError::SingularTensor("plastic deformation gradient"))?;
        Ok(())
    }

    fn solve_substeps(
        &mut self,
        input: &PointInput,
        deformation_gradient_old: &Tensor2,
        increment: &Tensor2,
        num_substep: usize,
        stats: &mut UpdateStats,
    ) -> Result<Attempt> {
        let substep_dt = input.dt / num_substep as f64;
        for istep in 0..num_substep {
            let fraction = (istep + 1) as f64 / num_substep as f64;
            self.deformation_gradient = deformation_gradient_old + increment * fraction;
            self.compose_eigenstrain(input, fraction)?;
            if let Err(failure) = self.solve_substep(input, substep_dt, stats)? {
                return Ok(Err(failure));
            }
        }
        Ok(Ok(()))
    }

    fn compose_eigenstrain(&mut self, input: &PointInput, fraction: f64) -> Result<()> {
        let mut inverse = Tensor2::identity();
        for eigenstrain in self.eigenstrains.iter_mut() {
            eigenstrain.compute_qp_properties(input, fraction)?;
            inverse *= eigenstrain.deformation_gradient_inverse();
        }
        self.inverse_eigenstrain_deformation_gradient = inverse;
        self.eigenstrain_deformation_gradient = inverse
            .try_inverse()
            .ok_or(ConstitutiveError::SingularTensor("eigenstrain deformation gradient"))?;
        Ok(())
    }

    fn context<'a>(&self, input: &'a PointInput, substep_dt: f64) -> SubstepContext<'a> {
        SubstepContext {
            input,
            substep_dt,
            deformation_gradient: self.deformation_gradient,
            plastic_deformation_gradient: self.plastic_deformation_gradient,
            eigenstrain_deformation_gradient: self.eigenstrain_deformation_gradient,
        }
    }

    fn solve_substep(
        &mut self,
        input: &PointInput,
        substep_dt: f64,
        stats: &mut UpdateStats,
    ) -> Result<Attempt> {
        let ctx = self.context(input, substep_dt);
        for model in self.models.iter_mut() {
            model.set_substep_constitutive_variable_values(&ctx);
            model.calculate_slip_resistance(&ctx);
        }
        self.inverse_plastic_deformation_gradient = self.inverse_plastic_deformation_gradient_old;

        if let Err(failure) = self.solve_state_variables(input, substep_dt, stats)? {
            return Ok(Err(failure));
        }

        for model in self.models.iter_mut() {
            model.update_substep_constitutive_variable_values();
        }
        self.inverse_plastic_deformation_gradient_old = self.inverse_plastic_deformation_gradient;
        Ok(Ok(()))
    }

    fn solve_state_variables(
        &mut self,
        input: &PointInput,
        substep_dt: f64,
        stats: &mut UpdateStats,
    ) -> Result<Attempt> {
        let verbose = self.solver.print_convergence_messages;
        for _ in 0..self.solver.maxiter_state_variable {
            stats.state_iterations += 1;
            if let Err(failure) = self.solve_stress(input, substep_dt, stats) {
                return Ok(Err(failure));
            }
            self.plastic_deformation_gradient = self
                .inverse_plastic_deformation_gradient
                .try_inverse()
                .ok_or(ConstitutiveError::SingularTensor("inverse plastic deformation gradient"))?;

            let ctx = self.context(input, substep_dt);
            for model in self.models.iter_mut() {
                model.cache_state_variables_before_update();
            }
            for model in self.models.iter_mut() {
                model.calculate_state_variable_evolution_rate_component(&ctx);
            }
            let mut failure = None;
            for model in self.models.iter_mut() {
                if let Err(f) = model.update_state_variables(&ctx)? {
                    failure.get_or_insert(f);
                }
            }
            for model in self.models.iter_mut() {
                model.calculate_slip_resistance(&ctx);
            }
            if let Some(failure) = failure {
                if verbose {
                    warn!(point = input.point, "{}", failure);
                }
                return Ok(Err(failure));
            }

            if self
                .models
                .iter()
                .all(|m| m.are_constitutive_state_variables_converged())
            {
                return Ok(Ok(()));
            }
            if verbose {
                warn!(point = input.point, "state variables did not converge");
            }
        }
        let failure = RecoverableFailure::StateVariableNonconvergence {
            iterations: self.solver.maxiter_state_variable,
        };
        if verbose {
            warn!(point = input.point, "{}", failure);
        }
        Ok(Err(failure))
    }

    fn solve_stress(
        &mut self,
        input: &PointInput,
        substep_dt: f64,
        stats: &mut UpdateStats,
    ) -> Attempt {
        self.calculate_residual(input, substep_dt)?;
        self.calculate_jacobian(input, substep_dt);

        let mut rnorm = self.residual.norm();
        let tolerance = (self.solver.rtol * rnorm).max(self.solver.abs_tol);
        let mut iterations = 0;
        while rnorm > tolerance {
            if iterations == self.solver.maxiter {
                let failure = RecoverableFailure::StressResidualNonconvergence {
                    iterations,
                    residual: rnorm,
                };
                if self.solver.print_convergence_messages {
                    warn!(point = input.point, tolerance, "{}", failure);
                }
                return Err(failure);
            }
            let correction = self
                .jacobian
                .lu()
                .solve(&flatten(&self.residual))
                .ok_or(RecoverableFailure::SingularJacobian)?;
            let dpk2 = -unflatten(&correction);
            self.pk2 += dpk2;

            self.calculate_residual(input, substep_dt)?;
            self.calculate_jacobian(input, substep_dt);

            let rnorm_prev = rnorm;
            rnorm = self.residual.norm();
            if self.solver.use_line_search && rnorm > rnorm_prev {
                self.line_search(input, substep_dt, rnorm_prev, &dpk2)?;
                self.calculate_jacobian(input, substep_dt);
                rnorm = self.residual.norm();
            }
            iterations += 1;
            stats.newton_iterations += 1;
        }
        Ok(())
    }

    fn calculate_residual(&mut self, input: &PointInput, substep_dt: f64) -> Attempt {
        let ctx = self.context(input, substep_dt);
        let mut slip_increment = Tensor2::zeros();
        for model in self.models.iter_mut() {
            model.calculate_shear_stress(&self.pk2, &self.eigenstrain_deformation_gradient);
            model.calculate_slip_rate(&ctx)?;
            slip_increment += model.calculate_equivalent_slip_increment(substep_dt);
        }
        self.inverse_plastic_deformation_gradient =
            self.inverse_plastic_deformation_gradient_old * (Tensor2::identity() - slip_increment);
        self.elastic_deformation_gradient = self.deformation_gradient
            * self.inverse_eigenstrain_deformation_gradient
            * self.inverse_plastic_deformation_gradient;

        let elastic_strain = green_lagrange(&self.elastic_deformation_gradient);
        let thermal = thermal_eigenstrain(&self.solver, input.temperature);
        self.residual = self.pk2 - double_contract(&self.elasticity, &(elastic_strain - thermal));
        Ok(())
    }

    fn calculate_jacobian(&mut self, input: &PointInput, substep_dt: f64) {
        let f_eig_inv = self.deformation_gradient * self.inverse_eigenstrain_deformation_gradient;
        let mut dfe_dfpinv = Tensor4::zeros();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    dfe_dfpinv[(index(i, j), index(k, j))] = f_eig_inv[(i, k)];
                }
            }
        }
        let dee_dfe = elastic_strain_derivative(&self.elastic_deformation_gradient);

        let ctx = self.context(input, substep_dt);
        let dfpinv_dpk2 = self.models.iter().fold(Tensor4::zeros(), |acc, model| {
            acc + model.calculate_total_plastic_deformation_gradient_derivative(
                &ctx,
                &self.inverse_plastic_deformation_gradient_old,
            )
        });
        self.jacobian = Tensor4::identity() - self.elasticity * dee_dfe * dfe_dfpinv * dfpinv_dpk2;
    }

    fn line_search(
        &mut self,
        input: &PointInput,
        substep_dt: f64,
        rnorm_prev: f64,
        dpk2: &Tensor2,
    ) -> Attempt {
        let min_step = self.solver.min_line_search_step_size;
        match self.solver.line_search_method {
            LineSearchMethod::CutHalf => {
                let mut step = 1.0;
                let mut rnorm;
                loop {
                    self.pk2 -= dpk2 * step;
                    step /= 2.0;
                    self.pk2 += dpk2 * step;
                    self.calculate_residual(input, substep_dt)?;
                    rnorm = self.residual.norm();
                    if rnorm <= rnorm_prev || step <= min_step {
                        break;
                    }
                }
                if rnorm <= rnorm_prev || step > min_step {
                    Ok(())
                } else {
                    Err(RecoverableFailure::LineSearchFailed)
                }
            }
            LineSearchMethod::Bisection => {
                let tolerance = self.solver.line_search_tolerance;
                let maxiter = self.solver.line_search_maxiter;

                // bracket the root of R(step) : dS between the old and the full step
                self.calculate_residual(input, substep_dt)?;
                let mut s_b = self.residual.dot(dpk2);
                let rnorm_full = self.residual.norm();
                self.pk2 -= dpk2;
                self.calculate_residual(input, substep_dt)?;
                let mut s_a = self.residual.dot(dpk2);
                let rnorm_start = self.residual.norm();
                self.pk2 += dpk2;

                if rnorm_full / rnorm_start < tolerance || s_a * s_b > 0.0 {
                    return self.calculate_residual(input, substep_dt);
                }

                let (mut step_a, mut step_b, mut step) = (0.0, 1.0, 1.0);
                let mut rnorm = f64::INFINITY;
                let mut count = 0;
                while rnorm / rnorm_start > tolerance && count < maxiter {
                    self.pk2 -= dpk2 * step;
                    step = 0.5 * (step_a + step_b);
                    self.pk2 += dpk2 * step;
                    self.calculate_residual(input, substep_dt)?;
                    let s_m = self.residual.dot(dpk2);
                    rnorm = self.residual.norm();
                    if s_m * s_a < 0.0 {
                        step_b = step;
                        s_b = s_m;
                    }
                    if s_m * s_b < 0.0 {
                        step_a = step;
                        s_a = s_m;
                    }
                    count += 1;
                }
                if rnorm / rnorm_start < tolerance && count < maxiter {
                    Ok(())
                } else {
                    Err(RecoverableFailure::LineSearchFailed)
                }
            }
        }
    }

    fn post_solve(&mut self, input: &PointInput, stats: UpdateStats) -> Result<StressUpdate> {
        let fe = self.elastic_deformation_gradient;
        let je = fe.determinant();
        if je <= 0.0 {
            return Err(ConstitutiveError::SingularTensor("elastic deformation gradient"));
        }
        self.cauchy_stress = fe * self.pk2 * fe.transpose() / je;
        let tangent = match self.solver.tan_mod_type {
            TangentModuliType::Exact => self.elasto_plastic_tangent(),
            TangentModuliType::Elastic => self.elasticity,
        };
        self.total_lagrangian_strain = green_lagrange(&input.deformation_gradient);
        let rotation = polar_rotation(&fe)
            .ok_or(ConstitutiveError::SingularTensor("elastic deformation gradient"))?;
        self.updated_rotation = rotation * self.crystal_rotation;
        Ok(StressUpdate {
            cauchy_stress: self.cauchy_stress,
            tangent,
            stats,
        })
    }

    /// Push forward of the elastic tangent with the stress terms of the
    /// Cauchy stress, at fixed plastic and eigenstrain deformation.
    fn elasto_plastic_tangent(&self) -> Tensor4 {
        let fe = &self.elastic_deformation_gradient;
        let mut push_forward = Tensor4::zeros();
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    for l in 0..3 {
                        push_forward[(index(i, j), index(k, l))] = fe[(i, k)] * fe[(j, l)];
                    }
                }
            }
        }
        let mut tangent = push_forward * self.elasticity * elastic_strain_derivative(fe);

        let pk2_fet = self.pk2 * fe.transpose();
        let fe_pk2 = fe * self.pk2;
        for i in 0..3 {
            for j in 0..3 {
                for l in 0..3 {
                    tangent[(index(i, j), index(i, l))] += pk2_fet[(l, j)];
                    tangent[(index(i, j), index(j, l))] += fe_pk2[(i, l)];
                }
            }
        }
        let je = fe.determinant();
        if je > 0.0 {
            tangent /= je;
        }

        let feig_inv_fp_inv =
            self.inverse_eigenstrain_deformation_gradient * self.inverse_plastic_deformation_gradient;
        let mut dfe_df = Tensor4::zeros();
        for i in 0..3 {
            for j in 0..3 {
                for l in 0..3 {
                    dfe_df[(index(i, j), index(i, l))] = feig_inv_fp_inv[(l, j)];
                }
            }
        }
        tangent * dfe_df
    }
}
