use crate::damage::DamageLaw;
use crate::error::{Attempt, ConstitutiveError, RecoverableFailure, Result};
use crate::interfaces::{tensor_values, CrystalPlasticityModel, PointInput, SubstepContext, Q};
use crate::microstructure::{residual_ssd, PhaseStrengthening};
use crate::parameters::DislocationParameters;
use crate::slip_band::{phase_resistance, SlipBandGeometry, SlipBandPhase, SlipBandState};
use crate::slip_systems::{RotatedSlipSystems, SlipSystems, SYSTEMS_PER_PLANE};
use crate::stress_strain::{green_lagrange, rotation_z, Tensor2};
use nalgebra::Vector3;
use tracing::debug;

/// Internal variables of all slip systems at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct DislocationSnapshot {
    pub rho_ssd: Vec<f64>,
    pub rho_gnd_edge: Vec<f64>,
    pub rho_gnd_screw: Vec<f64>,
    pub backstress: Vec<f64>,
    pub damage: Vec<f64>,
    pub accumulated_slip: Vec<f64>,
    pub aggregate_damage: f64,
}

impl DislocationSnapshot {
    pub fn initial(n: usize, parameters: &DislocationParameters) -> Self {
        Self {
            rho_ssd: vec![parameters.init_rho_ssd; n],
            rho_gnd_edge: vec![parameters.init_rho_gnd_edge; n],
            rho_gnd_screw: vec![parameters.init_rho_gnd_screw; n],
            backstress: vec![0.0; n],
            damage: vec![0.0; n],
            accumulated_slip: vec![0.0; n],
            aggregate_damage: 0.0,
        }
    }
}

/// Green strains derived after every state update. The `(2,2)` components are
/// kept away from zero so that ratios formed by the host stay finite.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StrainMeasures {
    pub plastic: Tensor2,
    pub elastic: Tensor2,
    pub total: Tensor2,
    /// `e_yy`, `e_xy` of the total strain seen on a (110) section
    pub strain_110: [f64; 2],
}

impl StrainMeasures {
    const FLOOR: f64 = 1e-10;

    pub fn new(deformation_gradient: &Tensor2, plastic_deformation_gradient: &Tensor2) -> Self {
        let floor = |mut e: Tensor2| {
            if e[(2, 2)].abs() < Self::FLOOR {
                e[(2, 2)] = Self::FLOOR;
            }
            e
        };
        let plastic = floor(green_lagrange(plastic_deformation_gradient));
        let total = floor(green_lagrange(deformation_gradient));
        let r = rotation_z(-std::f64::consts::FRAC_PI_4);
        let section = r * total * r.transpose();
        Self {
            plastic,
            elastic: total - plastic,
            total,
            strain_110: [section[(1, 1)], section[(1, 2)]],
        }
    }
}

/// Dislocation density based flow rule for a two phase nickel superalloy.
///
/// Slip on every system follows a power law in the resolved shear stress. The
/// resistance of the gamma matrix combines Taylor hardening from the
/// statistically stored and geometrically necessary dislocations with the
/// Orowan and solid solution contributions; inside an active slip band the
/// first octahedral plane additionally shears the gamma prime precipitates.
///
/// # Parameters
/// See [`DislocationParameters`]. The most relevant ones are
/// - `ao`, `xm`: reference slip rate and strain rate sensitivity
/// - `tau_c_0`, `alpha_0`, `r`: lattice friction, Taylor factor and latent
///   hardening ratio
/// - `k_0`, `y_c`: storage and annihilation of SSDs
/// - `h`, `h_d`: Armstrong-Frederick backstress
/// - `wcr`, `dcr`: critical dissipation and critical aggregate damage
#[derive(Debug, Clone)]
pub struct DislocationModel {
    parameters: DislocationParameters,
    slip_systems: SlipSystems,
    rotated: RotatedSlipSystems,
    crystal_rotation: Tensor2,
    band_geometry: SlipBandGeometry,
    damage_law: DamageLaw,
    /// strengthening of the material description
    configured_strengthening: PhaseStrengthening,
    /// strengthening at this point, local morphology applied
    strengthening: PhaseStrengthening,

    current: DislocationSnapshot,
    old: DislocationSnapshot,
    previous_substep: DislocationSnapshot,
    before_update: DislocationSnapshot,
    band: SlipBandState,
    strains: StrainMeasures,

    residual_ssd: Vec<f64>,
    tau: Vec<f64>,
    slip_rate: Vec<f64>,
    slip_resistance: Vec<f64>,
    slip_resistance_gamma: Vec<f64>,
    slip_resistance_gamma_prime: Vec<f64>,
    ratio: Vec<f64>,

    rho_ssd_rate: Vec<f64>,
    rho_gnd_edge_rate: Vec<f64>,
    rho_gnd_screw_rate: Vec<f64>,
    backstress_rate: Vec<f64>,
    damage_increment: Vec<f64>,
}

impl DislocationModel {
    pub fn new(parameters: DislocationParameters, strengthening: PhaseStrengthening) -> Result<Self> {
        parameters.validate()?;
        let slip_systems = SlipSystems::fcc_octahedral();
        let n = slip_systems.len();
        let state = DislocationSnapshot::initial(n, &parameters);
        let crystal_rotation = Tensor2::identity();
        Ok(Self {
            rotated: slip_systems.rotated(&crystal_rotation),
            slip_systems,
            crystal_rotation,
            band_geometry: SlipBandGeometry::new(&parameters),
            damage_law: DamageLaw::new(parameters.wcr, parameters.dcr),
            configured_strengthening: strengthening,
            strengthening,
            current: state.clone(),
            old: state.clone(),
            previous_substep: state.clone(),
            before_update: state,
            band: SlipBandState::default(),
            strains: StrainMeasures::default(),
            residual_ssd: vec![0.0; n],
            tau: vec![0.0; n],
            slip_rate: vec![0.0; n],
            slip_resistance: vec![0.0; n],
            slip_resistance_gamma: vec![0.0; n],
            slip_resistance_gamma_prime: vec![0.0; n],
            ratio: vec![0.0; n],
            rho_ssd_rate: vec![0.0; n],
            rho_gnd_edge_rate: vec![0.0; n],
            rho_gnd_screw_rate: vec![0.0; n],
            backstress_rate: vec![0.0; n],
            damage_increment: vec![0.0; n],
            parameters,
        })
    }

    pub fn parameters(&self) -> &DislocationParameters {
        &self.parameters
    }

    pub fn state(&self) -> &DislocationSnapshot {
        &self.current
    }

    pub fn old_state(&self) -> &DislocationSnapshot {
        &self.old
    }

    pub fn resolved_shear_stress(&self) -> &[f64] {
        &self.tau
    }

    pub fn slip_resistance(&self) -> &[f64] {
        &self.slip_resistance
    }

    pub fn slip_band(&self) -> &SlipBandState {
        &self.band
    }

    pub fn strains(&self) -> &StrainMeasures {
        &self.strains
    }

    pub fn strengthening(&self) -> &PhaseStrengthening {
        &self.strengthening
    }

    fn strain_rate_sensitivity(&self, input: &PointInput) -> f64 {
        input.strain_rate_sensitivity.unwrap_or(self.parameters.xm)
    }

    /// The gamma prime power law only exists on the first plane of a band.
    fn shears_precipitates(&self, system: usize) -> bool {
        self.band.inside && system < SYSTEMS_PER_PLANE
    }

    fn update_residual_ssd(&mut self, ctx: &SubstepContext) {
        if !self.parameters.with_residual_dislocations
            || ctx.input.time <= self.parameters.residual_activation_time
        {
            return;
        }
        let strain = green_lagrange(&ctx.eigenstrain_deformation_gradient);
        let lattice = self.crystal_rotation.transpose() * strain * self.crystal_rotation;
        self.residual_ssd = residual_ssd(&lattice, self.slip_systems.len(), &self.parameters);
    }
}

impl CrystalPlasticityModel for DislocationModel {
    fn n_slip_systems(&self) -> usize {
        self.slip_systems.len()
    }

    fn flow_directions(&self) -> &[Tensor2] {
        &self.rotated.flow_direction
    }

    fn slip_rates(&self) -> &[f64] {
        &self.slip_rate
    }

    fn calculate_flow_direction(&mut self, crystal_rotation: &Tensor2) {
        self.crystal_rotation = *crystal_rotation;
        self.rotated = self.slip_systems.rotated(crystal_rotation);
    }

    fn set_initial_constitutive_variable_values(&mut self, input: &PointInput) {
        self.strengthening = self.configured_strengthening.with_phases(
            input.microstructure.as_ref(),
            input.solutes.as_ref(),
            &self.parameters,
        );
        self.current.clone_from(&self.old);
        self.previous_substep.clone_from(&self.old);
        self.band.reset(&self.band_geometry, input);
    }

    fn set_substep_constitutive_variable_values(&mut self, ctx: &SubstepContext) {
        self.current.clone_from(&self.previous_substep);
        self.band.reset(&self.band_geometry, ctx.input);
        self.ratio.iter_mut().for_each(|r| *r = 0.0);
        self.update_residual_ssd(ctx);
    }

    fn update_substep_constitutive_variable_values(&mut self) {
        self.previous_substep.clone_from(&self.current);
    }

    fn cache_state_variables_before_update(&mut self) {
        self.before_update.clone_from(&self.current);
    }

    fn calculate_slip_resistance(&mut self, ctx: &SubstepContext) {
        let p = &self.parameters;
        let s = &self.current;
        let taylor = p.alpha_0 * p.shear_modulus * p.burgers_vector_mag;
        for i in 0..self.slip_systems.len() {
            let mut density = 0.0;
            for j in 0..self.slip_systems.len() {
                let weight = if SlipSystems::plane(i) == SlipSystems::plane(j) {
                    1.0
                } else {
                    p.r
                };
                density += weight
                    * (s.rho_ssd[j]
                        + self.residual_ssd[j]
                        + s.rho_gnd_edge[j].abs()
                        + s.rho_gnd_screw[j].abs());
            }
            self.slip_resistance[i] = p.tau_c_0 + taylor * density.max(0.0).sqrt();

            let resistance = phase_resistance(
                i,
                self.slip_resistance[i],
                s.damage[i],
                &self.band,
                &ctx.input.band,
                &self.strengthening,
                p,
            );
            self.slip_resistance_gamma[i] = resistance.gamma;
            self.slip_resistance_gamma_prime[i] = resistance.gamma_prime;
            self.ratio[i] = resistance.ratio;
        }
    }

    fn calculate_shear_stress(&mut self, pk2: &Tensor2, eigenstrain_deformation_gradient: &Tensor2) {
        let product = eigenstrain_deformation_gradient.transpose()
            * eigenstrain_deformation_gradient
            * pk2;
        for (tau, m) in self.tau.iter_mut().zip(&self.rotated.flow_direction) {
            *tau = product.dot(m);
        }
    }

    fn calculate_slip_rate(&mut self, ctx: &SubstepContext) -> Attempt {
        let p = &self.parameters;
        let xm = self.strain_rate_sensitivity(ctx.input);
        let fraction = self.strengthening.precipitate_fraction;
        for i in 0..self.slip_systems.len() {
            let tau = self.tau[i];
            let gamma = p.ao * (tau.abs() / self.slip_resistance_gamma[i]).powf(1.0 / xm);
            let gamma_prime = if self.shears_precipitates(i) {
                p.ao2 * (tau.abs() / self.slip_resistance_gamma_prime[i]).powf(1.0 / p.xm2)
            } else {
                0.0
            };
            let magnitude = (1.0 - fraction) * gamma + fraction * gamma_prime;
            self.slip_rate[i] = if tau < 0.0 { -magnitude } else { magnitude };

            let increment = magnitude * ctx.substep_dt;
            if increment > p.slip_increment_tolerance || !increment.is_finite() {
                return Err(RecoverableFailure::SlipRateOverflow {
                    system: i,
                    increment,
                    tolerance: p.slip_increment_tolerance,
                });
            }
        }
        Ok(())
    }

    fn calculate_constitutive_slip_derivative(&self, ctx: &SubstepContext) -> Vec<f64> {
        let p = &self.parameters;
        let xm = self.strain_rate_sensitivity(ctx.input);
        let fraction = self.strengthening.precipitate_fraction;
        (0..self.slip_systems.len())
            .map(|i| {
                let tau = self.tau[i].abs();
                if tau <= p.zero_tolerance {
                    return 0.0;
                }
                let g = self.slip_resistance_gamma[i];
                let d_gamma = p.ao / xm * (tau / g).powf(1.0 / xm - 1.0) / g;
                let d_gamma_prime = if self.shears_precipitates(i) {
                    let g = self.slip_resistance_gamma_prime[i];
                    p.ao2 / p.xm2 * (tau / g).powf(1.0 / p.xm2 - 1.0) / g
                } else {
                    0.0
                };
                (1.0 - fraction) * d_gamma + fraction * d_gamma_prime
            })
            .collect()
    }

    fn calculate_state_variable_evolution_rate_component(&mut self, ctx: &SubstepContext) {
        let p = &self.parameters;
        let s = &self.current;
        let gnd = if p.with_gnd {
            ctx.input
                .slip_rate_gradient_edge
                .as_ref()
                .zip(ctx.input.slip_rate_gradient_screw.as_ref())
        } else {
            None
        };
        for i in 0..self.slip_systems.len() {
            let rate = self.slip_rate[i].abs();
            let total = s.rho_ssd[i]
                + s.rho_gnd_edge[i].abs()
                + s.rho_gnd_screw[i].abs()
                + self.residual_ssd[i];
            self.rho_ssd_rate[i] = (p.k_0 * total.max(0.0).sqrt() - 2.0 * p.y_c * s.rho_ssd[i])
                * rate
                / p.burgers_vector_mag;
            (self.rho_gnd_edge_rate[i], self.rho_gnd_screw_rate[i]) = match gnd {
                Some((edge, screw)) => (
                    -edge.get(i).copied().unwrap_or(0.0) / p.burgers_vector_mag / p.scale,
                    screw.get(i).copied().unwrap_or(0.0) / p.burgers_vector_mag / p.scale,
                ),
                None => (0.0, 0.0),
            };
            self.backstress_rate[i] = p.h * self.slip_rate[i] - p.h_d * s.backstress[i] * rate;
        }
        self.damage_law.increments(
            &self.slip_rate,
            &self.tau,
            ctx.substep_dt,
            &mut self.damage_increment,
        );
    }

    fn update_state_variables(&mut self, ctx: &SubstepContext) -> Result<Attempt> {
        let dt = ctx.substep_dt;
        let input = ctx.input;

        self.band.evolve(
            &self.band_geometry,
            input,
            &self.tau,
            self.strengthening.gamma_prime_shear,
        );
        if self.band.phase == SlipBandPhase::Nucleated {
            debug!(
                point = input.point,
                time = input.time,
                system = ?self.band.activated_system,
                "slip band nucleated"
            );
        }
        self.strains = StrainMeasures::new(
            &ctx.deformation_gradient,
            &ctx.plastic_deformation_gradient,
        );

        let zero = self.parameters.zero_tolerance;
        for i in 0..self.slip_systems.len() {
            let previous = self.previous_substep.rho_ssd[i];
            let increment = self.rho_ssd_rate[i] * dt;
            let rho = if previous < zero && increment < 0.0 {
                previous
            } else {
                previous + increment
            };
            self.current.rho_ssd[i] = rho;
            if rho < 0.0 {
                return Ok(Err(RecoverableFailure::NegativeDislocationDensity {
                    system: i,
                    density: rho,
                }));
            }
        }

        // only a state that passed the density check may end the run
        match self.damage_law.update(
            &self.previous_substep.damage,
            &self.damage_increment,
            &mut self.current.damage,
        ) {
            Ok(aggregate) => self.current.aggregate_damage = aggregate,
            Err(critical) => {
                self.current.aggregate_damage = critical.damage;
                return Err(ConstitutiveError::CriticalDamageReached {
                    point: input.point,
                    time: input.time,
                    damage: critical.damage,
                    threshold: critical.threshold,
                });
            }
        }

        for i in 0..self.slip_systems.len() {
            let previous = &self.previous_substep;
            self.current.rho_gnd_edge[i] = previous.rho_gnd_edge[i] + self.rho_gnd_edge_rate[i] * dt;
            self.current.rho_gnd_screw[i] =
                previous.rho_gnd_screw[i] + self.rho_gnd_screw_rate[i] * dt;
            self.current.backstress[i] = previous.backstress[i] + self.backstress_rate[i] * dt;
            self.current.accumulated_slip[i] =
                previous.accumulated_slip[i] + self.slip_rate[i].abs() * dt;
        }
        Ok(Ok(()))
    }

    fn are_constitutive_state_variables_converged(&self) -> bool {
        let zero = self.parameters.zero_tolerance;
        self.current
            .rho_ssd
            .iter()
            .zip(&self.before_update.rho_ssd)
            .zip(&self.previous_substep.rho_ssd)
            .all(|((current, before), previous)| {
                let change = (current - before).abs();
                if *previous < zero {
                    change <= zero
                } else {
                    change <= self.parameters.rho_tol * previous.abs()
                }
            })
    }

    fn commit(&mut self) {
        self.old.clone_from(&self.current);
    }

    fn field(&self, q: Q) -> Option<Vec<f64>> {
        let s = &self.current;
        let flag = |b: bool| vec![if b { 1.0 } else { 0.0 }];
        Some(match q {
            Q::RhoSsd => s.rho_ssd.clone(),
            Q::RhoGndEdge => s.rho_gnd_edge.clone(),
            Q::RhoGndScrew => s.rho_gnd_screw.clone(),
            Q::Backstress => s.backstress.clone(),
            Q::Damage => s.damage.clone(),
            Q::AccumulatedSlip => s.accumulated_slip.clone(),
            Q::AggregateDamage => vec![s.aggregate_damage],
            Q::SlipRate => self.slip_rate.clone(),
            Q::SlipResistance => self.slip_resistance.clone(),
            Q::SlipResistanceGamma => self.slip_resistance_gamma.clone(),
            Q::SlipResistanceGammaPrime => self.slip_resistance_gamma_prime.clone(),
            Q::ResolvedShearStress => self.tau.clone(),
            Q::BandRatio => self.ratio.clone(),
            Q::EdgeSlipDirection => flatten_vectors(&self.rotated.edge_direction),
            Q::ScrewSlipDirection => flatten_vectors(&self.rotated.screw_direction),
            Q::InsideSlipBand => flag(self.band.inside),
            Q::SlipBandInitiation => flag(self.band.initiated),
            Q::InitiationStress => vec![self.band.initiation_stress],
            Q::InitiationStrain => vec![self.band.initiation_strain],
            Q::FrontDistance => vec![self.band.front_distance],
            Q::ActivatedSlipSystem => {
                vec![self.band.activated_system.map_or(-1.0, |i| i as f64)]
            }
            Q::PlasticStrain => tensor_values(&self.strains.plastic),
            Q::ElasticStrain => tensor_values(&self.strains.elastic),
            Q::TotalStrain => tensor_values(&self.strains.total),
            Q::Strain110 => self.strains.strain_110.to_vec(),
            _ => return None,
        })
    }
}

fn flatten_vectors(vectors: &[Vector3<f64>]) -> Vec<f64> {
    vectors.iter().flat_map(|v| v.iter().copied()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::microstructure::Microstructure;
    use approx::assert_relative_eq;

    fn model(parameters: DislocationParameters) -> DislocationModel {
        let mut model = DislocationModel::new(parameters, PhaseStrengthening::default()).unwrap();
        model.calculate_flow_direction(&Tensor2::identity());
        model
    }

    fn input() -> PointInput {
        PointInput::new(Tensor2::identity(), Tensor2::identity(), 0.1)
    }

    /// Starts a substep and resolves `pk2` onto the slip systems.
    fn prepare(model: &mut DislocationModel, ctx: &SubstepContext, pk2: &Tensor2) {
        model.set_initial_constitutive_variable_values(ctx.input);
        model.set_substep_constitutive_variable_values(ctx);
        model.calculate_slip_resistance(ctx);
        model.calculate_shear_stress(pk2, &Tensor2::identity());
    }

    fn octahedral_shear(model: &DislocationModel, tau: f64) -> Tensor2 {
        let m = model.flow_directions()[0];
        (m + m.transpose()) * tau
    }

    #[test]
    fn taylor_resistance_with_latent_hardening() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        // three systems on the own plane, nine with weight r = 1.4
        let expected = 0.112 + 0.3 * 35000.0 * 0.000255 * (3.0 + 9.0 * 1.4_f64).sqrt();
        for g in model.slip_resistance() {
            assert_relative_eq!(*g, expected, epsilon = 1e-12);
        }
        assert_eq!(model.slip_resistance_gamma, model.slip_resistance.clone());
        assert!(model.slip_resistance_gamma_prime.iter().all(|g| *g == 140.0));
    }

    #[test]
    fn octahedral_shear_slip_follows_stress_sign() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        let g = {
            prepare(&mut model, &ctx, &Tensor2::zeros());
            model.slip_resistance()[0]
        };
        for tau in [-0.8 * g, 0.8 * g] {
            let pk2 = octahedral_shear(&model, tau);
            prepare(&mut model, &ctx, &pk2);
            assert_relative_eq!(model.resolved_shear_stress()[0], tau, epsilon = 1e-10);
            model.calculate_slip_rate(&ctx).unwrap();
            for (rate, tau) in model.slip_rates().iter().zip(model.resolved_shear_stress()) {
                assert!(rate * tau >= 0.0);
            }
            assert_eq!(model.slip_rates()[0].signum(), tau.signum());
            assert_relative_eq!(
                model.slip_rates()[0].abs(),
                0.001 * 0.8_f64.powi(10),
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn larger_flow_exponent_slows_subcritical_slip() {
        let mut model = model(DislocationParameters::default());
        let mut input = input();
        let rate = |model: &mut DislocationModel, input: &PointInput| {
            let ctx = SubstepContext::new(input, 0.1);
            prepare(model, &ctx, &Tensor2::zeros());
            let g = model.slip_resistance()[0];
            let pk2 = octahedral_shear(model, 0.5 * g);
            prepare(model, &ctx, &pk2);
            model.calculate_slip_rate(&ctx).unwrap();
            model.slip_rates()[0]
        };
        let mut previous = f64::INFINITY;
        for xm in [0.2, 0.1, 0.05] {
            input.strain_rate_sensitivity = Some(xm);
            let current = rate(&mut model, &input);
            assert!(current > 0.0);
            assert!(current < previous);
            previous = current;
        }
    }

    #[test]
    fn excessive_slip_is_recoverable() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 3.0 * g);
        prepare(&mut model, &ctx, &pk2);
        assert!(matches!(
            model.calculate_slip_rate(&ctx),
            Err(RecoverableFailure::SlipRateOverflow { system: 0, .. })
        ));
    }

    #[test]
    fn slip_derivative_matches_finite_difference() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 0.9 * g);
        prepare(&mut model, &ctx, &pk2);
        model.calculate_slip_rate(&ctx).unwrap();
        let analytic = model.calculate_constitutive_slip_derivative(&ctx)[0];
        let base = model.slip_rates()[0];

        let h = 1e-6 * g;
        let shifted = octahedral_shear(&model, 0.9 * g + h);
        model.calculate_shear_stress(&shifted, &Tensor2::identity());
        model.calculate_slip_rate(&ctx).unwrap();
        let numeric = (model.slip_rates()[0] - base) / h;
        assert_relative_eq!(analytic, numeric, max_relative = 1e-4);
    }

    #[test]
    fn zero_stress_gives_zero_rate_and_derivative() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        model.calculate_slip_rate(&ctx).unwrap();
        assert!(model.slip_rates().iter().all(|r| *r == 0.0));
        assert!(model
            .calculate_constitutive_slip_derivative(&ctx)
            .iter()
            .all(|d| *d == 0.0));
    }

    fn run_update(model: &mut DislocationModel, ctx: &SubstepContext) -> Result<Attempt> {
        model.calculate_slip_rate(ctx).unwrap();
        model.cache_state_variables_before_update();
        model.calculate_state_variable_evolution_rate_component(ctx);
        model.update_state_variables(ctx)
    }

    #[test]
    fn negative_density_is_reported_not_clamped() {
        let mut parameters = DislocationParameters::default();
        parameters.k_0 = 0.0;
        parameters.y_c = 1.0;
        let mut model = model(parameters);
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 1.5 * g);
        prepare(&mut model, &ctx, &pk2);
        let attempt = run_update(&mut model, &ctx).unwrap();
        match attempt {
            Err(RecoverableFailure::NegativeDislocationDensity { density, .. }) => {
                assert!(density < 0.0)
            }
            other => panic!("expected negative density, got {:?}", other),
        }
    }

    #[test]
    fn densities_grow_and_stay_positive_under_load() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 1.2 * g);
        prepare(&mut model, &ctx, &pk2);
        run_update(&mut model, &ctx).unwrap().unwrap();
        let state = model.state();
        assert!(state.rho_ssd.iter().all(|rho| *rho >= 0.0));
        assert!(state.rho_ssd[0] > 1.0);
        assert!(state.accumulated_slip[0] > 0.0);
        assert!(state.aggregate_damage > 0.0);
        assert_relative_eq!(state.aggregate_damage, state.damage.iter().sum::<f64>());
    }

    #[test]
    fn convergence_compares_against_previous_substep() {
        let mut model = model(DislocationParameters {
            rho_tol: 1e-3,
            ..Default::default()
        });
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        model.cache_state_variables_before_update();
        assert!(model.are_constitutive_state_variables_converged());
        model.current.rho_ssd[3] += 0.01;
        assert!(!model.are_constitutive_state_variables_converged());
        model.current.rho_ssd[3] = 1.0 + 1e-4;
        assert!(model.are_constitutive_state_variables_converged());
    }

    #[test]
    fn critical_damage_is_fatal() {
        let mut model = model(DislocationParameters {
            wcr: 1e-6,
            ..Default::default()
        });
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 1.2 * g);
        prepare(&mut model, &ctx, &pk2);
        assert!(matches!(
            run_update(&mut model, &ctx),
            Err(ConstitutiveError::CriticalDamageReached { threshold, .. }) if threshold == 0.4
        ));
    }

    #[test]
    fn negative_density_is_rejected_before_damage_is_judged() {
        let mut model = model(DislocationParameters {
            k_0: 0.0,
            y_c: 1.0,
            wcr: 1e-6,
            ..Default::default()
        });
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 1.5 * g);
        prepare(&mut model, &ctx, &pk2);
        assert!(matches!(
            run_update(&mut model, &ctx),
            Ok(Err(RecoverableFailure::NegativeDislocationDensity { .. }))
        ));
    }

    #[test]
    fn local_morphology_overrides_configured_strengthening() {
        let mut model = model(DislocationParameters::default());
        let morphology = Microstructure {
            precipitate_height: 0.4,
            precipitate_length: 0.4,
            channel_width_height: 0.06,
            channel_width_length: 0.06,
            precipitate_fraction: 0.6,
        };
        let input = input().with_phases(Some(morphology), None);
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let orowan = 35000.0 * 0.000255 * 1000.0 / 0.06;
        assert_relative_eq!(model.strengthening().orowan, orowan, epsilon = 1e-9);
        assert_relative_eq!(
            model.slip_resistance_gamma[0],
            model.slip_resistance()[0] + orowan,
            epsilon = 1e-9
        );

        let plain = self::input();
        model.set_initial_constitutive_variable_values(&plain);
        assert_eq!(*model.strengthening(), PhaseStrengthening::default());
    }

    #[test]
    fn slip_directions_are_reported_per_system() {
        let model = model(DislocationParameters::default());
        let edge = model.field(Q::EdgeSlipDirection).unwrap();
        let screw = model.field(Q::ScrewSlipDirection).unwrap();
        assert_eq!(edge.len(), Q::EdgeSlipDirection.size(12));
        assert_eq!(screw.len(), 36);
        let s = std::f64::consts::FRAC_1_SQRT_2;
        assert_relative_eq!(edge[0], 0.0);
        assert_relative_eq!(edge[1], s, epsilon = 1e-15);
        assert_relative_eq!(edge[2], -s, epsilon = 1e-15);
        // d x n for d = [0 1 -1]/sqrt(2), n = [1 1 1]/sqrt(3)
        let t = 1.0 / 6.0_f64.sqrt();
        assert_relative_eq!(screw[0], 2.0 * t, epsilon = 1e-15);
        assert_relative_eq!(screw[1], -t, epsilon = 1e-15);
        assert_relative_eq!(screw[2], -t, epsilon = 1e-15);
    }

    #[test]
    fn restart_discards_unaccepted_substep() {
        let mut model = model(DislocationParameters::default());
        let input = input();
        let ctx = SubstepContext::new(&input, 0.1);
        prepare(&mut model, &ctx, &Tensor2::zeros());
        let g = model.slip_resistance()[0];
        let pk2 = octahedral_shear(&model, 1.2 * g);
        prepare(&mut model, &ctx, &pk2);
        run_update(&mut model, &ctx).unwrap().unwrap();
        assert_ne!(model.state(), model.old_state());
        model.set_initial_constitutive_variable_values(&input);
        assert_eq!(model.state(), model.old_state());
    }

    #[test]
    fn strain_measures_floor_zz_component() {
        let strains = StrainMeasures::new(&Tensor2::identity(), &Tensor2::identity());
        assert_eq!(strains.total[(2, 2)], 1e-10);
        assert_eq!(strains.plastic[(2, 2)], 1e-10);
        assert_eq!(strains.elastic[(2, 2)], 0.0);

        let mut f = Tensor2::identity();
        f[(0, 0)] = 1.01;
        let strains = StrainMeasures::new(&f, &Tensor2::identity());
        // e_xx rotated by 45 degrees splits evenly
        let exx = 0.5 * (1.01 * 1.01 - 1.0);
        assert_relative_eq!(strains.strain_110[0], 0.5 * exx, epsilon = 1e-12);
        assert_relative_eq!(strains.strain_110[1], 0.0, epsilon = 1e-12);
    }
}
