use crate::error::{Attempt, Result};
use crate::microstructure::{Microstructure, SoluteConcentration};
use crate::stress_strain::{outer, Tensor2, Tensor4};
use nalgebra::Vector3;
use serde::Deserialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Named quantities a material point can report after an update.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, Display, EnumString, AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum Q {
    CauchyStress,
    MandelStress,
    Pk2Stress,
    ElasticDeformationGradient,
    PlasticDeformationGradient,
    EigenstrainDeformationGradient,
    TotalLagrangianStrain,
    UpdatedRotation,
    RhoSsd,
    RhoGndEdge,
    RhoGndScrew,
    Backstress,
    Damage,
    AccumulatedSlip,
    SlipRate,
    SlipResistance,
    SlipResistanceGamma,
    SlipResistanceGammaPrime,
    ResolvedShearStress,
    BandRatio,
    /// sample frame edge direction of every system, three values each
    EdgeSlipDirection,
    /// sample frame screw direction of every system, three values each
    ScrewSlipDirection,
    AggregateDamage,
    InsideSlipBand,
    SlipBandInitiation,
    InitiationStress,
    InitiationStrain,
    FrontDistance,
    ActivatedSlipSystem,
    PlasticStrain,
    ElasticStrain,
    TotalStrain,
    /// `e_yy` and `e_xy` of the total strain on the (110) viewing plane
    Strain110,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QDim {
    Scalar,
    Vector(usize),
    /// one value per slip system
    SlipSystems,
    /// one vector per slip system
    SlipSystemVectors,
    /// full 3x3 tensor, row major
    Tensor,
}

impl Q {
    pub const fn dim(&self) -> QDim {
        match self {
            Q::CauchyStress
            | Q::Pk2Stress
            | Q::ElasticDeformationGradient
            | Q::PlasticDeformationGradient
            | Q::EigenstrainDeformationGradient
            | Q::TotalLagrangianStrain
            | Q::UpdatedRotation
            | Q::PlasticStrain
            | Q::ElasticStrain
            | Q::TotalStrain => QDim::Tensor,
            Q::MandelStress => QDim::Vector(6),
            Q::Strain110 => QDim::Vector(2),
            Q::RhoSsd
            | Q::RhoGndEdge
            | Q::RhoGndScrew
            | Q::Backstress
            | Q::Damage
            | Q::AccumulatedSlip
            | Q::SlipRate
            | Q::SlipResistance
            | Q::SlipResistanceGamma
            | Q::SlipResistanceGammaPrime
            | Q::ResolvedShearStress
            | Q::BandRatio => QDim::SlipSystems,
            Q::EdgeSlipDirection | Q::ScrewSlipDirection => QDim::SlipSystemVectors,
            Q::AggregateDamage
            | Q::InsideSlipBand
            | Q::SlipBandInitiation
            | Q::InitiationStress
            | Q::InitiationStrain
            | Q::FrontDistance
            | Q::ActivatedSlipSystem => QDim::Scalar,
        }
    }

    pub const fn size(&self, n_slip_systems: usize) -> usize {
        match self.dim() {
            QDim::Scalar => 1,
            QDim::Vector(n) => n,
            QDim::SlipSystems => n_slip_systems,
            QDim::SlipSystemVectors => 3 * n_slip_systems,
            QDim::Tensor => 9,
        }
    }
}

pub fn tensor_values(tensor: &Tensor2) -> Vec<f64> {
    tensor.transpose().as_slice().to_vec()
}

/// Slip band history of the previous converged global step. The values are
/// reductions over the whole domain computed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct BandHistory {
    /// lower front position along the band normal
    pub d1_old: f64,
    /// upper front position along the band normal
    pub d2_old: f64,
    /// a band has nucleated somewhere in the domain
    pub initiated: bool,
    pub stress_zz_old: f64,
    pub strain_zz_old: f64,
    /// stress sampled at this point when the band nucleated
    pub initiation_stress: f64,
    /// strain sampled at this point when the band nucleated
    pub initiation_strain: f64,
}

impl BandHistory {
    /// Values per point in flat host arrays.
    pub const SIZE: usize = 7;

    /// `d1_old, d2_old, initiated, stress_zz_old, strain_zz_old,
    /// initiation_stress, initiation_strain`; any nonzero flag counts as
    /// initiated.
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            d1_old: values[0],
            d2_old: values[1],
            initiated: values[2] != 0.0,
            stress_zz_old: values[3],
            strain_zz_old: values[4],
            initiation_stress: values[5],
            initiation_strain: values[6],
        }
    }
}

/// Everything the host supplies for one point and one global increment.
#[derive(Debug, Clone)]
pub struct PointInput {
    pub point: usize,
    pub coordinates: Vector3<f64>,
    /// time at the end of the increment
    pub time: f64,
    pub dt: f64,
    pub deformation_gradient_old: Tensor2,
    pub deformation_gradient: Tensor2,
    pub temperature: Option<f64>,
    pub temperature_old: Option<f64>,
    /// replaces the strain rate sensitivity `xm` of the gamma phase
    pub strain_rate_sensitivity: Option<f64>,
    /// derivative of the slip rate along the edge direction, per system
    pub slip_rate_gradient_edge: Option<Vec<f64>>,
    /// derivative of the slip rate along the screw direction, per system
    pub slip_rate_gradient_screw: Option<Vec<f64>>,
    pub band: BandHistory,
    /// local precipitate morphology, replaces the configured one
    pub microstructure: Option<Microstructure>,
    /// local solute concentration, replaces the configured one
    pub solutes: Option<SoluteConcentration>,
}

impl PointInput {
    pub fn new(deformation_gradient_old: Tensor2, deformation_gradient: Tensor2, dt: f64) -> Self {
        Self {
            point: 0,
            coordinates: Vector3::zeros(),
            time: dt,
            dt,
            deformation_gradient_old,
            deformation_gradient,
            temperature: None,
            temperature_old: None,
            strain_rate_sensitivity: None,
            slip_rate_gradient_edge: None,
            slip_rate_gradient_screw: None,
            band: BandHistory::default(),
            microstructure: None,
            solutes: None,
        }
    }

    pub fn at(mut self, point: usize, coordinates: Vector3<f64>) -> Self {
        self.point = point;
        self.coordinates = coordinates;
        self
    }

    pub fn with_time(mut self, time: f64) -> Self {
        self.time = time;
        self
    }

    pub fn with_temperature(mut self, temperature_old: f64, temperature: f64) -> Self {
        self.temperature_old = Some(temperature_old);
        self.temperature = Some(temperature);
        self
    }

    pub fn with_band(mut self, band: BandHistory) -> Self {
        self.band = band;
        self
    }

    pub fn with_phases(
        mut self,
        microstructure: Option<Microstructure>,
        solutes: Option<SoluteConcentration>,
    ) -> Self {
        self.microstructure = microstructure;
        self.solutes = solutes;
        self
    }
}

/// Kinematic state handed to the constitutive models during one substep.
#[derive(Debug, Clone)]
pub struct SubstepContext<'a> {
    pub input: &'a PointInput,
    pub substep_dt: f64,
    pub deformation_gradient: Tensor2,
    pub plastic_deformation_gradient: Tensor2,
    pub eigenstrain_deformation_gradient: Tensor2,
}

impl<'a> SubstepContext<'a> {
    pub fn new(input: &'a PointInput, substep_dt: f64) -> Self {
        Self {
            input,
            substep_dt,
            deformation_gradient: input.deformation_gradient,
            plastic_deformation_gradient: Tensor2::identity(),
            eigenstrain_deformation_gradient: Tensor2::identity(),
        }
    }
}

/// A crystal plasticity flow rule with its own internal state. The stress
/// solver sums the plastic flow of all registered models.
///
/// The call order within one substep is
/// `set_substep_constitutive_variable_values`, `calculate_slip_resistance`,
/// then for every Newton iterate `calculate_shear_stress`,
/// `calculate_slip_rate` and the derivatives, and after a converged stress
/// `cache_state_variables_before_update`,
/// `calculate_state_variable_evolution_rate_component`,
/// `update_state_variables`, `calculate_slip_resistance` until
/// `are_constitutive_state_variables_converged`.
pub trait CrystalPlasticityModel: std::fmt::Debug + Send {
    fn n_slip_systems(&self) -> usize;

    /// Schmid tensors in the sample frame
    fn flow_directions(&self) -> &[Tensor2];

    fn slip_rates(&self) -> &[f64];

    fn calculate_flow_direction(&mut self, crystal_rotation: &Tensor2);

    /// Restores the state of the previous converged global step.
    fn set_initial_constitutive_variable_values(&mut self, input: &PointInput);

    /// Restores the state at the start of the current substep.
    fn set_substep_constitutive_variable_values(&mut self, ctx: &SubstepContext);

    /// Accepts the current state as the start of the next substep.
    fn update_substep_constitutive_variable_values(&mut self);

    fn cache_state_variables_before_update(&mut self);

    fn calculate_slip_resistance(&mut self, ctx: &SubstepContext);

    fn calculate_shear_stress(&mut self, pk2: &Tensor2, eigenstrain_deformation_gradient: &Tensor2);

    fn calculate_slip_rate(&mut self, ctx: &SubstepContext) -> Attempt;

    /// `d(slip rate)/d(resolved shear stress)` per system
    fn calculate_constitutive_slip_derivative(&self, ctx: &SubstepContext) -> Vec<f64>;

    fn calculate_state_variable_evolution_rate_component(&mut self, ctx: &SubstepContext);

    /// Explicit update of the internal variables from the substep start.
    /// Recoverable problems are reported through the inner [`Attempt`].
    fn update_state_variables(&mut self, ctx: &SubstepContext) -> Result<Attempt>;

    fn are_constitutive_state_variables_converged(&self) -> bool;

    /// Promotes the current state to the old state.
    fn commit(&mut self);

    fn field(&self, q: Q) -> Option<Vec<f64>>;

    /// `sum_i slip_rate_i dt M_i`
    fn calculate_equivalent_slip_increment(&self, substep_dt: f64) -> Tensor2 {
        self.flow_directions()
            .iter()
            .zip(self.slip_rates())
            .fold(Tensor2::zeros(), |acc, (m, rate)| acc + m * (rate * substep_dt))
    }

    /// `d(Fp^-1)/d(PK2)` with `Fp^-1 = Fp_old^-1 (I - sum_i slip_rate_i dt M_i)`
    fn calculate_total_plastic_deformation_gradient_derivative(
        &self,
        ctx: &SubstepContext,
        inverse_plastic_deformation_gradient_old: &Tensor2,
    ) -> Tensor4 {
        let eig = &ctx.eigenstrain_deformation_gradient;
        let metric = eig.transpose() * eig;
        let dslip_dtau = self.calculate_constitutive_slip_derivative(ctx);
        let mut derivative = Tensor4::zeros();
        for (m, dslip) in self.flow_directions().iter().zip(dslip_dtau) {
            let dfpinv_dslip = -inverse_plastic_deformation_gradient_old * m;
            let dtau_dpk2 = metric * m;
            derivative += outer(&dfpinv_dslip, &dtau_dpk2) * (dslip * ctx.substep_dt);
        }
        derivative
    }
}

/// Multiplicative eigenstrain contribution `F_eig` to the deformation gradient.
pub trait EigenstrainProvider: std::fmt::Debug + Send {
    /// Evaluates the eigenstrain reached after `fraction` of the increment.
    fn compute_qp_properties(&mut self, input: &PointInput, fraction: f64) -> Result<()>;

    fn deformation_gradient(&self) -> Tensor2;

    fn deformation_gradient_inverse(&self) -> Tensor2;

    fn commit(&mut self);
}
