//! Material constants and solver settings.
//!
//! Every parameter set can be built from a flat `HashMap<String, f64>` (the
//! form used by the python bindings) or deserialized from JSON with missing
//! keys falling back to the defaults.
use crate::elasticity::CubicElasticity;
use crate::error::{ConstitutiveError, Result};
use crate::microstructure::{Microstructure, SoluteConcentration};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use strum_macros::{AsRefStr, Display, EnumString};

fn flag(parameters: &HashMap<String, f64>, key: &str, default: bool) -> bool {
    parameters.get(key).map_or(default, |value| *value != 0.0)
}

fn count(parameters: &HashMap<String, f64>, key: &str, default: usize) -> usize {
    parameters
        .get(key)
        .map_or(default, |value| value.max(0.0).round() as usize)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LineSearchMethod {
    CutHalf,
    Bisection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TangentModuliType {
    /// Elasto-plastic tangent of the converged elastic state.
    Exact,
    /// Rotated elasticity tensor.
    Elastic,
}

/// Settings of the substep, Newton and line search loops plus the thermal
/// eigenstrain applied inside the stress residual.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverParameters {
    pub rtol: f64,
    pub abs_tol: f64,
    pub maxiter: usize,
    pub maxiter_state_variable: usize,
    pub maximum_substep_iteration: usize,
    pub use_line_search: bool,
    pub min_line_search_step_size: f64,
    pub line_search_tolerance: f64,
    pub line_search_maxiter: usize,
    pub line_search_method: LineSearchMethod,
    pub tan_mod_type: TangentModuliType,
    pub print_convergence_messages: bool,
    pub thermal_expansion: f64,
    pub dcte_dt: f64,
    pub reference_temperature: f64,
    pub melting_temperature_high: f64,
    pub melting_temperature_low: f64,
    pub liquid_thermal_expansion: bool,
}

impl Default for SolverParameters {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            abs_tol: 1e-6,
            maxiter: 100,
            maxiter_state_variable: 100,
            maximum_substep_iteration: 1,
            use_line_search: false,
            min_line_search_step_size: 0.01,
            line_search_tolerance: 0.5,
            line_search_maxiter: 20,
            line_search_method: LineSearchMethod::CutHalf,
            tan_mod_type: TangentModuliType::Elastic,
            print_convergence_messages: false,
            thermal_expansion: 0.0,
            dcte_dt: 0.0,
            reference_temperature: 303.0,
            melting_temperature_high: 1673.15,
            melting_temperature_low: 1648.15,
            liquid_thermal_expansion: true,
        }
    }
}

impl SolverParameters {
    pub fn from_map(parameters: &HashMap<String, f64>) -> Self {
        let d = Self::default();
        Self {
            rtol: *parameters.get("rtol").unwrap_or(&d.rtol),
            abs_tol: *parameters.get("abs_tol").unwrap_or(&d.abs_tol),
            maxiter: count(parameters, "maxiter", d.maxiter),
            maxiter_state_variable: count(
                parameters,
                "maxiter_state_variable",
                d.maxiter_state_variable,
            ),
            maximum_substep_iteration: count(
                parameters,
                "maximum_substep_iteration",
                d.maximum_substep_iteration,
            ),
            use_line_search: flag(parameters, "use_line_search", d.use_line_search),
            min_line_search_step_size: *parameters
                .get("min_line_search_step_size")
                .unwrap_or(&d.min_line_search_step_size),
            line_search_tolerance: *parameters
                .get("line_search_tol")
                .unwrap_or(&d.line_search_tolerance),
            line_search_maxiter: count(parameters, "line_search_maxiter", d.line_search_maxiter),
            // 0: cut half, 1: bisection
            line_search_method: match parameters.get("line_search_method") {
                Some(value) if *value != 0.0 => LineSearchMethod::Bisection,
                Some(_) => LineSearchMethod::CutHalf,
                None => d.line_search_method,
            },
            // 0: elastic, 1: exact
            tan_mod_type: match parameters.get("tan_mod_type") {
                Some(value) if *value != 0.0 => TangentModuliType::Exact,
                Some(_) => TangentModuliType::Elastic,
                None => d.tan_mod_type,
            },
            print_convergence_messages: flag(
                parameters,
                "print_state_variable_convergence_error_messages",
                d.print_convergence_messages,
            ),
            thermal_expansion: *parameters
                .get("thermal_expansion")
                .unwrap_or(&d.thermal_expansion),
            dcte_dt: *parameters.get("dCTE_dT").unwrap_or(&d.dcte_dt),
            reference_temperature: *parameters
                .get("reference_temperature")
                .unwrap_or(&d.reference_temperature),
            melting_temperature_high: *parameters
                .get("melting_temperature_high")
                .unwrap_or(&d.melting_temperature_high),
            melting_temperature_low: *parameters
                .get("melting_temperature_low")
                .unwrap_or(&d.melting_temperature_low),
            liquid_thermal_expansion: flag(
                parameters,
                "liquid_thermal_expansion",
                d.liquid_thermal_expansion,
            ),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.maxiter == 0 || self.maxiter_state_variable == 0 {
            return Err(ConstitutiveError::InvalidParameter {
                name: "maxiter".to_string(),
                reason: "iteration caps must be positive".to_string(),
            });
        }
        if self.maximum_substep_iteration == 0 {
            return Err(ConstitutiveError::InvalidParameter {
                name: "maximum_substep_iteration".to_string(),
                reason: "at least one substep attempt is required".to_string(),
            });
        }
        if self.melting_temperature_high <= self.melting_temperature_low {
            return Err(ConstitutiveError::InvalidParameter {
                name: "melting_temperature_high".to_string(),
                reason: "liquidus must lie above the solidus".to_string(),
            });
        }
        Ok(())
    }
}

/// Constants of the dislocation density model, the slip band and the damage
/// law. Units follow the calibration of the model: stresses in MPa, lengths in
/// micrometres, densities in 1/um^2.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DislocationParameters {
    /// reference slip rate of the gamma phase
    pub ao: f64,
    /// strain rate sensitivity of the gamma phase
    pub xm: f64,
    /// reference slip rate of the gamma prime phase inside a slip band
    pub ao2: f64,
    pub xm2: f64,
    pub burgers_vector_mag: f64,
    pub shear_modulus: f64,
    pub alpha_0: f64,
    /// latent hardening coefficient
    pub r: f64,
    pub tau_c_0: f64,
    pub k_0: f64,
    pub y_c: f64,
    pub h: f64,
    pub h_d: f64,
    pub init_rho_ssd: f64,
    pub init_rho_gnd_edge: f64,
    pub init_rho_gnd_screw: f64,
    pub rho_tol: f64,
    pub scale: f64,
    pub gamma_apb: f64,
    pub g_shear: f64,
    pub with_gnd: bool,
    pub with_residual_dislocations: bool,
    pub residual_dislocation_prefactor: f64,
    pub residual_activation_time: f64,
    pub slip_increment_tolerance: f64,
    pub zero_tolerance: f64,
    pub z_length: f64,
    pub sb_evo_rate: f64,
    pub initial_sb_width: f64,
    pub nucleation_time: f64,
    pub core_radius: f64,
    pub core_half_height: f64,
    pub propagation_radius: f64,
    pub band_normal: [f64; 3],
    pub wcr: f64,
    pub dcr: f64,
    pub initial_shear: f64,
    pub end_strain: f64,
}

impl Default for DislocationParameters {
    fn default() -> Self {
        Self {
            ao: 0.001,
            xm: 0.1,
            ao2: 0.0,
            xm2: 0.1,
            burgers_vector_mag: 0.000255,
            shear_modulus: 35000.0,
            alpha_0: 0.3,
            r: 1.4,
            tau_c_0: 0.112,
            k_0: 100.0,
            y_c: 0.0026,
            h: 0.0,
            h_d: 0.0,
            init_rho_ssd: 1.0,
            init_rho_gnd_edge: 0.0,
            init_rho_gnd_screw: 0.0,
            rho_tol: 1.0,
            scale: 7.5,
            gamma_apb: 0.055,
            g_shear: 35000.0,
            with_gnd: true,
            with_residual_dislocations: true,
            residual_dislocation_prefactor: 150.0,
            residual_activation_time: 1.0,
            slip_increment_tolerance: 2e-2,
            zero_tolerance: 1e-12,
            z_length: 6.0,
            sb_evo_rate: 0.0015,
            initial_sb_width: 0.4,
            nucleation_time: 5.0,
            core_radius: 0.1,
            core_half_height: 1.0,
            propagation_radius: 0.3,
            band_normal: [-1.0, 1.0, 1.0],
            wcr: 67.5,
            dcr: 0.4,
            initial_shear: 140.0,
            end_strain: 0.15,
        }
    }
}

impl DislocationParameters {
    pub fn from_map(parameters: &HashMap<String, f64>) -> Self {
        let d = Self::default();
        let get = |key: &str, default: f64| *parameters.get(key).unwrap_or(&default);
        Self {
            ao: get("ao", d.ao),
            xm: get("xm", d.xm),
            ao2: get("ao2", d.ao2),
            xm2: get("xm2", d.xm2),
            burgers_vector_mag: get("burgers_vector_mag", d.burgers_vector_mag),
            shear_modulus: get("shear_modulus", d.shear_modulus),
            alpha_0: get("alpha_0", d.alpha_0),
            r: get("r", d.r),
            tau_c_0: get("tau_c_0", d.tau_c_0),
            k_0: get("k_0", d.k_0),
            y_c: get("y_c", d.y_c),
            h: get("h", d.h),
            h_d: get("h_D", d.h_d),
            init_rho_ssd: get("init_rho_ssd", d.init_rho_ssd),
            init_rho_gnd_edge: get("init_rho_GND_edge", d.init_rho_gnd_edge),
            init_rho_gnd_screw: get("init_rho_GND_screw", d.init_rho_gnd_screw),
            rho_tol: get("rho_tol", d.rho_tol),
            scale: get("scale", d.scale),
            gamma_apb: get("gamma_APB", d.gamma_apb),
            g_shear: get("G_shear", d.g_shear),
            with_gnd: flag(parameters, "with_GND", d.with_gnd),
            with_residual_dislocations: flag(
                parameters,
                "with_residual_dis",
                d.with_residual_dislocations,
            ),
            residual_dislocation_prefactor: get(
                "residual_dislocation_prefactor",
                d.residual_dislocation_prefactor,
            ),
            residual_activation_time: get("residual_activation_time", d.residual_activation_time),
            slip_increment_tolerance: get("slip_increment_tolerance", d.slip_increment_tolerance),
            zero_tolerance: get("zero_tolerance", d.zero_tolerance),
            z_length: get("z_length", d.z_length),
            sb_evo_rate: get("sb_evo_rate", d.sb_evo_rate),
            initial_sb_width: get("initial_SB_width", d.initial_sb_width),
            nucleation_time: get("nucleation_time", d.nucleation_time),
            core_radius: get("core_radius", d.core_radius),
            core_half_height: get("core_half_height", d.core_half_height),
            propagation_radius: get("propagation_radius", d.propagation_radius),
            band_normal: [
                get("band_normal_x", d.band_normal[0]),
                get("band_normal_y", d.band_normal[1]),
                get("band_normal_z", d.band_normal[2]),
            ],
            wcr: get("Wcr", d.wcr),
            dcr: get("Dcr", d.dcr),
            initial_shear: get("initial_shear", d.initial_shear),
            end_strain: get("end_strain", d.end_strain),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("xm", self.xm),
            ("xm2", self.xm2),
            ("burgers_vector_mag", self.burgers_vector_mag),
            ("scale", self.scale),
            ("Wcr", self.wcr),
            ("Dcr", self.dcr),
            ("slip_increment_tolerance", self.slip_increment_tolerance),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConstitutiveError::InvalidParameter {
                    name: name.to_string(),
                    reason: format!("must be positive, got {}", value),
                });
            }
        }
        if self.init_rho_ssd < 0.0 {
            return Err(ConstitutiveError::InvalidParameter {
                name: "init_rho_ssd".to_string(),
                reason: "dislocation densities cannot be negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Residual eigenstrain from the thermal history of the build.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResidualEigenstrainParameters {
    /// Thermal expansion coefficients in the lattice frame, row major. They
    /// are rotated with the crystal orientation.
    pub thermal_expansion_coefficients: [[f64; 3]; 3],
    /// Apply the same eigenstrain everywhere instead of the radial profile.
    pub uniform: bool,
}

impl Default for ResidualEigenstrainParameters {
    fn default() -> Self {
        Self {
            thermal_expansion_coefficients: [[0.0; 3]; 3],
            uniform: false,
        }
    }
}

impl ResidualEigenstrainParameters {
    /// Isotropic coefficient `alpha` on the diagonal.
    pub fn isotropic(alpha: f64, uniform: bool) -> Self {
        Self {
            thermal_expansion_coefficients: [[alpha, 0.0, 0.0], [0.0, alpha, 0.0], [0.0, 0.0, alpha]],
            uniform,
        }
    }
}

/// Complete description of one material block.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    pub elasticity: CubicElasticity,
    pub solver: SolverParameters,
    pub dislocation: DislocationParameters,
    pub residual_eigenstrain: Option<ResidualEigenstrainParameters>,
    /// Precipitate morphology shared by all points without a local one.
    pub microstructure: Option<Microstructure>,
    pub solutes: Option<SoluteConcentration>,
    /// Euler angles (Bunge, degrees) of the crystal orientation.
    pub euler_angles: [f64; 3],
}

const MICROSTRUCTURE_KEYS: [&str; Microstructure::SIZE] = [
    "precipitate_height",
    "precipitate_length",
    "channel_width_height",
    "channel_width_length",
    "precipitate_fraction",
];

const SOLUTE_KEYS: [&str; SoluteConcentration::SIZE] = ["c_Al", "c_Co", "c_Cr", "c_Mo", "c_Ti"];

/// All `keys` or nothing.
fn group(parameters: &HashMap<String, f64>, keys: &[&str]) -> Result<Option<Vec<f64>>> {
    let values: Vec<Option<f64>> = keys.iter().map(|key| parameters.get(*key).copied()).collect();
    if values.iter().all(Option::is_none) {
        return Ok(None);
    }
    values
        .into_iter()
        .zip(keys)
        .map(|(value, key)| {
            value.ok_or_else(|| ConstitutiveError::InvalidParameter {
                name: key.to_string(),
                reason: format!("required together with {}", keys.join(", ")),
            })
        })
        .collect::<Result<Vec<f64>>>()
        .map(Some)
}

impl MaterialConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn from_map(parameters: &HashMap<String, f64>) -> Result<Self> {
        let config = Self {
            elasticity: CubicElasticity::from_map(parameters),
            solver: SolverParameters::from_map(parameters),
            dislocation: DislocationParameters::from_map(parameters),
            residual_eigenstrain: parameters.get("residual_thermal_expansion").map(|alpha| {
                ResidualEigenstrainParameters::isotropic(*alpha, flag(parameters, "uniform", false))
            }),
            microstructure: group(parameters, &MICROSTRUCTURE_KEYS)?
                .map(|values| Microstructure::from_slice(&values)),
            solutes: group(parameters, &SOLUTE_KEYS)?
                .map(|values| SoluteConcentration::from_slice(&values)),
            euler_angles: [
                *parameters.get("euler_angle_1").unwrap_or(&0.0),
                *parameters.get("euler_angle_2").unwrap_or(&0.0),
                *parameters.get("euler_angle_3").unwrap_or(&0.0),
            ],
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        self.dislocation.validate()
    }
}
