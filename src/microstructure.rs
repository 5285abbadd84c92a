//! Strengthening contributions of the two phase gamma/gamma-prime
//! microstructure and of the solutes segregated to the gamma matrix.
use crate::parameters::DislocationParameters;
use crate::stress_strain::Tensor2;
use serde::Deserialize;
use std::f64::consts::PI;

/// Local precipitate morphology, lengths in micrometres.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Microstructure {
    pub precipitate_height: f64,
    pub precipitate_length: f64,
    pub channel_width_height: f64,
    pub channel_width_length: f64,
    /// volume fraction of the gamma prime phase
    pub precipitate_fraction: f64,
}

impl Microstructure {
    /// Values per point in flat host arrays.
    pub const SIZE: usize = 5;

    /// Heights and widths followed by the precipitate fraction, in field order.
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            precipitate_height: values[0],
            precipitate_length: values[1],
            channel_width_height: values[2],
            channel_width_length: values[3],
            precipitate_fraction: values[4],
        }
    }
}

/// Solute concentrations (at.%) in the gamma matrix.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct SoluteConcentration {
    pub al: f64,
    pub co: f64,
    pub cr: f64,
    pub mo: f64,
    pub ti: f64,
}

impl SoluteConcentration {
    pub const SIZE: usize = 5;

    /// Al, Co, Cr, Mo, Ti.
    pub fn from_slice(values: &[f64]) -> Self {
        Self {
            al: values[0],
            co: values[1],
            cr: values[2],
            mo: values[3],
            ti: values[4],
        }
    }
}

/// Critical resolved shear stresses that do not evolve with the dislocation
/// content. They are the same for all slip systems.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseStrengthening {
    /// shearing of gamma prime precipitates by dislocation pairs (APB)
    pub gamma_prime_shear: f64,
    /// Orowan bowing through the gamma channels
    pub orowan: f64,
    pub solute: f64,
    pub precipitate_fraction: f64,
}

impl Default for PhaseStrengthening {
    /// Single phase material: precipitates can never be sheared.
    fn default() -> Self {
        Self {
            gamma_prime_shear: f64::INFINITY,
            orowan: 0.0,
            solute: 0.0,
            precipitate_fraction: 0.0,
        }
    }
}

impl PhaseStrengthening {
    pub fn new(
        microstructure: Option<&Microstructure>,
        solutes: Option<&SoluteConcentration>,
        parameters: &DislocationParameters,
    ) -> Self {
        Self::default().with_phases(microstructure, solutes, parameters)
    }

    /// Replaces the precipitate and solute contributions for which a
    /// description is given and keeps the others.
    pub fn with_phases(
        self,
        microstructure: Option<&Microstructure>,
        solutes: Option<&SoluteConcentration>,
        parameters: &DislocationParameters,
    ) -> Self {
        let mut strengthening = self;
        if let Some(m) = microstructure {
            strengthening.gamma_prime_shear = apb_shear_stress(m, parameters);
            strengthening.orowan = if m.channel_width_length > 0.0 {
                parameters.g_shear * parameters.burgers_vector_mag * 1000.0 / m.channel_width_length
            } else {
                0.0
            };
            strengthening.precipitate_fraction = m.precipitate_fraction;
        }
        if let Some(c) = solutes {
            strengthening.solute = solid_solution_stress(c);
        }
        strengthening
    }
}

/// Weak pair coupling estimate for cutting a precipitate of equivalent radius
/// `r0`, converted from SI to MPa.
fn apb_shear_stress(m: &Microstructure, parameters: &DislocationParameters) -> f64 {
    let b = parameters.burgers_vector_mag / 1e6;
    let f = m.precipitate_fraction;
    let r0 = (m.precipitate_length * m.precipitate_length * m.precipitate_height / PI * 0.75)
        .powf(1.0 / 3.0);
    let line_tension = 0.5 * parameters.g_shear * 1e6 * b * b;
    let cut = (6.0 * parameters.gamma_apb * f * r0 / 1e9 / PI / line_tension).sqrt();
    parameters.gamma_apb / (2.0 * b) * (cut - f) / 1e6
}

/// Labusch type superposition; Al and Ti mostly partition to gamma prime and
/// are left out.
fn solid_solution_stress(c: &SoluteConcentration) -> f64 {
    const K_CO: f64 = 39.4;
    const K_CR: f64 = 337.0;
    const K_MO: f64 = 1015.0;
    (K_CO * K_CO * c.co + K_CR * K_CR * c.cr + K_MO * K_MO * c.mo)
        .max(0.0)
        .sqrt()
        * 0.272
}

/// SSD density needed to accommodate the residual eigenstrain of the build.
/// The strain is expected in the lattice frame; systems on the third slip
/// direction of each plane do not take part.
pub fn residual_ssd(
    residual_strain: &Tensor2,
    n_systems: usize,
    parameters: &DislocationParameters,
) -> Vec<f64> {
    let shear = residual_strain[(2, 2)].abs() / 3.2;
    (0..n_systems)
        .map(|i| {
            if i % 3 == 2 {
                0.0
            } else {
                (shear / parameters.burgers_vector_mag * parameters.k_0).powi(2) / 2.0
                    * parameters.residual_dislocation_prefactor
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn morphology() -> Microstructure {
        Microstructure {
            precipitate_height: 0.4,
            precipitate_length: 0.4,
            channel_width_height: 0.06,
            channel_width_length: 0.06,
            precipitate_fraction: 0.6,
        }
    }

    #[test]
    fn single_phase_never_nucleates() {
        let s = PhaseStrengthening::new(None, None, &DislocationParameters::default());
        assert!(s.gamma_prime_shear.is_infinite());
        assert_eq!(s.orowan, 0.0);
        assert_eq!(s.solute, 0.0);
    }

    #[test]
    fn orowan_stress_scales_with_inverse_channel_width() {
        let parameters = DislocationParameters::default();
        let narrow = PhaseStrengthening::new(Some(&morphology()), None, &parameters);
        let mut wide_morphology = morphology();
        wide_morphology.channel_width_length *= 2.0;
        let wide = PhaseStrengthening::new(Some(&wide_morphology), None, &parameters);
        assert_relative_eq!(narrow.orowan, 2.0 * wide.orowan, epsilon = 1e-10);
        assert_relative_eq!(narrow.orowan, 35000.0 * 0.000255 * 1000.0 / 0.06, epsilon = 1e-8);
        assert!(narrow.gamma_prime_shear.is_finite());
        assert!(narrow.gamma_prime_shear > 0.0);
    }

    #[test]
    fn local_morphology_keeps_configured_solutes() {
        let parameters = DislocationParameters::default();
        let c = SoluteConcentration {
            cr: 1.0,
            ..Default::default()
        };
        let configured = PhaseStrengthening::new(None, Some(&c), &parameters);
        let local = configured.with_phases(Some(&morphology()), None, &parameters);
        assert_eq!(local.solute, configured.solute);
        assert_eq!(local.precipitate_fraction, 0.6);
        assert!(local.orowan > 0.0);
        assert_eq!(configured.with_phases(None, None, &parameters), configured);
    }

    #[test]
    fn solutes_add_in_quadrature() {
        let c = SoluteConcentration {
            mo: 1.0,
            ..Default::default()
        };
        let s = PhaseStrengthening::new(None, Some(&c), &DislocationParameters::default());
        assert_relative_eq!(s.solute, 1015.0 * 0.272, epsilon = 1e-10);
    }

    #[test]
    fn residual_density_skips_third_system_of_each_plane() {
        let mut strain = Tensor2::zeros();
        strain[(2, 2)] = -3.2e-4;
        let rho = residual_ssd(&strain, 12, &DislocationParameters::default());
        assert_eq!(rho[2], 0.0);
        assert_eq!(rho[11], 0.0);
        let expected = (1e-4 / 0.000255 * 100.0_f64).powi(2) / 2.0 * 150.0;
        assert_relative_eq!(rho[0], expected, max_relative = 1e-12);
    }
}
