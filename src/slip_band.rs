//! Nucleation and propagation of a planar slip band and the modified phase
//! resistances of the octahedral systems inside it.
use crate::interfaces::{BandHistory, PointInput};
use crate::microstructure::PhaseStrengthening;
use crate::parameters::DislocationParameters;
use crate::slip_systems::SYSTEMS_PER_PLANE;
use nalgebra::Vector3;
use strum_macros::{AsRefStr, Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SlipBandPhase {
    #[default]
    Inactive,
    /// nucleation detected at this point in the current step
    Nucleated,
    /// the band exists and its front may advance
    Propagating,
}

/// Per point slip band variables. Only `initiation_*` are carried over from
/// the host history, everything else is rebuilt in every substep.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SlipBandState {
    pub inside: bool,
    pub initiated: bool,
    pub initiation_stress: f64,
    pub initiation_strain: f64,
    /// candidate front position reported to the host
    pub front_distance: f64,
    /// last octahedral system that exceeded its shearing resistance here
    pub activated_system: Option<usize>,
    pub phase: SlipBandPhase,
}

/// Fixed geometry of the band and the nucleation criterion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlipBandGeometry {
    normal: Vector3<f64>,
    initial_half_width: f64,
    core_radius: f64,
    core_half_height: f64,
    propagation_radius: f64,
    nucleation_time: f64,
    propagation_rate: f64,
    length: f64,
}

impl SlipBandGeometry {
    pub fn new(parameters: &DislocationParameters) -> Self {
        Self {
            normal: Vector3::from(parameters.band_normal),
            initial_half_width: parameters.initial_sb_width / 6.0 * parameters.z_length,
            core_radius: parameters.core_radius,
            core_half_height: parameters.core_half_height,
            propagation_radius: parameters.propagation_radius,
            nucleation_time: parameters.nucleation_time,
            propagation_rate: parameters.sb_evo_rate,
            length: parameters.z_length,
        }
    }

    pub fn initial_half_width(&self) -> f64 {
        self.initial_half_width
    }

    /// Position along the (unnormalized) band normal.
    pub fn signed_distance(&self, x: &Vector3<f64>) -> f64 {
        self.normal.dot(x)
    }

    pub fn contains(&self, distance: f64, band: &BandHistory) -> bool {
        let has_front = band.d1_old != 0.0 || band.d2_old != 0.0;
        has_front && distance >= band.d1_old && distance <= band.d2_old
    }

    pub fn in_core(&self, x: &Vector3<f64>) -> bool {
        x.norm() < self.core_radius && x.z.abs() < self.core_half_height
    }
}

/// Radial position in a square cross section mapped onto the unit disk, so
/// that the corners and the centres of the faces of a unit square both give 1.
pub fn dimensionless_radius(x: &Vector3<f64>) -> f64 {
    if x.x == 0.0 && x.y == 0.0 {
        return 0.0;
    }
    let radius = (x.x * x.x + x.y * x.y).sqrt();
    let (small, large) = if x.x.abs() > x.y.abs() {
        (x.y.abs(), x.x.abs())
    } else {
        (x.x.abs(), x.y.abs())
    };
    radius / (1.0 + (small / large).powi(2)).sqrt()
}

impl SlipBandState {
    /// Resets the state at the start of a substep.
    pub fn reset(&mut self, geometry: &SlipBandGeometry, input: &PointInput) {
        let distance = geometry.signed_distance(&input.coordinates);
        *self = Self {
            inside: geometry.contains(distance, &input.band),
            initiation_stress: input.band.initiation_stress,
            initiation_strain: input.band.initiation_strain,
            ..Default::default()
        };
    }

    /// Advances the band with the current resolved shear stresses.
    pub fn evolve(
        &mut self,
        geometry: &SlipBandGeometry,
        input: &PointInput,
        resolved_shear_stress: &[f64],
        gamma_prime_shear: f64,
    ) {
        let x = &input.coordinates;
        let band = &input.band;
        let distance = geometry.signed_distance(x);
        self.inside = geometry.contains(distance, band);
        if band.initiated {
            self.initiated = true;
        }

        let may_nucleate = geometry.in_core(x) && input.time > geometry.nucleation_time;
        let mut nucleated_here = false;
        if may_nucleate {
            for (i, tau) in resolved_shear_stress
                .iter()
                .take(SYSTEMS_PER_PLANE)
                .enumerate()
            {
                if tau.abs() > gamma_prime_shear {
                    self.initiated = true;
                    self.activated_system = Some(i);
                    nucleated_here = true;
                }
            }
        }

        if band.initiated {
            let w0 = geometry.initial_half_width;
            if dimensionless_radius(x) < geometry.propagation_radius && self.initiation_stress > 0.0
            {
                let threshold = w0
                    + (band.stress_zz_old - self.initiation_stress)
                        * geometry.propagation_rate
                        * (geometry.length / 2.0);
                if distance.abs() < threshold {
                    self.front_distance = distance;
                }
            }
            if (-w0..=0.0).contains(&distance) {
                self.front_distance = -w0;
            }
            if (0.0..=w0).contains(&distance) {
                self.front_distance = w0;
            }
        }

        self.phase = if band.initiated {
            SlipBandPhase::Propagating
        } else if nucleated_here {
            SlipBandPhase::Nucleated
        } else {
            SlipBandPhase::Inactive
        };
    }
}

/// Effective resistances of the gamma and gamma prime phase of one system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseResistance {
    pub gamma: f64,
    pub gamma_prime: f64,
    /// progress of the band softening, 0 outside the band
    pub ratio: f64,
}

/// Progress of the softening between initiation and `end_strain`.
pub fn band_ratio(strain_zz_old: f64, initiation_strain: f64, end_strain: f64) -> f64 {
    let span = end_strain - initiation_strain;
    if span == 0.0 {
        return 1.0;
    }
    ((strain_zz_old - initiation_strain) / span).abs().clamp(0.0, 1.0)
}

pub fn phase_resistance(
    system: usize,
    taylor_resistance: f64,
    damage: f64,
    band: &SlipBandState,
    history: &BandHistory,
    strengthening: &PhaseStrengthening,
    parameters: &DislocationParameters,
) -> PhaseResistance {
    let intact = 1.0 - damage;
    let shear = strengthening.gamma_prime_shear;
    if band.inside && system < SYSTEMS_PER_PLANE && shear.is_finite() && shear != 0.0 {
        let ratio = band_ratio(
            history.strain_zz_old,
            band.initiation_strain,
            parameters.end_strain,
        );
        let current_shear = parameters.initial_shear + ratio * (shear - parameters.initial_shear);
        PhaseResistance {
            gamma: intact
                * (taylor_resistance
                    + strengthening.solute
                    + (1.0 - current_shear / shear) * strengthening.orowan),
            gamma_prime: intact * (parameters.tau_c_0 + current_shear),
            ratio,
        }
    } else {
        PhaseResistance {
            gamma: intact * (taylor_resistance + strengthening.orowan + strengthening.solute),
            gamma_prime: intact * parameters.initial_shear,
            ratio: 0.0,
        }
    }
}
