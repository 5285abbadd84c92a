//! Finite strain crystal plasticity for nickel base superalloys with a
//! dislocation density flow rule, slip band tracking and damage.
pub mod block;
pub mod damage;
pub mod dislocation;
pub mod eigenstrain;
pub mod elasticity;
pub mod error;
pub mod interfaces;
pub mod microstructure;
pub mod parameters;
pub mod slip_band;
pub mod slip_systems;
pub mod stress;
pub mod stress_strain;

#[cfg(feature = "python")]
mod python;

pub use block::{BlockInput, CrystalPlasticityBlock};
pub use dislocation::DislocationModel;
pub use eigenstrain::ResidualEigenstrain;
pub use error::{ConstitutiveError, RecoverableFailure, Result};
pub use interfaces::{
    BandHistory, CrystalPlasticityModel, EigenstrainProvider, PointInput, SubstepContext, Q,
};
pub use parameters::MaterialConfig;
pub use stress::{CrystalPlasticityStress, StressUpdate, UpdateStats};
