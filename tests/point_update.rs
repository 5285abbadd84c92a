use approx::assert_relative_eq;
use dislocation_cp::elasticity::CubicElasticity;
use dislocation_cp::microstructure::{Microstructure, PhaseStrengthening};
use dislocation_cp::parameters::{
    LineSearchMethod, ResidualEigenstrainParameters, TangentModuliType,
};
use dislocation_cp::stress_strain::{bunge_rotation, Tensor2};
use dislocation_cp::{
    BandHistory, ConstitutiveError, CrystalPlasticityStress, MaterialConfig, PointInput,
    RecoverableFailure, Q,
};
use nalgebra::Vector3;

fn uniaxial(strain: f64) -> Tensor2 {
    Tensor2::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0 + strain)
}

fn point(config: &MaterialConfig) -> CrystalPlasticityStress {
    CrystalPlasticityStress::from_config(config).unwrap()
}

fn refining() -> MaterialConfig {
    let mut config = MaterialConfig::default();
    config.solver.maximum_substep_iteration = 10;
    config
}

#[test]
fn zero_increment_from_stress_free_state_needs_no_correction() {
    let mut point = point(&MaterialConfig::default());
    let input = PointInput::new(Tensor2::identity(), Tensor2::identity(), 0.1);
    let update = point.update_stress(&input).unwrap();

    assert_eq!(update.stats.substeps, 1);
    assert_eq!(update.stats.state_iterations, 1);
    assert_eq!(update.stats.newton_iterations, 0);
    assert_eq!(*point.pk2(), Tensor2::zeros());
    assert_eq!(update.cauchy_stress, Tensor2::zeros());
    let rates = point.field(Q::SlipRate).unwrap();
    assert_eq!(rates.len(), 12);
    assert!(rates.iter().all(|r| *r == 0.0));
}

#[test]
fn elastic_deformation_gradient_closes_the_decomposition() {
    let mut point = point(&refining());
    let f = uniaxial(2.5e-4);
    let input = PointInput::new(Tensor2::identity(), f, 0.01);
    point.update_stress(&input).unwrap();

    let fp = *point.plastic_deformation_gradient();
    assert!((fp - Tensor2::identity()).norm() > 0.0);
    let fp_inv = fp.try_inverse().unwrap();
    assert_relative_eq!(
        *point.elastic_deformation_gradient(),
        f * fp_inv,
        epsilon = 1e-12
    );
    assert!(point.field(Q::SlipRate).unwrap().iter().any(|r| *r != 0.0));
}

#[test]
fn uniaxial_loading_keeps_densities_positive_and_damage_growing() {
    let mut point = point(&refining());
    let dt = 0.01;
    let increment = 1e-5;
    let mut damage_history = Vec::new();
    for step in 0..40 {
        let input = PointInput::new(
            uniaxial(increment * step as f64),
            uniaxial(increment * (step + 1) as f64),
            dt,
        )
        .with_time(dt * (step + 1) as f64);
        let update = point.update_stress(&input).unwrap();
        point.commit();

        assert!(update.cauchy_stress[(2, 2)] > 0.0);
        let rho = point.field(Q::RhoSsd).unwrap();
        assert!(rho.iter().all(|r| *r >= 0.0));
        damage_history.push(point.field(Q::AggregateDamage).unwrap()[0]);
    }
    assert!(damage_history.windows(2).all(|w| w[1] >= w[0]));
    assert!(*damage_history.last().unwrap() > 0.0);
    let rho = point.field(Q::RhoSsd).unwrap();
    assert!(rho.iter().any(|r| *r > 1.0));
}

#[test]
fn failed_substeps_are_refined() {
    let mut point = point(&refining());
    let input = PointInput::new(Tensor2::identity(), uniaxial(5e-4), 1.0);
    let update = point.update_stress(&input).unwrap();
    assert!(update.stats.substeps > 1);
    assert!(update.stats.substeps.is_power_of_two());
}

#[test]
fn exhausting_substep_refinement_is_fatal() {
    let mut config = MaterialConfig::default();
    config.solver.maximum_substep_iteration = 3;
    let mut point = point(&config);
    let input = PointInput::new(Tensor2::identity(), uniaxial(0.01), 1.0).at(7, Default::default());
    match point.update_stress(&input) {
        Err(ConstitutiveError::SubstepExhausted {
            point,
            substeps,
            reason,
            ..
        }) => {
            assert_eq!(point, 7);
            assert_eq!(substeps, 4);
            assert!(matches!(reason, RecoverableFailure::SlipRateOverflow { .. }));
        }
        other => panic!("expected substep exhaustion, got {:?}", other),
    }
}

#[test]
fn single_attempt_by_default() {
    let mut point = point(&MaterialConfig::default());
    let input = PointInput::new(Tensor2::identity(), uniaxial(0.01), 1.0);
    assert!(matches!(
        point.update_stress(&input),
        Err(ConstitutiveError::SubstepExhausted { substeps: 1, .. })
    ));
}

#[test]
fn elastic_tangent_is_the_rotated_elasticity_tensor() {
    let mut config = MaterialConfig::default();
    config.euler_angles = [30.0, 45.0, 60.0];
    let mut point = point(&config);
    let input = PointInput::new(Tensor2::identity(), uniaxial(1e-5), 0.1);
    let update = point.update_stress(&input).unwrap();

    let expected = CubicElasticity::default().rotated_tensor(&bunge_rotation(&config.euler_angles));
    assert_relative_eq!(update.tangent, expected, max_relative = 1e-12);
    assert_eq!(update.tangent, *point.elasticity_tensor());
}

#[test]
fn exact_tangent_reduces_to_elasticity_in_the_reference_state() {
    let mut config = MaterialConfig::default();
    config.solver.tan_mod_type = TangentModuliType::Exact;
    config.euler_angles = [10.0, 20.0, 30.0];
    let mut point = point(&config);
    let input = PointInput::new(Tensor2::identity(), Tensor2::identity(), 0.1);
    let update = point.update_stress(&input).unwrap();
    assert_relative_eq!(
        update.tangent,
        *point.elasticity_tensor(),
        epsilon = 1e-6,
        max_relative = 1e-10
    );
}

#[test]
fn critical_damage_aborts_the_update() {
    let mut config = refining();
    config.dislocation.wcr = 1e-8;
    let mut point = point(&config);
    let input = PointInput::new(Tensor2::identity(), uniaxial(2.5e-4), 0.01)
        .at(3, Default::default())
        .with_time(2.0);
    match point.update_stress(&input) {
        Err(ConstitutiveError::CriticalDamageReached {
            point,
            time,
            damage,
            threshold,
        }) => {
            assert_eq!(point, 3);
            assert_eq!(time, 2.0);
            assert_eq!(threshold, 0.4);
            assert!(damage > threshold);
        }
        other => panic!("expected critical damage, got {:?}", other),
    }
}

#[test]
fn uncommitted_updates_restart_from_the_old_state() {
    let mut point = point(&refining());
    let input = PointInput::new(Tensor2::identity(), uniaxial(2.5e-4), 0.01);
    let first = point.update_stress(&input).unwrap();
    let rho_first = point.field(Q::RhoSsd).unwrap();
    let second = point.update_stress(&input).unwrap();
    assert_eq!(first.cauchy_stress, second.cauchy_stress);
    assert_eq!(point.field(Q::RhoSsd).unwrap(), rho_first);

    point.commit();
    let hold = PointInput::new(uniaxial(2.5e-4), uniaxial(2.5e-4), 0.01).with_time(0.02);
    let held = point.update_stress(&hold).unwrap();
    assert!(held.cauchy_stress[(2, 2)] > 0.0);
}

#[test]
fn residual_cooling_stresses_the_point_hydrostatically() {
    let mut config = MaterialConfig::default();
    config.residual_eigenstrain = Some(ResidualEigenstrainParameters::isotropic(1e-5, true));
    let mut point = point(&config);
    let input = PointInput::new(Tensor2::identity(), Tensor2::identity(), 0.1)
        .with_temperature(400.0, 300.0);
    let update = point.update_stress(&input).unwrap();

    let stretch = 1.0 + 1e-3;
    assert_relative_eq!(
        *point.eigenstrain_deformation_gradient(),
        Tensor2::identity() / stretch,
        epsilon = 1e-14
    );
    let c = CubicElasticity::default();
    let pk2 = (c.c11 + 2.0 * c.c12) * 0.5 * (stretch * stretch - 1.0);
    let expected = Tensor2::identity() * (pk2 / stretch);
    assert_relative_eq!(update.cauchy_stress, expected, epsilon = 1e-6);
    assert!(point
        .field(Q::SlipRate)
        .unwrap()
        .iter()
        .all(|r| r.abs() < 1e-12));
}

#[test]
fn initial_plastic_deformation_is_carried_without_stress() {
    let fp = Tensor2::new(1.0, 1e-3, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0);
    let mut point = point(&MaterialConfig::default())
        .with_initial_plastic_deformation_gradient(fp)
        .unwrap();
    let update = point
        .update_stress(&PointInput::new(fp, fp, 0.1))
        .unwrap();
    assert_relative_eq!(update.cauchy_stress, Tensor2::zeros(), epsilon = 1e-8);
    assert_relative_eq!(*point.plastic_deformation_gradient(), fp, epsilon = 1e-14);

    let singular = CrystalPlasticityStress::from_config(&MaterialConfig::default())
        .unwrap()
        .with_initial_plastic_deformation_gradient(Tensor2::zeros());
    assert!(matches!(singular, Err(ConstitutiveError::InvalidParameter { .. })));
}

#[test]
fn named_fields_have_documented_sizes() {
    let mut point = point(&MaterialConfig::default());
    point
        .update_stress(&PointInput::new(Tensor2::identity(), uniaxial(1e-5), 0.1))
        .unwrap();
    for q in [
        Q::CauchyStress,
        Q::MandelStress,
        Q::RhoSsd,
        Q::AggregateDamage,
        Q::Strain110,
        Q::EdgeSlipDirection,
        Q::ScrewSlipDirection,
    ] {
        assert_eq!(point.field(q).unwrap().len(), q.size(point.n_slip_systems()));
    }
    let rotation = point.field(Q::UpdatedRotation).unwrap();
    assert_relative_eq!(rotation[0], 1.0, epsilon = 1e-9);
}

#[test]
fn configured_microstructure_strengthens_the_matrix() {
    let mut config = MaterialConfig::default();
    config.microstructure = Some(Microstructure::from_slice(&[0.4, 0.4, 0.06, 0.06, 0.6]));
    let mut two_phase = point(&config);
    let mut single_phase = point(&MaterialConfig::default());
    let input = PointInput::new(Tensor2::identity(), uniaxial(1e-5), 0.1);
    two_phase.update_stress(&input).unwrap();
    single_phase.update_stress(&input).unwrap();

    let orowan = 35000.0 * 0.000255 * 1000.0 / 0.06;
    let strong = two_phase.field(Q::SlipResistanceGamma).unwrap();
    let plain = single_phase.field(Q::SlipResistanceGamma).unwrap();
    for (strong, plain) in strong.iter().zip(&plain) {
        assert_relative_eq!(strong - plain, orowan, epsilon = 1e-8);
    }
}

fn band_material() -> (MaterialConfig, PhaseStrengthening) {
    let strengthening = PhaseStrengthening {
        gamma_prime_shear: 150.0,
        orowan: 400.0,
        solute: 180.0,
        precipitate_fraction: 0.6,
    };
    (refining(), strengthening)
}

fn band_point() -> CrystalPlasticityStress {
    let (config, strengthening) = band_material();
    CrystalPlasticityStress::from_config_with_strengthening(&config, strengthening).unwrap()
}

#[test]
fn slip_band_nucleates_and_then_propagates() {
    let strain = 4.5e-3;
    let loaded = uniaxial(strain);
    let mut core = band_point();
    let mut above = band_point();
    let load = |ip: usize, x: Vector3<f64>| {
        PointInput::new(Tensor2::identity(), loaded, 0.01)
            .at(ip, x)
            .with_time(6.0)
    };

    // nucleation in the core once the first plane overcomes the precipitates
    let first = core.update_stress(&load(0, Vector3::zeros())).unwrap();
    above.update_stress(&load(1, Vector3::new(0.0, 0.0, 0.6))).unwrap();
    assert_eq!(core.field(Q::SlipBandInitiation).unwrap(), vec![1.0]);
    assert_eq!(core.field(Q::ActivatedSlipSystem).unwrap(), vec![1.0]);
    assert_eq!(core.field(Q::InsideSlipBand).unwrap(), vec![0.0]);
    assert_eq!(above.field(Q::SlipBandInitiation).unwrap(), vec![0.0]);
    core.commit();
    above.commit();

    // the host spreads the band with its initial width
    let initiation_stress = first.cauchy_stress[(2, 2)];
    let band = BandHistory {
        d1_old: -0.4,
        d2_old: 0.4,
        initiated: true,
        stress_zz_old: initiation_stress + 100.0,
        strain_zz_old: 0.0195,
        initiation_stress,
        initiation_strain: strain,
    };
    let hold = |ip: usize, x: Vector3<f64>| {
        PointInput::new(loaded, loaded, 0.01)
            .at(ip, x)
            .with_time(6.01)
            .with_band(band)
    };

    core.update_stress(&hold(0, Vector3::zeros())).unwrap();
    assert_eq!(core.field(Q::InsideSlipBand).unwrap(), vec![1.0]);
    assert_relative_eq!(core.field(Q::FrontDistance).unwrap()[0], 0.4, epsilon = 1e-12);
    let ratio = core.field(Q::BandRatio).unwrap();
    let expected = (0.0195 - strain) / (0.15 - strain);
    for r in &ratio[..3] {
        assert_relative_eq!(*r, expected, epsilon = 1e-12);
    }
    assert!(ratio[3..].iter().all(|r| *r == 0.0));
    // the precipitates of the first plane are cut, the matrix there softens
    let gamma = core.field(Q::SlipResistanceGamma).unwrap();
    assert!(gamma[0] < gamma[3] - 300.0);

    above.update_stress(&hold(1, Vector3::new(0.0, 0.0, 0.6))).unwrap();
    assert_eq!(above.field(Q::InsideSlipBand).unwrap(), vec![0.0]);
    assert_eq!(above.field(Q::SlipBandInitiation).unwrap(), vec![1.0]);
    // threshold 0.4 + 100 * 0.0015 * 3 reaches beyond the point
    assert_relative_eq!(above.field(Q::FrontDistance).unwrap()[0], 0.6, epsilon = 1e-12);
}

#[test]
fn line_search_variants_reach_the_same_state() {
    let input = PointInput::new(Tensor2::identity(), uniaxial(2.5e-4), 0.01);
    let mut plain = point(&refining());
    let reference = plain.update_stress(&input).unwrap();
    for method in [LineSearchMethod::CutHalf, LineSearchMethod::Bisection] {
        let mut config = refining();
        config.solver.use_line_search = true;
        config.solver.line_search_method = method;
        let update = point(&config).update_stress(&input).unwrap();
        assert_relative_eq!(
            update.cauchy_stress,
            reference.cauchy_stress,
            epsilon = 1e-6
        );
    }
}
