use dislocation_cp::slip_band::SlipBandGeometry;
use dislocation_cp::{
    BandHistory, ConstitutiveError, CrystalPlasticityStress, MaterialConfig, PointInput, Q,
};
use nalgebra::{Matrix3, Vector3};
use serde::Serialize;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line options
#[derive(StructOpt, Debug)]
#[structopt(
    name = "cp_point",
    about = "Drives a single crystal plasticity point in uniaxial strain along z"
)]
struct Options {
    /// material description (JSON), defaults are used when omitted
    #[structopt(short, long, parse(from_os_str))]
    config: Option<PathBuf>,

    /// final engineering strain
    #[structopt(long, default_value = "0.02")]
    strain: f64,

    /// number of global increments
    #[structopt(long, default_value = "100")]
    steps: usize,

    /// duration of the loading
    #[structopt(long, default_value = "10.0")]
    duration: f64,

    /// give up once the increment was halved this often
    #[structopt(long, default_value = "8")]
    max_cutbacks: usize,

    /// position of the point
    #[structopt(long, default_value = "0.0")]
    x: f64,

    #[structopt(long, default_value = "0.0")]
    y: f64,

    #[structopt(long, default_value = "0.0")]
    z: f64,
}

#[derive(Serialize)]
struct Record {
    time: f64,
    strain: f64,
    stress_zz: f64,
    aggregate_damage: f64,
    band_initiated: bool,
    inside_band: bool,
    substeps: usize,
    newton_iterations: usize,
    state_iterations: usize,
}

fn stretch(strain: f64) -> Matrix3<f64> {
    Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0 + strain)
}

fn scalar(point: &CrystalPlasticityStress, q: Q) -> f64 {
    point
        .field(q)
        .and_then(|values| values.first().copied())
        .unwrap_or(0.0)
}

/// Plays the host for a single point: the band nucleates with its initial
/// width and its fronts follow the distances reported by the point.
fn update_band(
    band: &mut BandHistory,
    point: &CrystalPlasticityStress,
    half_width: f64,
    stress_zz: f64,
    strain_zz: f64,
) {
    if !band.initiated && scalar(point, Q::SlipBandInitiation) > 0.0 {
        band.initiated = true;
        band.d1_old = -half_width;
        band.d2_old = half_width;
        band.initiation_stress = stress_zz;
        band.initiation_strain = strain_zz;
    } else if band.initiated {
        let front = scalar(point, Q::FrontDistance);
        band.d1_old = band.d1_old.min(front);
        band.d2_old = band.d2_old.max(front);
    }
    band.stress_zz_old = stress_zz;
    band.strain_zz_old = strain_zz;
}

fn main() -> Result<(), ConstitutiveError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let options = Options::from_args();
    let config = match &options.config {
        Some(path) => MaterialConfig::from_file(path)?,
        None => MaterialConfig::default(),
    };
    let mut point = CrystalPlasticityStress::from_config(&config)?;
    let position = Vector3::new(options.x, options.y, options.z);
    let half_width = SlipBandGeometry::new(&config.dislocation).initial_half_width();
    let mut band = BandHistory::default();

    let rate = options.strain / options.duration;
    let mut dt = options.duration / options.steps as f64;
    let mut time = 0.0;
    let mut cutbacks = 0;
    while time < options.duration - 1e-12 {
        dt = dt.min(options.duration - time);
        let input = PointInput::new(stretch(rate * time), stretch(rate * (time + dt)), dt)
            .with_time(time + dt)
            .at(0, position)
            .with_band(band);
        match point.update_stress(&input) {
            Ok(update) => {
                point.commit();
                time += dt;
                let stress_zz = update.cauchy_stress[(2, 2)];
                update_band(&mut band, &point, half_width, stress_zz, rate * time);
                let record = Record {
                    time,
                    strain: rate * time,
                    stress_zz,
                    aggregate_damage: scalar(&point, Q::AggregateDamage),
                    band_initiated: band.initiated,
                    inside_band: scalar(&point, Q::InsideSlipBand) > 0.0,
                    substeps: update.stats.substeps,
                    newton_iterations: update.stats.newton_iterations,
                    state_iterations: update.stats.state_iterations,
                };
                println!("{}", serde_json::to_string(&record)?);
            }
            Err(ConstitutiveError::SubstepExhausted { .. }) if cutbacks < options.max_cutbacks => {
                cutbacks += 1;
                dt /= 2.0;
                warn!(time, dt, "cutting back the increment");
            }
            Err(e) => return Err(e),
        }
    }
    info!(time, cutbacks, "loading finished");
    Ok(())
}
