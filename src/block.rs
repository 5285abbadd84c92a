use crate::error::{ConstitutiveError, Result};
use crate::interfaces::{BandHistory, PointInput, Q};
use crate::microstructure::{Microstructure, SoluteConcentration};
use crate::parameters::MaterialConfig;
use crate::stress::{CrystalPlasticityStress, UpdateStats};
use crate::stress_strain::{flatten, Tensor2, Tensor4};
use nalgebra::{DVectorView, DVectorViewMut, SVector};

/// Arrays for a whole block of points. Tensors are stored row major with nine
/// values per point, coordinates with three, per system quantities with one
/// value per slip system. The slices hold one entry per point or none.
#[derive(Debug)]
pub struct BlockInput<'a> {
    pub time: f64,
    pub dt: f64,
    pub deformation_gradient_old: DVectorView<'a, f64>,
    pub deformation_gradient: DVectorView<'a, f64>,
    pub coordinates: Option<DVectorView<'a, f64>>,
    pub temperature: Option<DVectorView<'a, f64>>,
    pub temperature_old: Option<DVectorView<'a, f64>>,
    pub strain_rate_sensitivity: Option<DVectorView<'a, f64>>,
    pub slip_rate_gradient_edge: Option<DVectorView<'a, f64>>,
    pub slip_rate_gradient_screw: Option<DVectorView<'a, f64>>,
    pub band: &'a [BandHistory],
    pub microstructure: &'a [Microstructure],
    pub solutes: &'a [SoluteConcentration],
}

impl<'a> BlockInput<'a> {
    pub fn new(
        time: f64,
        dt: f64,
        deformation_gradient_old: DVectorView<'a, f64>,
        deformation_gradient: DVectorView<'a, f64>,
    ) -> Self {
        Self {
            time,
            dt,
            deformation_gradient_old,
            deformation_gradient,
            coordinates: None,
            temperature: None,
            temperature_old: None,
            strain_rate_sensitivity: None,
            slip_rate_gradient_edge: None,
            slip_rate_gradient_screw: None,
            band: &[],
            microstructure: &[],
            solutes: &[],
        }
    }

    fn check(&self, n: usize, n_slip: usize) -> Result<()> {
        let check_len = |expected: usize, actual: usize| {
            if expected == actual {
                Ok(())
            } else {
                Err(ConstitutiveError::ShapeMismatch { expected, actual })
            }
        };
        check_len(9 * n, self.deformation_gradient_old.nrows())?;
        check_len(9 * n, self.deformation_gradient.nrows())?;
        if let Some(x) = &self.coordinates {
            check_len(3 * n, x.nrows())?;
        }
        if let Some(t) = &self.temperature {
            check_len(n, t.nrows())?;
        }
        if let Some(t) = &self.temperature_old {
            check_len(n, t.nrows())?;
        }
        if let Some(xm) = &self.strain_rate_sensitivity {
            check_len(n, xm.nrows())?;
        }
        for gradient in [&self.slip_rate_gradient_edge, &self.slip_rate_gradient_screw]
            .into_iter()
            .flatten()
        {
            check_len(n * n_slip, gradient.nrows())?;
        }
        for len in [self.band.len(), self.microstructure.len(), self.solutes.len()] {
            if len != 0 {
                check_len(n, len)?;
            }
        }
        Ok(())
    }

    fn point(&self, ip: usize, n_slip: usize) -> PointInput {
        let tensor = |view: &DVectorView<f64>| {
            Tensor2::from_row_slice(view.fixed_view::<9, 1>(ip * 9, 0).as_slice())
        };
        let mut input = PointInput::new(
            tensor(&self.deformation_gradient_old),
            tensor(&self.deformation_gradient),
            self.dt,
        )
        .with_time(self.time);
        input.point = ip;
        if let Some(x) = &self.coordinates {
            input.coordinates = x.fixed_view::<3, 1>(ip * 3, 0).into_owned();
        }
        input.temperature = self.temperature.as_ref().map(|t| t[ip]);
        input.temperature_old = self.temperature_old.as_ref().map(|t| t[ip]);
        input.strain_rate_sensitivity = self.strain_rate_sensitivity.as_ref().map(|xm| xm[ip]);
        let per_system = |view: &DVectorView<f64>| -> Vec<f64> {
            view.rows(ip * n_slip, n_slip).iter().copied().collect()
        };
        input.slip_rate_gradient_edge = self.slip_rate_gradient_edge.as_ref().map(per_system);
        input.slip_rate_gradient_screw = self.slip_rate_gradient_screw.as_ref().map(per_system);
        if let Some(band) = self.band.get(ip) {
            input.band = *band;
        }
        input.microstructure = self.microstructure.get(ip).copied();
        input.solutes = self.solutes.get(ip).copied();
        input
    }
}

/// Independent material points updated one after the other.
#[derive(Debug)]
pub struct CrystalPlasticityBlock {
    points: Vec<CrystalPlasticityStress>,
}

impl CrystalPlasticityBlock {
    pub fn new(points: Vec<CrystalPlasticityStress>) -> Self {
        Self { points }
    }

    /// `n` points sharing the material description.
    pub fn from_config(config: &MaterialConfig, n: usize) -> Result<Self> {
        let points = (0..n)
            .map(|_| CrystalPlasticityStress::from_config(config))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn point(&self, ip: usize) -> Option<&CrystalPlasticityStress> {
        self.points.get(ip)
    }

    /// Updates every point and writes the Cauchy stress (9 values per point)
    /// and the tangent (81 values per point, row major `9x9`). Stops at the
    /// first point with a fatal failure.
    pub fn evaluate(
        &mut self,
        input: &BlockInput,
        stress: &mut DVectorViewMut<f64>,
        tangent: &mut DVectorViewMut<f64>,
    ) -> Result<UpdateStats> {
        let n = self.points.len();
        let n_slip = self.points.first().map_or(0, |point| point.n_slip_systems());
        input.check(n, n_slip)?;
        if stress.nrows() != 9 * n {
            return Err(ConstitutiveError::ShapeMismatch {
                expected: 9 * n,
                actual: stress.nrows(),
            });
        }
        if tangent.nrows() != 81 * n {
            return Err(ConstitutiveError::ShapeMismatch {
                expected: 81 * n,
                actual: tangent.nrows(),
            });
        }
        let mut total = UpdateStats::default();
        for ip in 0..n {
            let update = self.points[ip].update_stress(&input.point(ip, n_slip))?;
            stress
                .fixed_view_mut::<9, 1>(ip * 9, 0)
                .copy_from(&flatten(&update.cauchy_stress));
            tangent
                .fixed_view_mut::<81, 1>(ip * 81, 0)
                .copy_from(&flatten_tensor4(&update.tangent));
            total.substeps = total.substeps.max(update.stats.substeps);
            total.newton_iterations += update.stats.newton_iterations;
            total.state_iterations += update.stats.state_iterations;
        }
        Ok(total)
    }

    pub fn commit(&mut self) {
        for point in self.points.iter_mut() {
            point.commit();
        }
    }

    /// Values per point of `q`, see [`Q::size`].
    pub fn field_size(&self, q: Q) -> usize {
        self.points
            .first()
            .map_or(0, |point| q.size(point.n_slip_systems()))
    }

    pub fn field(&self, q: Q, out: &mut DVectorViewMut<f64>) -> Result<()> {
        let size = self.field_size(q);
        if out.nrows() != size * self.points.len() {
            return Err(ConstitutiveError::ShapeMismatch {
                expected: size * self.points.len(),
                actual: out.nrows(),
            });
        }
        for (ip, point) in self.points.iter().enumerate() {
            if let Some(values) = point.field(q) {
                out.rows_mut(ip * size, size).copy_from_slice(&values);
            }
        }
        Ok(())
    }
}

fn flatten_tensor4(tensor: &Tensor4) -> SVector<f64, 81> {
    SVector::<f64, 81>::from_fn(|a, _| tensor[(a / 9, a % 9)])
}
