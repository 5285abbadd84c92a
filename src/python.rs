use crate::block::{BlockInput, CrystalPlasticityBlock};
use crate::error::ConstitutiveError;
use crate::interfaces::{BandHistory, Q};
use crate::microstructure::{Microstructure, SoluteConcentration};
use crate::parameters::MaterialConfig;
use nalgebra::{Const, DVectorView, Dyn};
use numpy::{PyReadonlyArray1, PyReadwriteArray1};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;
use std::str::FromStr;

impl From<ConstitutiveError> for PyErr {
    fn from(error: ConstitutiveError) -> Self {
        match error {
            ConstitutiveError::InvalidParameter { .. }
            | ConstitutiveError::ShapeMismatch { .. }
            | ConstitutiveError::Config(_) => PyValueError::new_err(error.to_string()),
            _ => PyRuntimeError::new_err(error.to_string()),
        }
    }
}

fn not_contiguous() -> PyErr {
    PyValueError::new_err("arrays must be contiguous and one dimensional")
}

fn view<'a>(array: &'a PyReadonlyArray1<f64>) -> PyResult<DVectorView<'a, f64>> {
    array
        .try_as_matrix::<Dyn, Const<1>, Const<1>, Dyn>()
        .ok_or_else(not_contiguous)
}

fn optional_view<'a>(
    array: &'a Option<PyReadonlyArray1<f64>>,
) -> PyResult<Option<DVectorView<'a, f64>>> {
    array.as_ref().map(view).transpose()
}

/// Splits a flat array into records of `size` values.
fn records<T>(
    array: &Option<PyReadonlyArray1<f64>>,
    size: usize,
    record: fn(&[f64]) -> T,
) -> PyResult<Vec<T>> {
    let Some(array) = array else {
        return Ok(Vec::new());
    };
    let values = array.as_slice().map_err(|_| not_contiguous())?;
    if values.len() % size != 0 {
        return Err(PyValueError::new_err(format!(
            "expected a multiple of {} values, got {}",
            size,
            values.len()
        )));
    }
    Ok(values.chunks_exact(size).map(record).collect())
}

/// Wrapper of a block of crystal plasticity points for python.
#[pyclass(name = "CrystalPlasticity")]
struct PyCrystalPlasticity {
    block: CrystalPlasticityBlock,
}

#[pymethods]
impl PyCrystalPlasticity {
    #[new]
    fn new(n: usize, parameters: HashMap<String, f64>) -> PyResult<Self> {
        let config = MaterialConfig::from_map(&parameters)?;
        let block = CrystalPlasticityBlock::from_config(&config, n)?;
        Ok(Self { block })
    }

    #[staticmethod]
    fn from_json(n: usize, json: &str) -> PyResult<Self> {
        let config = MaterialConfig::from_json_str(json)?;
        let block = CrystalPlasticityBlock::from_config(&config, n)?;
        Ok(Self { block })
    }

    fn __len__(&self) -> usize {
        self.block.len()
    }

    /// Returns `(substeps, newton_iterations, state_iterations)`.
    ///
    /// The keyword arrays are optional. `band` holds seven values per point
    /// (`d1_old, d2_old, initiated, stress_zz_old, strain_zz_old,
    /// initiation_stress, initiation_strain`), `microstructure` five
    /// (heights, widths, fraction) and `solutes` five (Al, Co, Cr, Mo, Ti).
    #[pyo3(signature = (
        time,
        del_t,
        deformation_gradient_old,
        deformation_gradient,
        stress,
        tangent,
        *,
        coordinates = None,
        temperature = None,
        temperature_old = None,
        strain_rate_sensitivity = None,
        slip_rate_gradient_edge = None,
        slip_rate_gradient_screw = None,
        band = None,
        microstructure = None,
        solutes = None,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn evaluate(
        &mut self,
        time: f64,
        del_t: f64,
        deformation_gradient_old: PyReadonlyArray1<f64>,
        deformation_gradient: PyReadonlyArray1<f64>,
        stress: PyReadwriteArray1<f64>,
        tangent: PyReadwriteArray1<f64>,
        coordinates: Option<PyReadonlyArray1<f64>>,
        temperature: Option<PyReadonlyArray1<f64>>,
        temperature_old: Option<PyReadonlyArray1<f64>>,
        strain_rate_sensitivity: Option<PyReadonlyArray1<f64>>,
        slip_rate_gradient_edge: Option<PyReadonlyArray1<f64>>,
        slip_rate_gradient_screw: Option<PyReadonlyArray1<f64>>,
        band: Option<PyReadonlyArray1<f64>>,
        microstructure: Option<PyReadonlyArray1<f64>>,
        solutes: Option<PyReadonlyArray1<f64>>,
    ) -> PyResult<(usize, usize, usize)> {
        let band = records(&band, BandHistory::SIZE, BandHistory::from_slice)?;
        let microstructure =
            records(&microstructure, Microstructure::SIZE, Microstructure::from_slice)?;
        let solutes = records(&solutes, SoluteConcentration::SIZE, SoluteConcentration::from_slice)?;

        let mut input = BlockInput::new(
            time,
            del_t,
            view(&deformation_gradient_old)?,
            view(&deformation_gradient)?,
        );
        input.coordinates = optional_view(&coordinates)?;
        input.temperature = optional_view(&temperature)?;
        input.temperature_old = optional_view(&temperature_old)?;
        input.strain_rate_sensitivity = optional_view(&strain_rate_sensitivity)?;
        input.slip_rate_gradient_edge = optional_view(&slip_rate_gradient_edge)?;
        input.slip_rate_gradient_screw = optional_view(&slip_rate_gradient_screw)?;
        input.band = &band;
        input.microstructure = &microstructure;
        input.solutes = &solutes;

        let mut stress = stress
            .try_as_matrix_mut::<Dyn, Const<1>, Const<1>, Dyn>()
            .ok_or_else(not_contiguous)?;
        let mut tangent = tangent
            .try_as_matrix_mut::<Dyn, Const<1>, Const<1>, Dyn>()
            .ok_or_else(not_contiguous)?;
        let stats = self.block.evaluate(&input, &mut stress, &mut tangent)?;
        Ok((stats.substeps, stats.newton_iterations, stats.state_iterations))
    }

    fn commit(&mut self) {
        self.block.commit();
    }

    fn field_size(&self, name: &str) -> PyResult<usize> {
        let q = Q::from_str(name).map_err(|e| PyValueError::new_err(e.to_string()))?;
        Ok(self.block.field_size(q))
    }

    fn field(&self, name: &str, out: PyReadwriteArray1<f64>) -> PyResult<()> {
        let q = Q::from_str(name).map_err(|e| PyValueError::new_err(e.to_string()))?;
        let mut out = out
            .try_as_matrix_mut::<Dyn, Const<1>, Const<1>, Dyn>()
            .ok_or_else(not_contiguous)?;
        self.block.field(q, &mut out)?;
        Ok(())
    }
}

#[pymodule]
fn dislocation_cp(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyCrystalPlasticity>()?;
    Ok(())
}
