//! Python bindings, built with the `python` feature

use chrono::NaiveDate;
use numpy::{PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use std::sync::Arc;

use crate::core::constants::SensorProfile;
use crate::core::lookup::LookupTables;
use crate::core::neural_net::NeuralNet;
use crate::core::radiometry;
use crate::core::scene::{
    ClassificationProduct, ClassifierConfig, DiagnosticsConfig, SceneClassifier, SceneInputs,
};

fn runtime_err(e: impl std::fmt::Display) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
}

fn value_err(e: impl std::fmt::Display) -> PyErr {
    PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyClassifier>()?;
    m.add_function(wrap_pyfunction!(radiance_to_bt, m)?)?;
    m.add_function(wrap_pyfunction!(flag_coding, m)?)?;
    Ok(())
}

/// Python wrapper for SceneClassifier
#[pyclass(name = "Classifier")]
struct PyClassifier {
    inner: SceneClassifier,
}

#[pymethods]
impl PyClassifier {
    #[new]
    #[pyo3(signature = (sensor, net_path=None, cloud_buffer_width=2, cloud_shadow=false, diagnostics=false))]
    fn new(
        sensor: String,
        net_path: Option<String>,
        cloud_buffer_width: usize,
        cloud_shadow: bool,
        diagnostics: bool,
    ) -> PyResult<Self> {
        let config = ClassifierConfig {
            sensor,
            cloud_buffer_width,
            cloud_shadow,
            diagnostics: DiagnosticsConfig {
                nn_output: diagnostics,
                reflectances: diagnostics,
                brightness_temperatures: diagnostics,
                emissivity: diagnostics,
                geometry: diagnostics,
            },
            ..Default::default()
        };
        let profile = config.profile().map_err(value_err)?;
        let tables = Arc::new(LookupTables::new(&profile.scan).map_err(value_err)?);
        let net = match net_path {
            Some(path) => Some(Arc::new(NeuralNet::from_file(path).map_err(runtime_err)?)),
            None => None,
        };
        let inner = SceneClassifier::new(config, tables, net).map_err(value_err)?;
        Ok(PyClassifier { inner })
    }

    #[getter]
    fn required_halo(&self) -> usize {
        self.inner.required_halo()
    }

    /// Returns the flag raster and a dict of diagnostic bands
    #[pyo3(signature = (date, sun_zenith, latitude, longitude, channels, water_fraction=None, cloud_top_height=None))]
    #[allow(clippy::too_many_arguments)]
    fn classify<'py>(
        &self,
        py: Python<'py>,
        date: &str,
        sun_zenith: PyReadonlyArray2<f32>,
        latitude: PyReadonlyArray2<f32>,
        longitude: PyReadonlyArray2<f32>,
        channels: Vec<PyReadonlyArray2<f32>>,
        water_fraction: Option<PyReadonlyArray2<u8>>,
        cloud_top_height: Option<PyReadonlyArray2<f32>>,
    ) -> PyResult<(&'py PyArray2<u32>, &'py PyDict)> {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(value_err)?;
        let mut inputs = SceneInputs::new(
            date,
            sun_zenith.as_array().to_owned(),
            latitude.as_array().to_owned(),
            longitude.as_array().to_owned(),
            channels.iter().map(|c| c.as_array().to_owned()).collect(),
        )
        .map_err(value_err)?;
        inputs.water_fraction = water_fraction.map(|wf| wf.as_array().to_owned());
        inputs.cloud_top_height = cloud_top_height.map(|h| h.as_array().to_owned());

        let product = py
            .allow_threads(|| self.inner.classify(&inputs))
            .map_err(runtime_err)?;

        let bands = PyDict::new(py);
        for band in product.bands {
            bands.set_item(band.name, PyArray2::from_owned_array(py, band.data))?;
        }
        Ok((PyArray2::from_owned_array(py, product.flags), bands))
    }
}

/// Brightness temperature (K) of an emissive channel radiance
#[pyfunction]
fn radiance_to_bt(sensor: &str, channel: usize, radiance: f64) -> PyResult<Option<f64>> {
    let profile = SensorProfile::from_id(sensor).map_err(value_err)?;
    if channel >= profile.channels.len() {
        return Err(value_err(format!("channel {} out of range", channel)));
    }
    Ok(radiometry::radiance_to_bt(radiance, &profile, channel))
}

/// Flag names and bit masks
#[pyfunction]
fn flag_coding() -> Vec<(&'static str, u32)> {
    ClassificationProduct::flag_coding()
}
