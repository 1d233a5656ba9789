//! Python bindings exposing the samplers to an external training loop

use crate::config::{PrepConfig, SceneConfig};
use crate::core::dataset::DatasetBuilder;
use crate::core::histogram_match;
use crate::core::sampler::PatchSampler;
use crate::core::scene::SceneBuilder;
use crate::types::PrepError;
use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

fn to_py_err(e: PrepError) -> PyErr {
    match e {
        PrepError::IndexOutOfRange { .. } => PyIndexError::new_err(format!("{}", e)),
        PrepError::Config(_) | PrepError::Numeric(_) => PyValueError::new_err(format!("{}", e)),
        _ => PyRuntimeError::new_err(format!("{}", e)),
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_class::<PyPatchDataset>()?;
    m.add_function(wrap_pyfunction!(match_histogram, m)?)?;
    Ok(())
}

/// Histogram-match a float32 array onto a template
#[pyfunction]
fn match_histogram<'py>(
    py: Python<'py>,
    source: PyReadonlyArray2<f32>,
    template: PyReadonlyArray2<f32>,
) -> PyResult<&'py PyArray2<f32>> {
    let source = source.as_array().to_owned();
    let template = template.as_array().to_owned();
    let matched = py
        .allow_threads(|| histogram_match::match_histogram(&source, &template))
        .map_err(to_py_err)?;
    Ok(matched.into_pyarray(py))
}

/// Indexable patch dataset; items are (date1, date2, label) or (stack, label)
#[pyclass(name = "PatchDataset")]
struct PyPatchDataset {
    inner: PatchSampler,
    stacked: bool,
}

#[pymethods]
impl PyPatchDataset {
    /// Build the (train, validation) pair from a JSON configuration file
    #[staticmethod]
    #[pyo3(signature = (config_path, stacked = false))]
    fn from_config(py: Python<'_>, config_path: String, stacked: bool) -> PyResult<(Self, Self)> {
        let config = PrepConfig::from_json_file(&config_path).map_err(to_py_err)?;
        let samplers = py
            .allow_threads(|| DatasetBuilder::new(config)?.prepare_samplers())
            .map_err(to_py_err)?;

        Ok((
            PyPatchDataset {
                inner: samplers.train,
                stacked,
            },
            PyPatchDataset {
                inner: samplers.val,
                stacked,
            },
        ))
    }

    /// Build the unaugmented single-scene dataset; items are (stack, label)
    #[staticmethod]
    fn from_scene_config(py: Python<'_>, config_path: String) -> PyResult<Self> {
        let config = SceneConfig::from_json_file(&config_path).map_err(to_py_err)?;
        let inner = py
            .allow_threads(|| SceneBuilder::new(config)?.prepare_sampler())
            .map_err(to_py_err)?;
        Ok(PyPatchDataset {
            inner,
            stacked: true,
        })
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __getitem__(&self, py: Python<'_>, index: isize) -> PyResult<PyObject> {
        if index < 0 {
            return Err(PyIndexError::new_err(format!(
                "Sample index {} out of range for sampler of length {}",
                index,
                self.inner.len()
            )));
        }
        let index = index as usize;
        let mut rng = rand::thread_rng();

        if self.stacked {
            let sample = self.inner.get_stacked(index, &mut rng).map_err(to_py_err)?;
            Ok((sample.images.into_pyarray(py), sample.label.into_pyarray(py)).into_py(py))
        } else {
            let sample = self.inner.get_pair(index, &mut rng).map_err(to_py_err)?;
            Ok((
                sample.before.into_pyarray(py),
                sample.after.into_pyarray(py),
                sample.label.into_pyarray(py),
            )
                .into_py(py))
        }
    }

    #[getter]
    fn patch_size(&self) -> usize {
        self.inner.patch_size()
    }

    fn __repr__(&self) -> String {
        format!(
            "PatchDataset(len={}, patch_size={}, augment={}, stacked={})",
            self.inner.len(),
            self.inner.patch_size(),
            self.inner.augments(),
            self.stacked
        )
    }
}
