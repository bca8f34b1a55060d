//! radiocal: look-angle and range-slope radiometric calibration for UAVSAR
//!
//! This library builds empirical correction tables (LUTs) from area-corrected
//! ground-range backscatter, smooths them with a 2D Savitzky-Golay filter, and
//! drives the native UAVSAR calibration and geocoding programs over batches of
//! scenes, with flat-DEM substitution and post-correction masking.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    BoundingBox, GridDimensions, Polarization, RadiocalError, RadiocalResult, Raster, SceneGeometry,
    NODATA_VALUE,
};

pub use crate::core::{
    BatchParams, CalibrationOrchestrator, CalibrationSurface, LutBuilder, LutParams,
    SmoothingParams, SurfaceSmoother,
};
pub use io::{AnnotationReader, GdalRasterStore, ProcessRunner, SceneFiles};

#[cfg(feature = "python")]
mod python {
    use crate::config::{BuildLutJob, CalibrateJob};
    use crate::core::orchestrator::SceneState;
    use crate::core::smoothing::{SmoothingMode, SmoothingOutput, SmoothingParams, SurfaceSmoother};
    use crate::types::RadiocalError;
    use numpy::{IntoPyArray, PyReadonlyArray2};
    use pyo3::exceptions::{PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    fn to_py_err(e: RadiocalError) -> PyErr {
        match e {
            RadiocalError::InvalidConfig(_) => PyValueError::new_err(e.to_string()),
            _ => PyRuntimeError::new_err(e.to_string()),
        }
    }

    /// 2D Savitzky-Golay filter; `derivative` is one of None, "row", "col", "both"
    #[pyfunction]
    #[pyo3(signature = (z, window_size, order, derivative=None))]
    fn sgolay2d(
        py: Python<'_>,
        z: PyReadonlyArray2<f64>,
        window_size: usize,
        order: usize,
        derivative: Option<&str>,
    ) -> PyResult<PyObject> {
        let mode = match derivative {
            None => SmoothingMode::Value,
            Some("row") => SmoothingMode::RowDerivative,
            Some("col") => SmoothingMode::ColumnDerivative,
            Some("both") => SmoothingMode::Both,
            Some(other) => {
                return Err(PyValueError::new_err(format!(
                    "derivative must be None, 'row', 'col' or 'both', got '{}'",
                    other
                )))
            }
        };

        let smoother =
            SurfaceSmoother::new(SmoothingParams { window_size, order }).map_err(to_py_err)?;
        let surface = z.as_array().to_owned();
        let output = py.allow_threads(|| smoother.apply(&surface, mode)).map_err(to_py_err)?;

        Ok(match output {
            SmoothingOutput::Surface(s) => s.into_pyarray(py).into_py(py),
            SmoothingOutput::Gradient { row, col } => {
                (row.into_pyarray(py), col.into_pyarray(py)).into_py(py)
            }
        })
    }

    /// Build correction tables from a YAML job file; returns the written paths
    #[pyfunction]
    fn build_lut(py: Python<'_>, job_yaml: &str) -> PyResult<Vec<String>> {
        let job = BuildLutJob::load(job_yaml)
            .map_err(|e| PyValueError::new_err(format!("{:#}", e)))?;
        let paths = py.allow_threads(|| job.run()).map_err(to_py_err)?;
        Ok(paths.iter().map(|p| p.display().to_string()).collect())
    }

    /// Run batch calibration from a YAML job file; returns (done, skipped, failed)
    #[pyfunction]
    fn calibrate(py: Python<'_>, job_yaml: &str) -> PyResult<(usize, usize, usize)> {
        let job = CalibrateJob::load(job_yaml)
            .map_err(|e| PyValueError::new_err(format!("{:#}", e)))?;
        let report = py.allow_threads(|| job.run()).map_err(to_py_err)?;
        Ok((
            report.count(SceneState::Done),
            report.count(SceneState::Skipped),
            report.count(SceneState::Failed),
        ))
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(sgolay2d, m)?)?;
        m.add_function(wrap_pyfunction!(build_lut, m)?)?;
        m.add_function(wrap_pyfunction!(calibrate, m)?)?;
        Ok(())
    }
}
