//! Calibration surface (LUT) layout and its headerless binary format

use crate::io::raster::{read_flat, write_flat};
use crate::types::{Polarization, RadiocalError, RadiocalResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of range-slope bins (rows)
pub const SLOPE_BINS: usize = 900;
/// Number of look-angle bins (columns)
pub const LOOK_BINS: usize = 900;
/// Bins per degree along both axes
pub const BINS_PER_DEGREE: f64 = 10.0;
/// Lower edge of the slope axis in degrees
pub const SLOPE_AXIS_MIN: f64 = -45.0;

/// Look-angle bin of a value in degrees, `None` outside [0, 90)
pub fn look_bin(look_deg: f64) -> Option<usize> {
    axis_bin(look_deg * BINS_PER_DEGREE, LOOK_BINS)
}

/// Slope bin of a value in degrees, `None` outside [-45, 45)
pub fn slope_bin(slope_deg: f64) -> Option<usize> {
    axis_bin((slope_deg - SLOPE_AXIS_MIN) * BINS_PER_DEGREE, SLOPE_BINS)
}

fn axis_bin(scaled: f64, bins: usize) -> Option<usize> {
    if !scaled.is_finite() {
        return None;
    }
    let bin = scaled.floor();
    if bin < 0.0 || bin >= bins as f64 {
        None
    } else {
        Some(bin as usize)
    }
}

/// Where a set of correction tables lives and what they are called
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LutLocation {
    pub dir: PathBuf,
    pub name: String,
}

impl LutLocation {
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.to_string(),
        }
    }

    /// `caltbl_{name}_{HH|VV|HV}.flt`
    pub fn file_name(&self, polarization: Polarization) -> String {
        format!("caltbl_{}_{}.flt", self.name, polarization.short_code())
    }

    pub fn path(&self, polarization: Polarization) -> PathBuf {
        self.dir.join(self.file_name(polarization))
    }
}

/// Finalized correction table for one polarization, indexed `[slope_bin, look_bin]`
#[derive(Debug, Clone)]
pub struct CalibrationSurface {
    pub polarization: Polarization,
    pub values: Array2<f32>,
}

impl CalibrationSurface {
    pub fn new(polarization: Polarization, values: Array2<f32>) -> RadiocalResult<Self> {
        if values.dim() != (SLOPE_BINS, LOOK_BINS) {
            return Err(RadiocalError::InvalidFormat(format!(
                "Calibration surface must be {}x{}, got {:?}",
                SLOPE_BINS,
                LOOK_BINS,
                values.dim()
            )));
        }
        Ok(Self { polarization, values })
    }

    /// Read a table written by `write`, validating its size
    pub fn read<P: AsRef<Path>>(path: P, polarization: Polarization) -> RadiocalResult<Self> {
        let values = read_flat::<f32, _>(path.as_ref(), SLOPE_BINS, LOOK_BINS)?;
        log::debug!("Read {} correction table {}", polarization, path.as_ref().display());
        Ok(Self { polarization, values })
    }

    /// Write the table as a row-major float32 array, returning its path
    pub fn write(&self, location: &LutLocation) -> RadiocalResult<PathBuf> {
        std::fs::create_dir_all(&location.dir)?;
        let path = location.path(self.polarization);
        write_flat(&path, &self.values)?;
        log::info!("Wrote {} correction table {}", self.polarization, path.display());
        Ok(path)
    }

    /// Correction value for a slope/look geometry in degrees
    pub fn value_at(&self, slope_deg: f64, look_deg: f64) -> Option<f32> {
        Some(self.values[[slope_bin(slope_deg)?, look_bin(look_deg)?]])
    }

    pub fn total(&self) -> f64 {
        self.values.iter().map(|&v| v as f64).sum()
    }

    /// Sums to (approximately) zero: nothing survived masking and thresholds
    pub fn is_empty(&self) -> bool {
        self.total().abs() < 1e-12
    }
}
